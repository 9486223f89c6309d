//! Styling and content-transform options copied onto every compilation unit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::models::PersonalFields;

/// An sRGB color with 8-bit channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Channel fractions in 0.0..=1.0, the form PDF color operators expect.
    pub fn fractions(&self) -> (f32, f32, f32) {
        (
            f32::from(self.r) / 255.0,
            f32::from(self.g) / 255.0,
            f32::from(self.b) / 255.0,
        )
    }
}

const NAMED_COLORS: &[(&str, Rgb)] = &[
    ("black", Rgb::new(0x00, 0x00, 0x00)),
    ("navy", Rgb::new(0x1F, 0x3A, 0x5F)),
    ("blue", Rgb::new(0x1D, 0x4E, 0xD8)),
    ("teal", Rgb::new(0x0F, 0x76, 0x6E)),
    ("green", Rgb::new(0x15, 0x80, 0x3D)),
    ("maroon", Rgb::new(0x7F, 0x1D, 0x1D)),
    ("red", Rgb::new(0xB9, 0x1C, 0x1C)),
    ("purple", Rgb::new(0x6D, 0x28, 0xD9)),
    ("orange", Rgb::new(0xC2, 0x41, 0x0C)),
    ("gray", Rgb::new(0x4B, 0x55, 0x63)),
];

impl FromStr for Rgb {
    type Err = String;

    /// Accepts `#rgb`, `#rrggbb` (leading `#` optional) or a named color.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        if let Some((_, rgb)) = NAMED_COLORS.iter().find(|(name, _)| *name == lower) {
            return Ok(*rgb);
        }

        let hex = lower.strip_prefix('#').unwrap_or(&lower);
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("expected #rgb, #rrggbb or a color name, got {trimmed:?}"));
        }
        let channel = |digits: &str| u8::from_str_radix(digits, 16).map_err(|e| e.to_string());
        match hex.len() {
            3 => {
                let expand = |i: usize| channel(&hex[i..=i].repeat(2));
                Ok(Rgb::new(expand(0)?, expand(1)?, expand(2)?))
            }
            6 => Ok(Rgb::new(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            _ => Err(format!("expected #rgb, #rrggbb or a color name, got {trimmed:?}")),
        }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Visual toggles. All default to enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleFlags {
    pub header: bool,
    pub footer: bool,
    pub spaced: bool,
    pub darken: bool,
}

impl Default for StyleFlags {
    fn default() -> Self {
        Self {
            header: true,
            footer: true,
            spaced: true,
            darken: true,
        }
    }
}

/// Content transforms. All default to disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentFlags {
    pub anon: bool,
    pub bold: bool,
}

/// Everything a render backend needs from the configuration for one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderOptions {
    pub style: StyleFlags,
    pub content: ContentFlags,
    pub color: Option<Rgb>,
    pub personal: PersonalFields,
}

/// Resolved colors for one render.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palette {
    pub accent: Rgb,
    pub text: Rgb,
    pub muted: Rgb,
}

pub const DEFAULT_ACCENT: Rgb = Rgb::new(0x1F, 0x3A, 0x5F);

impl Palette {
    pub fn for_options(options: &RenderOptions) -> Self {
        let accent = options.color.unwrap_or(DEFAULT_ACCENT);
        if options.style.darken {
            Palette {
                accent,
                text: Rgb::new(0x00, 0x00, 0x00),
                muted: Rgb::new(0x33, 0x33, 0x33),
            }
        } else {
            Palette {
                accent,
                text: Rgb::new(0x33, 0x33, 0x33),
                muted: Rgb::new(0x6B, 0x6B, 0x6B),
            }
        }
    }
}
