//! Page layout: places analyzed items onto fixed-size pages.
//!
//! Coordinates follow PDF conventions: points, origin at the bottom-left corner,
//! `y` is the text baseline.

use serde::{Deserialize, Serialize};

use crate::models::{AnalyzedDocument, DocumentKind, Item, PersonalFields, Section};
use crate::render::metrics::{get_metrics, Face};
use crate::render::style::{Palette, RenderOptions, Rgb};

pub const ANONYMOUS_NAME: &str = "Anonymous Candidate";

/// Page geometry and type sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageConfig {
    pub width_pt: f32,
    pub height_pt: f32,
    pub margin_pt: f32,
    pub body_pt: f32,
    pub heading_pt: f32,
    pub name_pt: f32,
    pub footer_pt: f32,
    /// Baseline-to-baseline distance as a multiple of the type size.
    pub leading: f32,
}

/// US letter, 0.75" margins, 10pt body.
pub fn default_page_config() -> PageConfig {
    PageConfig {
        width_pt: 612.0,
        height_pt: 792.0,
        margin_pt: 54.0,
        body_pt: 10.0,
        heading_pt: 12.5,
        name_pt: 20.0,
        footer_pt: 8.0,
        leading: 1.3,
    }
}

impl PageConfig {
    pub fn text_width(&self) -> f32 {
        self.width_pt - 2.0 * self.margin_pt
    }

    fn top(&self) -> f32 {
        self.height_pt - self.margin_pt
    }

    /// Lowest baseline body text may use; the footer lives below it.
    fn bottom(&self) -> f32 {
        self.margin_pt + self.footer_pt * self.leading * 2.0
    }
}

/// A single run of text at a fixed position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextRun {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub face: Face,
    pub color: Rgb,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub runs: Vec<TextRun>,
}

impl Page {
    /// All text on the page in placement order, one run per line.
    #[cfg(test)]
    pub fn plain_text(&self) -> String {
        self.runs
            .iter()
            .map(|r| r.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Composer
// ────────────────────────────────────────────────────────────────────────────

struct Composer<'a> {
    page: &'a PageConfig,
    palette: Palette,
    pages: Vec<Page>,
    current: Page,
    cursor: f32,
}

impl<'a> Composer<'a> {
    fn new(page: &'a PageConfig, palette: Palette) -> Self {
        Self {
            page,
            palette,
            pages: Vec::new(),
            current: Page::default(),
            cursor: page.top(),
        }
    }

    fn line_height(&self, size: f32) -> f32 {
        size * self.page.leading
    }

    /// Moves the cursor down for a line of `size`, breaking the page when needed.
    fn advance(&mut self, size: f32) -> f32 {
        let next = self.cursor - self.line_height(size);
        if next < self.page.bottom() && !self.current.runs.is_empty() {
            self.break_page();
            self.cursor -= self.line_height(size);
        } else {
            self.cursor = next;
        }
        self.cursor
    }

    fn break_page(&mut self) {
        let finished = std::mem::take(&mut self.current);
        self.pages.push(finished);
        self.cursor = self.page.top();
    }

    fn gap(&mut self, fraction: f32) {
        self.cursor -= self.line_height(self.page.body_pt) * fraction;
    }

    fn place(&mut self, x: f32, y: f32, size: f32, face: Face, color: Rgb, text: &str) {
        self.current.runs.push(TextRun {
            x,
            y,
            size,
            face,
            color,
            text: text.to_string(),
        });
    }

    fn line(&mut self, text: &str, size: f32, face: Face, color: Rgb) {
        let y = self.advance(size);
        self.place(self.page.margin_pt, y, size, face, color, text);
    }

    fn centered(&mut self, text: &str, size: f32, face: Face, color: Rgb) {
        let width = get_metrics(face).measure(text, size);
        let x = self.page.margin_pt + ((self.page.text_width() - width) / 2.0).max(0.0);
        let y = self.advance(size);
        self.place(x, y, size, face, color, text);
    }

    /// Left text and right-aligned text sharing one baseline.
    fn split(&mut self, left: &str, left_face: Face, right: &str, color: Rgb) {
        let size = self.page.body_pt;
        let y = self.advance(size);
        self.place(self.page.margin_pt, y, size, left_face, color, left);
        if !right.is_empty() {
            let width = get_metrics(Face::Regular).measure(right, size);
            let x = self.page.width_pt - self.page.margin_pt - width;
            self.place(x, y, size, Face::Regular, self.palette.muted, right);
        }
    }

    /// Word-wrapped block. `marker` is drawn on the first line and the text is indented past it.
    fn wrapped(&mut self, text: &str, face: Face, color: Rgb, marker: Option<&str>) {
        let size = self.page.body_pt;
        let metrics = get_metrics(face);
        let indent = marker.map_or(0.0, |m| get_metrics(Face::Regular).measure(m, size) + 4.0);
        let lines = metrics.wrap(text, size, self.page.text_width() - indent);

        for (i, line) in lines.iter().enumerate() {
            let y = self.advance(size);
            if i == 0 {
                if let Some(marker) = marker {
                    self.place(self.page.margin_pt, y, size, Face::Regular, color, marker);
                }
            }
            self.place(self.page.margin_pt + indent, y, size, face, color, line);
        }
    }

    fn finish(mut self, footer: Option<&str>) -> Vec<Page> {
        if !self.current.runs.is_empty() || self.pages.is_empty() {
            let last = std::mem::take(&mut self.current);
            self.pages.push(last);
        }

        if let Some(label) = footer {
            let total = self.pages.len();
            let size = self.page.footer_pt;
            let y = self.page.margin_pt;
            for (index, page) in self.pages.iter_mut().enumerate() {
                let text = if label.is_empty() {
                    format!("Page {} of {}", index + 1, total)
                } else {
                    format!("{label} · Page {} of {}", index + 1, total)
                };
                let width = get_metrics(Face::Regular).measure(&text, size);
                page.runs.push(TextRun {
                    x: self.page.margin_pt + (self.page.text_width() - width) / 2.0,
                    y,
                    size,
                    face: Face::Regular,
                    color: self.palette.muted,
                    text,
                });
            }
        }
        self.pages
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Document composition
// ────────────────────────────────────────────────────────────────────────────

/// Personal fields after command-line overrides and anonymization.
pub fn effective_personal(doc: &AnalyzedDocument, options: &RenderOptions) -> PersonalFields {
    let merged = options.personal.overlay(&doc.personal);
    if options.content.anon {
        PersonalFields {
            name: Some(ANONYMOUS_NAME.to_string()),
            titles: merged.titles,
            ..Default::default()
        }
    } else {
        merged
    }
}

/// Lays out a whole document. Always returns at least one page.
pub fn compose(
    doc: &AnalyzedDocument,
    kind: DocumentKind,
    options: &RenderOptions,
    page: &PageConfig,
) -> Vec<Page> {
    let palette = Palette::for_options(options);
    let personal = effective_personal(doc, options);
    let mut composer = Composer::new(page, palette);

    if options.style.header {
        compose_header(&mut composer, &personal);
    }

    for (index, section) in doc.sections.iter().enumerate() {
        if index > 0 || options.style.header {
            composer.gap(0.8);
        }
        match kind {
            DocumentKind::Cv => compose_cv_section(&mut composer, section, options),
            DocumentKind::CoverLetter => compose_letter_section(&mut composer, section, options),
        }
    }

    let footer = options
        .style
        .footer
        .then(|| personal.name.clone().unwrap_or_default());
    composer.finish(footer.as_deref())
}

fn compose_header(composer: &mut Composer<'_>, personal: &PersonalFields) {
    let palette = composer.palette;
    let (name_pt, body_pt) = (composer.page.name_pt, composer.page.body_pt);
    if let Some(name) = personal.name.as_deref().filter(|n| !n.trim().is_empty()) {
        composer.centered(name, name_pt, Face::Bold, palette.accent);
    }
    let titles: Vec<&str> = personal
        .titles
        .iter()
        .map(String::as_str)
        .filter(|t| !t.trim().is_empty())
        .collect();
    if !titles.is_empty() {
        composer.centered(&titles.join(" | "), body_pt, Face::Regular, palette.text);
    }
    let contact = personal.contact_line();
    if !contact.is_empty() {
        composer.centered(&contact.join(" | "), body_pt * 0.9, Face::Regular, palette.muted);
    }
}

fn compose_cv_section(composer: &mut Composer<'_>, section: &Section, options: &RenderOptions) {
    let palette = composer.palette;
    let heading_pt = composer.page.heading_pt;
    composer.line(&section.name.to_uppercase(), heading_pt, Face::Bold, palette.accent);

    let emphasis = if options.content.bold {
        Face::Bold
    } else {
        Face::Regular
    };

    for (index, item) in section.items.iter().enumerate() {
        if index > 0 && options.style.spaced {
            composer.gap(0.4);
        }
        match item {
            Item::Paragraph { text } => composer.wrapped(text, Face::Regular, palette.text, None),
            Item::Skill { category, content } => {
                composer.wrapped(&format!("{category}: {content}"), emphasis, palette.text, None)
            }
            Item::Entry {
                title,
                subtitle,
                btag,
                ttag,
                details,
            } => {
                composer.split(title, emphasis, btag, palette.text);
                composer.split(subtitle, Face::Regular, ttag, palette.muted);
                for detail in details {
                    composer.wrapped(detail, Face::Regular, palette.text, Some("-"));
                }
            }
            Item::Honor {
                title,
                subtitle,
                ltag,
                rtag,
            } => {
                let left = if ltag.is_empty() {
                    format!("{title}, {subtitle}")
                } else {
                    format!("{ltag}  {title}, {subtitle}")
                };
                composer.split(&left, emphasis, rtag, palette.text);
            }
        }
    }
}

fn compose_letter_section(composer: &mut Composer<'_>, section: &Section, options: &RenderOptions) {
    let palette = composer.palette;
    for (index, item) in section.items.iter().enumerate() {
        if index > 0 {
            composer.gap(if options.style.spaced { 0.8 } else { 0.4 });
        }
        if let Item::Paragraph { text } = item {
            composer.wrapped(text, Face::Regular, palette.text, None);
        }
    }
}
