//! Minimal PDF 1.4 writer for laid-out pages.
//!
//! Only the two standard Type1 fonts are referenced, so no font data is embedded.
//! Text is encoded as WinAnsi. Everything emitted is 7-bit ASCII, which keeps
//! byte offsets equal to string lengths while the xref table is built.

use crate::render::layout::{Page, PageConfig};
use crate::render::metrics::Face;

const PRODUCER: &str = concat!("json2pdf ", env!("CARGO_PKG_VERSION"));

// Fixed object numbers; page objects follow from FIRST_PAGE_OBJECT in (page, content) pairs.
const CATALOG: usize = 1;
const PAGES: usize = 2;
const FONT_REGULAR: usize = 3;
const FONT_BOLD: usize = 4;
const INFO: usize = 5;
const FIRST_PAGE_OBJECT: usize = 6;

/// Encodes `pages` into a complete PDF file.
pub fn encode(pages: &[Page], title: &str, config: &PageConfig) -> Vec<u8> {
    let mut writer = ObjectWriter::new();
    let page_ids: Vec<usize> = (0..pages.len())
        .map(|i| FIRST_PAGE_OBJECT + 2 * i)
        .collect();

    writer.object(CATALOG, &format!("<< /Type /Catalog /Pages {PAGES} 0 R >>"));

    let kids = page_ids
        .iter()
        .map(|id| format!("{id} 0 R"))
        .collect::<Vec<_>>()
        .join(" ");
    writer.object(
        PAGES,
        &format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()),
    );

    for (id, face) in [(FONT_REGULAR, Face::Regular), (FONT_BOLD, Face::Bold)] {
        writer.object(
            id,
            &format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                face.base_font()
            ),
        );
    }

    writer.object(
        INFO,
        &format!(
            "<< /Title ({}) /Producer ({}) >>",
            escape_text(title),
            escape_text(PRODUCER)
        ),
    );

    for (page, page_id) in pages.iter().zip(&page_ids) {
        let content_id = page_id + 1;
        writer.object(
            *page_id,
            &format!(
                "<< /Type /Page /Parent {PAGES} 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 {FONT_REGULAR} 0 R /F2 {FONT_BOLD} 0 R >> >> \
                 /Contents {content_id} 0 R >>",
                fmt_num(config.width_pt),
                fmt_num(config.height_pt)
            ),
        );
        let stream = content_stream(page);
        writer.object(
            content_id,
            &format!("<< /Length {} >>\nstream\n{stream}\nendstream", stream.len()),
        );
    }

    writer.finish(INFO)
}

fn content_stream(page: &Page) -> String {
    let mut ops = String::new();
    for run in &page.runs {
        let (r, g, b) = run.color.fractions();
        ops.push_str(&format!(
            "BT /{} {} Tf {} {} {} rg {} {} Td ({}) Tj ET\n",
            run.face.resource(),
            fmt_num(run.size),
            fmt_num(r),
            fmt_num(g),
            fmt_num(b),
            fmt_num(run.x),
            fmt_num(run.y),
            escape_text(&run.text)
        ));
    }
    ops
}

/// Fixed three-decimal formatting with trailing zeros trimmed.
fn fmt_num(value: f32) -> String {
    let formatted = format!("{value:.3}");
    let trimmed = formatted.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-0" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Escapes text for a PDF literal string in WinAnsi encoding.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            '\u{a0}'..='\u{ff}' => out.push_str(&format!("\\{:03o}", c as u32)),
            _ => match winansi_punctuation(c) {
                Some(code) => out.push_str(&format!("\\{code:03o}")),
                None => out.push('?'),
            },
        }
    }
    out
}

fn winansi_punctuation(c: char) -> Option<u8> {
    let code = match c {
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2026}' => 0x85,
        '\u{20AC}' => 0x80,
        _ => return None,
    };
    Some(code)
}

struct ObjectWriter {
    out: String,
    offsets: Vec<(usize, usize)>,
}

impl ObjectWriter {
    fn new() -> Self {
        Self {
            out: String::from("%PDF-1.4\n"),
            offsets: Vec::new(),
        }
    }

    fn object(&mut self, id: usize, body: &str) {
        self.offsets.push((id, self.out.len()));
        self.out.push_str(&format!("{id} 0 obj\n{body}\nendobj\n"));
    }

    fn finish(mut self, info: usize) -> Vec<u8> {
        self.offsets.sort_by_key(|(id, _)| *id);
        let size = self.offsets.len() + 1;
        let xref_offset = self.out.len();

        self.out.push_str(&format!("xref\n0 {size}\n0000000000 65535 f \n"));
        for (_, offset) in &self.offsets {
            self.out.push_str(&format!("{offset:010} 00000 n \n"));
        }
        self.out.push_str(&format!(
            "trailer\n<< /Size {size} /Root {CATALOG} 0 R /Info {info} 0 R >>\nstartxref\n{xref_offset}\n%%EOF\n"
        ));
        self.out.into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::layout::{default_page_config, TextRun};
    use crate::render::style::Rgb;

    fn page(text: &str) -> Page {
        Page {
            runs: vec![TextRun {
                x: 54.0,
                y: 700.5,
                size: 10.0,
                face: Face::Bold,
                color: Rgb::new(255, 0, 0),
                text: text.to_string(),
            }],
        }
    }

    fn as_text(bytes: &[u8]) -> &str {
        std::str::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_document_structure() {
        let bytes = encode(&[page("Hello")], "CV", &default_page_config());
        let text = as_text(&bytes);
        assert!(text.starts_with("%PDF-1.4\n"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("/Count 1"));
        assert!(text.contains("BT /F2 10 Tf 1 0 0 rg 54 700.5 Td (Hello) Tj ET"));
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let bytes = encode(&[page("one"), page("two")], "CV", &default_page_config());
        let text = as_text(&bytes);

        let startxref = text.rfind("startxref\n").unwrap() + "startxref\n".len();
        let xref_offset: usize = text[startxref..].lines().next().unwrap().parse().unwrap();
        assert!(text[xref_offset..].starts_with("xref\n"));

        let entries: Vec<&str> = text[xref_offset..].lines().skip(3).take(9).collect();
        assert_eq!(entries.len(), 9, "5 fixed objects + 2 pages * 2");
        for (index, entry) in entries.iter().enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            let expected = format!("{} 0 obj", index + 1);
            assert!(
                text[offset..].starts_with(&expected),
                "xref entry {index} does not point at {expected}"
            );
        }
    }

    #[test]
    fn test_stream_length_matches_content() {
        let bytes = encode(&[page("Length check")], "CV", &default_page_config());
        let text = as_text(&bytes);
        let length_at = text.find("/Length ").unwrap() + "/Length ".len();
        let length: usize = text[length_at..]
            .split_whitespace()
            .next()
            .unwrap()
            .parse()
            .unwrap();
        let stream_start = text.find("stream\n").unwrap() + "stream\n".len();
        let stream_end = text.find("\nendstream").unwrap();
        assert_eq!(stream_end - stream_start, length);
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a(b)c\\d"), "a\\(b\\)c\\\\d");
        assert_eq!(escape_text("café"), "caf\\351");
        assert_eq!(escape_text("Ada · Page 1 of 1"), "Ada \\267 Page 1 of 1");
        assert_eq!(escape_text("2019\u{2013}2024"), "2019\\2262024");
        assert_eq!(escape_text("日本"), "??");
    }

    #[test]
    fn test_fmt_num_trims_zeros() {
        assert_eq!(fmt_num(612.0), "612");
        assert_eq!(fmt_num(0.5), "0.5");
        assert_eq!(fmt_num(0.0), "0");
        assert_eq!(fmt_num(12.3456), "12.346");
    }
}
