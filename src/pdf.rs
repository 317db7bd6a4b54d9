use crate::models::PreviewBundle;
use printpdf::{BuiltinFont, Mm, PdfDocument};
use std::io::BufWriter;
use thiserror::Error;

const PAGE_W: f32 = 210.0;
const PAGE_H: f32 = 297.0;
const TOP: f32 = 280.0;
const BOTTOM: f32 = 15.0;
const LINE_H: f32 = 4.0;
const WRAP: usize = 100;

#[derive(Debug, Error)]
#[error("PDF export failed: {0}")]
pub struct PdfExportError(String);

/// Text-only PDF listing of the bundle source, one section per part.
pub fn generate_source_pdf(title: &str, bundle: &PreviewBundle) -> Result<Vec<u8>, PdfExportError> {
    let (doc, page, layer) = PdfDocument::new(
        format!("Website source: {}", truncate(title, 48)),
        Mm(PAGE_W),
        Mm(PAGE_H),
        "Layer 1",
    );
    let heading = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PdfExportError(e.to_string()))?;
    let mono = doc
        .add_builtin_font(BuiltinFont::Courier)
        .map_err(|e| PdfExportError(e.to_string()))?;

    let mut current = doc.get_page(page).get_layer(layer);
    current.use_text("Generated website source", 18.0, Mm(15.0), Mm(TOP), &heading);
    current.use_text(truncate(title, 90), 10.0, Mm(15.0), Mm(TOP - 8.0), &mono);
    let mut y = TOP - 20.0;

    for (name, source) in [("HTML", &bundle.html), ("CSS", &bundle.css), ("JavaScript", &bundle.js)] {
        if source.trim().is_empty() {
            continue;
        }
        if y - 3.0 * LINE_H < BOTTOM {
            let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), name);
            current = doc.get_page(page).get_layer(layer);
            y = TOP;
        }
        current.use_text(name, 13.0, Mm(15.0), Mm(y), &heading);
        y -= 2.0 * LINE_H;

        for line in wrap_lines(source) {
            if y < BOTTOM {
                let (page, layer) = doc.add_page(Mm(PAGE_W), Mm(PAGE_H), name);
                current = doc.get_page(page).get_layer(layer);
                y = TOP;
            }
            current.use_text(line, 7.5, Mm(15.0), Mm(y), &mono);
            y -= LINE_H;
        }
        y -= LINE_H;
    }

    let mut buf: Vec<u8> = Vec::new();
    {
        let mut writer = BufWriter::new(&mut buf);
        doc.save(&mut writer).map_err(|e| PdfExportError(e.to_string()))?;
    }
    Ok(buf)
}

// Builtin fonts only cover Latin-1, so anything else becomes '?'.
fn wrap_lines(source: &str) -> Vec<String> {
    let mut out = Vec::new();
    for raw in source.lines() {
        let line: Vec<char> = raw
            .replace('\t', "    ")
            .chars()
            .map(|c| if c.is_ascii() && !c.is_ascii_control() { c } else { '?' })
            .collect();
        if line.is_empty() {
            out.push(String::new());
            continue;
        }
        out.extend(line.chunks(WRAP).map(|chunk| chunk.iter().collect::<String>()));
    }
    out
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}
