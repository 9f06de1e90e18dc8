//! Single-document redaction surgery.
//!
//! Redaction here is removal, not decoration: text-show operators whose
//! glyphs fall inside a redaction rectangle get those characters replaced
//! by blanks in the rewritten content stream, and an opaque black
//! rectangle is painted on top. The blanked region afterwards contains no
//! extractable text — copy/paste, text dumps, and downstream OCR of the
//! underlying content all come up empty.
//!
//! Glyph positions are recovered by walking the content stream with the
//! text matrix and CTM, the same way a renderer would. Glyph widths are
//! estimated (no font metrics are loaded); the rectangles in use are sized
//! with margin for that.

use crate::config::RedactionArea;
use crate::error::FileError;
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::path::Path;
use tracing::{debug, warn};

/// Rectangle in PDF user space (bottom-left origin, y grows upward).
#[derive(Debug, Clone, Copy)]
pub(crate) struct PdfRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PdfRect {
    /// Does a glyph box at (gx, gy) with the given extent overlap this
    /// rectangle?
    fn hits_glyph(&self, gx: f32, gy: f32, gw: f32, gh: f32) -> bool {
        gx < self.x + self.width && gx + gw > self.x && gy < self.y + self.height && gy + gh > self.y
    }
}

/// Redact the first page of `input` and write it as a single-page document
/// at `output`. Returns the output size in bytes.
///
/// Zero-page documents are a per-file failure ([`FileError::NoPages`]):
/// no output is written and the caller records the failure instead of a
/// mapping slot.
pub fn redact_first_page(
    input: &Path,
    output: &Path,
    areas: &[RedactionArea],
) -> Result<u64, FileError> {
    let file = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());

    let mut doc = Document::load(input).map_err(|e| FileError::LoadFailed {
        file: file.clone(),
        detail: e.to_string(),
    })?;

    let pages = doc.get_pages();
    let total_pages = pages.len();
    let Some(first_page_id) = pages.get(&1).copied() else {
        return Err(FileError::NoPages { file });
    };

    let media_box = media_box_of(&doc, first_page_id);
    let rects = to_pdf_rects(areas, media_box);
    debug!(file = %file, ?media_box, rect_count = rects.len(), "redacting first page");

    let content_data = page_content(&doc, first_page_id).unwrap_or_default();

    let scrubbed = scrub_text(&content_data, &rects).map_err(|detail| FileError::RedactFailed {
        file: file.clone(),
        detail,
    })?;
    let final_data = paint_overlays(&scrubbed, &rects).map_err(|detail| FileError::RedactFailed {
        file: file.clone(),
        detail,
    })?;

    let stream_id = doc.add_object(Stream::new(Dictionary::new(), final_data));
    match doc.get_object_mut(first_page_id) {
        Ok(Object::Dictionary(dict)) => {
            dict.set(b"Contents", Object::Reference(stream_id));
        }
        _ => {
            return Err(FileError::RedactFailed {
                file,
                detail: "first page object is not a dictionary".into(),
            });
        }
    }

    // Keep only the first page in the output.
    if total_pages > 1 {
        let trailing: Vec<u32> = (2..=total_pages as u32).collect();
        doc.delete_pages(&trailing);
    }

    doc.prune_objects();
    doc.compress();
    doc.save(output).map_err(|e| FileError::SaveFailed {
        file: file.clone(),
        detail: e.to_string(),
    })?;

    std::fs::metadata(output)
        .map(|m| m.len())
        .map_err(|e| FileError::SaveFailed {
            file,
            detail: e.to_string(),
        })
}

/// Convert top-left-origin page areas to PDF user-space rectangles.
///
/// Areas are measured from the top edge of the page (y grows downward);
/// PDF user space grows upward from the MediaBox's lower-left corner.
pub(crate) fn to_pdf_rects(areas: &[RedactionArea], media_box: (f32, f32, f32, f32)) -> Vec<PdfRect> {
    let (llx, _lly, _urx, ury) = media_box;
    areas
        .iter()
        .map(|a| PdfRect {
            x: llx + a.x1,
            y: ury - a.y2,
            width: a.width(),
            height: a.height(),
        })
        .collect()
}

/// Effective page box: CropBox, else MediaBox, else inherited from the
/// parent node, else US Letter.
fn media_box_of(doc: &Document, page_id: ObjectId) -> (f32, f32, f32, f32) {
    fn box_from(dict: &Dictionary, key: &[u8]) -> Option<(f32, f32, f32, f32)> {
        let Ok(Object::Array(arr)) = dict.get(key) else {
            return None;
        };
        let vals: Vec<f32> = arr.iter().filter_map(number_of).collect();
        (vals.len() == 4).then(|| (vals[0], vals[1], vals[2], vals[3]))
    }

    if let Ok(Object::Dictionary(dict)) = doc.get_object(page_id) {
        if let Some(b) = box_from(dict, b"CropBox").or_else(|| box_from(dict, b"MediaBox")) {
            return b;
        }
        if let Ok(Object::Reference(parent)) = dict.get(b"Parent") {
            if let Ok(Object::Dictionary(parent_dict)) = doc.get_object(*parent) {
                if let Some(b) = box_from(parent_dict, b"MediaBox") {
                    return b;
                }
            }
        }
    }
    warn!("page has no MediaBox, assuming US Letter");
    (0.0, 0.0, 612.0, 792.0)
}

fn number_of(obj: &Object) -> Option<f32> {
    match obj {
        Object::Integer(i) => Some(*i as f32),
        Object::Real(r) => Some(*r),
        _ => None,
    }
}

/// Concatenated, decompressed content of a page (all streams joined).
fn page_content(doc: &Document, page_id: ObjectId) -> Option<Vec<u8>> {
    let Ok(Object::Dictionary(dict)) = doc.get_object(page_id) else {
        return None;
    };
    let stream_bytes = |stream: &Stream| {
        stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone())
    };
    match dict.get(b"Contents").ok()? {
        Object::Reference(id) => match doc.get_object(*id).ok()? {
            Object::Stream(stream) => Some(stream_bytes(stream)),
            _ => None,
        },
        Object::Stream(stream) => Some(stream_bytes(stream)),
        Object::Array(parts) => {
            let mut joined = Vec::new();
            for part in parts {
                if let Object::Reference(id) = part {
                    if let Ok(Object::Stream(stream)) = doc.get_object(*id) {
                        joined.extend(stream_bytes(stream));
                        joined.push(b'\n');
                    }
                }
            }
            Some(joined)
        }
        _ => None,
    }
}

// ── Content-stream text scrubbing ────────────────────────────────────────

/// Estimated advance of one byte of text. Crude but sufficient: the
/// redaction rectangles carry margin, and the overlay covers stragglers
/// visually either way.
fn glyph_advance(byte: u8, font_size: f32) -> f32 {
    if byte < 128 {
        font_size * 0.55
    } else {
        font_size
    }
}

/// Blank every byte of `text` whose glyph box intersects any rectangle.
/// Returns the rewritten bytes and whether anything changed.
fn scrub_bytes(
    text: &[u8],
    start_x: f32,
    baseline_y: f32,
    font_size: f32,
    rects: &[PdfRect],
) -> (Vec<u8>, bool) {
    let glyph_height = font_size.abs().max(12.0);
    let mut out = Vec::with_capacity(text.len());
    let mut x = start_x;
    let mut changed = false;
    for &byte in text {
        let advance = glyph_advance(byte, font_size);
        if rects
            .iter()
            .any(|r| r.hits_glyph(x, baseline_y, advance, glyph_height))
        {
            out.push(b' ');
            changed = true;
        } else {
            out.push(byte);
        }
        x += advance;
    }
    (out, changed)
}

/// `ctm` after applying `m` (row-vector convention: new = m × ctm).
fn concat(ctm: [f32; 6], m: [f32; 6]) -> [f32; 6] {
    [
        ctm[0] * m[0] + ctm[2] * m[1],
        ctm[1] * m[0] + ctm[3] * m[1],
        ctm[0] * m[2] + ctm[2] * m[3],
        ctm[1] * m[2] + ctm[3] * m[3],
        ctm[0] * m[4] + ctm[2] * m[5] + ctm[4],
        ctm[1] * m[4] + ctm[3] * m[5] + ctm[5],
    ]
}

const IDENTITY: [f32; 6] = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// Rewrite a content stream, blanking text inside the rectangles.
///
/// Tracks the CTM (q/Q/cm) and the text matrix (BT/Tm/Td/TD) so glyph
/// positions are evaluated in page space, where the rectangles live.
fn scrub_text(content_data: &[u8], rects: &[PdfRect]) -> Result<Vec<u8>, String> {
    let content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let mut out: Vec<Operation> = Vec::with_capacity(content.operations.len());

    let mut ctm_stack: Vec<[f32; 6]> = Vec::new();
    let mut ctm = IDENTITY;
    let mut text_matrix = IDENTITY;
    let mut line_matrix = IDENTITY;
    let mut in_text = false;
    let mut font_size: f32 = 12.0;

    let operands_as_matrix = |operands: &[Object]| -> Option<[f32; 6]> {
        if operands.len() < 6 {
            return None;
        }
        let vals: Vec<f32> = operands.iter().take(6).filter_map(number_of).collect();
        (vals.len() == 6).then(|| [vals[0], vals[1], vals[2], vals[3], vals[4], vals[5]])
    };

    for op in content.operations {
        let operator = op.operator.as_str();
        match operator {
            "q" => {
                ctm_stack.push(ctm);
                out.push(op);
            }
            "Q" => {
                if let Some(saved) = ctm_stack.pop() {
                    ctm = saved;
                }
                out.push(op);
            }
            "cm" => {
                if let Some(m) = operands_as_matrix(&op.operands) {
                    ctm = concat(ctm, m);
                }
                out.push(op);
            }
            "BT" => {
                in_text = true;
                text_matrix = IDENTITY;
                line_matrix = IDENTITY;
                out.push(op);
            }
            "ET" => {
                in_text = false;
                out.push(op);
            }
            "Tm" if in_text => {
                if let Some(m) = operands_as_matrix(&op.operands) {
                    text_matrix = m;
                    line_matrix = m;
                }
                out.push(op);
            }
            "Td" | "TD" if in_text && op.operands.len() >= 2 => {
                if let (Some(tx), Some(ty)) =
                    (number_of(&op.operands[0]), number_of(&op.operands[1]))
                {
                    line_matrix[4] += tx;
                    line_matrix[5] += ty;
                    text_matrix = line_matrix;
                }
                out.push(op);
            }
            "Tf" if op.operands.len() >= 2 => {
                if let Some(size) = number_of(&op.operands[1]) {
                    font_size = size.abs();
                }
                out.push(op);
            }
            "Tj" | "'" if in_text => {
                let (px, py) = text_origin(ctm, text_matrix);
                out.push(scrub_string_op(op, px, py, font_size, rects));
            }
            "\"" if in_text && op.operands.len() >= 3 => {
                let (px, py) = text_origin(ctm, text_matrix);
                let replacement = match &op.operands[2] {
                    Object::String(s, fmt) => {
                        let (scrubbed, changed) = scrub_bytes(s, px, py, font_size, rects);
                        changed.then(|| Object::String(scrubbed, *fmt))
                    }
                    _ => None,
                };
                match replacement {
                    Some(obj) => {
                        let mut operands = op.operands.clone();
                        operands[2] = obj;
                        out.push(Operation::new("\"", operands));
                    }
                    None => out.push(op),
                }
            }
            "TJ" if in_text => {
                let (mut x, y) = text_origin(ctm, text_matrix);
                let mut rewritten: Vec<Object> = Vec::new();
                let mut changed = false;
                if let Some(Object::Array(items)) = op.operands.first() {
                    for item in items {
                        match item {
                            Object::String(s, fmt) => {
                                let (scrubbed, this_changed) =
                                    scrub_bytes(s, x, y, font_size, rects);
                                changed |= this_changed;
                                x += s.iter().map(|&b| glyph_advance(b, font_size)).sum::<f32>();
                                rewritten.push(Object::String(scrubbed, *fmt));
                            }
                            Object::Integer(n) => {
                                x -= (*n as f32) / 1000.0 * font_size;
                                rewritten.push(item.clone());
                            }
                            Object::Real(n) => {
                                x -= n / 1000.0 * font_size;
                                rewritten.push(item.clone());
                            }
                            other => rewritten.push(other.clone()),
                        }
                    }
                }
                if changed {
                    out.push(Operation::new("TJ", vec![Object::Array(rewritten)]));
                } else {
                    out.push(op);
                }
            }
            _ => out.push(op),
        }
    }

    Content { operations: out }.encode().map_err(|e| e.to_string())
}

fn text_origin(ctm: [f32; 6], text_matrix: [f32; 6]) -> (f32, f32) {
    (
        ctm[0] * text_matrix[4] + ctm[2] * text_matrix[5] + ctm[4],
        ctm[1] * text_matrix[4] + ctm[3] * text_matrix[5] + ctm[5],
    )
}

fn scrub_string_op(
    op: Operation,
    px: f32,
    py: f32,
    font_size: f32,
    rects: &[PdfRect],
) -> Operation {
    if let Some(Object::String(s, fmt)) = op.operands.first() {
        let (scrubbed, changed) = scrub_bytes(s, px, py, font_size, rects);
        if changed {
            return Operation::new(op.operator.as_str(), vec![Object::String(scrubbed, *fmt)]);
        }
    }
    op
}

/// Append opaque black rectangles over the redaction regions.
fn paint_overlays(content_data: &[u8], rects: &[PdfRect]) -> Result<Vec<u8>, String> {
    let content = Content::decode(content_data).map_err(|e| e.to_string())?;
    let mut ops = content.operations;

    ops.push(Operation::new("q", vec![]));
    ops.push(Operation::new(
        "rg",
        vec![Object::Real(0.0), Object::Real(0.0), Object::Real(0.0)],
    ));
    for r in rects {
        ops.push(Operation::new(
            "re",
            vec![
                Object::Real(r.x),
                Object::Real(r.y),
                Object::Real(r.width),
                Object::Real(r.height),
            ],
        ));
        ops.push(Operation::new("f", vec![]));
    }
    ops.push(Operation::new("Q", vec![]));

    Content { operations: ops }.encode().map_err(|e| e.to_string())
}
