//! PDF renderer – takes a [`LayoutConfig`] and produces PDF bytes using
//! `printpdf` (v0.8 ops-based API) with the builtin Helvetica faces.

use std::collections::{BTreeSet, HashMap};

use printpdf::*;

use crate::datauri::parse_data_uri;
use crate::error::{ForgeError, Result};
use crate::layout_config::*;

/// pt → mm
const MM_PER_PT: f32 = 0.352_778;

/// A printpdf XObject together with the pixel dimensions of the source image.
struct ImageResource {
    xobj_id: XObjectId,
    px_width: u32,
    px_height: u32,
}

/// Render a LayoutConfig into PDF bytes.
///
/// Images that cannot be decoded are skipped with a warning; the merge
/// stages validate signatures before they ever reach the document.
pub fn render_pdf(config: &LayoutConfig) -> Result<Vec<u8>> {
    if config.page_width_pt <= 0.0 || config.page_height_pt <= 0.0 {
        return Err(ForgeError::Render(format!(
            "invalid page size {}x{}",
            config.page_width_pt, config.page_height_pt
        )));
    }
    let page_w = Mm(config.page_width_pt * MM_PER_PT);
    let page_h = Mm(config.page_height_pt * MM_PER_PT);

    let mut doc = PdfDocument::new(&config.title);

    let mut srcs = BTreeSet::new();
    config.visit_boxes(&mut |b| {
        if let Some(img) = &b.image {
            srcs.insert(img.src.clone());
        }
    });

    let mut images = HashMap::new();
    let mut warnings = Vec::new();
    for src in srcs {
        match register_image(&mut doc, &src, &mut warnings) {
            Ok(res) => {
                images.insert(src, res);
            }
            Err(e) => log::warn!("skipping image: {e}"),
        }
    }

    let mut pages: Vec<PdfPage> = config
        .pages
        .iter()
        .map(|page| {
            let mut ops = Vec::new();
            for lbox in &page.boxes {
                render_box(&mut ops, lbox, config.page_height_pt, &images);
            }
            PdfPage::new(page_w, page_h, ops)
        })
        .collect();
    if pages.is_empty() {
        pages.push(PdfPage::new(page_w, page_h, Vec::new()));
    }

    log::debug!("rendering {} page(s), {} image(s)", pages.len(), images.len());
    doc.with_pages(pages);
    Ok(doc.save(&PdfSaveOptions::default(), &mut Vec::new()))
}

fn register_image(
    doc: &mut PdfDocument,
    src: &str,
    warnings: &mut Vec<PdfWarnMsg>,
) -> Result<ImageResource> {
    let bytes = parse_data_uri(src)?.bytes;
    let decoded = ::image::load_from_memory(&bytes)
        .map_err(|e| ForgeError::Image(format!("decode error: {e}")))?;
    let raw = RawImage::decode_from_bytes(&bytes, warnings)
        .map_err(|e| ForgeError::Image(format!("PDF encode error: {e}")))?;
    Ok(ImageResource {
        xobj_id: doc.add_image(&raw),
        px_width: decoded.width(),
        px_height: decoded.height(),
    })
}

/// Convert a UTF-8 string to raw Windows-1252 bytes wrapped in a String, so
/// printpdf writes them unchanged for the WinAnsiEncoding builtin fonts.
fn to_winlatin(s: &str) -> String {
    let bytes: Vec<u8> = s
        .chars()
        .map(|c| match c {
            '\u{20AC}' => 0x80, // euro
            '\u{2026}' => 0x85, // ellipsis
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95, // bullet
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{00A0}' => 0x20,
            c if (c as u32) < 256 => c as u8,
            _ => b'?',
        })
        .collect();
    // SAFETY: deliberately non-UTF-8 in 0x80-0x9F; printpdf copies the bytes
    // into the content stream without inspecting them as text.
    #[allow(unsafe_code)]
    unsafe {
        String::from_utf8_unchecked(bytes)
    }
}

fn rgb(c: &[f32; 4]) -> Color {
    Color::Rgb(Rgb {
        r: c[0],
        g: c[1],
        b: c[2],
        icc_profile: None,
    })
}

fn point(x: f32, y: f32) -> LinePoint {
    LinePoint {
        p: Point { x: Pt(x), y: Pt(y) },
        bezier: false,
    }
}

/// Corners of a box in PDF space, counter-clockwise from bottom-left.
fn corners(lbox: &LayoutBox, pdf_top: f32) -> Vec<LinePoint> {
    let (x1, x2) = (lbox.x, lbox.x + lbox.width);
    let (y1, y2) = (pdf_top - lbox.height, pdf_top);
    vec![point(x1, y1), point(x2, y1), point(x2, y2), point(x1, y2)]
}

fn write_text(ops: &mut Vec<Op>, text: &str, x: f32, y: f32, size: f32, font: BuiltinFont, color: &[f32; 4]) {
    ops.push(Op::StartTextSection);
    ops.push(Op::SetTextCursor {
        pos: Point { x: Pt(x), y: Pt(y) },
    });
    ops.push(Op::SetFontSizeBuiltinFont {
        size: Pt(size),
        font,
    });
    ops.push(Op::SetFillColor { col: rgb(color) });
    ops.push(Op::WriteTextBuiltinFont {
        items: vec![TextItem::Text(to_winlatin(text))],
        font,
    });
    ops.push(Op::EndTextSection);
}

/// Recursively render a LayoutBox and its children into PDF ops.
fn render_box(
    ops: &mut Vec<Op>,
    lbox: &LayoutBox,
    page_height: f32,
    images: &HashMap<String, ImageResource>,
) {
    // PDF origin is bottom-left; layout origin is top-left.
    let pdf_y = page_height - lbox.y;

    if let Some(bg) = &lbox.background_color {
        ops.push(Op::SetFillColor { col: rgb(bg) });
        ops.push(Op::DrawPolygon {
            polygon: Polygon {
                rings: vec![PolygonRing {
                    points: corners(lbox, pdf_y),
                }],
                mode: PaintMode::Fill,
                winding_order: WindingOrder::NonZero,
            },
        });
    }

    if let Some(border) = &lbox.border {
        ops.push(Op::SetOutlineColor {
            col: rgb(&border.color),
        });
        ops.push(Op::SetOutlineThickness {
            pt: Pt(border.width),
        });
        ops.push(Op::DrawLine {
            line: Line {
                points: corners(lbox, pdf_y),
                is_closed: true,
            },
        });
    }

    if let Some(text) = &lbox.text {
        let font = match (text.bold, text.italic) {
            (true, true) => BuiltinFont::HelveticaBoldOblique,
            (true, false) => BuiltinFont::HelveticaBold,
            (false, true) => BuiltinFont::HelveticaOblique,
            (false, false) => BuiltinFont::Helvetica,
        };
        // Baseline ≈ top of line + ascender.
        let ascender = text.font_size * 0.75;

        for line in text.lines.iter().filter(|l| !l.text.is_empty()) {
            let x = lbox.x + line.x_offset;
            let y = pdf_y - line.y_offset - ascender;
            write_text(ops, &line.text, x, y, text.font_size, font, &text.color);

            if text.underline {
                let underline_y = y - text.font_size * 0.1;
                ops.push(Op::SetOutlineThickness { pt: Pt(0.5) });
                ops.push(Op::SetOutlineColor {
                    col: rgb(&text.color),
                });
                ops.push(Op::DrawLine {
                    line: Line {
                        points: vec![point(x, underline_y), point(lbox.x + lbox.width, underline_y)],
                        is_closed: false,
                    },
                });
            }
        }

        if let Some(marker) = &text.list_marker {
            write_text(
                ops,
                marker,
                lbox.x - 16.0,
                pdf_y - ascender,
                text.font_size,
                BuiltinFont::Helvetica,
                &text.color,
            );
        }
    }

    if let Some(img) = lbox.image.as_ref() {
        if let Some(res) = images.get(&img.src) {
            // At 72 dpi printpdf maps 1 px to 1 pt.
            let scale = |target: f32, px: u32| if px > 0 { target / px as f32 } else { 1.0 };
            ops.push(Op::UseXobject {
                id: res.xobj_id.clone(),
                transform: XObjectTransform {
                    translate_x: Some(Pt(lbox.x)),
                    translate_y: Some(Pt(pdf_y - img.height)),
                    dpi: Some(72.0),
                    scale_x: Some(scale(img.width, res.px_width)),
                    scale_y: Some(scale(img.height, res.px_height)),
                    rotate: None,
                },
            });
        }
    }

    for child in &lbox.children {
        render_box(ops, child, page_height, images);
    }
}
