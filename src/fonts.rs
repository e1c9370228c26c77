//! Text measurement for layout.
//!
//! Output is drawn with the builtin Helvetica faces, so by default widths
//! come from a Helvetica-like average advance. A TTF can be loaded with
//! `ttf-parser` to measure with real glyph advances instead.

use std::path::Path;

use crate::error::{ForgeError, Result};

/// Metrics of one loaded face.
#[derive(Clone)]
struct FaceMetrics {
    /// Raw font bytes (kept alive for ttf-parser's zero-copy API).
    bytes: Vec<u8>,
    units_per_em: f32,
}

/// Measures text for the layout engine.
#[derive(Clone, Default)]
pub struct FontManager {
    regular: Option<FaceMetrics>,
    bold: Option<FaceMetrics>,
}

impl FontManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a TTF/OTF face from bytes for measurement.
    pub fn load_font(&mut self, bold: bool, bytes: Vec<u8>) -> Result<()> {
        let face = ttf_parser::Face::parse(&bytes, 0)
            .map_err(|e| ForgeError::Config(format!("failed to parse font: {e}")))?;
        let metrics = FaceMetrics {
            units_per_em: face.units_per_em() as f32,
            bytes,
        };
        if bold {
            self.bold = Some(metrics);
        } else {
            self.regular = Some(metrics);
        }
        Ok(())
    }

    /// Load the regular measurement face from a file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut mgr = Self::new();
        mgr.load_font(false, std::fs::read(path)?)?;
        Ok(mgr)
    }

    pub fn has_real_fonts(&self) -> bool {
        self.regular.is_some()
    }

    /// Width of `text` in points at `font_size`.
    pub fn measure_text_width(&self, text: &str, font_size: f32, bold: bool) -> f32 {
        let metrics = if bold {
            self.bold.as_ref().or(self.regular.as_ref())
        } else {
            self.regular.as_ref()
        };

        let Some(face) = metrics.and_then(|m| {
            ttf_parser::Face::parse(&m.bytes, 0)
                .ok()
                .map(|f| (f, m.units_per_em))
        }) else {
            // Average Helvetica advance; bold runs ~10% wider.
            let avg = if bold { 0.55 } else { 0.5 };
            return text.chars().count() as f32 * font_size * avg;
        };

        let (face, units_per_em) = face;
        let scale = font_size / units_per_em;
        text.chars()
            .map(|ch| {
                face.glyph_index(ch)
                    .and_then(|gid| face.glyph_hor_advance(gid))
                    .map(|adv| adv as f32 * scale)
                    .unwrap_or(font_size * 0.5)
            })
            .sum()
    }

    pub fn line_height_px(&self, font_size: f32, line_height_factor: f32) -> f32 {
        font_size * line_height_factor
    }
}

/// Word-wrap text to fit within `max_width` points. Returns at least one line.
pub fn wrap_text(
    text: &str,
    font_size: f32,
    bold: bool,
    max_width: f32,
    fonts: &FontManager,
) -> Vec<String> {
    if max_width <= 0.0 || text.is_empty() {
        return vec![text.to_string()];
    }

    let mut lines: Vec<String> = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{current} {word}")
            };
            if fonts.measure_text_width(&candidate, font_size, bold) > max_width
                && !current.is_empty()
            {
                lines.push(std::mem::replace(&mut current, word.to_string()));
            } else {
                current = candidate;
            }
        }
        lines.push(current);
    }
    lines
}
