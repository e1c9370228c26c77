//! Pipeline – ties together styling, layout, pagination and rendering. The
//! export stage hands it the finalized working document's DOM.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::dom::{body_children, parse_html, DomNode};
use crate::error::Result;
use crate::fonts::FontManager;
use crate::layout::compute_layout;
use crate::layout_config::LayoutConfig;
use crate::pagination::{paginate, PAGE_MARGIN_PT};
use crate::render::render_pdf;
use crate::style::build_styled_tree;

/// Page orientation for the generated PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageOrientation {
    #[default]
    Portrait,
    Landscape,
}

/// Configuration for the PDF generation pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Document title embedded in the PDF metadata.
    pub title: String,
    /// Page width in points (default: A4 = 595.28).
    pub page_width: f32,
    /// Page height in points (default: A4 = 841.89).
    pub page_height: f32,
    pub page_margin: f32,
    /// Swaps effective width/height when `Landscape`.
    pub orientation: PageOrientation,
    /// TTF used for text measurement instead of the Helvetica heuristic.
    pub measurement_font: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            title: "Requisition".to_string(),
            page_width: 595.28,
            page_height: 841.89,
            page_margin: PAGE_MARGIN_PT,
            orientation: PageOrientation::Portrait,
            measurement_font: None,
        }
    }
}

impl PipelineConfig {
    pub fn effective_width(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_width,
            PageOrientation::Landscape => self.page_height,
        }
    }

    pub fn effective_height(&self) -> f32 {
        match self.orientation {
            PageOrientation::Portrait => self.page_height,
            PageOrientation::Landscape => self.page_width,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    fn fonts(&self) -> Result<FontManager> {
        match &self.measurement_font {
            Some(path) => FontManager::from_path(path),
            None => Ok(FontManager::default()),
        }
    }
}

/// DOM → paginated layout, without rendering.
pub fn layout_document(nodes: &[DomNode], config: &PipelineConfig) -> Result<LayoutConfig> {
    let content = body_children(nodes);
    let styled = build_styled_tree(&content, None);

    let fonts = config.fonts()?;
    let eff_w = config.effective_width();
    let eff_h = config.effective_height();
    let boxes = compute_layout(&styled, eff_w, config.page_margin, &fonts)?;

    let mut layout = paginate(&boxes, eff_w, eff_h, config.page_margin, &fonts);
    layout.title = config.title.clone();
    Ok(layout)
}

/// DOM → PDF bytes. Also returns the layout that was rendered.
pub fn render_document(
    nodes: &[DomNode],
    config: &PipelineConfig,
) -> Result<(Vec<u8>, LayoutConfig)> {
    let layout = layout_document(nodes, config)?;
    let bytes = render_pdf(&layout)?;
    log::debug!(
        "rendered {:?}: {} page(s), {} bytes",
        config.title,
        layout.pages.len(),
        bytes.len()
    );
    Ok((bytes, layout))
}

/// HTML string → PDF bytes.
pub fn generate_pdf(html: &str, config: &PipelineConfig) -> Result<(Vec<u8>, LayoutConfig)> {
    render_document(&parse_html(html), config)
}
