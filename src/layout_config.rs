//! Layout config – the frozen representation between layout computation and
//! PDF rendering. It encodes exactly what goes on each page and can be dumped
//! as JSON to inspect a rendered requisition.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A complete document layout ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutConfig {
    /// Document title embedded in the PDF metadata.
    #[serde(default = "LayoutConfig::default_title")]
    pub title: String,
    /// Width of each page in PDF points (1 pt = 1/72 inch).
    pub page_width_pt: f32,
    /// Height of each page in PDF points.
    pub page_height_pt: f32,
    pub pages: Vec<PageLayout>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageLayout {
    pub page_index: usize,
    pub boxes: Vec<LayoutBox>,
}

/// A positioned rectangle with optional content. Coordinates are page
/// absolute, origin top-left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LayoutBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,

    pub background_color: Option<[f32; 4]>,
    pub border: Option<BorderStyle>,

    pub text: Option<TextContent>,
    pub image: Option<ImageContent>,

    pub children: Vec<LayoutBox>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorderStyle {
    pub width: f32,
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextContent {
    /// Pre-wrapped lines, each already offset for alignment.
    pub lines: Vec<TextLine>,
    pub font_size: f32,
    pub bold: bool,
    pub italic: bool,
    pub color: [f32; 4],
    pub line_height: f32,
    #[serde(default)]
    pub align: Alignment,
    pub underline: bool,
    /// List bullet/number prefix (e.g. "• " or "1. ")
    pub list_marker: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    /// X offset within the layout box (for alignment)
    pub x_offset: f32,
    /// Y offset from the top of the text content area
    pub y_offset: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageContent {
    /// A base64 data URI.
    pub src: String,
    pub width: f32,
    pub height: f32,
}

impl LayoutConfig {
    /// An empty A4 layout.
    pub fn a4() -> Self {
        Self {
            title: Self::default_title(),
            // A4: 210mm × 297mm
            page_width_pt: 595.28,
            page_height_pt: 841.89,
            pages: Vec::new(),
        }
    }

    fn default_title() -> String {
        "Requisition".to_string()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Depth-first visit of every box on every page.
    pub fn visit_boxes(&self, f: &mut dyn FnMut(&LayoutBox)) {
        fn walk(b: &LayoutBox, f: &mut dyn FnMut(&LayoutBox)) {
            f(b);
            for c in &b.children {
                walk(c, f);
            }
        }
        for page in &self.pages {
            for b in &page.boxes {
                walk(b, f);
            }
        }
    }
}

impl LayoutBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            background_color: None,
            border: None,
            text: None,
            image: None,
            children: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn centered_line() -> LayoutBox {
        let mut b = LayoutBox::new(40.0, 40.0, 80.0, 12.0);
        b.text = Some(TextContent {
            lines: vec![TextLine {
                text: "Qty".into(),
                x_offset: 30.0,
                y_offset: 0.0,
            }],
            font_size: 9.0,
            bold: true,
            italic: false,
            color: [0.0, 0.0, 0.0, 1.0],
            line_height: 10.8,
            align: Alignment::Center,
            underline: false,
            list_marker: None,
        });
        b
    }

    #[test]
    fn json_dump_names_alignment() {
        let mut config = LayoutConfig::a4();
        let mut row = LayoutBox::new(40.0, 40.0, 500.0, 12.0);
        row.children.push(centered_line());
        config.pages.push(PageLayout {
            page_index: 0,
            boxes: vec![row],
        });

        let json = config.to_json().unwrap();
        assert!(json.contains(r#""align": "center""#));

        let back = LayoutConfig::from_json(&json).unwrap();
        let mut texts = Vec::new();
        back.visit_boxes(&mut |b| {
            if let Some(t) = &b.text {
                texts.push(t.lines[0].text.clone());
            }
        });
        assert_eq!(texts, ["Qty"]);
    }

    #[test]
    fn title_and_alignment_default() {
        let json = r#"{
            "page_width_pt": 100.0,
            "page_height_pt": 100.0,
            "pages": [{ "page_index": 0, "boxes": [{
                "x": 0.0, "y": 0.0, "width": 10.0, "height": 10.0,
                "background_color": null, "border": null, "image": null, "children": [],
                "text": {
                    "lines": [], "font_size": 9.0, "bold": false, "italic": false,
                    "color": [0.0, 0.0, 0.0, 1.0], "line_height": 10.0,
                    "underline": false, "list_marker": null
                }
            }]}]
        }"#;
        let config = LayoutConfig::from_json(json).unwrap();
        assert_eq!(config.title, "Requisition");
        let text = config.pages[0].boxes[0].text.as_ref().unwrap();
        assert_eq!(text.align, Alignment::Left);
    }
}
