//! Layout engine – uses Taffy to compute flexbox layout from a styled DOM
//! tree, then converts the result into positioned boxes in document space.
//!
//! Tables are laid out as a column of flex rows. A cell with an explicit
//! width keeps it as its flex basis; the remaining cells share what is left.

use std::collections::HashMap;

use taffy::prelude::*;

use crate::datauri::parse_data_uri;
use crate::dom::Tag;
use crate::error::{ForgeError, Result};
use crate::fonts::{wrap_text, FontManager};
use crate::style::{self, ComputedStyle, StyledNode};

// ---------------------------------------------------------------------------
// Intermediate layout tree (pre-pagination)
// ---------------------------------------------------------------------------

/// A positioned box in document coordinates (before page splitting).
#[derive(Debug, Clone)]
pub struct PositionedBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub style: ComputedStyle,
    pub content: BoxContent,
    pub children: Vec<PositionedBox>,
}

#[derive(Debug, Clone)]
pub enum BoxContent {
    None,
    Text { lines: Vec<String> },
    Image { src: String },
    ListItem { marker: String },
}

fn taffy_err(e: taffy::TaffyError) -> ForgeError {
    ForgeError::Render(format!("layout: {e}"))
}

fn edges(top: f32, right: f32, bottom: f32, left: f32) -> Rect<LengthPercentage> {
    Rect {
        top: LengthPercentage::Length(top),
        right: LengthPercentage::Length(right),
        bottom: LengthPercentage::Length(bottom),
        left: LengthPercentage::Length(left),
    }
}

fn padding_of(s: &ComputedStyle) -> Rect<LengthPercentage> {
    edges(s.padding_top, s.padding_right, s.padding_bottom, s.padding_left)
}

fn margin_of(s: &ComputedStyle) -> Rect<LengthPercentageAuto> {
    Rect {
        top: LengthPercentageAuto::Length(s.margin_top),
        right: LengthPercentageAuto::Length(s.margin_right),
        bottom: LengthPercentageAuto::Length(s.margin_bottom),
        left: LengthPercentageAuto::Length(s.margin_left),
    }
}

fn border_of(s: &ComputedStyle) -> Rect<LengthPercentage> {
    let w = s.border_width;
    edges(w, w, w, w)
}

/// Resolve a style width against the parent width.
fn resolved_width(style: &ComputedStyle, parent_width: f32) -> Option<f32> {
    match style.width {
        style::Dimension::Px(w) => Some(w),
        style::Dimension::Percent(p) => Some(parent_width * p / 100.0),
        style::Dimension::Auto => None,
    }
}

fn dim_to_taffy(d: style::Dimension) -> taffy::Dimension {
    match d {
        style::Dimension::Auto => taffy::Dimension::Auto,
        style::Dimension::Px(v) => taffy::Dimension::Length(v),
        style::Dimension::Percent(v) => taffy::Dimension::Percent(v / 100.0),
    }
}

// ---------------------------------------------------------------------------
// Build Taffy tree from styled nodes
// ---------------------------------------------------------------------------

struct LayoutBuilder<'a> {
    taffy: TaffyTree<()>,
    fonts: &'a FontManager,
    node_styles: HashMap<NodeId, ComputedStyle>,
    node_content: HashMap<NodeId, BoxContent>,
    available_width: f32,
}

impl<'a> LayoutBuilder<'a> {
    fn new(fonts: &'a FontManager, available_width: f32) -> Self {
        Self {
            taffy: TaffyTree::new(),
            fonts,
            node_styles: HashMap::new(),
            node_content: HashMap::new(),
            available_width,
        }
    }

    fn collect_inline_text(node: &StyledNode) -> String {
        match node {
            StyledNode::Text { text, .. } => text.clone(),
            StyledNode::Element { children, .. } => {
                children.iter().map(Self::collect_inline_text).collect()
            }
        }
    }

    /// True when every child is a text run or a plain inline element.
    fn all_text_inline(children: &[StyledNode]) -> bool {
        children.iter().all(|c| match c {
            StyledNode::Text { .. } => true,
            StyledNode::Element {
                style,
                children: gc,
                ..
            } => style.display == style::Display::Inline && Self::all_text_inline(gc),
        })
    }

    fn build_node(&mut self, styled: &StyledNode, parent_width: f32) -> Result<NodeId> {
        match styled {
            StyledNode::Text { text, style } => self.build_text_node(text, style, None, parent_width),
            StyledNode::Element {
                tag,
                style,
                children,
                attrs,
            } => self.build_element_node(tag, style, children, attrs, parent_width),
        }
    }

    /// A wrapped text leaf. `block` carries the margin/padding of a paragraph
    /// whose inline content was merged into this leaf.
    fn build_text_node(
        &mut self,
        text: &str,
        style: &ComputedStyle,
        block: Option<&ComputedStyle>,
        parent_width: f32,
    ) -> Result<NodeId> {
        let bold = style.font_weight == style::FontWeight::Bold;
        let font_size = style.font_size;
        let line_height = self.fonts.line_height_px(font_size, style.line_height);

        let base_width = if parent_width > 0.0 {
            parent_width
        } else {
            self.available_width
        };
        let inset = block
            .map(|b| b.padding_left + b.padding_right + b.margin_left + b.margin_right)
            .unwrap_or(0.0);
        let max_w = (base_width - inset).max(1.0);

        let text = text.trim();
        let lines = wrap_text(text, font_size, bold, max_w, self.fonts);
        let text_width = lines
            .iter()
            .map(|l| self.fonts.measure_text_width(l, font_size, bold))
            .fold(0.0f32, f32::max);
        let text_height = lines.len() as f32 * line_height;

        // Aligned text spans the full line so the paginator can offset it.
        let width = if style.text_align == style::TextAlign::Left {
            taffy::Dimension::Length(text_width)
        } else {
            taffy::Dimension::Percent(1.0)
        };

        let mut taffy_style = Style {
            size: Size {
                width,
                height: taffy::Dimension::Length(text_height),
            },
            ..Default::default()
        };
        if let Some(b) = block {
            taffy_style.margin = margin_of(b);
            taffy_style.padding = padding_of(b);
            if let taffy::Dimension::Length(w) = taffy_style.size.width {
                taffy_style.size.width = taffy::Dimension::Length(w + b.padding_left + b.padding_right);
            }
            taffy_style.size.height =
                taffy::Dimension::Length(text_height + b.padding_top + b.padding_bottom);
        }

        let node = self.taffy.new_leaf(taffy_style).map_err(taffy_err)?;
        let mut node_style = style.clone();
        if let Some(b) = block {
            node_style.background_color = b.background_color;
            node_style.border_width = b.border_width;
            node_style.border_color = b.border_color;
            node_style.padding_left = b.padding_left;
            node_style.padding_right = b.padding_right;
            node_style.padding_top = b.padding_top;
            node_style.page_break_before = b.page_break_before;
            node_style.page_break_after = b.page_break_after;
        }
        self.node_styles.insert(node, node_style);
        self.node_content.insert(node, BoxContent::Text { lines });
        Ok(node)
    }

    /// Widths available to each child of a row-like container.
    fn child_widths(
        &self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        inner_width: f32,
    ) -> Vec<f32> {
        let is_flex_row = style.display == style::Display::Flex
            && style.flex_direction == style::FlexDirection::Row;
        let is_table_row = *tag == Tag::Tr;
        if !is_flex_row && !is_table_row {
            return vec![inner_width; children.len()];
        }

        let fixed: Vec<Option<f32>> = children
            .iter()
            .map(|c| match c {
                StyledNode::Element { style, .. } if is_table_row => resolved_width(style, inner_width),
                _ => None,
            })
            .collect();
        let element_count = children
            .iter()
            .filter(|c| matches!(c, StyledNode::Element { .. }))
            .count();
        let gap_total = style.gap * element_count.saturating_sub(1) as f32;
        let fixed_total: f32 = fixed.iter().flatten().sum();
        let flexible = fixed.iter().filter(|w| w.is_none()).count().max(1);
        let share = ((inner_width - gap_total - fixed_total) / flexible as f32).max(1.0);

        fixed.into_iter().map(|w| w.unwrap_or(share)).collect()
    }

    fn build_element_node(
        &mut self,
        tag: &Tag,
        style: &ComputedStyle,
        children: &[StyledNode],
        attrs: &HashMap<String, String>,
        parent_width: f32,
    ) -> Result<NodeId> {
        // Paragraph-like blocks whose children are all inline text become a
        // single wrapped text leaf so spans flow together.
        let is_paragraph = matches!(tag, Tag::P | Tag::H1 | Tag::H2 | Tag::H3);
        if is_paragraph && !children.is_empty() && Self::all_text_inline(children) {
            let raw: String = children.iter().map(Self::collect_inline_text).collect();
            let combined = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if !combined.is_empty() {
                return self.build_text_node(&combined, style, Some(style), parent_width);
            }
        }

        let my_width = resolved_width(style, parent_width).unwrap_or(parent_width);
        let inner_width = (my_width
            - style.padding_left
            - style.padding_right
            - 2.0 * style.border_width)
            .max(1.0);

        let widths = self.child_widths(tag, style, children, inner_width);

        let mut child_nodes = Vec::with_capacity(children.len());
        let mut list_counter = 0u32;
        for (child, &width) in children.iter().zip(&widths) {
            let child_width = match child {
                StyledNode::Element { tag: Tag::Td | Tag::Th, style: cs, .. } => {
                    (width - cs.padding_left - cs.padding_right - 2.0 * cs.border_width).max(1.0)
                }
                _ => width,
            };
            let child_id = self.build_node(child, child_width)?;

            if let StyledNode::Element { tag: Tag::Li, .. } = child {
                list_counter += 1;
                let marker = if *tag == Tag::Ol {
                    format!("{list_counter}. ")
                } else {
                    "\u{2022} ".to_string()
                };
                self.node_content
                    .insert(child_id, BoxContent::ListItem { marker });
            }
            child_nodes.push(child_id);
        }

        let mut effective = style.clone();
        if *tag == Tag::Img {
            let src = attrs.get("src").map(String::as_str).unwrap_or("");
            if let Some(resolved) = resolve_img_auto_dimensions(src, style, parent_width) {
                effective = resolved;
            }
        }

        let taffy_style = computed_to_taffy(&effective, tag);
        let node = self
            .taffy
            .new_with_children(taffy_style, &child_nodes)
            .map_err(taffy_err)?;
        self.node_styles.insert(node, effective);

        if *tag == Tag::Img {
            let src = attrs.get("src").cloned().unwrap_or_default();
            self.node_content.insert(node, BoxContent::Image { src });
        }
        Ok(node)
    }

    /// Extract positioned boxes after layout computation.
    fn extract(&self, node: NodeId, offset_x: f32, offset_y: f32) -> Result<PositionedBox> {
        let layout = self.taffy.layout(node).map_err(taffy_err)?;
        let style = self.node_styles.get(&node).cloned().unwrap_or_default();
        let content = self
            .node_content
            .get(&node)
            .cloned()
            .unwrap_or(BoxContent::None);

        let x = offset_x + layout.location.x;
        let y = offset_y + layout.location.y;

        let children = self
            .taffy
            .children(node)
            .map_err(taffy_err)?
            .into_iter()
            .map(|child| self.extract(child, x, y))
            .collect::<Result<Vec<_>>>()?;

        Ok(PositionedBox {
            x,
            y,
            width: layout.size.width,
            height: layout.size.height,
            style,
            content,
            children,
        })
    }
}

fn computed_to_taffy(s: &ComputedStyle, tag: &Tag) -> Style {
    let mut ts = Style::default();

    match tag {
        Tag::Table => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.size.width = dim_to_taffy(s.width);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            ts.padding = padding_of(s);
            ts.margin = margin_of(s);
            ts.border = border_of(s);
            return ts;
        }
        Tag::Tr => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.align_items = Some(taffy::AlignItems::Stretch);
            ts.size.width = taffy::Dimension::Percent(1.0);
            ts.min_size.width = taffy::Dimension::Length(0.0);
            return ts;
        }
        Tag::Td | Tag::Th => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
            ts.min_size.width = taffy::Dimension::Length(0.0);
            match s.width {
                style::Dimension::Px(w) => {
                    ts.flex_grow = 0.0;
                    ts.flex_shrink = 1.0;
                    ts.flex_basis = taffy::Dimension::Length(w);
                }
                style::Dimension::Percent(p) => {
                    ts.flex_grow = 0.0;
                    ts.flex_shrink = 1.0;
                    ts.flex_basis = taffy::Dimension::Percent(p / 100.0);
                }
                style::Dimension::Auto => {
                    // equal share of the remaining width
                    ts.flex_grow = 1.0;
                    ts.flex_shrink = 1.0;
                    ts.flex_basis = taffy::Dimension::Length(0.0);
                }
            }
            ts.padding = padding_of(s);
            ts.border = border_of(s);
            return ts;
        }
        _ => {}
    }

    match s.display {
        style::Display::Flex => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = match s.flex_direction {
                style::FlexDirection::Row => taffy::FlexDirection::Row,
                style::FlexDirection::Column => taffy::FlexDirection::Column,
            };
            ts.justify_content = Some(match s.justify_content {
                style::JustifyContent::Start => taffy::JustifyContent::Start,
                style::JustifyContent::End => taffy::JustifyContent::End,
                style::JustifyContent::Center => taffy::JustifyContent::Center,
                style::JustifyContent::SpaceBetween => taffy::JustifyContent::SpaceBetween,
            });
            ts.align_items = Some(match s.align_items {
                style::AlignItems::Start => taffy::AlignItems::Start,
                style::AlignItems::End => taffy::AlignItems::End,
                style::AlignItems::Center => taffy::AlignItems::Center,
                style::AlignItems::Stretch => taffy::AlignItems::Stretch,
            });
        }
        style::Display::Inline => {
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Row;
            ts.flex_wrap = taffy::FlexWrap::Wrap;
        }
        style::Display::None => ts.display = taffy::Display::None,
        _ => {
            // Block-level: vertical stacking.
            ts.display = taffy::Display::Flex;
            ts.flex_direction = taffy::FlexDirection::Column;
        }
    }

    ts.size = Size {
        width: dim_to_taffy(s.width),
        height: dim_to_taffy(s.height),
    };
    if s.flex_grow > 0.0 {
        ts.min_size.width = taffy::Dimension::Length(0.0);
    }
    ts.flex_grow = s.flex_grow;
    ts.flex_shrink = s.flex_shrink;
    ts.margin = margin_of(s);
    ts.padding = padding_of(s);
    ts.border = border_of(s);
    ts.gap = Size {
        width: LengthPercentage::Length(s.gap),
        height: LengthPercentage::Length(s.gap),
    };
    ts
}

// ---------------------------------------------------------------------------
// Image intrinsic-size helper
// ---------------------------------------------------------------------------

/// Replace `Auto` width/height on an `<img>` with concrete values derived
/// from the decoded image. Returns `None` when nothing needs fixing or the
/// source cannot be decoded.
fn resolve_img_auto_dimensions(
    src: &str,
    style: &ComputedStyle,
    parent_width: f32,
) -> Option<ComputedStyle> {
    let known_w = resolved_width(style, parent_width);
    let known_h = match style.height {
        style::Dimension::Px(v) => Some(v),
        _ => None,
    };
    if known_w.is_some() && known_h.is_some() {
        return None;
    }

    let bytes = parse_data_uri(src).ok()?.bytes;
    let img = ::image::load_from_memory(&bytes).ok()?;
    let (px_w, px_h) = (img.width() as f32, img.height() as f32);
    if px_w == 0.0 || px_h == 0.0 {
        return None;
    }
    let aspect = px_w / px_h;

    let mut s = style.clone();
    match (known_w, known_h) {
        (Some(w), None) => s.height = style::Dimension::Px((w / aspect).max(1.0)),
        (None, Some(h)) => s.width = style::Dimension::Px((h * aspect).max(1.0)),
        // 1 px = 1 pt
        (None, None) => {
            s.width = style::Dimension::Px(px_w);
            s.height = style::Dimension::Px(px_h);
        }
        (Some(_), Some(_)) => return None,
    }
    Some(s)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Compute layout for a styled tree, returning the top-level positioned
/// boxes in document coordinates (x already includes the page margin).
pub fn compute_layout(
    styled_nodes: &[StyledNode],
    page_width: f32,
    page_margin: f32,
    fonts: &FontManager,
) -> Result<Vec<PositionedBox>> {
    let content_width = page_width - 2.0 * page_margin;
    let mut builder = LayoutBuilder::new(fonts, content_width);

    let child_ids = styled_nodes
        .iter()
        .map(|node| builder.build_node(node, content_width))
        .collect::<Result<Vec<_>>>()?;

    let root_style = Style {
        display: taffy::Display::Flex,
        flex_direction: taffy::FlexDirection::Column,
        size: Size {
            width: taffy::Dimension::Length(content_width),
            height: taffy::Dimension::Auto,
        },
        ..Default::default()
    };
    let root = builder
        .taffy
        .new_with_children(root_style, &child_ids)
        .map_err(taffy_err)?;

    builder
        .taffy
        .compute_layout(
            root,
            Size {
                width: AvailableSpace::Definite(content_width),
                height: AvailableSpace::MaxContent,
            },
        )
        .map_err(taffy_err)?;

    Ok(builder.extract(root, page_margin, 0.0)?.children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::style::build_styled_tree;

    fn layout(html: &str) -> Vec<PositionedBox> {
        let styled = build_styled_tree(&parse_html(html), None);
        compute_layout(&styled, 595.0, 40.0, &FontManager::default()).unwrap()
    }

    #[test]
    fn layout_simple_paragraph() {
        let boxes = layout("<p>Hello world</p>");
        assert!(!boxes.is_empty());
        assert!(boxes[0].width > 0.0);
        assert!(boxes[0].height > 0.0);
    }

    #[test]
    fn fixed_width_cells_keep_their_width() {
        let boxes = layout(
            r#"<table><tr><td style="width: 40px">1</td><td style="width: 240px">Bolt</td></tr></table>"#,
        );
        let row = &boxes[0].children[0];
        assert_eq!(row.children.len(), 2);
        assert!((row.children[0].width - 40.0).abs() < 0.5, "{}", row.children[0].width);
        assert!((row.children[1].width - 240.0).abs() < 0.5, "{}", row.children[1].width);
    }

    #[test]
    fn centered_text_spans_its_cell() {
        let boxes = layout(
            r#"<table><tr><td style="width: 80px; text-align: center; padding: 3px 5px">7</td></tr></table>"#,
        );
        let cell = &boxes[0].children[0].children[0];
        let text = &cell.children[0];
        assert!(matches!(text.content, BoxContent::Text { .. }));
        // 80 minus 2 × 5 padding minus 2 × 1 border
        assert!((text.width - 68.0).abs() < 0.5, "{}", text.width);
    }
}
