//! Pagination – splits a flat list of positioned boxes into pages.
//!
//! Handles:
//! - page boundaries for the configured page size
//! - page-break-before / page-break-after hints
//! - splitting tables between rows, so a long item list continues on the
//!   next page instead of being pushed whole
//! - per-line alignment offsets for centred and right-aligned text

use crate::fonts::FontManager;
use crate::layout::{BoxContent, PositionedBox};
use crate::layout_config::*;
use crate::style::{self, ComputedStyle};

/// Default page margins in points.
pub const PAGE_MARGIN_PT: f32 = 40.0;

/// Recursively expand any pure-container box taller than a page so its
/// children can be split across pages individually.
fn flatten_for_pagination(boxes: &[PositionedBox], content_height: f32) -> Vec<&PositionedBox> {
    let mut result = Vec::new();
    for pbox in boxes {
        if pbox.height > content_height
            && matches!(pbox.content, BoxContent::None)
            && !pbox.children.is_empty()
            && !is_table_like(pbox)
        {
            result.extend(flatten_for_pagination(&pbox.children, content_height));
        } else {
            result.push(pbox);
        }
    }
    result
}

struct Pager {
    config: LayoutConfig,
    current: PageLayout,
    /// Document-space y at which the current page begins.
    page_start_doc_y: f32,
}

impl Pager {
    fn break_page(&mut self, next_start: f32) {
        let next = PageLayout {
            page_index: self.config.pages.len() + 1,
            boxes: Vec::new(),
        };
        self.config.pages.push(std::mem::replace(&mut self.current, next));
        self.page_start_doc_y = next_start;
    }

    fn y_on_page(&self, pbox: &PositionedBox) -> f32 {
        (pbox.y - self.page_start_doc_y).max(0.0)
    }
}

/// Convert positioned boxes into a paginated [`LayoutConfig`].
pub fn paginate(
    boxes: &[PositionedBox],
    page_width: f32,
    page_height: f32,
    page_margin: f32,
    fonts: &FontManager,
) -> LayoutConfig {
    let content_height = page_height - 2.0 * page_margin;
    let flat = flatten_for_pagination(boxes, content_height);

    let mut pager = Pager {
        config: LayoutConfig {
            page_width_pt: page_width,
            page_height_pt: page_height,
            ..LayoutConfig::a4()
        },
        current: PageLayout {
            page_index: 0,
            boxes: Vec::new(),
        },
        page_start_doc_y: 0.0,
    };

    for pbox in flat {
        if pbox.style.page_break_before && !pager.current.boxes.is_empty() {
            pager.break_page(pbox.y);
        }

        let box_bottom = pager.y_on_page(pbox) + pbox.height;
        if box_bottom > content_height {
            if is_table_like(pbox) && !pbox.style.page_break_inside_avoid {
                split_table_box(pbox, &mut pager, content_height, page_margin, fonts);
                continue;
            }
            if !pager.current.boxes.is_empty() {
                pager.break_page(pbox.y);
            }
        }

        let abs_y = page_margin + pager.y_on_page(pbox);
        pager
            .current
            .boxes
            .push(build_layout_box(pbox, pbox.x, abs_y, fonts));

        if pbox.style.page_break_after {
            pager.break_page(pbox.y + pbox.height);
        }
    }

    let mut config = pager.config;
    if !pager.current.boxes.is_empty() || config.pages.is_empty() {
        config.pages.push(pager.current);
    }
    config
}

fn is_table_like(pbox: &PositionedBox) -> bool {
    pbox.style.display == style::Display::Grid && !pbox.children.is_empty()
}

/// Place the rows of a table one at a time, breaking the page between rows.
/// The table's own border and background are dropped on split tables; each
/// cell still draws its own.
fn split_table_box(
    pbox: &PositionedBox,
    pager: &mut Pager,
    content_height: f32,
    page_margin: f32,
    fonts: &FontManager,
) {
    for row in &pbox.children {
        let bottom = pager.y_on_page(row) + row.height;
        if bottom > content_height && !pager.current.boxes.is_empty() {
            pager.break_page(row.y);
        }
        let abs_y = page_margin + pager.y_on_page(row);
        pager
            .current
            .boxes
            .push(build_layout_box(row, row.x, abs_y, fonts));
    }
}

fn rgba(c: &style::Color) -> [f32; 4] {
    [c.r, c.g, c.b, c.a]
}

fn alignment_of(s: &ComputedStyle) -> Alignment {
    match s.text_align {
        style::TextAlign::Left => Alignment::Left,
        style::TextAlign::Center => Alignment::Center,
        style::TextAlign::Right => Alignment::Right,
    }
}

/// X offset of a line inside its box for the given alignment.
fn line_offset(align: Alignment, inner_width: f32, line_width: f32) -> f32 {
    match align {
        Alignment::Left => 0.0,
        Alignment::Center => ((inner_width - line_width) / 2.0).max(0.0),
        Alignment::Right => (inner_width - line_width).max(0.0),
    }
}

/// Recursively build a LayoutBox tree where every box carries
/// page-absolute x/y coordinates (origin = top-left of the physical page).
///
/// `PositionedBox.y` values are document-space absolutes, so a child's
/// position on the page is `parent_abs_y + (child.y - parent.y)`. x values
/// already include the page margin.
fn build_layout_box(pbox: &PositionedBox, abs_x: f32, abs_y: f32, fonts: &FontManager) -> LayoutBox {
    let s = &pbox.style;
    let mut lb = LayoutBox::new(abs_x, abs_y, pbox.width, pbox.height);

    if !s.background_color.is_transparent() {
        lb.background_color = Some(rgba(&s.background_color));
    }
    if s.border_width > 0.5 {
        lb.border = Some(BorderStyle {
            width: s.border_width,
            color: rgba(&s.border_color),
        });
    }

    let bold = s.font_weight == style::FontWeight::Bold;
    let line_height = fonts.line_height_px(s.font_size, s.line_height);

    match &pbox.content {
        BoxContent::Text { lines } => {
            let align = alignment_of(s);
            let inner_width = (pbox.width - s.padding_left - s.padding_right).max(0.0);
            let text_lines = lines
                .iter()
                .enumerate()
                .map(|(i, line)| {
                    let w = fonts.measure_text_width(line, s.font_size, bold);
                    TextLine {
                        text: line.clone(),
                        x_offset: s.padding_left + line_offset(align, inner_width, w),
                        y_offset: s.padding_top + i as f32 * line_height,
                    }
                })
                .collect();

            lb.text = Some(TextContent {
                lines: text_lines,
                font_size: s.font_size,
                bold,
                italic: s.font_style == style::FontStyle::Italic,
                color: rgba(&s.color),
                line_height,
                align,
                underline: s.text_decoration == style::TextDecoration::Underline,
                list_marker: None,
            });
        }
        BoxContent::Image { src } => {
            lb.image = Some(ImageContent {
                src: src.clone(),
                width: pbox.width,
                height: pbox.height,
            });
        }
        BoxContent::ListItem { marker } => {
            // The marker is drawn left of the li box; its text comes from
            // the child boxes.
            lb.text = Some(TextContent {
                lines: Vec::new(),
                font_size: s.font_size,
                bold,
                italic: false,
                color: rgba(&s.color),
                line_height,
                align: Alignment::Left,
                underline: false,
                list_marker: Some(marker.clone()),
            });
        }
        BoxContent::None => {}
    }

    for child in &pbox.children {
        let child_abs_y = abs_y + (child.y - pbox.y);
        lb.children
            .push(build_layout_box(child, child.x, child_abs_y, fonts));
    }
    lb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;
    use crate::layout::compute_layout;
    use crate::style::build_styled_tree;

    fn paginate_html(html: &str) -> LayoutConfig {
        let styled = build_styled_tree(&parse_html(html), None);
        let fonts = FontManager::default();
        let boxes = compute_layout(&styled, 595.0, PAGE_MARGIN_PT, &fonts).unwrap();
        paginate(&boxes, 595.0, 842.0, PAGE_MARGIN_PT, &fonts)
    }

    #[test]
    fn single_page() {
        let config = paginate_html("<p>Short text</p>");
        assert_eq!(config.pages.len(), 1);
    }

    #[test]
    fn multiple_pages() {
        let html: String = (0..60)
            .map(|i| format!("<p>Paragraph {i} with some text</p>"))
            .collect();
        let config = paginate_html(&html);
        assert!(config.pages.len() > 1, "got {} pages", config.pages.len());
    }

    #[test]
    fn long_table_splits_between_rows() {
        let rows: String = (0..80)
            .map(|i| format!("<tr><td>{i}</td><td>Item {i}</td></tr>"))
            .collect();
        let config = paginate_html(&format!("<p>Header</p><table>{rows}</table>"));
        assert!(config.pages.len() > 1);
        // The second page starts with a row, not the whole table.
        let first = &config.pages[1].boxes[0];
        assert_eq!(first.children.len(), 2);
        assert!((first.y - PAGE_MARGIN_PT).abs() < 0.5);
    }

    #[test]
    fn right_aligned_line_is_offset() {
        let config = paginate_html(
            r#"<table><tr><td style="width: 80px; text-align: right; padding: 3px 5px">12.50</td></tr></table>"#,
        );
        let mut offsets = Vec::new();
        config.visit_boxes(&mut |b| {
            if let Some(t) = &b.text {
                offsets.extend(t.lines.iter().map(|l| l.x_offset));
                assert_eq!(t.align, Alignment::Right);
            }
        });
        assert_eq!(offsets.len(), 1);
        assert!(offsets[0] > 0.0);
    }
}
