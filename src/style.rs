//! Style resolver – maps inline `style` declarations and a Tailwind-like
//! class subset to a flat [`ComputedStyle`] consumed by the layout engine.
//!
//! The merge stages write their formatting (cell widths, alignment, shading,
//! padding) as inline declarations, so the inline parser is the part every
//! synthesized table goes through.

use std::collections::HashMap;

use crate::dom::{DomNode, ElementNode, Tag};

/// Fully resolved style for a single element.
#[derive(Debug, Clone)]
pub struct ComputedStyle {
    // Display / layout
    pub display: Display,
    pub flex_direction: FlexDirection,
    pub flex_grow: f32,
    pub flex_shrink: f32,
    pub justify_content: JustifyContent,
    pub align_items: AlignItems,
    pub gap: f32,

    // Sizing
    pub width: Dimension,
    pub height: Dimension,

    // Spacing (pt)
    pub margin_top: f32,
    pub margin_right: f32,
    pub margin_bottom: f32,
    pub margin_left: f32,
    pub padding_top: f32,
    pub padding_right: f32,
    pub padding_bottom: f32,
    pub padding_left: f32,

    // Border
    pub border_width: f32,
    pub border_color: Color,

    // Typography (inherited)
    pub font_size: f32,
    pub font_weight: FontWeight,
    pub font_style: FontStyle,
    pub font_family: String,
    pub color: Color,
    pub text_align: TextAlign,
    pub line_height: f32,
    pub text_decoration: TextDecoration,

    pub background_color: Color,

    // Page break
    pub page_break_before: bool,
    pub page_break_after: bool,
    pub page_break_inside_avoid: bool,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        Self {
            display: Display::Block,
            flex_direction: FlexDirection::Row,
            flex_grow: 0.0,
            flex_shrink: 1.0,
            justify_content: JustifyContent::Start,
            align_items: AlignItems::Stretch,
            gap: 0.0,
            width: Dimension::Auto,
            height: Dimension::Auto,
            margin_top: 0.0,
            margin_right: 0.0,
            margin_bottom: 0.0,
            margin_left: 0.0,
            padding_top: 0.0,
            padding_right: 0.0,
            padding_bottom: 0.0,
            padding_left: 0.0,
            border_width: 0.0,
            border_color: Color::BLACK,
            font_size: 11.0,
            font_weight: FontWeight::Normal,
            font_style: FontStyle::Normal,
            font_family: "Helvetica".to_string(),
            color: Color::BLACK,
            text_align: TextAlign::Left,
            line_height: 1.3,
            text_decoration: TextDecoration::None,
            background_color: Color::TRANSPARENT,
            page_break_before: false,
            page_break_after: false,
            page_break_inside_avoid: false,
        }
    }
}

impl ComputedStyle {
    /// Copy the inherited (typographic) properties from `parent`.
    fn inherit_from(&mut self, parent: &ComputedStyle) {
        self.font_size = parent.font_size;
        self.font_weight = parent.font_weight;
        self.font_style = parent.font_style;
        self.font_family = parent.font_family.clone();
        self.color = parent.color;
        self.text_align = parent.text_align;
        self.line_height = parent.line_height;
        self.text_decoration = parent.text_decoration;
    }

    /// Style for a text run: inherited typography, no box model.
    pub fn for_text(&self) -> ComputedStyle {
        let mut s = ComputedStyle::default();
        s.inherit_from(self);
        s
    }
}

// ---------------------------------------------------------------------------
// Supporting enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Display {
    Block,
    Flex,
    /// Tables; the paginator splits these by row.
    Grid,
    Inline,
    InlineBlock,
    ListItem,
    TableRow,
    TableCell,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexDirection {
    Row,
    Column,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JustifyContent {
    Start,
    End,
    Center,
    SpaceBetween,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignItems {
    Start,
    End,
    Center,
    Stretch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontWeight {
    Normal,
    Bold,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontStyle {
    Normal,
    Italic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
    Right,
}

impl TextAlign {
    pub fn parse(val: &str) -> Option<Self> {
        match val.trim() {
            "left" | "start" => Some(TextAlign::Left),
            "center" => Some(TextAlign::Center),
            "right" | "end" => Some(TextAlign::Right),
            _ => None,
        }
    }

    pub fn as_css(&self) -> &'static str {
        match self {
            TextAlign::Left => "left",
            TextAlign::Center => "center",
            TextAlign::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextDecoration {
    None,
    Underline,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    Auto,
    Px(f32),
    Percent(f32),
}

/// RGBA colour (0.0 – 1.0).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const BLACK: Self = Self::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Self = Self::rgb(1.0, 1.0, 1.0);
    pub const TRANSPARENT: Self = Self {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub fn is_transparent(&self) -> bool {
        self.a < 0.001
    }

    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        let channel = |s: &str| u8::from_str_radix(s, 16).ok().map(|v| v as f32 / 255.0);
        match hex.len() {
            6 => Some(Self::rgb(
                channel(&hex[0..2])?,
                channel(&hex[2..4])?,
                channel(&hex[4..6])?,
            )),
            3 => Some(Self::rgb(
                channel(&hex[0..1].repeat(2))?,
                channel(&hex[1..2].repeat(2))?,
                channel(&hex[2..3].repeat(2))?,
            )),
            _ => None,
        }
    }

    /// Tailwind colour subset.
    fn named(name: &str) -> Option<Self> {
        Some(match name {
            "white" => Color::WHITE,
            "black" => Color::BLACK,
            "gray-100" => Self::rgb(0.953, 0.957, 0.961),
            "gray-200" => Self::rgb(0.898, 0.906, 0.922),
            "gray-300" => Self::rgb(0.831, 0.843, 0.871),
            "gray-500" => Self::rgb(0.424, 0.447, 0.502),
            "gray-700" => Self::rgb(0.216, 0.255, 0.318),
            "gray-900" => Self::rgb(0.067, 0.094, 0.153),
            "red-500" => Self::rgb(0.937, 0.267, 0.267),
            "blue-500" => Self::rgb(0.231, 0.510, 0.965),
            "green-500" => Self::rgb(0.133, 0.773, 0.369),
            _ => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Style resolution
// ---------------------------------------------------------------------------

/// Resolve the style for an element: inherited typography first, then tag
/// defaults, then classes, then inline declarations.
pub fn resolve_style(element: &ElementNode, parent: Option<&ComputedStyle>) -> ComputedStyle {
    let mut style = ComputedStyle::default();
    if let Some(p) = parent {
        style.inherit_from(p);
    }
    apply_tag_defaults(&mut style, &element.tag);

    for class in element.classes() {
        apply_class(&mut style, class);
    }
    if let Some(inline) = element.inline_style() {
        apply_inline_style(&mut style, inline);
    }
    style
}

fn apply_tag_defaults(s: &mut ComputedStyle, tag: &Tag) {
    match tag {
        Tag::H1 => {
            s.font_size = 22.0;
            s.font_weight = FontWeight::Bold;
            s.margin_bottom = 10.0;
        }
        Tag::H2 => {
            s.font_size = 17.0;
            s.font_weight = FontWeight::Bold;
            s.margin_bottom = 8.0;
        }
        Tag::H3 => {
            s.font_size = 14.0;
            s.font_weight = FontWeight::Bold;
            s.margin_bottom = 6.0;
        }
        Tag::P => s.margin_bottom = 6.0,
        Tag::Ul | Tag::Ol => {
            s.margin_bottom = 6.0;
            s.padding_left = 24.0;
        }
        Tag::Li => {
            s.display = Display::ListItem;
            s.margin_bottom = 3.0;
        }
        Tag::Table => {
            s.display = Display::Grid;
            s.margin_bottom = 8.0;
        }
        Tag::Tr => s.display = Display::TableRow,
        Tag::Td | Tag::Th => {
            s.display = Display::TableCell;
            s.padding_top = 4.0;
            s.padding_right = 8.0;
            s.padding_bottom = 4.0;
            s.padding_left = 8.0;
            s.border_width = 1.0;
            if *tag == Tag::Th {
                s.font_weight = FontWeight::Bold;
            }
        }
        Tag::Span => s.display = Display::Inline,
        Tag::Img => s.display = Display::InlineBlock,
        Tag::Div | Tag::Body | Tag::Html => {}
        Tag::Head | Tag::Unknown(_) => s.display = Display::None,
    }
}

/// Apply a single Tailwind utility class.
fn apply_class(s: &mut ComputedStyle, class: &str) {
    match class {
        "flex" => s.display = Display::Flex,
        "block" => s.display = Display::Block,
        "hidden" => s.display = Display::None,
        "flex-row" => s.flex_direction = FlexDirection::Row,
        "flex-col" => s.flex_direction = FlexDirection::Column,
        "flex-1" => {
            s.flex_grow = 1.0;
            s.flex_shrink = 1.0;
        }
        "justify-start" => s.justify_content = JustifyContent::Start,
        "justify-end" => s.justify_content = JustifyContent::End,
        "justify-center" => s.justify_content = JustifyContent::Center,
        "justify-between" => s.justify_content = JustifyContent::SpaceBetween,
        "items-start" => s.align_items = AlignItems::Start,
        "items-end" => s.align_items = AlignItems::End,
        "items-center" => s.align_items = AlignItems::Center,
        "font-bold" => s.font_weight = FontWeight::Bold,
        "font-normal" => s.font_weight = FontWeight::Normal,
        "italic" => s.font_style = FontStyle::Italic,
        "underline" => s.text_decoration = TextDecoration::Underline,
        "text-left" => s.text_align = TextAlign::Left,
        "text-center" => s.text_align = TextAlign::Center,
        "text-right" => s.text_align = TextAlign::Right,
        "text-xs" => s.font_size = 8.0,
        "text-sm" => s.font_size = 9.0,
        "text-base" => s.font_size = 11.0,
        "text-lg" => s.font_size = 13.0,
        "text-xl" => s.font_size = 16.0,
        "text-2xl" => s.font_size = 20.0,
        "w-full" => s.width = Dimension::Percent(100.0),
        "w-1/2" => s.width = Dimension::Percent(50.0),
        "border" => s.border_width = 1.0,
        "break-before" => s.page_break_before = true,
        "break-after" => s.page_break_after = true,
        "break-inside-avoid" => s.page_break_inside_avoid = true,
        _ => apply_scaled_class(s, class),
    }
}

/// `p-{n}`, `mt-{n}`, `gap-{n}`, `w-{n}`, `h-{n}` (1 unit = 4pt) and
/// `text-{color}` / `bg-{color}` / `border-{color}`.
fn apply_scaled_class(s: &mut ComputedStyle, class: &str) {
    if let Some(name) = class.strip_prefix("text-") {
        if let Some(c) = Color::named(name) {
            s.color = c;
        }
        return;
    }
    if let Some(name) = class.strip_prefix("bg-") {
        if let Some(c) = Color::named(name) {
            s.background_color = c;
        }
        return;
    }
    if let Some(name) = class.strip_prefix("border-") {
        if let Some(c) = Color::named(name) {
            s.border_color = c;
        }
        return;
    }

    let Some((prefix, value)) = class.rsplit_once('-') else {
        return;
    };
    let Ok(units) = value.parse::<f32>() else {
        return;
    };
    let v = units * 4.0;
    match prefix {
        "p" => set_box(&mut s.padding_top, &mut s.padding_right, &mut s.padding_bottom, &mut s.padding_left, [v; 4]),
        "px" => {
            s.padding_left = v;
            s.padding_right = v;
        }
        "py" => {
            s.padding_top = v;
            s.padding_bottom = v;
        }
        "pt" => s.padding_top = v,
        "pb" => s.padding_bottom = v,
        "m" => set_box(&mut s.margin_top, &mut s.margin_right, &mut s.margin_bottom, &mut s.margin_left, [v; 4]),
        "my" => {
            s.margin_top = v;
            s.margin_bottom = v;
        }
        "mt" => s.margin_top = v,
        "mb" => s.margin_bottom = v,
        "ml" => s.margin_left = v,
        "mr" => s.margin_right = v,
        "gap" => s.gap = v,
        "w" => s.width = Dimension::Px(v),
        "h" => s.height = Dimension::Px(v),
        _ => {}
    }
}

fn set_box(top: &mut f32, right: &mut f32, bottom: &mut f32, left: &mut f32, v: [f32; 4]) {
    *top = v[0];
    *right = v[1];
    *bottom = v[2];
    *left = v[3];
}

// ---------------------------------------------------------------------------
// Inline style parsing (limited subset)
// ---------------------------------------------------------------------------

pub fn apply_inline_style(s: &mut ComputedStyle, style_str: &str) {
    for decl in style_str.split(';') {
        if let Some((prop, val)) = decl.split_once(':') {
            apply_css_property(s, prop.trim(), val.trim());
        }
    }
}

fn apply_css_property(s: &mut ComputedStyle, prop: &str, val: &str) {
    match prop {
        "display" => match val {
            "flex" => s.display = Display::Flex,
            "block" => s.display = Display::Block,
            "inline-block" => s.display = Display::InlineBlock,
            "none" => s.display = Display::None,
            _ => {}
        },
        "flex-direction" => match val {
            "row" => s.flex_direction = FlexDirection::Row,
            "column" => s.flex_direction = FlexDirection::Column,
            _ => {}
        },
        "font-size" => {
            if let Some(px) = parse_px(val) {
                s.font_size = px;
            }
        }
        "font-weight" => {
            s.font_weight = match val {
                "bold" | "600" | "700" | "800" | "900" => FontWeight::Bold,
                _ => FontWeight::Normal,
            }
        }
        "font-style" => {
            s.font_style = if val == "italic" {
                FontStyle::Italic
            } else {
                FontStyle::Normal
            }
        }
        "color" => {
            if let Some(c) = Color::from_hex(val) {
                s.color = c;
            }
        }
        "background-color" | "background" => {
            if let Some(c) = Color::from_hex(val) {
                s.background_color = c;
            }
        }
        "text-align" => {
            if let Some(a) = TextAlign::parse(val) {
                s.text_align = a;
            }
        }
        "width" => s.width = parse_dimension(val),
        "height" => s.height = parse_dimension(val),
        "margin" => {
            if let Some(v) = parse_shorthand(val) {
                set_box(&mut s.margin_top, &mut s.margin_right, &mut s.margin_bottom, &mut s.margin_left, v);
            }
        }
        "margin-top" => set_px(&mut s.margin_top, val),
        "margin-right" => set_px(&mut s.margin_right, val),
        "margin-bottom" => set_px(&mut s.margin_bottom, val),
        "margin-left" => set_px(&mut s.margin_left, val),
        "padding" => {
            if let Some(v) = parse_shorthand(val) {
                set_box(&mut s.padding_top, &mut s.padding_right, &mut s.padding_bottom, &mut s.padding_left, v);
            }
        }
        "padding-top" => set_px(&mut s.padding_top, val),
        "padding-right" => set_px(&mut s.padding_right, val),
        "padding-bottom" => set_px(&mut s.padding_bottom, val),
        "padding-left" => set_px(&mut s.padding_left, val),
        "border-width" | "border" => set_px(&mut s.border_width, val),
        "border-color" => {
            if let Some(c) = Color::from_hex(val) {
                s.border_color = c;
            }
        }
        "line-height" => {
            if let Ok(v) = val.parse::<f32>() {
                s.line_height = v;
            } else if let Some(px) = parse_px(val) {
                s.line_height = px / s.font_size;
            }
        }
        "gap" => set_px(&mut s.gap, val),
        "page-break-before" | "break-before" => {
            s.page_break_before = matches!(val, "always" | "page")
        }
        "page-break-after" | "break-after" => s.page_break_after = matches!(val, "always" | "page"),
        "page-break-inside" => s.page_break_inside_avoid = val == "avoid",
        _ => {}
    }
}

fn set_px(target: &mut f32, val: &str) {
    if let Some(px) = parse_px(val) {
        *target = px;
    }
}

pub fn parse_px(s: &str) -> Option<f32> {
    let s = s.trim();
    let s = s
        .strip_suffix("px")
        .or_else(|| s.strip_suffix("pt"))
        .unwrap_or(s);
    s.trim().parse().ok()
}

fn parse_dimension(s: &str) -> Dimension {
    let s = s.trim();
    if s == "auto" {
        return Dimension::Auto;
    }
    if let Some(pct) = s.strip_suffix('%') {
        return pct
            .parse::<f32>()
            .map(Dimension::Percent)
            .unwrap_or(Dimension::Auto);
    }
    parse_px(s).map(Dimension::Px).unwrap_or(Dimension::Auto)
}

/// CSS box shorthand with one, two or four values (top right bottom left).
fn parse_shorthand(val: &str) -> Option<[f32; 4]> {
    let parts: Vec<f32> = val.split_whitespace().filter_map(parse_px).collect();
    match parts[..] {
        [a] => Some([a; 4]),
        [v, h] => Some([v, h, v, h]),
        [t, r, b, l] => Some([t, r, b, l]),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Styled DOM tree
// ---------------------------------------------------------------------------

/// A DOM node annotated with its computed style.
#[derive(Debug, Clone)]
pub enum StyledNode {
    Element {
        tag: Tag,
        style: ComputedStyle,
        children: Vec<StyledNode>,
        /// Element attributes, e.g. `src`.
        attrs: HashMap<String, String>,
    },
    Text {
        text: String,
        style: ComputedStyle,
    },
}

/// Build a styled tree from a DOM tree, resolving styles top-down. Empty
/// and whitespace-only text runs are dropped.
pub fn build_styled_tree(
    nodes: &[DomNode],
    parent_style: Option<&ComputedStyle>,
) -> Vec<StyledNode> {
    let mut result = Vec::new();
    for node in nodes {
        match node {
            DomNode::Element(e) => {
                let style = resolve_style(e, parent_style);
                let children = build_styled_tree(&e.children, Some(&style));
                result.push(StyledNode::Element {
                    tag: e.tag.clone(),
                    style,
                    children,
                    attrs: e.attributes.clone(),
                });
            }
            DomNode::Text(text) => {
                if !text.trim().is_empty() {
                    let style = parent_style
                        .map(ComputedStyle::for_text)
                        .unwrap_or_default();
                    result.push(StyledNode::Text {
                        text: text.clone(),
                        style,
                    });
                }
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_html;

    #[test]
    fn tailwind_padding() {
        let mut s = ComputedStyle::default();
        apply_class(&mut s, "p-4");
        assert_eq!(s.padding_top, 16.0);
        assert_eq!(s.padding_left, 16.0);
    }

    #[test]
    fn two_value_padding_shorthand() {
        let mut s = ComputedStyle::default();
        apply_inline_style(&mut s, "padding: 3px 5px; width: 40px; text-align: center");
        assert_eq!((s.padding_top, s.padding_right), (3.0, 5.0));
        assert_eq!((s.padding_bottom, s.padding_left), (3.0, 5.0));
        assert_eq!(s.width, Dimension::Px(40.0));
        assert_eq!(s.text_align, TextAlign::Center);
    }

    #[test]
    fn header_cell_stays_bold_under_normal_parent() {
        let dom = parse_html("<table><tr><th>Qty</th></tr></table>");
        let table = match &dom[0] {
            DomNode::Element(e) => e,
            _ => panic!("expected table"),
        };
        let table_style = resolve_style(table, None);
        let tr = table.children[0].as_element().unwrap();
        let tr_style = resolve_style(tr, Some(&table_style));
        let th = tr.children[0].as_element().unwrap();
        let th_style = resolve_style(th, Some(&tr_style));
        assert_eq!(th_style.font_weight, FontWeight::Bold);
    }

    #[test]
    fn text_inherits_alignment_but_not_box() {
        let dom = parse_html(r#"<td style="text-align: center; padding: 3px 5px">1</td>"#);
        let styled = build_styled_tree(&dom, None);
        let StyledNode::Element { children, .. } = &styled[0] else {
            panic!("expected element");
        };
        let StyledNode::Text { style, .. } = &children[0] else {
            panic!("expected text");
        };
        assert_eq!(style.text_align, TextAlign::Center);
        assert_eq!(style.padding_left, 0.0);
        assert_eq!(style.border_width, 0.0);
    }

    #[test]
    fn color_from_hex() {
        let c = Color::from_hex("#f0f0f0").unwrap();
        assert!((c.r - 0.941).abs() < 0.01);
        assert!(Color::from_hex("f0f0f0").is_none());
        assert!(Color::from_hex("#zzzzzz").is_none());
    }
}
