//! Line-item table: synthesis at the `{{ITEMS}}` anchor and the per-column
//! cell formatting applied afterwards.

use crate::dom::{children_at_mut, containing_block, node_at, node_at_mut, DomNode, ElementNode, NodePath, Tag};
use crate::error::{ForgeError, Result};
use crate::placeholder::ITEMS_ANCHOR;
use crate::record::RequisitionRecord;
use crate::style::TextAlign;
use crate::template::WorkingDocument;

pub const COLUMN_LABELS: [&str; 5] = ["Qty", "Unit", "Description", "UPrice", "Amount"];

pub const TABLE_STYLE: &str = "border-width: 1px; font-size: 9px";
pub const HEADER_SHADING: &str = "#f0f0f0";
pub const CELL_PADDING: &str = "3px 5px";

/// Formatting rule of one column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnRule {
    pub width: f32,
    pub header_align: TextAlign,
    pub body_align: TextAlign,
}

const fn rule(width: f32, align: TextAlign) -> ColumnRule {
    ColumnRule {
        width,
        header_align: align,
        body_align: align,
    }
}

pub const COLUMN_RULES: [ColumnRule; 5] = [
    rule(40.0, TextAlign::Center),
    rule(60.0, TextAlign::Center),
    rule(240.0, TextAlign::Left),
    rule(80.0, TextAlign::Center),
    rule(80.0, TextAlign::Center),
];

/// Header, one row per item in input order, then the total row.
pub fn row_matrix(record: &RequisitionRecord) -> Vec<Vec<String>> {
    let mut rows = Vec::with_capacity(record.items.len() + 2);
    rows.push(COLUMN_LABELS.iter().map(|l| l.to_string()).collect());
    for item in &record.items {
        rows.push(vec![
            item.qty.clone(),
            item.unit.clone(),
            item.description.clone(),
            item.unit_price.clone(),
            item.amount.clone(),
        ]);
    }
    let mut footer = vec![String::new(); 3];
    footer.push("Total".to_string());
    footer.push(record.total.clone());
    rows.push(footer);
    rows
}

/// A `<table>` for the matrix; row 0 uses header cells.
pub fn build_table(matrix: &[Vec<String>]) -> ElementNode {
    let rows = matrix
        .iter()
        .enumerate()
        .map(|(r, cells)| {
            let tag = if r == 0 { Tag::Th } else { Tag::Td };
            let cells = cells
                .iter()
                .map(|value| {
                    DomNode::Element(
                        ElementNode::new(tag.clone()).with_children(vec![DomNode::text(value.clone())]),
                    )
                })
                .collect();
            DomNode::Element(ElementNode::new(Tag::Tr).with_children(cells))
        })
        .collect();
    ElementNode::new(Tag::Table)
        .with_attr("style", TABLE_STYLE)
        .with_children(rows)
}

/// Insert the item table after the containing block of the `{{ITEMS}}` text
/// node at `anchor` and clear that node. Returns the table's path, or `None`
/// if there is no anchor.
pub fn insert_items_table(
    doc: &mut WorkingDocument,
    record: &RequisitionRecord,
    anchor: Option<&NodePath>,
) -> Result<Option<NodePath>> {
    let nodes = doc.body_mut()?;
    let Some(anchor) = anchor else {
        return Ok(None);
    };
    match node_at(nodes, anchor) {
        Some(DomNode::Text(text)) if text.contains(ITEMS_ANCHOR) => {}
        _ => return Err(ForgeError::StaleAnchor(anchor.to_string())),
    }
    let block = containing_block(nodes, anchor);
    let parent = block.parent().unwrap_or_default();
    let position = block
        .index()
        .ok_or_else(|| ForgeError::StaleAnchor(anchor.to_string()))?
        + 1;

    let table = build_table(&row_matrix(record));
    let siblings = children_at_mut(nodes, &parent).ok_or_else(|| ForgeError::StaleAnchor(block.to_string()))?;
    let position = position.min(siblings.len());
    siblings.insert(position, DomNode::Element(table));

    match node_at_mut(nodes, anchor) {
        Some(DomNode::Text(text)) => text.clear(),
        _ => return Err(ForgeError::StaleAnchor(anchor.to_string())),
    }
    Ok(Some(parent.child(position)))
}

/// Outcome of formatting a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormatReport {
    /// Cells every rule was applied to.
    pub formatted: usize,
    /// Operations that were skipped, with the reason.
    pub skipped: Vec<String>,
}

fn require_cell(cell: &ElementNode, operation: &'static str) -> Result<()> {
    if cell.tag.is_cell() {
        Ok(())
    } else {
        Err(ForgeError::UnsupportedCell {
            operation,
            tag: cell.tag.name().to_string(),
        })
    }
}

pub fn set_width(cell: &mut ElementNode, width: f32) -> Result<()> {
    require_cell(cell, "width")?;
    if !(width.is_finite() && width > 0.0) {
        return Err(ForgeError::InvalidStyle {
            property: "width",
            value: width.to_string(),
        });
    }
    cell.set_style("width", &format!("{width}px"));
    Ok(())
}

pub fn set_background(cell: &mut ElementNode, color: &str) -> Result<()> {
    require_cell(cell, "background")?;
    if crate::style::Color::from_hex(color).is_none() {
        return Err(ForgeError::InvalidStyle {
            property: "background-color",
            value: color.to_string(),
        });
    }
    cell.set_style("background-color", color);
    Ok(())
}

/// Apply the column rules to every cell of the table at `table`. Width and
/// background failures are logged and skipped per cell.
pub fn format_table(doc: &mut WorkingDocument, table: &NodePath) -> Result<FormatReport> {
    let nodes = doc.body_mut()?;
    let Some(DomNode::Element(table_el)) = node_at_mut(nodes, table) else {
        return Err(ForgeError::StaleAnchor(table.to_string()));
    };

    let mut report = FormatReport::default();
    let rows = table_el
        .children
        .iter_mut()
        .filter_map(DomNode::as_element_mut)
        .filter(|e| e.tag == Tag::Tr);
    for (r, row) in rows.enumerate() {
        let header = r == 0;
        let cells = row.children.iter_mut().filter_map(DomNode::as_element_mut);
        for (c, cell) in cells.enumerate() {
            let Some(rule) = COLUMN_RULES.get(c) else {
                continue;
            };
            let align = if header { rule.header_align } else { rule.body_align };
            cell.set_style("text-align", align.as_css());
            cell.set_style("padding", CELL_PADDING);

            let mut outcomes = vec![set_width(cell, rule.width)];
            if header {
                cell.set_style("font-weight", "bold");
                outcomes.push(set_background(cell, HEADER_SHADING));
            }

            let mut clean = true;
            for err in outcomes.into_iter().filter_map(|o| o.err()) {
                log::warn!("cell ({r}, {c}): {err}");
                report.skipped.push(format!("({r}, {c}): {err}"));
                clean = false;
            }
            if clean {
                report.formatted += 1;
            }
        }
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_text, parse_html, to_html};
    use crate::record::LineItem;

    fn doc(html: &str) -> WorkingDocument {
        WorkingDocument {
            id: "w".into(),
            name: "w".into(),
            nodes: parse_html(html),
            corrupt: None,
        }
    }

    fn item(desc: &str) -> LineItem {
        LineItem {
            description: desc.into(),
            qty: "2".into(),
            unit: "pc".into(),
            unit_price: "5".into(),
            amount: "10".into(),
        }
    }

    fn items_anchor(d: &WorkingDocument) -> Option<NodePath> {
        find_text(&d.nodes, ITEMS_ANCHOR)
    }

    fn table_at<'a>(d: &'a WorkingDocument, path: &NodePath) -> &'a ElementNode {
        node_at(&d.nodes, path).and_then(DomNode::as_element).unwrap()
    }

    #[test]
    fn matrix_has_header_items_and_total() {
        let record = RequisitionRecord {
            total: "20".into(),
            items: vec![item("Bolt"), item("Nut")],
            ..Default::default()
        };
        let m = row_matrix(&record);
        assert_eq!(m.len(), 4);
        assert_eq!(m[0], COLUMN_LABELS.map(String::from).to_vec());
        assert_eq!(m[2][2], "Nut");
        assert_eq!(m[3], vec!["", "", "", "Total", "20"]);
    }

    #[test]
    fn inserts_after_containing_paragraph_and_clears_anchor() {
        let mut d = doc("<div><p>Items: {{ITEMS}}</p><p>after</p></div>");
        let anchor = items_anchor(&d);
        let path = insert_items_table(&mut d, &RequisitionRecord::default(), anchor.as_ref())
            .unwrap()
            .unwrap();
        assert_eq!(path.indices(), &[0, 1]);
        let table = table_at(&d, &path);
        assert_eq!(table.tag, Tag::Table);
        assert_eq!(table.children.len(), 2);
        assert_eq!(table.style_value("font-size"), Some("9px"));
        let html = to_html(&d.nodes);
        assert!(html.starts_with("<div><p></p><table"));
        assert!(html.ends_with("</table><p>after</p></div>"));
    }

    #[test]
    fn missing_anchor_is_skipped() {
        let mut d = doc("<p>nothing here</p>");
        let anchor = items_anchor(&d);
        assert_eq!(anchor, None);
        assert_eq!(insert_items_table(&mut d, &RequisitionRecord::default(), None).unwrap(), None);
    }

    #[test]
    fn anchor_directly_in_body_inserts_after_text() {
        let mut d = doc("<body>{{ITEMS}}</body>");
        let anchor = items_anchor(&d);
        let path = insert_items_table(&mut d, &RequisitionRecord::default(), anchor.as_ref())
            .unwrap()
            .unwrap();
        assert_eq!(path.indices(), &[0, 1]);
        assert_eq!(d.nodes[0].as_element().unwrap().children[0], DomNode::text(""));
    }

    #[test]
    fn formats_columns_and_header() {
        let mut d = doc("<p>{{ITEMS}}</p>");
        let record = RequisitionRecord {
            items: vec![item("Bolt")],
            ..Default::default()
        };
        let anchor = items_anchor(&d);
        let path = insert_items_table(&mut d, &record, anchor.as_ref()).unwrap().unwrap();
        let report = format_table(&mut d, &path).unwrap();
        assert_eq!(report.formatted, 15);
        assert!(report.skipped.is_empty());

        let table = table_at(&d, &path);
        let cell = move |r: usize, c: usize| table.children[r].as_element().unwrap().children[c].as_element().unwrap();
        assert_eq!(cell(0, 0).style_value("background-color"), Some(HEADER_SHADING));
        assert_eq!(cell(0, 2).style_value("font-weight"), Some("bold"));
        assert_eq!(cell(1, 2).style_value("text-align"), Some("left"));
        assert_eq!(cell(1, 2).style_value("width"), Some("240px"));
        for c in [0, 1, 3, 4] {
            assert_eq!(cell(1, c).style_value("text-align"), Some("center"));
        }
        assert_eq!(cell(2, 4).style_value("padding"), Some("3px 5px"));
        assert_eq!(cell(1, 0).style_value("background-color"), None);
    }

    #[test]
    fn anchor_must_still_hold_the_token() {
        let mut d = doc("<p>{{ITEMS}}</p><p>other</p>");
        let stale = NodePath::new(vec![1, 0]);
        let result = insert_items_table(&mut d, &RequisitionRecord::default(), Some(&stale));
        assert!(matches!(result, Err(ForgeError::StaleAnchor(_))));
        assert_eq!(to_html(&d.nodes), "<p>{{ITEMS}}</p><p>other</p>");
    }

    #[test]
    fn non_cell_is_skipped_not_fatal() {
        let mut d = doc("<table><tr><th>Qty</th><div>odd</div><th>Desc</th></tr></table>");
        let report = format_table(&mut d, &NodePath::new(vec![0])).unwrap();
        assert_eq!(report.formatted, 2);
        assert_eq!(report.skipped.len(), 2);
        assert!(report.skipped[0].contains("width"));
    }
}
