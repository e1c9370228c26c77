//! Placeholder resolution – literal `{{TOKEN}}` substitution over every text
//! node of a working document.

use crate::dom::{find_text, for_each_text_mut, NodePath};
use crate::error::Result;
use crate::record::RequisitionRecord;
use crate::template::WorkingDocument;

pub const ITEMS_ANCHOR: &str = "{{ITEMS}}";
pub const SIGNATURE_ANCHOR: &str = "{{REQUESTED_BY_SIGNATURE}}";

/// Substitutable tokens. The two anchors are handled structurally by the
/// table and signature stages.
pub const TOKENS: [&str; 7] = [
    "{{BRANCH}}",
    "{{DATE}}",
    "{{TO}}",
    "{{PURPOSE}}",
    "{{TOTAL}}",
    "{{NOTES}}",
    "{{REQUESTED_BY}}",
];

/// Token → value pairs for a record, in [`TOKENS`] order.
pub fn token_values(record: &RequisitionRecord) -> Vec<(&'static str, &str)> {
    let values = [
        record.branch.as_str(),
        record.date.as_str(),
        record.to.as_str(),
        record.purpose.as_str(),
        record.total.as_str(),
        record.note.as_str(),
        record.requested_by.as_str(),
    ];
    TOKENS.into_iter().zip(values).collect()
}

/// Text nodes holding the two structural anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Anchors {
    pub items: Option<NodePath>,
    pub signature: Option<NodePath>,
}

/// Find the anchors in the template text. Must run before [`resolve`]:
/// substituted values are never searched for anchors.
pub fn locate_anchors(doc: &mut WorkingDocument) -> Result<Anchors> {
    let nodes = doc.body_mut()?;
    Ok(Anchors {
        items: find_text(nodes, ITEMS_ANCHOR),
        signature: find_text(nodes, SIGNATURE_ANCHOR),
    })
}

/// One left-to-right pass over `text`. Values are copied verbatim and never
/// rescanned. `None` when nothing matched.
fn substitute(text: &str, values: &[(&str, &str)]) -> Option<(String, usize)> {
    if !text.contains("{{") {
        return None;
    }
    let mut out = String::with_capacity(text.len());
    let mut hits = 0;
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(token, _)| tail.starts_with(token)) {
            Some((token, value)) => {
                out.push_str(value);
                rest = &tail[token.len()..];
                hits += 1;
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    (hits > 0).then_some((out, hits))
}

/// Replace each token occurrence with its value, inserted as-is. Returns
/// the number of replacements made.
pub fn resolve(doc: &mut WorkingDocument, values: &[(&str, &str)]) -> Result<usize> {
    let mut replaced = 0;
    for_each_text_mut(doc.body_mut()?, &mut |text| {
        if let Some((out, hits)) = substitute(text, values) {
            *text = out;
            replaced += hits;
        }
    });
    Ok(replaced)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{parse_html, to_html};

    fn doc(html: &str) -> WorkingDocument {
        WorkingDocument {
            id: "w".into(),
            name: "w".into(),
            nodes: parse_html(html),
            corrupt: None,
        }
    }

    #[test]
    fn replaces_every_occurrence_and_blanks_missing() {
        let mut d = doc("<p>{{BRANCH}} / {{BRANCH}}</p><p>{{NOTES}}</p><p>{{ITEMS}}</p>");
        let record = RequisitionRecord {
            branch: "MAIN".into(),
            ..Default::default()
        };
        let n = resolve(&mut d, &token_values(&record)).unwrap();
        assert_eq!(n, 3);
        assert_eq!(to_html(&d.nodes), "<p>MAIN / MAIN</p><p></p><p>{{ITEMS}}</p>");
    }

    #[test]
    fn values_are_never_substituted_again() {
        let mut d = doc("<p>{{TO}} | {{PURPOSE}} | {{BRANCH}}</p>");
        let values = [
            ("{{TO}}", "{{BRANCH}}"),
            ("{{PURPOSE}}", "{{BRANCH}} ref"),
            ("{{BRANCH}}", "X"),
        ];
        let n = resolve(&mut d, &values).unwrap();
        assert_eq!(n, 3);
        assert_eq!(to_html(&d.nodes), "<p>{{BRANCH}} | {{BRANCH}} ref | X</p>");
    }

    #[test]
    fn stray_braces_are_kept() {
        let mut d = doc("<p>{{{BRANCH}} {{ }}</p>");
        let values = [("{{BRANCH}}", "MAIN")];
        assert_eq!(resolve(&mut d, &values).unwrap(), 1);
        assert_eq!(to_html(&d.nodes), "<p>{MAIN {{ }}</p>");
    }

    #[test]
    fn anchors_come_from_the_template_only() {
        let mut d = doc("<p>To: {{TO}}</p><div><p>{{ITEMS}}</p></div><p>{{REQUESTED_BY_SIGNATURE}}</p>");
        let anchors = locate_anchors(&mut d).unwrap();
        let record = RequisitionRecord {
            to: "{{ITEMS}}".into(),
            ..Default::default()
        };
        resolve(&mut d, &token_values(&record)).unwrap();

        assert_eq!(anchors.items, Some(NodePath::new(vec![1, 0, 0])));
        assert_eq!(anchors.signature, Some(NodePath::new(vec![2, 0])));
        assert_eq!(find_text(&d.nodes, ITEMS_ANCHOR), Some(NodePath::new(vec![0, 0])));
    }

    #[test]
    fn signature_token_is_not_clobbered_by_requested_by() {
        let mut d = doc("<p>{{REQUESTED_BY_SIGNATURE}}</p><p>{{REQUESTED_BY}}</p>");
        let record = RequisitionRecord {
            requested_by: "Ana".into(),
            ..Default::default()
        };
        resolve(&mut d, &token_values(&record)).unwrap();
        assert_eq!(to_html(&d.nodes), "<p>{{REQUESTED_BY_SIGNATURE}}</p><p>Ana</p>");
    }

    #[test]
    fn corrupt_document_fails() {
        let mut d = doc("");
        d.corrupt = Some("bad bytes".into());
        assert!(resolve(&mut d, &[]).is_err());
    }
}
