//! Signature compositing at the `{{REQUESTED_BY_SIGNATURE}}` anchor: a small
//! transparent spacer followed by the requester's signature image.

use crate::datauri::{decode_base64, strip_media_prefix, to_data_uri};
use crate::dom::{children_at_mut, node_at_mut, DomNode, ElementNode, NodePath, Tag};
use crate::error::{ForgeError, Result};
use crate::placeholder::SIGNATURE_ANCHOR;
use crate::template::WorkingDocument;

/// 1×1 fully transparent PNG.
pub const SPACER_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

pub const SPACER_SIZE: (f32, f32) = (95.0, 8.0);
pub const SIGNATURE_SIZE: (f32, f32) = (150.0, 55.0);

/// A validated signature, ready to embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SignatureImage {
    pub fn data_uri(&self) -> String {
        to_data_uri(&self.mime_type, &self.bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureOutcome {
    /// Spacer and signature inserted at the anchor.
    Inserted,
    /// No signature supplied; the anchor was cleared.
    Cleared,
    /// The signature did not decode; the anchor was cleared without images.
    Rejected(String),
    /// The template has no signature anchor.
    NoAnchor,
}

/// Strip any media-type prefix, base64-decode and check the bytes are an
/// image we can embed.
pub fn decode_signature(payload: &str) -> Result<SignatureImage> {
    let bytes = decode_base64(strip_media_prefix(payload))?;
    let format = ::image::guess_format(&bytes)
        .map_err(|e| ForgeError::Image(format!("signature is not an image: {e}")))?;
    ::image::load_from_memory_with_format(&bytes, format)
        .map_err(|e| ForgeError::Image(format!("signature does not decode: {e}")))?;
    Ok(SignatureImage {
        mime_type: format.to_mime_type().to_string(),
        bytes,
    })
}

fn sized_img(src: String, (width, height): (f32, f32)) -> DomNode {
    DomNode::Element(
        ElementNode::new(Tag::Img)
            .with_attr("src", src)
            .with_attr("style", format!("width: {width}px; height: {height}px")),
    )
}

/// Clear the `{{REQUESTED_BY_SIGNATURE}}` text node at `anchor` and, when
/// `signature` decodes, insert the spacer and the signature just before it.
pub fn composite_signature(
    doc: &mut WorkingDocument,
    anchor: Option<&NodePath>,
    signature: Option<&str>,
) -> Result<SignatureOutcome> {
    let nodes = doc.body_mut()?;
    let Some(anchor) = anchor else {
        return Ok(SignatureOutcome::NoAnchor);
    };

    match node_at_mut(nodes, anchor) {
        Some(DomNode::Text(text)) if text.contains(SIGNATURE_ANCHOR) => text.clear(),
        _ => return Err(ForgeError::StaleAnchor(anchor.to_string())),
    }

    let image = match signature.map(decode_signature) {
        None => return Ok(SignatureOutcome::Cleared),
        Some(Err(e)) => {
            log::warn!("signature skipped: {e}");
            return Ok(SignatureOutcome::Rejected(e.to_string()));
        }
        Some(Ok(image)) => image,
    };

    let parent = anchor.parent().unwrap_or_default();
    let index = anchor
        .index()
        .ok_or_else(|| ForgeError::StaleAnchor(anchor.to_string()))?;
    let siblings = children_at_mut(nodes, &parent).ok_or_else(|| ForgeError::StaleAnchor(anchor.to_string()))?;
    siblings.insert(index, sized_img(to_data_uri("image/png", &spacer_bytes()?), SPACER_SIZE));
    siblings.insert(index + 1, sized_img(image.data_uri(), SIGNATURE_SIZE));
    Ok(SignatureOutcome::Inserted)
}

fn spacer_bytes() -> Result<Vec<u8>> {
    decode_base64(SPACER_PNG)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{find_text, parse_html, to_html};

    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    fn sign(d: &mut WorkingDocument, payload: Option<&str>) -> SignatureOutcome {
        let anchor = find_text(&d.nodes, SIGNATURE_ANCHOR);
        composite_signature(d, anchor.as_ref(), payload).unwrap()
    }

    fn doc(html: &str) -> WorkingDocument {
        WorkingDocument {
            id: "w".into(),
            name: "w".into(),
            nodes: parse_html(html),
            corrupt: None,
        }
    }

    fn imgs(d: &WorkingDocument) -> Vec<(String, String)> {
        let p = d.nodes[0].as_element().unwrap();
        p.children
            .iter()
            .filter_map(DomNode::as_element)
            .map(|e| (e.src().unwrap_or("").to_string(), e.inline_style().unwrap_or("").to_string()))
            .collect()
    }

    #[test]
    fn spacer_is_a_valid_image() {
        assert!(decode_signature(SPACER_PNG).is_ok());
    }

    #[test]
    fn inserts_spacer_then_signature() {
        let mut d = doc("<p>{{REQUESTED_BY_SIGNATURE}}</p>");
        let payload = format!("data:image/png;base64,{PIXEL}");
        let outcome = sign(&mut d, Some(&payload));
        assert_eq!(outcome, SignatureOutcome::Inserted);

        let images = imgs(&d);
        assert_eq!(images.len(), 2);
        assert!(images[0].0.ends_with(SPACER_PNG));
        assert_eq!(images[0].1, "width: 95px; height: 8px");
        assert!(images[1].0.starts_with("data:image/png;base64,"));
        assert_eq!(images[1].1, "width: 150px; height: 55px");
        // emptied anchor stays last
        assert_eq!(d.nodes[0].as_element().unwrap().children[2], DomNode::text(""));
    }

    #[test]
    fn bare_base64_payload_is_accepted() {
        let mut d = doc("<p>{{REQUESTED_BY_SIGNATURE}}</p>");
        assert_eq!(
            sign(&mut d, Some(PIXEL)),
            SignatureOutcome::Inserted
        );
    }

    #[test]
    fn absent_signature_clears_anchor() {
        let mut d = doc("<p>{{REQUESTED_BY_SIGNATURE}}</p>");
        assert_eq!(sign(&mut d, None), SignatureOutcome::Cleared);
        assert_eq!(to_html(&d.nodes), "<p></p>");
    }

    #[test]
    fn garbage_signature_is_rejected_without_images() {
        let mut d = doc("<p>{{REQUESTED_BY_SIGNATURE}}</p>");
        let outcome = sign(&mut d, Some("data:image/png;base64,aGVsbG8="));
        assert!(matches!(outcome, SignatureOutcome::Rejected(_)));
        assert!(imgs(&d).is_empty());
        assert_eq!(to_html(&d.nodes), "<p></p>");
    }

    #[test]
    fn stale_anchor_is_an_error() {
        let mut d = doc("<p>{{REQUESTED_BY_SIGNATURE}}</p><p>Ana</p>");
        let stale = NodePath::new(vec![1, 0]);
        let result = composite_signature(&mut d, Some(&stale), Some(PIXEL));
        assert!(matches!(result, Err(ForgeError::StaleAnchor(_))));
        assert_eq!(to_html(&d.nodes), "<p>{{REQUESTED_BY_SIGNATURE}}</p><p>Ana</p>");
    }

    #[test]
    fn missing_anchor_leaves_document_alone() {
        let mut d = doc("<p>Signed</p>");
        assert_eq!(
            sign(&mut d, Some(PIXEL)),
            SignatureOutcome::NoAnchor
        );
        assert_eq!(to_html(&d.nodes), "<p>Signed</p>");
    }
}
