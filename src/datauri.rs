//! Base64 data URIs – the only image source the renderer embeds, and the form
//! signatures arrive in from the requisition form.

use base64::{engine::general_purpose::STANDARD as BASE64_STD, Engine as _};

use crate::error::{ForgeError, Result};

/// A decoded `data:<mime>;base64,<data>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Parse a `data:<mime>;base64,<data>` URI and decode its payload.
///
/// Returns `Err` if `src` is not a data URI or does not use base64 encoding.
pub fn parse_data_uri(src: &str) -> Result<DataUri> {
    let Some(rest) = src.strip_prefix("data:") else {
        let preview: String = src.chars().take(80).collect();
        return Err(ForgeError::Image(format!(
            "image src must be a base64 data URI (e.g. `data:image/png;base64,...`), got {preview:?}"
        )));
    };
    let (header, data) = rest.split_once(',').ok_or_else(|| {
        ForgeError::Image("invalid data URI: missing `,` between header and data".to_string())
    })?;
    let Some(mime_type) = header.strip_suffix(";base64") else {
        return Err(ForgeError::Image(
            "only base64-encoded data URIs are supported".to_string(),
        ));
    };
    Ok(DataUri {
        mime_type: mime_type.to_string(),
        bytes: decode_base64(data)?,
    })
}

/// Drop an embedded media-type prefix: everything up to and including the
/// first comma. A bare base64 payload is returned unchanged.
pub fn strip_media_prefix(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data.trim(),
        None => payload.trim(),
    }
}

/// Decode standard base64, ignoring embedded whitespace (line-wrapped
/// payloads are common in form posts).
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64_STD
        .decode(compact)
        .map_err(|e| ForgeError::Image(format!("base64 decode error: {e}")))
}

/// Build a data URI from raw bytes.
pub fn to_data_uri(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", BASE64_STD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIXEL: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    #[test]
    fn parses_png_data_uri() {
        let uri = parse_data_uri(&format!("data:image/png;base64,{PIXEL}")).unwrap();
        assert_eq!(uri.mime_type, "image/png");
        assert_eq!(&uri.bytes[1..4], b"PNG");
    }

    #[test]
    fn rejects_plain_urls_and_non_base64() {
        assert!(parse_data_uri("logo.png").is_err());
        assert!(parse_data_uri("data:text/plain,hello").is_err());
    }

    #[test]
    fn strips_any_media_prefix() {
        assert_eq!(strip_media_prefix("data:image/jpeg;base64,AAAA"), "AAAA");
        assert_eq!(strip_media_prefix("  AAAA \n"), "AAAA");
    }

    #[test]
    fn round_trips_through_to_data_uri() {
        let bytes = decode_base64(PIXEL).unwrap();
        let uri = to_data_uri("image/png", &bytes);
        assert_eq!(parse_data_uri(&uri).unwrap().bytes, bytes);
    }
}
