//! Requisition records – the loosely-typed form payload normalized once,
//! at the boundary, into strictly typed structs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ForgeError, Result};

/// One requested line. Every field is a display string; the amount is
/// trusted as given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub qty: String,
    pub unit: String,
    pub unit_price: String,
    pub amount: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequisitionRecord {
    pub branch: String,
    pub date: String,
    pub to: String,
    pub purpose: String,
    pub total: String,
    pub note: String,
    pub requested_by: String,
    /// Signature image, usually a `data:image/png;base64,...` URI.
    pub signature: Option<String>,
    pub items: Vec<LineItem>,
}

/// Parse and normalize a JSON record.
pub fn from_json_str(json: &str) -> Result<RequisitionRecord> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ForgeError::InvalidRecord(format!("not valid JSON: {e}")))?;
    normalize(&value)
}

/// Normalize a raw payload. The top level must be an object; everything
/// inside it is coerced leniently.
pub fn normalize(raw: &Value) -> Result<RequisitionRecord> {
    let obj = raw.as_object().ok_or_else(|| {
        ForgeError::InvalidRecord(format!("expected a JSON object, got {}", kind_of(raw)))
    })?;

    let items = match obj.get("items") {
        Some(Value::Array(entries)) => entries.iter().map(line_item).collect(),
        _ => Vec::new(),
    };

    let signature = field(obj, &["requested_by_signature", "signatureImage", "signature"]);
    Ok(RequisitionRecord {
        branch: field(obj, &["branch"]),
        date: field(obj, &["date"]),
        to: field(obj, &["to"]),
        purpose: field(obj, &["purpose"]),
        total: field(obj, &["total"]),
        note: field(obj, &["note", "notes"]),
        requested_by: field(obj, &["requested_by", "requestedBy"]),
        signature: (!signature.trim().is_empty()).then_some(signature),
        items,
    })
}

fn line_item(entry: &Value) -> LineItem {
    let Some(obj) = entry.as_object() else {
        return LineItem::default();
    };
    LineItem {
        description: field(obj, &["description"]),
        qty: field(obj, &["qty", "quantity"]),
        unit: field(obj, &["unit"]),
        unit_price: field(obj, &["uprice", "unit_price", "unitPrice"]),
        amount: field(obj, &["amount"]),
    }
}

/// First present key wins; numbers and booleans are rendered as text,
/// null/absent/structured values become `""`.
fn field(obj: &Map<String, Value>, keys: &[&str]) -> String {
    keys.iter()
        .find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
        .map(display)
        .unwrap_or_default()
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
