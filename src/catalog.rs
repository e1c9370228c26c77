//! Item catalog and branch list – read-only lookups loaded from JSON files.
//!
//! Catalog rows may be objects (`{"item_id", "description", "stock",
//! "unit"}`) or positional arrays in the same column order. Cells are read
//! leniently: numbers are rendered as text and missing cells are blank.

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ForgeError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CatalogRow {
    item_id: String,
    description: String,
    stock: String,
    unit: String,
}

/// A stock entry as returned by [`Catalog::stocks_full`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockEntry {
    pub item_id: String,
    pub description: String,
    pub stock: f64,
    pub unit: String,
}

#[derive(Debug, Clone, Default)]
pub struct Catalog {
    rows: Vec<CatalogRow>,
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Numeric stock; anything unparsable counts as zero.
fn stock_value(raw: &str) -> f64 {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

impl Catalog {
    pub fn from_value(value: &Value) -> Result<Self> {
        let entries = value
            .as_array()
            .ok_or_else(|| ForgeError::Config("catalog must be a JSON array".to_string()))?;
        let rows = entries
            .iter()
            .map(|entry| match entry {
                Value::Object(o) => CatalogRow {
                    item_id: cell_text(o.get("item_id").or_else(|| o.get("id"))),
                    description: cell_text(o.get("description")),
                    stock: cell_text(o.get("stock")),
                    unit: cell_text(o.get("unit")),
                },
                Value::Array(cells) => CatalogRow {
                    item_id: cell_text(cells.first()),
                    description: cell_text(cells.get(1)),
                    stock: cell_text(cells.get(2)),
                    unit: cell_text(cells.get(3)),
                },
                _ => CatalogRow::default(),
            })
            .collect();
        Ok(Self { rows })
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Self::from_value(&serde_json::from_str(json)?)
    }

    /// Load a catalog file; a missing file is an empty catalog.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("no catalog at {}", path.display());
            return Ok(Self::default());
        }
        Self::from_json_str(&std::fs::read_to_string(path)?)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Item id whose description matches (trimmed, case-insensitive), or
    /// `""` when nothing matches.
    pub fn find_id(&self, description: &str) -> String {
        let wanted = description.trim().to_uppercase();
        if wanted.is_empty() {
            return String::new();
        }
        self.rows
            .iter()
            .find(|r| r.description.trim().to_uppercase() == wanted)
            .map(|r| r.item_id.trim().to_string())
            .unwrap_or_default()
    }

    /// Description → stock. Rows with a blank description are skipped; a
    /// later row wins over an earlier one with the same description.
    pub fn running_stocks(&self) -> BTreeMap<String, f64> {
        self.rows
            .iter()
            .filter_map(|r| {
                let description = r.description.trim();
                (!description.is_empty()).then(|| (description.to_string(), stock_value(&r.stock)))
            })
            .collect()
    }

    pub fn stocks_full(&self) -> Vec<StockEntry> {
        self.rows
            .iter()
            .filter(|r| !r.description.trim().is_empty())
            .map(|r| StockEntry {
                item_id: r.item_id.trim().to_string(),
                description: r.description.trim().to_string(),
                stock: stock_value(&r.stock),
                unit: r.unit.trim().to_uppercase(),
            })
            .collect()
    }
}

/// Branch names, trimmed, non-blank and de-duplicated in first-seen order.
/// Entries may be strings or objects with a `branch` (or `name`) field.
pub fn branches(value: &Value) -> Vec<String> {
    let Some(entries) = value.as_array() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    entries
        .iter()
        .map(|entry| match entry {
            Value::Object(o) => cell_text(o.get("branch").or_else(|| o.get("name"))),
            other => cell_text(Some(other)),
        })
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty() && seen.insert(name.clone()))
        .collect()
}

/// Read a branch list file; a missing file has no branches.
pub fn load_branches(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let value: Value = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(branches(&value))
}
