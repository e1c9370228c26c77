//! Requisition ledger – one bucket of rows per branch (or the special
//! request bucket), each row one requested line item.
//!
//! [`FileLedger`] stores a bucket as a JSON-lines file: the first line is the
//! header, every following line is one row as a JSON array of cells.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::record::{LineItem, RequisitionRecord};

pub const LEDGER_HEADER: [&str; 17] = [
    "Timestamp",
    "Branch",
    "Date",
    "To",
    "Purpose",
    "ITEM_ID",
    "Qty",
    "Unit",
    "Description",
    "UPrice",
    "Amount",
    "Total",
    "Requested By",
    "Status",
    "Release Date",
    "Received By",
    "PDF URL",
];

pub const SPECIAL_REQUEST: &str = "SPECIAL REQUEST";
pub const GENERAL_BUCKET: &str = "GENERAL";
pub const PENDING: &str = "Pending";

/// Bucket for a record: special requests share one bucket, everything else
/// goes to its upper-cased branch. The purpose is compared untrimmed.
pub fn bucket_key(purpose: &str, branch: &str) -> String {
    if purpose.eq_ignore_ascii_case(SPECIAL_REQUEST) {
        return SPECIAL_REQUEST.to_string();
    }
    match branch.trim() {
        "" => GENERAL_BUCKET.to_string(),
        b => b.to_uppercase(),
    }
}

/// One ledger row, in [`LEDGER_HEADER`] column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow(pub Vec<String>);

impl LedgerRow {
    /// A freshly submitted line: status `Pending`, not yet released or
    /// received.
    pub fn pending(
        record: &RequisitionRecord,
        item: &LineItem,
        item_id: &str,
        timestamp: &DateTime<FixedOffset>,
        pdf_url: &str,
    ) -> Self {
        Self(vec![
            timestamp.to_rfc3339(),
            record.branch.clone(),
            record.date.clone(),
            record.to.clone(),
            record.purpose.clone(),
            item_id.to_string(),
            item.qty.clone(),
            item.unit.clone(),
            item.description.clone(),
            item.unit_price.clone(),
            item.amount.clone(),
            record.total.clone(),
            record.requested_by.clone(),
            PENDING.to_string(),
            String::new(),
            String::new(),
            pdf_url.to_string(),
        ])
    }

    /// Cell under a header column.
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = LEDGER_HEADER.iter().position(|c| *c == column)?;
        self.0.get(idx).map(String::as_str)
    }
}

/// Where submitted rows go.
pub trait LedgerStore: Send + Sync {
    /// Append rows to a bucket, creating it with the header if needed (also
    /// when `rows` is empty).
    fn append_rows(&self, key: &str, rows: &[LedgerRow]) -> Result<()>;
}

/// Per-bucket totals written by the summary job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSummary {
    pub rows: usize,
    pub pending: usize,
    /// Distinct rendered documents.
    pub requisitions: usize,
    pub last_timestamp: Option<String>,
}

pub type LedgerSummary = BTreeMap<String, BucketSummary>;

fn summarize_rows(rows: &[LedgerRow]) -> BucketSummary {
    let mut urls: Vec<&str> = rows.iter().filter_map(|r| r.get("PDF URL")).collect();
    urls.sort_unstable();
    urls.dedup();
    BucketSummary {
        rows: rows.len(),
        pending: rows.iter().filter(|r| r.get("Status") == Some(PENDING)).count(),
        requisitions: urls.len(),
        last_timestamp: rows.iter().filter_map(|r| r.get("Timestamp")).max().map(str::to_string),
    }
}

// ---------------------------------------------------------------------------
// JSON-lines files
// ---------------------------------------------------------------------------

const BUCKET_EXT: &str = "jsonl";

pub struct FileLedger {
    dir: PathBuf,
}

impl FileLedger {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bucket_path(&self, key: &str) -> Result<PathBuf> {
        let name: String = key
            .chars()
            .map(|c| if c == '/' || c == '\\' || c.is_control() { '_' } else { c })
            .collect();
        if name.trim().is_empty() || name.starts_with('.') {
            return Err(ForgeError::Ledger(format!("invalid bucket key {key:?}")));
        }
        Ok(self.dir.join(format!("{name}.{BUCKET_EXT}")))
    }

    /// Bucket keys, sorted.
    pub fn buckets(&self) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(BUCKET_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Rows of a bucket, header lines excluded. A missing bucket has no rows.
    pub fn rows(&self, key: &str) -> Result<Vec<LedgerRow>> {
        let path = self.bucket_path(key)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(fs::File::open(&path)?);
        let mut rows = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<String> = serde_json::from_str(&line).map_err(|e| {
                ForgeError::Ledger(format!("{}:{}: {e}", path.display(), n + 1))
            })?;
            // two first writers racing on a new bucket may both write it
            if cells == LEDGER_HEADER {
                continue;
            }
            rows.push(LedgerRow(cells));
        }
        Ok(rows)
    }

    pub fn summarize(&self) -> Result<LedgerSummary> {
        self.buckets()?
            .into_iter()
            .map(|key| {
                let summary = summarize_rows(&self.rows(&key)?);
                Ok((key, summary))
            })
            .collect()
    }
}

impl LedgerStore for FileLedger {
    fn append_rows(&self, key: &str, rows: &[LedgerRow]) -> Result<()> {
        let path = self.bucket_path(key)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut out = String::new();
        if file.metadata()?.len() == 0 {
            out.push_str(&serde_json::to_string(&LEDGER_HEADER)?);
            out.push('\n');
            log::info!("created ledger bucket {key:?}");
        }
        for row in rows {
            out.push_str(&serde_json::to_string(&row.0)?);
            out.push('\n');
        }
        file.write_all(out.as_bytes())?;
        log::debug!("appended {} row(s) to {key:?}", rows.len());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryLedger {
    buckets: Mutex<BTreeMap<String, Vec<LedgerRow>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buckets(&self) -> Vec<String> {
        self.buckets
            .lock()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn rows(&self, key: &str) -> Vec<LedgerRow> {
        self.buckets
            .lock()
            .ok()
            .and_then(|b| b.get(key).cloned())
            .unwrap_or_default()
    }

    pub fn summarize(&self) -> LedgerSummary {
        self.buckets
            .lock()
            .map(|b| b.iter().map(|(k, rows)| (k.clone(), summarize_rows(rows))).collect())
            .unwrap_or_default()
    }
}

impl LedgerStore for MemoryLedger {
    fn append_rows(&self, key: &str, rows: &[LedgerRow]) -> Result<()> {
        let mut buckets = self
            .buckets
            .lock()
            .map_err(|_| ForgeError::Ledger("ledger lock poisoned".to_string()))?;
        buckets.entry(key.to_string()).or_default().extend_from_slice(rows);
        Ok(())
    }
}
