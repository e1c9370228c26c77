//! Service settings, read from a JSON file. Every field has a default so an
//! empty object (or no file at all) is a working local setup.

use std::path::{Path, PathBuf};

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::error::{ForgeError, Result};
use crate::pipeline::{PageOrientation, PipelineConfig};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Root directory of the local file store.
    pub store_root: PathBuf,
    /// Base URL for published files; `file://` URLs when absent.
    pub public_base_url: Option<String>,
    pub ledger_dir: PathBuf,
    pub catalog_file: PathBuf,
    pub branches_file: PathBuf,
    /// Where the summary job writes its output.
    pub summary_file: PathBuf,
    /// Id of a template already in the store. Takes precedence over
    /// `template_path`.
    pub template_id: Option<String>,
    /// HTML template file; the built-in template when neither is set.
    pub template_path: Option<PathBuf>,
    pub utc_offset_hours: i32,
    pub summary_delay_ms: u64,
    pub orientation: PageOrientation,
    /// TTF used for text measurement.
    pub measurement_font: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_root: PathBuf::from("reqforge-data/files"),
            public_base_url: None,
            ledger_dir: PathBuf::from("reqforge-data/ledger"),
            catalog_file: PathBuf::from("reqforge-data/catalog.json"),
            branches_file: PathBuf::from("reqforge-data/branches.json"),
            summary_file: PathBuf::from("reqforge-data/summary.json"),
            template_id: None,
            template_path: None,
            utc_offset_hours: 8,
            summary_delay_ms: 1000,
            orientation: PageOrientation::Portrait,
            measurement_font: None,
        }
    }
}

impl Settings {
    /// Read and validate a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ForgeError::Config(format!("cannot read {}: {e}", path.display())))?;
        let settings: Settings = serde_json::from_str(&raw)
            .map_err(|e| ForgeError::Config(format!("{}: {e}", path.display())))?;
        settings.utc_offset()?;
        Ok(settings)
    }

    /// `path` when given, otherwise the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    pub fn utc_offset(&self) -> Result<FixedOffset> {
        self.utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                ForgeError::Config(format!("utc_offset_hours out of range: {}", self.utc_offset_hours))
            })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            orientation: self.orientation,
            measurement_font: self.measurement_font.clone(),
            ..PipelineConfig::default()
        }
    }
}
