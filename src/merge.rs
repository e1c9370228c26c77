//! Merge orchestrator – clones the template, runs the four mutation stages
//! in a fixed order and always hands the result to the exporter.
//!
//! ```text
//! Cloned → Substituted → TableInserted? → Formatted? → ImageInserted? → Exported → Discarded
//! ```
//!
//! A mutation stage never aborts the invocation: it reports a
//! [`StageStatus`] and the next stage runs on whatever state is left.

use std::fmt;

use crate::error::Result;
use crate::export::export_and_discard;
use crate::pipeline::PipelineConfig;
use crate::placeholder::{locate_anchors, resolve, token_values};
use crate::record::RequisitionRecord;
use crate::signature::{composite_signature, SignatureOutcome};
use crate::store::StoredFile;
use crate::table::{format_table, insert_items_table};
use crate::template::{TemplateRegistry, WorkingDocument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Substitute,
    InsertTable,
    FormatTable,
    InsertSignature,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Substitute => "substitute",
            Stage::InsertTable => "insert-table",
            Stage::FormatTable => "format-table",
            Stage::InsertSignature => "insert-signature",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Applied,
    Skipped,
    Failed(String),
}

/// Per-stage outcome of one invocation, in execution order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub stages: Vec<(Stage, StageStatus)>,
}

impl RenderReport {
    fn record(&mut self, stage: Stage, status: StageStatus) {
        if let StageStatus::Failed(reason) = &status {
            log::warn!("stage {stage} failed: {reason}");
        }
        self.stages.push((stage, status));
    }

    pub fn status(&self, stage: Stage) -> Option<&StageStatus> {
        self.stages.iter().find(|(s, _)| *s == stage).map(|(_, st)| st)
    }

    pub fn failures(&self) -> impl Iterator<Item = (Stage, &str)> {
        self.stages.iter().filter_map(|(s, st)| match st {
            StageStatus::Failed(reason) => Some((*s, reason.as_str())),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl fmt::Display for RenderReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (stage, status)) in self.stages.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match status {
                StageStatus::Applied => write!(f, "{stage}=applied")?,
                StageStatus::Skipped => write!(f, "{stage}=skipped")?,
                StageStatus::Failed(_) => write!(f, "{stage}=failed")?,
            }
        }
        Ok(())
    }
}

/// Run the mutation stages against `doc`.
pub fn apply_stages(doc: &mut WorkingDocument, record: &RequisitionRecord) -> RenderReport {
    let mut report = RenderReport::default();

    // a corrupt document has no anchors; its stages fail on their own
    let anchors = locate_anchors(doc).unwrap_or_default();

    let substituted = resolve(doc, &token_values(record));
    report.record(
        Stage::Substitute,
        match substituted {
            Ok(n) => {
                log::debug!("replaced {n} placeholder occurrence(s)");
                StageStatus::Applied
            }
            Err(e) => StageStatus::Failed(e.to_string()),
        },
    );

    let table = match insert_items_table(doc, record, anchors.items.as_ref()) {
        Ok(Some(path)) => {
            report.record(Stage::InsertTable, StageStatus::Applied);
            Some(path)
        }
        Ok(None) => {
            report.record(Stage::InsertTable, StageStatus::Skipped);
            None
        }
        Err(e) => {
            report.record(Stage::InsertTable, StageStatus::Failed(e.to_string()));
            None
        }
    };

    let formatted = match &table {
        None => StageStatus::Skipped,
        Some(path) => match format_table(doc, path) {
            Ok(fmt) if fmt.skipped.is_empty() => StageStatus::Applied,
            Ok(fmt) => StageStatus::Failed(format!(
                "{} cell(s) formatted, {} operation(s) skipped",
                fmt.formatted,
                fmt.skipped.len()
            )),
            Err(e) => StageStatus::Failed(e.to_string()),
        },
    };
    report.record(Stage::FormatTable, formatted);

    let signature_anchor = match (&anchors.signature, &table) {
        (Some(anchor), Some(inserted)) => Some(anchor.after_insert(inserted)),
        (anchor, _) => anchor.clone(),
    };
    let signed = match composite_signature(doc, signature_anchor.as_ref(), record.signature.as_deref()) {
        Ok(SignatureOutcome::Inserted) => StageStatus::Applied,
        Ok(SignatureOutcome::Cleared | SignatureOutcome::NoAnchor) => StageStatus::Skipped,
        Ok(SignatureOutcome::Rejected(reason)) => StageStatus::Failed(reason),
        Err(e) => StageStatus::Failed(e.to_string()),
    };
    report.record(Stage::InsertSignature, signed);

    report
}

/// Result of one merge invocation.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub url: String,
    pub file: StoredFile,
    pub report: RenderReport,
}

/// Template + page settings; renders any number of records.
#[derive(Clone)]
pub struct MergePipeline {
    registry: TemplateRegistry,
    config: PipelineConfig,
}

impl MergePipeline {
    pub fn new(registry: TemplateRegistry, config: PipelineConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    /// Clone the template as `name`, merge `record` into it and export.
    /// Only a failed clone or a failed export is returned as an error.
    pub fn render(&self, record: &RequisitionRecord, name: &str) -> Result<RenderOutcome> {
        let mut doc = self.registry.working_copy(name)?;
        let report = apply_stages(&mut doc, record);
        let exported = export_and_discard(self.registry.store().as_ref(), &doc, &self.config)?;
        log::info!("rendered {:?} [{report}] -> {}", exported.file.name, exported.url);
        Ok(RenderOutcome {
            url: exported.url,
            file: exported.file,
            report,
        })
    }
}
