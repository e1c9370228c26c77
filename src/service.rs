//! Submission service – the entry point behind `reqforge submit` and the
//! form backend: normalize the record, render and publish the PDF, append
//! the line items to the ledger and schedule the summary.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;

use crate::catalog::Catalog;
use crate::error::Result;
use crate::ledger::{bucket_key, FileLedger, LedgerRow, LedgerStore};
use crate::merge::{MergePipeline, RenderReport};
use crate::record::normalize;
use crate::settings::Settings;
use crate::store::{FileStore, LocalFileStore};
use crate::summary::{master_summary_job, NoopScheduler, SummaryJob, SummaryScheduler, ThreadSummaryScheduler};
use crate::template::TemplateRegistry;

/// Builds a fresh summary job per submission.
pub type SummaryFactory = Arc<dyn Fn() -> SummaryJob + Send + Sync>;

/// Output file names: `Requisition 2024-03-01 09:15:00`.
pub fn document_name(timestamp: &DateTime<FixedOffset>) -> String {
    format!("Requisition {}", timestamp.format("%Y-%m-%d %H:%M:%S"))
}

/// What one submission produced.
#[derive(Debug, Clone)]
pub struct Submission {
    pub url: String,
    pub bucket: String,
    pub rows: usize,
    pub report: RenderReport,
}

#[derive(Clone)]
pub struct RequisitionService {
    pipeline: MergePipeline,
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<Catalog>,
    scheduler: Arc<dyn SummaryScheduler>,
    summary: Option<SummaryFactory>,
    offset: FixedOffset,
}

impl RequisitionService {
    pub fn new(
        pipeline: MergePipeline,
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<Catalog>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            pipeline,
            ledger,
            catalog,
            scheduler: Arc::new(NoopScheduler),
            summary: None,
            offset,
        }
    }

    pub fn with_summary(mut self, scheduler: Arc<dyn SummaryScheduler>, factory: SummaryFactory) -> Self {
        self.scheduler = scheduler;
        self.summary = Some(factory);
        self
    }

    pub fn pipeline(&self) -> &MergePipeline {
        &self.pipeline
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Submit a raw record and return the URL of its PDF.
    pub fn save_and_create_pdf(&self, raw: &Value) -> Result<String> {
        Ok(self.submit(raw)?.url)
    }

    pub fn submit(&self, raw: &Value) -> Result<Submission> {
        let now = Utc::now().with_timezone(&self.offset);
        self.submit_at(raw, now)
    }

    /// [`submit`](Self::submit) with an explicit timestamp.
    pub fn submit_at(&self, raw: &Value, timestamp: DateTime<FixedOffset>) -> Result<Submission> {
        let record = normalize(raw)?;
        let bucket = bucket_key(&record.purpose, &record.branch);

        let outcome = self.pipeline.render(&record, &document_name(&timestamp))?;

        let rows: Vec<LedgerRow> = record
            .items
            .iter()
            .map(|item| {
                let item_id = self.catalog.find_id(&item.description);
                LedgerRow::pending(&record, item, &item_id, &timestamp, &outcome.url)
            })
            .collect();
        self.ledger.append_rows(&bucket, &rows)?;
        log::info!("{} row(s) appended to bucket {bucket:?}", rows.len());

        self.schedule_summary();

        Ok(Submission {
            url: outcome.url,
            bucket,
            rows: rows.len(),
            report: outcome.report,
        })
    }

    fn schedule_summary(&self) {
        let Some(factory) = &self.summary else {
            return;
        };
        if let Err(e) = self.scheduler.schedule(factory()) {
            log::debug!("summary not scheduled: {e}");
        }
    }
}

/// A service wired to the local filesystem from [`Settings`].
pub struct LocalService {
    pub service: RequisitionService,
    scheduler: Arc<ThreadSummaryScheduler>,
    /// Template registered for this run only; removed on shutdown.
    owned_template: Option<String>,
}

impl LocalService {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let offset = settings.utc_offset()?;
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::open(
            &settings.store_root,
            settings.public_base_url.clone(),
        )?);

        let (registry, owned_template) = match (&settings.template_id, &settings.template_path) {
            (Some(id), _) => (TemplateRegistry::from_id(store, id.clone()), None),
            (None, Some(path)) => {
                let html = std::fs::read_to_string(path)?;
                let registry = TemplateRegistry::register(store, &html, "Requisition Template")?;
                let id = registry.template_id().to_string();
                (registry, Some(id))
            }
            (None, None) => {
                let registry = TemplateRegistry::builtin(store)?;
                let id = registry.template_id().to_string();
                (registry, Some(id))
            }
        };

        let pipeline = MergePipeline::new(registry, settings.pipeline_config());
        let ledger = Arc::new(FileLedger::open(&settings.ledger_dir)?);
        let catalog = Arc::new(Catalog::load(&settings.catalog_file)?);
        let scheduler = Arc::new(ThreadSummaryScheduler::new(Duration::from_millis(
            settings.summary_delay_ms,
        )));

        let ledger_dir = settings.ledger_dir.clone();
        let summary_file = settings.summary_file.clone();
        let factory: SummaryFactory =
            Arc::new(move || master_summary_job(ledger_dir.clone(), summary_file.clone(), offset));

        let service = RequisitionService::new(pipeline, ledger, catalog, offset)
            .with_summary(scheduler.clone(), factory);
        Ok(Self {
            service,
            scheduler,
            owned_template,
        })
    }

    /// Wait for scheduled summaries and drop the per-run template.
    pub fn shutdown(self) {
        self.scheduler.shutdown();
        if let Some(id) = self.owned_template {
            if let Err(e) = self.service.pipeline().registry().store().delete(&id) {
                log::warn!("could not remove template {id}: {e}");
            }
        }
    }
}
