//! Deferred summary job. After a submission the service enqueues a master
//! summary of the ledger to run shortly afterwards. Jobs run at most once
//! and are never retried; the submitter does not wait for them.

use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{FixedOffset, Utc};
use serde::Serialize;

use crate::error::{ForgeError, Result};
use crate::ledger::{FileLedger, LedgerSummary};

pub type SummaryJob = Box<dyn FnOnce() -> Result<()> + Send + 'static>;

pub trait SummaryScheduler: Send + Sync {
    /// Enqueue `job`. Returning `Ok` promises nothing about completion.
    fn schedule(&self, job: SummaryJob) -> Result<()>;
}

/// Runs each job on its own thread after a fixed delay.
pub struct ThreadSummaryScheduler {
    delay: Duration,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadSummaryScheduler {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Wait for every job scheduled so far. Used by the CLI before exit.
    pub fn shutdown(&self) {
        let handles = match self.handles.lock() {
            Ok(mut h) => std::mem::take(&mut *h),
            Err(_) => return,
        };
        for handle in handles {
            if handle.join().is_err() {
                log::warn!("summary job panicked");
            }
        }
    }
}

impl SummaryScheduler for ThreadSummaryScheduler {
    fn schedule(&self, job: SummaryJob) -> Result<()> {
        let delay = self.delay;
        let handle = thread::Builder::new()
            .name("reqforge-summary".to_string())
            .spawn(move || {
                thread::sleep(delay);
                match job() {
                    Ok(()) => log::debug!("summary job finished"),
                    Err(e) => log::warn!("summary job failed: {e}"),
                }
            })
            .map_err(|e| ForgeError::Schedule(e.to_string()))?;

        let mut handles = self
            .handles
            .lock()
            .map_err(|_| ForgeError::Schedule("scheduler lock poisoned".to_string()))?;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        Ok(())
    }
}

/// Drops every job.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopScheduler;

impl SummaryScheduler for NoopScheduler {
    fn schedule(&self, _job: SummaryJob) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct MasterSummary {
    generated_at: String,
    buckets: LedgerSummary,
}

/// Job that summarizes every bucket of the ledger in `ledger_dir` into
/// `output` as JSON.
pub fn master_summary_job(ledger_dir: PathBuf, output: PathBuf, offset: FixedOffset) -> SummaryJob {
    Box::new(move || {
        let ledger = FileLedger::open(&ledger_dir)?;
        let summary = MasterSummary {
            generated_at: Utc::now().with_timezone(&offset).to_rfc3339(),
            buckets: ledger.summarize()?,
        };
        std::fs::write(&output, serde_json::to_vec_pretty(&summary)?)?;
        log::info!(
            "wrote summary of {} bucket(s) to {}",
            summary.buckets.len(),
            output.display()
        );
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::ledger::{LedgerRow, LedgerStore};

    #[test]
    fn thread_scheduler_runs_job_once_after_delay() {
        let runs = Arc::new(AtomicUsize::new(0));
        let scheduler = ThreadSummaryScheduler::new(Duration::from_millis(10));
        let counter = runs.clone();
        scheduler
            .schedule(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        scheduler.shutdown();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_job_does_not_propagate() {
        let scheduler = ThreadSummaryScheduler::new(Duration::ZERO);
        scheduler
            .schedule(Box::new(|| Err(ForgeError::Ledger("boom".into()))))
            .unwrap();
        scheduler.shutdown();
    }

    #[test]
    fn master_summary_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let ledger_dir = dir.path().join("ledger");
        let ledger = FileLedger::open(&ledger_dir).unwrap();
        ledger
            .append_rows("MAIN", &[LedgerRow(vec!["t".into(); 17])])
            .unwrap();

        let out = dir.path().join("summary.json");
        let offset = FixedOffset::east_opt(8 * 3600).unwrap();
        master_summary_job(ledger_dir, out.clone(), offset)().unwrap();

        let value: serde_json::Value = serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(value["buckets"]["MAIN"]["rows"], 1);
        assert!(value["generated_at"].as_str().unwrap().ends_with("+08:00"));
    }
}
