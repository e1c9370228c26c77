//! # requisition-forge – requisition slips from a template and a record
//!
//! A submitted requisition record is merged into an HTML template held in a
//! file store, rendered to PDF and shared. Its line items are appended to a
//! ledger bucket and a summary of the ledger is scheduled.
//!
//! Merge stages, in order, on a private working copy of the template:
//!
//! 1. **Resolve** – scalar `{{TOKEN}}` placeholders ([`placeholder`])
//! 2. **Insert** – the line-item table at `{{ITEMS}}` ([`table`])
//! 3. **Format** – column widths, alignment and header shading ([`table`])
//! 4. **Composite** – the signature image at `{{REQUESTED_BY_SIGNATURE}}` ([`signature`])
//! 5. **Export** – render to PDF, publish, discard the working copy ([`export`])
//!
//! Rendering itself goes through [`dom`] → [`style`] → [`layout`] →
//! [`pagination`] → [`render`], driven by [`pipeline`].
//!
//! A C-compatible FFI surface is exposed via the [`ffi`] module.

pub mod catalog;
pub mod datauri;
pub mod dom;
pub mod error;
pub mod export;
pub mod ffi;
pub mod fonts;
pub mod layout;
pub mod layout_config;
pub mod ledger;
pub mod merge;
pub mod pagination;
pub mod pipeline;
pub mod placeholder;
pub mod record;
pub mod render;
pub mod service;
pub mod settings;
pub mod signature;
pub mod store;
pub mod style;
pub mod summary;
pub mod table;
pub mod template;

// Re-exports for convenience
pub use error::{ForgeError, Result};
pub use merge::{MergePipeline, RenderOutcome, RenderReport};
pub use pipeline::{generate_pdf, PageOrientation, PipelineConfig};
pub use record::{LineItem, RequisitionRecord};
pub use service::{LocalService, RequisitionService, Submission};
