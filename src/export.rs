//! Exporter – the terminal stage: persist the mutated working copy, render
//! it to PDF, publish the PDF and discard the working copy.

use crate::dom::to_html;
use crate::error::Result;
use crate::pipeline::{render_document, PipelineConfig};
use crate::store::{FileStore, StoredFile};
use crate::template::WorkingDocument;

pub const PDF_MIME: &str = "application/pdf";

/// A published PDF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    pub file: StoredFile,
    pub url: String,
}

/// Write the document's current DOM back to its store entry.
pub fn finalize(store: &dyn FileStore, doc: &WorkingDocument) -> Result<()> {
    store.update(&doc.id, to_html(&doc.nodes).as_bytes())
}

/// Render the working copy and store it as `<name>.pdf` with public read
/// access. The PDF is rendered from the in-memory DOM, so a failed
/// [`finalize`] is only logged.
pub fn export(store: &dyn FileStore, doc: &WorkingDocument, config: &PipelineConfig) -> Result<ExportedFile> {
    if let Err(e) = finalize(store, doc) {
        log::warn!("could not save working copy {}: {e}", doc.id);
    }

    let config = config.clone().with_title(doc.name.clone());
    let (bytes, layout) = render_document(&doc.nodes, &config)?;

    let file = store.create_file(&bytes, PDF_MIME, &format!("{}.pdf", doc.name))?;
    store.set_public_readable(&file.id)?;
    let url = store.url(&file.id)?;
    log::debug!(
        "exported {:?} ({} page(s)) as {}",
        file.name,
        layout.pages.len(),
        file.id
    );
    Ok(ExportedFile { file, url })
}

/// Delete the working copy. Failures are logged, never returned.
pub fn discard(store: &dyn FileStore, doc: &WorkingDocument) {
    if let Err(e) = store.delete(&doc.id) {
        log::warn!("could not discard working copy {}: {e}", doc.id);
    }
}

/// [`export`], then [`discard`] whatever the export outcome.
pub fn export_and_discard(
    store: &dyn FileStore,
    doc: &WorkingDocument,
    config: &PipelineConfig,
) -> Result<ExportedFile> {
    let exported = export(store, doc, config);
    discard(store, doc);
    exported
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::store::MemoryFileStore;
    use crate::template::TemplateRegistry;

    #[test]
    fn exports_public_pdf_and_discards_copy() {
        let store = Arc::new(MemoryFileStore::new());
        let registry = TemplateRegistry::register(store.clone(), "<p>Hello</p>", "tpl").unwrap();
        let doc = registry.working_copy("Requisition 2024-05-01 09:30:00").unwrap();

        let out = export_and_discard(store.as_ref(), &doc, &PipelineConfig::default()).unwrap();
        assert_eq!(out.file.name, "Requisition 2024-05-01 09:30:00.pdf");
        assert!(store.metadata(&out.file.id).unwrap().public);
        assert!(!out.url.is_empty());
        assert_eq!(&store.read(&out.file.id).unwrap()[0..5], b"%PDF-");
        // template + pdf
        assert_eq!(store.len(), 2);
        assert!(store.metadata(&doc.id).is_err());
    }

    #[test]
    fn failed_export_still_discards() {
        let store = Arc::new(MemoryFileStore::new());
        let registry = TemplateRegistry::register(store.clone(), "<p>Hello</p>", "tpl").unwrap();
        let doc = registry.working_copy("x").unwrap();
        store.fail_on("create_file");

        assert!(export_and_discard(store.as_ref(), &doc, &PipelineConfig::default()).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn unsaved_working_copy_still_exports() {
        let store = Arc::new(MemoryFileStore::new());
        let registry = TemplateRegistry::register(store.clone(), "<p>Hello</p>", "tpl").unwrap();
        let doc = registry.working_copy("x").unwrap();
        store.fail_on("update");

        let out = export_and_discard(store.as_ref(), &doc, &PipelineConfig::default()).unwrap();
        assert!(store.metadata(&out.file.id).unwrap().public);
        assert_eq!(&store.read(&out.file.id).unwrap()[0..5], b"%PDF-");
        assert!(store.metadata(&doc.id).is_err());
    }

    #[test]
    fn teardown_failure_is_swallowed() {
        let store = Arc::new(MemoryFileStore::new());
        let registry = TemplateRegistry::register(store.clone(), "<p>Hello</p>", "tpl").unwrap();
        let doc = registry.working_copy("x").unwrap();
        store.fail_on("delete");

        assert!(export_and_discard(store.as_ref(), &doc, &PipelineConfig::default()).is_ok());
    }
}
