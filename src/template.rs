//! Template registry – one canonical requisition template held in the file
//! store, cloned into an independent [`WorkingDocument`] per invocation.

use std::sync::Arc;

use crate::dom::{parse_html, DomNode};
use crate::error::{ForgeError, Result};
use crate::store::FileStore;

/// The built-in requisition slip. Uses the full token vocabulary.
pub const REQUISITION_TEMPLATE: &str = r#"<html><body>
<div class="flex flex-col">
  <h2 class="text-center">REQUISITION SLIP</h2>
  <div class="flex flex-row justify-between mb-2">
    <p>Branch: {{BRANCH}}</p>
    <p>Date: {{DATE}}</p>
  </div>
  <p>To: {{TO}}</p>
  <p>Purpose: {{PURPOSE}}</p>
  <div class="mt-2">
    <p>{{ITEMS}}</p>
  </div>
  <p class="text-right font-bold">Total: {{TOTAL}}</p>
  <p>Notes: {{NOTES}}</p>
  <div class="mt-4">
    <p>Requested by:</p>
    <div class="flex flex-col">
      <p>{{REQUESTED_BY_SIGNATURE}}</p>
    </div>
    <p class="font-bold underline">{{REQUESTED_BY}}</p>
  </div>
</div>
</body></html>"#;

pub const HTML_MIME: &str = "text/html";

/// A mutable clone of the template, owned by exactly one invocation.
#[derive(Debug)]
pub struct WorkingDocument {
    /// Store id of the clone.
    pub id: String,
    pub name: String,
    pub nodes: Vec<DomNode>,
    /// Set when the clone could not be decoded; mutation stages then fail.
    pub corrupt: Option<String>,
}

impl WorkingDocument {
    /// The DOM, or [`ForgeError::CorruptDocument`] if it could not be read.
    pub fn body_mut(&mut self) -> Result<&mut Vec<DomNode>> {
        match &self.corrupt {
            Some(reason) => Err(ForgeError::CorruptDocument(reason.clone())),
            None => Ok(&mut self.nodes),
        }
    }

    pub fn is_corrupt(&self) -> bool {
        self.corrupt.is_some()
    }
}

#[derive(Clone)]
pub struct TemplateRegistry {
    store: Arc<dyn FileStore>,
    template_id: String,
}

impl TemplateRegistry {
    /// Use a template that already exists in `store`.
    pub fn from_id(store: Arc<dyn FileStore>, template_id: impl Into<String>) -> Self {
        Self {
            store,
            template_id: template_id.into(),
        }
    }

    /// Upload `html` as the canonical template.
    pub fn register(store: Arc<dyn FileStore>, html: &str, name: &str) -> Result<Self> {
        let file = store.create_file(html.as_bytes(), HTML_MIME, name)?;
        log::debug!("registered template {name:?} as {}", file.id);
        Ok(Self::from_id(store, file.id))
    }

    /// Register the built-in requisition template.
    pub fn builtin(store: Arc<dyn FileStore>) -> Result<Self> {
        Self::register(store, REQUISITION_TEMPLATE, "Requisition Template")
    }

    pub fn template_id(&self) -> &str {
        &self.template_id
    }

    pub fn store(&self) -> &Arc<dyn FileStore> {
        &self.store
    }

    /// Clone the template under `name` and parse the clone. A failed copy is
    /// fatal; an undecodable clone yields a corrupt document that still owns
    /// its store entry so it can be exported and discarded.
    pub fn working_copy(&self, name: &str) -> Result<WorkingDocument> {
        let file = self.store.copy(&self.template_id, name)?;
        let (nodes, corrupt) = match self.store.read(&file.id) {
            Ok(bytes) => match String::from_utf8(bytes) {
                Ok(html) => (parse_html(&html), None),
                Err(e) => (Vec::new(), Some(format!("clone is not UTF-8: {e}"))),
            },
            Err(e) => (Vec::new(), Some(format!("clone unreadable: {e}"))),
        };
        if let Some(reason) = &corrupt {
            log::warn!("working copy {} is corrupt: {reason}", file.id);
        }
        Ok(WorkingDocument {
            id: file.id,
            name: file.name,
            nodes,
            corrupt,
        })
    }
}
