use thiserror::Error;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("invalid requisition record: {0}")]
    InvalidRecord(String),

    #[error("working document is corrupt: {0}")]
    CorruptDocument(String),

    #[error("anchor no longer resolves to a node: {0}")]
    StaleAnchor(String),

    #[error("cell does not support {operation}: <{tag}>")]
    UnsupportedCell { operation: &'static str, tag: String },

    #[error("invalid style value for {property}: {value:?}")]
    InvalidStyle { property: &'static str, value: String },

    #[error("image error: {0}")]
    Image(String),

    #[error("PDF rendering failed: {0}")]
    Render(String),

    #[error("file not found in store: {id}")]
    FileNotFound { id: String },

    #[error("file store error: {0}")]
    Store(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("summary scheduling failed: {0}")]
    Schedule(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ForgeError>;
