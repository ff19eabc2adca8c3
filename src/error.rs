use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Required configuration sheet '{0}' is missing")]
    MissingConfigSheet(String),

    #[error("Configuration sheet '{sheet}' is missing required column '{column}'")]
    MissingConfigColumn { sheet: String, column: String },

    #[error("Invalid configuration for '{item}': {details}")]
    InvalidConfig { item: String, details: String },

    #[error("Invalid cell reference: {0}")]
    InvalidCellReference(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
