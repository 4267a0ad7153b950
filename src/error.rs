// ⚠️ Domain errors - one enum for everything the reconciler can reject
//
// Library code returns `ReconcileError`; the pipeline and the CLI wrap it in
// anyhow with context. Parse errors always carry the raw row they came from.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReconcileError>;

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// A field of a source row could not be derived (card, phone, ...)
    #[error("cannot parse {field} at line {line}: {reason} (row: {raw_row})")]
    Parse {
        field: &'static str,
        line: usize,
        reason: String,
        raw_row: String,
    },

    /// Business tables are incomplete for what the run needs
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Source file does not have the expected shape
    #[error("structural error in {file} at line {line}: {reason}")]
    Structural {
        file: String,
        line: usize,
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ReconcileError {
    pub fn structural(file: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        ReconcileError::Structural {
            file: file.into(),
            line,
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        ReconcileError::Configuration(message.into())
    }

    pub fn is_parse(&self) -> bool {
        matches!(self, ReconcileError::Parse { .. })
    }

    /// The offending row, when the error is tied to one
    pub fn raw_row(&self) -> Option<&str> {
        match self {
            ReconcileError::Parse { raw_row, .. } => Some(raw_row),
            _ => None,
        }
    }
}
