use thiserror::Error;

use crate::message::FieldKind;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema '{schema}' mismatch: {reason}")]
    SchemaMismatch { schema: String, reason: String },

    #[error("unknown field '{field}' on message '{schema}'")]
    UnknownField { schema: String, field: String },

    #[error("field '{field}' on '{schema}' expects {expected:?}, found {found:?}")]
    FieldTypeMismatch {
        schema: String,
        field: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
