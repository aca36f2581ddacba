use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate {kind} name '{name}'")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{referrer} references unknown {kind} '{name}'")]
    UnknownReference {
        kind: &'static str,
        name: String,
        referrer: String,
    },
}

pub type Result<T> = std::result::Result<T, ModelError>;
