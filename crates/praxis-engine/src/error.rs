use thiserror::Error;

use praxis_core::CoreError;
use praxis_model::ModelError;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema mismatch, unknown goal/plan/service, bad parameters.
    /// Rejected at the event boundary; the agent state is untouched.
    #[error("validation: {0}")]
    Validation(String),

    /// Unbalanced resource locks. Programmer bug: asserts in debug,
    /// clamps in release.
    #[error("resource violation on '{0}'")]
    ResourceViolation(String),

    #[error("no handler or applicable service for action '{0}'")]
    UnhandledAction(String),

    #[error("executor fault: {0}")]
    ExecutorFault(String),

    /// Bus sends are best-effort; losses are logged, never retried.
    #[error("transport loss: {0}")]
    TransportLoss(String),

    /// Unknown template at agent creation. The engine refuses to start
    /// while this flag is raised.
    #[error("critical bootstrap error: {0}")]
    CriticalBootstrap(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
