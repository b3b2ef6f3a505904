use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Precondition failed: {0}")]
    Precondition(String),

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("{0} is not registered")]
    NotRegistered(&'static str),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Core type error: {0}")]
    Core(#[from] core_types::CoreError),

    #[error("Execution client error: {0}")]
    Execution(String),
}
