use thiserror::Error;

/// Errors raised while configuring or running a collision experiment
#[derive(Debug, Error)]
pub enum CollisionError {
    #[error("Prefix width must be between 1 and {max} hex characters, got {width}")]
    InvalidPrefixWidth { width: usize, max: usize },

    #[error("Input length must be at least 1")]
    InvalidInputLength,

    #[error("Alphabet must be non-empty and free of duplicate symbols")]
    InvalidAlphabet,

    #[error("An experiment needs at least one trial")]
    NoTrials,

    #[error("Could not build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Trial worker failed: {0}")]
    WorkerFailed(String),

    #[error("Could not write results: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CollisionError>;
