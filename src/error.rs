use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Library error type
// ---------------------------------------------------------------------------

/// Errors raised by the diagnostic support layer.
#[derive(Error, Debug)]
pub enum DiagError {
    #[error("Provenance record for {0} already exists.")]
    DuplicateProvenance(String),

    /// Output directories already exist and neither `--force` nor
    /// `--ignore-existing` was given.
    #[error(
        "refusing to overwrite existing output directories: {}",
        .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", ")
    )]
    OutputExists(Vec<PathBuf>),

    #[error("variable '{variable}' is not supported by the {family} diagnostic")]
    UnsupportedVariable { family: String, variable: String },

    #[error("grid mismatch: {left:?} vs {right:?}")]
    ShapeMismatch { left: Vec<usize>, right: Vec<usize> },

    #[error("field '{0}' has no time steps")]
    EmptyField(String),

    #[error("invalid log level '{0}', expected one of debug, info, warning, error")]
    InvalidLogLevel(String),

    #[error("cube '{cube}' has no coordinate '{coord}'")]
    MissingCoordinate { cube: String, coord: String },

    #[error("coordinate '{coord}': {reason}")]
    InvalidCoordinate { coord: String, reason: String },

    #[error("no derivation known for variable '{0}'")]
    UnknownDerivedVariable(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("aggregation of {path} failed: {reason}")]
    Aggregation { path: PathBuf, reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Convenience type for `Result<T, DiagError>`.
pub type DiagResult<T> = Result<T, DiagError>;
