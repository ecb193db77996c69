use std::path::PathBuf;

use thiserror::Error;

/// Errors in the session configuration, reported before any process is spawned
///
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("No search engine enabled")]
    NoEngineEnabled,
    #[error("Number of missed cleavages must be between 0 and 5, got {0}")]
    InvalidMissedCleavages(u8),
    #[error("FDR threshold must be within (0, 1], got {0}")]
    InvalidFdrThreshold(f64),
    #[error("Malformed tolerance `{0}`, expected a number followed by `da` or `ppm`")]
    MalformedTolerance(String),
    #[error("Fragment tolerance must be given in Dalton, got `{0}`")]
    FragmentToleranceUnit(String),
    #[error("Configured executable `{0}` does not exist")]
    ExecutableNotFound(PathBuf),
}

/// Errors while executing a single pipeline stage
///
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Declared input artifact `{0}` is absent")]
    MissingInputArtifact(PathBuf),
    #[error("Declared output artifact `{0}` was not produced")]
    MissingOutputArtifact(PathBuf),
    #[error("Executable `{0}` not found")]
    MissingExecutable(PathBuf),
    #[error("Unable to spawn `{program}`: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{program}` exited with status {code:?}:\n{output}")]
    NonZeroExit {
        program: PathBuf,
        code: Option<i32>,
        output: String,
    },
    #[error("IO error during stage execution: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors while extracting scores and hits from an engine result file.
/// Malformed single rows are not errors, they are skipped and counted.
///
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Engine result file `{0}` is missing")]
    MissingResultFile(PathBuf),
    #[error("Unable to open engine result file `{path}`: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("Unable to read engine result file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Extractor used before `load()` was called")]
    NotLoaded,
}

/// Errors of the shared session store
///
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Session store lock poisoned by a panicked task")]
    Poisoned,
}

/// Errors during protein metadata enrichment.
/// Remote failures cancel the enrichment task but never discard merged hits.
///
#[derive(Error, Debug)]
pub enum EnrichmentError {
    #[error("Metadata service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Metadata service rejected the request: {0}")]
    Rejected(String),
}

/// Merges all task errors into a single error type
///
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigurationError),
    #[error("Stage error: {0}")]
    StageError(#[from] StageError),
    #[error("Extraction error: {0}")]
    ExtractionError(#[from] ExtractionError),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Enrichment error: {0}")]
    EnrichmentError(#[from] EnrichmentError),
    #[error("Unable to join task: {0}")]
    JoinError(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
