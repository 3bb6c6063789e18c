//! Error types for sturnus-asr organized by processing stage.

use ndarray::ShapeError;
use ndarray_stats::errors::MinMaxError;
use std::path::PathBuf;
use thiserror::Error;

/// Training/evaluation pipeline error variants organized by stage.
#[derive(Debug, Error)]
pub enum Error {
    /// Run configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Corpus table ingestion error
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// Audio loading stage error
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Model prediction, training, or checkpoint error
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Configuration errors. All of these abort the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Optimizer name not one of sgd/adam/nadam
    #[error("optimiser not recognised: {name:?} (expected sgd, adam, or nadam)")]
    UnknownOptimizer { name: String },

    /// Architecture identifier outside 0..=6
    #[error("model architecture not found: {id} (expected 0..=6)")]
    UnknownArchitecture { id: u32 },

    /// Checkpoint directory missing when loading was requested
    #[error("checkpoint directory not found: {path}")]
    CheckpointNotFound { path: PathBuf },

    /// Evaluation invoked without a checkpoint to load
    #[error("evaluation requires an existing trained checkpoint, none was supplied")]
    CheckpointRequired,

    /// Neither the primary nor the fallback prediction endpoint exists
    #[error("no prediction endpoint: tried {primary:?}, then {fallback:?}")]
    MissingEndpoint { primary: String, fallback: String },

    /// Loaded topology disagrees with the feature mode implied by the architecture
    #[error(
        "feature mode mismatch: checkpoint expects {checkpoint_dim}-dim input, \
         architecture implies {mode_dim}-dim"
    )]
    FeatureModeMismatch {
        checkpoint_dim: usize,
        mode_dim: usize,
    },
}

/// Corpus descriptor ingestion errors.
#[derive(Debug, Error)]
pub enum CorpusError {
    /// CSV descriptor could not be parsed into an utterance table
    #[error("failed to parse corpus descriptor {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Descriptors produced no utterances at all
    #[error("corpus is empty: {files}")]
    Empty { files: String },

    /// A full pass over the table produced no usable batch
    #[error("no usable utterances: all {count} were skipped during batch assembly")]
    Unusable { count: usize },
}

/// Audio loading and validation errors.
#[derive(Debug, Error)]
pub enum AudioError {
    /// Sample rate validation failed
    #[error("invalid sample rate: expected {expected}Hz, got {got}Hz")]
    InvalidSampleRate { expected: u32, got: u32 },

    /// Channel count validation failed
    #[error("invalid channel count: expected mono or stereo, got {0} channels")]
    InvalidChannels(u16),

    /// IO error during audio loading
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WAV file format error
    #[error(transparent)]
    Hound(#[from] hound::Error),
}

/// Model prediction, training, and checkpoint errors.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Checkpoint artifact could not be read or written
    #[error("checkpoint IO failed at {path}: {source}")]
    CheckpointIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Weight count does not match the topology
    #[error("weight count mismatch: topology expects {expected}, checkpoint holds {got}")]
    WeightCountMismatch { expected: usize, got: usize },

    /// Topology/weights serialization error
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// ndarray shape error
    #[error(transparent)]
    Shape(#[from] ShapeError),

    /// ndarray-stats argmax over an empty or NaN row
    #[error(transparent)]
    MinMax(#[from] MinMaxError),
}

/// Result type alias for sturnus-asr operations.
pub type Result<T> = std::result::Result<T, Error>;

// Nested From implementations for automatic error conversion chains

// hound::Error → AudioError → Error
impl From<hound::Error> for Error {
    fn from(e: hound::Error) -> Self {
        Error::Audio(AudioError::Hound(e))
    }
}

// std::io::Error → AudioError → Error
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Audio(AudioError::Io(e))
    }
}

// serde_json::Error → ModelError → Error
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Model(ModelError::Json(e))
    }
}

// ShapeError → ModelError → Error
impl From<ShapeError> for Error {
    fn from(e: ShapeError) -> Self {
        Error::Model(ModelError::Shape(e))
    }
}

// MinMaxError → ModelError → Error
impl From<MinMaxError> for Error {
    fn from(e: MinMaxError) -> Self {
        Error::Model(ModelError::MinMax(e))
    }
}
