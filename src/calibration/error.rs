use std::path::PathBuf;

use thiserror::Error;

use crate::map::GraphError;

/// Failures that stop a calibration session.
///
/// Recoverable conditions (a camera failing to localize, mismatched
/// descriptors, a rejected frame set) are logged and never surface here.
#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("cannot read reference map {path}: {source}")]
    MapLoad {
        path: PathBuf,
        #[source]
        source: GraphError,
    },
    #[error("no reference map loaded")]
    NoMap,
    #[error("no complete frame sets were found")]
    NoCompleteFrameSet,
    #[error("frame set file {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: GraphError,
    },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
    #[error("cannot build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
