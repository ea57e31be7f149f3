//! Error types for shared state access.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CommonError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CommonError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type CommonResult<T> = Result<T, CommonError>;
