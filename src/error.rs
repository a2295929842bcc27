use thiserror::Error;

/// Error taxonomy for the compiler driver / extractor / mapper core.
///
/// `BuildFailed` is deliberately absent here: a failed user build is not an
/// error of the core itself, it's data — see [`crate::model::CompileResult`].
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("request too large or malformed: {0}")]
    BadRequest(String),

    #[error("invalid compiler name: {0}")]
    InvalidName(String),

    #[error("compiler not found: {0}")]
    CompilerNotFound(String),

    #[error("parser not found for go version: {0}")]
    ParserNotFound(String),

    #[error("no compilers registered")]
    NoCompilers,

    #[error("invalid compiler path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("scratch directory error: {0}")]
    Scratch(String),

    #[error("runner setup failed: {0}")]
    Runner(String),

    #[error("compile timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("compiler executable disappeared: {0}")]
    InvalidCompiler(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Internal(e.to_string())
    }
}
