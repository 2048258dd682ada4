use std::path::PathBuf;

use thiserror::Error;

/// Fatal problems found before a run enters monitoring.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed region source: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("region \"{0}\" is required but missing")]
    MissingRegion(String),
    #[error("region \"{name}\" is empty or inverted: [{l}, {t}, {r}, {b}]")]
    BadRect {
        name: String,
        l: i32,
        t: i32,
        r: i32,
        b: i32,
    },
    #[error("region \"{name}\" lies outside the {width}x{height} frame")]
    OutsideFrame { name: String, width: u32, height: u32 },
    #[error("invalid setting: {0}")]
    Setting(String),
}

/// Which collaborator failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    Capture,
    Recognition,
}

impl std::fmt::Display for Collaborator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Collaborator::Capture => f.write_str("capture"),
            Collaborator::Recognition => f.write_str("recognition"),
        }
    }
}

/// Machine-checkable category of a fatal run error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Infrastructure,
    Actuation,
    Panicked,
}

/// A fatal error that ends a run in the `Errored` state.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{collaborator} failure: {detail}")]
    Infrastructure { collaborator: Collaborator, detail: String },
    #[error("click on \"{target}\" failed: {detail}")]
    Actuation { target: String, detail: String },
    #[error("worker panicked: {0}")]
    Panicked(String),
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::Config(_) => ErrorKind::Config,
            RunError::Infrastructure { .. } => ErrorKind::Infrastructure,
            RunError::Actuation { .. } => ErrorKind::Actuation,
            RunError::Panicked(_) => ErrorKind::Panicked,
        }
    }

    pub(crate) fn capture(e: anyhow::Error) -> Self {
        RunError::Infrastructure { collaborator: Collaborator::Capture, detail: format!("{:#}", e) }
    }

    pub(crate) fn recognition(e: anyhow::Error) -> Self {
        RunError::Infrastructure { collaborator: Collaborator::Recognition, detail: format!("{:#}", e) }
    }
}
