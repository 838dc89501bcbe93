use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PolicyError>;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Field index {index} out of range for section '{ptype}' (width {width})")]
    IndexOutOfRange {
        ptype: String,
        index: usize,
        width: usize,
    },

    #[error("Malformed rule: {0}")]
    MalformedRule(String),

    #[error("Function not registered: {0}")]
    UnknownFunction(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Blocking task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PolicyError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        PolicyError::MalformedRule(msg.into())
    }
}
