//! Error types for realtime client operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RteError>;

#[derive(Error, Debug)]
pub enum RteError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tokio task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Faults raised while unpacking a single packet or variable.
///
/// These never terminate the message stream; the offending unit is
/// skipped and the fault is logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("needed {needed} bytes at offset {offset} but only {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown variable type code {code}")]
    UnknownVariableType { code: u8 },

    #[error("list element type {code} has no fixed size")]
    UnsizedListElement { code: u8 },

    #[error("sub-package at offset {offset} declares invalid size {size}")]
    InvalidPackageSize { offset: usize, size: i32 },

    #[error("no protocol version captured for this connection")]
    MissingVersion,
}

/// Faults raised by the packet framer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    #[error("packet at offset {offset} declares length {length} outside 5..={max}")]
    InvalidLength {
        offset: usize,
        length: usize,
        max: usize,
    },
}
