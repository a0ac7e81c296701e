//! Error types for the filter engine

use std::io;
use thiserror::Error;

/// Filter engine error type
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("unknown date mode: {0}")]
    UnknownDateMode(String),

    #[error("unknown filter key: {0}")]
    UnknownFilterKey(String),

    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("invalid date/time '{0}' (expected YYYY-MM-DD or YYYY-MM-DDTHH:MM:SS)")]
    InvalidDateTime(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("filter engine must be created inside a Tokio runtime")]
    RuntimeUnavailable,
}

pub type Result<T> = std::result::Result<T, FilterError>;
