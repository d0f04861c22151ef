//! Error types for payload parsing and the surrounding service.

use std::fmt;
use std::num::ParseFloatError;

use thiserror::Error;


/// Pipeline stage a [`ParseError`] was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Normalize,
    Build,
    Assemble,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Extract => "extract",
            Stage::Normalize => "normalize",
            Stage::Build => "build",
            Stage::Assemble => "assemble",
        };
        f.write_str(name)
    }
}


/// Per-message failure. Every variant is recoverable: the message is logged,
/// acknowledged and dropped.
#[derive(Debug, Error)]
pub enum ParseError {
    /// A marker is missing or out of order, or a substring is too short to trim.
    #[error("malformed payload: {reason}")]
    MalformedPayload { stage: Stage, reason: String },

    #[error("invalid timestamp {input:?}: {reason}")]
    Timestamp { input: String, reason: String },

    #[error("invalid numeric value {input:?}: {source}")]
    Value {
        input: String,
        #[source]
        source: ParseFloatError,
    },

    #[error("cannot construct point: {0}")]
    PointConstruction(String),
}

impl ParseError {
    pub fn malformed(stage: Stage, reason: impl Into<String>) -> Self {
        Self::MalformedPayload { stage, reason: reason.into() }
    }

    pub fn point(msg: impl Into<String>) -> Self {
        Self::PointConstruction(msg.into())
    }

    /// The stage that produced this error.
    pub fn stage(&self) -> Stage {
        match self {
            ParseError::MalformedPayload { stage, .. } => *stage,
            ParseError::Timestamp { .. } => Stage::Normalize,
            ParseError::Value { .. } => Stage::Build,
            ParseError::PointConstruction(_) => Stage::Assemble,
        }
    }
}


/// Failure writing a batch of points to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("error from PostgreSQL: {0}")]
    Database(#[from] postgres::Error),

    #[error("cannot encode point: {0}")]
    Encoding(String),
}


#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("dispatcher is shut down")]
    Closed,
}


#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Args(#[from] clap::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
