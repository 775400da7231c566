//! Error types for dwarfsim.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SimError {
    /// A field is present and well-formed but out of range or inconsistent
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Syntax errors, missing/unknown fields and unrecognized tokens
    #[error("malformed configuration: {0}")]
    Malformed(#[from] json5::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A non-finite acceleration or position appeared mid-run
    #[error("numeric instability at step {step}: particle {particle} has a non-finite {quantity}")]
    NumericInstability {
        step: usize,
        particle: usize,
        quantity: &'static str,
    },
}

impl SimError {
    /// True for every error raised before a simulation step runs
    pub fn is_configuration(&self) -> bool {
        matches!(self, SimError::Configuration(_) | SimError::Malformed(_))
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
