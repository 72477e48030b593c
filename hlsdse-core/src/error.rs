//! Error types for descriptor validation and enumeration misuse.

use thiserror::Error;

/// A kernel description that cannot be enumerated
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("at least \"periods\" or \"frequencies\" must be supplied")]
    MissingOperatingPoints,

    #[error("only one of \"periods\" or \"frequencies\" may be supplied")]
    ConflictingOperatingPoints,

    #[error("operating point list is empty")]
    EmptyOperatingPoints,

    #[error("invalid operating point {value}: must be finite and positive")]
    InvalidOperatingPoint { value: f64 },

    #[error("operating points {first} and {second} render to the same code token")]
    AmbiguousOperatingPoint { first: f64, second: f64 },

    #[error("{kind} factor of 0 is not allowed for {target}")]
    ZeroFactor { target: String, kind: &'static str },

    #[error("{kind} factor {factor} listed twice for {target}")]
    DuplicateFactor {
        target: String,
        kind: &'static str,
        factor: u32,
    },

    #[error("array \"{0}\" is declared twice")]
    DuplicateArray(String),

    #[error("loop level {level_id}.{depth} is declared twice")]
    DuplicateLoop { level_id: usize, depth: u32 },

    #[error("off-chip array \"{0}\" is not declared in \"arrays\"")]
    UnknownArray(String),

    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for DescriptorError {
    fn from(e: serde_json::Error) -> Self {
        DescriptorError::InvalidConfig(e.to_string())
    }
}

/// Programming errors when reading state from a `DesignPointEnumerator`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnumerationError {
    #[error("design point requested before the first advance()")]
    NotStarted,

    #[error("design point requested after the enumeration was exhausted")]
    Exhausted,
}
