//! Error types for the matching engine.

use std::fmt;

/// Errors surfaced by a matching run.
///
/// Numeric degeneracies (flat pattern, silent windows) are not errors; the
/// correlation engine absorbs them by reporting a coefficient of 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// Bad caller input: empty signal, invalid parameter.
    Input(String),
    /// The pattern has more samples than the search signal.
    PatternTooLong { pattern: usize, search: usize },
    /// A RIFF/WAVE buffer that is structurally broken.
    MalformedWav(String),
    /// Neither the WAV fast path nor the fallback decoder could read the bytes.
    Decode(String),
    /// Linear memory could not satisfy an allocation, or a buffer access was out of bounds.
    Resource(String),
    /// The FFT primitive rejected a call.
    Fft(String),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::Input(msg) => write!(f, "invalid input: {}", msg),
            MatchError::PatternTooLong { pattern, search } => {
                write!(
                    f,
                    "pattern length ({} samples) exceeds search length ({} samples)",
                    pattern, search
                )
            }
            MatchError::MalformedWav(msg) => write!(f, "malformed WAV: {}", msg),
            MatchError::Decode(msg) => write!(f, "decode failed: {}", msg),
            MatchError::Resource(msg) => write!(f, "resource error: {}", msg),
            MatchError::Fft(msg) => write!(f, "FFT error: {}", msg),
        }
    }
}

impl std::error::Error for MatchError {}

impl From<std::io::Error> for MatchError {
    fn from(err: std::io::Error) -> Self {
        MatchError::Input(err.to_string())
    }
}

impl MatchError {
    /// True for errors caused by what the caller handed in, as opposed to engine resources.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MatchError::Input(_) |
                MatchError::PatternTooLong { .. } |
                MatchError::MalformedWav(_) |
                MatchError::Decode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, MatchError>;
