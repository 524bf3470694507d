use chrono::NaiveDateTime;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Domain errors
// ---------------------------------------------------------------------------

/// Failures raised by the grid and dataset pipeline itself.
///
/// I/O and file-format problems are reported through `anyhow` at the edges
/// (loader, writer, CLI); this enum covers everything the pure transforms can
/// reject.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid slot key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("timestamp {0} cannot be encoded as a slot key")]
    UnencodableTimestamp(NaiveDateTime),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("timestamps must be strictly increasing (violated at index {0})")]
    UnorderedTimestamps(usize),

    #[error("flow channels of frame {0} hold different histograms")]
    DivergentFlows(usize),

    #[error("degenerate value range: min and max are both {0}")]
    DegenerateRange(f64),

    #[error("not enough samples: need more than {needed}, have {available}")]
    InsufficientSamples { needed: usize, available: usize },

    #[error("empty input: {0}")]
    EmptyInput(&'static str),
}
