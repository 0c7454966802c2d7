use thiserror::Error;

/// Errors raised by node operations.
///
/// `TooLargeEntry` and the two fatal kinds map directly onto the error
/// kinds a page node can raise; `Corrupt` covers malformed bytes discovered
/// while decoding a page that is supposed to already be well-formed. All of
/// these are fatal to the current latch session: callers must discard the
/// `Node` rather than attempt to keep mutating it.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("entry of {size} bytes exceeds max entry size {max}")]
    TooLargeEntry { size: usize, max: usize },

    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("latch protocol misuse: {0}")]
    LatchProtocolMisuse(String),

    #[error("page corrupt: {0}")]
    Corrupt(String),
}

impl NodeError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        NodeError::InvariantViolation(msg.into())
    }

    pub(crate) fn latch_misuse(msg: impl Into<String>) -> Self {
        NodeError::LatchProtocolMisuse(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        NodeError::Corrupt(msg.into())
    }
}
