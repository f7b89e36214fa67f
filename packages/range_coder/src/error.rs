use thiserror::Error;

/// Result type for range coder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Data errors recorded by the range coder.
///
/// These are never returned from individual coding operations. The first one
/// encountered is stored in the coder's sticky error slot and stays there until
/// the coder is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// The encoder ran out of buffer space. Bytes that did not fit were dropped.
    #[error("Range coder buffer overflow: {storage} byte buffer is full")]
    CapacityOverflow {
        /// Capacity of the frame buffer in bytes.
        storage: usize,
    },

    /// The decoder reconstructed an unsigned integer outside `[0, total)`.
    #[error("Stream corruption: decoded value {value} >= total {total}")]
    StreamCorruption {
        /// The out-of-range value that was reconstructed.
        value: u32,
        /// The exclusive upper bound the value was coded with.
        total: u32,
    },

    /// Initial bits were patched before that many bits had been encoded.
    #[error("Cannot patch {0} initial bits before they have been encoded")]
    NotEnoughBits(u32),
}
