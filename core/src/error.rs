use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Bad magic tag: expected \"RMAP\", found {found:?}")]
    BadMagic { found: [u8; 4] },

    #[error("Payload size mismatch: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),
}

impl Error {
    pub fn dimension_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionMismatch(msg.into())
    }

    pub fn invalid_parameters(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }

    /// True when the error came from an exhausted allocator rather than bad input.
    pub fn is_allocation_failure(&self) -> bool {
        matches!(self, Self::AllocationFailed { .. })
    }
}

/// Check that a buffer holds exactly `width * height * channels` elements.
pub fn check_buffer_len(what: &str, len: usize, width: u32, height: u32, channels: usize) -> Result<()> {
    let expected = width as usize * height as usize * channels;
    if len != expected {
        return Err(Error::DimensionMismatch(format!(
            "{what}: expected {expected} elements for {width}x{height}x{channels}, got {len}"
        )));
    }
    Ok(())
}
