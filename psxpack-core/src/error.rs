use thiserror::Error;

/// Errors produced while reading or writing disc image structures.
#[derive(Debug, Error)]
pub enum DiscError {
    /// I/O error on the image or a host file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A sector could not be read from the image
    #[error("error reading sector {lbn} of image file: {reason}")]
    SectorRead { lbn: u32, reason: String },

    /// Malformed on-disc structure, CUE sheet, or timestamp
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// A structural rule of the image was violated
    #[error("{0}")]
    Invariant(String),
}

impl DiscError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::Invariant(msg.into())
    }

    pub fn sector_read(lbn: u32, reason: impl Into<String>) -> Self {
        Self::SectorRead {
            lbn,
            reason: reason.into(),
        }
    }
}
