use libipld::cid;

/// Errors reading or writing a bundle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input is not a well formed bundle.
    #[error("malformed car bundle: {0}")]
    Parsing(String),
    /// The bundle is well formed but not acceptable.
    #[error("unsupported car bundle: {0}")]
    InvalidFile(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The header could not be encoded.
    #[error("failed to encode car header: {0}")]
    Cbor(String),
    /// A frame announced more than [`crate::MAX_FRAME_SIZE`] bytes.
    #[error("frame of {0} bytes exceeds the limit")]
    FrameTooLarge(usize),
    #[error("invalid cid: {0}")]
    Cid(#[from] cid::Error),
}
