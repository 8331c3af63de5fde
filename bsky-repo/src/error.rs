use libipld::Cid;

/// Result type for repository operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors from the block store, the object codec and the DAG checks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The block is not in the store.
    #[error("block not found: {0}")]
    NotFound(Cid),
    /// The block exists but does not decode into the expected shape.
    #[error("failed to decode block: {0}")]
    Decode(String),
    /// A value could not be encoded.
    #[error("failed to encode value: {0}")]
    Encode(String),
    /// A transfer bundle is malformed.
    #[error("malformed bundle: {0}")]
    Format(#[from] bsky_car::Error),
    /// A block reachable from the claimed root was neither stored nor transferred.
    #[error("incomplete graph, missing block {missing}")]
    IncompleteGraph {
        /// The first missing block found by the walk.
        missing: Cid,
    },
    /// The data of a block does not hash to its CID.
    #[error("block data does not match cid {0}")]
    HashMismatch(Cid),
    /// The post index is structurally invalid.
    #[error("hamt: {0}")]
    Hamt(String),
    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(#[from] redb::Error),
}

impl Error {
    pub(crate) fn decode(err: impl std::fmt::Display) -> Self {
        Error::Decode(err.to_string())
    }

    pub(crate) fn encode(err: impl std::fmt::Display) -> Self {
        Error::Encode(err.to_string())
    }
}
