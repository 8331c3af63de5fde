/// Reasons a token is rejected.
///
/// Every variant is fatal, a token that fails any check grants nothing.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("unsupported algorithm {0}")]
    UnsupportedAlgorithm(String),
    #[error("bad signature")]
    BadSignature,
    #[error("invalid did: {0}")]
    InvalidDid(String),
    #[error("unknown capability {0}")]
    UnknownCapability(String),
    #[error("token expired at {exp}")]
    Expired { exp: i64 },
    #[error("token not valid before {nbf}")]
    NotYetValid { nbf: i64 },
    #[error("token audience {actual} does not match {expected}")]
    AudienceMismatch { expected: String, actual: String },
    #[error("token does not grant the required attenuations")]
    AttenuationDenied,
    #[error("proof issued to {audience} cannot delegate to {issuer}")]
    DelegationMismatch { issuer: String, audience: String },
    #[error("proof chain deeper than {0}")]
    ChainTooLong(usize),
    #[error("proof {0} not found")]
    MissingProof(String),
}

impl AuthError {
    pub(crate) fn malformed(err: impl std::fmt::Display) -> Self {
        AuthError::Malformed(err.to_string())
    }
}
