//! `did:key` identifiers for ed25519 keys.
//!
//! A DID is `did:key:z` followed by the base58btc encoding of the multicodec tagged
//! public key bytes.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use ed25519_dalek::{Signature, VerifyingKey};

use crate::error::AuthError;

pub const DID_KEY_PREFIX: &str = "did:key:";

/// Multibase prefix for base58btc.
const BASE58BTC: char = 'z';

/// Multicodec varint for ed25519 public keys.
const ED25519_PUB: [u8; 2] = [0xed, 0x01];

/// A public key a DID can resolve to.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum PublicKey {
    Ed25519(VerifyingKey),
}

impl PublicKey {
    /// Verifies `signature` over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), AuthError> {
        match self {
            PublicKey::Ed25519(key) => {
                let signature =
                    Signature::from_slice(signature).map_err(|_| AuthError::BadSignature)?;
                key.verify_strict(message, &signature)
                    .map_err(|_| AuthError::BadSignature)
            }
        }
    }

    /// The `did:key` DID of this key.
    pub fn to_did(&self) -> String {
        match self {
            PublicKey::Ed25519(key) => {
                let mut bytes = ED25519_PUB.to_vec();
                bytes.extend_from_slice(key.as_bytes());
                format!(
                    "{DID_KEY_PREFIX}{BASE58BTC}{}",
                    bs58::encode(bytes).into_string()
                )
            }
        }
    }

    /// Parses a `did:key` DID.
    pub fn from_did(did: &str) -> Result<Self, AuthError> {
        let invalid = |reason: &str| AuthError::InvalidDid(format!("{did}: {reason}"));
        let encoded = did
            .strip_prefix(DID_KEY_PREFIX)
            .ok_or_else(|| invalid("not a did:key"))?;
        let encoded = encoded
            .strip_prefix(BASE58BTC)
            .ok_or_else(|| invalid("expected base58btc encoding"))?;
        let bytes = bs58::decode(encoded)
            .into_vec()
            .map_err(|_| invalid("bad base58"))?;
        let key = bytes
            .strip_prefix(&ED25519_PUB[..])
            .ok_or_else(|| invalid("unsupported key type"))?;
        let key = <[u8; 32]>::try_from(key).map_err(|_| invalid("bad key length"))?;
        let key = VerifyingKey::from_bytes(&key).map_err(|_| invalid("bad ed25519 key"))?;
        Ok(PublicKey::Ed25519(key))
    }
}

impl Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_did())
    }
}

impl Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_did())
    }
}

impl FromStr for PublicKey {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_did(s)
    }
}

/// Resolves a DID to the key that signs on its behalf.
pub trait DidResolver: Debug + Send + Sync {
    fn resolve(&self, did: &str) -> Result<PublicKey, AuthError>;
}

/// Resolves `did:key` DIDs, which carry their key inline.
#[derive(Debug, Default, Clone, Copy)]
pub struct DidKeyResolver;

impl DidResolver for DidKeyResolver {
    fn resolve(&self, did: &str) -> Result<PublicKey, AuthError> {
        PublicKey::from_did(did)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::SecretKey;

    #[test]
    fn did_roundtrip() {
        let key = SecretKey::generate();
        let did = key.public().to_did();
        assert!(did.starts_with("did:key:z6Mk"), "{did}");
        assert_eq!(PublicKey::from_did(&did).unwrap(), key.public());
        assert_eq!(DidKeyResolver.resolve(&did).unwrap(), key.public());
    }

    #[test]
    fn known_did_parses() {
        let did = "did:key:z6Mkmi4eUvWtRAP6PNB7MnGfUFdLkGe255ftW9sGo28uv44g";
        let key: PublicKey = did.parse().unwrap();
        assert_eq!(key.to_did(), did);
    }

    #[test]
    fn rejects_bad_dids() {
        for did in [
            "did:web:example.com",
            "did:key:6Mkmi4eUvWtRAP6PNB7MnGfUFdLkGe255ftW9sGo28uv44g",
            "did:key:z0OIl",
            "did:key:z6Mkmi4eUvWt",
        ] {
            assert!(
                matches!(PublicKey::from_did(did), Err(AuthError::InvalidDid(_))),
                "{did}"
            );
        }
    }

    #[test]
    fn signature_check() {
        let key = SecretKey::generate();
        let sig = key.sign(b"hello");
        key.public().verify(b"hello", &sig).unwrap();
        assert!(matches!(
            key.public().verify(b"jello", &sig),
            Err(AuthError::BadSignature)
        ));
        assert!(matches!(
            key.public().verify(b"hello", &sig[..10]),
            Err(AuthError::BadSignature)
        ));
    }
}
