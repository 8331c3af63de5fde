//! Signing keys.

use std::fmt::{self, Debug, Display};
use std::str::FromStr;

use data_encoding::HEXLOWER;
use ed25519_dalek::{Signer, SigningKey};

use crate::did::PublicKey;
use crate::error::AuthError;

/// An ed25519 secret key.
#[derive(Clone)]
pub struct SecretKey {
    secret: SigningKey,
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({})", self.did())
    }
}

/// Lowercase hex of the secret bytes.
impl Display for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.to_bytes()))
    }
}

impl FromStr for SecretKey {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER
            .decode(s.trim().as_bytes())
            .map_err(AuthError::malformed)?;
        let bytes = <[u8; 32]>::try_from(bytes.as_slice())
            .map_err(|_| AuthError::Malformed(format!("secret key has {} bytes", bytes.len())))?;
        Ok(Self::from_bytes(&bytes))
    }
}

impl SecretKey {
    /// Generates a new key from the OS random number generator.
    pub fn generate() -> Self {
        let secret = SigningKey::generate(&mut rand::rngs::OsRng);
        Self { secret }
    }

    pub fn public(&self) -> PublicKey {
        PublicKey::Ed25519(self.secret.verifying_key())
    }

    /// The `did:key` DID of this key.
    pub fn did(&self) -> String {
        self.public().to_did()
    }

    /// Signs `msg`, returning the 64 byte signature.
    pub fn sign(&self, msg: &[u8]) -> Vec<u8> {
        self.secret.sign(msg).to_bytes().to_vec()
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = SigningKey::from_bytes(bytes);
        SecretKey { secret }
    }
}

impl From<[u8; 32]> for SecretKey {
    fn from(value: [u8; 32]) -> Self {
        Self::from_bytes(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let key = SecretKey::generate();
        let parsed: SecretKey = key.to_string().parse().unwrap();
        assert_eq!(parsed.to_bytes(), key.to_bytes());
        assert_eq!(parsed.did(), key.did());
        assert!("abcd".parse::<SecretKey>().is_err());
    }
}
