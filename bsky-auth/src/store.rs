//! Tokens referenced by CID from proof lists.

use std::collections::HashMap;
use std::fmt::Debug;

use libipld::multihash::{Code, MultihashDigest};
use libipld::Cid;
use parking_lot::RwLock;

use crate::error::AuthError;

/// Multicodec for raw bytes, tokens are stored as their encoded string.
const RAW: u64 = 0x55;

/// Lookup of encoded tokens by content address.
pub trait TokenStore: Debug + Send + Sync {
    /// Stores an encoded token and returns its CID.
    fn put_token(&self, raw: &str) -> Result<Cid, AuthError>;

    fn get_token(&self, cid: &Cid) -> Result<Option<String>, AuthError>;
}

/// The CID an encoded token is stored under.
pub fn token_cid(raw: &str) -> Cid {
    Cid::new_v1(RAW, Code::Sha2_256.digest(raw.as_bytes()))
}

/// Keeps tokens in memory.
#[derive(Debug, Default)]
pub struct MemTokenStore {
    tokens: RwLock<HashMap<Cid, String>>,
}

impl MemTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemTokenStore {
    fn put_token(&self, raw: &str) -> Result<Cid, AuthError> {
        let cid = token_cid(raw);
        self.tokens
            .write()
            .entry(cid)
            .or_insert_with(|| raw.to_string());
        Ok(cid)
    }

    fn get_token(&self, cid: &Cid) -> Result<Option<String>, AuthError> {
        Ok(self.tokens.read().get(cid).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get() {
        let store = MemTokenStore::new();
        let cid = store.put_token("a.b.c").unwrap();
        assert_eq!(cid, token_cid("a.b.c"));
        assert_eq!(store.get_token(&cid).unwrap().as_deref(), Some("a.b.c"));
        assert_eq!(store.get_token(&token_cid("x.y.z")).unwrap(), None);
    }
}
