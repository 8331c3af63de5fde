//! The published root of every registered user.

use std::{collections::HashMap, sync::Arc};

use bsky_repo::Cid;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::sync::UpdateError;

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// DID of the user.
    pub did: String,
    /// Display name, unique across the registry.
    pub name: String,
    /// The token issuer that registered the user; updates must be rooted at this issuer.
    pub issuer: String,
    /// The currently published root.
    pub root: Cid,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Arc<Mutex<Entry>>>,
    /// Display name to DID.
    names: HashMap<String, String>,
}

/// Maps identities to their published roots.
///
/// The map itself is behind one lock that is only held to add or find entries. Each entry
/// has its own lock, so publishing for one user never waits on another.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether [`Registry::register`] would accept the registration, without
    /// changing anything.
    ///
    /// Returns `true` if the identical registration already exists.
    pub fn check_register(
        &self,
        did: &str,
        name: &str,
        issuer: &str,
        root: Cid,
    ) -> Result<bool, UpdateError> {
        Self::check(&self.inner.read(), did, name, issuer, root)
    }

    fn check(inner: &Inner, did: &str, name: &str, issuer: &str, root: Cid) -> Result<bool, UpdateError> {
        if inner.names.get(name).is_some_and(|owner| owner != did) {
            return Err(UpdateError::AlreadyRegistered(name.to_string()));
        }
        let Some(entry) = inner.entries.get(did) else {
            return Ok(false);
        };
        let entry = entry.lock();
        if entry.issuer != issuer || entry.name != name {
            return Err(UpdateError::AlreadyRegistered(did.to_string()));
        }
        if entry.root != root {
            return Err(UpdateError::Conflict { current: entry.root });
        }
        Ok(true)
    }

    /// Registers `did` under `name` with `root` as its first published root.
    ///
    /// Registering the same identity again with the same issuer, name and root is a no-op.
    pub fn register(&self, did: &str, name: &str, issuer: &str, root: Cid) -> Result<(), UpdateError> {
        let mut inner = self.inner.write();
        if Self::check(&inner, did, name, issuer, root)? {
            debug!(did, name, "already registered");
            return Ok(());
        }
        let entry = Entry {
            did: did.to_string(),
            name: name.to_string(),
            issuer: issuer.to_string(),
            root,
        };
        inner.names.insert(name.to_string(), did.to_string());
        inner
            .entries
            .insert(did.to_string(), Arc::new(Mutex::new(entry)));
        info!(did, name, %root, "registered user");
        Ok(())
    }

    /// The current root of `id`, which is either a DID or a display name.
    pub fn lookup(&self, id: &str) -> Result<Cid, UpdateError> {
        self.entry_by_id(id)
            .map(|entry| entry.root)
            .ok_or_else(|| UpdateError::NotFound(id.to_string()))
    }

    /// The DID registered under `name`.
    pub fn resolve_name(&self, name: &str) -> Option<String> {
        self.inner.read().names.get(name).cloned()
    }

    /// A snapshot of the entry for `did`.
    pub fn entry(&self, did: &str) -> Option<Entry> {
        let handle = self.inner.read().entries.get(did).cloned()?;
        let entry = handle.lock().clone();
        Some(entry)
    }

    fn entry_by_id(&self, id: &str) -> Option<Entry> {
        if id.starts_with("did:") {
            return self.entry(id);
        }
        let did = self.resolve_name(id)?;
        self.entry(&did)
    }

    /// Replaces the root of `did` with `new_root` if it still is `expected_prev`.
    ///
    /// Fails with [`UpdateError::Conflict`] carrying the current root otherwise.
    pub fn publish(
        &self,
        did: &str,
        expected_prev: Option<Cid>,
        new_root: Cid,
    ) -> Result<(), UpdateError> {
        let handle = self
            .inner
            .read()
            .entries
            .get(did)
            .cloned()
            .ok_or_else(|| UpdateError::NotFound(did.to_string()))?;
        let mut entry = handle.lock();
        if expected_prev != Some(entry.root) {
            debug!(did, current = %entry.root, ?expected_prev, "publish conflict");
            return Err(UpdateError::Conflict {
                current: entry.root,
            });
        }
        entry.root = new_root;
        info!(did, %new_root, "published root");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;

    use bsky_repo::{block::RAW, Block};

    use super::*;

    fn cid(data: &[u8]) -> Cid {
        *Block::new(RAW, data.to_vec()).cid()
    }

    #[test]
    fn register_and_lookup() {
        let registry = Registry::new();
        let root = cid(b"root");
        registry
            .register("did:key:alice", "alice", "did:key:alice", root)
            .unwrap();
        assert_eq!(registry.lookup("did:key:alice").unwrap(), root);
        assert_eq!(registry.lookup("alice").unwrap(), root);
        assert!(matches!(registry.lookup("bob"), Err(UpdateError::NotFound(_))));
        assert_eq!(
            registry.resolve_name("alice").as_deref(),
            Some("did:key:alice")
        );

        // same registration again is fine
        registry
            .register("did:key:alice", "alice", "did:key:alice", root)
            .unwrap();
        // another identity cannot take the name
        assert!(matches!(
            registry.register("did:key:mallory", "alice", "did:key:mallory", root),
            Err(UpdateError::AlreadyRegistered(_))
        ));
        // nor can another issuer take the identity
        assert!(matches!(
            registry.register("did:key:alice", "alice", "did:key:mallory", root),
            Err(UpdateError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            registry.register("did:key:alice", "alice", "did:key:alice", cid(b"other")),
            Err(UpdateError::Conflict { .. })
        ));
    }

    #[test]
    fn check_register_leaves_registry_untouched() {
        let registry = Registry::new();
        let root = cid(b"root");
        assert!(!registry
            .check_register("did:key:alice", "alice", "did:key:alice", root)
            .unwrap());
        assert!(registry.resolve_name("alice").is_none());

        registry
            .register("did:key:alice", "alice", "did:key:alice", root)
            .unwrap();
        assert!(registry
            .check_register("did:key:alice", "alice", "did:key:alice", root)
            .unwrap());
        assert!(matches!(
            registry.check_register("did:key:mallory", "alice", "did:key:mallory", root),
            Err(UpdateError::AlreadyRegistered(_))
        ));
        assert!(matches!(
            registry.check_register("did:key:alice", "alice", "did:key:alice", cid(b"other")),
            Err(UpdateError::Conflict { .. })
        ));
        assert_eq!(registry.lookup("alice").unwrap(), root);
    }

    #[test]
    fn publish_is_compare_and_swap() {
        let registry = Registry::new();
        let first = cid(b"first");
        let second = cid(b"second");
        registry
            .register("did:key:alice", "alice", "did:key:alice", first)
            .unwrap();
        assert!(matches!(
            registry.publish("did:key:alice", None, second),
            Err(UpdateError::Conflict { current }) if current == first
        ));
        registry
            .publish("did:key:alice", Some(first), second)
            .unwrap();
        assert!(matches!(
            registry.publish("did:key:alice", Some(first), cid(b"third")),
            Err(UpdateError::Conflict { current }) if current == second
        ));
        assert!(matches!(
            registry.publish("did:key:bob", Some(first), second),
            Err(UpdateError::NotFound(_))
        ));
    }

    #[test]
    fn concurrent_publish_has_one_winner() {
        const N: usize = 16;
        let registry = Arc::new(Registry::new());
        let base = cid(b"base");
        registry
            .register("did:key:alice", "alice", "did:key:alice", base)
            .unwrap();

        let barrier = Arc::new(Barrier::new(N));
        let handles: Vec<_> = (0..N)
            .map(|i| {
                let registry = registry.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let root = cid(format!("update {i}").as_bytes());
                    barrier.wait();
                    registry
                        .publish("did:key:alice", Some(base), root)
                        .map(|_| root)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert_eq!(registry.lookup("alice").unwrap(), *winners[0]);
        for res in &results {
            if let Err(err) = res {
                assert!(
                    matches!(err, UpdateError::Conflict { current } if current == winners[0]),
                    "{err:?}"
                );
            }
        }
    }
}
