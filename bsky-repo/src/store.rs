//! Content-addressed block stores.
//!
//! Stores only grow: a block is written at most once and never updated or removed.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use libipld::Cid;
use parking_lot::RwLock;
use tracing::trace;

use crate::block::{verify_hash, Block};
use crate::error::{Error, Result};

mod redb;

pub use self::redb::RedbBlockStore;

/// A write-once, content-addressed key to bytes store.
pub trait BlockStore: std::fmt::Debug + Send + Sync {
    /// Stores `data` under `cid` unless the key is already present.
    ///
    /// The caller guarantees that `data` hashes to `cid`.
    fn insert(&self, cid: &Cid, data: &Bytes) -> Result<()>;

    /// Returns the bytes stored under `cid`, failing with [`Error::NotFound`].
    fn get(&self, cid: &Cid) -> Result<Bytes>;

    /// Returns whether a block is stored under `cid`.
    fn has(&self, cid: &Cid) -> Result<bool>;

    /// Lists all stored keys. Only used for bulk copies.
    fn all_keys(&self) -> Result<Vec<Cid>>;

    /// Stores many blocks at once.
    fn insert_many(&self, blocks: &[(Cid, Bytes)]) -> Result<()> {
        for (cid, data) in blocks {
            self.insert(cid, data)?;
        }
        Ok(())
    }

    /// Stores a block and returns its CID. Idempotent.
    fn put(&self, block: &Block) -> Result<Cid> {
        self.insert(block.cid(), block.data())?;
        Ok(*block.cid())
    }

    /// Stores untrusted data under `cid`, checking the digest first.
    fn put_keyed(&self, cid: &Cid, data: Bytes) -> Result<()> {
        if verify_hash(cid, &data) != Some(true) {
            return Err(Error::HashMismatch(*cid));
        }
        self.insert(cid, &data)
    }

    /// Fetches a block by CID.
    fn get_block(&self, cid: &Cid) -> Result<Block> {
        let data = self.get(cid)?;
        Block::from_parts(*cid, data)
    }

    /// Copies every block of this store into `to`.
    fn copy_into(&self, to: &dyn BlockStore) -> Result<usize> {
        let blocks = self
            .all_keys()?
            .into_iter()
            .map(|cid| Ok((cid, self.get(&cid)?)))
            .collect::<Result<Vec<_>>>()?;
        to.insert_many(&blocks)?;
        Ok(blocks.len())
    }
}

impl<S: BlockStore + ?Sized> BlockStore for &S {
    fn insert(&self, cid: &Cid, data: &Bytes) -> Result<()> {
        (**self).insert(cid, data)
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        (**self).get(cid)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn all_keys(&self) -> Result<Vec<Cid>> {
        (**self).all_keys()
    }

    fn insert_many(&self, blocks: &[(Cid, Bytes)]) -> Result<()> {
        (**self).insert_many(blocks)
    }
}

impl<S: BlockStore + ?Sized> BlockStore for Arc<S> {
    fn insert(&self, cid: &Cid, data: &Bytes) -> Result<()> {
        (**self).insert(cid, data)
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        (**self).get(cid)
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid)
    }

    fn all_keys(&self) -> Result<Vec<Cid>> {
        (**self).all_keys()
    }

    fn insert_many(&self, blocks: &[(Cid, Bytes)]) -> Result<()> {
        (**self).insert_many(blocks)
    }
}

/// An in-memory block store.
#[derive(Debug, Default)]
pub struct MemBlockStore {
    blocks: RwLock<HashMap<Cid, Bytes>>,
}

impl MemBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blocks.
    pub fn len(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.read().is_empty()
    }
}

impl BlockStore for MemBlockStore {
    fn insert(&self, cid: &Cid, data: &Bytes) -> Result<()> {
        let mut blocks = self.blocks.write();
        if !blocks.contains_key(cid) {
            trace!(%cid, len = data.len(), "insert block");
            blocks.insert(*cid, data.clone());
        }
        Ok(())
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        self.blocks
            .read()
            .get(cid)
            .cloned()
            .ok_or(Error::NotFound(*cid))
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.blocks.read().contains_key(cid))
    }

    fn all_keys(&self) -> Result<Vec<Cid>> {
        Ok(self.blocks.read().keys().copied().collect())
    }

    fn insert_many(&self, blocks: &[(Cid, Bytes)]) -> Result<()> {
        let mut store = self.blocks.write();
        for (cid, data) in blocks {
            store.entry(*cid).or_insert_with(|| data.clone());
        }
        Ok(())
    }
}

/// A read view of `staging` on top of `base`. Writes go to `staging`.
///
/// Used to decode an incoming DAG before any of it is merged into `base`.
#[derive(Debug)]
pub struct Layered<'a, S: ?Sized, B: ?Sized> {
    staging: &'a S,
    base: &'a B,
}

impl<'a, S: BlockStore + ?Sized, B: BlockStore + ?Sized> Layered<'a, S, B> {
    pub fn new(staging: &'a S, base: &'a B) -> Self {
        Self { staging, base }
    }
}

impl<S: BlockStore + ?Sized, B: BlockStore + ?Sized> BlockStore for Layered<'_, S, B> {
    fn insert(&self, cid: &Cid, data: &Bytes) -> Result<()> {
        self.staging.insert(cid, data)
    }

    fn get(&self, cid: &Cid) -> Result<Bytes> {
        match self.staging.get(cid) {
            Err(Error::NotFound(_)) => self.base.get(cid),
            res => res,
        }
    }

    fn has(&self, cid: &Cid) -> Result<bool> {
        Ok(self.staging.has(cid)? || self.base.has(cid)?)
    }

    /// Keys of the staging layer only.
    fn all_keys(&self) -> Result<Vec<Cid>> {
        self.staging.all_keys()
    }
}
