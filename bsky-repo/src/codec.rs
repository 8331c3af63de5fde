//! Typed records on top of a [`BlockStore`].

use libipld::cbor::DagCborCodec;
use libipld::codec::{Decode, Encode};
use libipld::Cid;
use tracing::trace;

use crate::block::{self, Block};
use crate::error::Result;
use crate::store::BlockStore;

/// Stores and loads dag-cbor encoded values.
///
/// Encoding is deterministic, so equal values always map to the same CID.
#[derive(Debug, Clone)]
pub struct ObjectStore<S> {
    store: S,
}

impl<S: BlockStore> ObjectStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Encodes `value` and stores the resulting block.
    pub fn put<T: Encode<DagCborCodec>>(&self, value: &T) -> Result<Cid> {
        let block = Block::encode(value)?;
        trace!(cid = %block.cid(), len = block.data().len(), "put object");
        self.store.put(&block)
    }

    /// Loads and decodes the object at `cid`.
    ///
    /// Fails with [`crate::Error::NotFound`] if the block is missing and with
    /// [`crate::Error::Decode`] if it has a different shape.
    pub fn get<T: Decode<DagCborCodec>>(&self, cid: &Cid) -> Result<T> {
        let data = self.store.get(cid)?;
        block::decode(cid, &data)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

/// Format-aware link scan of a block.
pub fn links(block: &Block) -> Result<Vec<Cid>> {
    block.links()
}
