//! Blocks, CIDs and link extraction.

use std::collections::BTreeSet;

use bytes::Bytes;
use libipld::cbor::DagCborCodec;
use libipld::codec::{Codec, Decode, Encode};
use libipld::multihash::{Code, MultihashDigest};
use libipld::{Cid, Ipld};

use crate::error::{Error, Result};

/// Multicodec for dag-cbor blocks.
pub const DAG_CBOR: u64 = 0x71;
/// Multicodec for opaque bytes.
pub const RAW: u64 = 0x55;

/// An immutable block of bytes together with its content identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
}

impl Block {
    /// Creates a block, hashing `data` with sha2-256.
    pub fn new(codec: u64, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let cid = Cid::new_v1(codec, Code::Sha2_256.digest(&data));
        Self { cid, data }
    }

    /// Creates a block from untrusted parts, checking that `data` hashes to `cid`.
    pub fn from_parts(cid: Cid, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        match verify_hash(&cid, &data) {
            Some(true) => Ok(Self { cid, data }),
            _ => Err(Error::HashMismatch(cid)),
        }
    }

    /// Encodes `value` as dag-cbor.
    pub fn encode<T: Encode<DagCborCodec>>(value: &T) -> Result<Self> {
        let data = DagCborCodec.encode(value).map_err(Error::encode)?;
        Ok(Self::new(DAG_CBOR, data))
    }

    /// Decodes the block as dag-cbor into `T`.
    pub fn decode<T: Decode<DagCborCodec>>(&self) -> Result<T> {
        decode(&self.cid, &self.data)
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn into_parts(self) -> (Cid, Bytes) {
        (self.cid, self.data)
    }

    /// The CIDs this block links to.
    pub fn links(&self) -> Result<Vec<Cid>> {
        parse_links(&self.cid, &self.data)
    }
}

/// Decodes dag-cbor `data` stored under `cid` into `T`.
pub fn decode<T: Decode<DagCborCodec>>(cid: &Cid, data: &[u8]) -> Result<T> {
    if cid.codec() != DAG_CBOR {
        return Err(Error::Decode(format!(
            "expected dag-cbor block, {cid} has codec {:#x}",
            cid.codec()
        )));
    }
    DagCborCodec.decode(data).map_err(Error::decode)
}

/// Verifies that the provided bytes hash to the given multihash.
///
/// Returns `None` if the hash function of the CID is not supported.
pub fn verify_hash(cid: &Cid, bytes: &[u8]) -> Option<bool> {
    Code::try_from(cid.hash().code()).ok().map(|code| {
        let calculated_hash = code.digest(bytes);
        &calculated_hash == cid.hash()
    })
}

/// Extract links from the given content.
///
/// The scan is codec aware, raw blocks never contain links. Links are returned sorted and
/// without duplicates.
pub fn parse_links(cid: &Cid, bytes: &[u8]) -> Result<Vec<Cid>> {
    let mut cids = BTreeSet::new();
    match cid.codec() {
        DAG_CBOR => DagCborCodec
            .references::<Ipld, _>(bytes, &mut cids)
            .map_err(Error::decode)?,
        RAW => {}
        other => {
            return Err(Error::Decode(format!(
                "unsupported codec {other:#x} for {cid}"
            )))
        }
    }
    Ok(cids.into_iter().collect())
}
