use libipld::cbor::DagCborCodec;
use libipld::codec::Codec;
use libipld::Cid;

use crate::error::Error;

/// The only bundle version this crate reads or writes.
const VERSION: u64 = 1;

/// The header frame of a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq, libipld::DagCbor)]
pub struct CarHeader {
    #[ipld]
    roots: Vec<Cid>,
    #[ipld]
    version: u64,
}

impl CarHeader {
    /// A version 1 header.
    pub fn new_v1(roots: Vec<Cid>) -> Self {
        Self {
            roots,
            version: VERSION,
        }
    }

    /// Parses a header frame.
    ///
    /// A header must name at least one root, and at most `max_roots` when given.
    pub fn decode(frame: &[u8], max_roots: Option<usize>) -> Result<Self, Error> {
        let header: Self = DagCborCodec
            .decode(frame)
            .map_err(|e| Error::Parsing(format!("bad header: {e}")))?;
        if header.version != VERSION {
            return Err(Error::InvalidFile(format!(
                "version {} not supported",
                header.version
            )));
        }
        let n = header.roots.len();
        if n == 0 {
            return Err(Error::Parsing("header names no roots".to_string()));
        }
        if let Some(max) = max_roots.filter(|max| n > *max) {
            return Err(Error::InvalidFile(format!("{n} roots, at most {max} allowed")));
        }
        Ok(header)
    }

    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        DagCborCodec
            .encode(self)
            .map_err(|e| Error::Cbor(e.to_string()))
    }

    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    pub fn version(&self) -> u64 {
        self.version
    }
}
