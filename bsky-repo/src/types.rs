//! Records stored in a user repository.

use libipld::cbor::DagCborCodec;
use libipld::codec::Codec;
use libipld::{Cid, DagCbor};

use crate::error::{Error, Result};

/// A user profile, the root of the user's content.
#[derive(Debug, Clone, PartialEq, Eq, DagCbor)]
pub struct User {
    pub did: String,
    pub name: String,
    /// Root of the post index.
    pub posts_root: Cid,
    /// Number of posts, also the key of the next post.
    pub next_post: i64,
    /// DIDs the user follows.
    pub follows: Vec<String>,
}

/// A single post.
#[derive(Debug, Clone, PartialEq, Eq, DagCbor)]
pub struct Post {
    /// RFC 3339 timestamp.
    pub timestamp: String,
    pub body: String,
}

/// A publication envelope around a [`User`] record.
///
/// `sig` is the ed25519 signature of the user's key over the dag-cbor encoding of
/// [`RootPayload`].
#[derive(Debug, Clone, PartialEq, Eq, DagCbor)]
pub struct SignedRoot {
    pub user: Cid,
    /// The root this update replaces. Publication is refused unless it is still current.
    pub prev: Option<Cid>,
    pub sig: Box<[u8]>,
}

/// The signed part of a [`SignedRoot`].
#[derive(Debug, Clone, PartialEq, Eq, DagCbor)]
pub struct RootPayload {
    pub user: Cid,
    pub prev: Option<Cid>,
}

impl SignedRoot {
    pub fn payload(&self) -> RootPayload {
        RootPayload {
            user: self.user,
            prev: self.prev,
        }
    }

    /// The bytes covered by `sig`.
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        self.payload().signing_bytes()
    }
}

impl RootPayload {
    pub fn signing_bytes(&self) -> Result<Vec<u8>> {
        DagCborCodec.encode(self).map_err(Error::encode)
    }
}
