//! Content-addressed user repositories.
//!
//! A repository is a Merkle-DAG of dag-cbor blocks: a [`User`] record links to the root
//! of a [`Hamt`] holding the user's [`Post`]s, and an optional [`SignedRoot`] envelope
//! wraps the user record for publication.
//!
//! The crate provides the block stores, the typed object codec, the post index, the car
//! bundle import/export used for synchronization and the graph completeness check that
//! guards every incoming bundle.

pub mod block;
pub mod codec;
pub mod dag;
mod error;
pub mod hamt;
pub mod posts;
pub mod repo;
pub mod store;
pub mod types;
pub mod verify;

pub use crate::block::Block;
pub use crate::codec::ObjectStore;
pub use crate::error::{Error, Result};
pub use crate::hamt::Hamt;
pub use crate::posts::Posts;
pub use crate::repo::{Repo, RepoRoot};
pub use crate::store::{BlockStore, Layered, MemBlockStore, RedbBlockStore};
pub use crate::types::{Post, SignedRoot, User};
pub use crate::verify::GraphVerifier;

pub use libipld::Cid;
