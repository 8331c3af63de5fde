//! Capability tokens for repository updates.
//!
//! Tokens are JWT shaped and signed with ed25519 keys identified by `did:key` DIDs. A token
//! grants a set of [`Attenuations`] to its audience and may prove its authority with a
//! chain of parent tokens, each of which must grant at least as much as its child.

pub mod attenuation;
pub mod did;
mod error;
pub mod key;
pub mod store;
pub mod token;
pub mod verify;

pub use crate::attenuation::{
    AccountAttenuationParser, Attenuation, AttenuationParser, Attenuations, Capability,
    EmptyAttenuationParser, NestedCapabilities, Resource,
};
pub use crate::did::{DidKeyResolver, DidResolver, PublicKey};
pub use crate::error::AuthError;
pub use crate::key::SecretKey;
pub use crate::store::{MemTokenStore, TokenStore};
pub use crate::token::{Token, TokenBuilder};
pub use crate::verify::{Authorizer, TokenParser};
