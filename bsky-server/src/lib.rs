//! An aggregator for user repositories.
//!
//! Users register a repository rooted at their user record and then push signed updates.
//! Every update is a car bundle of the changed blocks. It is only merged into the durable
//! store once the bundle is complete and the capability token presented with it allows
//! the change.

#![warn(missing_docs)]

pub mod config;
pub mod http;
pub mod registry;
pub mod server;
pub mod state;
pub mod sync;
