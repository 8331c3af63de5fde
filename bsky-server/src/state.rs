//! Shared state for the bsky server

use std::sync::Arc;

use bsky_auth::{
    Authorizer, DidKeyResolver, DidResolver, MemTokenStore, NestedCapabilities, TokenStore,
};
use bsky_repo::RedbBlockStore;

use crate::{config::Config, registry::Registry, sync::CAP_POST};

/// The shared app state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Blocks of every accepted repository.
    pub store: Arc<RedbBlockStore>,
    /// Published roots.
    pub registry: Arc<Registry>,
    /// Token verification settings.
    pub auth: Arc<AuthState>,
}

/// What the server needs to check tokens.
#[derive(Debug)]
pub struct AuthState {
    /// Checks audience and attenuations.
    pub authorizer: Authorizer,
    /// Capabilities known to the server.
    pub capabilities: NestedCapabilities,
    /// Resource kind of account attenuations.
    pub account_kind: String,
    /// Bound on proof chains.
    pub max_chain_depth: usize,
    /// Proofs referenced by CID.
    pub tokens: MemTokenStore,
    resolver: DidKeyResolver,
}

impl AppState {
    /// Creates the state for `config` on top of `store`.
    pub fn new(config: &Config, store: RedbBlockStore) -> Self {
        Self {
            store: Arc::new(store),
            registry: Arc::new(Registry::new()),
            auth: Arc::new(AuthState {
                authorizer: Authorizer::new(config.service_did.as_str()),
                capabilities: NestedCapabilities::new([CAP_POST]),
                account_kind: config.account_kind.clone(),
                max_chain_depth: config.max_chain_depth,
                tokens: MemTokenStore::new(),
                resolver: DidKeyResolver,
            }),
        }
    }

    pub(crate) fn resolver(&self) -> &dyn DidResolver {
        &self.auth.resolver
    }

    pub(crate) fn tokens(&self) -> &dyn TokenStore {
        &self.auth.tokens
    }

    pub(crate) fn authorizer(&self) -> &Authorizer {
        &self.auth.authorizer
    }
}
