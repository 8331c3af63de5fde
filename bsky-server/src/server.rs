//! The main server, wiring the block store, the registry and the HTTP surface.

use std::net::SocketAddr;

use anyhow::Result;
use bsky_repo::RedbBlockStore;
use tracing::info;

use crate::{config::Config, http::HttpServer, state::AppState};

/// Runs a server with `config` until `Ctrl-C`, then shuts it down gracefully.
pub async fn run_with_config_until_ctrl_c(config: Config) -> Result<()> {
    let store = if config.in_memory {
        RedbBlockStore::in_memory()?
    } else {
        RedbBlockStore::persistent(Config::block_store_path()?)?
    };
    let server = Server::spawn(config, store).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutdown");
    server.shutdown().await?;
    Ok(())
}

/// The bsky server.
#[derive(Debug)]
pub struct Server {
    http_server: HttpServer,
    state: AppState,
}

impl Server {
    /// Spawn the server.
    pub async fn spawn(config: Config, store: RedbBlockStore) -> Result<Self> {
        let state = AppState::new(&config, store);
        info!(service_did = %config.service_did, "starting server");
        let http_server = HttpServer::spawn(config.http, config.max_body_size, state.clone()).await?;
        Ok(Self { http_server, state })
    }

    /// The bound address of the HTTP server.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_server.http_addr()
    }

    /// The shared state, for inspection.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Stops accepting requests and waits for open ones to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.http_server.shutdown().await
    }

    /// Serves until the listener fails.
    pub async fn run_until_error(self) -> Result<()> {
        self.http_server.run_until_done().await
    }

    /// An in-memory server on a free localhost port, with the base URL to reach it.
    pub async fn spawn_for_tests() -> Result<(Self, String)> {
        Self::spawn_for_tests_with(Config::for_tests()).await
    }

    /// Like [`Self::spawn_for_tests`] with a custom config. The HTTP settings are replaced.
    pub async fn spawn_for_tests_with(config: Config) -> Result<(Self, String)> {
        let config = Config {
            http: Config::for_tests().http,
            in_memory: true,
            ..config
        };
        let store = RedbBlockStore::in_memory()?;
        let server = Self::spawn(config, store).await?;
        let url = format!("http://{}", server.http_addr());
        Ok((server, url))
    }
}
