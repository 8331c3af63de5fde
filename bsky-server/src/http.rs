//! The HTTP surface: routes, middleware and the listener task.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{ConnectInfo, DefaultBodyLimit},
    http::{Method, Request},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::{debug_span, info, Span};

mod error;
mod repo;
mod well_known;

pub use self::error::{AppError, AppResult};
use crate::state::AppState;

/// Where the HTTP server listens.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    /// Port to bind to, `0` picks a free one.
    pub port: u16,
    /// Address to bind to, all IPv4 interfaces when unset.
    pub bind_addr: Option<IpAddr>,
}

impl HttpConfig {
    fn socket_addr(&self) -> SocketAddr {
        let ip = self.bind_addr.unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.port)
    }
}

/// A running HTTP listener.
#[derive(Debug)]
pub struct HttpServer {
    task: JoinHandle<std::io::Result<()>>,
    cancel: CancellationToken,
    http_addr: SocketAddr,
}

impl HttpServer {
    /// Binds the listener and starts serving in a background task.
    pub async fn spawn(
        config: HttpConfig,
        max_body_size: usize,
        state: AppState,
    ) -> Result<HttpServer> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let http_addr = listener.local_addr()?;
        info!(%http_addr, "http server listening");

        let cancel = CancellationToken::new();
        let app = create_app(state, max_body_size)
            .into_make_service_with_connect_info::<SocketAddr>();
        let serve =
            axum::serve(listener, app).with_graceful_shutdown(cancel.clone().cancelled_owned());
        let task = tokio::spawn(async move { serve.await });

        Ok(HttpServer {
            task,
            cancel,
            http_addr,
        })
    }

    /// The address the listener is bound to.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Stops accepting connections and waits for open requests to finish.
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.run_until_done().await
    }

    /// Waits for the listener task. Only returns on shutdown or failure.
    pub async fn run_until_done(self) -> Result<()> {
        self.task
            .await
            .context("http task panicked")?
            .context("http server failed")
    }
}

fn request_span(request: &Request<Body>) -> Span {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    debug_span!(
        "request",
        method = %request.method(),
        path = request.uri().path(),
        ?peer,
    )
}

pub(crate) fn create_app(state: AppState, max_body_size: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    // bundles are streamed, the limit applies to the body stream
    let bundles = Router::new()
        .route("/register", post(repo::register))
        .route("/update", post(repo::update))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_size));

    Router::new()
        .merge(bundles)
        .route("/user/{id}", get(repo::get_user))
        .route("/.well-known/did.json", get(well_known::did_json))
        .route("/.well-known/webfinger", get(well_known::webfinger))
        .route("/healthcheck", get(|| async { "OK" }))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}
