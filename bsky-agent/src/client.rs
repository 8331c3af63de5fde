//! HTTP client for the aggregator.

use bsky_car::MIME_TYPE;
use bytes::Bytes;
use reqwest::{header, Response, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// Errors talking to the server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server answered with an error status.
    #[error("server returned {status}: {detail}")]
    Status { status: StatusCode, detail: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The server accepted the request without confirming it.
    #[error("server did not confirm the {0}")]
    NotConfirmed(&'static str),
}

impl ClientError {
    /// The status code, if the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::Http(err) => err.status(),
            ClientError::NotConfirmed(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DidResponse {
    id: String,
}

/// Body of a successful `/register` or `/update`.
#[derive(Debug, Deserialize)]
struct Confirmation {
    #[serde(rename = "OK")]
    ok: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    detail: Option<String>,
}

/// Talks to one aggregator.
#[derive(Debug, Clone)]
pub struct Client {
    http: reqwest::Client,
    base: String,
}

impl Client {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// The DID the server expects tokens to be addressed to.
    pub async fn service_did(&self) -> Result<String, ClientError> {
        let res = self
            .http
            .get(format!("{}/.well-known/did.json", self.base))
            .send()
            .await?;
        Ok(check(res).await?.json::<DidResponse>().await?.id)
    }

    /// The DID registered under `name`.
    pub async fn webfinger(&self, name: &str) -> Result<String, ClientError> {
        let res = self
            .http
            .get(format!("{}/.well-known/webfinger", self.base))
            .query(&[("resource", name)])
            .send()
            .await?;
        Ok(check(res).await?.json::<DidResponse>().await?.id)
    }

    /// Sends a registration bundle.
    pub async fn register(&self, token: &str, car: Vec<u8>) -> Result<(), ClientError> {
        self.post_car("register", "registration", token, car).await
    }

    /// Sends an update bundle.
    pub async fn update(&self, token: &str, car: Vec<u8>) -> Result<(), ClientError> {
        self.post_car("update", "update", token, car).await
    }

    /// Fetches the repository of `id`, a DID or a name, as a car bundle.
    pub async fn get_user(&self, id: &str) -> Result<Bytes, ClientError> {
        let res = self
            .http
            .get(format!("{}/user/{id}", self.base))
            .send()
            .await?;
        Ok(check(res).await?.bytes().await?)
    }

    async fn post_car(
        &self,
        path: &str,
        what: &'static str,
        token: &str,
        car: Vec<u8>,
    ) -> Result<(), ClientError> {
        debug!(path, len = car.len(), "sending bundle");
        let res = self
            .http
            .post(format!("{}/{path}", self.base))
            .bearer_auth(token)
            .header(header::CONTENT_TYPE, MIME_TYPE)
            .body(car)
            .send()
            .await?;
        let confirmation = check(res).await?.json::<Confirmation>().await?;
        if !confirmation.ok {
            return Err(ClientError::NotConfirmed(what));
        }
        Ok(())
    }
}

async fn check(res: Response) -> Result<Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let text = res.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorResponse>(&text)
        .ok()
        .and_then(|e| e.detail)
        .unwrap_or(text);
    Err(ClientError::Status { status, detail })
}
