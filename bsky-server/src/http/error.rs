use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::sync::UpdateError;

/// Result of a handler.
pub type AppResult<T> = Result<T, AppError>;

/// A failed request. Rendered as `{"status": <code>, "detail": <text>}`.
#[derive(Debug, Clone)]
pub struct AppError {
    status: StatusCode,
    detail: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: u16,
    detail: &'a str,
}

impl AppError {
    /// An error with a status and a message for the client.
    pub fn new(status: StatusCode, detail: impl ToString) -> Self {
        Self {
            status,
            detail: detail.to_string(),
        }
    }

    /// Status code of the response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Message sent to the client.
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// A 401 that does not say which check failed.
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized")
    }

    fn body(&self) -> ErrorBody<'_> {
        ErrorBody {
            status: self.status.as_u16(),
            detail: &self.detail,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body())).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        warn!(?err, "internal error");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}"))
    }
}

impl From<UpdateError> for AppError {
    fn from(err: UpdateError) -> Self {
        use bsky_repo::Error as RepoError;

        let status = match &err {
            UpdateError::Auth(_) | UpdateError::Unauthorized(_) => {
                debug!(%err, "request not authorized");
                return Self::unauthorized();
            }
            UpdateError::NotFound(_) | UpdateError::Repo(RepoError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            UpdateError::Repo(RepoError::IncompleteGraph { .. }) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            UpdateError::Car(_)
            | UpdateError::Repo(
                RepoError::Decode(_)
                | RepoError::Format(_)
                | RepoError::HashMismatch(_)
                | RepoError::Hamt(_),
            ) => StatusCode::BAD_REQUEST,
            UpdateError::Conflict { .. } | UpdateError::AlreadyRegistered(_) => {
                StatusCode::CONFLICT
            }
            UpdateError::Repo(RepoError::Encode(_) | RepoError::Storage(_)) => {
                warn!(%err, "internal error");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, err)
    }
}

#[cfg(test)]
mod tests {
    use bsky_auth::AuthError;
    use bsky_repo::{block::RAW, Block};

    use super::*;

    #[test]
    fn status_mapping() {
        let cid = *Block::new(RAW, &b"x"[..]).cid();
        let cases = [
            (UpdateError::NotFound("bob".into()), StatusCode::NOT_FOUND),
            (
                UpdateError::Repo(bsky_repo::Error::IncompleteGraph { missing: cid }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                UpdateError::Repo(bsky_repo::Error::Decode("bad".into())),
                StatusCode::BAD_REQUEST,
            ),
            (UpdateError::Auth(AuthError::BadSignature), StatusCode::UNAUTHORIZED),
            (UpdateError::Conflict { current: cid }, StatusCode::CONFLICT),
            (
                UpdateError::AlreadyRegistered("alice".into()),
                StatusCode::CONFLICT,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn auth_failures_are_opaque() {
        let err = AppError::from(UpdateError::Unauthorized("root issuer mismatch".into()));
        let json = serde_json::to_value(err.body()).unwrap();
        assert_eq!(json["status"], 401);
        assert_eq!(json["detail"], "unauthorized");
    }
}
