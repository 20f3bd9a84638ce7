use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
pub mod api;
mod app;
mod auth;
pub mod event;
pub mod publisher;
pub mod relay;
pub mod retry;
mod service;
pub mod setting;

pub use {
    app::*,
    auth::{AdminAuth, AuthError, NostrAuth},
    publisher::{PublishOutcome, Publisher},
    service::*,
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    DbErr(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("invalid setting: {0}")]
    Setting(String),
    #[error("nostr: {0}")]
    Nostr(String),
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Str(&'static str),
    #[error("{0}")]
    InvalidParam(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("submission {0} already has a {1} publish in flight")]
    InFlight(i32, &'static str),
    #[error("publish log {0} was updated by a newer attempt")]
    StaleAttempt(i32),
    #[error("nostr publishing is disabled")]
    PublishDisabled,
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::InvalidParam(_) | Error::Json(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InFlight(..) => StatusCode::CONFLICT,
            Error::PublishDisabled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Creates full response for error.
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": true,
            "status_code": self.status_code().as_u16(),
            "message": self.to_string()
        }))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

pub fn sha256(s: impl AsRef<[u8]>) -> Vec<u8> {
    Sha256::digest(s.as_ref()).to_vec()
}
