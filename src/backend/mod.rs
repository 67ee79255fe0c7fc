//! # Backend
//!
//! The transport seam: one [`Request`] in, one [`Response`] out. The graph
//! never talks to the network directly; every node send goes through a
//! shared `Arc<dyn Backend>`.
//!
//! ## Flow
//!
//! ```text
//! RequestSpec + payload ──▶ Request ──▶ Backend::send ──▶ Response
//!                                            │
//!                                            └──▶ BackendError ──▶ failed Report
//! ```
//!
//! A transport error never aborts the run. The node records a failed report
//! with the error's [`ErrorCode`] and its successors are not triggered.
//!
//! ## Example
//!
//! A node `POST /login` with payload `{"user":"ana"}` becomes:
//!
//! ```text
//! Request  { method: Post, host: "https://api.test", path: "/login", payload: {"user":"ana"} }
//! Response { status_code: 200, body: {"token":"t1"} }
//! ```
//!
//! If the host is unreachable the same send yields
//! `BackendError::Connection`, reported with code `E2001`.
//!
//! ## Implementations
//!
//! - [`http::HttpBackend`]: `reqwest` client with pooled connections
//! - a scripted in-memory backend for tests, with canned replies and delays

pub mod http;

#[cfg(test)]
pub(crate) mod scripted;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::ErrorCode;
use crate::protocol::{Request, Response};

/// Transport failures. The graph turns these into failed reports.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("could not read response body: {0}")]
    Body(String),

    #[error("transport error: {0}")]
    Other(String),
}

impl BackendError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection(_) => ErrorCode::TRANSPORT_CONNECTION,
            Self::InvalidRequest(_) => ErrorCode::TRANSPORT_INVALID_REQUEST,
            Self::Body(_) => ErrorCode::TRANSPORT_BODY,
            Self::Other(_) => ErrorCode::TRANSPORT_OTHER,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Connection(err.to_string())
        } else if err.is_builder() || err.is_request() {
            Self::InvalidRequest(err.to_string())
        } else if err.is_body() || err.is_decode() {
            Self::Body(err.to_string())
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Performs one request and returns one response.
///
/// Requires Send + Sync so a single backend can serve every branch task the
/// graph spawns.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn send(&self, request: &Request) -> Result<Response, BackendError>;
}
