//
//  atlassian-rest
//  api/common/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Common API Types for the Jira and Confluence transports
//!
//! This module holds the pieces every API call shares: the failure taxonomy
//! ([`ApiError`]), the status-code classifier ([`classify`] / [`StatusKind`])
//! and the response envelope ([`Response`]).
//!
//! # Failure taxonomy
//!
//! | Group | Variants | Envelope available |
//! |-------|----------|--------------------|
//! | Construction | `InvalidSite`, `InvalidPath`, `Encode`, `InvalidHeader`, `Config` | No |
//! | Transport | `Transport`, `Cancelled`, `DeadlineExceeded` | No |
//! | Classified HTTP | `Status` | Yes |
//! | Decode | `Decode` | Yes |
//! | OAuth2 | `OAuth` | No |
//!
//! Nothing in this taxonomy is retried by the transport layer.
//!
//! # Example
//!
//! ```rust
//! use atlassian_rest::api::common::{ApiError, StatusKind};
//!
//! fn describe(result: Result<(), ApiError>) -> String {
//!     match result {
//!         Ok(()) => "ok".to_string(),
//!         Err(e) if e.kind() == Some(StatusKind::NotFound) => "missing".to_string(),
//!         Err(e) => match e.response() {
//!             Some(response) => format!("{} -> {}", e, response.text()),
//!             None => e.to_string(),
//!         },
//!     }
//! }
//! ```

use std::fmt;

use reqwest::StatusCode;
use thiserror::Error;

use crate::api::context::ContextError;
use crate::api::http::HttpClientError;
use crate::auth::OAuthError;

mod response;

pub use response::*;

/// The fixed set of sentinel kinds a non-2xx status code collapses to.
///
/// | Status | Kind |
/// |--------|------|
/// | 400 | `BadRequest` |
/// | 401 | `Unauthorized` |
/// | 404 | `NotFound` |
/// | 500 | `Internal` |
/// | any other non-2xx | `InvalidStatusCode(code)` |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKind {
    /// HTTP 400: the payload or query was rejected.
    BadRequest,
    /// HTTP 401: credentials missing, invalid or lacking permission.
    Unauthorized,
    /// HTTP 404: the resource does not exist or is not visible.
    NotFound,
    /// HTTP 500: the Atlassian service failed.
    Internal,
    /// Any other status outside `[200, 300)`, carrying the numeric code.
    InvalidStatusCode(u16),
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadRequest => write!(f, "bad request"),
            Self::Unauthorized => write!(f, "unauthorized"),
            Self::NotFound => write!(f, "resource not found"),
            Self::Internal => write!(f, "internal server error"),
            Self::InvalidStatusCode(code) => write!(f, "request failed with status {}", code),
        }
    }
}

/// Maps a terminal status code to its [`StatusKind`].
///
/// Returns `None` for success codes (`200..300`).
///
/// # Example
///
/// ```rust
/// use atlassian_rest::api::common::{classify, StatusKind};
/// use reqwest::StatusCode;
///
/// assert_eq!(classify(StatusCode::OK), None);
/// assert_eq!(classify(StatusCode::NOT_FOUND), Some(StatusKind::NotFound));
/// assert_eq!(
///     classify(StatusCode::TOO_MANY_REQUESTS),
///     Some(StatusKind::InvalidStatusCode(429))
/// );
/// ```
pub fn classify(status: StatusCode) -> Option<StatusKind> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::BAD_REQUEST => StatusKind::BadRequest,
        StatusCode::UNAUTHORIZED => StatusKind::Unauthorized,
        StatusCode::NOT_FOUND => StatusKind::NotFound,
        StatusCode::INTERNAL_SERVER_ERROR => StatusKind::Internal,
        other => StatusKind::InvalidStatusCode(other.as_u16()),
    })
}

/// Unified error type for every transport operation.
///
/// Variants that were produced after a response arrived (`Status`,
/// `Decode`) keep the [`Response`] envelope so the raw body is never lost;
/// use [`ApiError::response`] to inspect it.
#[derive(Error, Debug)]
pub enum ApiError {
    /// The base site URL is empty or cannot be parsed.
    #[error("invalid site url {site:?}: {reason}")]
    InvalidSite {
        /// The rejected site string.
        site: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The request path could not be resolved against the site URL.
    #[error("invalid request path {path:?}: {source}")]
    InvalidPath {
        /// The rejected path.
        path: String,
        /// The underlying parse failure.
        #[source]
        source: url::ParseError,
    },

    /// The request payload could not be serialized to JSON.
    #[error("failed to encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// A header value (credentials, user agent, content type) contains
    /// characters that cannot appear in an HTTP header.
    #[error("invalid value for header {name}")]
    InvalidHeader {
        /// The header being set.
        name: &'static str,
    },

    /// A configuration option could not be applied.
    #[error("configuration error: {0}")]
    Config(String),

    /// The HTTP client failed before a response was received.
    #[error("transport error: {0}")]
    Transport(#[source] HttpClientError),

    /// The request context was cancelled.
    #[error("request canceled")]
    Cancelled,

    /// The request context deadline passed.
    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// The server answered with a status outside `[200, 300)`.
    #[error("{kind}: {} {}", .response.method(), .response.endpoint())]
    Status {
        /// The classified status.
        kind: StatusKind,
        /// The full response envelope.
        response: Box<Response>,
    },

    /// A 2xx response body was not valid JSON for the requested type.
    #[error("failed to decode response body: {source}")]
    Decode {
        /// The underlying decode failure.
        #[source]
        source: serde_json::Error,
        /// The full response envelope.
        response: Box<Response>,
    },

    /// An OAuth2 operation failed, including an automatic token refresh.
    #[error("oauth2 error: {0}")]
    OAuth(#[from] OAuthError),
}

impl ApiError {
    /// The classified status kind, for `Status` errors.
    pub fn kind(&self) -> Option<StatusKind> {
        match self {
            Self::Status { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The response envelope, when the call reached a response.
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Status { response, .. } | Self::Decode { response, .. } => Some(response.as_ref()),
            _ => None,
        }
    }

    /// Consumes the error and returns its response envelope, if any.
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Status { response, .. } | Self::Decode { response, .. } => Some(*response),
            _ => None,
        }
    }

    /// `true` for a 404 response.
    pub fn is_not_found(&self) -> bool {
        self.kind() == Some(StatusKind::NotFound)
    }

    /// `true` for a 401 response.
    pub fn is_unauthorized(&self) -> bool {
        self.kind() == Some(StatusKind::Unauthorized)
    }

    /// `true` for a 400 response.
    pub fn is_bad_request(&self) -> bool {
        self.kind() == Some(StatusKind::BadRequest)
    }

    /// `true` for a 500 response.
    pub fn is_internal(&self) -> bool {
        self.kind() == Some(StatusKind::Internal)
    }

    /// `true` when the request context stopped the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl From<HttpClientError> for ApiError {
    fn from(err: HttpClientError) -> Self {
        match err {
            HttpClientError::TokenRefresh(oauth) => Self::OAuth(oauth),
            other => Self::Transport(other),
        }
    }
}

impl From<ContextError> for ApiError {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}
