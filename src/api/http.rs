//
//  atlassian-rest
//  api/http.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/03.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # HTTP Client Abstraction
//!
//! The transport layer never talks to `reqwest` directly. It hands a fully
//! built [`HttpRequest`] to an [`HttpClient`] and gets back a buffered
//! [`HttpResponse`]. This is the seam that lets callers inject a pooled,
//! traced, or mocked transport, and the seam the OAuth2 renewal decorator
//! ([`OAuth2Transport`](crate::auth::OAuth2Transport)) wraps.
//!
//! [`ReqwestClient`] is the default backend used when a client is created
//! without an explicit HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use thiserror::Error;
use url::Url;

use crate::auth::OAuthError;

/// An HTTP request ready to be sent by an [`HttpClient`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// The absolute, already-resolved URL.
    pub url: Url,
    /// Request headers, including authentication.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
        }
    }
}

/// A completed HTTP exchange with its body fully buffered.
///
/// `url` and `method` describe the request as it was finally sent, which may
/// differ from what the caller asked for once redirects have been followed.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// The effective URL after redirects.
    pub url: Url,
    /// The effective HTTP method.
    pub method: Method,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Bytes,
}

/// Failure of the underlying HTTP exchange: no response was received.
#[derive(Debug, Error)]
pub enum HttpClientError {
    /// The request timed out inside the HTTP client.
    #[error("request timed out")]
    Timeout,

    /// The connection could not be established (DNS, TCP, TLS).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The OAuth2 renewal decorator could not obtain a fresh access token,
    /// so the request was never sent.
    #[error("token refresh failed: {0}")]
    TokenRefresh(#[source] OAuthError),

    /// Any other client-side failure.
    #[error("{0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// A pluggable HTTP backend.
///
/// Implementations must be safe to share across concurrent requests; the
/// client issues calls through a single shared instance and adds no locking
/// of its own.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request` and returns the buffered response.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError>;
}

/// An [`HttpClient`] backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a backend with reqwest's default settings and no timeout.
    ///
    /// Fails instead of panicking when the TLS backend cannot be initialised.
    pub fn try_default() -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client })
    }

    /// Creates a backend whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, HttpClientError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(map_reqwest_error)?;
        Ok(Self { client })
    }

    /// Wraps an existing [`reqwest::Client`], keeping its pool and settings.
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let method = request.method.clone();
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        let url = response.url().clone();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(map_reqwest_error)?;

        Ok(HttpResponse {
            status,
            url,
            method,
            headers,
            body,
        })
    }
}

fn map_reqwest_error(err: reqwest::Error) -> HttpClientError {
    if err.is_timeout() {
        HttpClientError::Timeout
    } else if err.is_connect() {
        HttpClientError::Connection(err.to_string())
    } else {
        HttpClientError::Other(Box::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_backend_builds_without_panicking() {
        assert!(ReqwestClient::try_default().is_ok());
        assert!(ReqwestClient::new(Duration::from_secs(5)).is_ok());
    }
}
