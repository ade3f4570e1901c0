//
//  atlassian-rest
//  auth/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Authentication Module
//!
//! This module provides every way a [`Client`](crate::api::Client) can
//! authenticate against the Atlassian Cloud REST APIs.
//!
//! ## Supported Authentication Methods
//!
//! - **Basic authentication**: account email plus an API token. Takes
//!   precedence over every other static credential.
//! - **Bearer token**: a static personal or OAuth access token.
//! - **OAuth 2.0 (3LO)**: authorization-code flow with automatic refresh of
//!   the access token through [`OAuth2Transport`].
//!
//! ## Module Structure
//!
//! - [`Authentication`]: per-client credential holder consumed by the request builder
//! - [`OAuth2Service`], [`OAuth2Config`], [`Token`]: OAuth 2.0 configuration and token endpoint calls
//! - [`OAuth2Transport`], [`AutoRenewal`]: the auto-refreshing transport decorator and its collaborators
//! - [`KeyringTokenStore`], [`FileTokenStore`], [`MemoryTokenStore`]: token store backends
//!
//! ## Example
//!
//! ```rust
//! use atlassian_rest::auth::Authentication;
//!
//! let mut auth = Authentication::default();
//! auth.set_basic_auth("me@example.com", "api-token");
//! auth.set_bearer_token("ignored-while-basic-is-set");
//! auth.set_user_agent("my-integration/1.0");
//!
//! assert!(auth.has_basic_auth());
//! assert_eq!(auth.user_agent(), Some("my-integration/1.0"));
//! ```

mod keyring;
mod oauth;
mod renewal;

pub use keyring::*;
pub use oauth::*;
pub use renewal::*;

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};

use crate::api::ApiError;

/// Per-client credential holder.
///
/// Holds an optional basic-auth pair, an optional bearer token and an
/// optional user agent. Nothing is validated when a value is set; empty
/// values are simply treated as absent when a request is built.
///
/// # Precedence
///
/// At most one `Authorization` header is produced per request:
///
/// 1. basic auth, when both username and password are non-empty
/// 2. otherwise the bearer token, when non-empty
///
/// The `User-Agent` header is sent whenever one is configured, regardless of
/// the auth mode.
///
/// # Concurrency
///
/// Setters take `&mut self`. The holder is meant to be configured while the
/// client is being set up; once a client is shared across tasks its
/// credentials are read-only.
#[derive(Clone, Default)]
pub struct Authentication {
    basic: Option<(String, String)>,
    bearer: Option<String>,
    user_agent: Option<String>,
}

impl fmt::Debug for Authentication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authentication")
            .field("basic_user", &self.basic.as_ref().map(|(user, _)| user))
            .field("bearer", &self.bearer.as_ref().map(|_| "<redacted>"))
            .field("user_agent", &self.user_agent)
            .finish()
    }
}

impl Authentication {
    /// Sets the basic-auth pair (account email and API token).
    pub fn set_basic_auth(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.basic = Some((username.into(), password.into()));
    }

    /// Sets the bearer token.
    pub fn set_bearer_token(&mut self, token: impl Into<String>) {
        self.bearer = Some(token.into());
    }

    /// Sets the `User-Agent` sent with every request.
    pub fn set_user_agent(&mut self, agent: impl Into<String>) {
        self.user_agent = Some(agent.into());
    }

    /// Removes every credential and the user agent.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// `true` when both basic-auth username and password are non-empty.
    pub fn has_basic_auth(&self) -> bool {
        self.basic_auth().is_some()
    }

    /// The basic-auth pair, if both parts are non-empty.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        self.basic
            .as_ref()
            .filter(|(user, pass)| !user.is_empty() && !pass.is_empty())
            .map(|(user, pass)| (user.as_str(), pass.as_str()))
    }

    /// `true` when a non-empty bearer token is set.
    pub fn has_bearer_token(&self) -> bool {
        self.bearer_token().is_some()
    }

    /// The bearer token, if non-empty.
    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer.as_deref().filter(|token| !token.is_empty())
    }

    /// `true` when a non-empty user agent is set.
    pub fn has_user_agent(&self) -> bool {
        self.user_agent().is_some()
    }

    /// The user agent, if non-empty.
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref().filter(|agent| !agent.is_empty())
    }

    /// Writes the `Authorization` and `User-Agent` headers into `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidHeader`] when a credential or the user agent
    /// contains characters that cannot appear in a header value.
    pub fn apply(&self, headers: &mut HeaderMap) -> Result<(), ApiError> {
        let authorization = if let Some((username, password)) = self.basic_auth() {
            let encoded = STANDARD.encode(format!("{}:{}", username, password));
            Some(format!("Basic {}", encoded))
        } else {
            self.bearer_token().map(|token| format!("Bearer {}", token))
        };

        if let Some(authorization) = authorization {
            let mut value = HeaderValue::from_str(&authorization).map_err(|_| {
                ApiError::InvalidHeader {
                    name: "Authorization",
                }
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Some(agent) = self.user_agent() {
            let value = HeaderValue::from_str(agent)
                .map_err(|_| ApiError::InvalidHeader { name: "User-Agent" })?;
            headers.insert(USER_AGENT, value);
        }

        Ok(())
    }
}
