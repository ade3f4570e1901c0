//
//  atlassian-rest
//  auth/oauth.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # OAuth 2.0 (3LO) Module
//!
//! This module implements the Atlassian three-legged OAuth 2.0 flow: building
//! the consent URL, exchanging the authorization code for tokens, refreshing
//! access tokens, and listing the cloud sites a token can reach.
//!
//! ## OAuth Flow Overview
//!
//! 1. **Authorization Request**: send the user to [`OAuth2Service::authorization_url`]
//! 2. **User Consent**: the user grants the requested scopes
//! 3. **Authorization Code**: Atlassian redirects to the callback URL with a code
//! 4. **Token Exchange**: [`OAuth2Service::exchange_authorization_code`]
//! 5. **Site Lookup**: [`OAuth2Service::accessible_resources`] yields the cloud id
//!    used in `https://api.atlassian.com/ex/jira/{cloudid}/`
//! 6. **Token Refresh**: [`OAuth2Service::refresh_access_token`], normally driven
//!    by [`OAuth2Transport`](super::OAuth2Transport)
//!
//! ## Scopes
//!
//! Refresh tokens are only issued when `offline_access` is requested. Common
//! product scopes include `read:jira-work`, `write:jira-work`,
//! `read:confluence-content.all` and `write:confluence-content`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atlassian_rest::api::{Context, ReqwestClient};
//! use atlassian_rest::auth::{OAuth2Config, OAuth2Service};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = OAuth2Config::new("client-id", "client-secret", "https://localhost/callback")
//!     .with_scopes(["read:jira-work", "offline_access"]);
//! let service = OAuth2Service::new(Arc::new(ReqwestClient::try_default()?), config)?;
//!
//! println!("Visit {}", service.authorization_url("random-state")?);
//!
//! let ctx = Context::background();
//! let token = service.exchange_authorization_code(&ctx, "code-from-callback").await?;
//! for site in service.accessible_resources(&ctx, &token.access_token).await? {
//!     println!("{} -> {}", site.name, site.id);
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::api::common::Response;
use crate::api::context::{Context, ContextError};
use crate::api::http::{HttpClient, HttpClientError, HttpRequest};

/// Atlassian's OAuth 2.0 authorization (consent) endpoint.
pub const AUTHORIZE_URL: &str = "https://auth.atlassian.com/authorize";

/// Atlassian's OAuth 2.0 token endpoint.
pub const TOKEN_URL: &str = "https://auth.atlassian.com/oauth/token";

/// Endpoint listing the cloud sites an access token grants access to.
pub const ACCESSIBLE_RESOURCES_URL: &str =
    "https://api.atlassian.com/oauth/token/accessible-resources";

/// The audience every Atlassian 3LO authorization request targets.
const AUDIENCE: &str = "api.atlassian.com";

/// Failures of OAuth 2.0 operations.
///
/// Cloneable so one refresh outcome can be handed to every request waiting
/// on it.
#[derive(Error, Debug, Clone)]
pub enum OAuthError {
    /// OAuth 2.0 has not been configured on the client.
    #[error("oauth2 is not configured on this client")]
    NotConfigured,

    /// The configuration is missing a required value.
    #[error("invalid oauth2 configuration: {0}")]
    InvalidConfig(String),

    /// The current token has no refresh token, so it cannot be renewed.
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The endpoint answered with a non-2xx status.
    #[error("oauth2 endpoint returned {status}: {message}")]
    Endpoint {
        /// The HTTP status code.
        status: u16,
        /// The error description from the body, or the raw body.
        message: String,
    },

    /// The endpoint could not be reached.
    #[error("oauth2 endpoint unreachable: {0}")]
    Transport(#[source] Arc<HttpClientError>),

    /// The request body could not be serialized.
    #[error("failed to encode oauth2 request: {0}")]
    Encode(#[source] Arc<serde_json::Error>),

    /// The endpoint response was not the expected JSON.
    #[error("failed to decode oauth2 response: {0}")]
    Decode(#[source] Arc<serde_json::Error>),

    /// An endpoint URL could not be parsed.
    #[error("invalid oauth2 url: {0}")]
    Url(#[from] url::ParseError),

    /// The request context stopped the call.
    #[error("oauth2 request interrupted: {0}")]
    Context(#[from] ContextError),
}

impl From<HttpClientError> for OAuthError {
    fn from(err: HttpClientError) -> Self {
        Self::Transport(Arc::new(err))
    }
}

fn default_authorize_url() -> String {
    AUTHORIZE_URL.to_string()
}

fn default_token_url() -> String {
    TOKEN_URL.to_string()
}

fn default_resources_url() -> String {
    ACCESSIBLE_RESOURCES_URL.to_string()
}

/// Configuration of an Atlassian OAuth 2.0 (3LO) integration.
///
/// The endpoint URLs default to Atlassian's production endpoints and only
/// need overriding for tests or proxies.
///
/// # Example
///
/// ```rust
/// use atlassian_rest::auth::OAuth2Config;
///
/// let config = OAuth2Config::new("id", "secret", "https://localhost/callback")
///     .with_scopes(["read:confluence-content.all", "offline_access"]);
/// assert_eq!(config.token_url, "https://auth.atlassian.com/oauth/token");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct OAuth2Config {
    /// The OAuth 2.0 client identifier from the developer console.
    pub client_id: String,

    /// The OAuth 2.0 client secret.
    pub client_secret: String,

    /// The callback URL registered for the app.
    pub redirect_uri: String,

    /// Scopes requested at consent time.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Consent endpoint.
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Token endpoint.
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Accessible-resources endpoint.
    #[serde(default = "default_resources_url")]
    pub resources_url: String,
}

impl fmt::Debug for OAuth2Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Config")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("authorize_url", &self.authorize_url)
            .field("token_url", &self.token_url)
            .field("resources_url", &self.resources_url)
            .finish()
    }
}

impl OAuth2Config {
    /// Creates a configuration targeting Atlassian's production endpoints.
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            resources_url: default_resources_url(),
        }
    }

    /// Replaces the requested scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Checks that the identifiers are present and the endpoints parse.
    pub fn validate(&self) -> Result<(), OAuthError> {
        if self.client_id.trim().is_empty() {
            return Err(OAuthError::InvalidConfig("client_id is empty".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(OAuthError::InvalidConfig("client_secret is empty".to_string()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(OAuthError::InvalidConfig("redirect_uri is empty".to_string()));
        }

        Url::parse(&self.redirect_uri)?;
        Url::parse(&self.authorize_url)?;
        Url::parse(&self.token_url)?;
        Url::parse(&self.resources_url)?;
        Ok(())
    }
}

/// An OAuth 2.0 access token with its refresh token and expiry.
///
/// Serialized with serde so token stores can persist it as JSON.
///
/// # Example
///
/// ```rust
/// use atlassian_rest::auth::Token;
/// use chrono::{Duration, Utc};
///
/// let token = Token::new("access")
///     .with_refresh_token("refresh")
///     .with_expires_at(Utc::now() + Duration::seconds(30));
///
/// assert!(!token.is_expired());
/// assert!(token.expires_within(Duration::seconds(60)));
/// assert!(token.can_refresh());
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// The bearer access token.
    pub access_token: String,

    /// The refresh token, when `offline_access` was granted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// The token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// Space-separated granted scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// When the access token stops being valid. `None` means unknown, and
    /// such a token is never considered expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_type", &self.token_type)
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl Token {
    /// Creates a bearer token with no refresh token and no known expiry.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_type: default_token_type(),
            scope: None,
            expires_at: None,
        }
    }

    /// Sets the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the absolute expiry.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// `true` once the expiry has passed.
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// `true` if the token expires within `margin` from now (or already has).
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires_at {
            Some(expires_at) => match Utc::now().checked_add_signed(margin) {
                Some(horizon) => expires_at <= horizon,
                None => margin > Duration::zero(),
            },
            None => false,
        }
    }

    /// Parses a token endpoint payload. `expires_in` is counted from
    /// `issued_at`; a value outside the representable range leaves the
    /// expiry unknown.
    pub fn from_token_response(
        body: &[u8],
        issued_at: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let raw: TokenResponseRaw = serde_json::from_slice(body)?;
        Ok(raw.into_token(issued_at))
    }

    /// `true` if a refresh token is available.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token
            .as_deref()
            .map(|token| !token.is_empty())
            .unwrap_or(false)
    }
}

/// Raw token endpoint payload.
#[derive(Deserialize)]
struct TokenResponseRaw {
    access_token: String,
    refresh_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

impl TokenResponseRaw {
    fn into_token(self, issued_at: DateTime<Utc>) -> Token {
        Token {
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type.unwrap_or_else(default_token_type),
            scope: self.scope,
            expires_at: self
                .expires_in
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| issued_at.checked_add_signed(lifetime)),
        }
    }
}

/// Token endpoint request body for both grant types.
#[derive(Serialize)]
struct TokenRequest<'a> {
    grant_type: &'a str,
    client_id: &'a str,
    client_secret: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_uri: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_token: Option<&'a str>,
}

/// A cloud site (Jira or Confluence instance) reachable with a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessibleResource {
    /// The cloud id used in `https://api.atlassian.com/ex/{product}/{id}/`.
    pub id: String,

    /// The site URL, e.g. `https://example.atlassian.net`.
    pub url: String,

    /// The site name.
    pub name: String,

    /// Scopes granted on this site.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Site avatar.
    #[serde(default, rename = "avatarUrl")]
    pub avatar_url: Option<String>,
}

/// Client for the Atlassian OAuth 2.0 endpoints.
///
/// Calls go through the HTTP client passed at construction. When used by a
/// [`Client`](crate::api::Client) that is always the original, undecorated
/// client, so token endpoint calls never recurse into the renewal decorator.
#[derive(Clone)]
pub struct OAuth2Service {
    http: Arc<dyn HttpClient>,
    config: OAuth2Config,
}

impl fmt::Debug for OAuth2Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Service")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OAuth2Service {
    /// Creates the service after validating `config`.
    pub fn new(http: Arc<dyn HttpClient>, config: OAuth2Config) -> Result<Self, OAuthError> {
        config.validate()?;
        Ok(Self { http, config })
    }

    /// The active configuration.
    pub fn config(&self) -> &OAuth2Config {
        &self.config
    }

    /// Builds the consent URL the user must visit.
    ///
    /// `state` is echoed back on the callback and should be an unguessable
    /// value bound to the user's session.
    pub fn authorization_url(&self, state: &str) -> Result<Url, OAuthError> {
        let mut url = Url::parse(&self.config.authorize_url)?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("audience", AUDIENCE)
                .append_pair("client_id", &self.config.client_id);

            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }

            query
                .append_pair("redirect_uri", &self.config.redirect_uri)
                .append_pair("state", state)
                .append_pair("response_type", "code")
                .append_pair("prompt", "consent");
        }
        Ok(url)
    }

    /// Exchanges an authorization code for an access/refresh token pair.
    pub async fn exchange_authorization_code(
        &self,
        ctx: &Context,
        code: &str,
    ) -> Result<Token, OAuthError> {
        let body = TokenRequest {
            grant_type: "authorization_code",
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            code: Some(code),
            redirect_uri: Some(&self.config.redirect_uri),
            refresh_token: None,
        };

        self.request_token(ctx, &body).await
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// Atlassian rotates refresh tokens; if the response carries none, the
    /// supplied refresh token is kept on the returned token.
    pub async fn refresh_access_token(
        &self,
        ctx: &Context,
        refresh_token: &str,
    ) -> Result<Token, OAuthError> {
        if refresh_token.is_empty() {
            return Err(OAuthError::MissingRefreshToken);
        }

        let body = TokenRequest {
            grant_type: "refresh_token",
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            code: None,
            redirect_uri: None,
            refresh_token: Some(refresh_token),
        };

        let mut token = self.request_token(ctx, &body).await?;
        if !token.can_refresh() {
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// Lists the cloud sites `access_token` grants access to.
    pub async fn accessible_resources(
        &self,
        ctx: &Context,
        access_token: &str,
    ) -> Result<Vec<AccessibleResource>, OAuthError> {
        let mut request = HttpRequest::new(Method::GET, Url::parse(&self.config.resources_url)?);
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", access_token))
            .map_err(|_| OAuthError::InvalidConfig("access token is not a valid header".into()))?;
        authorization.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, authorization);

        self.send(ctx, request).await
    }

    async fn request_token(
        &self,
        ctx: &Context,
        body: &TokenRequest<'_>,
    ) -> Result<Token, OAuthError> {
        let mut request = HttpRequest::new(Method::POST, Url::parse(&self.config.token_url)?);
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        request
            .headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        request.body = Some(Bytes::from(
            serde_json::to_vec(body).map_err(|e| OAuthError::Encode(Arc::new(e)))?,
        ));

        let issued_at = Utc::now();
        let raw: TokenResponseRaw = self.send(ctx, request).await?;
        Ok(raw.into_token(issued_at))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        request: HttpRequest,
    ) -> Result<T, OAuthError> {
        let response: Response = ctx.run(self.http.execute(request)).await??.into();

        if !response.is_success() {
            let message = response
                .api_error_message()
                .unwrap_or_else(|| response.text().into_owned());
            return Err(OAuthError::Endpoint {
                status: response.code(),
                message,
            });
        }

        response.json().map_err(|e| OAuthError::Decode(Arc::new(e)))
    }
}
