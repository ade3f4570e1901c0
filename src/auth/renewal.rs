//
//  atlassian-rest
//  auth/renewal.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/03.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Automatic Token Renewal
//!
//! [`OAuth2Transport`] is an [`HttpClient`] decorator that keeps an OAuth 2.0
//! access token fresh for the lifetime of a long-lived client. Before every
//! request it checks the token's expiry (with a safety margin) and, when
//! needed, exchanges the refresh token before sending the request with a
//! current `Authorization: Bearer` header.
//!
//! ## Single-flight refresh
//!
//! Many tasks can share one client. When several of them observe an expiring
//! token at the same time, exactly one refresh task is spawned and every
//! caller waits for its outcome:
//!
//! ```text
//! caller A: read (expiring) -> spawn refresh -> wait ............................ -> use
//! caller B: read (expiring) -> join pending  -> wait ............................ -> use
//! refresh:                     lock gate -> re-check -> exchange -> write -> save -> publish
//! ```
//!
//! A caller whose context is cancelled stops waiting; the refresh task runs
//! to completion regardless, so a rotated refresh token is never lost.
//!
//! Readers never see a half-written token; the token lives behind a
//! [`tokio::sync::RwLock`] and is swapped as a whole.
//!
//! ## Collaborators
//!
//! - [`TokenRefresher`]: performs the refresh exchange ([`OAuth2Service`] in production)
//! - [`TokenStore`]: optional persistence, written after each refresh
//! - [`TokenCallback`]: optional notification after each refresh
//!
//! Store and callback failures are logged and never fail the request.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio::sync::{watch, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::oauth::{OAuth2Service, OAuthError, Token};
use crate::api::context::{Context, ContextError};
use crate::api::http::{HttpClient, HttpClientError, HttpRequest, HttpResponse};

/// Store key used when neither the caller nor the client supplies one.
pub const DEFAULT_STORE_KEY: &str = "default";

/// Default window before expiry in which a token is already refreshed.
pub const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 60;

/// Exchanges an expiring token for a fresh one.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Returns a new token for `token`.
    async fn refresh(&self, token: &Token) -> Result<Token, OAuthError>;
}

#[async_trait]
impl TokenRefresher for OAuth2Service {
    async fn refresh(&self, token: &Token) -> Result<Token, OAuthError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(OAuthError::MissingRefreshToken)?;

        // Runs detached from any request, so no caller context applies.
        self.refresh_access_token(&Context::background(), refresh_token)
            .await
    }
}

/// Persists tokens across process restarts.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Loads the token saved under `key`, if any.
    async fn load(&self, key: &str) -> anyhow::Result<Option<Token>>;

    /// Saves `token` under `key`, replacing any previous value.
    async fn save(&self, key: &str, token: &Token) -> anyhow::Result<()>;
}

/// Notified after every successful refresh.
#[async_trait]
pub trait TokenCallback: Send + Sync {
    /// Called with the freshly refreshed token.
    async fn on_token_refreshed(&self, token: &Token) -> anyhow::Result<()>;
}

/// Settings for [`Client::enable_token_auto_renewal`](crate::api::Client::enable_token_auto_renewal).
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use atlassian_rest::auth::{AutoRenewal, MemoryTokenStore, Token};
///
/// let renewal = AutoRenewal::new(Token::new("access").with_refresh_token("refresh"))
///     .with_store(Arc::new(MemoryTokenStore::new()))
///     .with_store_key("jira-prod")
///     .with_expiry_margin(chrono::Duration::seconds(120));
/// ```
#[derive(Clone)]
pub struct AutoRenewal {
    /// The seed token.
    pub token: Token,
    /// Optional persistence.
    pub store: Option<Arc<dyn TokenStore>>,
    /// Key for the store. The client falls back to the OAuth client id.
    pub store_key: Option<String>,
    /// Optional refresh notification.
    pub callback: Option<Arc<dyn TokenCallback>>,
    /// How long before expiry a token is refreshed.
    pub expiry_margin: Duration,
}

impl fmt::Debug for AutoRenewal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoRenewal")
            .field("token", &self.token)
            .field("store", &self.store.is_some())
            .field("store_key", &self.store_key)
            .field("callback", &self.callback.is_some())
            .field("expiry_margin", &self.expiry_margin)
            .finish()
    }
}

impl AutoRenewal {
    /// Starts from `token` with the default margin and no collaborators.
    pub fn new(token: Token) -> Self {
        Self {
            token,
            store: None,
            store_key: None,
            callback: None,
            expiry_margin: Duration::seconds(DEFAULT_EXPIRY_MARGIN_SECS),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_store_key(mut self, key: impl Into<String>) -> Self {
        self.store_key = Some(key.into());
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn TokenCallback>) -> Self {
        self.callback = Some(callback);
        self
    }

    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }
}

/// Outcome of one refresh, shared by every request that waited on it.
type RefreshOutcome = Result<Token, OAuthError>;

/// [`HttpClient`] decorator that authenticates every request with a fresh
/// OAuth 2.0 access token.
///
/// The wrapped client is kept explicitly and can be recovered with
/// [`OAuth2Transport::inner`].
pub struct OAuth2Transport {
    inner: Arc<dyn HttpClient>,
    state: Arc<RenewalState>,
}

/// Token state shared between the decorator and its refresh task.
struct RenewalState {
    refresher: Arc<dyn TokenRefresher>,
    token: RwLock<Token>,
    refresh_gate: Mutex<()>,
    in_flight: Mutex<Option<watch::Receiver<Option<RefreshOutcome>>>>,
    store: Option<Arc<dyn TokenStore>>,
    store_key: String,
    callback: Option<Arc<dyn TokenCallback>>,
    expiry_margin: Duration,
}

impl fmt::Debug for OAuth2Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuth2Transport")
            .field("store_key", &self.state.store_key)
            .field("expiry_margin", &self.state.expiry_margin)
            .finish_non_exhaustive()
    }
}

impl OAuth2Transport {
    /// Wraps `inner`, refreshing through `refresher`.
    pub fn new(
        inner: Arc<dyn HttpClient>,
        refresher: Arc<dyn TokenRefresher>,
        renewal: AutoRenewal,
    ) -> Self {
        let state = RenewalState {
            refresher,
            token: RwLock::new(renewal.token),
            refresh_gate: Mutex::new(()),
            in_flight: Mutex::new(None),
            store: renewal.store,
            store_key: renewal
                .store_key
                .unwrap_or_else(|| DEFAULT_STORE_KEY.to_string()),
            callback: renewal.callback,
            expiry_margin: renewal.expiry_margin,
        };

        Self {
            inner,
            state: Arc::new(state),
        }
    }

    /// The wrapped, undecorated client.
    pub fn inner(&self) -> &Arc<dyn HttpClient> {
        &self.inner
    }

    /// The key tokens are stored under.
    pub fn store_key(&self) -> &str {
        &self.state.store_key
    }

    /// A snapshot of the current token.
    pub async fn token(&self) -> Token {
        self.state.token.read().await.clone()
    }

    /// Replaces the current token, e.g. after a new authorization-code
    /// exchange. Waits for a refresh in progress to finish first.
    pub async fn set_token(&self, token: Token) {
        let _gate = self.state.refresh_gate.lock().await;
        *self.state.token.write().await = token;
    }

    /// Replaces the current token with the one in the store, if there is one.
    ///
    /// Returns `true` when a stored token was loaded.
    pub async fn load_from_store(&self) -> anyhow::Result<bool> {
        let Some(store) = &self.state.store else {
            return Ok(false);
        };

        match store.load(&self.state.store_key).await? {
            Some(token) => {
                self.set_token(token).await;
                debug!(key = %self.state.store_key, "Loaded token from store");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Returns a token that is not within the expiry margin, refreshing it
    /// first if necessary.
    ///
    /// The refresh runs on its own task and concurrent callers wait on the
    /// same one. Dropping this future stops the wait but not the refresh, so
    /// the exchange still completes for everyone else. A failed refresh
    /// leaves the current token in place.
    pub async fn valid_token(&self) -> Result<Token, OAuthError> {
        {
            let token = self.state.token.read().await;
            if !token.expires_within(self.state.expiry_margin) {
                return Ok(token.clone());
            }
        }

        let mut pending = {
            let mut in_flight = self.state.in_flight.lock().await;
            match in_flight.as_ref() {
                Some(pending) => pending.clone(),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *in_flight = Some(rx.clone());
                    tokio::spawn(Arc::clone(&self.state).refresh(tx));
                    rx
                }
            }
        };

        let settled = pending
            .wait_for(Option::is_some)
            .await
            .map_err(|_| OAuthError::Context(ContextError::Cancelled))?;
        settled
            .clone()
            .unwrap_or(Err(OAuthError::Context(ContextError::Cancelled)))
    }
}

impl RenewalState {
    /// Runs one refresh and publishes its outcome.
    async fn refresh(self: Arc<Self>, outcome: watch::Sender<Option<RefreshOutcome>>) {
        let result = self.refresh_once().await;
        self.in_flight.lock().await.take();
        outcome.send_replace(Some(result));
    }

    async fn refresh_once(&self) -> RefreshOutcome {
        let _gate = self.refresh_gate.lock().await;

        let current = self.token.read().await.clone();
        if !current.expires_within(self.expiry_margin) {
            debug!("Token already refreshed by a concurrent request");
            return Ok(current);
        }

        if !current.can_refresh() {
            if current.is_expired() {
                return Err(OAuthError::MissingRefreshToken);
            }
            warn!("Token expires soon and has no refresh token");
            return Ok(current);
        }

        debug!("Refreshing OAuth2 access token");
        let refreshed = match self.refresher.refresh(&current).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "OAuth2 token refresh failed");
                return Err(e);
            }
        };
        *self.token.write().await = refreshed.clone();
        info!("OAuth2 access token refreshed");

        self.after_refresh(&refreshed).await;
        Ok(refreshed)
    }

    async fn after_refresh(&self, token: &Token) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.store_key, token).await {
                warn!(key = %self.store_key, error = %e, "Failed to persist refreshed token");
            }
        }

        if let Some(callback) = &self.callback {
            if let Err(e) = callback.on_token_refreshed(token).await {
                warn!(error = %e, "Token refresh callback failed");
            }
        }
    }
}

#[async_trait]
impl HttpClient for OAuth2Transport {
    async fn execute(&self, mut request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let token = self
            .valid_token()
            .await
            .map_err(HttpClientError::TokenRefresh)?;

        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(|e| HttpClientError::Other(Box::new(e)))?;
        authorization.set_sensitive(true);
        request.headers.insert(AUTHORIZATION, authorization);

        self.inner.execute(request).await
    }
}
