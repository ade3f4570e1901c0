//
//  atlassian-rest
//  api/client.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Atlassian REST Client
//!
//! [`Client`] is the transport core shared by the Jira and Confluence
//! resource services. It turns a relative API path plus an optional payload
//! into a fully-formed request ([`Client::new_request`]), sends it through a
//! pluggable [`HttpClient`] ([`Client::call`]), buffers the body into a
//! [`Response`] envelope and classifies the status code.
//!
//! ## Request pipeline
//!
//! ```text
//! new_request(ctx, method, path, content_type, body)
//!     -> resolve path against site
//!     -> encode body, set Accept / Content-Type / X-Atlassian-Token
//!     -> apply Authorization / User-Agent
//! call(request)
//!     -> execute through HttpClient (OAuth2Transport when auto-renewal is on)
//!     -> buffer body into Response
//!     -> classify status -> ApiError::Status on failure
//! call_json(request)
//!     -> decode the body of a 2xx Response
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use atlassian_rest::api::{Client, ClientOption, Context};
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Myself {
//!     #[serde(rename = "accountId")]
//!     account_id: String,
//! }
//!
//! # async fn example() -> Result<(), atlassian_rest::api::ApiError> {
//! let client = Client::with_options(
//!     "https://example.atlassian.net",
//!     None,
//!     [ClientOption::BasicAuth {
//!         username: "me@example.com".into(),
//!         password: "api-token".into(),
//!     }],
//! )?;
//!
//! let ctx = Context::background();
//! let me: Myself = client.get(&ctx, "rest/api/3/myself").await?;
//! println!("{}", me.account_id);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, debug_span, Instrument};
use url::Url;

use super::common::{classify, ApiError, Response};
use super::context::Context;
use super::http::{HttpClient, HttpRequest, ReqwestClient};
use crate::auth::{
    Authentication, AutoRenewal, OAuth2Config, OAuth2Service, OAuth2Transport, Token,
    TokenRefresher,
};

const JSON: &str = "application/json";

/// Header that disables Atlassian's XSRF check for multipart uploads.
const X_ATLASSIAN_TOKEN: HeaderName = HeaderName::from_static("x-atlassian-token");

/// The HTTP client in use, with the undecorated original always reachable.
#[derive(Clone)]
enum Transport {
    Direct(Arc<dyn HttpClient>),
    Renewing(Arc<OAuth2Transport>),
}

impl Transport {
    fn http(&self) -> Arc<dyn HttpClient> {
        match self {
            Self::Direct(client) => Arc::clone(client),
            Self::Renewing(transport) => Arc::clone(transport) as Arc<dyn HttpClient>,
        }
    }

    fn original(&self) -> &Arc<dyn HttpClient> {
        match self {
            Self::Direct(client) => client,
            Self::Renewing(transport) => transport.inner(),
        }
    }
}

/// Options applied, in order, by [`Client::with_options`].
#[derive(Clone)]
pub enum ClientOption {
    /// Account email and API token.
    BasicAuth {
        /// Account email.
        username: String,
        /// API token.
        password: String,
    },
    /// Static bearer token.
    BearerToken(String),
    /// `User-Agent` header value.
    UserAgent(String),
    /// Configure OAuth 2.0 (see [`Client::configure_oauth2`]).
    OAuth2(OAuth2Config),
    /// Enable token auto-renewal (see [`Client::enable_token_auto_renewal`]).
    /// Must come after [`ClientOption::OAuth2`].
    AutoRenewal(AutoRenewal),
}

impl fmt::Debug for ClientOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BasicAuth { username, .. } => f
                .debug_struct("BasicAuth")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::BearerToken(_) => f.write_str("BearerToken(<redacted>)"),
            Self::UserAgent(agent) => f.debug_tuple("UserAgent").field(agent).finish(),
            Self::OAuth2(config) => f.debug_tuple("OAuth2").field(config).finish(),
            Self::AutoRenewal(renewal) => f.debug_tuple("AutoRenewal").field(renewal).finish(),
        }
    }
}

/// Client for the Atlassian Cloud REST APIs.
///
/// A client targets one site (e.g. `https://example.atlassian.net` for Jira,
/// `https://example.atlassian.net/wiki` for Confluence, or
/// `https://api.atlassian.com/ex/jira/{cloudid}` for OAuth 2.0 apps).
///
/// # Path resolution
///
/// Paths are resolved with standard URL reference resolution against the
/// site, which always ends in `/`. A relative path such as
/// `rest/api/content` keeps any site prefix (`/wiki`), a path starting with
/// `/` replaces it, and an absolute URL overrides the site entirely.
///
/// # Concurrency
///
/// Every method used to issue requests takes `&self`, so a configured client
/// can be shared as `Arc<Client>` across tasks. Configuration methods take
/// `&mut self` and belong to setup.
#[derive(Clone)]
pub struct Client {
    site: Url,
    transport: Transport,
    auth: Authentication,
    oauth: Option<OAuth2Service>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("site", &self.site.as_str())
            .field("auth", &self.auth)
            .field("oauth", &self.oauth)
            .field("auto_renewal", &self.is_auto_renewal_enabled())
            .finish()
    }
}

impl Client {
    /// Creates a client for `site`.
    ///
    /// When `http` is `None` a new [`ReqwestClient`] is created for this
    /// client.
    ///
    /// # Errors
    ///
    /// [`ApiError::InvalidSite`] when `site` is empty, does not parse, or is
    /// not an `http`/`https` URL. [`ApiError::Config`] when the default
    /// backend cannot be built.
    pub fn new(site: &str, http: Option<Arc<dyn HttpClient>>) -> Result<Self, ApiError> {
        let site = parse_site(site)?;
        let http = match http {
            Some(http) => http,
            None => {
                let backend = ReqwestClient::try_default()
                    .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))?;
                Arc::new(backend) as Arc<dyn HttpClient>
            }
        };

        Ok(Self {
            site,
            transport: Transport::Direct(http),
            auth: Authentication::default(),
            oauth: None,
        })
    }

    /// Creates a client and applies `options` in order.
    pub fn with_options(
        site: &str,
        http: Option<Arc<dyn HttpClient>>,
        options: impl IntoIterator<Item = ClientOption>,
    ) -> Result<Self, ApiError> {
        let mut client = Self::new(site, http)?;
        for option in options {
            client.apply(option)?;
        }
        Ok(client)
    }

    /// Applies a single option.
    pub fn apply(&mut self, option: ClientOption) -> Result<(), ApiError> {
        match option {
            ClientOption::BasicAuth { username, password } => {
                self.auth.set_basic_auth(username, password)
            }
            ClientOption::BearerToken(token) => self.auth.set_bearer_token(token),
            ClientOption::UserAgent(agent) => self.auth.set_user_agent(agent),
            ClientOption::OAuth2(config) => self.configure_oauth2(config)?,
            ClientOption::AutoRenewal(renewal) => self.enable_token_auto_renewal(renewal)?,
        }
        Ok(())
    }

    /// The base site URL, always ending in `/`.
    pub fn site(&self) -> &Url {
        &self.site
    }

    pub fn auth(&self) -> &Authentication {
        &self.auth
    }

    pub fn auth_mut(&mut self) -> &mut Authentication {
        &mut self.auth
    }

    pub fn set_basic_auth(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.auth.set_basic_auth(username, password);
    }

    pub fn set_bearer_token(&mut self, token: impl Into<String>) {
        self.auth.set_bearer_token(token);
    }

    pub fn set_user_agent(&mut self, agent: impl Into<String>) {
        self.auth.set_user_agent(agent);
    }

    /// The HTTP client requests go through; the renewal decorator when
    /// auto-renewal is enabled.
    pub fn http_client(&self) -> Arc<dyn HttpClient> {
        self.transport.http()
    }

    /// The HTTP client supplied at construction, never the decorator.
    pub fn original_http_client(&self) -> &Arc<dyn HttpClient> {
        self.transport.original()
    }

    /// Configures OAuth 2.0. Token endpoint calls use the original HTTP
    /// client.
    ///
    /// An already enabled auto-renewal keeps its previous OAuth 2.0 service
    /// until it is enabled again.
    pub fn configure_oauth2(&mut self, config: OAuth2Config) -> Result<(), ApiError> {
        let service = OAuth2Service::new(Arc::clone(self.transport.original()), config)?;
        self.oauth = Some(service);
        Ok(())
    }

    /// The OAuth 2.0 service, when configured.
    pub fn oauth2(&self) -> Option<&OAuth2Service> {
        self.oauth.as_ref()
    }

    /// Wraps the original HTTP client in an [`OAuth2Transport`] that keeps
    /// the access token in `renewal` fresh.
    ///
    /// Enabling again replaces the previous decorator; the original client is
    /// wrapped each time, never a decorator. Without an explicit store key the
    /// OAuth 2.0 client id is used.
    ///
    /// # Errors
    ///
    /// [`ApiError::Config`] when OAuth 2.0 has not been configured.
    pub fn enable_token_auto_renewal(&mut self, mut renewal: AutoRenewal) -> Result<(), ApiError> {
        let oauth = self.oauth.as_ref().ok_or_else(|| {
            ApiError::Config("token auto-renewal requires oauth2 to be configured first".into())
        })?;

        if renewal.store_key.is_none() {
            renewal.store_key = Some(oauth.config().client_id.clone());
        }

        let refresher: Arc<dyn TokenRefresher> = Arc::new(oauth.clone());
        let original = Arc::clone(self.transport.original());
        self.transport = Transport::Renewing(Arc::new(OAuth2Transport::new(
            original, refresher, renewal,
        )));

        debug!("Token auto-renewal enabled");
        Ok(())
    }

    /// Removes the renewal decorator and restores the original client.
    ///
    /// Returns `false` if auto-renewal was not enabled.
    pub fn disable_token_auto_renewal(&mut self) -> bool {
        match &self.transport {
            Transport::Renewing(transport) => {
                self.transport = Transport::Direct(Arc::clone(transport.inner()));
                debug!("Token auto-renewal disabled");
                true
            }
            Transport::Direct(_) => false,
        }
    }

    pub fn is_auto_renewal_enabled(&self) -> bool {
        matches!(self.transport, Transport::Renewing(_))
    }

    /// The live token of the renewal decorator.
    pub async fn current_token(&self) -> Option<Token> {
        match &self.transport {
            Transport::Renewing(transport) => Some(transport.token().await),
            Transport::Direct(_) => None,
        }
    }

    /// Replaces the decorator's token with the one in its store.
    ///
    /// Returns `true` when a stored token was found.
    pub async fn restore_token_from_store(&self) -> anyhow::Result<bool> {
        match &self.transport {
            Transport::Renewing(transport) => transport.load_from_store().await,
            Transport::Direct(_) => Ok(false),
        }
    }

    /// Builds a request with an optional JSON payload.
    ///
    /// - `Accept: application/json` is always set.
    /// - With a payload, it is JSON-encoded and `Content-Type:
    ///   application/json` is set.
    /// - An explicit `content_type` overrides the default and adds
    ///   `X-Atlassian-Token: no-check`.
    /// - Authentication and user agent come from [`Client::auth`].
    ///
    /// Nothing is sent. A cancelled `ctx` is only observed by
    /// [`Client::call`].
    ///
    /// # Errors
    ///
    /// - [`ApiError::InvalidPath`] when `path` cannot be resolved
    /// - [`ApiError::Encode`] when `body` cannot be serialized
    /// - [`ApiError::InvalidHeader`] when a header value is not representable
    pub fn new_request<T: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Option<&T>,
    ) -> Result<Request, ApiError> {
        let body = body
            .map(|value| serde_json::to_vec(value).map(Bytes::from))
            .transpose()
            .map_err(ApiError::Encode)?;

        self.build(ctx, method, path, content_type, body)
    }

    /// Builds a request whose body is sent verbatim, e.g. a multipart upload
    /// prepared by the caller.
    ///
    /// ```rust,no_run
    /// # use atlassian_rest::api::{Client, Context};
    /// # use reqwest::Method;
    /// # async fn example(client: &Client, multipart: Vec<u8>) -> Result<(), atlassian_rest::api::ApiError> {
    /// let request = client.new_raw_request(
    ///     &Context::background(),
    ///     Method::POST,
    ///     "rest/api/3/issue/PROJ-1/attachments",
    ///     Some("multipart/form-data; boundary=xyz"),
    ///     multipart,
    /// )?;
    /// client.call(request).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new_raw_request(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: impl Into<Bytes>,
    ) -> Result<Request, ApiError> {
        self.build(ctx, method, path, content_type, Some(body.into()))
    }

    fn build(
        &self,
        ctx: &Context,
        method: Method,
        path: &str,
        content_type: Option<&str>,
        body: Option<Bytes>,
    ) -> Result<Request, ApiError> {
        let url = self.site.join(path).map_err(|source| ApiError::InvalidPath {
            path: path.to_string(),
            source,
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(JSON));

        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
        }

        if let Some(content_type) = content_type {
            let value = HeaderValue::from_str(content_type)
                .map_err(|_| ApiError::InvalidHeader { name: "Content-Type" })?;
            headers.insert(CONTENT_TYPE, value);
            headers.insert(X_ATLASSIAN_TOKEN, HeaderValue::from_static("no-check"));
        }

        self.auth.apply(&mut headers)?;

        Ok(Request {
            ctx: ctx.clone(),
            inner: HttpRequest {
                method,
                url,
                headers,
                body,
            },
        })
    }

    /// Sends `request` and returns the buffered response.
    ///
    /// The body is buffered for every status. A status outside `[200, 300)`
    /// yields [`ApiError::Status`] carrying the envelope. Failures before a
    /// response (connection, timeout, token refresh, cancellation) carry no
    /// envelope.
    pub async fn call(&self, request: Request) -> Result<Response, ApiError> {
        let Request { ctx, inner } = request;
        let span = debug_span!("atlassian_request", method = %inner.method, endpoint = %inner.url);
        self.send(ctx, inner).instrument(span).await
    }

    async fn send(&self, ctx: Context, request: HttpRequest) -> Result<Response, ApiError> {
        let http = self.transport.http();
        let response: Response = ctx.run(http.execute(request)).await??.into();
        debug!(status = response.code(), "Response received");

        match classify(response.status()) {
            None => Ok(response),
            Some(kind) => Err(ApiError::Status {
                kind,
                response: Box::new(response),
            }),
        }
    }

    /// Sends `request` and decodes a 2xx body as `T`.
    ///
    /// A decode failure is returned as [`ApiError::Decode`] together with the
    /// envelope. Non-2xx responses are never decoded.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        request: Request,
    ) -> Result<(T, Response), ApiError> {
        let response = self.call(request).await?;
        match response.json::<T>() {
            Ok(value) => Ok((value, response)),
            Err(source) => Err(ApiError::Decode {
                source,
                response: Box::new(response),
            }),
        }
    }

    /// `GET path`, decoding the body.
    pub async fn get<T: DeserializeOwned>(&self, ctx: &Context, path: &str) -> Result<T, ApiError> {
        let request = self.new_request(ctx, Method::GET, path, None, None::<&()>)?;
        Ok(self.call_json(request).await?.0)
    }

    /// `POST path` with a JSON body, decoding the response.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.new_request(ctx, Method::POST, path, None, Some(body))?;
        Ok(self.call_json(request).await?.0)
    }

    /// `PUT path` with a JSON body, decoding the response.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        ctx: &Context,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let request = self.new_request(ctx, Method::PUT, path, None, Some(body))?;
        Ok(self.call_json(request).await?.0)
    }

    /// `DELETE path`. Atlassian usually answers `204 No Content`, so the body
    /// is not decoded.
    pub async fn delete(&self, ctx: &Context, path: &str) -> Result<Response, ApiError> {
        let request = self.new_request(ctx, Method::DELETE, path, None, None::<&()>)?;
        self.call(request).await
    }
}

fn parse_site(site: &str) -> Result<Url, ApiError> {
    let invalid = |reason: String| ApiError::InvalidSite {
        site: site.to_string(),
        reason,
    };

    let trimmed = site.trim();
    if trimmed.is_empty() {
        return Err(invalid("site is empty".to_string()));
    }

    let normalized = if trimmed.ends_with('/') {
        trimmed.to_string()
    } else {
        format!("{}/", trimmed)
    };

    let url = Url::parse(&normalized).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
    }
    if url.cannot_be_a_base() {
        return Err(invalid("site cannot be used as a base url".to_string()));
    }

    Ok(url)
}

/// A built request bound to its [`Context`], ready for [`Client::call`].
#[derive(Debug, Clone)]
pub struct Request {
    ctx: Context,
    inner: HttpRequest,
}

impl Request {
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    /// The resolved absolute URL.
    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// Headers can be extended before the request is sent.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.inner.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.inner.body.as_ref()
    }

    /// Splits the request into its context and the raw HTTP request.
    pub fn into_parts(self) -> (Context, HttpRequest) {
        (self.ctx, self.inner)
    }
}
