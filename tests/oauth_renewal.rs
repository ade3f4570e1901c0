//
//  atlassian-rest
//  tests/oauth_renewal.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/03.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! OAuth 2.0 endpoints and automatic token renewal through a real client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use atlassian_rest::api::{
    ApiError, Client, ClientOption, Context, HttpClient, HttpClientError, HttpRequest,
    HttpResponse, ReqwestClient,
};
use atlassian_rest::auth::{
    AutoRenewal, MemoryTokenStore, OAuth2Config, OAuth2Service, OAuthError, Token,
    TokenCallback, TokenStore,
};
use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use serde_json::json;
use tokio::task::JoinSet;
use tokio_test::assert_ok;

const CLIENT_ID: &str = "client-id";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ATLASSIAN_REST_LOG"))
        .with_test_writer()
        .try_init();
}

fn oauth_config(server: &Server) -> OAuth2Config {
    let mut config = OAuth2Config::new(CLIENT_ID, "client-secret", "https://localhost/callback")
        .with_scopes(["read:jira-work", "offline_access"]);
    config.token_url = format!("{}/oauth/token", server.url());
    config.resources_url = format!("{}/oauth/token/accessible-resources", server.url());
    config
}

fn expiring_token() -> Token {
    Token::new("stale")
        .with_refresh_token("r1")
        .with_expires_at(Utc::now() + Duration::seconds(5))
}

fn token_body(access: &str) -> String {
    json!({
        "access_token": access,
        "refresh_token": "r2",
        "expires_in": 3600,
        "token_type": "Bearer",
        "scope": "read:jira-work offline_access",
    })
    .to_string()
}

/// Store wrapper counting saves.
#[derive(Default)]
struct CountingStore {
    inner: MemoryTokenStore,
    saves: AtomicUsize,
}

#[async_trait]
impl TokenStore for CountingStore {
    async fn load(&self, key: &str) -> anyhow::Result<Option<Token>> {
        self.inner.load(key).await
    }

    async fn save(&self, key: &str, token: &Token) -> anyhow::Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(key, token).await
    }
}

struct FailingStore;

#[async_trait]
impl TokenStore for FailingStore {
    async fn load(&self, _key: &str) -> anyhow::Result<Option<Token>> {
        Ok(None)
    }

    async fn save(&self, _key: &str, _token: &Token) -> anyhow::Result<()> {
        anyhow::bail!("disk full")
    }
}

#[derive(Default)]
struct FailingCallback {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenCallback for FailingCallback {
    async fn on_token_refreshed(&self, _token: &Token) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("audit log unavailable")
    }
}

/// Backend that holds token endpoint calls before sending them.
struct SlowTokenEndpoint {
    inner: ReqwestClient,
    delay: StdDuration,
}

#[async_trait]
impl HttpClient for SlowTokenEndpoint {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        if request.url.path() == "/oauth/token" {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.execute(request).await
    }
}

fn renewing_client(server: &Server, renewal: AutoRenewal) -> Client {
    Client::with_options(
        &server.url(),
        None,
        [
            ClientOption::OAuth2(oauth_config(server)),
            ClientOption::AutoRenewal(renewal),
        ],
    )
    .unwrap()
}

#[tokio::test]
async fn concurrent_requests_share_one_refresh() {
    init_tracing();
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::PartialJson(json!({
            "grant_type": "refresh_token",
            "client_id": CLIENT_ID,
            "refresh_token": "r1",
        })))
        .with_status(200)
        .with_body(token_body("fresh"))
        .expect(1)
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(r#"{"accountId":"abc"}"#)
        .expect(10)
        .create_async()
        .await;

    let store = Arc::new(CountingStore::default());
    let client = Arc::new(renewing_client(
        &server,
        AutoRenewal::new(expiring_token()).with_store(store.clone()),
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..10 {
        let client = Arc::clone(&client);
        tasks.spawn(async move {
            client
                .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
                .await
        });
    }
    while let Some(result) = tasks.join_next().await {
        let body = assert_ok!(result.unwrap());
        assert_eq!(body["accountId"], "abc");
    }

    token_mock.assert_async().await;
    api_mock.assert_async().await;
    assert_eq!(store.saves.load(Ordering::SeqCst), 1);

    let saved = store.load(CLIENT_ID).await.unwrap().unwrap();
    assert_eq!(saved.access_token, "fresh");
    assert_eq!(saved.refresh_token.as_deref(), Some("r2"));
    assert_eq!(client.current_token().await.unwrap().access_token, "fresh");
}

#[tokio::test]
async fn deadline_during_refresh_skips_request_and_keeps_token() {
    init_tracing();
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(token_body("fresh"))
        .expect(1)
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body(r#"{"accountId":"abc"}"#)
        .expect(1)
        .create_async()
        .await;

    let http: Arc<dyn HttpClient> = Arc::new(SlowTokenEndpoint {
        inner: ReqwestClient::try_default().unwrap(),
        delay: StdDuration::from_millis(300),
    });
    let client = Client::with_options(
        &server.url(),
        Some(http),
        [
            ClientOption::OAuth2(oauth_config(&server)),
            ClientOption::AutoRenewal(AutoRenewal::new(expiring_token())),
        ],
    )
    .unwrap();

    let ctx = Context::background().with_timeout(StdDuration::from_millis(50));
    let err = client
        .get::<serde_json::Value>(&ctx, "rest/api/3/myself")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::DeadlineExceeded));
    assert!(!api_mock.matched_async().await);
    assert_eq!(client.current_token().await.unwrap().access_token, "stale");

    // The abandoned caller did not stop the exchange; the next call uses it.
    let body: serde_json::Value = client
        .get(&Context::background(), "rest/api/3/myself")
        .await
        .unwrap();
    assert_eq!(body["accountId"], "abc");

    token_mock.assert_async().await;
    api_mock.assert_async().await;
    assert_eq!(client.current_token().await.unwrap().access_token, "fresh");
}

#[tokio::test]
async fn failed_refresh_is_fatal_and_keeps_old_token() {
    let mut server = Server::new_async().await;
    let _token_mock = server
        .mock("POST", "/oauth/token")
        .with_status(403)
        .with_body(
            r#"{"error":"invalid_grant","error_description":"Unknown or invalid refresh token."}"#,
        )
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .expect(0)
        .create_async()
        .await;

    let client = renewing_client(&server, AutoRenewal::new(expiring_token()));
    let err = client
        .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
        .await
        .unwrap_err();

    match err {
        ApiError::OAuth(OAuthError::Endpoint { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "Unknown or invalid refresh token.");
        }
        other => panic!("expected oauth endpoint error, got {:?}", other),
    }

    api_mock.assert_async().await;

    let token = client.current_token().await.unwrap();
    assert_eq!(token.access_token, "stale");
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn store_and_callback_failures_do_not_block_request() {
    let mut server = Server::new_async().await;
    let _token_mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(token_body("fresh"))
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Bearer fresh")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let callback = Arc::new(FailingCallback::default());
    let client = renewing_client(
        &server,
        AutoRenewal::new(expiring_token())
            .with_store(Arc::new(FailingStore))
            .with_callback(callback.clone()),
    );

    assert_ok!(
        client
            .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
            .await
    );
    api_mock.assert_async().await;
    assert_eq!(callback.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fresh_token_is_sent_without_refresh() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .expect(0)
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Bearer live")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let token = Token::new("live")
        .with_refresh_token("r1")
        .with_expires_at(Utc::now() + Duration::hours(1));
    let client = renewing_client(&server, AutoRenewal::new(token));

    assert_ok!(
        client
            .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
            .await
    );
    token_mock.assert_async().await;
    api_mock.assert_async().await;
}

#[tokio::test]
async fn restore_token_from_store_replaces_seed() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .expect(0)
        .create_async()
        .await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Bearer persisted")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    store
        .save(
            CLIENT_ID,
            &Token::new("persisted").with_expires_at(Utc::now() + Duration::hours(1)),
        )
        .await
        .unwrap();

    let client = renewing_client(
        &server,
        AutoRenewal::new(Token::new("seed").with_expires_at(Utc::now() - Duration::hours(1)))
            .with_store(store),
    );
    assert!(client.restore_token_from_store().await.unwrap());

    assert_ok!(
        client
            .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
            .await
    );
    token_mock.assert_async().await;
    api_mock.assert_async().await;
}

#[tokio::test]
async fn disabling_renewal_restores_static_auth() {
    let mut server = Server::new_async().await;
    let api_mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Bearer static")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;

    let token = Token::new("renewed").with_expires_at(Utc::now() + Duration::hours(1));
    let mut client = renewing_client(&server, AutoRenewal::new(token));
    client.set_bearer_token("static");

    assert!(client.disable_token_auto_renewal());
    assert!(client.current_token().await.is_none());

    assert_ok!(
        client
            .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
            .await
    );
    api_mock.assert_async().await;
}

#[tokio::test]
async fn exchange_code_and_list_sites() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "grant_type": "authorization_code",
            "client_id": CLIENT_ID,
            "client_secret": "client-secret",
            "code": "the-code",
            "redirect_uri": "https://localhost/callback",
        })))
        .with_status(200)
        .with_body(token_body("first"))
        .create_async()
        .await;
    let sites_mock = server
        .mock("GET", "/oauth/token/accessible-resources")
        .match_header("authorization", "Bearer first")
        .with_status(200)
        .with_body(
            json!([{
                "id": "1324a887-45db-1bf4-1e99-ef0ff456d421",
                "url": "https://example.atlassian.net",
                "name": "example",
                "scopes": ["read:jira-work"],
                "avatarUrl": "https://site-admin-avatar-cdn.prod.public.atl-paas.net/avatars/240/flag.png"
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let http = Arc::new(ReqwestClient::try_default().unwrap());
    let service = OAuth2Service::new(http, oauth_config(&server)).unwrap();
    let ctx = Context::background();

    let before = Utc::now();
    let token = service
        .exchange_authorization_code(&ctx, "the-code")
        .await
        .unwrap();
    assert_eq!(token.access_token, "first");
    assert!(token.can_refresh());
    assert!(token.expires_at.unwrap() >= before + Duration::seconds(3600));

    let sites = service
        .accessible_resources(&ctx, &token.access_token)
        .await
        .unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0].name, "example");
    assert!(sites[0].avatar_url.is_some());

    token_mock.assert_async().await;
    sites_mock.assert_async().await;
}

#[tokio::test]
async fn refresh_without_rotation_keeps_refresh_token() {
    let mut server = Server::new_async().await;
    let _token_mock = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_body(r#"{"access_token":"next","expires_in":3600}"#)
        .create_async()
        .await;

    let http = Arc::new(ReqwestClient::try_default().unwrap());
    let service = OAuth2Service::new(http, oauth_config(&server)).unwrap();
    let token = service
        .refresh_access_token(&Context::background(), "keep-me")
        .await
        .unwrap();

    assert_eq!(token.access_token, "next");
    assert_eq!(token.refresh_token.as_deref(), Some("keep-me"));
    assert_eq!(token.token_type, "Bearer");
}

#[tokio::test]
async fn oauth_call_honours_cancellation() {
    let mut server = Server::new_async().await;
    let token_mock = server
        .mock("POST", "/oauth/token")
        .expect(0)
        .create_async()
        .await;

    let http = Arc::new(ReqwestClient::try_default().unwrap());
    let service = OAuth2Service::new(http, oauth_config(&server)).unwrap();
    let ctx = Context::background();
    ctx.cancel();

    let err = service
        .exchange_authorization_code(&ctx, "code")
        .await
        .unwrap_err();
    assert!(matches!(err, OAuthError::Context(_)));
    token_mock.assert_async().await;
}
