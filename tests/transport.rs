//
//  atlassian-rest
//  tests/transport.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/03.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! End-to-end transport behaviour against a local mock server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use atlassian_rest::api::{
    ApiError, Client, ClientOption, Context, HttpClient, HttpClientError, HttpRequest,
    HttpResponse, StatusKind,
};
use mockito::Matcher;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_env("ATLASSIAN_REST_LOG"))
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Deserialize)]
struct Content {
    id: String,
}

#[tokio::test]
async fn resolves_path_against_site_without_trailing_slash() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/api/content")
        .match_header("accept", "application/json")
        .with_status(200)
        .with_body(r#"{"id":"1"}"#)
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let ctx = Context::background();
    let request = client
        .new_request(&ctx, Method::GET, "rest/api/content", None, None::<&()>)
        .unwrap();
    assert_eq!(
        request.url().as_str(),
        format!("{}/rest/api/content", server.url())
    );

    let (content, response) = assert_ok!(client.call_json::<Content>(request).await);
    assert_eq!(content.id, "1");
    assert_eq!(response.code(), 200);
    assert_eq!(*response.method(), Method::GET);
    mock.assert_async().await;
}

#[tokio::test]
async fn not_found_keeps_envelope() {
    init_tracing();
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/api/3/issue/NOPE-1")
        .with_status(404)
        .with_body("")
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let ctx = Context::background();

    let err = assert_err!(client.get::<serde_json::Value>(&ctx, "rest/api/3/issue/NOPE-1").await);
    assert!(err.is_not_found());
    assert_eq!(err.kind(), Some(StatusKind::NotFound));

    let response = err.response().unwrap();
    assert_eq!(response.code(), 404);
    assert!(response.bytes().is_empty());
    assert!(response.endpoint().path().ends_with("/rest/api/3/issue/NOPE-1"));
}

#[tokio::test]
async fn error_body_is_buffered_but_not_decoded() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/rest/api/3/issue")
        .with_status(400)
        .with_body(r#"{"errorMessages":[],"errors":{"summary":"You must specify a summary"}}"#)
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let err = client
        .post::<Content, _>(&Context::background(), "rest/api/3/issue", &json!({}))
        .await
        .unwrap_err();

    assert!(err.is_bad_request());
    let response = err.into_response().unwrap();
    assert_eq!(
        response.api_error_message().as_deref(),
        Some("summary: You must specify a summary")
    );
}

#[tokio::test]
async fn unmapped_status_carries_code() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/api/3/search")
        .match_query(Matcher::Any)
        .with_status(429)
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let err = client
        .get::<serde_json::Value>(&Context::background(), "rest/api/3/search?jql=project%3DX")
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(StatusKind::InvalidStatusCode(429)));
    assert!(err.to_string().contains("429"));
}

#[tokio::test]
async fn decode_failure_returns_envelope() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("GET", "/rest/api/content/1")
        .with_status(200)
        .with_body("<html>not json</html>")
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let request = client
        .new_request(
            &Context::background(),
            Method::GET,
            "rest/api/content/1",
            None,
            None::<&()>,
        )
        .unwrap();

    match client.call_json::<Content>(request).await {
        Err(ApiError::Decode { response, .. }) => {
            assert_eq!(response.code(), 200);
            assert_eq!(response.text(), "<html>not json</html>");
        }
        other => panic!("expected decode error, got {:?}", other),
    }
}

#[tokio::test]
async fn basic_auth_wins_over_bearer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/api/3/myself")
        .match_header("authorization", "Basic dXNlcjpwYXNz")
        .match_header("user-agent", "transport-tests/1.0")
        .with_status(200)
        .with_body(r#"{"id":"me"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = Client::with_options(
        &server.url(),
        None,
        [
            ClientOption::BearerToken("token".into()),
            ClientOption::BasicAuth {
                username: "user".into(),
                password: "pass".into(),
            },
            ClientOption::UserAgent("transport-tests/1.0".into()),
        ],
    )
    .unwrap();

    let me: Content = client
        .get(&Context::background(), "rest/api/3/myself")
        .await
        .unwrap();
    assert_eq!(me.id, "me");
    mock.assert_async().await;
}

#[tokio::test]
async fn json_body_and_upload_headers() {
    let mut server = mockito::Server::new_async().await;
    let json_mock = server
        .mock("PUT", "/rest/api/content/1")
        .match_header("content-type", "application/json")
        .match_header("x-atlassian-token", Matcher::Missing)
        .match_body(Matcher::Json(json!({"title": "New title"})))
        .with_status(200)
        .with_body(r#"{"id":"1"}"#)
        .create_async()
        .await;
    let upload_mock = server
        .mock("POST", "/rest/api/content/1/child/attachment")
        .match_header("content-type", "multipart/form-data; boundary=xyz")
        .match_header("x-atlassian-token", "no-check")
        .match_body("--xyz--")
        .with_status(200)
        .with_body(r#"{"results":[]}"#)
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let ctx = Context::background();

    let updated: Content = client
        .put(&ctx, "rest/api/content/1", &json!({"title": "New title"}))
        .await
        .unwrap();
    assert_eq!(updated.id, "1");

    let request = client
        .new_raw_request(
            &ctx,
            Method::POST,
            "rest/api/content/1/child/attachment",
            Some("multipart/form-data; boundary=xyz"),
            "--xyz--",
        )
        .unwrap();
    assert_ok!(client.call(request).await);

    json_mock.assert_async().await;
    upload_mock.assert_async().await;
}

#[tokio::test]
async fn delete_returns_envelope_for_no_content() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("DELETE", "/rest/api/3/issue/X-1")
        .with_status(204)
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let response = client
        .delete(&Context::background(), "rest/api/3/issue/X-1")
        .await
        .unwrap();

    assert_eq!(response.code(), 204);
    assert_eq!(*response.method(), Method::DELETE);
}

#[tokio::test]
async fn redirect_reports_effective_endpoint() {
    let mut server = mockito::Server::new_async().await;
    let target = format!("{}/wiki/rest/api/content/2", server.url());
    let _redirect = server
        .mock("GET", "/wiki/rest/api/content/1")
        .with_status(302)
        .with_header("location", &target)
        .create_async()
        .await;
    let _target = server
        .mock("GET", "/wiki/rest/api/content/2")
        .with_status(200)
        .with_body(r#"{"id":"2"}"#)
        .create_async()
        .await;

    let client = Client::new(&format!("{}/wiki", server.url()), None).unwrap();
    let request = client
        .new_request(
            &Context::background(),
            Method::GET,
            "rest/api/content/1",
            None,
            None::<&()>,
        )
        .unwrap();

    let (content, response) = client.call_json::<Content>(request).await.unwrap();
    assert_eq!(content.id, "2");
    assert_eq!(response.endpoint().as_str(), target);
}

#[tokio::test]
async fn cancelled_context_never_sends() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/rest/api/3/myself")
        .expect(0)
        .create_async()
        .await;

    let client = Client::new(&server.url(), None).unwrap();
    let ctx = Context::background();
    let request = client
        .new_request(&ctx, Method::GET, "rest/api/3/myself", None, None::<&()>)
        .unwrap();
    ctx.cancel();

    let err = client.call(request).await.unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
    assert!(err.response().is_none());
    mock.assert_async().await;
}

/// Backend that never answers.
struct Hanging;

#[async_trait]
impl HttpClient for Hanging {
    async fn execute(&self, _request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn deadline_abandons_in_flight_request() {
    let client = Client::new("https://example.atlassian.net", Some(Arc::new(Hanging))).unwrap();
    let ctx = Context::background().with_timeout(Duration::from_millis(50));
    let request = client
        .new_request(&ctx, Method::GET, "rest/api/3/myself", None, None::<&()>)
        .unwrap();

    let err = client.call(request).await.unwrap_err();
    assert!(matches!(err, ApiError::DeadlineExceeded));
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn connection_failure_has_no_envelope() {
    // Bind then drop a listener so the port is free but nothing answers.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = Client::new(&format!("http://{}", addr), None).unwrap();
    let err = client
        .get::<serde_json::Value>(&Context::background(), "rest/api/3/myself")
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Transport(_)));
    assert!(err.response().is_none());
}
