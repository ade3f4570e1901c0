//
//  atlassian-rest
//  api/common/response.rs
//
//  Created by Ngonidzashe Mangudya on 2026/02/03.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! Response envelope returned by every API call.

use std::borrow::Cow;

use bytes::Bytes;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::api::http::HttpResponse;

/// A completed HTTP exchange: status, effective endpoint and method, and the
/// raw body bytes.
///
/// The body is always buffered, even for error statuses, so callers can both
/// decode it and inspect it when something goes wrong. The envelope is
/// immutable once built.
///
/// # Example
///
/// ```rust,no_run
/// use atlassian_rest::api::{Client, Context};
/// use reqwest::Method;
///
/// # async fn example(client: &Client) -> Result<(), atlassian_rest::api::ApiError> {
/// let ctx = Context::background();
/// let request = client.new_request(&ctx, Method::GET, "rest/api/3/myself", None, None::<&()>)?;
/// let response = client.call(request).await?;
/// println!("{} {} -> {}", response.method(), response.endpoint(), response.code());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    endpoint: Url,
    method: Method,
    headers: HeaderMap,
    bytes: Bytes,
}

impl From<HttpResponse> for Response {
    fn from(response: HttpResponse) -> Self {
        Self {
            status: response.status,
            endpoint: response.url,
            method: response.method,
            headers: response.headers,
            bytes: response.body,
        }
    }
}

impl Response {
    /// The numeric status code.
    pub fn code(&self) -> u16 {
        self.status.as_u16()
    }

    /// The status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// `true` when the status is in `[200, 300)`.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// The effective URL the response came from.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// The effective HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The raw body.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// The body as text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.bytes)
    }

    /// Extracts a human-readable message from the error body shapes the
    /// Atlassian APIs use.
    ///
    /// Recognised shapes:
    ///
    /// ```json
    /// {"errorMessages": ["Issue does not exist"], "errors": {}}
    /// {"errorMessages": [], "errors": {"summary": "You must specify a summary"}}
    /// {"statusCode": 404, "message": "No content found with id 42"}
    /// {"errors": [{"status": 400, "title": "Invalid space key"}]}
    /// {"error": "invalid_grant", "error_description": "Unknown or invalid refresh token."}
    /// ```
    ///
    /// Returns `None` when the body is empty or not one of these shapes. The
    /// transport never calls this itself; it exists for callers that want a
    /// friendlier message than the status kind.
    pub fn api_error_message(&self) -> Option<String> {
        let json: serde_json::Value = serde_json::from_slice(&self.bytes).ok()?;

        // Jira: {"errorMessages": [...], "errors": {"field": "message"}}
        if let Some(message) = json
            .get("errorMessages")
            .and_then(|m| m.as_array())
            .and_then(|arr| arr.iter().find_map(|m| m.as_str()))
        {
            return Some(message.to_string());
        }

        if let Some(errors) = json.get("errors").and_then(|e| e.as_object()) {
            let mut fields: Vec<String> = errors
                .iter()
                .filter_map(|(field, message)| {
                    message.as_str().map(|m| format!("{}: {}", field, m))
                })
                .collect();
            if !fields.is_empty() {
                fields.sort();
                return Some(fields.join("; "));
            }
        }

        // Confluence v2: {"errors": [{"title": "...", "detail": "..."}]}
        if let Some(first) = json
            .get("errors")
            .and_then(|e| e.as_array())
            .and_then(|arr| arr.first())
        {
            if let Some(message) = first
                .get("title")
                .or_else(|| first.get("detail"))
                .and_then(|m| m.as_str())
            {
                return Some(message.to_string());
            }
        }

        // OAuth endpoints: {"error": "...", "error_description": "..."}
        if let Some(description) = json.get("error_description").and_then(|d| d.as_str()) {
            return Some(description.to_string());
        }

        // Confluence v1: {"statusCode": 404, "message": "..."}
        json.get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
    }
}
