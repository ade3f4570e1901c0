//
//  atlassian-rest
//  api/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # API Module
//!
//! The REST transport core shared by the Jira and Confluence services.
//!
//! ## Module Structure
//!
//! - [`client`]: [`Client`], the request builder and transport invoker
//! - [`context`]: [`Context`], cancellation and deadlines per call
//! - [`http`]: the [`HttpClient`] seam and its `reqwest` backend
//! - [`common`]: [`ApiError`], [`classify`] and the [`Response`] envelope

/// Core HTTP client wrapper for the Atlassian REST APIs.
///
/// Provides the [`Client`] struct which handles:
/// - Path resolution against the site URL
/// - Authentication header injection
/// - Request/response serialization
/// - Status code classification
pub mod client;

/// Common types shared by every API call.
///
/// Includes:
/// - [`ApiError`]: Standardized error types
/// - [`StatusKind`]: Classified non-2xx statuses
/// - [`Response`]: Buffered response envelope
pub mod common;

/// Cancellation and deadline scope for requests.
pub mod context;

/// Pluggable HTTP backend.
pub mod http;

pub use client::{Client, ClientOption, Request};
pub use common::{classify, ApiError, Response, StatusKind};
pub use context::{Context, ContextError};
pub use http::{HttpClient, HttpClientError, HttpRequest, HttpResponse, ReqwestClient};
