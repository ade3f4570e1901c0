//
//  atlassian-rest
//  lib.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # atlassian-rest
//!
//! REST transport and authentication core for Jira and Confluence Cloud.
//!
//! The crate builds requests against a site URL, authenticates them (basic
//! auth, bearer token or OAuth 2.0 with automatic refresh), sends them
//! through a pluggable HTTP client, and classifies the outcome.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use atlassian_rest::api::{Client, Context};
//!
//! # async fn example() -> Result<(), atlassian_rest::api::ApiError> {
//! let mut client = Client::new("https://example.atlassian.net/wiki", None)?;
//! client.set_basic_auth("me@example.com", "api-token");
//!
//! let ctx = Context::background();
//! match client.get::<serde_json::Value>(&ctx, "rest/api/content/42").await {
//!     Ok(page) => println!("{}", page["title"]),
//!     Err(e) if e.is_not_found() => println!("no such page"),
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Logging
//!
//! The crate emits [`tracing`] events and spans but never installs a
//! subscriber.

/// Request building, invocation and error classification.
///
/// This module provides the HTTP transport for:
/// - Jira Cloud REST API v2/v3
/// - Confluence Cloud REST API v1/v2
///
/// The client handles authentication, request building, and error handling.
pub mod api;

/// Authentication and credential management.
///
/// Handles multiple authentication methods:
/// - Basic auth with account email and API token
/// - Static bearer tokens
/// - OAuth 2.0 (3LO) with automatic token refresh
/// - Token persistence via system keychain or file
pub mod auth;

/// Configuration file management.
///
/// Loads client settings from platform-specific locations:
/// - Linux: `~/.config/atlassian-rest/config.toml`
/// - macOS: `~/Library/Application Support/atlassian-rest/config.toml`
/// - Windows: `%APPDATA%\atlassian-rest\config.toml`
pub mod config;

pub use api::{ApiError, Client, Context, Response};
pub use config::ClientConfig;

/// Library name, used for configuration paths and the keyring service.
pub const APP_NAME: &str = "atlassian-rest";

/// Library version, derived from Cargo.toml at compile time.
///
/// # Example
///
/// ```rust
/// use atlassian_rest::VERSION;
///
/// println!("atlassian-rest {}", VERSION);
/// ```
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
