//
//  atlassian-rest
//  config/mod.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Configuration Module
//!
//! Loads [`Client`] settings from a TOML file in the platform configuration
//! directory, with environment variable overrides.
//!
//! ## Configuration File Location
//!
//! - **Linux**: `~/.config/atlassian-rest/config.toml`
//! - **macOS**: `~/Library/Application Support/atlassian-rest/config.toml`
//! - **Windows**: `C:\Users\<User>\AppData\Roaming\atlassian-rest\config\config.toml`
//!
//! ## Example Configuration File
//!
//! ```toml
//! site = "https://example.atlassian.net"
//! user_agent = "my-integration/1.0"
//! timeout_secs = 30
//!
//! [basic]
//! username = "me@example.com"
//! api_token = "ATATT3x..."
//!
//! [oauth2]
//! client_id = "abc"
//! client_secret = "shh"
//! redirect_uri = "https://localhost:8080/callback"
//! scopes = ["read:jira-work", "offline_access"]
//! ```
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `ATLASSIAN_SITE` | `site` |
//! | `ATLASSIAN_USER` | `basic.username` |
//! | `ATLASSIAN_API_TOKEN` | `basic.api_token` |
//! | `ATLASSIAN_BEARER_TOKEN` | `bearer_token` |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use atlassian_rest::config::ClientConfig;
//!
//! let mut config = ClientConfig::load()?;
//! config.apply_env();
//! let client = config.build_client()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod file;

pub use file::*;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::api::{Client, ClientOption, HttpClient, ReqwestClient};
use crate::auth::OAuth2Config;

/// Request timeout applied when the file does not set one.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings from which a [`Client`] is built.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ClientConfig {
    /// The site URL, e.g. `https://example.atlassian.net`.
    #[serde(default)]
    pub site: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Per-request timeout of the default HTTP backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth2: Option<OAuth2Config>,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("site", &self.site)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("basic", &self.basic)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .field("oauth2", &self.oauth2)
            .finish()
    }
}

/// Account email and API token.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct BasicConfig {
    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub api_token: String,
}

impl fmt::Debug for BasicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicConfig")
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

impl ClientConfig {
    /// Loads the configuration from [`ClientConfig::config_path`].
    ///
    /// A missing file yields the default (empty) configuration.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if config_exists(&path) {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads the configuration from `path`.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::from_toml_str(&read_config_file(path)?)
    }

    /// Parses a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Saves the configuration to [`ClientConfig::config_path`].
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Saves the configuration to `path`, creating parent directories.
    ///
    /// The file can hold an API token or client secret, so it is written
    /// owner-only.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        write_private_file(path, &content)
    }

    /// Returns the path to the configuration file.
    ///
    /// The file may not exist; this only returns where it would be.
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", crate::APP_NAME)
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Returns the platform data directory, used for file-backed token
    /// storage.
    pub fn data_dir() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", crate::APP_NAME)
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(dirs.data_dir().to_path_buf())
    }

    /// Overrides fields from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Overrides fields from `lookup`. Unset and empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(site) = get("ATLASSIAN_SITE") {
            self.site = site;
        }
        if let Some(username) = get("ATLASSIAN_USER") {
            self.basic.get_or_insert_with(BasicConfig::default).username = username;
        }
        if let Some(token) = get("ATLASSIAN_API_TOKEN") {
            self.basic.get_or_insert_with(BasicConfig::default).api_token = token;
        }
        if let Some(token) = get("ATLASSIAN_BEARER_TOKEN") {
            self.bearer_token = Some(token);
        }
    }

    /// The options this configuration stands for, in application order.
    pub fn options(&self) -> Vec<ClientOption> {
        let mut options = Vec::new();

        if let Some(basic) = &self.basic {
            options.push(ClientOption::BasicAuth {
                username: basic.username.clone(),
                password: basic.api_token.clone(),
            });
        }
        if let Some(token) = &self.bearer_token {
            options.push(ClientOption::BearerToken(token.clone()));
        }
        if let Some(agent) = &self.user_agent {
            options.push(ClientOption::UserAgent(agent.clone()));
        }
        if let Some(oauth2) = &self.oauth2 {
            options.push(ClientOption::OAuth2(oauth2.clone()));
        }

        options
    }

    /// The request timeout of the default HTTP backend.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Builds a [`Client`] with a [`ReqwestClient`] backend.
    pub fn build_client(&self) -> Result<Client> {
        let http: Arc<dyn HttpClient> = Arc::new(ReqwestClient::new(self.timeout())?);
        Ok(Client::with_options(&self.site, Some(http), self.options())?)
    }
}
