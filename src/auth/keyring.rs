//
//  atlassian-rest
//  auth/keyring.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Token Storage Backends
//!
//! Implementations of [`TokenStore`] used to persist OAuth 2.0 tokens across
//! process restarts.
//!
//! | Store | Backing | Use |
//! |-------|---------|-----|
//! | [`KeyringTokenStore`] | System keyring | Desktop tools |
//! | [`FileTokenStore`] | JSON file (mode `0600` on unix) | Headless servers, containers |
//! | [`MemoryTokenStore`] | Process memory | Tests, short-lived jobs |
//!
//! ## Platform Support
//!
//! The keyring integration uses platform-native secure storage:
//!
//! - **macOS**: Keychain Services
//! - **Linux**: Secret Service API (GNOME Keyring, KWallet)
//! - **Windows**: Windows Credential Manager
//!
//! Tokens are serialized as JSON. In the keyring the store key is the entry
//! user and the service is `atlassian-rest`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use atlassian_rest::auth::{AutoRenewal, KeyringTokenStore, Token};
//!
//! let renewal = AutoRenewal::new(Token::new("access").with_refresh_token("refresh"))
//!     .with_store(Arc::new(KeyringTokenStore::new()));
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use keyring::Entry;
use tokio::sync::Mutex;

use super::oauth::Token;
use super::renewal::TokenStore;
use crate::config::{config_exists, read_config_file, write_private_file, ClientConfig};

/// The service name used to identify this library in the system keyring.
const SERVICE_NAME: &str = crate::APP_NAME;

/// [`TokenStore`] backed by the system keyring.
///
/// Keyring calls are blocking, so they run on the blocking thread pool.
///
/// # Notes
///
/// - The keyring may require user interaction (password, biometrics) on first access.
/// - On Linux, ensure a secret service daemon (GNOME Keyring, KWallet) is running.
#[derive(Debug, Clone)]
pub struct KeyringTokenStore {
    service: String,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringTokenStore {
    /// Creates a store using the `atlassian-rest` service name.
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    /// Creates a store under a custom service name, so several applications
    /// can keep separate tokens.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Removes the token stored under `key`. Missing entries are not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let entry = Entry::new(&service, &key)?;
            match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await?
    }
}

#[async_trait]
impl TokenStore for KeyringTokenStore {
    async fn load(&self, key: &str) -> Result<Option<Token>> {
        let service = self.service.clone();
        let key = key.to_string();
        let secret = tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            let entry = Entry::new(&service, &key)?;
            match entry.get_password() {
                Ok(password) => Ok(Some(password)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await??;

        secret
            .map(|json| serde_json::from_str(&json).context("Stored token is not valid JSON"))
            .transpose()
    }

    async fn save(&self, key: &str, token: &Token) -> Result<()> {
        let json = serde_json::to_string(token)?;
        let service = self.service.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let entry = Entry::new(&service, &key)?;
            entry.set_password(&json)?;
            Ok(())
        })
        .await?
    }
}

/// [`TokenStore`] keeping every token in one JSON file, keyed by store key.
///
/// Use this where no system keyring is available. The file is created with
/// mode `0600` on unix and replaced atomically on every save. File I/O runs
/// on the blocking thread pool.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Creates a store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Creates a store at `tokens.json` in the platform data directory.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(ClientConfig::data_dir()?.join("tokens.json")))
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_tokens(path: &Path) -> Result<HashMap<String, Token>> {
    if !config_exists(path) {
        return Ok(HashMap::new());
    }

    let content = read_config_file(path)?;
    if content.trim().is_empty() {
        return Ok(HashMap::new());
    }

    serde_json::from_str(&content)
        .with_context(|| format!("Token file {} is corrupt", path.display()))
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self, key: &str) -> Result<Option<Token>> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || -> Result<Option<Token>> {
            Ok(read_tokens(&path)?.remove(&key))
        })
        .await?
    }

    async fn save(&self, key: &str, token: &Token) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        let key = key.to_string();
        let token = token.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut tokens = read_tokens(&path)?;
            tokens.insert(key, token);
            write_private_file(&path, &serde_json::to_string_pretty(&tokens)?)
        })
        .await?
    }
}

/// In-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<HashMap<String, Token>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens.
    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self, key: &str) -> Result<Option<Token>> {
        Ok(self.tokens.lock().await.get(key).cloned())
    }

    async fn save(&self, key: &str, token: &Token) -> Result<()> {
        self.tokens
            .lock()
            .await
            .insert(key.to_string(), token.clone());
        Ok(())
    }
}
