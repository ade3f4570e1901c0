//
//  atlassian-rest
//  config/file.rs
//
//  Created by Ngonidzashe Mangudya on 2026/01/12.
//  Copyright (c) 2025 IAMNGONI. All rights reserved.
//

//! # Configuration File I/O Module
//!
//! Low-level file operations shared by [`ClientConfig`](super::ClientConfig)
//! and [`FileTokenStore`](crate::auth::FileTokenStore).
//!
//! ```rust,no_run
//! use std::path::Path;
//! use atlassian_rest::config::{config_exists, read_config_file, write_private_file};
//!
//! let path = Path::new("/path/to/config.toml");
//!
//! if config_exists(path) {
//!     let content = read_config_file(path)?;
//!     println!("Config content: {}", content);
//! } else {
//!     write_private_file(path, "site = \"https://example.atlassian.net\"\n")?;
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Notes
//!
//! - Write operations create missing parent directories
//! - Written files are owner-only (mode `0600` on unix) and replaced atomically
//! - Errors carry the offending path as context

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Reads the whole file at `path` as UTF-8.
pub fn read_config_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Writes `content` to `path` so that only the owner can read it.
///
/// The data goes to a sibling temporary file created with mode `0600` on
/// unix, which is then renamed over `path`. Readers never observe a partial
/// file and the secret is never on disk with wider permissions.
pub fn write_private_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let file_name = path
        .file_name()
        .with_context(|| format!("{} is not a file path", path.display()))?;
    let mut temp_name = std::ffi::OsString::from(".");
    temp_name.push(file_name);
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let written = options
        .open(&temp_path)
        .and_then(|mut file| {
            // A leftover temp file keeps its old mode; tighten it before writing.
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(content.as_bytes())?;
            file.sync_all()
        })
        .and_then(|()| std::fs::rename(&temp_path, path));

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e).with_context(|| format!("Failed to write {}", path.display()));
    }
    Ok(())
}

/// `true` if something exists at `path`.
pub fn config_exists(path: &Path) -> bool {
    path.exists()
}
