// ABOUTME: The two small files the relay persists for the Steam backend
// ABOUTME: Server-list cache (JSON) and sentry blob (opaque bytes); absence is never an error

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// JSON server list handed to the Steam client at log-on
#[derive(Debug, Clone)]
pub struct ServerListCache {
    path: PathBuf,
}

impl ServerListCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cached list. Missing or corrupt files yield `None`.
    pub fn load(&self) -> Option<serde_json::Value> {
        let content = read_if_present(&self.path)?;
        match serde_json::from_slice(&content) {
            Ok(servers) => Some(servers),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Ignoring corrupt server list cache"
                );
                None
            }
        }
    }

    pub fn store(&self, servers: &serde_json::Value) -> Result<()> {
        let json = serde_json::to_vec(servers).context("Failed to serialize server list")?;
        write_atomic(&self.path, &json)
    }
}

/// Sentry blob issued by Steam Guard; lets later log-ons skip the auth code
#[derive(Debug, Clone)]
pub struct SentryStore {
    path: PathBuf,
}

impl SentryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<Vec<u8>> {
        read_if_present(&self.path).filter(|data| !data.is_empty())
    }

    pub fn store(&self, data: &[u8]) -> Result<()> {
        write_atomic(&self.path, data)
    }
}

fn read_if_present(path: &Path) -> Option<Vec<u8>> {
    match std::fs::read(path) {
        Ok(data) => Some(data),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read cache file");
            None
        }
    }
}

/// Write through a sibling temp file so a crash never leaves half a file
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    std::fs::write(&tmp, data).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace {}", path.display()))?;
    Ok(())
}
