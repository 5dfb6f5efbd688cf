//! Directory-backed storage for client logo images.
//!
//! Logos are opaque byte blobs named after the owning client's external code;
//! the server never inspects image content.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};

use crate::error::ServerError;

/// Verify that a resolved path stays within the expected base directory.
/// Prevents path traversal attacks.
fn ensure_within(base: &Path, target: &Path) -> Result<PathBuf, ServerError> {
    // Canonicalize base; target may not exist yet so normalize manually
    let canonical_base = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    // Build the full path and strip out any `..` components
    let mut resolved = canonical_base.clone();
    for component in target
        .strip_prefix(&canonical_base)
        .unwrap_or(target)
        .components()
    {
        match component {
            std::path::Component::Normal(c) => resolved.push(c),
            std::path::Component::ParentDir => {
                return Err(ServerError::BadRequest(
                    "Path traversal detected".to_string(),
                ));
            }
            _ => {} // RootDir, CurDir, Prefix — skip
        }
    }
    if !resolved.starts_with(&canonical_base) {
        return Err(ServerError::BadRequest(
            "Path traversal detected".to_string(),
        ));
    }
    Ok(resolved)
}

#[derive(Debug, Clone)]
pub struct LogoStore {
    base_path: PathBuf,
    max_size: usize,
}

impl LogoStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ServerError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServerError::LogoStorage(format!(
                "Failed to create logo directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Logo store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Store logo bytes under the given file name, overwriting any previous
    /// logo with the same name.
    pub async fn store_logo(&self, file_name: &str, data: &[u8]) -> Result<(), ServerError> {
        if data.is_empty() {
            return Err(ServerError::LogoStorage("Empty logo upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ServerError::LogoTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let path = self.safe_logo_path(file_name)?;

        fs::write(&path, data).await.map_err(|e| {
            ServerError::LogoStorage(format!("Failed to write logo {}: {}", file_name, e))
        })?;

        debug!(name = %file_name, size = data.len(), "Stored logo");
        Ok(())
    }

    pub async fn get_logo(&self, file_name: &str) -> Result<Vec<u8>, ServerError> {
        let path = self.safe_logo_path(file_name)?;

        if !path.exists() {
            return Err(ServerError::LogoNotFound(file_name.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            ServerError::LogoStorage(format!("Failed to read logo {}: {}", file_name, e))
        })?;

        debug!(name = %file_name, size = data.len(), "Retrieved logo");
        Ok(data)
    }

    /// Safe logo path that validates against traversal.
    fn safe_logo_path(&self, file_name: &str) -> Result<PathBuf, ServerError> {
        if file_name.is_empty()
            || file_name.contains('/')
            || file_name.contains('\\')
            || file_name.contains("..")
        {
            return Err(ServerError::BadRequest(
                "Invalid logo file name".to_string(),
            ));
        }
        let raw = self.base_path.join(file_name);
        ensure_within(&self.base_path, &raw)
    }
}

/// Extract a safe lowercase image extension from an uploaded file name.
/// Falls back to `png` when the original name carries none.
pub fn sanitized_extension(original_name: Option<&str>) -> String {
    original_name
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "png".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (LogoStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = LogoStore::new(dir.path().to_path_buf(), 1024 * 1024)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = test_store().await;
        let data = b"png-bytes";

        store.store_logo("CL-AB12.png", data).await.unwrap();
        let retrieved = store.get_logo("CL-AB12.png").await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_overwrite_same_name() {
        let (store, _dir) = test_store().await;

        store.store_logo("CL-AB12.png", b"old").await.unwrap();
        store.store_logo("CL-AB12.png", b"new").await.unwrap();

        assert_eq!(store.get_logo("CL-AB12.png").await.unwrap(), b"new");
    }

    #[tokio::test]
    async fn test_not_found() {
        let (store, _dir) = test_store().await;
        assert!(store.get_logo("missing.png").await.is_err());
    }

    #[tokio::test]
    async fn test_empty_logo_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store_logo("CL-AB12.png", b"").await.is_err());
    }

    #[tokio::test]
    async fn test_traversal_rejected() {
        let (store, _dir) = test_store().await;
        assert!(store.store_logo("../evil.png", b"x").await.is_err());
        assert!(store.get_logo("a/b.png").await.is_err());
    }

    #[test]
    fn test_sanitized_extension() {
        assert_eq!(sanitized_extension(Some("logo.PNG")), "png");
        assert_eq!(sanitized_extension(Some("logo.jpeg")), "jpeg");
        assert_eq!(sanitized_extension(Some("logo")), "png");
        assert_eq!(sanitized_extension(Some("weird..")), "png");
        assert_eq!(sanitized_extension(None), "png");
    }
}
