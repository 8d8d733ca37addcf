//! Token storage persisted to a JSON file.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{TRACING_TARGET, TokenKey, TokenStore};
use crate::{Error, Result};

/// On-disk layout of the token file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenFile {
    #[serde(default, rename = "authToken", skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
}

impl TokenFile {
    fn slot(&mut self, key: TokenKey) -> &mut Option<String> {
        match key {
            TokenKey::AccessToken => &mut self.access_token,
            TokenKey::RefreshToken => &mut self.refresh_token,
        }
    }
}

/// Token store that survives process restarts.
///
/// Every write serializes the whole file to a sibling temporary file and
/// renames it over the original, so readers see either the old or the new
/// contents.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

impl FileTokenStore {
    /// Creates a store backed by the file at `path`.
    ///
    /// The file and its parent directory are created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Arc::new(path.into()),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    async fn load(&self) -> Result<TokenFile> {
        match tokio::fs::read(self.path.as_path()).await {
            Ok(bytes) if bytes.is_empty() => Ok(TokenFile::default()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|err| {
                Error::from(err).with_context(self.path.display().to_string())
            }),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(TokenFile::default()),
            Err(err) => Err(Error::from(err).with_context(self.path.display().to_string())),
        }
    }

    async fn save(&self, file: &TokenFile) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = serde_json::to_vec_pretty(file)?;
        let temp_path = self.temp_path();
        tokio::fs::write(&temp_path, bytes).await?;
        tokio::fs::rename(&temp_path, self.path.as_path()).await?;

        tracing::trace!(
            target: TRACING_TARGET,
            path = %self.path.display(),
            "Token file written"
        );

        Ok(())
    }
}

#[async_trait::async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self, key: TokenKey) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        Ok(file.slot(key).take())
    }

    async fn set(&self, key: TokenKey, value: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        *file.slot(key) = Some(value.to_owned());
        self.save(&file).await
    }

    async fn remove(&self, keys: &[TokenKey]) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut file = self.load().await?;
        for key in keys {
            file.slot(*key).take();
        }
        self.save(&file).await
    }
}
