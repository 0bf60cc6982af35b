//! File-backed credential storage.
//!
//! The token lives in a small JSON document under the `auth_token` key, so
//! other fields can share the file later without a format change.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use rendezvous_client::{TokenStore, TokenStoreError};
use rendezvous_core::AuthToken;
use serde_json::Value;

/// Storage key of the bearer token.
pub const TOKEN_KEY: &str = "auth_token";

/// JSON file holding the bearer token.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    /// Store backed by `path`. The file need not exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<BTreeMap<String, Value>, TokenStoreError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| TokenStoreError::Corrupt(e.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(TokenStoreError::Unavailable(e.to_string())),
        }
    }

    async fn write_document(&self, document: &BTreeMap<String, Value>) -> Result<(), TokenStoreError> {
        let bytes = serde_json::to_vec_pretty(document)
            .map_err(|e| TokenStoreError::Unavailable(e.to_string()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TokenStoreError::Unavailable(e.to_string()))?;
        }

        tokio::fs::write(&self.path, bytes)
            .await
            .map_err(|e| TokenStoreError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get(&self) -> Result<Option<AuthToken>, TokenStoreError> {
        let document = self.read_document().await?;
        match document.get(TOKEN_KEY) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(token)) if token.is_empty() => Ok(None),
            Some(Value::String(token)) => Ok(Some(AuthToken::new(token.clone()))),
            Some(other) => {
                Err(TokenStoreError::Corrupt(format!("{TOKEN_KEY} is not a string: {other}")))
            },
        }
    }

    async fn set(&self, token: &AuthToken) -> Result<(), TokenStoreError> {
        let mut document = self.read_document().await?;
        document.insert(TOKEN_KEY.to_string(), Value::String(token.expose().to_string()));
        self.write_document(&document).await
    }

    async fn delete(&self) -> Result<(), TokenStoreError> {
        let mut document = self.read_document().await?;
        if document.remove(TOKEN_KEY).is_some() {
            self.write_document(&document).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_means_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("token.json"));

        assert_eq!(store.get().await, Ok(None));
        store.delete().await.unwrap();
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn set_get_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileTokenStore::new(dir.path().join("nested").join("token.json"));

        store.set(&AuthToken::new("abc")).await.unwrap();
        assert_eq!(store.get().await, Ok(Some(AuthToken::new("abc"))));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let document: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(document[TOKEN_KEY], "abc");

        store.delete().await.unwrap();
        assert_eq!(store.get().await, Ok(None));
    }

    #[tokio::test]
    async fn other_keys_survive_token_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, r#"{"user_id": 7, "auth_token": "old"}"#).unwrap();
        let store = FileTokenStore::new(&path);

        store.set(&AuthToken::new("new")).await.unwrap();
        store.delete().await.unwrap();

        let document: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(document, serde_json::json!({"user_id": 7}));
    }

    #[tokio::test]
    async fn malformed_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, "not json").unwrap();

        let result = FileTokenStore::new(&path).get().await;
        assert!(matches!(result, Err(TokenStoreError::Corrupt(_))));
    }
}
