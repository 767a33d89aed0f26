// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::WalletError;

/// File-backed store: a single JSON map, rewritten atomically through a
/// temp file on every mutation. Value blobs stay opaque.
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing entries if the file is
    /// present.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, WalletError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path).await {
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(WalletError::Storage(e.to_string())),
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    async fn persist(&self, entries: &HashMap<String, String>) -> Result<(), WalletError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| WalletError::Storage(e.to_string()))?;
            }
        }
        let json = serde_json::to_string(entries)?;

        // Write through a temp file, then rename
        let temp_path = self.path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        file.write_all(json.as_bytes())
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        file.sync_all()
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), WalletError> {
        let mut entries = self.entries.write().await;
        if entries.remove(key).is_some() {
            self.persist(&entries).await?;
        }
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), WalletError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        if entries.len() != before {
            self.persist(&entries).await?;
        }
        Ok(())
    }
}
