// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Persisted key-value storage collaborator.
//!
//! The store never interprets what it holds; session key material, cached
//! chains and the signer discriminator all travel through it as opaque
//! strings. [`ScopedStore`] namespaces keys so independent components can
//! share one backend and still clear only their own slice.

pub mod file;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::WalletError;

pub use file::FileStore;

/// Abstract persisted key-value store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), WalletError>;

    async fn remove(&self, key: &str) -> Result<(), WalletError>;

    /// Remove every key starting with `prefix`.
    async fn clear_prefix(&self, prefix: &str) -> Result<(), WalletError>;
}

/// In-memory store. Default backend for tests and for hosts that manage
/// persistence themselves.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), WalletError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), WalletError> {
        self.entries
            .write()
            .await
            .retain(|k, _| !k.starts_with(prefix));
        Ok(())
    }
}

/// Store wrapper that prefixes every key with `wallet-bridge:<scope>:`.
#[derive(Clone)]
pub struct ScopedStore {
    inner: Arc<dyn KeyValueStore>,
    prefix: String,
}

impl ScopedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>, scope: &str) -> Self {
        Self {
            inner,
            prefix: format!("wallet-bridge:{scope}:"),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, WalletError> {
        self.inner.get(&self.scoped(key)).await
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), WalletError> {
        self.inner.set(&self.scoped(key), value).await
    }

    pub async fn remove(&self, key: &str) -> Result<(), WalletError> {
        self.inner.remove(&self.scoped(key)).await
    }

    /// Remove everything under this scope.
    pub async fn clear(&self) -> Result<(), WalletError> {
        self.inner.clear_prefix(&self.prefix).await
    }

    /// Load and deserialize a JSON value stored under `key`.
    pub async fn load_object<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, WalletError> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Serialize and store a JSON value under `key`.
    pub async fn store_object<T: Serialize>(&self, key: &str, value: &T) -> Result<(), WalletError> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}
