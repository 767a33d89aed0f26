// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Signer variants and the shared capability interface they implement.
//!
//! The selector holds a `dyn Signer`, never a concrete type; which variant
//! is behind it is decided once per session by [`SignerSelector`] and
//! persisted as a [`SignerKind`] discriminator.
//!
//! [`SignerSelector`]: selector::SignerSelector

pub mod legacy;
pub mod scw;
pub mod selector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

pub use legacy::{LegacySigner, RelayClient};
pub use scw::EncryptedSessionSigner;
pub use selector::{SignerPreference, SignerSelector};

/// An RPC method call. Method and params are opaque payloads to this crate
/// except for the handful of locally handled methods.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestArguments {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Network context non-handshake requests execute against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Chain {
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<String>,
}

/// Application identity sent as handshake params.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    pub app_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_logo_url: Option<String>,
    pub app_chain_ids: Vec<u64>,
}

/// Persisted discriminator for the active signer variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerKind {
    Scw,
    Legacy,
}

impl SignerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerKind::Scw => "scw",
            SignerKind::Legacy => "legacy",
        }
    }
}

impl fmt::Display for SignerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SignerKind {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scw" => Ok(SignerKind::Scw),
            "legacy" => Ok(SignerKind::Legacy),
            other => Err(WalletError::UnknownSignerType(other.to_string())),
        }
    }
}

/// Outward fire-and-forget notifications, emitted after successful state
/// mutations only.
pub trait UpdateListener: Send + Sync {
    fn on_accounts_changed(&self, accounts: Vec<String>);
    fn on_chain_changed(&self, chain: Chain);
}

/// Listener that drops every notification.
pub struct NoopListener;

impl UpdateListener for NoopListener {
    fn on_accounts_changed(&self, _accounts: Vec<String>) {}
    fn on_chain_changed(&self, _chain: Chain) {}
}

/// Capability interface shared by all signer variants.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Run the variant's session-establishment exchange and return the
    /// authorized accounts.
    async fn handshake(&self) -> Result<Vec<String>, WalletError>;

    /// Execute one RPC method call, locally or via the peer.
    async fn request(&self, args: RequestArguments) -> Result<serde_json::Value, WalletError>;

    /// Clear all session state owned by this signer.
    async fn disconnect(&self) -> Result<(), WalletError>;

    /// Accounts authorized in the current session, empty before handshake.
    async fn accounts(&self) -> Vec<String>;
}
