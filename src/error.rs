// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Error taxonomy for the wallet channel and signers.
//!
//! Channel and session errors are never retried inside this crate; callers
//! may retry at a higher layer. Any error raised during handshake or signer
//! selection clears persisted state before it propagates, so a partial
//! session is never resumed.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Structured error returned by the wallet itself, either as an
/// unencrypted protocol-level `failure` or embedded inside a decrypted
/// response envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl fmt::Display for WalletRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Which point of the request lifecycle a cancellation hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPhase {
    /// Disconnect preempted the request before anything was transmitted.
    BeforeSending,
    /// The request was transmitted but the channel went down before a
    /// matching response arrived.
    BeforeResponse,
}

impl fmt::Display for CancelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelPhase::BeforeSending => write!(f, "before sending"),
            CancelPhase::BeforeResponse => write!(f, "before response"),
        }
    }
}

#[derive(Debug, Error)]
pub enum WalletError {
    /// No peer is open and one could not be spawned.
    #[error("no peer is connected")]
    NoPeer,

    /// The peer exists but a message could not be delivered to it.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(String),

    /// The request was cancelled by `disconnect()`.
    #[error("request cancelled {0}")]
    Cancelled(CancelPhase),

    /// Unencrypted `failure` content from the peer, e.g. user rejection.
    /// Never retried.
    #[error("wallet rejected the request: {0}")]
    ProtocolFailure(WalletRpcError),

    /// Ciphertext was malformed or the authentication tag did not match.
    /// Fatal to the current session.
    #[error("failed to decrypt payload")]
    Decryption,

    /// Error value embedded inside a successfully decrypted response,
    /// surfaced to the caller verbatim.
    #[error("wallet returned an error: {0}")]
    Domain(WalletRpcError),

    /// An operation required an established session and none exists.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Persisted or selected signer discriminator was not recognized.
    /// Never silently defaulted.
    #[error("unknown signer type: {0}")]
    UnknownSignerType(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("malformed message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl WalletError {
    pub fn unauthorized_no_session() -> Self {
        WalletError::Unauthorized(
            "no valid session found, try requestAccounts before other methods".to_string(),
        )
    }

    /// True for both cancellation phases; they map to a single
    /// user-facing "request cancelled".
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WalletError::Cancelled(_))
    }
}
