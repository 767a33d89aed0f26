// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Wire envelopes exchanged with the wallet peer.
//!
//! Three kinds of messages travel over the channel: unencrypted config
//! (control) messages used for bootstrap and signer selection, RPC request
//! messages and RPC response messages. Responses carry the `requestId` of
//! the request they answer; a message with no `requestId` is a one-way
//! control message.

pub mod config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use config::{ConfigEvent, ConfigMessage};

use crate::error::WalletRpcError;
use crate::signer::RequestArguments;

/// Content of an RPC request message.
///
/// The handshake variant is sent exactly once, unencrypted, to initiate a
/// session; everything after travels as ciphertext of an [`ActionEnvelope`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum RpcRequestContent {
    Handshake(RequestArguments),
    /// Base64 of `nonce || ciphertext` over a serialized [`ActionEnvelope`].
    Encrypted(String),
}

/// Content of an RPC response message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum RpcResponseContent {
    /// Protocol-level failure, unencrypted (e.g. user rejection).
    Failure(WalletRpcError),
    /// Base64 ciphertext of a serialized [`RpcResponse`].
    Encrypted(String),
}

/// RPC request envelope. The sender's public key travels in the clear so
/// the peer can compute the shared secret.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcRequestMessage {
    pub id: Uuid,
    /// Hex-encoded uncompressed SEC1 public key of the sender.
    pub sender: String,
    pub content: RpcRequestContent,
    pub timestamp: DateTime<Utc>,
}

/// RPC response envelope. `sender` is present on the handshake response
/// only, carrying the responder's public key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponseMessage {
    pub id: Uuid,
    pub request_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    pub content: RpcResponseContent,
}

/// Plaintext of an encrypted request: the caller's action plus the chain
/// context it executes against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActionEnvelope {
    pub action: RequestArguments,
    pub chain_id: u64,
}

/// Result half of a decrypted response: either a value or a domain error,
/// surfaced to the caller verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RpcResult {
    Error { error: WalletRpcError },
    Value { value: serde_json::Value },
}

/// Server-asserted session metadata piggybacked on any response. Cached
/// client-side whenever present.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Map of chain id (decimal string) to RPC endpoint URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chains: Option<std::collections::HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<serde_json::Value>,
}

/// Plaintext of an encrypted response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub result: RpcResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseMetadata>,
}

/// Any message that can cross the channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Message {
    Config(ConfigMessage),
    Response(RpcResponseMessage),
    Request(RpcRequestMessage),
}

impl Message {
    /// Process-unique correlation identifier of this message.
    pub fn id(&self) -> Uuid {
        match self {
            Message::Config(m) => m.id(),
            Message::Request(m) => m.id,
            Message::Response(m) => m.id,
        }
    }

    /// For responses, the `id` of the request being answered.
    pub fn request_id(&self) -> Option<Uuid> {
        match self {
            Message::Config(m) => m.request_id(),
            Message::Request(_) => None,
            Message::Response(m) => Some(m.request_id),
        }
    }

    /// True if this is a config update announcing the given event.
    pub fn is_config_event(&self, event: ConfigEvent) -> bool {
        matches!(self, Message::Config(ConfigMessage::Update { event: e, .. }) if *e == event)
    }
}

impl From<ConfigMessage> for Message {
    fn from(m: ConfigMessage) -> Self {
        Message::Config(m)
    }
}

impl From<RpcRequestMessage> for Message {
    fn from(m: RpcRequestMessage) -> Self {
        Message::Request(m)
    }
}

impl From<RpcResponseMessage> for Message {
    fn from(m: RpcResponseMessage) -> Self {
        Message::Response(m)
    }
}
