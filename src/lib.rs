// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Authenticated, encrypted request/response channel between an
//! application and a wallet running in a separate execution context.
//!
//! The channel opens and supervises the remote peer, performs an
//! asymmetric key exchange to derive a shared secret, encrypts and
//! correlates every request/response pair, caches server-asserted session
//! metadata, and tears everything down safely on disconnect — while
//! multiple requests may be in flight and the peer may disappear at any
//! time.

pub mod cipher;
pub mod communicator;
pub mod error;
pub mod message;
pub mod provider;
pub mod signer;
pub mod storage;
pub mod version;

// Re-export main types
pub use communicator::{Communicator, IncomingMessage, PeerTransport};
pub use error::{CancelPhase, WalletError, WalletRpcError};
pub use message::{
    ConfigEvent, ConfigMessage, Message, ResponseMetadata, RpcRequestContent, RpcRequestMessage,
    RpcResponse, RpcResponseContent, RpcResponseMessage, RpcResult,
};
pub use provider::WalletProvider;
pub use signer::{
    AppMetadata, Chain, EncryptedSessionSigner, LegacySigner, NoopListener, RelayClient,
    RequestArguments, Signer, SignerKind, SignerPreference, SignerSelector, UpdateListener,
};
pub use storage::{FileStore, KeyValueStore, MemoryStore, ScopedStore};
pub use version::LIB_VERSION;
