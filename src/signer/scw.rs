// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Encrypted-session signer.
//!
//! Session lifecycle: `Uninitialized -> Handshaking -> Established ->
//! Disconnected`. The handshake is the only unencrypted RPC exchange; it
//! delivers the peer's public key, after which every payload is encrypted
//! under the derived shared secret. Server-asserted session metadata
//! (available chains, capabilities) piggybacks on responses and is cached
//! so capability reads and most chain switches never leave the process.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AppMetadata, Chain, RequestArguments, Signer, UpdateListener};
use crate::cipher::{self, KeyManager};
use crate::communicator::Communicator;
use crate::error::WalletError;
use crate::message::{
    ActionEnvelope, ResponseMetadata, RpcRequestContent, RpcRequestMessage, RpcResponse,
    RpcResponseContent, RpcResponseMessage, RpcResult,
};
use crate::storage::ScopedStore;

const ACCOUNTS_KEY: &str = "accounts";
const ACTIVE_CHAIN_KEY: &str = "activeChain";
const AVAILABLE_CHAINS_KEY: &str = "availableChains";
const CAPABILITIES_KEY: &str = "walletCapabilities";

const METHOD_REQUEST_ACCOUNTS: &str = "eth_requestAccounts";
const METHOD_GET_CAPABILITIES: &str = "wallet_getCapabilities";
const METHOD_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";

#[derive(Debug, Clone)]
struct SessionState {
    accounts: Vec<String>,
    active_chain: Chain,
    available_chains: Option<Vec<Chain>>,
    capabilities: Option<Value>,
}

/// Signer variant that drives the encrypted session protocol against a
/// wallet peer reached through a [`Communicator`].
pub struct EncryptedSessionSigner {
    metadata: AppMetadata,
    communicator: Arc<Communicator>,
    keys: KeyManager,
    store: ScopedStore,
    listener: Arc<dyn UpdateListener>,
    state: RwLock<SessionState>,
}

impl EncryptedSessionSigner {
    /// Restore persisted session state, falling back to the first
    /// app-declared chain when none was persisted.
    pub async fn new(
        metadata: AppMetadata,
        communicator: Arc<Communicator>,
        store: ScopedStore,
        listener: Arc<dyn UpdateListener>,
    ) -> Result<Self, WalletError> {
        let keys = KeyManager::new(store.clone()).await?;
        let accounts = store.load_object(ACCOUNTS_KEY).await?.unwrap_or_default();
        let active_chain = match store.load_object(ACTIVE_CHAIN_KEY).await? {
            Some(chain) => chain,
            None => Chain {
                id: metadata.app_chain_ids.first().copied().unwrap_or(1),
                rpc_url: None,
            },
        };
        let available_chains = store.load_object(AVAILABLE_CHAINS_KEY).await?;
        let capabilities = store.load_object(CAPABILITIES_KEY).await?;

        Ok(Self {
            metadata,
            communicator,
            keys,
            store,
            listener,
            state: RwLock::new(SessionState {
                accounts,
                active_chain,
                available_chains,
                capabilities,
            }),
        })
    }

    pub async fn active_chain(&self) -> Chain {
        self.state.read().await.active_chain.clone()
    }

    async fn create_request_message(
        &self,
        content: RpcRequestContent,
    ) -> Result<RpcRequestMessage, WalletError> {
        let public_key = self.keys.own_public_key().await?;
        Ok(RpcRequestMessage {
            id: Uuid::new_v4(),
            sender: cipher::export_public_key_hex(&public_key),
            content,
            timestamp: Utc::now(),
        })
    }

    async fn send_encrypted_request(
        &self,
        args: &RequestArguments,
    ) -> Result<RpcResponseMessage, WalletError> {
        let secret = self
            .keys
            .shared_secret()
            .await
            .ok_or_else(WalletError::unauthorized_no_session)?;

        let envelope = ActionEnvelope {
            action: args.clone(),
            chain_id: self.state.read().await.active_chain.id,
        };
        let plaintext = serde_json::to_vec(&envelope)?;
        let blob = cipher::encrypt(&secret, &plaintext)?;
        let message = self
            .create_request_message(RpcRequestContent::Encrypted(BASE64.encode(blob)))
            .await?;

        self.communicator.post_request_await_response(message).await
    }

    /// Decrypt a response envelope and cache any session metadata it
    /// carries. A decryption failure is fatal to the session: state and
    /// key material are cleared before the error surfaces.
    async fn decrypt_response_message(&self, message: RpcResponseMessage) -> Result<RpcResponse, WalletError> {
        let encrypted = match message.content {
            RpcResponseContent::Failure(failure) => {
                return Err(WalletError::ProtocolFailure(failure))
            }
            RpcResponseContent::Encrypted(encrypted) => encrypted,
        };

        let secret = self
            .keys
            .shared_secret()
            .await
            .ok_or_else(WalletError::unauthorized_no_session)?;

        let decrypted = async {
            let blob = BASE64
                .decode(&encrypted)
                .map_err(|_| WalletError::Decryption)?;
            let plaintext = cipher::decrypt(&secret, &blob)?;
            serde_json::from_slice::<RpcResponse>(&plaintext)
                .map_err(|_| WalletError::Decryption)
        }
        .await;

        let response = match decrypted {
            Ok(response) => response,
            Err(e) => {
                warn!("response decryption failed, tearing down session");
                self.clear_session().await?;
                return Err(e);
            }
        };

        if let Some(metadata) = &response.data {
            self.cache_metadata(metadata).await?;
        }
        Ok(response)
    }

    async fn cache_metadata(&self, metadata: &ResponseMetadata) -> Result<(), WalletError> {
        if let Some(chains) = &metadata.chains {
            let mut available: Vec<Chain> = chains
                .iter()
                .filter_map(|(id, rpc_url)| {
                    let id = id.parse::<u64>().ok()?;
                    Some(Chain {
                        id,
                        rpc_url: Some(rpc_url.clone()),
                    })
                })
                .collect();
            available.sort_by_key(|c| c.id);

            let active_id = {
                let mut state = self.state.write().await;
                state.available_chains = Some(available.clone());
                state.active_chain.id
            };
            self.store
                .store_object(AVAILABLE_CHAINS_KEY, &available)
                .await?;
            debug!(count = available.len(), "cached available chains");

            // The active chain id may have just become resolvable.
            self.switch_chain(active_id).await?;
        }

        if let Some(capabilities) = &metadata.capabilities {
            self.state.write().await.capabilities = Some(capabilities.clone());
            self.store.store_object(CAPABILITIES_KEY, capabilities).await?;
            debug!("cached wallet capabilities");
        }
        Ok(())
    }

    /// Apply a chain switch from the cached available list. Returns false
    /// when the target chain is unknown, leaving state untouched.
    async fn switch_chain(&self, chain_id: u64) -> Result<bool, WalletError> {
        let switched = {
            let mut state = self.state.write().await;
            let Some(chain) = state
                .available_chains
                .as_ref()
                .and_then(|chains| chains.iter().find(|c| c.id == chain_id).cloned())
            else {
                return Ok(false);
            };
            if state.active_chain == chain {
                return Ok(true);
            }
            state.active_chain = chain.clone();
            chain
        };
        self.store.store_object(ACTIVE_CHAIN_KEY, &switched).await?;
        info!(chain_id, "active chain switched");
        self.listener.on_chain_changed(switched);
        Ok(true)
    }

    /// Local fast path for chain switches: no round trip when the target
    /// is already in the cached available list. The remote path applies
    /// the switch locally only on an exactly-null result; any other
    /// non-error result is returned unchanged.
    async fn handle_switch_chain(&self, args: RequestArguments) -> Result<Value, WalletError> {
        let chain_id = parse_switch_chain_id(args.params.as_ref())?;

        if self.switch_chain(chain_id).await? {
            return Ok(Value::Null);
        }

        let result = self.send_request_to_peer(args).await?;
        if result.is_null() {
            self.switch_chain(chain_id).await?;
        }
        Ok(result)
    }

    async fn send_request_to_peer(&self, args: RequestArguments) -> Result<Value, WalletError> {
        // Open the peer before building the request so transport-level
        // spawn restrictions (e.g. user-gesture windows) are honored.
        self.communicator.open().await?;

        let response = self.send_encrypted_request(&args).await?;
        let decrypted = self.decrypt_response_message(response).await?;
        match decrypted.result {
            RpcResult::Error { error } => Err(WalletError::Domain(error)),
            RpcResult::Value { value } => Ok(value),
        }
    }

    async fn clear_session(&self) -> Result<(), WalletError> {
        self.store.clear().await?;
        self.keys.clear().await?;
        let mut state = self.state.write().await;
        state.accounts.clear();
        state.available_chains = None;
        state.capabilities = None;
        state.active_chain = Chain {
            id: self.metadata.app_chain_ids.first().copied().unwrap_or(1),
            rpc_url: None,
        };
        Ok(())
    }
}

#[async_trait::async_trait]
impl Signer for EncryptedSessionSigner {
    /// Unencrypted handshake carrying the app metadata; stores the peer's
    /// public key from the response, decrypts the account list and
    /// notifies the accounts-changed listener.
    async fn handshake(&self) -> Result<Vec<String>, WalletError> {
        let message = self
            .create_request_message(RpcRequestContent::Handshake(RequestArguments::new(
                METHOD_REQUEST_ACCOUNTS,
                Some(serde_json::to_value(&self.metadata)?),
            )))
            .await?;
        let response = self.communicator.post_request_await_response(message).await?;

        // protocol-level abort, no decryption attempted
        if let RpcResponseContent::Failure(failure) = &response.content {
            return Err(WalletError::ProtocolFailure(failure.clone()));
        }

        let sender = response.sender.as_deref().ok_or_else(|| {
            WalletError::InvalidRequest("handshake response missing sender key".to_string())
        })?;
        let peer_key = cipher::import_public_key_hex(sender)?;
        self.keys.set_peer_public_key(peer_key).await?;

        let decrypted = self.decrypt_response_message(response).await?;
        let accounts: Vec<String> = match decrypted.result {
            RpcResult::Error { error } => return Err(WalletError::Domain(error)),
            RpcResult::Value { value } => serde_json::from_value(value)?,
        };

        self.state.write().await.accounts = accounts.clone();
        self.store.store_object(ACCOUNTS_KEY, &accounts).await?;
        info!(count = accounts.len(), "session established");
        self.listener.on_accounts_changed(accounts.clone());
        Ok(accounts)
    }

    async fn request(&self, args: RequestArguments) -> Result<Value, WalletError> {
        match args.method.as_str() {
            // answered from cache, no round trip
            METHOD_GET_CAPABILITIES => Ok(self
                .state
                .read()
                .await
                .capabilities
                .clone()
                .unwrap_or(Value::Null)),
            METHOD_SWITCH_CHAIN => self.handle_switch_chain(args).await,
            _ => self.send_request_to_peer(args).await,
        }
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.clear_session().await
    }

    async fn accounts(&self) -> Vec<String> {
        self.state.read().await.accounts.clone()
    }
}

fn parse_switch_chain_id(params: Option<&Value>) -> Result<u64, WalletError> {
    let raw = params
        .and_then(|p| p.get(0))
        .and_then(|entry| entry.get("chainId"))
        .ok_or_else(|| {
            WalletError::InvalidRequest("switch chain request missing chainId param".to_string())
        })?;
    match raw {
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            WalletError::InvalidRequest("chainId must be a non-negative integer".to_string())
        }),
        Value::String(s) => {
            let cleaned = s.strip_prefix("0x").unwrap_or(s);
            let radix = if s.starts_with("0x") { 16 } else { 10 };
            u64::from_str_radix(cleaned, radix)
                .map_err(|_| WalletError::InvalidRequest(format!("invalid chainId: {s}")))
        }
        other => Err(WalletError::InvalidRequest(format!(
            "invalid chainId: {other}"
        ))),
    }
}
