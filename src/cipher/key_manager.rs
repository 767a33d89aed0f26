// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

use k256::{PublicKey, SecretKey};
use tokio::sync::RwLock;
use tracing::debug;

use super::{derive_shared_secret, SharedSecret};
use crate::error::WalletError;
use crate::storage::ScopedStore;

const OWN_PRIVATE_KEY: &str = "ownPrivateKey";
const PEER_PUBLIC_KEY: &str = "peerPublicKey";

struct KeyState {
    own: Option<SecretKey>,
    peer: Option<PublicKey>,
    secret: Option<SharedSecret>,
}

/// Owns the session key material: the local keypair, the peer's public key
/// once the handshake response delivered it, and the derived shared
/// secret. Keys persist across process restarts as opaque hex blobs in the
/// scoped store and are wiped together on [`clear`](KeyManager::clear).
pub struct KeyManager {
    store: ScopedStore,
    state: RwLock<KeyState>,
}

impl KeyManager {
    /// Restore persisted key material, if any.
    pub async fn new(store: ScopedStore) -> Result<Self, WalletError> {
        let own = match store.get(OWN_PRIVATE_KEY).await? {
            Some(hex_str) => Some(super::import_secret_key_hex(&hex_str)?),
            None => None,
        };
        let peer = match store.get(PEER_PUBLIC_KEY).await? {
            Some(hex_str) => Some(super::import_public_key_hex(&hex_str)?),
            None => None,
        };
        let secret = match (&own, &peer) {
            (Some(own), Some(peer)) => Some(derive_shared_secret(own, peer)?),
            _ => None,
        };
        Ok(Self {
            store,
            state: RwLock::new(KeyState { own, peer, secret }),
        })
    }

    /// The local public key, generating and persisting a fresh keypair on
    /// first use.
    pub async fn own_public_key(&self) -> Result<PublicKey, WalletError> {
        {
            let state = self.state.read().await;
            if let Some(own) = &state.own {
                return Ok(own.public_key());
            }
        }

        let mut state = self.state.write().await;
        // another caller may have generated while we waited for the lock
        if let Some(own) = &state.own {
            return Ok(own.public_key());
        }
        let own = super::generate_keypair();
        self.store
            .set(OWN_PRIVATE_KEY, &super::export_secret_key_hex(&own))
            .await?;
        debug!("generated new session keypair");
        let public = own.public_key();
        state.own = Some(own);
        Ok(public)
    }

    /// Store the peer's public key and derive the shared secret. Requires
    /// the own keypair to exist already (it always does by the time a
    /// handshake response arrives).
    pub async fn set_peer_public_key(&self, peer: PublicKey) -> Result<(), WalletError> {
        let mut state = self.state.write().await;
        let own = state
            .own
            .as_ref()
            .ok_or_else(WalletError::unauthorized_no_session)?;
        let secret = derive_shared_secret(own, &peer)?;
        self.store
            .set(PEER_PUBLIC_KEY, &super::export_public_key_hex(&peer))
            .await?;
        state.peer = Some(peer);
        state.secret = Some(secret);
        debug!("derived shared session secret");
        Ok(())
    }

    /// The derived symmetric key, absent until the peer key is known.
    pub async fn shared_secret(&self) -> Option<SharedSecret> {
        self.state.read().await.secret
    }

    /// Wipe all key material, persisted and in memory.
    pub async fn clear(&self) -> Result<(), WalletError> {
        self.store.remove(OWN_PRIVATE_KEY).await?;
        self.store.remove(PEER_PUBLIC_KEY).await?;
        let mut state = self.state.write().await;
        state.own = None;
        state.peer = None;
        state.secret = None;
        Ok(())
    }
}
