// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Shared test support: a programmable in-process wallet peer.
#![allow(dead_code)]

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use k256::SecretKey;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use uuid::Uuid;

use wallet_bridge::cipher;
use wallet_bridge::signer::{AppMetadata, Chain, UpdateListener};
use wallet_bridge::{
    ConfigEvent, ConfigMessage, IncomingMessage, Message, PeerTransport, RelayClient,
    RequestArguments, ResponseMetadata, RpcRequestMessage, RpcResponse, RpcResponseContent,
    RpcResponseMessage, RpcResult, WalletError, WalletRpcError,
};

pub const WALLET_ORIGIN: &str = "wallet.example";

/// Install the log subscriber once per test binary.
pub fn init_test_logging() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

pub type Responder = Box<dyn Fn(&Message) -> Vec<Message> + Send + Sync>;

/// In-process peer transport. On `open` it announces `peerLoaded`; every
/// sent message is recorded and optionally answered by a scripted
/// responder.
pub struct FakeWalletTransport {
    origin: String,
    incoming: Mutex<Option<mpsc::UnboundedSender<IncomingMessage>>>,
    sent: Mutex<Vec<Message>>,
    responder: Mutex<Option<Responder>>,
    opens: AtomicUsize,
}

impl FakeWalletTransport {
    pub fn new() -> Arc<Self> {
        init_test_logging();
        Arc::new(Self {
            origin: WALLET_ORIGIN.to_string(),
            incoming: Mutex::new(None),
            sent: Mutex::new(Vec::new()),
            responder: Mutex::new(None),
            opens: AtomicUsize::new(0),
        })
    }

    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&Message) -> Vec<Message> + Send + Sync + 'static,
    {
        *self.responder.lock().unwrap() = Some(Box::new(responder));
    }

    /// Inject a message as if the wallet had sent it unprompted.
    pub fn push(&self, message: Message) {
        let origin = self.origin.clone();
        self.push_from(&origin, message);
    }

    /// Inject a message with an arbitrary origin.
    pub fn push_from(&self, origin: &str, message: Message) {
        let guard = self.incoming.lock().unwrap();
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(IncomingMessage {
                origin: origin.to_string(),
                message,
            });
        }
    }

    pub fn sent_messages(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_rpc_requests(&self) -> Vec<RpcRequestMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| match m {
                Message::Request(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    /// Number of version announcements sent so far.
    pub fn version_announcements(&self) -> usize {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| {
                matches!(
                    m,
                    Message::Config(ConfigMessage::Response { response, .. })
                        if response.get("version").is_some()
                )
            })
            .count()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerTransport for FakeWalletTransport {
    async fn open(
        &self,
        incoming: mpsc::UnboundedSender<IncomingMessage>,
    ) -> Result<(), WalletError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let _ = incoming.send(IncomingMessage {
            origin: self.origin.clone(),
            message: ConfigMessage::update(ConfigEvent::PeerLoaded, None).into(),
        });
        *self.incoming.lock().unwrap() = Some(incoming);
        Ok(())
    }

    async fn send(&self, message: Message) -> Result<(), WalletError> {
        self.sent.lock().unwrap().push(message.clone());
        let replies = {
            let responder = self.responder.lock().unwrap();
            responder.as_ref().map(|r| r(&message)).unwrap_or_default()
        };
        for reply in replies {
            self.push(reply);
        }
        Ok(())
    }

    async fn close(&self) {
        self.incoming.lock().unwrap().take();
    }
}

/// The wallet half of the encrypted session: holds the wallet keypair and
/// builds encrypted responses the way a real peer would.
pub struct FakeWallet {
    secret: SecretKey,
}

impl FakeWallet {
    pub fn new() -> Self {
        Self {
            secret: cipher::generate_keypair(),
        }
    }

    pub fn public_key_hex(&self) -> String {
        cipher::export_public_key_hex(&self.secret.public_key())
    }

    fn shared_secret_with(&self, request: &RpcRequestMessage) -> [u8; 32] {
        let client = cipher::import_public_key_hex(&request.sender).unwrap();
        cipher::derive_shared_secret(&self.secret, &client).unwrap()
    }

    fn encrypt_response(&self, request: &RpcRequestMessage, response: &RpcResponse) -> String {
        let secret = self.shared_secret_with(request);
        let plaintext = serde_json::to_vec(response).unwrap();
        BASE64.encode(cipher::encrypt(&secret, &plaintext).unwrap())
    }

    /// Encrypted response to the handshake, carrying the wallet's public
    /// key as sender.
    pub fn handshake_response(
        &self,
        request: &RpcRequestMessage,
        accounts: &[&str],
        data: Option<ResponseMetadata>,
    ) -> RpcResponseMessage {
        let response = RpcResponse {
            result: RpcResult::Value {
                value: json!(accounts),
            },
            data,
        };
        RpcResponseMessage {
            id: Uuid::new_v4(),
            request_id: request.id,
            sender: Some(self.public_key_hex()),
            content: RpcResponseContent::Encrypted(self.encrypt_response(request, &response)),
        }
    }

    /// Encrypted response to an established-session request.
    pub fn encrypted_result(
        &self,
        request: &RpcRequestMessage,
        value: Value,
        data: Option<ResponseMetadata>,
    ) -> RpcResponseMessage {
        let response = RpcResponse {
            result: RpcResult::Value { value },
            data,
        };
        RpcResponseMessage {
            id: Uuid::new_v4(),
            request_id: request.id,
            sender: None,
            content: RpcResponseContent::Encrypted(self.encrypt_response(request, &response)),
        }
    }

    pub fn encrypted_error(
        &self,
        request: &RpcRequestMessage,
        error: WalletRpcError,
    ) -> RpcResponseMessage {
        let response = RpcResponse {
            result: RpcResult::Error { error },
            data: None,
        };
        RpcResponseMessage {
            id: Uuid::new_v4(),
            request_id: request.id,
            sender: None,
            content: RpcResponseContent::Encrypted(self.encrypt_response(request, &response)),
        }
    }
}

pub fn failure_response(request_id: Uuid, code: i64, message: &str) -> RpcResponseMessage {
    RpcResponseMessage {
        id: Uuid::new_v4(),
        request_id,
        sender: None,
        content: RpcResponseContent::Failure(WalletRpcError {
            code,
            message: message.to_string(),
            data: None,
        }),
    }
}

/// Listener recording every notification it receives.
#[derive(Default)]
pub struct RecordingListener {
    pub accounts_events: Mutex<Vec<Vec<String>>>,
    pub chain_events: Mutex<Vec<Chain>>,
}

impl UpdateListener for RecordingListener {
    fn on_accounts_changed(&self, accounts: Vec<String>) {
        self.accounts_events.lock().unwrap().push(accounts);
    }

    fn on_chain_changed(&self, chain: Chain) {
        self.chain_events.lock().unwrap().push(chain);
    }
}

/// Relay stand-in for the legacy variant.
pub struct FakeRelay {
    pub url: String,
    pub accounts: Vec<String>,
    pub resets: AtomicUsize,
}

impl FakeRelay {
    pub fn new(url: &str, accounts: &[&str]) -> Self {
        Self {
            url: url.to_string(),
            accounts: accounts.iter().map(|s| s.to_string()).collect(),
            resets: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RelayClient for FakeRelay {
    fn session_url(&self) -> String {
        self.url.clone()
    }

    async fn request_accounts(
        &self,
        _metadata: &AppMetadata,
    ) -> Result<Vec<String>, WalletError> {
        Ok(self.accounts.clone())
    }

    async fn request(&self, _args: RequestArguments) -> Result<Value, WalletError> {
        Ok(Value::Null)
    }

    async fn reset(&self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn test_metadata() -> AppMetadata {
    AppMetadata {
        app_name: "example dapp".to_string(),
        app_logo_url: None,
        app_chain_ids: vec![1],
    }
}

/// Yield a few scheduler ticks so spawned tasks reach their next await
/// point (tests run on the current-thread runtime).
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}
