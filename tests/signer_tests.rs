// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Encrypted-session signer against a scripted wallet peer.

mod common;

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use common::{failure_response, test_metadata, FakeWallet, FakeWalletTransport, RecordingListener, WALLET_ORIGIN};
use wallet_bridge::signer::{Chain, Signer};
use wallet_bridge::storage::{KeyValueStore, MemoryStore, ScopedStore};
use wallet_bridge::{
    Communicator, EncryptedSessionSigner, Message, RequestArguments, ResponseMetadata,
    RpcRequestContent, RpcResponseContent, RpcResponseMessage, WalletError, WalletRpcError,
};

struct Fixture {
    transport: Arc<FakeWalletTransport>,
    wallet: Arc<FakeWallet>,
    listener: Arc<RecordingListener>,
    backend: Arc<MemoryStore>,
    signer: EncryptedSessionSigner,
}

async fn fixture() -> Fixture {
    let transport = FakeWalletTransport::new();
    let wallet = Arc::new(FakeWallet::new());
    let listener = Arc::new(RecordingListener::default());
    let backend = Arc::new(MemoryStore::new());
    let communicator = Communicator::new(transport.clone(), WALLET_ORIGIN);
    let signer = EncryptedSessionSigner::new(
        test_metadata(),
        communicator,
        ScopedStore::new(backend.clone(), "scw-signer"),
        listener.clone(),
    )
    .await
    .unwrap();
    Fixture {
        transport,
        wallet,
        listener,
        backend,
        signer,
    }
}

fn respond_to_handshake(
    transport: &FakeWalletTransport,
    wallet: Arc<FakeWallet>,
    accounts: &'static [&'static str],
    data: Option<ResponseMetadata>,
) {
    transport.set_responder(move |message| match message {
        Message::Request(request)
            if matches!(request.content, RpcRequestContent::Handshake(_)) =>
        {
            vec![Message::Response(wallet.handshake_response(
                request,
                accounts,
                data.clone(),
            ))]
        }
        _ => Vec::new(),
    });
}

fn chains(entries: &[(&str, &str)]) -> ResponseMetadata {
    ResponseMetadata {
        chains: Some(
            entries
                .iter()
                .map(|(id, url)| (id.to_string(), url.to_string()))
                .collect::<HashMap<_, _>>(),
        ),
        capabilities: None,
    }
}

#[tokio::test]
async fn test_handshake_establishes_session_and_notifies_once() {
    let fx = fixture().await;
    respond_to_handshake(&fx.transport, fx.wallet.clone(), &["0xabc"], None);

    let accounts = fx.signer.handshake().await.unwrap();
    assert_eq!(accounts, vec!["0xabc".to_string()]);
    assert_eq!(fx.signer.accounts().await, vec!["0xabc".to_string()]);

    let events = fx.listener.accounts_events.lock().unwrap().clone();
    assert_eq!(events, vec![vec!["0xabc".to_string()]]);

    // session survives a restart through the persisted blob
    assert!(fx
        .backend
        .get("wallet-bridge:scw-signer:accounts")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_request_before_handshake_is_unauthorized() {
    let fx = fixture().await;
    let result = fx
        .signer
        .request(RequestArguments::new("eth_chainId", None))
        .await;
    assert!(matches!(result, Err(WalletError::Unauthorized(_))));
}

#[tokio::test]
async fn test_protocol_failure_surfaces_verbatim_and_keeps_session() {
    let fx = fixture().await;
    respond_to_handshake(&fx.transport, fx.wallet.clone(), &["0xabc"], None);
    fx.signer.handshake().await.unwrap();

    fx.transport.set_responder(|message| match message {
        Message::Request(request)
            if matches!(request.content, RpcRequestContent::Encrypted(_)) =>
        {
            vec![Message::Response(failure_response(
                request.id,
                4001,
                "User rejected the request",
            ))]
        }
        _ => Vec::new(),
    });

    let result = fx
        .signer
        .request(RequestArguments::new("eth_sendTransaction", Some(json!([]))))
        .await;
    match result {
        Err(WalletError::ProtocolFailure(WalletRpcError { code, message, .. })) => {
            assert_eq!(code, 4001);
            assert_eq!(message, "User rejected the request");
        }
        other => panic!("expected protocol failure, got {other:?}"),
    }
    // a rejection is not a session fault
    assert_eq!(fx.signer.accounts().await, vec!["0xabc".to_string()]);
}

#[tokio::test]
async fn test_handshake_metadata_resolves_active_chain() {
    let fx = fixture().await;
    respond_to_handshake(
        &fx.transport,
        fx.wallet.clone(),
        &["0xabc"],
        Some(chains(&[("1", "https://rpc.example"), ("137", "https://polygon.example")])),
    );
    fx.signer.handshake().await.unwrap();

    assert_eq!(
        fx.signer.active_chain().await,
        Chain {
            id: 1,
            rpc_url: Some("https://rpc.example".to_string()),
        }
    );
    let events = fx.listener.chain_events.lock().unwrap().clone();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, 1);
}

#[tokio::test]
async fn test_capabilities_answered_from_cache() {
    let fx = fixture().await;
    let capabilities = json!({ "0x1": { "atomicBatch": { "supported": true } } });
    respond_to_handshake(
        &fx.transport,
        fx.wallet.clone(),
        &["0xabc"],
        Some(ResponseMetadata {
            chains: None,
            capabilities: Some(capabilities.clone()),
        }),
    );
    fx.signer.handshake().await.unwrap();
    let sent_before = fx.transport.sent_messages().len();

    let result = fx
        .signer
        .request(RequestArguments::new("wallet_getCapabilities", None))
        .await
        .unwrap();
    assert_eq!(result, capabilities);
    assert_eq!(fx.transport.sent_messages().len(), sent_before);
}

#[tokio::test]
async fn test_capabilities_null_when_never_received() {
    let fx = fixture().await;
    let result = fx
        .signer
        .request(RequestArguments::new("wallet_getCapabilities", None))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
    assert!(fx.transport.sent_messages().is_empty());
}

#[tokio::test]
async fn test_chain_switch_to_known_chain_stays_local() {
    let fx = fixture().await;
    respond_to_handshake(
        &fx.transport,
        fx.wallet.clone(),
        &["0xabc"],
        Some(chains(&[("1", "https://rpc.example"), ("137", "https://polygon.example")])),
    );
    fx.signer.handshake().await.unwrap();
    let requests_before = fx.transport.sent_rpc_requests().len();

    let result = fx
        .signer
        .request(RequestArguments::new(
            "wallet_switchEthereumChain",
            Some(json!([{ "chainId": "0x89" }])),
        ))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);
    assert_eq!(fx.transport.sent_rpc_requests().len(), requests_before);
    assert_eq!(fx.signer.active_chain().await.id, 137);
}

#[tokio::test]
async fn test_chain_switch_to_unknown_chain_round_trips() {
    let fx = fixture().await;
    respond_to_handshake(&fx.transport, fx.wallet.clone(), &["0xabc"], None);
    fx.signer.handshake().await.unwrap();

    // wallet acknowledges with null and asserts the new chain list
    let wallet = fx.wallet.clone();
    fx.transport.set_responder(move |message| match message {
        Message::Request(request)
            if matches!(request.content, RpcRequestContent::Encrypted(_)) =>
        {
            vec![Message::Response(wallet.encrypted_result(
                request,
                Value::Null,
                Some(chains(&[("8453", "https://base.example")])),
            ))]
        }
        _ => Vec::new(),
    });

    let result = fx
        .signer
        .request(RequestArguments::new(
            "wallet_switchEthereumChain",
            Some(json!([{ "chainId": 8453 }])),
        ))
        .await
        .unwrap();
    assert_eq!(result, Value::Null);

    let active = fx.signer.active_chain().await;
    assert_eq!(active.id, 8453);
    assert_eq!(active.rpc_url.as_deref(), Some("https://base.example"));
}

#[tokio::test]
async fn test_domain_error_passes_through() {
    let fx = fixture().await;
    respond_to_handshake(&fx.transport, fx.wallet.clone(), &["0xabc"], None);
    fx.signer.handshake().await.unwrap();

    let wallet = fx.wallet.clone();
    fx.transport.set_responder(move |message| match message {
        Message::Request(request)
            if matches!(request.content, RpcRequestContent::Encrypted(_)) =>
        {
            vec![Message::Response(wallet.encrypted_error(
                request,
                WalletRpcError {
                    code: 5700,
                    message: "unsupported capability".to_string(),
                    data: None,
                },
            ))]
        }
        _ => Vec::new(),
    });

    let result = fx
        .signer
        .request(RequestArguments::new("wallet_sendCalls", Some(json!([]))))
        .await;
    match result {
        Err(WalletError::Domain(error)) => assert_eq!(error.code, 5700),
        other => panic!("expected domain error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_undecryptable_response_tears_down_session() {
    let fx = fixture().await;
    respond_to_handshake(&fx.transport, fx.wallet.clone(), &["0xabc"], None);
    fx.signer.handshake().await.unwrap();

    fx.transport.set_responder(|message| match message {
        Message::Request(request)
            if matches!(request.content, RpcRequestContent::Encrypted(_)) =>
        {
            vec![Message::Response(RpcResponseMessage {
                id: uuid::Uuid::new_v4(),
                request_id: request.id,
                sender: None,
                content: RpcResponseContent::Encrypted("AAAAAAAA".to_string()),
            })]
        }
        _ => Vec::new(),
    });

    let result = fx
        .signer
        .request(RequestArguments::new("eth_accounts", None))
        .await;
    assert!(matches!(result, Err(WalletError::Decryption)));
    assert!(fx.signer.accounts().await.is_empty());
    assert!(fx
        .backend
        .get("wallet-bridge:scw-signer:accounts")
        .await
        .unwrap()
        .is_none());
}
