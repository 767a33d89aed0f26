// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1

//! Peer channel supervisor.
//!
//! Owns the lifecycle of exactly one remote peer at a time: open and wait
//! until ready, announce the library version, multiplex incoming messages
//! into single-fire predicate listeners, correlate requests to responses
//! through the pending table, and tear everything down on disconnect.
//!
//! Requests move through a two-phase `Created -> Awaiting` status with a
//! one-tick deferral between the phases. The deferral closes a race where
//! a caller could be mid-send right as a disconnect occurs: a disconnect
//! issued synchronously after `post_request_await_response` still cancels
//! the request before anything is transmitted. Disconnect is the only
//! cancellation primitive; it drops every `Created` entry outright and
//! rejects every registered listener, which is what resolves `Awaiting`
//! entries. Exactly one outcome is delivered per request.

pub mod transport;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CancelPhase, WalletError};
use crate::message::{ConfigEvent, ConfigMessage, Message, RpcRequestMessage, RpcResponseMessage};
use crate::version::LIB_VERSION;

pub use transport::{IncomingMessage, PeerTransport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestStatus {
    /// Committed to sending, nothing transmitted yet.
    Created,
    /// Transmitted, awaiting the correlated response.
    Awaiting,
}

type Predicate = Box<dyn Fn(&Message) -> bool + Send>;
type Resolver = oneshot::Sender<Result<Message, WalletError>>;

struct Listener {
    predicate: Predicate,
    resolver: Resolver,
}

struct Inner {
    opened: bool,
    dispatcher: Option<JoinHandle<()>>,
    next_listener_id: u64,
    listeners: HashMap<u64, Listener>,
    pending: HashMap<uuid::Uuid, RequestStatus>,
}

/// Supervises the remote wallet peer and correlates request/response
/// traffic over it.
pub struct Communicator {
    transport: Arc<dyn PeerTransport>,
    peer_origin: String,
    /// Serializes open attempts so concurrent callers share one in-flight
    /// open.
    open_lock: tokio::sync::Mutex<()>,
    inner: Mutex<Inner>,
    /// Handle to self for spawned tasks; weak so a dropped communicator
    /// lets its dispatcher and watchers wind down.
    weak: Weak<Self>,
}

impl Communicator {
    pub fn new(transport: Arc<dyn PeerTransport>, peer_origin: impl Into<String>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            transport,
            peer_origin: peer_origin.into(),
            open_lock: tokio::sync::Mutex::new(()),
            inner: Mutex::new(Inner {
                opened: false,
                dispatcher: None,
                next_listener_id: 0,
                listeners: HashMap::new(),
                pending: HashMap::new(),
            }),
            weak: weak.clone(),
        })
    }

    /// Open the peer and wait until it is ready. Idempotent; concurrent
    /// callers share the same in-flight open and exactly one version
    /// announcement is sent per open.
    pub async fn open(&self) -> Result<(), WalletError> {
        let _guard = self.open_lock.lock().await;
        if self.lock_inner().opened {
            return Ok(());
        }
        debug!(origin = %self.peer_origin, "opening wallet peer");

        // Listeners must exist before the transport can deliver anything.
        let (unload_id, unload_rx) =
            self.register(|m| m.is_config_event(ConfigEvent::PeerUnload));
        let (loaded_id, loaded_rx) =
            self.register(|m| m.is_config_event(ConfigEvent::PeerLoaded));

        let (tx, rx) = mpsc::unbounded_channel();
        if let Err(e) = self.transport.open(tx).await {
            self.remove_listener(unload_id);
            self.remove_listener(loaded_id);
            return Err(e);
        }

        let dispatcher = self.spawn_dispatcher(rx);
        self.lock_inner().dispatcher = Some(dispatcher);

        // One-shot unload watcher; its cancellation on disconnect is
        // deliberately swallowed.
        let this = self.weak.clone();
        tokio::spawn(async move {
            if let Ok(Ok(_)) = unload_rx.await {
                if let Some(comm) = this.upgrade() {
                    info!("peer unload received, disconnecting channel");
                    comm.disconnect().await;
                }
            }
        });

        let loaded = match loaded_rx.await {
            Ok(Ok(message)) => message,
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(WalletError::Cancelled(CancelPhase::BeforeResponse)),
        };

        let announce =
            ConfigMessage::response_to(loaded.id(), serde_json::json!({ "version": LIB_VERSION }));
        self.transport.send(announce.into()).await?;

        self.lock_inner().opened = true;
        info!(version = LIB_VERSION, "wallet peer ready");
        Ok(())
    }

    /// Transmit one message, opening the peer first if necessary.
    pub async fn send(&self, message: Message) -> Result<(), WalletError> {
        self.open().await?;
        self.transport.send(message).await
    }

    /// Resolve the first incoming message satisfying `predicate`.
    ///
    /// The listener is registered before this returns, so a caller may
    /// send a request after calling this and await the future afterwards
    /// without a delivery gap. It is removed after it fires or when the
    /// channel disconnects, in which case the future resolves to
    /// `Cancelled`.
    pub fn receive_matching<F>(
        &self,
        predicate: F,
    ) -> impl Future<Output = Result<Message, WalletError>>
    where
        F: Fn(&Message) -> bool + Send + 'static,
    {
        let (_, rx) = self.register(predicate);
        async move {
            match rx.await {
                Ok(result) => result,
                Err(_) => Err(WalletError::Cancelled(CancelPhase::BeforeResponse)),
            }
        }
    }

    /// Post an RPC request and wait for the response carrying its id.
    ///
    /// When the last pending request resolves, the channel disconnects
    /// itself (idle teardown).
    pub async fn post_request_await_response(
        &self,
        request: RpcRequestMessage,
    ) -> Result<RpcResponseMessage, WalletError> {
        let id = request.id;
        self.lock_inner().pending.insert(id, RequestStatus::Created);

        // Deferral tick: a disconnect issued synchronously after this call
        // still gets to cancel the request before anything is sent.
        tokio::task::yield_now().await;

        {
            let mut inner = self.lock_inner();
            match inner.pending.get_mut(&id) {
                None => {
                    debug!(%id, "request cancelled before sending");
                    return Err(WalletError::Cancelled(CancelPhase::BeforeSending));
                }
                Some(status) => *status = RequestStatus::Awaiting,
            }
        }

        let result = self.transmit_and_await(request).await;

        let drained = {
            let mut inner = self.lock_inner();
            inner.pending.remove(&id);
            inner.pending.is_empty()
        };
        if drained {
            debug!("pending table drained, closing channel");
            self.disconnect().await;
        }
        result
    }

    /// Reject pending work, clear the listener table and close the peer.
    /// Safe to call repeatedly, including from a listener resolution.
    pub async fn disconnect(&self) {
        let (listeners, dispatcher) = {
            let mut inner = self.lock_inner();
            // Created entries were never sent; nothing to reject yet.
            inner
                .pending
                .retain(|_, status| *status == RequestStatus::Awaiting);
            let listeners: Vec<Listener> =
                inner.listeners.drain().map(|(_, l)| l).collect();
            let dispatcher = inner.dispatcher.take();
            inner.opened = false;
            (listeners, dispatcher)
        };

        if let Some(handle) = dispatcher {
            handle.abort();
        }
        // Rejecting listeners is what resolves Awaiting requests.
        for listener in listeners {
            let _ = listener
                .resolver
                .send(Err(WalletError::Cancelled(CancelPhase::BeforeResponse)));
        }
        self.transport.close().await;
        debug!("channel disconnected");
    }

    async fn transmit_and_await(
        &self,
        request: RpcRequestMessage,
    ) -> Result<RpcResponseMessage, WalletError> {
        self.open().await?;

        let id = request.id;
        let (listener_id, rx) = self.register(move |m| {
            matches!(m, Message::Response(_)) && m.request_id() == Some(id)
        });

        if let Err(e) = self.transport.send(request.into()).await {
            self.remove_listener(listener_id);
            return Err(e);
        }
        debug!(%id, "rpc request sent, awaiting response");

        let message = match rx.await {
            Ok(result) => result?,
            Err(_) => return Err(WalletError::Cancelled(CancelPhase::BeforeResponse)),
        };
        match message {
            Message::Response(response) => Ok(response),
            other => Err(WalletError::InvalidRequest(format!(
                "expected rpc response, got {other:?}"
            ))),
        }
    }

    fn register<F>(&self, predicate: F) -> (u64, oneshot::Receiver<Result<Message, WalletError>>)
    where
        F: Fn(&Message) -> bool + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.lock_inner();
        let id = inner.next_listener_id;
        inner.next_listener_id += 1;
        inner.listeners.insert(
            id,
            Listener {
                predicate: Box::new(predicate),
                resolver: tx,
            },
        );
        (id, rx)
    }

    fn remove_listener(&self, id: u64) {
        self.lock_inner().listeners.remove(&id);
    }

    fn spawn_dispatcher(&self, mut rx: mpsc::UnboundedReceiver<IncomingMessage>) -> JoinHandle<()> {
        let this = self.weak.clone();
        tokio::spawn(async move {
            while let Some(incoming) = rx.recv().await {
                let Some(comm) = this.upgrade() else { break };
                comm.dispatch(incoming);
            }
        })
    }

    /// Deliver one validated message to the first matching listener.
    /// Holds the state lock only while selecting the listener, so a
    /// resolution that triggers `disconnect()` cannot deadlock.
    fn dispatch(&self, incoming: IncomingMessage) {
        if incoming.origin != self.peer_origin {
            warn!(origin = %incoming.origin, "dropping message from unexpected origin");
            return;
        }
        let resolver = {
            let mut inner = self.lock_inner();
            let matched = inner
                .listeners
                .iter()
                .find(|(_, l)| (l.predicate)(&incoming.message))
                .map(|(id, _)| *id);
            match matched {
                Some(id) => inner.listeners.remove(&id).map(|l| l.resolver),
                None => {
                    debug!(id = %incoming.message.id(), "no listener for message, dropping");
                    None
                }
            }
        };
        if let Some(resolver) = resolver {
            let _ = resolver.send(Ok(incoming.message));
        }
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Listener callbacks never run under this lock, so poisoning only
        // happens if a predicate panics; propagate in that case.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
