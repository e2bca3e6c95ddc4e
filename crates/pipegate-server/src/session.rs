//! Client session (C3) — §3, §4.3.
//!
//! A [`ClientSession`] owns one connected client's WebSocket exclusively for
//! the session's lifetime. Public requests are multiplexed over it via
//! [`ClientSession::dispatch`]; a single reader task
//! ([`ClientSession::run_reader`]) delivers responses back to whichever
//! `dispatch` call is waiting on the matching `request_id`.

use std::collections::HashMap;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use pipegate_types::{ConnectionId, RequestId, RequestMessage, ResponseMessage, WireMessage};

use crate::error::TunnelError;
use crate::registry::SessionRegistry;

/// The four session lifecycle states from §3, backed by an atomic so state
/// checks never require holding an async lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Registering = 0,
    Active = 1,
    Draining = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => SessionState::Registering,
            1 => SessionState::Active,
            2 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// One connected client (§3 `Session`).
pub struct ClientSession {
    conn_id: ConnectionId,
    /// Serializes writes to the socket; the WebSocket permits one writer at
    /// a time (§3 `send_lock`). A `tokio::sync::Mutex` because the lock is
    /// held across the `send().await` call.
    sink: tokio::sync::Mutex<SplitSink<WebSocket, Message>>,
    /// RequestId -> one-shot waiter. A plain `std::sync::Mutex` suffices:
    /// every critical section here is a quick insert/remove with no
    /// `.await` inside it.
    pending: Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>,
    state: AtomicU8,
    closed_cause: StdMutex<Option<TunnelError>>,
}

impl ClientSession {
    /// Construct a new session in `Registering` state, wrapping the sink
    /// half of an already-accepted WebSocket.
    pub fn new(conn_id: ConnectionId, sink: SplitSink<WebSocket, Message>) -> Arc<Self> {
        Arc::new(Self {
            conn_id,
            sink: tokio::sync::Mutex::new(sink),
            pending: Mutex::new(HashMap::new()),
            state: AtomicU8::new(SessionState::Registering as u8),
            closed_cause: StdMutex::new(None),
        })
    }

    pub fn conn_id(&self) -> ConnectionId {
        self.conn_id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Synchronous, lock-free check used by the registry's replace-if-closed
    /// rule (§4.2) — cheap enough to call while holding the registry lock.
    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Mark the session Active once it has been registered (§4.5 step 5).
    pub fn mark_active(&self) {
        self.state.store(SessionState::Active as u8, Ordering::SeqCst);
    }

    pub fn closed_cause(&self) -> Option<TunnelError> {
        self.closed_cause.lock().unwrap().clone()
    }

    /// Dispatch a request over this session and await its matching response
    /// (§4.3 `dispatch`, §5 suspension points).
    pub async fn dispatch(
        self: &Arc<Self>,
        msg: RequestMessage,
        deadline: Duration,
        registry: &SessionRegistry,
    ) -> Result<ResponseMessage, TunnelError> {
        if self.state() != SessionState::Active {
            return Err(TunnelError::TunnelClosed);
        }

        let request_id = msg.request_id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(request_id, tx);

        let encoded = pipegate_types::encode_request(&msg);
        let send_result = {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Text(encoded.into())).await
        };

        if let Err(e) = send_result {
            self.pending.lock().unwrap().remove(&request_id);
            self.begin_drain(TunnelError::Io(e.to_string()), registry).await;
            return Err(TunnelError::TunnelClosed);
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => Ok(response),
            // Sender dropped without sending: draining failed every waiter
            // without a response (§4.3 "session closed while waiting").
            Ok(Err(_)) => Err(TunnelError::TunnelClosed),
            Err(_elapsed) => {
                self.pending.lock().unwrap().remove(&request_id);
                Err(TunnelError::UpstreamTimeout)
            }
        }
    }

    /// Deliver a response decoded by the reader to the waiter that matches
    /// its `request_id`. A lookup miss (the waiter already timed out or the
    /// public caller disconnected) is not an error — the response is
    /// silently discarded (§4.3, §5).
    fn deliver_response(&self, response: ResponseMessage) {
        let waiter = self.pending.lock().unwrap().remove(&response.request_id);
        if let Some(waiter) = waiter {
            let _ = waiter.send(response);
        }
    }

    /// The single reader task for this session (§4.3 item 1). Runs until
    /// the socket closes, errors, or a malformed/unexpected frame arrives,
    /// then drains.
    pub async fn run_reader(
        self: Arc<Self>,
        mut stream: SplitStream<WebSocket>,
        registry: SessionRegistry,
    ) {
        loop {
            let frame = match stream.next().await {
                Some(Ok(Message::Text(text))) => Some(text.to_string()),
                Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => Some(text),
                    Err(_) => {
                        self.begin_drain(
                            TunnelError::MalformedMessage("binary frame was not UTF-8".into()),
                            &registry,
                        )
                        .await;
                        return;
                    }
                },
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => {
                    self.begin_drain(TunnelError::TunnelClosed, &registry).await;
                    return;
                }
                Some(Err(e)) => {
                    self.begin_drain(TunnelError::Io(e.to_string()), &registry).await;
                    return;
                }
            };

            let Some(text) = frame else { continue };

            match pipegate_types::decode(&text) {
                Ok(WireMessage::Response(response)) => self.deliver_response(response),
                Ok(WireMessage::Request(_)) => {
                    warn!(conn_id = %self.conn_id, "client sent a request frame; protocol error");
                    self.begin_drain(
                        TunnelError::MalformedMessage("client sent a request frame".into()),
                        &registry,
                    )
                    .await;
                    return;
                }
                Err(e) => {
                    warn!(conn_id = %self.conn_id, error = %e, "malformed frame from client");
                    self.begin_drain(TunnelError::from(e), &registry).await;
                    return;
                }
            }
        }
    }

    /// Close the socket with an application-defined close code, without
    /// registering or unregistering through the registry. Used only to
    /// reject a `ConnIdInUse` conflict at handshake, before the session has
    /// ever been registered (§4.5 step 4, §8 S4).
    pub async fn reject_with_close_code(&self, code: u16, reason: &str) {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(Some(frame))).await;
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
    }

    /// Transition to Draining and run the teardown sequence from §4.3:
    /// fail every pending waiter, close the socket, transition to Closed,
    /// unregister from the registry. Idempotent — a second call is a no-op.
    pub async fn begin_drain(self: &Arc<Self>, cause: TunnelError, registry: &SessionRegistry) {
        let prior = self.state.swap(SessionState::Draining as u8, Ordering::SeqCst);
        if prior == SessionState::Draining as u8 || prior == SessionState::Closed as u8 {
            // Someone else is already draining (or finished); restore the
            // Closed state if that's what was there and return.
            self.state.store(prior, Ordering::SeqCst);
            return;
        }

        *self.closed_cause.lock().unwrap() = Some(cause);

        // (a) fail every pending waiter with TunnelClosed (dropping the
        // sender does this — the receiving `dispatch` call sees RecvError).
        let waiters: Vec<_> = self.pending.lock().unwrap().drain().collect();
        drop(waiters);

        // (b) close the socket.
        {
            let mut sink = self.sink.lock().await;
            let _ = sink.close().await;
        }

        // (c) state = Closed.
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);

        // (d) unregister (no-op if a successor already replaced us).
        registry.unregister(self.conn_id, self);

        debug!(conn_id = %self.conn_id, "session drained");
    }
}
