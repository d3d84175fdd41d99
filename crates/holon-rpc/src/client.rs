//! Bidirectional Holon-RPC client.
//!
//! The client speaks JSON-RPC 2.0 over a WebSocket carrier negotiated with
//! the `holon-rpc` subprotocol. Either side may issue requests: outbound
//! calls go through [`RpcClient::invoke`], inbound ones are dispatched to
//! handlers installed with [`RpcClient::register`].
//!
//! Three background tasks keep a session alive. The receive task
//! demultiplexes inbound frames to pending invokes or handlers; the
//! heartbeat task proves carrier liveness with periodic `rpc.heartbeat`
//! requests; the reconnect task resurrects the carrier after a failure,
//! backing off exponentially with jitter. Handlers live in client state,
//! not in the carrier, so they survive reconnects.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::backoff::ReconnectPolicy;
use crate::envelope::{self, code, empty_object, Envelope, ErrorObject};
use crate::error::RpcError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Future returned by a server-call handler.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<Value, RpcError>> + Send>>;

/// A server-call handler: params in, params (or a structured error) out.
pub type Handler = Arc<dyn Fn(Value) -> HandlerFuture + Send + Sync>;

/// Tuning for heartbeat and reconnection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Pause between heartbeat requests.
    pub heartbeat_interval: Duration,
    /// Wall-clock deadline for each heartbeat response.
    pub heartbeat_timeout: Duration,
    /// Backoff schedule for carrier resurrection.
    pub reconnect: ReconnectPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(10),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// A live carrier. The generation ties background tasks to the carrier
/// they were started for, so a stale task cannot tear down its successor.
struct Session {
    sink: Arc<Mutex<WsSink>>,
    generation: u64,
}

#[derive(Default)]
struct Tasks {
    receive: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

struct State {
    url: Option<String>,
    session: Option<Session>,
    pending: HashMap<String, oneshot::Sender<Result<Value, RpcError>>>,
    handlers: HashMap<String, Handler>,
    next_id: u64,
    generation: u64,
    tasks: Tasks,
}

struct Inner {
    config: ClientConfig,
    closed: AtomicBool,
    state: Mutex<State>,
}

/// Bidirectional JSON-RPC 2.0 peer over a `holon-rpc` WebSocket carrier.
///
/// Cheap to clone; clones share one session.
#[derive(Clone)]
pub struct RpcClient {
    inner: Arc<Inner>,
}

impl RpcClient {
    pub fn new(config: ClientConfig) -> Self {
        RpcClient {
            inner: Arc::new(Inner {
                config,
                closed: AtomicBool::new(false),
                state: Mutex::new(State {
                    url: None,
                    session: None,
                    pending: HashMap::new(),
                    handlers: HashMap::new(),
                    next_id: 0,
                    generation: 0,
                    tasks: Tasks::default(),
                }),
            }),
        }
    }

    /// Install a handler for calls arriving from the peer.
    ///
    /// Registering the same method again replaces the previous handler.
    /// Handlers survive reconnects; register before or between connects.
    pub async fn register<F>(&self, method: &str, handler: F)
    where
        F: Fn(Value) -> HandlerFuture + Send + Sync + 'static,
    {
        let mut state = self.inner.state.lock().await;
        state.handlers.insert(method.to_string(), Arc::new(handler));
    }

    /// Open the carrier and start the receive and heartbeat tasks.
    ///
    /// Fails with [`RpcError::InvalidUrl`] when `url` does not parse and
    /// [`RpcError::Protocol`] when the server does not negotiate
    /// `holon-rpc`.
    pub async fn connect(&self, url: &str) -> Result<(), RpcError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RpcError::NotConnected);
        }
        let (sink, source) = connect_carrier(url).await?;

        let mut state = self.inner.state.lock().await;
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(RpcError::NotConnected);
        }
        state.url = Some(url.to_string());
        // Replacing an existing session drops its carrier, stops any
        // reconnect in flight, and fails the old session's invokes.
        if let Some(handle) = state.tasks.reconnect.take() {
            handle.abort();
        }
        state.session = None;
        for (_, slot) in state.pending.drain() {
            let _ = slot.send(Err(RpcError::NotConnected));
        }
        install_session(&self.inner, &mut state, sink, source);
        Ok(())
    }

    /// Call `method` on the peer and await its response.
    ///
    /// The result is the response's `result` object; a JSON-RPC error
    /// response comes back as [`RpcError::Response`]. The call waits
    /// indefinitely; wrap it in [`RpcClient::invoke_with_timeout`] (or a
    /// caller-side timeout) for a deadline. On carrier loss every
    /// outstanding call completes with [`RpcError::NotConnected`].
    pub async fn invoke(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        self.invoke_inner(method, params, None).await
    }

    /// [`RpcClient::invoke`] with a wall-clock deadline.
    pub async fn invoke_with_timeout(
        &self,
        method: &str,
        params: Value,
        deadline: Duration,
    ) -> Result<Value, RpcError> {
        self.invoke_inner(method, params, Some(deadline)).await
    }

    async fn invoke_inner(
        &self,
        method: &str,
        params: Value,
        deadline: Option<Duration>,
    ) -> Result<Value, RpcError> {
        if method.is_empty() {
            return Err(RpcError::Protocol("method is required".to_string()));
        }

        let (id, sink, rx) = {
            let mut state = self.inner.state.lock().await;
            let sink = match state.session.as_ref() {
                Some(session) => session.sink.clone(),
                None => return Err(RpcError::NotConnected),
            };
            state.next_id += 1;
            let id = format!("c{}", state.next_id);
            let (tx, rx) = oneshot::channel();
            state.pending.insert(id.clone(), tx);
            (id, sink, rx)
        };

        let frame = Envelope::request(&id, method, params);
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                self.inner.state.lock().await.pending.remove(&id);
                return Err(RpcError::Serialization(e.to_string()));
            }
        };
        if let Err(e) = sink.lock().await.send(WsMessage::Text(text.into())).await {
            tracing::debug!(error = %e, method, "request send failed");
            self.inner.state.lock().await.pending.remove(&id);
            return Err(RpcError::NotConnected);
        }

        match deadline {
            None => match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(RpcError::NotConnected),
            },
            Some(deadline) => match tokio::time::timeout(deadline, rx).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(RpcError::NotConnected),
                Err(_) => {
                    self.inner.state.lock().await.pending.remove(&id);
                    Err(RpcError::Timeout)
                }
            },
        }
    }

    /// Whether a carrier is currently live.
    pub async fn is_connected(&self) -> bool {
        self.inner.state.lock().await.session.is_some()
    }

    /// Tear the client down: cancel the background tasks, close the
    /// carrier with a normal-closure code, and fail every pending invoke
    /// with [`RpcError::NotConnected`]. Idempotent and terminal.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = {
            let mut state = self.inner.state.lock().await;
            for handle in [
                state.tasks.receive.take(),
                state.tasks.heartbeat.take(),
                state.tasks.reconnect.take(),
            ]
            .into_iter()
            .flatten()
            {
                handle.abort();
            }
            for (_, slot) in state.pending.drain() {
                let _ = slot.send(Err(RpcError::NotConnected));
            }
            state.session.take()
        };
        if let Some(session) = session {
            let mut sink = session.sink.lock().await;
            let _ = sink
                .send(WsMessage::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "".into(),
                })))
                .await;
            let _ = sink.close().await;
        }
        tracing::debug!("rpc client closed");
    }
}

impl Default for RpcClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

/// Open the WebSocket and verify the negotiated subprotocol.
async fn connect_carrier(url: &str) -> Result<(WsSink, WsSource), RpcError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| RpcError::InvalidUrl(format!("{url}: {e}")))?;
    request
        .headers_mut()
        .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_static(envelope::SUBPROTOCOL));

    let (mut stream, response) = connect_async(request).await.map_err(|e| match e {
        tungstenite::Error::Url(e) => RpcError::InvalidUrl(format!("{url}: {e}")),
        tungstenite::Error::Protocol(ProtocolError::SecWebSocketSubProtocolError(_)) => {
            RpcError::Protocol(format!(
                "server did not negotiate {}",
                envelope::SUBPROTOCOL
            ))
        }
        other => RpcError::Protocol(format!("websocket connect failed: {other}")),
    })?;

    let negotiated = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok());
    if negotiated != Some(envelope::SUBPROTOCOL) {
        let _ = stream
            .close(Some(CloseFrame {
                code: CloseCode::Protocol,
                reason: "subprotocol not negotiated".into(),
            }))
            .await;
        return Err(RpcError::Protocol(format!(
            "server did not negotiate {}",
            envelope::SUBPROTOCOL
        )));
    }

    tracing::debug!(url, "carrier established");
    Ok(stream.split())
}

/// Adopt a fresh carrier under the state lock and start its tasks.
fn install_session(inner: &Arc<Inner>, state: &mut State, sink: WsSink, source: WsSource) {
    if let Some(handle) = state.tasks.receive.take() {
        handle.abort();
    }
    if let Some(handle) = state.tasks.heartbeat.take() {
        handle.abort();
    }
    state.generation += 1;
    let generation = state.generation;
    state.session = Some(Session {
        sink: Arc::new(Mutex::new(sink)),
        generation,
    });
    state.tasks.receive = Some(tokio::spawn(receive_loop(inner.clone(), source, generation)));
    state.tasks.heartbeat = Some(tokio::spawn(heartbeat_loop(inner.clone(), generation)));
}

/// Demultiplex inbound frames until the carrier dies.
async fn receive_loop(inner: Arc<Inner>, mut source: WsSource, generation: u64) {
    loop {
        match source.next().await {
            Some(Ok(WsMessage::Text(text))) => {
                if let Err(e) = handle_frame(&inner, text.as_str(), generation).await {
                    tracing::warn!(error = %e, "dropping carrier after undecodable frame");
                    disconnect(&inner, generation).await;
                    return;
                }
            }
            Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    if let Err(e) = handle_frame(&inner, text, generation).await {
                        tracing::warn!(error = %e, "dropping carrier after undecodable frame");
                        disconnect(&inner, generation).await;
                        return;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "binary frame is not utf-8");
                    disconnect(&inner, generation).await;
                    return;
                }
            },
            Some(Ok(WsMessage::Ping(_))) | Some(Ok(WsMessage::Pong(_))) => {}
            Some(Ok(WsMessage::Frame(_))) => {}
            Some(Ok(WsMessage::Close(_))) | None => {
                tracing::debug!("carrier closed by peer");
                disconnect(&inner, generation).await;
                return;
            }
            Some(Err(e)) => {
                tracing::debug!(error = %e, "carrier read failed");
                disconnect(&inner, generation).await;
                return;
            }
        }
    }
}

/// Decode one frame and route it. An error here is a poisoned carrier.
async fn handle_frame(inner: &Arc<Inner>, text: &str, generation: u64) -> Result<(), RpcError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| RpcError::Serialization(format!("frame is not JSON: {e}")))?;
    if !value.is_object() {
        return Err(RpcError::Serialization("frame is not a JSON object".to_string()));
    }
    let envelope: Envelope = serde_json::from_value(value)
        .map_err(|e| RpcError::Serialization(format!("malformed envelope: {e}")))?;

    if envelope.is_request() {
        handle_request(inner, envelope, generation).await;
    } else if envelope.is_response() {
        handle_response(inner, envelope).await;
    }
    // Anything else carries neither method nor result/error: drop it.
    Ok(())
}

/// A request (or notification) arriving from the peer.
async fn handle_request(inner: &Arc<Inner>, envelope: Envelope, generation: u64) {
    let id = envelope.id.clone();
    let method = envelope.method.clone().unwrap_or_default();
    let params = envelope.params.clone().unwrap_or_else(empty_object);

    if envelope.jsonrpc.as_deref() != Some(envelope::VERSION) {
        if let Some(id) = id {
            let reply =
                Envelope::error_reply(id, ErrorObject::new(code::INVALID_REQUEST, "invalid request"));
            send_reply(inner, generation, reply).await;
        }
        return;
    }

    if method == envelope::HEARTBEAT_METHOD {
        if let Some(id) = id {
            send_reply(inner, generation, Envelope::result_reply(id, empty_object())).await;
        }
        return;
    }

    // Peer-originated request ids are s-prefixed strings; anything else is
    // answered as an invalid request.
    if let Some(id) = &id {
        let well_formed = matches!(id, Value::String(s) if s.starts_with('s'));
        if !well_formed {
            let reply = Envelope::error_reply(
                id.clone(),
                ErrorObject::new(code::INVALID_REQUEST, "invalid request"),
            );
            send_reply(inner, generation, reply).await;
            return;
        }
    }

    let handler = {
        let state = inner.state.lock().await;
        state.handlers.get(&method).cloned()
    };
    let Some(handler) = handler else {
        if let Some(id) = id {
            let reply = Envelope::error_reply(
                id,
                ErrorObject::new(code::METHOD_NOT_FOUND, format!("method {method} not found")),
            );
            send_reply(inner, generation, reply).await;
        } else {
            tracing::debug!(method = %method, "dropping notification for unknown method");
        }
        return;
    };

    // Dispatch off the receive loop so a slow handler cannot stall frame
    // demultiplexing (or deadlock a handler that itself invokes).
    let inner = inner.clone();
    tokio::spawn(async move {
        let outcome = handler(params).await;
        // Notifications never produce a response, success or failure.
        let Some(id) = id else { return };
        let reply = match outcome {
            Ok(result) => Envelope::result_reply(id, result),
            Err(error) => Envelope::error_reply(id, error.to_error_object()),
        };
        send_reply(&inner, generation, reply).await;
    });
}

/// A response arriving for one of our pending invokes.
async fn handle_response(inner: &Arc<Inner>, envelope: Envelope) {
    let Some(id) = envelope.id else { return };
    let key = match id {
        Value::String(s) => s,
        other => other.to_string(),
    };
    let slot = inner.state.lock().await.pending.remove(&key);
    let Some(slot) = slot else {
        tracing::debug!(id = %key, "dropping response with no pending invoke");
        return;
    };
    let outcome = match envelope.error {
        Some(error) => Err(RpcError::from(error)),
        None => Ok(match envelope.result {
            Some(result @ Value::Object(_)) => result,
            _ => empty_object(),
        }),
    };
    let _ = slot.send(outcome);
}

/// Send a reply over the carrier the request came in on, if it is still
/// the live one.
async fn send_reply(inner: &Arc<Inner>, generation: u64, reply: Envelope) {
    let sink = {
        let state = inner.state.lock().await;
        match state.session.as_ref() {
            Some(session) if session.generation == generation => session.sink.clone(),
            _ => return,
        }
    };
    let text = match serde_json::to_string(&reply) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!(error = %e, "reply failed to serialise");
            return;
        }
    };
    let mut guard = sink.lock().await;
    let result = guard.send(WsMessage::Text(text.into())).await;
    drop(guard);
    if let Err(e) = result {
        tracing::debug!(error = %e, "reply send failed");
    }
}

/// Prove carrier liveness; any failure hands over to reconnection.
async fn heartbeat_loop(inner: Arc<Inner>, generation: u64) {
    let interval = inner.config.heartbeat_interval;
    let deadline = inner.config.heartbeat_timeout;
    let client = RpcClient {
        inner: inner.clone(),
    };
    loop {
        tokio::time::sleep(interval).await;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        match client
            .invoke_with_timeout(envelope::HEARTBEAT_METHOD, empty_object(), deadline)
            .await
        {
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "heartbeat failed");
                disconnect(&inner, generation).await;
                return;
            }
        }
    }
}

/// Tear down the session `generation`: drop the carrier, fail every
/// pending invoke, stop the session tasks, and (unless the client is
/// closed) make sure a reconnect task is running.
async fn disconnect(inner: &Arc<Inner>, generation: u64) {
    let mut state = inner.state.lock().await;
    let session = match state.session.take() {
        Some(session) if session.generation == generation => session,
        other => {
            // A newer carrier (or none) is in place; nothing to do.
            state.session = other;
            return;
        }
    };
    drop(session);

    for (_, slot) in state.pending.drain() {
        let _ = slot.send(Err(RpcError::NotConnected));
    }
    // The caller is one of these tasks; aborting a task that is about to
    // return on its own is a no-op.
    if let Some(handle) = state.tasks.receive.take() {
        handle.abort();
    }
    if let Some(handle) = state.tasks.heartbeat.take() {
        handle.abort();
    }

    if inner.closed.load(Ordering::SeqCst) {
        return;
    }
    let reconnect_running = state
        .tasks
        .reconnect
        .as_ref()
        .is_some_and(|handle| !handle.is_finished());
    if !reconnect_running {
        tracing::debug!("carrier lost; starting reconnect task");
        state.tasks.reconnect = Some(tokio::spawn(reconnect_loop(inner.clone())));
    }
}

/// Re-dial the last URL until it works, the client closes, or the task is
/// cancelled. Backoff state lives here and nowhere else.
async fn reconnect_loop(inner: Arc<Inner>) {
    let policy = inner.config.reconnect.clone();
    let mut attempt: u32 = 0;
    loop {
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }
        let url = { inner.state.lock().await.url.clone() };
        let Some(url) = url else { return };

        match connect_carrier(&url).await {
            Ok((sink, source)) => {
                let mut state = inner.state.lock().await;
                if inner.closed.load(Ordering::SeqCst) {
                    return;
                }
                install_session(&inner, &mut state, sink, source);
                tracing::debug!(url = %url, attempt, "carrier re-established");
                return;
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::debug!(
                    error = %e,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "reconnect attempt failed"
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
