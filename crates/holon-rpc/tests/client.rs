//! Client behavior against an in-process peer implementing the holon-rpc
//! contract: echo, server-initiated calls, heartbeat counting, and carrier
//! drops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

use holon_rpc::envelope::{code, empty_object};
use holon_rpc::{ClientConfig, Envelope, ErrorObject, ReconnectPolicy, RpcClient, RpcError};

type ServerSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;

#[derive(Default)]
struct ServerState {
    heartbeats: AtomicU64,
    unexpected: AtomicU64,
    next_server_id: AtomicU64,
    seen_client_ids: Mutex<Vec<String>>,
}

async fn send(sink: &mut ServerSink, envelope: Envelope) {
    let text = serde_json::to_string(&envelope).expect("server envelope serialises");
    let _ = sink.send(WsMessage::Text(text.into())).await;
}

async fn serve_peer(ws: WebSocketStream<TcpStream>, state: Arc<ServerState>) {
    let (mut sink, mut stream) = ws.split();
    // Server-initiated call id -> the client invoke awaiting its outcome.
    let mut forwards: HashMap<String, Value> = HashMap::new();

    while let Some(frame) = stream.next().await {
        let Ok(msg) = frame else { return };
        let text = match msg {
            WsMessage::Text(text) => text.to_string(),
            WsMessage::Close(_) => return,
            _ => continue,
        };
        let Ok(envelope) = serde_json::from_str::<Envelope>(&text) else {
            continue;
        };

        let Some(method) = envelope.method.clone() else {
            // A response from the client to one of our calls.
            let key = envelope
                .id
                .clone()
                .and_then(|id| id.as_str().map(String::from))
                .unwrap_or_default();
            match forwards.remove(&key) {
                Some(client_id) => {
                    let reply = match envelope.error {
                        Some(error) => {
                            Envelope::result_reply(client_id, json!({"code": error.code}))
                        }
                        None => Envelope::result_reply(
                            client_id,
                            envelope.result.unwrap_or_else(empty_object),
                        ),
                    };
                    send(&mut sink, reply).await;
                }
                None => {
                    state.unexpected.fetch_add(1, Ordering::SeqCst);
                }
            }
            continue;
        };

        let id = envelope.id.clone();
        if let Some(Value::String(client_id)) = &id {
            if client_id.starts_with('c') {
                state.seen_client_ids.lock().await.push(client_id.clone());
            }
        }

        match method.as_str() {
            "rpc.heartbeat" => {
                state.heartbeats.fetch_add(1, Ordering::SeqCst);
                if let Some(id) = id {
                    send(&mut sink, Envelope::result_reply(id, empty_object())).await;
                }
            }
            "echo.v1.Echo/Ping" => {
                if let Some(id) = id {
                    let result = envelope.params.clone().unwrap_or_else(empty_object);
                    send(&mut sink, Envelope::result_reply(id, result)).await;
                }
            }
            "echo.v1.Echo/HeartbeatCount" => {
                if let Some(id) = id {
                    let count = state.heartbeats.load(Ordering::SeqCst);
                    send(&mut sink, Envelope::result_reply(id, json!({"count": count}))).await;
                }
            }
            "echo.v1.Echo/CallClient" => {
                let Some(client_id) = id else { continue };
                let sid = format!("s{}", state.next_server_id.fetch_add(1, Ordering::SeqCst) + 1);
                forwards.insert(sid.clone(), client_id);
                send(
                    &mut sink,
                    Envelope::request(&sid, "client.v1.Client/Hello", empty_object()),
                )
                .await;
            }
            "echo.v1.Echo/CallClientBadId" => {
                // Violates the convention that server ids start with `s`.
                let Some(client_id) = id else { continue };
                forwards.insert("x7".to_string(), client_id);
                send(
                    &mut sink,
                    Envelope::request("x7", "client.v1.Client/Hello", empty_object()),
                )
                .await;
            }
            "echo.v1.Echo/NotifyKnown" => {
                send(
                    &mut sink,
                    Envelope::notification("client.v1.Client/Hello", empty_object()),
                )
                .await;
                if let Some(id) = id {
                    send(&mut sink, Envelope::result_reply(id, empty_object())).await;
                }
            }
            "test.v1.Control/UnexpectedCount" => {
                if let Some(id) = id {
                    let count = state.unexpected.load(Ordering::SeqCst);
                    send(&mut sink, Envelope::result_reply(id, json!({"count": count}))).await;
                }
            }
            "test.v1.Control/Drop" => {
                // Simulate a carrier failure: vanish without replying.
                return;
            }
            "test.v1.Control/Never" => {
                // Swallow the request so the invoke stays pending.
            }
            other => {
                if let Some(id) = id {
                    send(
                        &mut sink,
                        Envelope::error_reply(
                            id,
                            ErrorObject::new(
                                code::METHOD_NOT_FOUND,
                                format!("method {other} not found"),
                            ),
                        ),
                    )
                    .await;
                }
            }
        }
    }
}

/// Start a holon-rpc peer on a free port; keeps accepting so clients can
/// reconnect.
async fn spawn_server() -> (String, Arc<ServerState>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("server bind");
    let addr = listener.local_addr().expect("server addr");
    let state = Arc::new(ServerState::default());

    let accept_state = state.clone();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let state = accept_state.clone();
            tokio::spawn(async move {
                let callback = |_req: &Request, mut response: Response| {
                    response.headers_mut().append(
                        SEC_WEBSOCKET_PROTOCOL,
                        HeaderValue::from_static("holon-rpc"),
                    );
                    Ok::<Response, ErrorResponse>(response)
                };
                let Ok(ws) = accept_hdr_async(stream, callback).await else {
                    return;
                };
                serve_peer(ws, state).await;
            });
        }
    });

    (format!("ws://{addr}/grpc"), state)
}

/// A server that accepts the WebSocket but never selects a subprotocol.
async fn spawn_non_negotiating_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("server bind");
    let addr = listener.local_addr().expect("server addr");
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                // Hold the connection open; the client should bail out on
                // its own.
                let (_sink, mut stream) = ws.split();
                while let Some(Ok(_)) = stream.next().await {}
            });
        }
    });
    format!("ws://{addr}/grpc")
}

fn quick_config() -> ClientConfig {
    ClientConfig {
        heartbeat_interval: Duration::from_millis(200),
        heartbeat_timeout: Duration::from_millis(200),
        reconnect: ReconnectPolicy {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            factor: 2.0,
            jitter: 0.1,
        },
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client.connect(&url).await.expect("connect");

    let result = client
        .invoke("echo.v1.Echo/Ping", json!({"message": "hello"}))
        .await
        .expect("ping");
    assert_eq!(result, json!({"message": "hello"}));

    client.close().await;
}

#[tokio::test]
async fn request_ids_increase_within_a_session() {
    let (url, state) = spawn_server().await;
    let client = RpcClient::default();
    client.connect(&url).await.expect("connect");

    for _ in 0..3 {
        client
            .invoke("echo.v1.Echo/Ping", empty_object())
            .await
            .expect("ping");
    }
    client.close().await;

    let ids = state.seen_client_ids.lock().await.clone();
    assert!(ids.len() >= 3, "server saw the pings");
    let numbers: Vec<u64> = ids
        .iter()
        .map(|id| id[1..].parse().expect("c-prefixed numeric id"))
        .collect();
    for pair in numbers.windows(2) {
        assert!(pair[0] < pair[1], "ids must be strictly increasing: {ids:?}");
    }
}

#[tokio::test]
async fn server_calls_back_through_a_registered_handler() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client
        .register("client.v1.Client/Hello", |_params| {
            Box::pin(async { Ok(json!({"message": "hello go"})) })
        })
        .await;
    client.connect(&url).await.expect("connect");

    let result = client
        .invoke("echo.v1.Echo/CallClient", empty_object())
        .await
        .expect("call-client round trip");
    assert_eq!(result, json!({"message": "hello go"}));

    client.close().await;
}

#[tokio::test]
async fn handler_errors_travel_back_as_error_objects() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client
        .register("client.v1.Client/Hello", |_params| {
            Box::pin(async {
                Err(RpcError::Response {
                    code: -32050,
                    message: "refused".to_string(),
                    data: None,
                })
            })
        })
        .await;
    client.connect(&url).await.expect("connect");

    // The server folds the client's error reply into {"code": N}.
    let result = client
        .invoke("echo.v1.Echo/CallClient", empty_object())
        .await
        .expect("call-client round trip");
    assert_eq!(result, json!({"code": -32050}));

    client.close().await;
}

#[tokio::test]
async fn server_request_with_a_foreign_id_is_rejected() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client
        .register("client.v1.Client/Hello", |_params| {
            Box::pin(async { Ok(empty_object()) })
        })
        .await;
    client.connect(&url).await.expect("connect");

    let result = client
        .invoke("echo.v1.Echo/CallClientBadId", empty_object())
        .await
        .expect("bad-id round trip");
    assert_eq!(result, json!({"code": code::INVALID_REQUEST}));

    client.close().await;
}

#[tokio::test]
async fn notifications_never_get_replies() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client
        .register("client.v1.Client/Hello", |_params| {
            Box::pin(async { Ok(json!({"message": "hello go"})) })
        })
        .await;
    client.connect(&url).await.expect("connect");

    client
        .invoke("echo.v1.Echo/NotifyKnown", empty_object())
        .await
        .expect("notify round trip");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let result = client
        .invoke("test.v1.Control/UnexpectedCount", empty_object())
        .await
        .expect("unexpected count");
    assert_eq!(result, json!({"count": 0}), "a notification elicited a reply");

    client.close().await;
}

#[tokio::test]
async fn unknown_methods_come_back_as_method_not_found() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client.connect(&url).await.expect("connect");

    let err = client
        .invoke("no.such.Service/Method", empty_object())
        .await
        .expect_err("unknown method must fail");
    match err {
        RpcError::Response { code: c, .. } => assert_eq!(c, code::METHOD_NOT_FOUND),
        other => panic!("expected Response error, got {other:?}"),
    }

    client.close().await;
}

#[tokio::test]
async fn invoke_requires_a_connection_and_a_method() {
    let client = RpcClient::default();

    assert!(matches!(
        client.invoke("echo.v1.Echo/Ping", empty_object()).await,
        Err(RpcError::NotConnected)
    ));

    let (url, _state) = spawn_server().await;
    client.connect(&url).await.expect("connect");
    match client.invoke("", empty_object()).await {
        Err(RpcError::Protocol(msg)) => assert_eq!(msg, "method is required"),
        other => panic!("expected Protocol error, got {other:?}"),
    }

    client.close().await;
}

#[tokio::test]
async fn missing_subprotocol_fails_the_connect() {
    let url = spawn_non_negotiating_server().await;
    let client = RpcClient::default();
    match client.connect(&url).await {
        Err(RpcError::Protocol(msg)) => {
            assert!(msg.contains("holon-rpc"), "reason names the subprotocol: {msg}");
        }
        other => panic!("expected Protocol error, got {other:?}"),
    }
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn bad_urls_fail_the_connect() {
    let client = RpcClient::default();
    assert!(matches!(
        client.connect("not a url").await,
        Err(RpcError::InvalidUrl(_))
    ));
}

#[tokio::test]
async fn wss_urls_reach_the_tls_dialer() {
    // Nothing listens on port 1, so the dial fails at the socket, which
    // surfaces as a connect failure. A client built without TLS support
    // would instead reject the URL itself before dialing.
    let client = RpcClient::default();
    match client.connect("wss://127.0.0.1:1/grpc").await {
        Err(RpcError::Protocol(msg)) => {
            assert!(msg.contains("connect failed"), "unexpected reason: {msg}");
        }
        other => panic!("expected a connect failure, got {other:?}"),
    }
}

#[tokio::test]
async fn close_completes_inflight_invokes() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client.connect(&url).await.expect("connect");

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.invoke("test.v1.Control/Never", empty_object()).await })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    client.close().await;
    client.close().await; // idempotent

    let outcome = pending.await.expect("invoke task");
    assert!(matches!(outcome, Err(RpcError::NotConnected)));

    // close() is terminal.
    assert!(matches!(
        client.invoke("echo.v1.Echo/Ping", empty_object()).await,
        Err(RpcError::NotConnected)
    ));
    assert!(matches!(client.connect(&url).await, Err(RpcError::NotConnected)));
}

#[tokio::test]
async fn invoke_with_timeout_gives_up() {
    let (url, _state) = spawn_server().await;
    let client = RpcClient::default();
    client.connect(&url).await.expect("connect");

    let err = client
        .invoke_with_timeout(
            "test.v1.Control/Never",
            empty_object(),
            Duration::from_millis(150),
        )
        .await
        .expect_err("swallowed request must time out");
    assert!(matches!(err, RpcError::Timeout));

    client.close().await;
}

#[tokio::test]
async fn dropped_carrier_reconnects_and_heartbeats_flow() {
    let (url, state) = spawn_server().await;
    let client = RpcClient::new(quick_config());
    client.connect(&url).await.expect("connect");

    let first = client
        .invoke("echo.v1.Echo/Ping", json!({"message": "first"}))
        .await
        .expect("first ping");
    assert_eq!(first, json!({"message": "first"}));

    // The server drops the carrier without replying.
    let _ = client
        .invoke_with_timeout("test.v1.Control/Drop", empty_object(), Duration::from_secs(1))
        .await;

    tokio::time::sleep(Duration::from_millis(700)).await;

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match client
            .invoke_with_timeout(
                "echo.v1.Echo/Ping",
                json!({"message": "again"}),
                Duration::from_millis(500),
            )
            .await
        {
            Ok(result) => {
                assert_eq!(result, json!({"message": "again"}));
                break;
            }
            Err(_) if Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => panic!("client never recovered: {e}"),
        }
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let result = client
            .invoke_with_timeout(
                "echo.v1.Echo/HeartbeatCount",
                empty_object(),
                Duration::from_millis(500),
            )
            .await;
        if let Ok(value) = result {
            let count = value["count"].as_u64().unwrap_or(0);
            if count >= 1 {
                break;
            }
        }
        if Instant::now() >= deadline {
            panic!("no heartbeat was ever answered: {:?}", state.heartbeats);
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    client.close().await;
}
