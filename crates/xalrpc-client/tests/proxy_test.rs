// Proxy tests against hand-driven servers
//
// Each server here speaks the framing protocol directly, so the tests can
// observe exactly what a proxy sends and control what it receives.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use xalrpc_client::{PoolConfig, ProxyConfig, RemoteProxy, ServiceState};
use xalrpc_common::protocol::{Interface, MethodSpec, ParamKind, RemoteException, Request, Response};
use xalrpc_common::transport::FrameTransport;
use xalrpc_common::{JsonCoder, RpcError, Value};

// ============================================================================
// Test Helpers
// ============================================================================

const CALC: Interface = Interface::new(
    "calc",
    &[
        MethodSpec::new("add", &[ParamKind::Int, ParamKind::Int]),
        MethodSpec::one_way("log", &[ParamKind::String]),
    ],
);

enum Reply {
    Send(Response),
    Raw(String),
    Silent,
    Hangup,
}

/// Starts a server that records every request and answers through `reply`.
async fn spawn_server<F>(reply: F) -> (u16, mpsc::UnboundedReceiver<Request>)
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = Arc::new(reply);
    let coder = Arc::new(JsonCoder::standard());

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let tx = tx.clone();
            let reply = reply.clone();
            let coder = coder.clone();
            tokio::spawn(async move {
                let mut transport = FrameTransport::accept(stream).await.unwrap();
                while let Ok(text) = transport.receive_text().await {
                    let request = Request::from_value(&coder.decode(&text).unwrap()).unwrap();
                    let answer = reply(&request);
                    let _ = tx.send(request);
                    match answer {
                        Reply::Send(response) => {
                            let text = coder.encode(&response.to_value()).unwrap();
                            transport.send_text(&text).await.unwrap();
                        }
                        Reply::Raw(text) => transport.send_text(&text).await.unwrap(),
                        Reply::Silent => {}
                        Reply::Hangup => return,
                    }
                }
            });
        }
    });

    (port, rx)
}

fn proxy(port: u16) -> RemoteProxy {
    RemoteProxy::new("127.0.0.1", port, "calc", CALC, Arc::new(JsonCoder::standard()))
}

fn sum(request: &Request) -> Reply {
    let total: i64 = request.params.iter().filter_map(Value::as_i64).sum();
    Reply::Send(Response::success(request.id, Value::from(total)))
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Two-way calls
// ============================================================================

#[tokio::test]
async fn test_two_way_call_returns_result() {
    let (port, mut requests) = spawn_server(sum).await;
    let calc = proxy(port);

    let result: i64 = calc.call("add", vec![Value::from(3), Value::from(4)]).await.unwrap();
    assert_eq!(result, 7);

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.message, "calc#add");
    assert_eq!(seen.params, vec![Value::from(3), Value::from(4)]);
}

#[tokio::test]
async fn test_request_ids_increase_and_connection_is_reused() {
    let (port, mut requests) = spawn_server(sum).await;
    let calc = proxy(port);

    calc.invoke("add", vec![Value::from(1), Value::from(1)]).await.unwrap();
    calc.invoke("add", vec![Value::from(2), Value::from(2)]).await.unwrap();

    let first = requests.recv().await.unwrap();
    let second = requests.recv().await.unwrap();
    assert!(second.id > first.id);
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 1);
}

#[tokio::test]
async fn test_remote_exception_is_raised() {
    let (port, _requests) = spawn_server(|request| {
        Reply::Send(Response::exception(request.id, RemoteException::new("division by zero")))
    })
    .await;

    match proxy(port).invoke("add", vec![Value::from(1), Value::from(0)]).await {
        Err(RpcError::RemoteInvocation(remote)) => assert_eq!(remote.message, "division by zero"),
        other => panic!("expected remote invocation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dropped_signal_from_server_is_service_dropped() {
    let (port, _requests) =
        spawn_server(|request| Reply::Send(Response::service_dropped(request.id, "downstream gone"))).await;

    let err = proxy(port).invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap_err();
    assert!(err.is_service_dropped());
}

#[tokio::test]
async fn test_mismatched_response_id_is_rejected() {
    let (port, _requests) =
        spawn_server(|request| Reply::Send(Response::success(request.id + 100, Value::Null))).await;
    let calc = proxy(port);

    let err = calc.invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap_err();
    assert!(matches!(err, RpcError::InvalidResponse(_)));
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 0);
}

#[tokio::test]
async fn test_undecodable_response_fails_call() {
    let (port, _requests) = spawn_server(|_| Reply::Raw("{not json".to_string())).await;

    let err = proxy(port).invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap_err();
    assert!(matches!(err, RpcError::Coding(_)));
}

// ============================================================================
// One-way calls
// ============================================================================

#[tokio::test]
async fn test_one_way_call_never_reads() {
    // The server never answers; a read would block forever
    let (port, mut requests) = spawn_server(|_| Reply::Silent).await;
    let calc = proxy(port);

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        calc.invoke("log", vec![Value::from("hello")]),
    )
    .await
    .expect("one-way call blocked");
    assert_eq!(result.unwrap(), Value::Null);

    let seen = requests.recv().await.unwrap();
    assert_eq!(seen.message, "calc#log");
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 1);
}

#[tokio::test]
async fn test_notify_sends_any_method_one_way() {
    let (port, mut requests) = spawn_server(|_| Reply::Silent).await;
    let calc = RemoteProxy::new("127.0.0.1", port, "calc", Interface::open("calc"), Arc::new(JsonCoder::standard()));

    tokio::time::timeout(Duration::from_secs(5), calc.notify("add", vec![Value::from(1), Value::from(2)]))
        .await
        .expect("notify blocked")
        .unwrap();
    assert_eq!(requests.recv().await.unwrap().message, "calc#add");
}

#[tokio::test]
async fn test_connection_closed_after_one_way_is_not_reused() {
    // The server rejects the one-way call by hanging up, as it does on a
    // dispatch failure
    let (port, mut requests) = spawn_server(|request| {
        if request.message == "calc#log" {
            Reply::Hangup
        } else {
            sum(request)
        }
    })
    .await;
    let calc = proxy(port);

    calc.invoke("log", vec![Value::from("rejected")]).await.unwrap();
    assert_eq!(requests.recv().await.unwrap().message, "calc#log");
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 1);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let result: i64 = calc.call("add", vec![Value::from(1), Value::from(2)]).await.unwrap();
    assert_eq!(result, 3);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_unreachable_service_is_dropped() {
    let port = closed_port().await;
    let err = proxy(port).invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap_err();
    assert!(err.is_service_dropped());
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_server_hangup_mid_call_is_dropped() {
    let (port, _requests) = spawn_server(|_| Reply::Hangup).await;
    let calc = proxy(port);

    let err = calc.invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap_err();
    assert!(err.is_service_dropped());
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 0);
}

#[tokio::test]
async fn test_read_timeout() {
    let (port, _requests) = spawn_server(|_| Reply::Silent).await;
    let config = ProxyConfig {
        pool: PoolConfig::default(),
        read_timeout_ms: Some(100),
    };
    let calc = RemoteProxy::with_config("127.0.0.1", port, "calc", CALC, Arc::new(JsonCoder::standard()), config);

    let err = calc.invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap_err();
    assert!(matches!(err, RpcError::Timeout(100)));
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 0);
}

// ============================================================================
// Introspection
// ============================================================================

#[tokio::test]
async fn test_service_state_answered_locally() {
    // Nothing listens on this port, so any network traffic would fail
    let port = closed_port().await;
    let calc = proxy(port);

    assert_eq!(calc.service_name(), "calc");
    assert_eq!(calc.service_host(), "127.0.0.1");
    assert_eq!(calc.service_port(), port);

    assert_eq!(calc.invoke("service_name", vec![]).await.unwrap(), Value::from("calc"));
    assert_eq!(calc.invoke("service_port", vec![]).await.unwrap(), Value::from(port));
    assert_eq!(calc.invoke("dispose_service_resources", vec![]).await.unwrap(), Value::Null);
}

#[tokio::test]
async fn test_dispose_closes_pooled_connections() {
    let (port, _requests) = spawn_server(sum).await;
    let calc = proxy(port);

    calc.invoke("add", vec![Value::from(1), Value::from(2)]).await.unwrap();
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 1);

    calc.dispose_service_resources();
    assert_eq!(calc.pool().idle_count("127.0.0.1", port), 0);

    // A disposed proxy reconnects on the next call
    let result: i64 = calc.call("add", vec![Value::from(2), Value::from(2)]).await.unwrap();
    assert_eq!(result, 4);
}
