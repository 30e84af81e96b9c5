//! End-to-end tests driving the relay over real TCP: a fake provider agent
//! on a tokio-tungstenite control channel, renters on plain HTTP.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use runbridge_core::RequestId;
use runbridge_gateway::{create_router, GatewayConfig, GatewayState, TunnelTeardown};
use runbridge_lease::{supervisor, LeaseConfig, LeaseService};
use runbridge_store::MemoryStore;
use runbridge_tunnel::{ChannelRegistry, Envelope};

type WsSink = futures::stream::SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Boot a full relay on an ephemeral port.
async fn spawn_relay() -> SocketAddr {
    let store = Arc::new(MemoryStore::new());
    let tunnel = Arc::new(ChannelRegistry::new());
    let lease_config = LeaseConfig::default();
    let sweep_interval = lease_config.sweep_interval();
    let lease = Arc::new(
        LeaseService::new(store, lease_config)
            .with_hooks(Arc::new(TunnelTeardown::new(Arc::clone(&tunnel)))),
    );
    let _supervisor = supervisor::spawn(Arc::clone(&lease), sweep_interval);

    let state = GatewayState::new(lease, tunnel, GatewayConfig::default());
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Register a session as a provider; returns (sessionId, accessToken).
async fn register_session(client: &reqwest::Client, addr: SocketAddr) -> (String, String) {
    let response = client
        .post(format!("http://{addr}/provider/session"))
        .header("authorization", "Bearer provider-user")
        .json(&serde_json::json!({
            "providerId": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "publicUrl": "https://runtime.example",
            "token": "jupytoken",
            "hardware": {"gpu": "rtx4090"},
            "pricing": {"hourly": 2},
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    (
        body["sessionId"].as_str().unwrap().to_string(),
        body["accessToken"].as_str().unwrap().to_string(),
    )
}

async fn reply_http(sink: &mut WsSink, request_id: RequestId, path: &str) {
    let head = Envelope::HttpResponse {
        request_id,
        status: 200,
        headers: std::collections::HashMap::from([(
            "content-type".to_string(),
            "text/plain".to_string(),
        )]),
    };
    let body = Envelope::HttpBody {
        request_id,
        body: format!("provider saw {path}"),
        is_base64: false,
    };
    sink.send(Message::Text(head.encode().unwrap())).await.unwrap();
    sink.send(Message::Text(body.encode().unwrap())).await.unwrap();
}

/// Connect a fake provider agent that answers every proxied call.
async fn connect_fake_provider(addr: SocketAddr, session_id: &str) -> tokio::task::JoinHandle<()> {
    let (ws, _) = connect_async(format!("ws://{addr}/ws/provider/{session_id}"))
        .await
        .unwrap();

    let handle = tokio::spawn(async move {
        let (mut sink, mut stream) = ws.split();
        let mut pending: Option<(RequestId, String)> = None;
        while let Some(Ok(message)) = stream.next().await {
            match message {
                Message::Text(text) => match Envelope::decode(&text) {
                    Ok(Envelope::HttpRequest {
                        request_id, path, ..
                    }) => pending = Some((request_id, path)),
                    Ok(Envelope::HttpBodyEmpty { .. }) => {
                        if let Some((request_id, path)) = pending.take() {
                            reply_http(&mut sink, request_id, &path).await;
                        }
                    }
                    Ok(Envelope::StreamOpen { stream_id, path }) => {
                        // Greet the renter, then mirror nothing else.
                        let greeting = Envelope::StreamData {
                            stream_id,
                            payload: format!("stream open at {path}"),
                        };
                        sink.send(Message::Text(greeting.encode().unwrap()))
                            .await
                            .unwrap();
                    }
                    _ => {}
                },
                Message::Binary(_) => {
                    if let Some((request_id, path)) = pending.take() {
                        reply_http(&mut sink, request_id, &path).await;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Give the server a beat to finish the upgrade and register the channel.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    handle
}

#[tokio::test]
async fn full_lease_and_tunnel_lifecycle() {
    let addr = spawn_relay().await;
    let http = client();

    // Register; the session is READY and listed.
    let (session_id, access_token) = register_session(&http, addr).await;
    let listing: serde_json::Value = http
        .get(format!("http://{addr}/renter/sessions"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listing.as_array().unwrap().len(), 1);
    assert_eq!(listing[0]["status"], "READY");

    let _provider = connect_fake_provider(addr, &session_id).await;

    // U1 takes the lease and gets redirected into the runtime.
    let response = http
        .get(format!("http://{addr}/access/{access_token}"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);
    let location = response.headers()["location"].to_str().unwrap();
    assert_eq!(location, "https://runtime.example/lab?token=jupytoken");

    // U2 conflicts.
    let response = http
        .get(format!("http://{addr}/access/{access_token}"))
        .header("authorization", "Bearer renter-2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // U1 proxies an HTTP call through the tunnel.
    let response = http
        .get(format!("http://{addr}/session/{session_id}/proxy/api/status"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "provider saw /api/status");

    // U2 cannot use the tunnel at all.
    let response = http
        .get(format!("http://{addr}/session/{session_id}/proxy/api/status"))
        .header("authorization", "Bearer renter-2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);

    // Heartbeats: owner passes, stranger is rejected with state untouched.
    let response = http
        .post(format!("http://{addr}/renter/heartbeat/{access_token}"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let response = http
        .post(format!("http://{addr}/renter/heartbeat/{access_token}"))
        .header("authorization", "Bearer renter-2")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // Release → CLEANING with needsCleanup, visible on the status probe.
    let response = http
        .post(format!("http://{addr}/renter/release/{access_token}"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let status: serde_json::Value = http
        .get(format!("http://{addr}/provider/session/{session_id}"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(status["status"], "CLEANING");
    assert_eq!(status["needsCleanup"], true);

    // Provider acks → TERMINATED; the old token fails closed.
    let response = http
        .post(format!(
            "http://{addr}/provider/session/{session_id}/cleanup_ack"
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let response = http
        .get(format!("http://{addr}/access/{access_token}"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    // And the provider heartbeat now demands a re-register.
    let response = http
        .post(format!("http://{addr}/provider/heartbeat"))
        .json(&serde_json::json!({"sessionId": session_id}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn registration_validation() {
    let addr = spawn_relay().await;
    let http = client();

    // No principal at all.
    let response = http
        .post(format!("http://{addr}/provider/session"))
        .json(&serde_json::json!({
            "providerId": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "publicUrl": "https://runtime.example",
            "token": "jupytoken",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 401);

    // Missing publicUrl.
    let response = http
        .post(format!("http://{addr}/provider/session"))
        .header("authorization", "Bearer provider-user")
        .json(&serde_json::json!({
            "providerId": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "token": "jupytoken",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Non-https publicUrl.
    let response = http
        .post(format!("http://{addr}/provider/session"))
        .header("authorization", "Bearer provider-user")
        .json(&serde_json::json!({
            "providerId": "6ba7b810-9dad-11d1-80b4-00c04fd430c8",
            "publicUrl": "http://runtime.example",
            "token": "jupytoken",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn proxy_without_control_channel_is_unavailable() {
    let addr = spawn_relay().await;
    let http = client();
    let (session_id, access_token) = register_session(&http, addr).await;

    // Lease it without ever connecting a provider channel.
    let response = http
        .get(format!("http://{addr}/access/{access_token}"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);

    let response = http
        .get(format!("http://{addr}/session/{session_id}/proxy/api/status"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
}

#[tokio::test]
async fn unknown_access_token_rejected() {
    let addr = spawn_relay().await;
    let http = client();

    let response = http
        .get(format!("http://{addr}/access/does-not-exist"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn listing_hides_other_renters_leases() {
    let addr = spawn_relay().await;
    let http = client();

    let (_session_id, access_token) = register_session(&http, addr).await;
    let response = http
        .get(format!("http://{addr}/access/{access_token}"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 302);

    // The owner still sees their LOCKED lease.
    let mine: serde_json::Value = http
        .get(format!("http://{addr}/renter/sessions"))
        .header("authorization", "Bearer renter-1")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(mine.as_array().unwrap().len(), 1);
    assert_eq!(mine[0]["status"], "LOCKED");

    // Everyone else sees nothing.
    let theirs: serde_json::Value = http
        .get(format!("http://{addr}/renter/sessions"))
        .header("authorization", "Bearer renter-2")
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(theirs.as_array().unwrap().len(), 0);
}
