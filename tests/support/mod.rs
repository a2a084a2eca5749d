// Shared primitives for one-time server bootstrapping across integration tests.
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};

// Global base URL used by all tests after the server publishes its bound address.
static SERVER_URL: OnceLock<String> = OnceLock::new();
// One-time guard that ensures the server bootstrap path runs only once.
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Ensure the test server is running and return the shared base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        // Local one-time slot where the server thread publishes its selected URL.
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // Spawn an OS thread so the server outlives individual `#[tokio::test]` runtimes.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                // Bind to an ephemeral port to avoid collisions with local services.
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                // Publish the final base URL so test code can target the right server.
                let _ = published_url_thread.set(format!("http://{}", addr));
                session_server::run(listener).await.expect("server failed");
            });
        });
        // Block until URL is published and the bound port starts accepting connections.
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

// WebSocket base URL derived from the published HTTP address.
pub fn ws_base() -> String {
    ensure_server().replacen("http://", "ws://", 1)
}

pub type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

// Unique usernames keep tests sharing one server from cross-matching.
pub fn unique_name(prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
}

// Open a client socket against the shared test server.
pub async fn connect(path: &str) -> WsClient {
    let (ws, _response) = tokio_tungstenite::connect_async(format!("{}{}", ws_base(), path))
        .await
        .expect("ws connect");
    ws
}

pub async fn send_json(ws: &mut WsClient, value: &serde_json::Value) {
    use futures_util::SinkExt;
    ws.send(tokio_tungstenite::tungstenite::Message::Text(
        value.to_string(),
    ))
    .await
    .expect("ws send");
}

// Read frames until a JSON message with the wanted type/status tag arrives.
pub async fn recv_json_with_type(
    ws: &mut WsClient,
    wanted: &str,
    wait: Duration,
) -> serde_json::Value {
    use futures_util::StreamExt;
    tokio::time::timeout(wait, async {
        while let Some(frame) = ws.next().await {
            let frame = frame.expect("ws recv");
            if let tokio_tungstenite::tungstenite::Message::Text(text) = frame {
                let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
                let tag = value
                    .get("type")
                    .or_else(|| value.get("status"))
                    .and_then(|tag| tag.as_str());
                if tag == Some(wanted) {
                    return value;
                }
            }
        }
        panic!("socket closed while waiting for {wanted}");
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {wanted}"))
}

// Wait for URL publication and then wait for the server socket to accept TCP connections.
fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    // Retry for a short period to avoid racing server bind/accept.
    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}
