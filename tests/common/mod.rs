//! In-process mock Axis device for integration tests.
//!
//! Binds an axum router to `127.0.0.1:0`, issues real digest challenges and
//! verifies the `Authorization` header by recomputing the RFC 2617 response
//! independently of the crate under test.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{ AtomicUsize, Ordering };
use std::sync::{ Arc, Mutex };
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{ header, HeaderMap, Method, StatusCode, Uri };
use axum::response::{ AppendHeaders, IntoResponse, Response };
use axum::Router;
use tokio::net::TcpListener;

use axis_vapix::{ Device, Protocol };

pub const USER: &str = "root";
pub const PASSWORD: &str = "pass";
pub const REALM: &str = "AXIS_ACCC8E123456";
pub const NONCE: &str = "0024e47aY398eb9e5b31be80b4f0a0d2b7a0a7b44c4c7d";
pub const BASIC_CHALLENGE: &str = r#"Basic realm="AXIS_ACCC8E123456""#;
pub const CHALLENGE: &str =
    r#"Digest realm="AXIS_ACCC8E123456", nonce="0024e47aY398eb9e5b31be80b4f0a0d2b7a0a7b44c4c7d", algorithm=MD5, qop="auth""#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Serve every request without a challenge
    Open,
    /// Challenge unauthenticated requests, serve correctly authenticated ones
    Digest,
    /// As `Digest`, with a Basic challenge on its own header line ahead of it
    BasicAndDigest,
    /// Challenge every request, even authenticated ones
    Reject,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: String,
    pub delay: Duration,
    /// Non-canonical reason phrase for the status line
    pub reason: Option<&'static str>,
}

impl Reply {
    pub fn text(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "text/plain",
            body: body.to_string(),
            delay: Duration::ZERO,
            reason: None,
        }
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/json",
            body: body.to_string(),
            delay: Duration::ZERO,
            reason: None,
        }
    }

    pub fn xml(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: "application/soap+xml",
            body: body.to_string(),
            delay: Duration::ZERO,
            reason: None,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    pub fn with_reason(mut self, reason: &'static str) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// One request as the device saw it
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Recorded {
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

struct DeviceState {
    auth: AuthMode,
    routes: HashMap<String, Reply>,
    hits: AtomicUsize,
    requests: Mutex<Vec<Recorded>>,
}

pub struct MockDevice {
    pub addr: SocketAddr,
    state: Arc<DeviceState>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockDevice {
    pub async fn start(auth: AuthMode, routes: Vec<(&str, Reply)>) -> Self {
        let state = Arc::new(DeviceState {
            auth,
            routes: routes
                .into_iter()
                .map(|(path, reply)| (path.to_string(), reply))
                .collect(),
            hits: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = Router::new().fallback(handle).with_state(state.clone());

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self { addr, state, shutdown_tx: Some(shutdown_tx) }
    }

    pub fn device(&self) -> Device {
        Device::new(self.addr.to_string(), USER, PASSWORD, Protocol::Http)
    }

    /// Round trips served so far
    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    /// Requests that reached `path`
    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

async fn handle(
    State(state): State<Arc<DeviceState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    let header_text = |name: header::HeaderName| {
        headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string)
    };
    let authorization = header_text(header::AUTHORIZATION);
    state.requests.lock().unwrap().push(Recorded {
        method: method.to_string(),
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        authorization: authorization.clone(),
        content_type: header_text(header::CONTENT_TYPE),
        body: body.to_vec(),
    });

    let authorized = match state.auth {
        AuthMode::Open => true,
        AuthMode::Reject => false,
        AuthMode::Digest | AuthMode::BasicAndDigest =>
            authorization.as_deref().is_some_and(|value| verify_digest(value, method.as_str(), uri.path())),
    };
    if !authorized && state.auth == AuthMode::BasicAndDigest {
        return (
            StatusCode::UNAUTHORIZED,
            AppendHeaders([
                (header::WWW_AUTHENTICATE, BASIC_CHALLENGE),
                (header::WWW_AUTHENTICATE, CHALLENGE),
            ]),
            "401 Unauthorized",
        ).into_response();
    }
    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, CHALLENGE)],
            "401 Unauthorized",
        ).into_response();
    }

    let Some(reply) = state.routes.get(uri.path()).cloned() else {
        return (StatusCode::NOT_FOUND, "404 Not Found").into_response();
    };
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let mut response = (reply.status, [(header::CONTENT_TYPE, reply.content_type)], reply.body).into_response();
    if let Some(reason) = reply.reason {
        response.extensions_mut().insert(hyper::ext::ReasonPhrase::from_static(reason.as_bytes()));
    }
    response
}

/// Recompute the qop=auth MD5 response from the credential parameters
pub fn verify_digest(authorization: &str, method: &str, path: &str) -> bool {
    let Ok(credentials) = http_auth::parse_challenges(authorization) else {
        return false;
    };
    let Some(digest) = credentials.into_iter().find(|c| c.scheme.eq_ignore_ascii_case("Digest")) else {
        return false;
    };
    let params: HashMap<String, String> = digest.params
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.to_unescaped()))
        .collect();
    let field = |name: &str| params.get(name).map(String::as_str).unwrap_or_default();

    if field("username") != USER || field("realm") != REALM || field("nonce") != NONCE {
        return false;
    }
    if field("uri") != path || field("qop") != "auth" || field("nc") != "00000001" {
        return false;
    }

    let ha1 = format!("{:x}", md5::compute(format!("{}:{}:{}", USER, REALM, PASSWORD)));
    let ha2 = format!("{:x}", md5::compute(format!("{}:{}", method, path)));
    let expected = format!(
        "{:x}",
        md5::compute(
            format!("{}:{}:{}:{}:auth:{}", ha1, NONCE, field("nc"), field("cnonce"), ha2)
        )
    );
    field("response") == expected
}

/// Answer one connection with `raw` bytes as the whole response, then close it
pub async fn serve_raw_once(raw: &'static str) -> SocketAddr {
    use tokio::io::{ AsyncReadExt, AsyncWriteExt };

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        socket.write_all(raw.as_bytes()).await.ok();
        socket.shutdown().await.ok();
    });
    addr
}

/// An address on which nothing listens
pub fn closed_port_address() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}
