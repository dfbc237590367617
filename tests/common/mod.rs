#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use floodguard_client::{ClientConfig, FloodGuard, MemoryCredentialStore, Navigator};
use parking_lot::Mutex;
use serde_json::{Value, json};
use url::Url;

/// Requests seen by a stub backend: path, `Authorization` header and raw
/// query string.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<Seen>>>);

#[derive(Clone)]
struct Seen {
    path: String,
    auth: Option<String>,
    query: Option<String>,
}

impl Recorder {
    pub fn record(&self, path: &str, headers: &HeaderMap) {
        self.record_query(path, headers, None);
    }

    pub fn record_query(&self, path: &str, headers: &HeaderMap, query: Option<String>) {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        self.0.lock().push(Seen {
            path: path.to_owned(),
            auth,
            query,
        });
    }

    pub fn paths(&self) -> Vec<String> {
        self.0.lock().iter().map(|s| s.path.clone()).collect()
    }

    fn last(&self, path: &str) -> Option<Seen> {
        self.0.lock().iter().rev().find(|s| s.path == path).cloned()
    }

    pub fn authorization(&self, path: &str) -> Option<String> {
        self.last(path).and_then(|s| s.auth)
    }

    /// Decoded query pairs of the latest request to `path`.
    pub fn query(&self, path: &str) -> HashMap<String, String> {
        self.last(path)
            .and_then(|s| s.query)
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}

/// Serves `api` under `/api` on an ephemeral port and returns the base URL.
pub async fn serve(api: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = Router::new().nest("/api", api);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/").parse().unwrap()
}

/// Unsigned JWT-shaped credential carrying `claims`.
pub fn make_token(claims: Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.c2lnbmF0dXJl")
}

pub fn user_token(username: &str, role: &str) -> String {
    make_token(json!({ "sub": username, "role": role, "name": username }))
}

pub fn client(base_url: Url, store: Arc<MemoryCredentialStore>) -> FloodGuard {
    client_with_timeout(base_url, store, Duration::from_secs(5))
}

pub fn client_with_timeout(
    base_url: Url,
    store: Arc<MemoryCredentialStore>,
    timeout: Duration,
) -> FloodGuard {
    let config = ClientConfig::new(base_url.clone())
        .with_request_timeout(timeout)
        .with_geocoder_url(base_url);
    FloodGuard::with_store(config, store).unwrap()
}

pub fn report_json(id: i64, severity: &str, status: &str) -> Value {
    json!({
        "id": id,
        "title": format!("Flooded street {id}"),
        "description": "Water is knee deep near the market",
        "latitude": 13.75,
        "longitude": 100.5,
        "severity": severity,
        "status": status,
        "reporterUsername": "alice",
    })
}

pub fn page_json(content: Vec<Value>) -> Value {
    let total = content.len();
    json!({
        "content": content,
        "totalElements": total,
        "totalPages": 1,
        "number": 0,
        "size": 10,
    })
}

pub async fn wait_for_location(navigator: &Navigator, path: &str) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while navigator.location() != path {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("navigator never reached {path}, at {}", navigator.location()));
}
