//! Fetch transport used by the loader.
//!
//! The loader itself performs no I/O: it asks a [`Fetch`] implementation for
//! the raw payload of a URL and formats whatever error shape comes back.
//!
//! - [`HttpTransport`] talks HTTP(S) through an async `reqwest` client and
//!   reads scheme-less paths (or `file://` URLs) from the local filesystem.
//! - [`MemoryTransport`] serves payloads from memory, optionally after a
//!   number of scheduler turns, which makes completion order controllable.
//!
//! Typical usage:
//! ```no_run
//! # use natatlas::transport::{Fetch, HttpTransport};
//! # async fn demo() {
//! let http = HttpTransport::default();
//! let payload = http.fetch("https://example.org/geo.json").await;
//! # }
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use reqwest::Client as HttpClient;
use reqwest::redirect::Policy;

use crate::error::FetchError;

/// Boxed future that can be sent between threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `fetch(url) -> payload | FetchError`.
///
/// Implementations must be `Send + Sync`; every request of a loader session
/// runs as its own task.
pub trait Fetch: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: HttpClient,
}

impl Default for HttpTransport {
    fn default() -> Self {
        let http = HttpClient::builder()
            .timeout(Duration::from_secs(30)) // total request timeout
            .connect_timeout(Duration::from_secs(10)) // connect timeout
            .redirect(Policy::limited(5)) // cap redirects
            .user_agent(concat!("natatlas/", env!("CARGO_PKG_VERSION")))
            .build()
            .expect("reqwest client build");
        Self { http }
    }
}

/// Local path for `file://` URLs and scheme-less strings.
fn local_path(url: &str) -> Option<&Path> {
    if let Some(rest) = url.strip_prefix("file://") {
        return Some(Path::new(rest));
    }
    if url.contains("://") {
        None
    } else {
        Some(Path::new(url))
    }
}

fn reqwest_error_name(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "TimeoutError"
    } else if e.is_connect() {
        "ConnectError"
    } else if e.is_decode() || e.is_body() {
        "BodyError"
    } else {
        "NetworkError"
    }
}

impl HttpTransport {
    pub fn with_client(http: HttpClient) -> Self {
        Self { http }
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if let Some(path) = local_path(url) {
            return tokio::fs::read(path)
                .await
                .map_err(|e| FetchError::network("IOError", e.to_string()));
        }

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::network(reqwest_error_name(&e), e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::http(
                status.as_u16(),
                status.canonical_reason().unwrap_or("Unknown"),
            ));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| FetchError::network(reqwest_error_name(&e), e.to_string()))?;
        Ok(body.to_vec())
    }
}

impl Fetch for HttpTransport {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        Box::pin(self.get(url))
    }
}

#[derive(Debug, Clone)]
enum Canned {
    Payload(Vec<u8>),
    Failure(FetchError),
}

/// In-memory transport keyed by URL.
///
/// Unknown URLs fail with a network error. A delay, counted in scheduler
/// turns (`tokio::task::yield_now`), can be attached to any URL.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    responses: HashMap<String, Canned>,
    delays: HashMap<String, usize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload(mut self, url: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        self.responses
            .insert(url.into(), Canned::Payload(payload.into()));
        self
    }

    pub fn with_failure(mut self, url: impl Into<String>, error: FetchError) -> Self {
        self.responses.insert(url.into(), Canned::Failure(error));
        self
    }

    pub fn with_delay(mut self, url: impl Into<String>, turns: usize) -> Self {
        self.delays.insert(url.into(), turns);
        self
    }

    async fn get(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let turns = self.delays.get(url).copied().unwrap_or(0);
        for _ in 0..turns {
            tokio::task::yield_now().await;
        }
        match self.responses.get(url) {
            Some(Canned::Payload(p)) => Ok(p.clone()),
            Some(Canned::Failure(e)) => Err(e.clone()),
            None => Err(FetchError::network(
                "NetworkError",
                format!("no route to {}", url),
            )),
        }
    }
}

impl Fetch for MemoryTransport {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, FetchError>> {
        Box::pin(self.get(url))
    }
}
