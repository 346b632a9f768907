//! Multi-source loader with a one-shot completion barrier.
//!
//! A [`Loader`] is one session: register any number of named geometry and
//! attribute requests, then hand it a completion handler. Every request is
//! spawned the moment it is added, so sources are fetched in parallel; the
//! handler runs exactly once, after the last request has either resolved or
//! failed.
//!
//! Failures stay local to their request: they are reported through the
//! session's [`Notify`] sink and the name is simply absent from the data
//! handed to the handler. Only a duplicate request name is returned to the
//! caller as an error, since it is a programming mistake.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use natatlas::loader::Loader;
//! # use natatlas::notify::LogNotifier;
//! # use natatlas::transport::HttpTransport;
//! # async fn demo() -> natatlas::Result<()> {
//! let mut loader = Loader::new(Arc::new(HttpTransport::default()), Arc::new(LogNotifier));
//! loader
//!     .add_geometry_request("geo", "topojson", "https://example.org/gemeenten.topojson")?
//!     .add_attribute_request("attrib", "csv", "https://example.org/bevolking.csv", "code")?;
//! let count = loader
//!     .on_complete(|data| data.geometries("geo").map(|g| g.len()).unwrap_or(0))
//!     .await;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::format::{self, MissingKeyPolicy};
use crate::models::{LoadResult, LoadedData, NamedRequest, RequestKind, SourceFormat};
use crate::notify::{MessageKind, Notify};
use crate::transport::Fetch;

#[derive(Debug)]
enum Outcome {
    Resolved(LoadedData),
    Failed,
}

#[derive(Debug)]
struct Completion {
    name: String,
    outcome: Outcome,
}

pub struct Loader {
    transport: Arc<dyn Fetch>,
    notifier: Arc<dyn Notify>,
    policy: MissingKeyPolicy,
    registered: BTreeSet<String>,
    outstanding: BTreeSet<String>,
    result: LoadResult,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("registered", &self.registered)
            .field("outstanding", &self.outstanding)
            .field("policy", &self.policy)
            .finish()
    }
}

impl Loader {
    pub fn new(transport: Arc<dyn Fetch>, notifier: Arc<dyn Notify>) -> Self {
        let (tx, rx) = unbounded_channel();
        Self {
            transport,
            notifier,
            policy: MissingKeyPolicy::default(),
            registered: BTreeSet::new(),
            outstanding: BTreeSet::new(),
            result: LoadResult::default(),
            tx,
            rx,
        }
    }

    pub fn with_missing_key_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Schedule a geometry fetch. `format` is `geojson` or `topojson`.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn add_geometry_request(&mut self, name: &str, format: &str, url: &str) -> Result<&mut Self> {
        self.add_parsed(name, RequestKind::Geometry, format, url, None)
    }

    /// Schedule an attribute fetch keyed by `foreign_key`.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn add_attribute_request(
        &mut self,
        name: &str,
        format: &str,
        url: &str,
        foreign_key: &str,
    ) -> Result<&mut Self> {
        self.add_parsed(name, RequestKind::Attribute, format, url, Some(foreign_key))
    }

    fn add_parsed(
        &mut self,
        name: &str,
        kind: RequestKind,
        format: &str,
        url: &str,
        foreign_key: Option<&str>,
    ) -> Result<&mut Self> {
        match format.parse::<SourceFormat>() {
            Ok(format) => self.add_request(NamedRequest {
                name: name.to_string(),
                kind,
                format,
                url: url.to_string(),
                foreign_key: foreign_key.map(str::to_string),
            }),
            Err(err) => {
                self.register(name)?;
                self.fail_now(name, err);
                Ok(self)
            }
        }
    }

    /// Schedule a typed request.
    ///
    /// Returns `DuplicateName` if `request.name` is already part of this
    /// session; the earlier registration is left untouched.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime.
    pub fn add_request(&mut self, request: NamedRequest) -> Result<&mut Self> {
        self.register(&request.name)?;

        if let Err(err) = format::check_supported(request.kind, request.format) {
            self.fail_now(&request.name, err);
            return Ok(self);
        }
        if request.kind == RequestKind::Attribute
            && request.foreign_key.as_deref().is_none_or(|fk| fk.trim().is_empty())
        {
            let err = Error::MissingForeignKey {
                foreign_key: String::new(),
                detail: format!("attribute request {:?} has no foreign key", request.name),
            };
            self.fail_now(&request.name, err);
            return Ok(self);
        }

        self.notifier.notify(
            MessageKind::Debug,
            &format!("Loading {} data; URL={}", request.kind, request.url),
        );
        self.spawn(request);
        Ok(self)
    }

    fn register(&mut self, name: &str) -> Result<()> {
        if !self.registered.insert(name.to_string()) {
            return Err(Error::DuplicateName(name.to_string()));
        }
        self.outstanding.insert(name.to_string());
        Ok(())
    }

    fn fail_now(&mut self, name: &str, err: Error) {
        self.notifier.report(&err);
        self.outstanding.remove(name);
        self.result.fail(name.to_string());
    }

    fn spawn(&self, request: NamedRequest) {
        let transport = Arc::clone(&self.transport);
        let notifier = Arc::clone(&self.notifier);
        let tx = self.tx.clone();
        let policy = self.policy;

        tokio::spawn(async move {
            let outcome = match transport.fetch(&request.url).await {
                Ok(payload) => match format::decode(&request, &payload, policy) {
                    Ok(decoded) => {
                        if decoded.missing_keys > 0 {
                            notifier.report(&Error::MissingForeignKey {
                                foreign_key: request.foreign_key.clone().unwrap_or_default(),
                                detail: format!(
                                    "{} row(s) without a key in {}",
                                    decoded.missing_keys, request.url
                                ),
                            });
                        }
                        Outcome::Resolved(decoded.data)
                    }
                    Err(err) => {
                        notifier.report(&err);
                        Outcome::Failed
                    }
                },
                Err(source) => {
                    notifier.report(&Error::Transport {
                        kind: request.kind,
                        url: request.url.clone(),
                        source,
                    });
                    Outcome::Failed
                }
            };
            // The session may already be gone; a stale completion is dropped.
            let _ = tx.send(Completion {
                name: request.name,
                outcome,
            });
        });
    }

    /// Names registered in this session.
    pub fn registered(&self) -> impl Iterator<Item = &str> {
        self.registered.iter().map(|s| s.as_str())
    }

    /// Requests not yet known to be terminal.
    pub fn outstanding(&self) -> usize {
        self.outstanding.len()
    }

    /// Register the completion handler and wait for the barrier.
    ///
    /// The handler runs as soon as every registered request is terminal; if
    /// that is already the case (including a session with no requests) it
    /// runs without waiting. Consuming `self` makes a second registration
    /// impossible, so the handler fires exactly once per session.
    pub async fn on_complete<F, T>(self, callback: F) -> T
    where
        F: FnOnce(LoadResult) -> T,
    {
        let Loader {
            notifier,
            mut outstanding,
            mut result,
            tx,
            mut rx,
            ..
        } = self;
        // Only the spawned requests hold senders now, so `recv` yields
        // `None` once every one of them has finished, even by panicking.
        drop(tx);

        while !outstanding.is_empty() {
            match rx.recv().await {
                Some(Completion { name, outcome }) => {
                    if !outstanding.remove(&name) {
                        continue;
                    }
                    match outcome {
                        Outcome::Resolved(data) => result.resolve(name, data),
                        Outcome::Failed => result.fail(name),
                    }
                }
                None => {
                    for name in std::mem::take(&mut outstanding) {
                        notifier.notify(
                            MessageKind::Error,
                            &format!("request {:?} ended without a result", name),
                        );
                        result.fail(name);
                    }
                }
            }
        }

        notifier.notify(MessageKind::Debug, "Map data loaded.");
        callback(result)
    }

    /// Wait for the barrier and return the snapshot.
    pub async fn wait(self) -> LoadResult {
        self.on_complete(|r| r).await
    }

    /// Run the completion handler on its own task.
    ///
    /// The session keeps running even if the caller moves on, and the
    /// handler still receives its (possibly stale) result.
    pub fn on_complete_detached<F>(self, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        tokio::spawn(async move { self.on_complete(callback).await })
    }
}
