//! Narrow notification interface used by the loader and the classifier.
//!
//! The core never blocks on a notification and never changes behaviour based
//! on it. The default sink forwards to the `log` facade; embedders that show
//! messages to a user install their own [`Notify`] implementation.

use std::sync::Mutex;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Error,
    Info,
    Debug,
}

pub trait Notify: Send + Sync {
    fn notify(&self, kind: MessageKind, text: &str);

    /// Report an [`Error`] as an `Error` message.
    fn report(&self, err: &Error) {
        self.notify(MessageKind::Error, &err.to_string());
    }
}

/// Forwards every message to `log` (`error!`, `info!`, `debug!`).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notify for LogNotifier {
    fn notify(&self, kind: MessageKind, text: &str) {
        match kind {
            MessageKind::Error => log::error!("{}", text),
            MessageKind::Info => log::info!("{}", text),
            MessageKind::Debug => log::debug!("{}", text),
        }
    }
}

/// Keeps every message in memory, in arrival order.
#[derive(Debug, Default)]
pub struct CollectingNotifier {
    messages: Mutex<Vec<(MessageKind, String)>>,
}

impl CollectingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<(MessageKind, String)> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }

    /// Messages of one kind only.
    pub fn of_kind(&self, kind: MessageKind) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, text)| text)
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.of_kind(MessageKind::Error)
    }
}

impl Notify for CollectingNotifier {
    fn notify(&self, kind: MessageKind, text: &str) {
        log::debug!("notify {:?}: {}", kind, text);
        if let Ok(mut messages) = self.messages.lock() {
            messages.push((kind, text.to_string()));
        }
    }
}
