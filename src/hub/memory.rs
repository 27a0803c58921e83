//! In-process transport for tests and local tooling.
//!
//! Published payloads are recorded in order. Inbound bytes are fed through a
//! channel; each `subscribe` call hands out the next queued connection, and
//! fails when none is queued so the subscriber exercises its backoff.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, Notify};

use crate::events::Event;
use crate::hub::transport::{ByteStream, HubTransport};
use crate::types::{Error, Result};

/// Recording, channel-fed [`HubTransport`].
#[derive(Debug, Default)]
pub struct MemoryTransport {
    published: Mutex<Vec<String>>,
    connections: Mutex<VecDeque<mpsc::UnboundedReceiver<Bytes>>>,
    subscribe_attempts: AtomicUsize,
    fail_publish: AtomicBool,
    published_notify: Notify,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an inbound connection; bytes sent on the returned sender become
    /// the body of the next subscription. Dropping the sender ends the stream.
    pub fn connect(&self) -> mpsc::UnboundedSender<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(rx);
        tx
    }

    /// Make every subsequent publish fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::Relaxed);
    }

    pub fn published(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Published payloads decoded back into events; undecodable ones are skipped.
    pub fn published_events(&self) -> Vec<Event> {
        self.published()
            .iter()
            .filter_map(|payload| Event::from_payload(payload).ok())
            .collect()
    }

    /// Count of published events with the given `type`.
    pub fn count_of(&self, event_type: &str) -> usize {
        self.published_events()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn subscribe_attempts(&self) -> usize {
        self.subscribe_attempts.load(Ordering::Relaxed)
    }

    /// Wait until at least `count` payloads have been published.
    pub async fn wait_for_published(&self, count: usize) {
        loop {
            let notified = self.published_notify.notified();
            if self.published().len() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl HubTransport for MemoryTransport {
    async fn publish(&self, data: String) -> Result<()> {
        if self.fail_publish.load(Ordering::Relaxed) {
            return Err(Error::internal("publish failed"));
        }
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(data);
        self.published_notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(&self) -> Result<ByteStream> {
        self.subscribe_attempts.fetch_add(1, Ordering::Relaxed);
        let next = self
            .connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(rx) => {
                let stream = futures::stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|chunk| (Ok(chunk), rx))
                });
                Ok(stream.boxed())
            }
            None => Err(Error::internal("no connection available")),
        }
    }
}
