//! Channel boundary between stages.
//!
//! The pipeline only needs "send to a named channel" ([`MessageSink`]) and
//! "subscribe a handler to a named channel" ([`Transport`]). [`LocalBus`] is
//! the in-process implementation used by the CLI and tests: messages travel as
//! JSON so each delivery owns its own copy, subscribers on the same channel
//! share its partitions by key, channels nobody subscribed to keep a backlog
//! that can be drained, and recorded channels keep a copy of everything sent
//! on them.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};

use super::message::DocumentMessage;

// ═══════════════════════════════════════════════════════════
// Channels
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Channel {
    /// Inbound: accepted messages, validated here.
    #[serde(rename = "stage-tokenizer")]
    Tokenizer,
    #[serde(rename = "stage-extractor")]
    Extractor,
    #[serde(rename = "stage-categorizer")]
    Categorizer,
    #[serde(rename = "stage-output")]
    Output,
    #[serde(rename = "stage-error")]
    Error,
}

impl Channel {
    pub const ALL: [Channel; 5] = [
        Channel::Tokenizer,
        Channel::Extractor,
        Channel::Categorizer,
        Channel::Output,
        Channel::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tokenizer => "stage-tokenizer",
            Self::Extractor => "stage-extractor",
            Self::Categorizer => "stage-categorizer",
            Self::Output => "stage-output",
            Self::Error => "stage-error",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════
// Errors & traits
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to encode message for {channel}: {source}")]
    Serialize {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to decode message from {channel}: {source}")]
    Deserialize {
        channel: Channel,
        #[source]
        source: serde_json::Error,
    },

    #[error("Channel closed: {0}")]
    ChannelClosed(Channel),

    #[error("Subscribing requires a running tokio runtime")]
    NoRuntime,
}

/// Fire-and-forget send. `key` selects the partition; messages with the same
/// key reach the same consumer in send order.
pub trait MessageSink: Send + Sync {
    fn send(&self, channel: Channel, key: &str, message: &DocumentMessage) -> Result<(), TransportError>;
}

/// Consumes one delivered message. Runs to completion; never fails outward.
pub trait MessageHandler: Send + Sync {
    fn handle(&self, message: DocumentMessage);
}

impl<F> MessageHandler for F
where
    F: Fn(DocumentMessage) + Send + Sync,
{
    fn handle(&self, message: DocumentMessage) {
        self(message)
    }
}

pub trait Transport: MessageSink {
    fn subscribe(&self, channel: Channel, handler: Arc<dyn MessageHandler>) -> Result<(), TransportError>;
}

// ═══════════════════════════════════════════════════════════
// LocalBus
// ═══════════════════════════════════════════════════════════

type Payload = Vec<u8>;

/// In-process transport on tokio queues.
///
/// Each subscriber gets its own unbounded queue drained by one task, so a
/// subscriber handles its partitions sequentially. Handlers run on the
/// blocking pool since stage work (file reads, parsing) is synchronous.
#[derive(Clone, Default)]
pub struct LocalBus {
    inner: Arc<BusInner>,
}

#[derive(Default)]
struct BusInner {
    routes: Mutex<HashMap<Channel, Vec<mpsc::UnboundedSender<Payload>>>>,
    backlog: Mutex<HashMap<Channel, Vec<Payload>>>,
    recorded: Mutex<HashMap<Channel, Vec<Payload>>>,
    in_flight: AtomicUsize,
    idle: Notify,
    partitioner: RandomState,
}

impl BusInner {
    fn routes(&self) -> MutexGuard<'_, HashMap<Channel, Vec<mpsc::UnboundedSender<Payload>>>> {
        self.routes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn backlog(&self) -> MutexGuard<'_, HashMap<Channel, Vec<Payload>>> {
        self.backlog.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recorded(&self) -> MutexGuard<'_, HashMap<Channel, Vec<Payload>>> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_one(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages queued or being handled by subscribers.
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Messages retained on a channel without subscribers.
    pub fn pending(&self, channel: Channel) -> usize {
        self.inner.backlog().get(&channel).map_or(0, Vec::len)
    }

    /// Take every retained message from `channel`, oldest first.
    /// Payloads that no longer decode are logged and skipped.
    pub fn drain(&self, channel: Channel) -> Vec<DocumentMessage> {
        let payloads = self.inner.backlog().remove(&channel).unwrap_or_default();
        payloads
            .iter()
            .filter_map(|p| decode(channel, p))
            .collect()
    }

    /// Keep a copy of every message sent on `channel` from now on, whether or
    /// not it has subscribers.
    pub fn record(&self, channel: Channel) {
        self.inner.recorded().entry(channel).or_default();
    }

    /// Take the copies recorded on `channel` so far, oldest first.
    /// Recording continues.
    pub fn take_recorded(&self, channel: Channel) -> Vec<DocumentMessage> {
        let payloads = self
            .inner
            .recorded()
            .get_mut(&channel)
            .map(std::mem::take)
            .unwrap_or_default();
        payloads
            .iter()
            .filter_map(|p| decode(channel, p))
            .collect()
    }

    /// Resolve once no subscriber has queued or running work.
    ///
    /// A handler sends its follow-up before it returns, so a document moving
    /// between stages keeps the counter above zero until it settles.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

impl MessageSink for LocalBus {
    fn send(&self, channel: Channel, key: &str, message: &DocumentMessage) -> Result<(), TransportError> {
        let payload =
            serde_json::to_vec(message).map_err(|source| TransportError::Serialize { channel, source })?;
        if let Some(copies) = self.inner.recorded().get_mut(&channel) {
            copies.push(payload.clone());
        }

        let routes = self.inner.routes();
        match routes.get(&channel).filter(|subs| !subs.is_empty()) {
            Some(subscribers) => {
                let partition = (self.inner.partitioner.hash_one(key) as usize) % subscribers.len();
                self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
                if subscribers[partition].send(payload).is_err() {
                    self.inner.finish_one();
                    return Err(TransportError::ChannelClosed(channel));
                }
                tracing::debug!(channel = %channel, key, partition, "Message sent");
            }
            None => {
                self.inner.backlog().entry(channel).or_default().push(payload);
                tracing::debug!(channel = %channel, key, "Message retained, no subscriber");
            }
        }
        Ok(())
    }
}

impl Transport for LocalBus {
    /// Add a consumer to `channel`. Messages retained before the first
    /// subscription are handed to the new subscriber.
    fn subscribe(&self, channel: Channel, handler: Arc<dyn MessageHandler>) -> Result<(), TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let (tx, mut rx) = mpsc::unbounded_channel::<Payload>();

        {
            let mut routes = self.inner.routes();
            let retained = self.inner.backlog().remove(&channel).unwrap_or_default();
            for payload in retained {
                self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
                // rx is alive in this scope, so the send cannot fail
                if tx.send(payload).is_err() {
                    self.inner.finish_one();
                }
            }
            routes.entry(channel).or_default().push(tx);
        }

        let inner = self.inner.clone();
        runtime.spawn(async move {
            while let Some(payload) = rx.recv().await {
                let handler = handler.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    if let Some(message) = decode(channel, &payload) {
                        handler.handle(message);
                    }
                })
                .await;
                if let Err(e) = outcome {
                    tracing::error!(channel = %channel, error = %e, "Handler task aborted");
                }
                inner.finish_one();
            }
        });

        tracing::debug!(channel = %channel, "Subscriber registered");
        Ok(())
    }
}

fn decode(channel: Channel, payload: &[u8]) -> Option<DocumentMessage> {
    match serde_json::from_slice::<DocumentMessage>(payload) {
        Ok(message) => Some(message),
        Err(source) => {
            let err = TransportError::Deserialize { channel, source };
            tracing::warn!(channel = %channel, error = %err, "Dropping undecodable payload");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
