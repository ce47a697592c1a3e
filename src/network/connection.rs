//! Connection table: per-connection backpressure, identity, and metadata.
//!
//! Adapted from the teacher's integer-keyed `ConnectionRegistry`: here the
//! connection's identity *is* its remote address string, since the broker
//! treats `ip:port` as the primary key used by the topic registry, the
//! status reporter, and duplicate-connect eviction.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};

use super::config::ConnectionConfig;

/// A connection's identity: its remote socket address as a string, e.g.
/// `"203.0.113.5:51320"`.
pub type ConnectionId = String;

/// Message queued for delivery to a connection's write side.
#[derive(Debug, Clone)]
pub enum OutboundMessage {
    /// A text frame payload.
    Text(String),
    /// A close frame with an optional reason.
    Close(Option<String>),
}

/// Error returned when sending to a connection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendError {
    Timeout,
    Disconnected,
}

/// Handle to a single connection, providing send capability and metadata
/// access. Cloning a `ConnectionHandle` is cheap -- callers hold it as
/// `Arc<ConnectionHandle>`.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub tx: mpsc::Sender<OutboundMessage>,
    pub metadata: RwLock<ConnectionMetadata>,
    pub connected_at: Instant,
    /// Set when a newer connection evicts this one from the registry under
    /// the same identity key. Distinct from `tx` being closed: the writer
    /// task may still be draining queued messages when eviction happens.
    evicted: AtomicBool,
}

impl ConnectionHandle {
    /// Attempts to enqueue `msg` without blocking.
    ///
    /// Returns `true` if enqueued, `false` if the channel is full or the
    /// connection has already closed.
    #[must_use]
    pub fn try_send(&self, msg: OutboundMessage) -> bool {
        self.tx.try_send(msg).is_ok()
    }

    /// Sends `msg`, waiting up to `timeout` for room in the channel.
    ///
    /// # Errors
    ///
    /// Returns `SendError::Timeout` if the channel stayed full for the
    /// whole timeout, or `SendError::Disconnected` if the receiver (the
    /// connection's write loop) has already been dropped.
    pub async fn send_timeout(&self, msg: OutboundMessage, timeout: Duration) -> Result<(), SendError> {
        match tokio::time::timeout(timeout, self.tx.send(msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(SendError::Disconnected),
            Err(_) => Err(SendError::Timeout),
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.evicted.load(Ordering::Relaxed) && !self.tx.is_closed()
    }

    fn mark_evicted(&self) {
        self.evicted.store(true, Ordering::Relaxed);
    }
}

/// Mutable per-connection state.
#[derive(Debug, Default)]
pub struct ConnectionMetadata {
    /// Client-supplied label (`client_info`/`ci`), used by the status
    /// reporter to build `label@ip:port` member ids. Never forwarded into
    /// published message payloads.
    pub label: Option<String>,
}

/// Thread-safe table of all open connections, keyed by remote address.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, Arc<ConnectionHandle>>,
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection under `id`, evicting any existing
    /// connection already registered under the same identity.
    ///
    /// Eviction marks the incumbent's handle closed and pushes a `Close`
    /// message onto its outbound channel so its writer loop notices and
    /// tears the socket down; the new connection then owns `id` in the
    /// registry. This is the broker's chosen duplicate-identity policy:
    /// evict incumbent, accept newcomer (see `DESIGN.md`).
    pub fn register(
        &self,
        id: ConnectionId,
        config: &ConnectionConfig,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<OutboundMessage>) {
        let (tx, rx) = mpsc::channel(config.outbound_channel_capacity);
        let handle = Arc::new(ConnectionHandle {
            id: id.clone(),
            tx,
            metadata: RwLock::new(ConnectionMetadata::default()),
            connected_at: Instant::now(),
            evicted: AtomicBool::new(false),
        });
        if let Some((_, incumbent)) = self.connections.remove(&id) {
            incumbent.mark_evicted();
            let _ = incumbent.try_send(OutboundMessage::Close(Some("replaced by new connection".to_string())));
        }
        self.connections.insert(id, Arc::clone(&handle));
        (handle, rx)
    }

    /// Removes a connection, returning its handle if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.remove(id).map(|(_, handle)| handle)
    }

    /// Removes the entry for `id` only if it still points at `expected`.
    ///
    /// Used by a connection's own teardown path so a connection that lost
    /// a duplicate-identity eviction race does not remove the newcomer
    /// that replaced it.
    #[must_use]
    pub fn remove_if_current(&self, id: &str, expected: &Arc<ConnectionHandle>) -> bool {
        match self.connections.get(id) {
            Some(entry) if Arc::ptr_eq(entry.value(), expected) => {
                drop(entry);
                self.connections.remove(id);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(id).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Returns every connection currently registered, collected eagerly.
    #[must_use]
    pub fn connections(&self) -> Vec<Arc<ConnectionHandle>> {
        self.connections.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Removes and returns every connection. Used during graceful shutdown.
    pub fn drain_all(&self) -> Vec<Arc<ConnectionHandle>> {
        let keys: Vec<ConnectionId> = self.connections.iter().map(|e| e.key().clone()).collect();
        let mut handles = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some((_, handle)) = self.connections.remove(&key) {
                handles.push(handle);
            }
        }
        handles
    }
}
