use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;

/// Identifies one live connection. Never reused within a process.
pub type ClientId = u64;

/// Why an outbound frame could not be queued for a client.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    /// The connection task has exited and dropped its queue.
    #[error("client queue closed")]
    Closed,
    /// The client is not draining its queue.
    #[error("client queue full")]
    Full,
}

impl DeliveryError {
    /// Metric label for this failure.
    #[must_use]
    pub fn reason(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Full => "stalled",
        }
    }
}

/// Handle held in the registry, used to push frames to a connection.
///
/// Dropping the last clone closes the client's outbound queue and fires its
/// eviction signal, which interrupts a socket write stuck on a peer that is
/// not reading.
#[derive(Clone, Debug)]
pub struct ClientHandle {
    /// Registry key.
    pub id: ClientId,
    /// Remote address of the peer.
    pub peer_addr: SocketAddr,
    tx: mpsc::Sender<Message>,
    _evict: Arc<oneshot::Sender<()>>,
}

/// Receiving side of a client's outbound queue, owned by its connection task.
#[derive(Debug)]
pub struct ClientQueue {
    pub(crate) frames: mpsc::Receiver<Message>,
    /// Resolves (with `Err`) once every [`ClientHandle`] clone is gone.
    pub(crate) evicted: oneshot::Receiver<()>,
}

impl ClientHandle {
    /// Create a handle with an outbound queue of `buffer` frames, and the
    /// queue its connection task drains.
    #[must_use]
    pub fn new(id: ClientId, peer_addr: SocketAddr, buffer: usize) -> (Self, ClientQueue) {
        let (tx, frames) = mpsc::channel(buffer);
        let (evict, evicted) = oneshot::channel();
        let handle = Self {
            id,
            peer_addr,
            tx,
            _evict: Arc::new(evict),
        };
        (handle, ClientQueue { frames, evicted })
    }

    /// Queue an encoded event for this client without waiting.
    ///
    /// WebSocket text frames own their payload, so each client gets its own
    /// copy of `frame`; the encoding itself is shared.
    pub fn deliver(&self, frame: &str) -> Result<(), DeliveryError> {
        self.tx
            .try_send(Message::Text(frame.to_owned()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::Full,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }
}

/// The set of live clients.
///
/// Every operation takes the same lock, so a [`snapshot`](Self::snapshot) is
/// always a whole set as of one instant and never interleaves with a
/// concurrent register or unregister.
#[derive(Debug, Default)]
pub struct Registry {
    clients: Mutex<HashMap<ClientId, ClientHandle>>,
    next_id: AtomicU64,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh client id.
    pub fn next_id(&self) -> ClientId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    // A panic while holding the lock cannot leave the map half-updated, so a
    // poisoned lock is still safe to use.
    fn lock(&self) -> MutexGuard<'_, HashMap<ClientId, ClientHandle>> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a client. Returns `false` and keeps the existing entry if the id is
    /// already registered.
    pub fn register(&self, handle: ClientHandle) -> bool {
        let mut clients = self.lock();
        if clients.contains_key(&handle.id) {
            return false;
        }
        clients.insert(handle.id, handle);
        true
    }

    /// Remove a client. Only the first of any number of racing callers gets
    /// the handle back; the rest see `None`.
    pub fn unregister(&self, id: ClientId) -> Option<ClientHandle> {
        self.lock().remove(&id)
    }

    /// Copy of every registered handle, taken under the lock.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ClientHandle> {
        self.lock().values().cloned().collect()
    }

    /// Remove and return every client.
    pub fn drain(&self) -> Vec<ClientHandle> {
        self.lock().drain().map(|(_, handle)| handle).collect()
    }

    /// Returns `true` if the id is registered.
    #[must_use]
    pub fn contains(&self, id: ClientId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Number of registered clients.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` if no client is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
