use crate::connection::{check_connection_health, connect, redact_connection_string, ConnectionError};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use may_postgres::Client;
use std::cell::Cell;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// How long a waiting coroutine parks between attempts to take a connection.
const ACQUIRE_BACKOFF: Duration = Duration::from_millis(2);

/// A pool slot. `None` marks a connection that was discarded and has to be
/// reopened before it is handed out again.
type Slot = Option<Client>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no connection available within {0:?}")]
    Timeout(Duration),
    #[error("pool size must be at least 1")]
    EmptyPool,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Fixed set of `may_postgres` clients shared by every request.
///
/// Cloning the pool is cheap; clones share the same connections. A
/// connection that fails its health check on release is dropped and its slot
/// reconnects on the next acquire.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    url: String,
    sender: Sender<Slot>,
    receiver: Receiver<Slot>,
    size: usize,
    timeout: Duration,
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("url", &redact_connection_string(&self.inner.url))
            .field("size", &self.inner.size)
            .field("idle", &self.idle())
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

impl ConnectionPool {
    /// Open `size` connections to `url`.
    ///
    /// Fails if any connection cannot be established; connections opened so
    /// far are closed when the error is returned.
    pub fn open(url: &str, size: usize, timeout: Duration) -> Result<Self, PoolError> {
        if size == 0 {
            return Err(PoolError::EmptyPool);
        }

        let mut slots = Vec::with_capacity(size);
        for _ in 0..size {
            slots.push(Some(connect(url)?));
        }

        log::info!(
            "opened {} PostgreSQL connections to {}",
            size,
            redact_connection_string(url)
        );
        Self::from_slots(url, slots, timeout)
    }

    fn from_slots(url: &str, slots: Vec<Slot>, timeout: Duration) -> Result<Self, PoolError> {
        let size = slots.len();
        let (sender, receiver) = bounded(size);
        for slot in slots {
            // Capacity equals `size`, so this never blocks.
            if sender.send(slot).is_err() {
                return Err(ConnectionError::Other("pool channel closed".to_string()).into());
            }
        }

        Ok(Self {
            inner: Arc::new(PoolInner {
                url: url.to_string(),
                sender,
                receiver,
                size,
                timeout,
            }),
        })
    }

    /// Take a connection, waiting up to the configured timeout.
    pub fn acquire(&self) -> Result<PooledConnection, PoolError> {
        self.acquire_timeout(self.inner.timeout)
    }

    /// Take a connection, waiting up to `timeout`.
    ///
    /// Waiting parks the current coroutine instead of blocking the worker
    /// thread it runs on. An empty slot is reconnected first; if that fails
    /// the slot goes back empty and the connection error is returned.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection, PoolError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::pool_acquire_span().entered();

        let start = Instant::now();
        loop {
            match self.inner.receiver.try_recv() {
                Ok(slot) => {
                    #[cfg(feature = "metrics")]
                    crate::metrics::METRICS.record_pool_wait(start.elapsed());
                    let client = self.refill(slot)?;
                    return Ok(PooledConnection {
                        client: Some(client),
                        sender: self.inner.sender.clone(),
                        broken: Cell::new(false),
                    });
                }
                Err(TryRecvError::Empty) if start.elapsed() < timeout => {
                    may::coroutine::sleep(ACQUIRE_BACKOFF);
                }
                Err(_) => {
                    log::warn!("connection pool exhausted after {:?}", start.elapsed());
                    return Err(PoolError::Timeout(timeout));
                }
            }
        }
    }

    fn refill(&self, slot: Slot) -> Result<Client, PoolError> {
        if let Some(client) = slot {
            return Ok(client);
        }
        match connect(&self.inner.url) {
            Ok(client) => {
                log::info!(
                    "reopened pooled connection to {}",
                    redact_connection_string(&self.inner.url)
                );
                Ok(client)
            }
            Err(err) => {
                log::warn!("could not reopen pooled connection: {err}");
                let _ = self.inner.sender.try_send(None);
                Err(err.into())
            }
        }
    }

    /// Number of connections the pool was opened with.
    pub fn size(&self) -> usize {
        self.inner.size
    }

    /// Number of slots currently checked in, including empty ones.
    pub fn idle(&self) -> usize {
        self.inner.receiver.len()
    }
}

/// A connection checked out of a [`ConnectionPool`].
pub struct PooledConnection {
    client: Option<Client>,
    sender: Sender<Slot>,
    broken: Cell<bool>,
}

impl PooledConnection {
    /// Flag the connection after a backend error. It is health-checked on
    /// release and replaced if the check fails.
    pub fn mark_broken(&self) {
        self.broken.set(true);
    }
}

impl Deref for PooledConnection {
    type Target = Client;

    fn deref(&self) -> &Client {
        // Only `Drop` takes the client out.
        match &self.client {
            Some(client) => client,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        let slot = if self.broken.get() {
            release_checked(client, |client| check_connection_health(client).unwrap_or(false))
        } else {
            Some(client)
        };
        // The pool itself may already be gone during shutdown.
        let _ = self.sender.try_send(slot);
    }
}

/// Keep `client` only if `healthy` says it still answers.
fn release_checked<C>(client: C, healthy: impl FnOnce(&C) -> bool) -> Option<C> {
    if healthy(&client) {
        Some(client)
    } else {
        log::warn!("discarding pooled connection that failed its health check");
        None
    }
}
