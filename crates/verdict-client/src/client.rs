//! Streaming decision client.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;
use verdict_core::wire::Decision;

use crate::cache::ResponseCache;
use crate::conn::StreamConn;
use crate::errors::ClientError;
use crate::marshal::{decode_response, DecisionRequest};
use crate::options::{BalancerKind, ClientOptions};
use crate::reconnect;

const STATE_DISCONNECTED: u32 = 0;
const STATE_CONNECTING: u32 = 1;
const STATE_CONNECTED: u32 = 2;
const STATE_CLOSING: u32 = 3;
const STATE_CLOSED: u32 = 4;

/// Streaming client multiplexing decision requests over one or more
/// connections.
///
/// The lifecycle is a five-state machine guarded by compare-and-swap:
/// Disconnected, Connecting, Connected, Closing, Closed. [`connect`]
/// moves Disconnected to Connected, [`close`] moves Connected to Closed
/// and is a no-op in any other state; a closed client stays closed.
///
/// [`connect`]: Client::connect
/// [`close`]: Client::close
pub struct Client {
    opts: ClientOptions,
    state: AtomicU32,
    inner: Mutex<Option<Arc<ClientInner>>>,
}

struct ClientInner {
    conns: Vec<Arc<StreamConn>>,
    balancer: BalancerKind,
    counter: AtomicU64,
    cache: Option<ResponseCache>,
    epoch: watch::Receiver<u64>,
    closing: watch::Sender<bool>,
    pool: JoinHandle<()>,
}

impl Client {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(opts: ClientOptions) -> Self {
        Self {
            opts,
            state: AtomicU32::new(STATE_DISCONNECTED),
            inner: Mutex::new(None),
        }
    }

    fn cas_state(&self, from: u32, to: u32) -> bool {
        self.state
            .compare_exchange(from, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Connects to the given address, or to the configured address list
    /// when one was set.
    ///
    /// Individual connection failures do not fail the call: failed
    /// connections are handed to the reconnect pool and heal in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::AlreadyConnected`] unless the client is in
    /// the Disconnected state.
    pub async fn connect(&self, addr: &str) -> Result<(), ClientError> {
        if !self.cas_state(STATE_DISCONNECTED, STATE_CONNECTING) {
            return Err(ClientError::AlreadyConnected);
        }

        let addrs = if self.opts.addresses.is_empty() {
            vec![addr.to_string()]
        } else {
            self.opts.addresses.clone()
        };
        let balancer = if addrs.len() > 1 {
            self.opts.balancer
        } else {
            BalancerKind::Simple
        };

        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let conns: Vec<Arc<StreamConn>> = addrs
            .iter()
            .enumerate()
            .map(|(i, addr)| {
                StreamConn::new(
                    i,
                    addr.clone(),
                    self.opts.max_streams,
                    self.opts.connect_timeout,
                    self.opts.max_frame_size,
                    failures_tx.clone(),
                )
            })
            .collect();

        for conn in &conns {
            if let Err(err) = conn.establish().await {
                debug!(index = conn.index(), "initial connect failed: {err}");
                let _ = failures_tx.send(conn.index());
            }
        }

        let (epoch_tx, epoch_rx) = watch::channel(0u64);
        let (closing_tx, closing_rx) = watch::channel(false);
        let pool = reconnect::spawn(conns.clone(), failures_rx, epoch_tx, closing_rx);

        let cache = self.opts.cache_max_bytes.map(ResponseCache::new);

        *self.lock_inner() = Some(Arc::new(ClientInner {
            conns,
            balancer,
            counter: AtomicU64::new(0),
            cache,
            epoch: epoch_rx,
            closing: closing_tx,
            pool,
        }));

        self.state.store(STATE_CONNECTED, Ordering::Release);
        Ok(())
    }

    /// Closes the client.
    ///
    /// Silently returns unless the client is Connected. In-flight calls
    /// fail with a connection-state error; the cache is cleared.
    pub async fn close(&self) {
        if !self.cas_state(STATE_CONNECTED, STATE_CLOSING) {
            return;
        }

        if let Some(inner) = self.lock_inner().take() {
            let _ = inner.closing.send(true);
            inner.pool.abort();
            for conn in &inner.conns {
                conn.close();
            }
            if let Some(cache) = &inner.cache {
                cache.clear();
            }
        }

        self.state.store(STATE_CLOSED, Ordering::Release);
    }

    /// Sends a decision request and waits for the decision.
    ///
    /// Connection-class failures retry against another balancer target
    /// up to the number of configured connections, waiting for the
    /// reconnect pool when no connection is usable; other errors
    /// surface immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NotConnected`] when the client is not
    /// Connected, marshaling errors for oversized requests and
    /// [`ClientError::ResponseServerError`] for undecodable replies.
    pub async fn validate(&self, request: &DecisionRequest) -> Result<Decision, ClientError> {
        if self.state.load(Ordering::Acquire) != STATE_CONNECTED {
            return Err(ClientError::NotConnected);
        }

        let inner = self
            .lock_inner()
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let body = request.marshal()?;

        if let Some(cache) = &inner.cache {
            if let Some(hit) = cache.get(&body) {
                return decode_response(&hit);
            }
        }

        while self.state.load(Ordering::Acquire) == STATE_CONNECTED {
            if !inner.any_ready() && !inner.wait_healed(&self.state).await {
                return Err(ClientError::NotConnected);
            }

            for _ in 0..inner.conns.len() {
                match inner.dispatch(&body).await {
                    Ok(payload) => {
                        if let Some(cache) = &inner.cache {
                            cache.put(body.clone(), payload.clone());
                        }
                        return decode_response(&payload);
                    }
                    Err(err) if err.is_retriable() => {
                        debug!("retrying after: {err}");
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        Err(ClientError::NotConnected)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Option<Arc<ClientInner>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ClientInner {
    fn any_ready(&self) -> bool {
        self.conns.iter().any(|c| c.is_ready())
    }

    async fn wait_healed(&self, state: &AtomicU32) -> bool {
        let mut epoch = self.epoch.clone();
        loop {
            if self.any_ready() {
                return true;
            }
            if state.load(Ordering::Acquire) != STATE_CONNECTED {
                return false;
            }
            if epoch.changed().await.is_err() {
                return false;
            }
        }
    }

    async fn dispatch(&self, body: &Bytes) -> Result<Bytes, ClientError> {
        match self.balancer {
            BalancerKind::Simple => self.conns[0].validate(body).await,
            BalancerKind::RoundRobin => {
                let next = self.counter.fetch_add(1, Ordering::Relaxed);
                #[allow(clippy::cast_possible_truncation)] // modulo keeps it in range
                let i = (next % self.conns.len() as u64) as usize;
                self.conns[i].validate(body).await
            }
            BalancerKind::HotSpot => self.dispatch_hot_spot(body).await,
        }
    }

    /// Probes the current connection without blocking; on a full slot
    /// table advances the counter, and after sweeping every connection
    /// blocks on the last one chosen.
    async fn dispatch_hot_spot(&self, body: &Bytes) -> Result<Bytes, ClientError> {
        let total = self.conns.len() as u64;
        let start = self.counter.load(Ordering::Relaxed);

        #[allow(clippy::cast_possible_truncation)] // modulo keeps it in range
        let mut i = (start % total) as usize;
        loop {
            match self.conns[i].try_validate(body).await {
                Ok(Some(payload)) => return Ok(payload),
                Ok(None) => {
                    let advanced = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
                    if advanced.wrapping_sub(start) >= total {
                        break;
                    }
                    #[allow(clippy::cast_possible_truncation)]
                    {
                        i = (advanced % total) as usize;
                    }
                }
                Err(err) => return Err(err),
            }
        }

        self.conns[i].validate(body).await
    }
}
