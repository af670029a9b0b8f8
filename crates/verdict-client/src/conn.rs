//! One upstream connection with reader and writer tasks.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tracing::debug;
use verdict_core::frame::{DecisionFrame, FrameCodec};

use crate::errors::ClientError;
use crate::slots::SlotTable;

const CONN_IDLE: u32 = 0;
const CONN_READY: u32 = 1;
const CONN_BROKEN: u32 = 2;
const CONN_CLOSED: u32 = 3;

type FrameSink = SplitSink<Framed<TcpStream, FrameCodec>, DecisionFrame>;
type FrameSource = SplitStream<Framed<TcpStream, FrameCodec>>;

/// Connection to one upstream server.
///
/// The writer task serializes outgoing frames, the reader task matches
/// responses back to request slots. When either side fails, the
/// connection marks itself broken, wakes every in-flight caller with an
/// error and queues itself for the reconnect pool.
pub(crate) struct StreamConn {
    index: usize,
    addr: String,
    connect_timeout: Duration,
    max_frame_size: usize,
    state: AtomicU32,
    slots: Arc<SlotTable>,
    out: Mutex<Option<mpsc::Sender<DecisionFrame>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    failures: mpsc::UnboundedSender<usize>,
}

impl StreamConn {
    pub(crate) fn new(
        index: usize,
        addr: String,
        max_streams: usize,
        connect_timeout: Duration,
        max_frame_size: usize,
        failures: mpsc::UnboundedSender<usize>,
    ) -> Arc<Self> {
        Arc::new(Self {
            index,
            addr,
            connect_timeout,
            max_frame_size,
            state: AtomicU32::new(CONN_IDLE),
            slots: SlotTable::new(max_streams),
            out: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            failures,
        })
    }

    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == CONN_READY
    }

    /// Establishes the TCP connection and spawns the IO tasks.
    ///
    /// A closed connection silently refuses so a late reconnect attempt
    /// after `close` cannot resurrect IO tasks.
    pub(crate) async fn establish(self: &Arc<Self>) -> Result<(), ClientError> {
        let entry_state = self.state.load(Ordering::Acquire);
        if entry_state == CONN_CLOSED {
            return Ok(());
        }

        let connect = TcpStream::connect(self.addr.as_str());
        let stream = tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| ClientError::ConnFailure)?
            .map_err(|_| ClientError::ConnFailure)?;

        let framed = Framed::new(stream, FrameCodec::with_max_size(self.max_frame_size));
        let (sink, source) = framed.split();

        let (tx, rx) = mpsc::channel(self.slots.capacity());
        *self.lock_out() = Some(tx);

        let writer = tokio::spawn(write_loop(rx, sink, Arc::clone(self)));
        let reader = tokio::spawn(read_loop(source, Arc::clone(self)));
        {
            let mut tasks = self.lock_tasks();
            tasks.retain(|t| !t.is_finished());
            tasks.push(writer);
            tasks.push(reader);
        }

        // The client may have closed while the connect was in flight; a
        // failed swap tears the fresh IO tasks down again.
        if self
            .state
            .compare_exchange(entry_state, CONN_READY, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.close();
            return Ok(());
        }

        debug!(addr = %self.addr, "connection established");
        Ok(())
    }

    /// Sends one request and waits for its correlated response.
    pub(crate) async fn validate(self: &Arc<Self>, payload: &Bytes) -> Result<Bytes, ClientError> {
        if !self.is_ready() {
            return Err(ClientError::WrongConnState);
        }

        let check = {
            let conn = Arc::clone(self);
            move || {
                if conn.is_ready() {
                    Ok(())
                } else {
                    Err(ClientError::WrongStreamState)
                }
            }
        };

        let (guard, rx) = self.slots.allocate(check).await?;
        self.exchange(guard.id(), payload, rx).await
    }

    /// Sends one request only if a slot is free right now.
    ///
    /// Returns `Ok(None)` when the connection has no free capacity; the
    /// hot-spot balancer uses this to advance to the next connection.
    pub(crate) async fn try_validate(
        self: &Arc<Self>,
        payload: &Bytes,
    ) -> Result<Option<Bytes>, ClientError> {
        if !self.is_ready() {
            return Err(ClientError::WrongConnState);
        }

        let Some((guard, rx)) = self.slots.try_allocate() else {
            return Ok(None);
        };

        self.exchange(guard.id(), payload, rx).await.map(Some)
    }

    async fn exchange(
        self: &Arc<Self>,
        id: u32,
        payload: &Bytes,
        rx: tokio::sync::oneshot::Receiver<Result<Bytes, ClientError>>,
    ) -> Result<Bytes, ClientError> {
        let sender = self.lock_out().clone().ok_or(ClientError::WrongConnState)?;
        sender
            .send(DecisionFrame::new(id, payload.clone()))
            .await
            .map_err(|_| ClientError::ConnFailure)?;

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(ClientError::StreamFailure),
        }
    }

    pub(crate) fn deliver(&self, id: u32, payload: Bytes) {
        self.slots.complete(id, payload);
    }

    /// Flags the connection broken, fails in-flight callers and queues
    /// it for reconnection.
    pub(crate) fn mark_broken(&self) {
        if self
            .state
            .compare_exchange(CONN_READY, CONN_BROKEN, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }

        debug!(addr = %self.addr, "connection broken");
        *self.lock_out() = None;
        self.slots.fail_all(&ClientError::ConnFailure);
        let _ = self.failures.send(self.index);
    }

    /// Shuts the connection down for good.
    pub(crate) fn close(&self) {
        self.state.store(CONN_CLOSED, Ordering::Release);
        *self.lock_out() = None;
        self.slots.fail_all(&ClientError::WrongConnState);

        for task in self.lock_tasks().drain(..) {
            task.abort();
        }
    }

    fn lock_out(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<DecisionFrame>>> {
        self.out.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn write_loop(
    mut rx: mpsc::Receiver<DecisionFrame>,
    mut sink: FrameSink,
    conn: Arc<StreamConn>,
) {
    while let Some(frame) = rx.recv().await {
        if sink.send(frame).await.is_err() {
            conn.mark_broken();
            return;
        }
    }
}

async fn read_loop(mut source: FrameSource, conn: Arc<StreamConn>) {
    while let Some(next) = source.next().await {
        match next {
            Ok(frame) => conn.deliver(frame.id, frame.payload),
            Err(err) => {
                debug!("read failed: {err}");
                break;
            }
        }
    }

    conn.mark_broken();
}
