//! Request slot correlation table.
//!
//! Each stream owns a bounded ring of request slots. A caller takes a
//! slot, sends its frame with the slot's id and waits on the slot's
//! one-shot channel; the reader task matches incoming frames back to
//! slots by id. Ids combine the slot index with a per-slot generation
//! counter, so a response arriving after the caller gave up is detected
//! as stale and discarded.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tokio::sync::{oneshot, Notify};

use crate::errors::ClientError;

type Completion = oneshot::Sender<Result<Bytes, ClientError>>;

/// Bounded table of request slots.
#[derive(Debug)]
pub(crate) struct SlotTable {
    capacity: usize,
    inner: Mutex<SlotInner>,
    freed: Notify,
}

#[derive(Debug)]
struct SlotInner {
    free: Vec<u16>,
    gens: Vec<u16>,
    pending: Vec<Option<Completion>>,
}

/// Owner handle for one allocated slot; dropping it frees the slot and
/// bumps the generation so late deliveries are discarded.
#[derive(Debug)]
pub(crate) struct SlotGuard {
    table: Arc<SlotTable>,
    index: u16,
    gen: u16,
}

impl SlotGuard {
    /// The 32-bit request id for this slot: generation in the high half,
    /// index in the low half.
    pub(crate) fn id(&self) -> u32 {
        (u32::from(self.gen) << 16) | u32::from(self.index)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.table.release(self.index, self.gen);
    }
}

impl SlotTable {
    /// Creates a table with the given number of slots (at most 65536).
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        assert!(
            capacity >= 1 && capacity <= usize::from(u16::MAX) + 1,
            "slot table capacity {capacity} out of range"
        );

        #[allow(clippy::cast_possible_truncation)] // bounded by the assert
        let free: Vec<u16> = (0..capacity as u32).rev().map(|i| i as u16).collect();

        Arc::new(Self {
            capacity,
            inner: Mutex::new(SlotInner {
                free,
                gens: vec![0; capacity],
                pending: (0..capacity).map(|_| None).collect(),
            }),
            freed: Notify::new(),
        })
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Takes a free slot without waiting.
    pub(crate) fn try_allocate(
        self: &Arc<Self>,
    ) -> Option<(SlotGuard, oneshot::Receiver<Result<Bytes, ClientError>>)> {
        let mut inner = self.lock();
        let index = inner.free.pop()?;
        let gen = inner.gens[usize::from(index)];

        let (tx, rx) = oneshot::channel();
        inner.pending[usize::from(index)] = Some(tx);

        Some((
            SlotGuard {
                table: Arc::clone(self),
                index,
                gen,
            },
            rx,
        ))
    }

    /// Takes a slot, waiting for one to free up if the table is full.
    ///
    /// `check` runs before each attempt so a caller can abort when its
    /// stream leaves the usable state.
    pub(crate) async fn allocate(
        self: &Arc<Self>,
        check: impl Fn() -> Result<(), ClientError>,
    ) -> Result<(SlotGuard, oneshot::Receiver<Result<Bytes, ClientError>>), ClientError> {
        loop {
            check()?;
            if let Some(slot) = self.try_allocate() {
                return Ok(slot);
            }

            let freed = self.freed.notified();
            if let Some(slot) = self.try_allocate() {
                return Ok(slot);
            }
            freed.await;
        }
    }

    /// Delivers a response payload to the slot named by `id`.
    ///
    /// Deliveries for unknown or stale ids are dropped silently; the
    /// generation check is what makes cancellation safe.
    pub(crate) fn complete(&self, id: u32, payload: Bytes) {
        #[allow(clippy::cast_possible_truncation)] // intentional field split
        let index = id as u16;
        #[allow(clippy::cast_possible_truncation)]
        let gen = (id >> 16) as u16;

        if usize::from(index) >= self.capacity {
            return;
        }

        let mut inner = self.lock();
        if inner.gens[usize::from(index)] != gen {
            return;
        }

        if let Some(tx) = inner.pending[usize::from(index)].take() {
            let _ = tx.send(Ok(payload));
        }
    }

    /// Fails every pending slot with the given error.
    ///
    /// Used when a connection breaks: all in-flight callers wake with
    /// the error and release their slots as their guards drop.
    pub(crate) fn fail_all(&self, err: &ClientError) {
        let mut inner = self.lock();
        for pending in &mut inner.pending {
            if let Some(tx) = pending.take() {
                let _ = tx.send(Err(err.clone()));
            }
        }
    }

    fn release(&self, index: u16, gen: u16) {
        let mut inner = self.lock();
        if inner.gens[usize::from(index)] != gen {
            return;
        }

        inner.pending[usize::from(index)] = None;
        inner.gens[usize::from(index)] = gen.wrapping_add(1);
        inner.free.push(index);
        drop(inner);

        self.freed.notify_one();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
