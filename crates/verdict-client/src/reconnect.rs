//! Reconnect pool.
//!
//! A single background task owns every failed connection. Connections
//! queue themselves when they break; the task retries each with backoff
//! and bumps a broadcast epoch when one heals, waking callers that were
//! waiting for a usable pool.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::conn::StreamConn;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(3);

pub(crate) fn spawn(
    conns: Vec<Arc<StreamConn>>,
    mut failures: mpsc::UnboundedReceiver<usize>,
    epoch: watch::Sender<u64>,
    mut closing: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let index = tokio::select! {
                index = failures.recv() => match index {
                    Some(index) => index,
                    None => return,
                },
                _ = closing.changed() => {
                    if *closing.borrow() {
                        return;
                    }
                    continue;
                }
            };

            let Some(conn) = conns.get(index) else {
                continue;
            };

            let mut backoff = INITIAL_BACKOFF;
            loop {
                if *closing.borrow() {
                    return;
                }

                match conn.establish().await {
                    Ok(()) => {
                        debug!(index, "connection reinstated");
                        epoch.send_modify(|e| *e += 1);
                        break;
                    }
                    Err(err) => {
                        debug!(index, "reconnect failed: {err}");
                        tokio::select! {
                            () = tokio::time::sleep(backoff) => {}
                            _ = closing.changed() => {
                                if *closing.borrow() {
                                    return;
                                }
                            }
                        }
                        backoff = (backoff * 2).min(MAX_BACKOFF);
                    }
                }
            }
        }
    })
}
