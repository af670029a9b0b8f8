//! TCP decision server.
//!
//! One task per connection reads frames, evaluates each request against
//! the current snapshot and replies with the same request id. Requests on
//! one connection are evaluated concurrently; the per-connection writer
//! task serializes responses back onto the stream in completion order,
//! which is fine because callers match responses by id, not by order.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};
use verdict_core::frame::{DecisionFrame, FrameCodec};

use crate::config::DaemonConfig;
use crate::service;
use crate::state::SharedStorage;

/// Bound decision server.
pub struct Server {
    config: DaemonConfig,
    state: Arc<SharedStorage>,
    listener: TcpListener,
}

impl Server {
    /// Binds the listen socket.
    ///
    /// # Errors
    ///
    /// Returns an error when the configured address cannot be bound.
    pub async fn bind(config: DaemonConfig, state: Arc<SharedStorage>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&config.listen)
            .await
            .with_context(|| format!("failed to bind {}", config.listen))?;
        info!(addr = %config.listen, "decision service listening");

        Ok(Self {
            config,
            state,
            listener,
        })
    }

    /// The bound local address.
    ///
    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections until the shutdown signal flips to `true`.
    ///
    /// # Errors
    ///
    /// Returns an error when accepting fails irrecoverably.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "accepted connection");
                            let state = Arc::clone(&self.state);
                            let config = self.config.clone();
                            tokio::spawn(async move {
                                if let Err(err) = handle_connection(stream, state, config).await {
                                    debug!(%peer, "connection closed: {err}");
                                }
                            });
                        }
                        Err(err) => {
                            error!("failed to accept connection: {err}");
                        }
                    }
                }

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("decision service shutting down");
                        return Ok(());
                    }
                }
            }
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<SharedStorage>,
    config: DaemonConfig,
) -> anyhow::Result<()> {
    let framed = Framed::new(stream, FrameCodec::with_max_size(config.max_frame_size));
    let (mut sink, mut source) = framed.split();

    let (tx, mut rx) = mpsc::channel::<DecisionFrame>(64);
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if let Err(err) = sink.send(frame).await {
                warn!("failed to write response frame: {err}");
                break;
            }
        }
    });

    while let Some(frame) = source.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(err) => {
                warn!("failed to read request frame: {err}");
                break;
            }
        };

        let (storage, content) = state.snapshot().await;
        let max_response_size = config.max_response_size;
        let tx = tx.clone();
        tokio::spawn(async move {
            let payload = service::validate(&storage, &content, &frame.payload, max_response_size);
            let _ = tx.send(DecisionFrame::new(frame.id, payload.into())).await;
        });
    }

    drop(tx);
    let _ = writer.await;
    Ok(())
}
