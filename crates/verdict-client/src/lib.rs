//! # verdict-client
//!
//! Enforcement-point client for the verdict policy decision service.
//!
//! The client multiplexes many concurrent decision requests over one or
//! more TCP streams. Each request takes a slot in a bounded correlation
//! table, travels as a length-prefixed frame tagged with the slot's id
//! and resolves when the matching response frame arrives; slot
//! exhaustion blocks callers until capacity frees up.
//!
//! Multi-server deployments pick a balancer: round-robin spreads load
//! evenly, hot-spot keeps filling one connection before advancing.
//! Failed connections heal in the background through a reconnect pool
//! while callers retry against the remaining targets.
//!
//! ## Example
//!
//! ```rust,no_run
//! use verdict_client::{Client, ClientOptions, DecisionRequest};
//!
//! # async fn run() -> Result<(), verdict_client::ClientError> {
//! let client = Client::new(ClientOptions::new().with_streams(16));
//! client.connect("127.0.0.1:5555").await?;
//!
//! let decision = client
//!     .validate(&DecisionRequest::new().attribute("domain", "example.com"))
//!     .await?;
//! if !decision.is_permit() {
//!     // apply the obligations
//! }
//! client.close().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod cache;
mod client;
mod conn;
mod errors;
mod marshal;
mod options;
mod reconnect;
mod slots;

pub use client::Client;
pub use errors::ClientError;
pub use marshal::DecisionRequest;
pub use options::{BalancerKind, ClientOptions};

pub use verdict_core::response::Effect;
pub use verdict_core::value::AttributeValue;
pub use verdict_core::wire::Decision;
