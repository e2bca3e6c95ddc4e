//! Outbound tunnel relay for PipeGate (C6) — see §4.6.
//!
//! Runs on the tunneled machine: opens a WebSocket to a PipeGate server,
//! receives [`pipegate_types::RequestMessage`] frames, issues them against
//! a local origin, and returns [`pipegate_types::ResponseMessage`] frames.
//!
//! # Example
//!
//! ```no_run
//! use pipegate_client::{Relay, RelayConfig};
//! use url::Url;
//!
//! # async fn example() -> pipegate_client::Result<()> {
//! let config = RelayConfig::new(
//!     Url::parse("http://127.0.0.1:9090")?,
//!     Url::parse("ws://tunnel.example.com/aaaaaaaa-aaaa-4aaa-8aaa-aaaaaaaaaaaa")?,
//!     "secret-token",
//! );
//!
//! Relay::new(config)?.run().await
//! # }
//! ```

pub mod config;
pub mod error;
pub mod relay;

pub use config::{DEFAULT_ORIGIN_TIMEOUT, RelayConfig};
pub use error::{Error, Result};
pub use relay::Relay;
