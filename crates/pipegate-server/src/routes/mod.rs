//! HTTP and WebSocket routes.

pub mod health;
pub mod public;
pub mod tunnel;

pub use health::{HealthResponse, health_routes};
pub use public::public_handler;
pub use tunnel::handshake_handler;
