//! HTTP surface: server, pipeline, correlation tagging and error mapping.

pub mod correlation;
pub mod error;
pub mod server;
pub mod session;

pub use error::GatewayError;
pub use server::{AppState, GatewayServer};
