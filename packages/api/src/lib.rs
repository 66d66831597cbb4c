//! HTTP and WebSocket surface for the dashboard hub.
//!
//! This crate exposes a running [`hub::Hub`] over HTTP:
//! - `GET /ws` upgrades to a WebSocket session (optional `X-User-ID` header)
//! - `GET /ws/stats` returns the hub stats snapshot
//! - `GET /health` reports whether the hub is accepting work

mod connection;
mod error;
mod init;
mod routes;

pub use connection::{WsConnection, WsReader, WsWriter};
pub use error::{ApiError, Result};
pub use init::{init_hub, serve};
pub use routes::{router, AppState, USER_ID_HEADER};
