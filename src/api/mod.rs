//! HTTP API.
//!
//! REST routes for the caregiver and patient views and for the calling
//! backend's callbacks live under `/api/`; each owner's change stream is
//! a websocket at `/ws/owners/:owner`. The router is composable:
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server instance.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;
pub mod websocket;

pub use router::api_router;
pub use server::{start_api_server, ApiServer, ServerError, ServerSession};
pub use types::ApiContext;
