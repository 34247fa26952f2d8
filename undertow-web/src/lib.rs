//! Undertow Web - HTTP surface
//!
//! JSON endpoints for submitting and inspecting streams, the HLS file
//! server, and the metadata search proxy.

#![warn(clippy::missing_errors_doc)]
#![deny(clippy::missing_panics_doc)]
#![warn(clippy::too_many_lines)]

pub mod handlers;
pub mod server;

pub use server::{AppState, build_router, run_server};
