//! HTTP surface for the identification pipeline (feature `http`).
//!
//! A small Axum server exposing the identify contract, warm-up, an SSE
//! stream of job events and a health report. The binary starts it through
//! `birdcall-cli serve`.

mod routes;
mod sse;

use std::net::SocketAddr;

pub use routes::{build_router, run_http_server, HttpServerError, HttpState};

/// Default listen address when `BIRDCALL_HTTP_ADDR` is unset or invalid
pub const DEFAULT_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 8787);

/// Resolve the listen address from `BIRDCALL_HTTP_ADDR`
pub fn bind_addr_from_env() -> SocketAddr {
    std::env::var("BIRDCALL_HTTP_ADDR")
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(DEFAULT_ADDR))
}
