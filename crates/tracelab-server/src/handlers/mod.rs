//! HTTP handler modules for the tracelab API.
//!
//! Handlers validate the request, delegate to the shared
//! [`Pipeline`](crate::pipeline::Pipeline), and return JSON (or an SSE
//! stream). No analysis logic lives in handlers.

pub mod analysis;
pub mod explain;
pub mod health;
pub mod process;
pub mod simulate;
