//! HTTP/SSE server for instrumented execution of Tracelang submissions.
//!
//! A submission is classified, run in a sandboxed child process or traced
//! in-process, reduced to a visual artifact, scanned for issues and
//! explained. [`pipeline`] sequences those stages and streams one envelope
//! per step; [`router`] exposes it over axum.

pub mod config;
pub mod error;
pub mod explain;
pub mod handlers;
pub mod pipeline;
pub mod router;
pub mod sandbox;
pub mod schema;
pub mod state;
