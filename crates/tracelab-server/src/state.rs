//! Application state shared by all handlers.
//!
//! Everything in [`AppState`] is immutable after startup, so handlers clone
//! the `Arc`s and never take a lock.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// State with the default collaborators for `config`.
    pub fn new(config: ServerConfig) -> std::io::Result<Self> {
        let pipeline = Pipeline::from_config(&config)?;
        Ok(Self::with_pipeline(pipeline, config))
    }

    /// State around an explicitly assembled pipeline.
    pub fn with_pipeline(pipeline: Pipeline, config: ServerConfig) -> Self {
        AppState {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }
}
