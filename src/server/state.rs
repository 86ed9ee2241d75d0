//! Shared handler state

use crate::config::Config;
use crate::engine::Engine;
use std::sync::Arc;

/// Read-only state cloned into every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub environment: String,
    pub debug: bool,
    /// Result count for `/retrieve` when no `limit` is given
    pub default_limit: usize,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, config: &Config) -> Self {
        Self {
            engine,
            environment: config.app.env.clone(),
            debug: config.app.debug,
            default_limit: config.retrieval.k,
        }
    }
}
