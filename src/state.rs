//! Shared application state handed to every handler

use std::sync::Arc;

use crate::auth::TokenStore;
use crate::pipeline::AggregationPipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AggregationPipeline>,
    pub tokens: Arc<TokenStore>,
}

impl AppState {
    pub fn new(pipeline: Arc<AggregationPipeline>, tokens: Arc<TokenStore>) -> Self {
        Self { pipeline, tokens }
    }
}
