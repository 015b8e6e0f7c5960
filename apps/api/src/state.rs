use std::sync::Arc;

use crate::repository::ResumeRepository;
use crate::tailoring::engine::TailoringEngine;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TailoringEngine>,
    pub resumes: Arc<dyn ResumeRepository>,
}
