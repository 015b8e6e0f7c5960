//! Persistence boundaries of the tailoring engine.
//!
//! The engine only reads profiles and never writes; handlers persist the
//! assembled resume once per run through [`ResumeRepository`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::experience::Corpus;
use crate::models::resume::{Resume, ResumeStatus};

/// Read-only fetch of everything the engine needs for one user.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Returns `NotFound` when the user has no profile.
    async fn fetch_corpus(&self, user_id: Uuid) -> Result<Corpus, AppError>;
}

#[async_trait]
pub trait ResumeRepository: Send + Sync {
    /// Insert or replace by id.
    async fn save(&self, resume: &Resume) -> Result<(), AppError>;

    async fn get(&self, resume_id: Uuid) -> Result<Resume, AppError>;

    async fn update_status(&self, resume_id: Uuid, status: ResumeStatus) -> Result<Resume, AppError>;

    async fn update_score(&self, resume_id: Uuid, match_score: u8) -> Result<Resume, AppError>;
}

/// Rejects lifecycle moves the status machine does not allow.
pub fn check_transition(current: ResumeStatus, next: ResumeStatus) -> Result<(), AppError> {
    if current == next || current.can_transition_to(next) {
        return Ok(());
    }
    Err(AppError::Validation(format!(
        "Cannot move resume from '{}' to '{}'",
        current.as_str(),
        next.as_str()
    )))
}
