use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::experience::Corpus;
use crate::models::resume::{Resume, ResumeStatus};
use crate::repository::{check_transition, ProfileRepository, ResumeRepository};

/// Fixed corpora keyed by user id. Used for local runs without a database and in tests.
#[derive(Debug, Default)]
pub struct InMemoryProfileRepository {
    corpora: HashMap<Uuid, Corpus>,
}

impl InMemoryProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_corpus(mut self, corpus: Corpus) -> Self {
        self.corpora.insert(corpus.profile.user_id, corpus);
        self
    }
}

#[async_trait]
impl ProfileRepository for InMemoryProfileRepository {
    async fn fetch_corpus(&self, user_id: Uuid) -> Result<Corpus, AppError> {
        self.corpora
            .get(&user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Profile for user {user_id} not found")))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryResumeRepository {
    resumes: DashMap<Uuid, Resume>,
}

impl InMemoryResumeRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resumes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resumes.is_empty()
    }
}

#[async_trait]
impl ResumeRepository for InMemoryResumeRepository {
    async fn save(&self, resume: &Resume) -> Result<(), AppError> {
        self.resumes.insert(resume.id, resume.clone());
        Ok(())
    }

    async fn get(&self, resume_id: Uuid) -> Result<Resume, AppError> {
        self.resumes
            .get(&resume_id)
            .map(|r| r.value().clone())
            .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))
    }

    async fn update_status(&self, resume_id: Uuid, status: ResumeStatus) -> Result<Resume, AppError> {
        let mut entry = self
            .resumes
            .get_mut(&resume_id)
            .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
        check_transition(entry.status, status)?;
        entry.status = status;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn update_score(&self, resume_id: Uuid, match_score: u8) -> Result<Resume, AppError> {
        let mut entry = self
            .resumes
            .get_mut(&resume_id)
            .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
        entry.match_score = match_score.min(100);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobSpec;
    use crate::models::resume::ResumeContent;

    fn resume(status: ResumeStatus) -> Resume {
        let now = Utc::now();
        Resume {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            job: JobSpec::new("Rust engineer"),
            target_language: "en".to_string(),
            selected_bullet_ids: vec![],
            content: ResumeContent::default(),
            match_score: 40,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let repo = InMemoryResumeRepository::new();
        let r = resume(ResumeStatus::Generated);
        repo.save(&r).await.unwrap();
        assert_eq!(repo.get(r.id).await.unwrap(), r);
        assert!(matches!(
            repo.get(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_status_enforces_lifecycle() {
        let repo = InMemoryResumeRepository::new();
        let r = resume(ResumeStatus::Generated);
        repo.save(&r).await.unwrap();

        let reviewed = repo.update_status(r.id, ResumeStatus::Reviewed).await.unwrap();
        assert_eq!(reviewed.status, ResumeStatus::Reviewed);
        let err = repo.update_status(r.id, ResumeStatus::Accepted).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_profile_is_not_found() {
        let repo = InMemoryProfileRepository::new();
        assert!(matches!(
            repo.fetch_corpus(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }
}
