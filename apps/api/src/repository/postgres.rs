//! PostgreSQL adapters for the profile and resume repositories.
//! Schema: `migrations/0001_tailoring.sql`.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::experience::{Bullet, Corpus, Experience, ExperienceType, Profile, Skill};
use crate::models::job::JobSpec;
use crate::models::resume::{Resume, ResumeContent, ResumeStatus};
use crate::repository::{check_transition, ProfileRepository, ResumeRepository};

// ────────────────────────────────────────────────────────────────────────────
// Row types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, FromRow)]
struct ProfileRow {
    user_id: Uuid,
    full_name: String,
    email: Option<String>,
    phone: Option<String>,
    location: Option<String>,
    links: Vec<String>,
    headline: Option<String>,
}

#[derive(Debug, FromRow)]
struct ExperienceRow {
    id: Uuid,
    user_id: Uuid,
    kind: String,
    title: String,
    organization: String,
    start_date: NaiveDate,
    end_date: Option<NaiveDate>,
    is_current: bool,
}

#[derive(Debug, FromRow)]
struct BulletRow {
    id: Uuid,
    experience_id: Uuid,
    content: String,
    impact_score: f64,
    keywords: Vec<String>,
    display_order: i32,
}

#[derive(Debug, FromRow)]
struct SkillRow {
    name: String,
    category: String,
    proficiency: i16,
    highlighted: bool,
}

#[derive(Debug, FromRow)]
struct ResumeRow {
    id: Uuid,
    user_id: Uuid,
    job: Json<JobSpec>,
    target_language: String,
    selected_bullet_ids: Vec<Uuid>,
    content: Json<ResumeContent>,
    match_score: i16,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ResumeRow> for Resume {
    type Error = AppError;

    fn try_from(row: ResumeRow) -> Result<Self, Self::Error> {
        let status = ResumeStatus::parse(&row.status).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("Unknown resume status '{}'", row.status))
        })?;
        Ok(Resume {
            id: row.id,
            user_id: row.user_id,
            job: row.job.0,
            target_language: row.target_language,
            selected_bullet_ids: row.selected_bullet_ids,
            content: row.content.0,
            match_score: row.match_score.clamp(0, 100) as u8,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

const RESUME_COLUMNS: &str = "id, user_id, job, target_language, selected_bullet_ids, content, \
                              match_score, status, created_at, updated_at";

// ────────────────────────────────────────────────────────────────────────────
// Profile repository
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgProfileRepository {
    pool: PgPool,
}

impl PgProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PgProfileRepository {
    async fn fetch_corpus(&self, user_id: Uuid) -> Result<Corpus, AppError> {
        let profile: ProfileRow = sqlx::query_as(
            "SELECT user_id, full_name, email, phone, location, links, headline \
             FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile for user {user_id} not found")))?;

        let experience_rows: Vec<ExperienceRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, kind, title, organization, start_date, end_date, is_current
            FROM experiences
            WHERE user_id = $1
            ORDER BY start_date DESC, id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let experience_ids: Vec<Uuid> = experience_rows.iter().map(|e| e.id).collect();
        let bullet_rows: Vec<BulletRow> = sqlx::query_as(
            r#"
            SELECT id, experience_id, content, impact_score, keywords, display_order
            FROM bullets
            WHERE experience_id = ANY($1)
            ORDER BY display_order, id
            "#,
        )
        .bind(&experience_ids)
        .fetch_all(&self.pool)
        .await?;

        let skill_rows: Vec<SkillRow> = sqlx::query_as(
            "SELECT name, category, proficiency, highlighted FROM skills WHERE user_id = $1 ORDER BY name",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut bullets_by_experience: HashMap<Uuid, Vec<Bullet>> = HashMap::new();
        for row in bullet_rows {
            bullets_by_experience
                .entry(row.experience_id)
                .or_default()
                .push(Bullet {
                    id: row.id,
                    experience_id: row.experience_id,
                    content: row.content,
                    impact_score: row.impact_score,
                    keywords: row.keywords,
                    display_order: row.display_order,
                });
        }

        let experiences = experience_rows
            .into_iter()
            .map(|row| {
                let kind = ExperienceType::parse(&row.kind).ok_or_else(|| {
                    AppError::Internal(anyhow::anyhow!("Unknown experience type '{}'", row.kind))
                })?;
                Ok(Experience {
                    bullets: bullets_by_experience.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    user_id: row.user_id,
                    kind,
                    title: row.title,
                    organization: row.organization,
                    start_date: row.start_date,
                    end_date: row.end_date,
                    is_current: row.is_current,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        let skills = skill_rows
            .into_iter()
            .map(|row| Skill {
                name: row.name,
                category: row.category,
                proficiency: row.proficiency.clamp(0, 100) as u8,
                highlighted: row.highlighted,
            })
            .collect();

        debug!(
            "Fetched corpus for user {user_id}: {} experiences",
            experiences.len()
        );

        Ok(Corpus {
            profile: Profile {
                user_id: profile.user_id,
                full_name: profile.full_name,
                email: profile.email,
                phone: profile.phone,
                location: profile.location,
                links: profile.links,
                headline: profile.headline,
            },
            experiences,
            skills,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resume repository
// ────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgResumeRepository {
    pool: PgPool,
}

impl PgResumeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResumeRepository for PgResumeRepository {
    async fn save(&self, resume: &Resume) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO resumes
                (id, user_id, job, target_language, selected_bullet_ids, content,
                 match_score, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                job = EXCLUDED.job,
                target_language = EXCLUDED.target_language,
                selected_bullet_ids = EXCLUDED.selected_bullet_ids,
                content = EXCLUDED.content,
                match_score = EXCLUDED.match_score,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(resume.id)
        .bind(resume.user_id)
        .bind(Json(&resume.job))
        .bind(&resume.target_language)
        .bind(&resume.selected_bullet_ids)
        .bind(Json(&resume.content))
        .bind(resume.match_score as i16)
        .bind(resume.status.as_str())
        .bind(resume.created_at)
        .bind(resume.updated_at)
        .execute(&self.pool)
        .await?;

        debug!("Saved resume {} (status={})", resume.id, resume.status.as_str());
        Ok(())
    }

    async fn get(&self, resume_id: Uuid) -> Result<Resume, AppError> {
        let row: ResumeRow =
            sqlx::query_as(&format!("SELECT {RESUME_COLUMNS} FROM resumes WHERE id = $1"))
                .bind(resume_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?;
        row.try_into()
    }

    async fn update_status(&self, resume_id: Uuid, status: ResumeStatus) -> Result<Resume, AppError> {
        let current = self.get(resume_id).await?;
        check_transition(current.status, status)?;

        // Guarded on the status we validated against.
        let row: Option<ResumeRow> = sqlx::query_as(&format!(
            "UPDATE resumes SET status = $2, updated_at = NOW() \
             WHERE id = $1 AND status = $3 RETURNING {RESUME_COLUMNS}"
        ))
        .bind(resume_id)
        .bind(status.as_str())
        .bind(current.status.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(AppError::Validation(format!(
                "Resume {resume_id} changed status concurrently; retry the update"
            ))),
        }
    }

    async fn update_score(&self, resume_id: Uuid, match_score: u8) -> Result<Resume, AppError> {
        let row: Option<ResumeRow> = sqlx::query_as(&format!(
            "UPDATE resumes SET match_score = $2, updated_at = NOW() \
             WHERE id = $1 RETURNING {RESUME_COLUMNS}"
        ))
        .bind(resume_id)
        .bind(match_score.min(100) as i16)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| AppError::NotFound(format!("Resume {resume_id} not found")))?
            .try_into()
    }
}
