//! Relevance Scorer — `(bullet, job) -> [0, 1]`.
//!
//! relevance = w_kw * keyword_overlap + w_impact * impact_term, weights normalized
//! to sum to 1. keyword_overlap = |bullet terms ∩ JD vocabulary| / |JD vocabulary|.
//! With an empty job description the score is the impact term alone.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::experience::{Bullet, Experience};
use crate::tailoring::matcher::{bullet_terms, JobTerms};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub keyword_overlap: f64,
    pub impact: f64,
    /// Size cap of the JD vocabulary used to normalize keyword overlap.
    pub max_job_keywords: usize,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            keyword_overlap: 0.7,
            impact: 0.3,
            max_job_keywords: 25,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), AppError> {
        let finite = self.keyword_overlap.is_finite() && self.impact.is_finite();
        if !finite || self.keyword_overlap < 0.0 || self.impact < 0.0 {
            return Err(AppError::Validation(
                "Scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if self.keyword_overlap + self.impact <= 0.0 {
            return Err(AppError::Validation(
                "Scoring weights must not both be zero".to_string(),
            ));
        }
        if self.max_job_keywords == 0 {
            return Err(AppError::Validation(
                "max_job_keywords must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// A bullet's fit to one job. Recomputed per run, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredBullet {
    pub bullet_id: Uuid,
    pub experience_id: Uuid,
    pub relevance: f64,
    pub matched_keywords: BTreeSet<String>,
}

/// Monotonic map of the stored 0–100 impact score onto [0, 1].
pub fn impact_term(impact_score: f64) -> f64 {
    if impact_score.is_nan() {
        return 0.0;
    }
    (impact_score / 100.0).clamp(0.0, 1.0)
}

pub fn score(bullet: &Bullet, terms: &JobTerms, weights: &ScoringWeights) -> f64 {
    score_terms(&bullet_terms(bullet), bullet.impact_score, terms, weights)
}

fn score_terms(
    bullet_terms: &BTreeSet<String>,
    impact_score: f64,
    terms: &JobTerms,
    weights: &ScoringWeights,
) -> f64 {
    let impact = impact_term(impact_score);
    if terms.is_empty() {
        return impact;
    }

    let overlap = if bullet_terms.is_empty() {
        0.0
    } else {
        let hits = bullet_terms.intersection(&terms.vocabulary).count();
        hits as f64 / terms.vocabulary.len() as f64
    };

    let total = weights.keyword_overlap + weights.impact;
    ((weights.keyword_overlap * overlap + weights.impact * impact) / total).clamp(0.0, 1.0)
}

pub fn score_bullet(bullet: &Bullet, terms: &JobTerms, weights: &ScoringWeights) -> ScoredBullet {
    let bullet_terms = bullet_terms(bullet);
    ScoredBullet {
        bullet_id: bullet.id,
        experience_id: bullet.experience_id,
        relevance: score_terms(&bullet_terms, bullet.impact_score, terms, weights),
        matched_keywords: terms.matched_keywords(&bullet_terms),
    }
}

/// Scores every bullet in the corpus, keyed by bullet id.
pub fn score_corpus(
    experiences: &[Experience],
    terms: &JobTerms,
    weights: &ScoringWeights,
) -> HashMap<Uuid, ScoredBullet> {
    experiences
        .iter()
        .flat_map(|e| e.bullets.iter())
        .map(|b| (b.id, score_bullet(b, terms, weights)))
        .collect()
}
