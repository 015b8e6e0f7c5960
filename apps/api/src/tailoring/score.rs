//! Score Calculator — the 0–100 match score shown next to a resume.
//!
//! Pure function of stored data, so a persisted resume can be re-scored for
//! display or audit without touching the provider.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::tailoring::matcher::{phrase_covered, tokenize, JobTerms, SkillMatchSummary};
use crate::tailoring::scorer::ScoredBullet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchScoreWeights {
    pub mean_relevance: f64,
    pub skill_coverage: f64,
    pub keyword_coverage: f64,
}

impl Default for MatchScoreWeights {
    fn default() -> Self {
        Self {
            mean_relevance: 0.60,
            skill_coverage: 0.25,
            keyword_coverage: 0.15,
        }
    }
}

impl MatchScoreWeights {
    pub fn validate(&self) -> Result<(), AppError> {
        let parts = [self.mean_relevance, self.skill_coverage, self.keyword_coverage];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) || parts.iter().sum::<f64>() <= 0.0 {
            return Err(AppError::Validation(
                "Match score weights must be non-negative with a positive sum".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchScoreBreakdown {
    pub mean_relevance: f64,
    pub skill_coverage: f64,
    pub keyword_coverage: f64,
    /// Required keywords the selection does not cover.
    pub missing_keywords: Vec<String>,
    pub score: u8, // 0 – 100
}

/// Computes the match score.
///
/// score = round(100 × (w_rel × mean relevance + w_skill × skill coverage
///                      + w_kw × keyword coverage) / Σw), clamped to 0–100.
///
/// Keyword coverage is measured over the selected bullets' matched keywords plus
/// the tokens of their rendered (final) text.
pub fn compute_match_score(
    selected: &[ScoredBullet],
    rendered: &[&str],
    skills: &SkillMatchSummary,
    terms: &JobTerms,
    weights: &MatchScoreWeights,
) -> MatchScoreBreakdown {
    let mean_relevance = if selected.is_empty() {
        0.0
    } else {
        selected.iter().map(|s| s.relevance.clamp(0.0, 1.0)).sum::<f64>() / selected.len() as f64
    };

    let mut covered: BTreeSet<String> = BTreeSet::new();
    for s in selected {
        covered.extend(s.matched_keywords.iter().cloned());
    }
    for text in rendered {
        covered.extend(tokenize(text));
    }

    let keyword_coverage = terms.required_coverage(&covered);
    let missing_keywords = terms
        .required
        .iter()
        .filter(|phrase| !phrase_covered(phrase, &covered))
        .cloned()
        .collect();
    let skill_coverage = skills.coverage.clamp(0.0, 1.0);

    let total = weights.mean_relevance + weights.skill_coverage + weights.keyword_coverage;
    let blended = if total > 0.0 {
        (weights.mean_relevance * mean_relevance
            + weights.skill_coverage * skill_coverage
            + weights.keyword_coverage * keyword_coverage)
            / total
    } else {
        0.0
    };

    MatchScoreBreakdown {
        mean_relevance,
        skill_coverage,
        keyword_coverage,
        missing_keywords,
        score: (blended * 100.0).round().clamp(0.0, 100.0) as u8,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::JobSpec;
    use uuid::Uuid;

    fn scored(relevance: f64, keywords: &[&str]) -> ScoredBullet {
        ScoredBullet {
            bullet_id: Uuid::new_v4(),
            experience_id: Uuid::new_v4(),
            relevance,
            matched_keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    fn terms() -> JobTerms {
        let job = JobSpec::new("Rust and Kafka engineer").with_required_skills(&["Rust", "Kafka"]);
        JobTerms::from_job(&job, 25)
    }

    #[test]
    fn test_blend_of_three_terms() {
        let selected = [scored(0.8, &["rust"]), scored(0.4, &[])];
        let skills = SkillMatchSummary {
            matches: vec![],
            coverage: 0.5,
        };
        let breakdown =
            compute_match_score(&selected, &[], &skills, &terms(), &MatchScoreWeights::default());

        // 0.6 × 0.6 + 0.25 × 0.5 + 0.15 × 0.5 = 0.56
        assert!((breakdown.mean_relevance - 0.6).abs() < 1e-9);
        assert!((breakdown.keyword_coverage - 0.5).abs() < 1e-9);
        assert_eq!(breakdown.missing_keywords, vec!["kafka"]);
        assert_eq!(breakdown.score, 56);
    }

    #[test]
    fn test_rendered_text_counts_toward_keyword_coverage() {
        let selected = [scored(1.0, &["rust"])];
        let breakdown = compute_match_score(
            &selected,
            &["Streamed events through Kafka"],
            &SkillMatchSummary::default(),
            &terms(),
            &MatchScoreWeights::default(),
        );
        assert!((breakdown.keyword_coverage - 1.0).abs() < 1e-9);
        assert!(breakdown.missing_keywords.is_empty());
        assert_eq!(breakdown.score, 75);
    }

    #[test]
    fn test_empty_selection_and_job_scores_zero() {
        let breakdown = compute_match_score(
            &[],
            &[],
            &SkillMatchSummary::default(),
            &JobTerms::default(),
            &MatchScoreWeights::default(),
        );
        assert_eq!(breakdown.score, 0);
    }

    #[test]
    fn test_score_is_recomputable() {
        let selected = [scored(0.7, &["rust"]), scored(0.3, &["kafka"])];
        let skills = SkillMatchSummary {
            matches: vec![],
            coverage: 1.0,
        };
        let weights = MatchScoreWeights::default();
        let a = compute_match_score(&selected, &["x"], &skills, &terms(), &weights);
        let b = compute_match_score(&selected, &["x"], &skills, &terms(), &weights);
        assert_eq!(a, b);
        // 0.6 × 0.5 + 0.25 + 0.15 = 0.70
        assert_eq!(a.score, 70);
    }

    #[test]
    fn test_weights_validation() {
        assert!(MatchScoreWeights::default().validate().is_ok());
        let zero = MatchScoreWeights {
            mean_relevance: 0.0,
            skill_coverage: 0.0,
            keyword_coverage: 0.0,
        };
        assert!(zero.validate().is_err());
    }
}
