//! Resume Assembler — turns a selection plus rewrites into the resume document.
//! Deterministic and side-effect free; persistence is the caller's job.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::experience::{Experience, Profile};
use crate::models::job::JobSpec;
use crate::models::resume::{
    ContactBlock, ExperienceSection, Resume, ResumeBullet, ResumeContent, ResumeStatus, SkillEntry,
};
use crate::tailoring::matcher::{JobTerms, SkillMatchSummary};
use crate::tailoring::orchestrator::{RewriteOutcome, RewriteSource};
use crate::tailoring::score::{compute_match_score, MatchScoreBreakdown, MatchScoreWeights};
use crate::tailoring::scorer::ScoredBullet;
use crate::tailoring::selector::Selection;

pub struct AssemblyInput<'a> {
    pub profile: &'a Profile,
    /// Presentation order.
    pub experiences: &'a [Experience],
    pub selection: &'a Selection,
    pub scores: &'a HashMap<Uuid, ScoredBullet>,
    /// Empty when rewriting was skipped; bullets then keep their original text.
    pub rewrites: &'a HashMap<Uuid, RewriteOutcome>,
    pub skills: &'a SkillMatchSummary,
    pub job: &'a JobSpec,
    pub terms: &'a JobTerms,
}

/// Identity and timestamps of the resume being produced.
#[derive(Debug, Clone)]
pub struct ResumeMeta {
    pub id: Uuid,
    pub user_id: Uuid,
    pub target_language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResumeMeta {
    pub fn new(user_id: Uuid, target_language: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            target_language: target_language.into(),
            created_at: now,
            updated_at: now,
        }
    }
}

fn section_for(
    experience: &Experience,
    selection: &Selection,
    rewrites: &HashMap<Uuid, RewriteOutcome>,
) -> Option<ExperienceSection> {
    let bullets: Vec<ResumeBullet> = selection
        .picks_for(experience.id)
        .filter_map(|pick| experience.bullets.iter().find(|b| b.id == pick.bullet_id))
        .map(|bullet| match rewrites.get(&bullet.id) {
            Some(outcome) => ResumeBullet {
                bullet_id: bullet.id,
                text: outcome.text.clone(),
                rewritten: outcome.source != RewriteSource::Fallback,
                degraded: outcome.degraded(),
            },
            None => ResumeBullet {
                bullet_id: bullet.id,
                text: bullet.content.trim().to_string(),
                rewritten: false,
                degraded: false,
            },
        })
        .collect();

    if bullets.is_empty() {
        return None;
    }

    Some(ExperienceSection {
        experience_id: experience.id,
        kind: experience.kind,
        title: experience.title.clone(),
        organization: experience.organization.clone(),
        start_date: experience.start_date,
        end_date: experience.end_date,
        is_current: experience.is_current,
        bullets,
    })
}

/// Builds the resume and its score breakdown. The resume comes out `Generated`.
pub fn assemble(
    input: &AssemblyInput<'_>,
    meta: ResumeMeta,
    weights: &MatchScoreWeights,
) -> (Resume, MatchScoreBreakdown) {
    let sections: Vec<ExperienceSection> = input
        .experiences
        .iter()
        .filter_map(|e| section_for(e, input.selection, input.rewrites))
        .collect();

    let skills = input
        .skills
        .matches
        .iter()
        .map(|m| SkillEntry {
            name: m.skill.name.clone(),
            category: m.skill.category.clone(),
            proficiency: m.skill.proficiency,
            highlighted: m.skill.highlighted,
        })
        .collect();

    let content = ResumeContent {
        contact: ContactBlock::from(input.profile),
        sections,
        skills,
    };

    let selected_bullet_ids: Vec<Uuid> = content
        .sections
        .iter()
        .flat_map(|s| s.bullets.iter().map(|b| b.bullet_id))
        .collect();

    let selected: Vec<ScoredBullet> = input
        .selection
        .picks
        .iter()
        .map(|pick| {
            input
                .scores
                .get(&pick.bullet_id)
                .cloned()
                .unwrap_or_else(|| ScoredBullet {
                    bullet_id: pick.bullet_id,
                    experience_id: pick.experience_id,
                    relevance: pick.relevance,
                    matched_keywords: BTreeSet::new(),
                })
        })
        .collect();

    let breakdown = compute_match_score(
        &selected,
        &content.rendered_texts(),
        input.skills,
        input.terms,
        weights,
    );

    let resume = Resume {
        id: meta.id,
        user_id: meta.user_id,
        job: input.job.clone(),
        target_language: meta.target_language,
        selected_bullet_ids,
        content,
        match_score: breakdown.score,
        status: ResumeStatus::Generated,
        created_at: meta.created_at,
        updated_at: meta.updated_at,
    };

    (resume, breakdown)
}
