//! Keyword/Skill Matcher — pure token overlap between a job description and the
//! user's corpus. No LLM calls, no allocation beyond the token sets.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::experience::{Bullet, Skill};
use crate::models::job::JobSpec;

/// Required keywords fall back to this many top JD terms when none are given.
const REQUIRED_FALLBACK_COUNT: usize = 10;

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "also", "an", "and", "any", "are", "as", "at", "be", "been", "but",
    "by", "can", "do", "for", "from", "has", "have", "how", "in", "into", "is", "it", "its",
    "job", "join", "more", "must", "new", "of", "on", "or", "our", "role", "should", "so",
    "such", "team", "than", "that", "the", "their", "them", "they", "this", "to", "us", "using",
    "was", "we", "were", "what", "when", "which", "who", "will", "with", "work", "you", "your",
];

/// Lowercases and splits on anything that is not alphanumeric or `+ # .`
/// (so `c++`, `c#` and `node.js` survive). Drops stopwords and 1-char tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '+' || c == '#' || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| t.chars().count() >= 2 && !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

pub fn token_set(text: &str) -> BTreeSet<String> {
    tokenize(text).into_iter().collect()
}

/// Keyword and content tokens of a bullet.
pub fn bullet_terms(bullet: &Bullet) -> BTreeSet<String> {
    let mut terms = token_set(&bullet.content);
    for keyword in &bullet.keywords {
        terms.extend(tokenize(keyword));
    }
    terms
}

/// A phrase is covered when every one of its tokens is present.
pub fn phrase_covered(phrase: &str, tokens: &BTreeSet<String>) -> bool {
    let phrase_tokens = tokenize(phrase);
    !phrase_tokens.is_empty() && phrase_tokens.iter().all(|t| tokens.contains(t))
}

/// Token view of a job description, computed once per tailoring run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobTerms {
    /// Every distinct JD token; used for match detection.
    pub tokens: BTreeSet<String>,
    /// Normalization set for relevance: required-skill tokens plus the most
    /// frequent JD tokens, capped at `max_job_keywords`.
    pub vocabulary: BTreeSet<String>,
    /// Required keyword phrases, lowercase.
    pub required: Vec<String>,
}

impl JobTerms {
    pub fn from_job(job: &JobSpec, max_job_keywords: usize) -> Self {
        if job.is_blank() {
            return Self::default();
        }

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for token in tokenize(&job.description) {
            *counts.entry(token).or_insert(0) += 1;
        }
        if let Some(title) = &job.title {
            for token in tokenize(title) {
                *counts.entry(token).or_insert(0) += 1;
            }
        }

        // Most frequent first; alphabetical among equals.
        let mut ranked: Vec<(&String, &usize)> = counts.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

        let mut required: Vec<String> = Vec::new();
        for skill in &job.required_skills {
            let normalized = tokenize(skill).join(" ");
            if !normalized.is_empty() && !required.contains(&normalized) {
                required.push(normalized);
            }
        }

        let mut vocabulary: BTreeSet<String> = required
            .iter()
            .flat_map(|phrase| tokenize(phrase))
            .collect();
        for (token, _) in &ranked {
            if vocabulary.len() >= max_job_keywords {
                break;
            }
            vocabulary.insert((*token).clone());
        }

        if required.is_empty() {
            required = ranked
                .iter()
                .take(REQUIRED_FALLBACK_COUNT)
                .map(|(token, _)| (*token).clone())
                .collect();
        }

        let mut tokens: BTreeSet<String> = counts.into_keys().collect();
        tokens.extend(vocabulary.iter().cloned());

        Self {
            tokens,
            vocabulary,
            required,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vocabulary.is_empty()
    }

    /// Bullet terms that also appear in the job description.
    pub fn matched_keywords(&self, bullet_terms: &BTreeSet<String>) -> BTreeSet<String> {
        bullet_terms.intersection(&self.tokens).cloned().collect()
    }

    /// Fraction of required phrases covered by `tokens`; 0.0 when nothing is required.
    pub fn required_coverage(&self, tokens: &BTreeSet<String>) -> f64 {
        if self.required.is_empty() {
            return 0.0;
        }
        let covered = self
            .required
            .iter()
            .filter(|phrase| phrase_covered(phrase, tokens))
            .count();
        covered as f64 / self.required.len() as f64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillMatch {
    pub skill: Skill,
    pub matched_terms: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SkillMatchSummary {
    /// Ranked: proficiency desc, highlighted first, then name.
    pub matches: Vec<SkillMatch>,
    /// Fraction of required keywords covered by matched skills.
    pub coverage: f64,
}

/// Finds skills whose name or category token-overlaps the job description.
pub fn match_skills(skills: &[Skill], terms: &JobTerms) -> SkillMatchSummary {
    let mut matches: Vec<SkillMatch> = skills
        .iter()
        .filter_map(|skill| {
            let mut skill_tokens = token_set(&skill.name);
            skill_tokens.extend(tokenize(&skill.category));
            let matched: Vec<String> = skill_tokens.intersection(&terms.tokens).cloned().collect();
            if matched.is_empty() {
                None
            } else {
                Some(SkillMatch {
                    skill: skill.clone(),
                    matched_terms: matched,
                })
            }
        })
        .collect();

    matches.sort_by(|a, b| {
        b.skill
            .proficiency
            .cmp(&a.skill.proficiency)
            .then_with(|| b.skill.highlighted.cmp(&a.skill.highlighted))
            .then_with(|| a.skill.name.cmp(&b.skill.name))
    });

    let mut covered_tokens = BTreeSet::new();
    for m in &matches {
        covered_tokens.extend(tokenize(&m.skill.name));
        covered_tokens.extend(tokenize(&m.skill.category));
    }
    let coverage = terms.required_coverage(&covered_tokens);

    SkillMatchSummary { matches, coverage }
}
