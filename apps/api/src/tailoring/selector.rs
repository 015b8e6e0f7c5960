//! Bullet Selector — picks the subset of bullets that goes on the resume.
//!
//! Multi-knapsack variant: each experience is a group, a bullet costs its rendered
//! length in characters and is worth its relevance. Greedy by value density with an
//! experience-level floor. Any other solver (e.g. a DP over the groups) only has to
//! honor the same [`select`] contract.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::experience::{Bullet, Experience};
use crate::tailoring::scorer::ScoredBullet;

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionBudget {
    pub max_bullets_per_experience: usize,
    pub max_chars_per_experience: usize,
    pub max_total_chars: usize,
}

impl Default for SelectionBudget {
    fn default() -> Self {
        Self {
            max_bullets_per_experience: 4,
            max_chars_per_experience: 900,
            max_total_chars: 4000,
        }
    }
}

impl SelectionBudget {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_bullets_per_experience == 0
            || self.max_chars_per_experience == 0
            || self.max_total_chars == 0
        {
            return Err(AppError::Validation(
                "Selection budget limits must all be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelectedBullet {
    pub bullet_id: Uuid,
    pub experience_id: Uuid,
    pub relevance: f64,
    pub cost: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    /// Grouped by experience in input order; value-density order within a group.
    pub picks: Vec<SelectedBullet>,
    pub excluded: Vec<(Uuid, String)>, // (bullet_id, reason)
    pub total_chars: usize,
}

impl Selection {
    pub fn bullet_ids(&self) -> Vec<Uuid> {
        self.picks.iter().map(|p| p.bullet_id).collect()
    }

    pub fn picks_for(&self, experience_id: Uuid) -> impl Iterator<Item = &SelectedBullet> {
        self.picks
            .iter()
            .filter(move |p| p.experience_id == experience_id)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Selection algorithm
// ────────────────────────────────────────────────────────────────────────────

struct Candidate<'a> {
    experience_index: usize,
    experience_id: Uuid,
    bullet: &'a Bullet,
    relevance: f64,
    cost: usize,
}

impl Candidate<'_> {
    fn density(&self) -> f64 {
        self.relevance / self.cost.max(1) as f64
    }
}

/// Density desc, then relevance, raw impact, display order; input position last.
fn rank_order(a: &Candidate<'_>, b: &Candidate<'_>) -> Ordering {
    b.density()
        .total_cmp(&a.density())
        .then_with(|| b.relevance.total_cmp(&a.relevance))
        .then_with(|| b.bullet.impact_score.total_cmp(&a.bullet.impact_score))
        .then_with(|| a.bullet.display_order.cmp(&b.bullet.display_order))
        .then_with(|| a.experience_index.cmp(&b.experience_index))
        .then_with(|| a.bullet.id.cmp(&b.bullet.id))
}

/// Running per-experience and total usage while filling.
struct Usage<'b> {
    budget: &'b SelectionBudget,
    counts: Vec<usize>,
    chars: Vec<usize>,
    total_chars: usize,
}

impl<'b> Usage<'b> {
    fn new(budget: &'b SelectionBudget, groups: usize) -> Self {
        Self {
            budget,
            counts: vec![0; groups],
            chars: vec![0; groups],
            total_chars: 0,
        }
    }

    fn check(&self, c: &Candidate<'_>) -> Result<(), String> {
        let i = c.experience_index;
        if self.counts[i] >= self.budget.max_bullets_per_experience {
            return Err(format!(
                "Per-experience cap reached ({} max)",
                self.budget.max_bullets_per_experience
            ));
        }
        if self.chars[i] + c.cost > self.budget.max_chars_per_experience {
            return Err(format!(
                "Experience length budget exceeded ({} chars max)",
                self.budget.max_chars_per_experience
            ));
        }
        if self.total_chars + c.cost > self.budget.max_total_chars {
            return Err(format!(
                "Total length budget exceeded ({} chars max)",
                self.budget.max_total_chars
            ));
        }
        Ok(())
    }

    fn take(&mut self, c: &Candidate<'_>) {
        self.counts[c.experience_index] += 1;
        self.chars[c.experience_index] += c.cost;
        self.total_chars += c.cost;
    }
}

/// Selects bullets under the per-experience and total budgets.
///
/// Algorithm:
/// 1. Drop bullets that could never fit (longer than either char budget)
/// 2. Rank the rest by value density (relevance per char), ties broken by
///    relevance, raw impact, then display order
/// 3. Floor pass: the best-ranked positive bullet of every experience that still
///    leaves room for the other experiences' cheapest positive bullets
/// 4. Fill pass: remaining positive bullets in global rank order
/// 5. Zero-relevance bullets are only used when nothing else was selected
///
/// Errors with `Validation` when there are no bullets at all and with
/// `Selection` when every bullet alone exceeds the budget.
pub fn select(
    experiences: &[Experience],
    scores: &HashMap<Uuid, ScoredBullet>,
    budget: &SelectionBudget,
) -> Result<Selection, AppError> {
    budget.validate()?;

    let item_limit = budget
        .max_chars_per_experience
        .min(budget.max_total_chars);
    let mut excluded = Vec::new();
    let mut candidates = Vec::new();
    let mut bullet_count = 0usize;

    for (experience_index, experience) in experiences.iter().enumerate() {
        for bullet in &experience.bullets {
            bullet_count += 1;
            let cost = bullet.cost();
            if cost > item_limit {
                excluded.push((
                    bullet.id,
                    format!("Bullet length {cost} exceeds budget ({item_limit} chars max)"),
                ));
                continue;
            }
            candidates.push(Candidate {
                experience_index,
                experience_id: experience.id,
                bullet,
                relevance: scores.get(&bullet.id).map(|s| s.relevance).unwrap_or(0.0),
                cost,
            });
        }
    }

    if bullet_count == 0 {
        return Err(AppError::Validation(
            "No bullets available for selection".to_string(),
        ));
    }
    if candidates.is_empty() {
        return Err(AppError::Selection(format!(
            "Every bullet exceeds the length budget ({item_limit} chars max)"
        )));
    }

    candidates.sort_by(rank_order);

    let mut usage = Usage::new(budget, experiences.len());
    let mut picked = vec![false; candidates.len()];

    // Floor. A pick must leave room for the cheapest positive bullet of every
    // experience still waiting for its floor; otherwise a cheaper bullet of the
    // same experience is tried further down the ranking.
    let mut cheapest: Vec<Option<usize>> = vec![None; experiences.len()];
    for c in candidates.iter().filter(|c| c.relevance > 0.0) {
        let slot = &mut cheapest[c.experience_index];
        *slot = Some(slot.map_or(c.cost, |cost| cost.min(c.cost)));
    }
    let mut has_pick = vec![false; experiences.len()];
    for (rank, c) in candidates.iter().enumerate() {
        if c.relevance <= 0.0 || has_pick[c.experience_index] {
            continue;
        }
        let reserve: usize = cheapest
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != c.experience_index && !has_pick[*i])
            .filter_map(|(_, cost)| *cost)
            .sum();
        if usage.check(c).is_ok() && usage.total_chars + c.cost + reserve <= budget.max_total_chars {
            usage.take(c);
            picked[rank] = true;
            has_pick[c.experience_index] = true;
        }
    }
    // Reserve unsatisfiable: best effort for whoever is still uncovered.
    for (rank, c) in candidates.iter().enumerate() {
        if c.relevance <= 0.0 || has_pick[c.experience_index] {
            continue;
        }
        if usage.check(c).is_ok() {
            usage.take(c);
            picked[rank] = true;
            has_pick[c.experience_index] = true;
        }
    }

    // Fill
    let mut zero_relevance = Vec::new();
    for (rank, c) in candidates.iter().enumerate() {
        if picked[rank] {
            continue;
        }
        if c.relevance <= 0.0 {
            zero_relevance.push(rank);
            continue;
        }
        match usage.check(c) {
            Ok(()) => {
                usage.take(c);
                picked[rank] = true;
            }
            Err(reason) => excluded.push((c.bullet.id, reason)),
        }
    }

    let use_zero_relevance = !picked.iter().any(|p| *p);
    for rank in zero_relevance {
        let c = &candidates[rank];
        if !use_zero_relevance {
            excluded.push((c.bullet.id, "Zero relevance to the job description".to_string()));
            continue;
        }
        match usage.check(c) {
            Ok(()) => {
                usage.take(c);
                picked[rank] = true;
            }
            Err(reason) => excluded.push((c.bullet.id, reason)),
        }
    }

    let mut order: Vec<(usize, usize)> = picked
        .iter()
        .enumerate()
        .filter(|(_, p)| **p)
        .map(|(rank, _)| (candidates[rank].experience_index, rank))
        .collect();
    order.sort_unstable();

    let picks = order
        .into_iter()
        .map(|(_, rank)| {
            let c = &candidates[rank];
            SelectedBullet {
                bullet_id: c.bullet.id,
                experience_id: c.experience_id,
                relevance: c.relevance,
                cost: c.cost,
            }
        })
        .collect();

    Ok(Selection {
        picks,
        excluded,
        total_chars: usage.total_chars,
    })
}
