use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::experience::{ExperienceType, Profile};
use crate::models::job::JobSpec;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResumeStatus {
    #[default]
    Draft,
    Generated,
    Reviewed,
    Submitted,
    Interview,
    Rejected,
    Accepted,
}

impl ResumeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResumeStatus::Draft => "draft",
            ResumeStatus::Generated => "generated",
            ResumeStatus::Reviewed => "reviewed",
            ResumeStatus::Submitted => "submitted",
            ResumeStatus::Interview => "interview",
            ResumeStatus::Rejected => "rejected",
            ResumeStatus::Accepted => "accepted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let status = match value {
            "draft" => ResumeStatus::Draft,
            "generated" => ResumeStatus::Generated,
            "reviewed" => ResumeStatus::Reviewed,
            "submitted" => ResumeStatus::Submitted,
            "interview" => ResumeStatus::Interview,
            "rejected" => ResumeStatus::Rejected,
            "accepted" => ResumeStatus::Accepted,
            _ => return None,
        };
        Some(status)
    }

    /// Allowed lifecycle moves. Regenerating sends an unsubmitted resume back to draft.
    pub fn can_transition_to(&self, next: ResumeStatus) -> bool {
        use ResumeStatus::*;
        matches!(
            (self, next),
            (Draft, Generated)
                | (Generated, Reviewed)
                | (Generated, Draft)
                | (Reviewed, Draft)
                | (Reviewed, Submitted)
                | (Submitted, Interview)
                | (Submitted, Rejected)
                | (Interview, Rejected)
                | (Interview, Accepted)
        )
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactBlock {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub links: Vec<String>,
    pub headline: Option<String>,
}

impl From<&Profile> for ContactBlock {
    fn from(profile: &Profile) -> Self {
        Self {
            full_name: profile.full_name.clone(),
            email: profile.email.clone(),
            phone: profile.phone.clone(),
            location: profile.location.clone(),
            links: profile.links.clone(),
            headline: profile.headline.clone(),
        }
    }
}

/// A bullet as it appears in the rendered resume.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResumeBullet {
    pub bullet_id: Uuid,
    pub text: String,
    pub rewritten: bool,
    /// The rewrite fell back to the original text after a provider failure.
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperienceSection {
    pub experience_id: Uuid,
    pub kind: ExperienceType,
    pub title: String,
    pub organization: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_current: bool,
    pub bullets: Vec<ResumeBullet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillEntry {
    pub name: String,
    pub category: String,
    pub proficiency: u8,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResumeContent {
    pub contact: ContactBlock,
    pub sections: Vec<ExperienceSection>,
    pub skills: Vec<SkillEntry>,
}

impl ResumeContent {
    /// Final bullet text in resume order.
    pub fn rendered_texts(&self) -> Vec<&str> {
        self.sections
            .iter()
            .flat_map(|s| s.bullets.iter().map(|b| b.text.as_str()))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resume {
    pub id: Uuid,
    pub user_id: Uuid,
    /// The job this resume was tailored to; kept so it can be re-scored or regenerated.
    pub job: JobSpec,
    pub target_language: String,
    pub selected_bullet_ids: Vec<Uuid>,
    pub content: ResumeContent,
    /// 0 – 100
    pub match_score: u8,
    pub status: ResumeStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_default_is_draft() {
        assert_eq!(ResumeStatus::default(), ResumeStatus::Draft);
    }

    #[test]
    fn test_status_happy_path_transitions() {
        use ResumeStatus::*;
        let path = [Draft, Generated, Reviewed, Submitted, Interview, Accepted];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_status_rejects_skipping_and_reopening() {
        use ResumeStatus::*;
        assert!(!Draft.can_transition_to(Submitted));
        assert!(!Accepted.can_transition_to(Draft));
        assert!(!Submitted.can_transition_to(Draft));
        assert!(Submitted.can_transition_to(Rejected));
    }

    #[test]
    fn test_status_parse_matches_as_str() {
        for status in [ResumeStatus::Draft, ResumeStatus::Interview, ResumeStatus::Accepted] {
            assert_eq!(ResumeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ResumeStatus::parse("archived"), None);
    }
}
