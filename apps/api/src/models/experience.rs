use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceType {
    Work,
    Education,
    Certification,
    Project,
    Freelance,
    Volunteer,
    OpenSource,
    Hackathon,
    SideProject,
    EventOrganization,
    Publication,
    Award,
}

impl ExperienceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExperienceType::Work => "work",
            ExperienceType::Education => "education",
            ExperienceType::Certification => "certification",
            ExperienceType::Project => "project",
            ExperienceType::Freelance => "freelance",
            ExperienceType::Volunteer => "volunteer",
            ExperienceType::OpenSource => "open_source",
            ExperienceType::Hackathon => "hackathon",
            ExperienceType::SideProject => "side_project",
            ExperienceType::EventOrganization => "event_organization",
            ExperienceType::Publication => "publication",
            ExperienceType::Award => "award",
        }
    }

    /// Parses the snake_case storage form. Returns `None` for unknown values.
    pub fn parse(value: &str) -> Option<Self> {
        let kind = match value {
            "work" => ExperienceType::Work,
            "education" => ExperienceType::Education,
            "certification" => ExperienceType::Certification,
            "project" => ExperienceType::Project,
            "freelance" => ExperienceType::Freelance,
            "volunteer" => ExperienceType::Volunteer,
            "open_source" => ExperienceType::OpenSource,
            "hackathon" => ExperienceType::Hackathon,
            "side_project" => ExperienceType::SideProject,
            "event_organization" => ExperienceType::EventOrganization,
            "publication" => ExperienceType::Publication,
            "award" => ExperienceType::Award,
            _ => return None,
        };
        Some(kind)
    }
}

/// An atomic achievement statement. The tailoring engine only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bullet {
    pub id: Uuid,
    pub experience_id: Uuid,
    pub content: String,
    /// 0 – 100, opaque to the engine regardless of who assigned it.
    pub impact_score: f64,
    pub keywords: Vec<String>,
    pub display_order: i32,
}

impl Bullet {
    /// Selection cost: rendered length in characters.
    pub fn cost(&self) -> usize {
        self.content.trim().chars().count()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Experience {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: ExperienceType,
    pub title: String,
    pub organization: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub is_current: bool,
    pub bullets: Vec<Bullet>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    pub name: String,
    pub category: String,
    /// 0 – 100
    pub proficiency: u8,
    pub highlighted: bool,
}

/// Contact block source for the assembled resume.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Profile {
    pub user_id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub links: Vec<String>,
    pub headline: Option<String>,
}

/// Everything the engine reads for one user, as returned by the profile repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Corpus {
    pub profile: Profile,
    pub experiences: Vec<Experience>,
    pub skills: Vec<Skill>,
}

impl Corpus {
    pub fn bullet_count(&self) -> usize {
        self.experiences.iter().map(|e| e.bullets.len()).sum()
    }

    pub fn find_bullet(&self, bullet_id: Uuid) -> Option<(&Experience, &Bullet)> {
        self.experiences.iter().find_map(|experience| {
            experience
                .bullets
                .iter()
                .find(|b| b.id == bullet_id)
                .map(|b| (experience, b))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experience_type_round_trips_storage_form() {
        for kind in [
            ExperienceType::Work,
            ExperienceType::OpenSource,
            ExperienceType::SideProject,
            ExperienceType::EventOrganization,
        ] {
            assert_eq!(ExperienceType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ExperienceType::parse("internship"), None);
    }

    #[test]
    fn test_experience_type_serde_is_snake_case() {
        let json = serde_json::to_string(&ExperienceType::OpenSource).unwrap();
        assert_eq!(json, r#""open_source""#);
    }

    #[test]
    fn test_bullet_cost_counts_trimmed_chars() {
        let bullet = Bullet {
            id: Uuid::new_v4(),
            experience_id: Uuid::new_v4(),
            content: "  Cut p99 latency by 40%  ".to_string(),
            impact_score: 80.0,
            keywords: vec![],
            display_order: 0,
        };
        assert_eq!(bullet.cost(), "Cut p99 latency by 40%".len());
    }
}
