use serde::{Deserialize, Serialize};

/// The job a batch of candidates is screened against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCriteria {
    pub position: String,
    #[serde(default)]
    pub must_have: Vec<String>,
    #[serde(default)]
    pub nice_to_have: Vec<String>,
}

impl JobCriteria {
    /// Trims every field and drops blank or repeated skills (case-insensitive),
    /// keeping the first spelling in its original position.
    pub fn normalized(self) -> Result<Self, String> {
        let position = self.position.trim().to_string();
        if position.is_empty() {
            return Err("position cannot be empty".to_string());
        }

        let must_have = dedup_skills(self.must_have);
        let nice_to_have = dedup_skills(self.nice_to_have)
            .into_iter()
            .filter(|s| !contains_skill(&must_have, s))
            .collect();

        Ok(Self {
            position,
            must_have,
            nice_to_have,
        })
    }
}

fn dedup_skills(skills: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(skills.len());
    for skill in skills {
        let skill = skill.trim().to_string();
        if skill.is_empty() || contains_skill(&out, &skill) {
            continue;
        }
        out.push(skill);
    }
    out
}

/// Case-insensitive membership test used for skill sets.
pub fn contains_skill(set: &[String], skill: &str) -> bool {
    let needle = skill.trim().to_lowercase();
    set.iter().any(|s| s.to_lowercase() == needle)
}

/// Hiring recommendation for one candidate.
///
/// `Unscored` is reserved for candidates whose evaluation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Accept,
    Review,
    Reject,
    Unscored,
}

impl Recommendation {
    pub fn label(self) -> &'static str {
        match self {
            Recommendation::Accept => "ACCEPT",
            Recommendation::Review => "REVIEW",
            Recommendation::Reject => "REJECT",
            Recommendation::Unscored => "UNSCORED",
        }
    }
}

/// How a candidate's skills line up against the job's two skill sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillsMatch {
    pub must_have_matched: Vec<String>,
    pub must_have_missing: Vec<String>,
    pub nice_to_have_matched: Vec<String>,
    /// matched / requested, 1.0 when nothing was requested
    pub must_have_match: f64,
    pub nice_to_have_match: f64,
}

/// The structured verdict for one candidate, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub candidate_id: String,
    pub filename: String,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub education: Option<String>,
    pub experience_summary: Option<String>,
    pub years_of_experience: Option<f64>,
    pub skills: SkillsMatch,
    /// 0.0 – 1.0
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub justification: Option<String>,
    /// Set when the candidate could not be evaluated; the verdict fields are then empty.
    pub failure: Option<String>,
}

impl CandidateEvaluation {
    /// A recorded per-candidate failure. Keeps the candidate's slot in the result.
    pub fn failed(candidate_id: &str, filename: &str, reason: impl Into<String>) -> Self {
        Self {
            candidate_id: candidate_id.to_string(),
            filename: filename.to_string(),
            full_name: None,
            email: None,
            education: None,
            experience_summary: None,
            years_of_experience: None,
            skills: SkillsMatch::default(),
            confidence: 0.0,
            recommendation: Recommendation::Unscored,
            justification: None,
            failure: Some(reason.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn criteria(position: &str, must: &[&str], nice: &[&str]) -> JobCriteria {
        JobCriteria {
            position: position.to_string(),
            must_have: must.iter().map(|s| s.to_string()).collect(),
            nice_to_have: nice.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalized_trims_and_dedups_preserving_order() {
        let c = criteria(" Backend Engineer ", &["Rust", " rust", "", "SQL"], &["Kafka", "sql"])
            .normalized()
            .unwrap();
        assert_eq!(c.position, "Backend Engineer");
        assert_eq!(c.must_have, vec!["Rust", "SQL"]);
        // skills already required are not repeated as preferred
        assert_eq!(c.nice_to_have, vec!["Kafka"]);
    }

    #[test]
    fn test_normalized_rejects_blank_position() {
        assert!(criteria("   ", &["Rust"], &[]).normalized().is_err());
    }

    #[test]
    fn test_criteria_defaults_missing_skill_lists() {
        let c: JobCriteria = serde_json::from_str(r#"{"position": "QA"}"#).unwrap();
        assert!(c.must_have.is_empty());
        assert!(c.nice_to_have.is_empty());
    }

    #[test]
    fn test_recommendation_serde_uppercase() {
        let r: Recommendation = serde_json::from_str(r#""REVIEW""#).unwrap();
        assert_eq!(r, Recommendation::Review);
        assert_eq!(
            serde_json::to_string(&Recommendation::Unscored).unwrap(),
            r#""UNSCORED""#
        );
    }

    #[test]
    fn test_failed_evaluation_has_zero_confidence() {
        let e = CandidateEvaluation::failed("jane", "jane.pdf", "boom");
        assert!(e.is_failure());
        assert_eq!(e.confidence, 0.0);
        assert_eq!(e.recommendation, Recommendation::Unscored);
    }
}
