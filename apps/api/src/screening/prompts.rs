// Prompt constants for candidate evaluation.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{EVIDENCE_INSTRUCTION, JSON_ONLY_SYSTEM};
use crate::models::screening::JobCriteria;

/// Role half of the evaluation system prompt; `evaluation_system()` appends the JSON-only rules.
const EVALUATION_ROLE: &str = "You are a senior technical recruiter screening CVs \
    against a job specification. You are objective, concise and consistent.";

/// Evaluation prompt template.
/// Replace: {evidence_instruction}, {position}, {must_have}, {nice_to_have}, {cv_text}
pub const EVALUATION_PROMPT_TEMPLATE: &str = r#"{evidence_instruction}

POSITION: {position}

MUST-HAVE SKILLS (JSON array):
{must_have}

NICE-TO-HAVE SKILLS (JSON array):
{nice_to_have}

Evaluate the candidate below and return a JSON object with this EXACT schema (no extra fields):
{
  "full_name": "Jane Doe",
  "email": "jane@example.com",
  "education": "MSc Computer Science, TU Delft",
  "experience_summary": "6 years building payment backends in Rust and Go",
  "years_of_experience": 6,
  "skills": {
    "must_have_matched": ["Rust"],
    "must_have_missing": ["Kubernetes"],
    "nice_to_have_matched": ["Kafka"]
  },
  "confidence": 0.82,
  "recommendation": "ACCEPT",
  "justification": "One paragraph explaining the recommendation"
}

HARD RULES:
1. Skill names MUST be copied exactly from the lists above; every must-have skill appears in exactly one of must_have_matched / must_have_missing
2. "confidence" is a number between 0 and 1
3. "recommendation" is one of "ACCEPT", "REVIEW", "REJECT"
4. "email" and "years_of_experience" may be null when the CV does not state them

CANDIDATE CV:
{cv_text}"#;

pub fn evaluation_system() -> String {
    format!("{EVALUATION_ROLE} {JSON_ONLY_SYSTEM}")
}

pub fn build_evaluation_prompt(cv_text: &str, criteria: &JobCriteria) -> String {
    let to_json = |skills: &[String]| serde_json::to_string(skills).unwrap_or_else(|_| "[]".into());
    let must_have = to_json(&criteria.must_have);
    let nice_to_have = to_json(&criteria.nice_to_have);
    fill_template(
        EVALUATION_PROMPT_TEMPLATE,
        &[
            ("{evidence_instruction}", EVIDENCE_INSTRUCTION),
            ("{position}", &criteria.position),
            ("{must_have}", &must_have),
            ("{nice_to_have}", &nice_to_have),
            ("{cv_text}", cv_text),
        ],
    )
}

/// Single pass over `template`: substituted values are never scanned again,
/// so user text that looks like a placeholder stays literal.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        rest = &rest[start..];
        match values.iter().find(|(key, _)| rest.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &rest[key.len()..];
            }
            None => {
                out.push('{');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}
