//! Evaluation Client — scores one candidate document against the job criteria.
//!
//! Every call ends in one of three ways:
//! - a validated verdict (`CandidateEvaluation` without a failure marker),
//! - a recorded failure (transient errors exhausted the attempt budget, or the
//!   document had no usable text), which keeps the candidate in the report,
//! - an `EvaluationError` escalation, for rejections that would repeat on every
//!   remaining candidate. The orchestrator fails the whole task on these.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::llm_client::{strip_json_fences, CompletionBackend, LlmError};
use crate::models::screening::{
    contains_skill, CandidateEvaluation, JobCriteria, Recommendation, SkillsMatch,
};
use crate::screening::extract::CandidateDocument;
use crate::screening::prompts::{build_evaluation_prompt, evaluation_system};

/// Non-retryable rejection from the evaluation service.
#[derive(Debug, Error)]
#[error("Evaluation service rejected the request: {0}")]
pub struct EvaluationError(#[source] pub LlmError);

/// The model answered, but not with a verdict we can accept.
#[derive(Debug, Error, PartialEq)]
pub enum VerdictError {
    #[error("response is not valid verdict JSON: {0}")]
    Malformed(String),

    #[error("confidence {0} is outside [0, 1]")]
    ConfidenceOutOfRange(f64),

    #[error("years_of_experience {0} is negative")]
    NegativeExperience(f64),

    #[error("skill {skill:?} is not one of the job's {set} skills")]
    UnknownSkill { skill: String, set: &'static str },

    #[error("recommendation UNSCORED is not a valid verdict")]
    UnscoredVerdict,

    #[error("justification is empty")]
    EmptyJustification,

    #[error("must-have skill {0:?} is listed as both matched and missing")]
    ContradictorySkill(String),
}

/// Attempt budget and backoff for one candidate.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first call. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each attempt after that.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    /// Backoff before attempt `attempt` (0-based): 0, base, 2·base, 4·base, ...
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    full_name: String,
    email: Option<String>,
    education: String,
    experience_summary: String,
    years_of_experience: Option<f64>,
    skills: RawSkills,
    confidence: f64,
    recommendation: Recommendation,
    justification: String,
}

#[derive(Debug, Deserialize)]
struct RawSkills {
    must_have_matched: Vec<String>,
    must_have_missing: Vec<String>,
    #[serde(default)]
    nice_to_have_matched: Vec<String>,
}

/// Parses and validates the model's reply into the fixed evaluation schema.
pub fn parse_verdict(
    text: &str,
    document: &CandidateDocument,
    criteria: &JobCriteria,
) -> Result<CandidateEvaluation, VerdictError> {
    let raw: RawVerdict = serde_json::from_str(strip_json_fences(text))
        .map_err(|e| VerdictError::Malformed(e.to_string()))?;

    if !(0.0..=1.0).contains(&raw.confidence) {
        return Err(VerdictError::ConfidenceOutOfRange(raw.confidence));
    }
    if let Some(years) = raw.years_of_experience {
        if !years.is_finite() || years < 0.0 {
            return Err(VerdictError::NegativeExperience(years));
        }
    }
    if raw.recommendation == Recommendation::Unscored {
        return Err(VerdictError::UnscoredVerdict);
    }
    if raw.justification.trim().is_empty() {
        return Err(VerdictError::EmptyJustification);
    }

    let must_have_matched =
        checked_skills(raw.skills.must_have_matched, &criteria.must_have, "must-have")?;
    let must_have_missing =
        checked_skills(raw.skills.must_have_missing, &criteria.must_have, "must-have")?;
    if let Some(both) = must_have_matched
        .iter()
        .find(|s| contains_skill(&must_have_missing, s))
    {
        return Err(VerdictError::ContradictorySkill(both.clone()));
    }
    let nice_to_have_matched = checked_skills(
        raw.skills.nice_to_have_matched,
        &criteria.nice_to_have,
        "nice-to-have",
    )?;

    let skills = SkillsMatch {
        must_have_match: match_ratio(must_have_matched.len(), criteria.must_have.len()),
        nice_to_have_match: match_ratio(nice_to_have_matched.len(), criteria.nice_to_have.len()),
        must_have_matched,
        must_have_missing,
        nice_to_have_matched,
    };

    Ok(CandidateEvaluation {
        candidate_id: document.candidate_id.clone(),
        filename: document.filename.clone(),
        full_name: non_blank(raw.full_name),
        email: raw.email.and_then(non_blank),
        education: non_blank(raw.education),
        experience_summary: non_blank(raw.experience_summary),
        years_of_experience: raw.years_of_experience,
        skills,
        confidence: raw.confidence,
        recommendation: raw.recommendation,
        justification: Some(raw.justification.trim().to_string()),
        failure: None,
    })
}

/// Keeps the job's own spelling of each skill and drops repeats.
fn checked_skills(
    listed: Vec<String>,
    allowed: &[String],
    set: &'static str,
) -> Result<Vec<String>, VerdictError> {
    let mut out: Vec<String> = Vec::with_capacity(listed.len());
    for skill in listed {
        let needle = skill.trim().to_lowercase();
        let canonical = allowed
            .iter()
            .find(|a| a.to_lowercase() == needle)
            .ok_or_else(|| VerdictError::UnknownSkill {
                skill: skill.clone(),
                set,
            })?;
        if !contains_skill(&out, canonical) {
            out.push(canonical.clone());
        }
    }
    Ok(out)
}

fn match_ratio(matched: usize, requested: usize) -> f64 {
    if requested == 0 {
        1.0
    } else {
        (matched as f64 / requested as f64).clamp(0.0, 1.0)
    }
}

fn non_blank(s: String) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Characters of CV text sent per evaluation unless configured otherwise.
pub const DEFAULT_MAX_DOCUMENT_CHARS: usize = 100_000;

/// Evaluates candidates through a `CompletionBackend` with retry and backoff.
#[derive(Clone)]
pub struct CandidateEvaluator {
    backend: Arc<dyn CompletionBackend>,
    retry: RetryPolicy,
    max_document_chars: usize,
}

impl CandidateEvaluator {
    pub fn new(backend: Arc<dyn CompletionBackend>, retry: RetryPolicy) -> Self {
        Self {
            backend,
            retry,
            max_document_chars: DEFAULT_MAX_DOCUMENT_CHARS,
        }
    }

    pub fn with_max_document_chars(mut self, max_document_chars: usize) -> Self {
        self.max_document_chars = max_document_chars;
        self
    }

    /// Produces the evaluation for one document. Only non-retryable service
    /// rejections are returned as `Err`; every other failure is recorded.
    pub async fn evaluate(
        &self,
        document: &CandidateDocument,
        criteria: &JobCriteria,
    ) -> Result<CandidateEvaluation, EvaluationError> {
        let text = match &document.text {
            Ok(text) => text,
            Err(failure) => {
                return Ok(CandidateEvaluation::failed(
                    &document.candidate_id,
                    &document.filename,
                    failure.to_string(),
                ));
            }
        };

        let text = truncate_chars(text, self.max_document_chars);
        if text.len() < document.text.as_ref().map_or(0, String::len) {
            info!(
                "Evaluation of {}: CV text truncated to {} characters",
                document.candidate_id, self.max_document_chars
            );
        }

        let system = evaluation_system();
        let prompt = build_evaluation_prompt(text, criteria);
        let attempts = self.retry.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = self.retry.delay_before(attempt);
                warn!(
                    "Evaluation of {} attempt {} failed ({}), retrying after {}ms...",
                    document.candidate_id,
                    attempt,
                    last_error,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
            }

            match self.backend.complete(&system, &prompt).await {
                Ok(reply) => match parse_verdict(&reply, document, criteria) {
                    Ok(evaluation) => return Ok(evaluation),
                    Err(e) => last_error = e.to_string(),
                },
                Err(e) if e.is_request_too_large() => {
                    // Specific to this document; the rest of the batch is unaffected.
                    warn!(
                        "Evaluation of {} rejected as too large: {e}",
                        document.candidate_id
                    );
                    return Ok(CandidateEvaluation::failed(
                        &document.candidate_id,
                        &document.filename,
                        format!("document too large for the evaluation service: {e}"),
                    ));
                }
                Err(e) if e.is_retryable() => last_error = e.to_string(),
                Err(e) => return Err(EvaluationError(e)),
            }
        }

        warn!(
            "Evaluation of {} gave up after {} attempts: {}",
            document.candidate_id, attempts, last_error
        );
        Ok(CandidateEvaluation::failed(
            &document.candidate_id,
            &document.filename,
            format!("evaluation failed after {attempts} attempts: {last_error}"),
        ))
    }
}

/// Longest prefix of `text` holding at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
