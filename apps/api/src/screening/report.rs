//! Report Builder — assembles ordered evaluations into the external report.
//!
//! `build_report` is a pure function of its inputs. Rendering to CSV is a
//! separate step so the same report can be served as JSON or as a spreadsheet.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::screening::{CandidateEvaluation, JobCriteria, Recommendation};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub evaluated: usize,
    pub failed: usize,
    /// Keyed by recommendation label; sorted so serialization is stable.
    pub by_recommendation: BTreeMap<String, usize>,
    /// Mean confidence over successfully evaluated candidates.
    pub average_confidence: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreeningReport {
    pub position: String,
    pub must_have: Vec<String>,
    pub nice_to_have: Vec<String>,
    pub candidates: Vec<CandidateEvaluation>,
    pub summary: ReportSummary,
    pub generated_at: DateTime<Utc>,
}

pub fn build_report(
    criteria: &JobCriteria,
    evaluations: &[CandidateEvaluation],
    generated_at: DateTime<Utc>,
) -> ScreeningReport {
    let mut by_recommendation = BTreeMap::new();
    let mut confidence_sum = 0.0;
    let mut evaluated = 0;

    for evaluation in evaluations {
        *by_recommendation
            .entry(evaluation.recommendation.label().to_string())
            .or_insert(0) += 1;
        if !evaluation.is_failure() {
            evaluated += 1;
            confidence_sum += evaluation.confidence;
        }
    }

    let summary = ReportSummary {
        total: evaluations.len(),
        evaluated,
        failed: evaluations.len() - evaluated,
        by_recommendation,
        average_confidence: (evaluated > 0).then(|| confidence_sum / evaluated as f64),
    };

    ScreeningReport {
        position: criteria.position.clone(),
        must_have: criteria.must_have.clone(),
        nice_to_have: criteria.nice_to_have.clone(),
        candidates: evaluations.to_vec(),
        summary,
        generated_at,
    }
}

const CSV_HEADER: [&str; 16] = [
    "candidate_id",
    "filename",
    "full_name",
    "email",
    "education",
    "experience_summary",
    "years_of_experience",
    "must_have_matched",
    "must_have_missing",
    "nice_to_have_matched",
    "must_have_match",
    "nice_to_have_match",
    "confidence",
    "recommendation",
    "justification",
    "failure",
];

/// Renders one CSV row per candidate, list fields joined with `; `.
pub fn render_csv(report: &ScreeningReport) -> Result<Vec<u8>, csv::Error> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_HEADER)?;

    for c in &report.candidates {
        let opt = |v: &Option<String>| v.clone().unwrap_or_default();
        writer.write_record([
            c.candidate_id.clone(),
            c.filename.clone(),
            opt(&c.full_name),
            opt(&c.email),
            opt(&c.education),
            opt(&c.experience_summary),
            c.years_of_experience.map(|y| y.to_string()).unwrap_or_default(),
            c.skills.must_have_matched.join("; "),
            c.skills.must_have_missing.join("; "),
            c.skills.nice_to_have_matched.join("; "),
            format!("{:.2}", c.skills.must_have_match),
            format!("{:.2}", c.skills.nice_to_have_match),
            format!("{:.2}", c.confidence),
            c.recommendation.label().to_string(),
            opt(&c.justification),
            opt(&c.failure),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| csv::Error::from(e.into_error()))
}

/// Count of candidates carrying `recommendation`.
pub fn count_of(report: &ScreeningReport, recommendation: Recommendation) -> usize {
    report
        .summary
        .by_recommendation
        .get(recommendation.label())
        .copied()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::screening::SkillsMatch;

    fn criteria() -> JobCriteria {
        JobCriteria {
            position: "Platform Engineer".to_string(),
            must_have: vec!["Rust".to_string()],
            nice_to_have: vec!["Terraform".to_string()],
        }
    }

    fn scored(id: &str, confidence: f64, recommendation: Recommendation) -> CandidateEvaluation {
        CandidateEvaluation {
            candidate_id: id.to_string(),
            filename: format!("{id}.pdf"),
            full_name: Some(format!("{id} Smith")),
            email: None,
            education: Some("BSc, \"Honours\"".to_string()),
            experience_summary: Some("Ops, then SRE".to_string()),
            years_of_experience: Some(4.0),
            skills: SkillsMatch {
                must_have_matched: vec!["Rust".to_string()],
                must_have_missing: vec![],
                nice_to_have_matched: vec!["Terraform".to_string()],
                must_have_match: 1.0,
                nice_to_have_match: 1.0,
            },
            confidence,
            recommendation,
            justification: Some("Good fit".to_string()),
            failure: None,
        }
    }

    fn generated_at() -> DateTime<Utc> {
        "2026-03-02T09:30:00Z".parse().unwrap()
    }

    fn sample() -> Vec<CandidateEvaluation> {
        vec![
            scored("ann", 0.9, Recommendation::Accept),
            CandidateEvaluation::failed("bob", "bob.pdf", "Unsupported format: image/png"),
            scored("cat", 0.5, Recommendation::Review),
            scored("dan", 0.7, Recommendation::Accept),
        ]
    }

    #[test]
    fn test_summary_counts_and_average() {
        let report = build_report(&criteria(), &sample(), generated_at());
        assert_eq!(report.summary.total, 4);
        assert_eq!(report.summary.evaluated, 3);
        assert_eq!(report.summary.failed, 1);
        assert_eq!(count_of(&report, Recommendation::Accept), 2);
        assert_eq!(count_of(&report, Recommendation::Unscored), 1);
        assert_eq!(count_of(&report, Recommendation::Reject), 0);
        let avg = report.summary.average_confidence.unwrap();
        assert!((avg - 0.7).abs() < 1e-9, "average was {avg}");
    }

    #[test]
    fn test_candidate_order_is_preserved() {
        let report = build_report(&criteria(), &sample(), generated_at());
        let ids: Vec<_> = report.candidates.iter().map(|c| c.candidate_id.as_str()).collect();
        assert_eq!(ids, vec!["ann", "bob", "cat", "dan"]);
    }

    #[test]
    fn test_build_report_is_deterministic() {
        let a = build_report(&criteria(), &sample(), generated_at());
        let b = build_report(&criteria(), &sample(), generated_at());
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn test_empty_report_has_no_average() {
        let report = build_report(&criteria(), &[], generated_at());
        assert_eq!(report.summary.total, 0);
        assert!(report.summary.average_confidence.is_none());
        assert_eq!(report.generated_at, generated_at());
    }

    #[test]
    fn test_render_csv_one_row_per_candidate() {
        let report = build_report(&criteria(), &sample(), generated_at());
        let bytes = render_csv(&report).unwrap();
        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.len(), CSV_HEADER.len());

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "ann");
        assert_eq!(&rows[0][4], "BSc, \"Honours\"");
        assert_eq!(&rows[1][13], "UNSCORED");
        assert_eq!(&rows[1][15], "Unsupported format: image/png");
        assert_eq!(&rows[2][12], "0.50");
    }
}
