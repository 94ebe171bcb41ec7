//! Axum route handlers for the Screening API.

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::screening::JobCriteria;
use crate::models::task::{Progress, TaskId, TaskStatus};
use crate::screening::report::render_csv;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub task_id: TaskId,
}

#[derive(Debug, Serialize)]
pub struct TaskStatusResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: Progress,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportQuery {
    pub format: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/screenings
///
/// Multipart upload: an `archive` file part (.zip) and a `criteria` part
/// holding the job criteria JSON. Returns the new task id; screening runs in
/// the background.
pub async fn handle_submit(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let mut archive: Option<Bytes> = None;
    let mut criteria: Option<JobCriteria> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "archive" => {
                let filename = field.file_name().unwrap_or_default().to_lowercase();
                if !filename.ends_with(".zip") {
                    return Err(AppError::Validation(
                        "Only ZIP archives are accepted".to_string(),
                    ));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read archive: {e}")))?;
                archive = Some(data);
            }
            "criteria" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read criteria: {e}")))?;
                let parsed: JobCriteria = serde_json::from_str(&text)
                    .map_err(|e| AppError::Validation(format!("Invalid criteria JSON: {e}")))?;
                criteria = Some(parsed.normalized().map_err(AppError::Validation)?);
            }
            _ => {
                // Drain unknown parts so the stream can advance.
                field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Could not read part '{name}': {e}")))?;
            }
        }
    }

    let archive = archive
        .filter(|a| !a.is_empty())
        .ok_or_else(|| AppError::Validation("archive file is required".to_string()))?;
    let criteria =
        criteria.ok_or_else(|| AppError::Validation("criteria is required".to_string()))?;

    let task_id = state.screener.submit(archive, criteria);

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse { task_id })))
}

/// GET /api/v1/screenings/:id
///
/// Current status and progress of a screening task.
pub async fn handle_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>, AppError> {
    let task = state.screener.registry().get(&task_id)?;

    Ok(Json(TaskStatusResponse {
        task_id: task.id,
        status: task.status,
        progress: task.progress,
        error: task.error,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }))
}

/// GET /api/v1/screenings/:id/report?format=json|csv
///
/// The screening report of a completed task.
pub async fn handle_report(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let task = state.screener.registry().get(&task_id)?;

    let report = match (task.status, task.result) {
        (TaskStatus::Completed, Some(report)) => report,
        (status, _) => {
            return Err(AppError::NotReady(format!(
                "Task {task_id} is {}",
                status.as_str()
            )));
        }
    };

    match query.format.as_deref().unwrap_or("json") {
        "json" => Ok(Json(report).into_response()),
        "csv" => {
            let body = render_csv(&report).map_err(|e| AppError::Internal(e.into()))?;
            let disposition = format!("attachment; filename=\"screening-{task_id}.csv\"");
            Ok((
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                body,
            )
                .into_response())
        }
        other => Err(AppError::Validation(format!(
            "Unsupported report format '{other}' (use json or csv)"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use axum::Router;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::routes::build_router;
    use crate::screening::archive::tests::build_zip;
    use crate::screening::archive::ArchiveLimits;
    use crate::screening::evaluator::tests::{no_delay, valid_reply, ScriptedBackend};
    use crate::screening::evaluator::CandidateEvaluator;
    use crate::screening::orchestrator::Screener;
    use crate::screening::registry::TaskRegistry;

    const BOUNDARY: &str = "screening-test-boundary";

    fn test_state() -> AppState {
        let config = Config::from_lookup(|key| match key {
            "ANTHROPIC_API_KEY" => Some("sk-test".to_string()),
            _ => None,
        })
        .unwrap();
        let backend = Arc::new(ScriptedBackend::always(valid_reply));
        let screener = Screener::new(
            TaskRegistry::new(),
            CandidateEvaluator::new(backend, no_delay(3)),
            ArchiveLimits::default(),
            2,
        );
        AppState { screener, config }
    }

    fn multipart_body(archive_name: &str, archive: &[u8], criteria: &str) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"criteria\"\r\n\r\n{criteria}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"archive\"; filename=\"{archive_name}\"\r\nContent-Type: application/zip\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(archive);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn submit_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/screenings")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    const CRITERIA: &str =
        r#"{"position": "Backend Engineer", "must_have": ["Rust", "SQL"], "nice_to_have": ["Kafka"]}"#;

    #[tokio::test]
    async fn test_health() {
        let app = build_router(test_state());
        let (status, body) = get(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["tasks"], 0);
    }

    #[tokio::test]
    async fn test_unknown_task_is_404() {
        let app = build_router(test_state());
        let uri = format!("/api/v1/screenings/{}", Uuid::new_v4());
        let (status, body) = get(&app, &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_report_of_pending_task_is_not_ready() {
        let state = test_state();
        let id = state.screener.registry().create();
        let app = build_router(state);
        let (status, body) = get(&app, &format!("/api/v1/screenings/{id}/report")).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "NOT_READY");
    }

    #[tokio::test]
    async fn test_rejects_non_zip_upload() {
        let app = build_router(test_state());
        let body = multipart_body("cvs.tar", b"whatever", CRITERIA);
        let response = app.oneshot(submit_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_truncated_unknown_part_is_rejected() {
        let app = build_router(test_state());
        let body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"notes\"\r\n\r\nunterminated notes"
        );
        let response = app
            .oneshot(submit_request(body.into_bytes()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert!(json["error"]["message"].as_str().unwrap().contains("'notes'"));
    }

    #[tokio::test]
    async fn test_rejects_blank_position() {
        let app = build_router(test_state());
        let zip = build_zip(&[("jane.txt", b"Jane")]);
        let body = multipart_body("cvs.zip", &zip, r#"{"position": "  ", "must_have": []}"#);
        let response = app.oneshot(submit_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_submit_poll_and_download() {
        let app = build_router(test_state());
        let zip = build_zip(&[("jane.txt", b"Jane Doe, Rust"), ("john.md", b"John, SQL")]);

        let response = app
            .clone()
            .oneshot(submit_request(multipart_body("CVs.ZIP", &zip, CRITERIA)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let task_id = json["task_id"].as_str().unwrap().to_string();

        let status_uri = format!("/api/v1/screenings/{task_id}");
        let mut attempts = 0;
        let status = loop {
            let (code, body) = get(&app, &status_uri).await;
            assert_eq!(code, StatusCode::OK);
            let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
            let status = json["status"].as_str().unwrap().to_string();
            if status == "COMPLETED" || status == "FAILED" {
                break json;
            }
            attempts += 1;
            assert!(attempts < 400, "task never finished");
            tokio::time::sleep(Duration::from_millis(5)).await;
        };
        assert_eq!(status["status"], "COMPLETED");
        assert_eq!(status["progress"]["total"], 2);
        assert_eq!(status["progress"]["processed"], 2);
        assert!(status.get("error").is_none());

        let (code, body) = get(&app, &format!("{status_uri}/report")).await;
        assert_eq!(code, StatusCode::OK);
        let report: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(report["position"], "Backend Engineer");
        assert!(report["generated_at"].is_string());
        assert_eq!(report["candidates"][0]["candidate_id"], "jane");
        assert_eq!(report["candidates"][1]["candidate_id"], "john");
        assert_eq!(report["summary"]["by_recommendation"]["REVIEW"], 2);

        let (code, body) = get(&app, &format!("{status_uri}/report?format=csv")).await;
        assert_eq!(code, StatusCode::OK);
        let csv_text = String::from_utf8(body).unwrap();
        assert!(csv_text.starts_with("candidate_id,filename"));
        assert_eq!(csv_text.lines().count(), 3);

        let (code, _) = get(&app, &format!("{status_uri}/report?format=xlsx")).await;
        assert_eq!(code, StatusCode::BAD_REQUEST);
    }
}
