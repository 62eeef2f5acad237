use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use ledgerbatch_infra::errors::{GeneralError, UNKNOWN_RUN_CODE};
use ledgerbatch_infra::jobs::{JobRunStatus, JobRunStore, RunId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:name/runs", get(list_runs).post(launch_run))
        .route("/jobs/:name/runs/:run_id", get(get_run))
}

pub async fn list_jobs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let mut items = Vec::new();
    for name in services.runner.job_names() {
        let last_run = match services.runs.last_run(name) {
            Ok(r) => r,
            Err(e) => return errors::internal_error(&e),
        };
        items.push(dto::JobSummary {
            name: name.to_string(),
            running: services.runner.is_running(name),
            last_run,
        });
    }
    (StatusCode::OK, Json(dto::Items { items })).into_response()
}

/// Launch a run and wait for it to finish.
///
/// A completed run is returned as-is. A failed run is reported with the
/// generic job-failure error; the cause is only in the logs.
pub async fn launch_run(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let request = match dto::parse_launch_request(&body) {
        Ok(r) => r,
        Err(resp) => return resp,
    };
    let business_date = request
        .business_date
        .unwrap_or_else(|| services.dates.business_date());

    let runner = services.runner.clone();
    let job_name = name.clone();
    let launched =
        tokio::task::spawn_blocking(move || runner.launch(&job_name, business_date)).await;

    match launched {
        Ok(Ok(run)) if run.status == JobRunStatus::Completed => {
            (StatusCode::OK, Json(run)).into_response()
        }
        Ok(Ok(run)) => {
            tracing::warn!(
                job = %name,
                run_id = %run.run_id,
                failure = ?run.failure,
                "run failed; answering with generic error"
            );
            errors::general_error(StatusCode::INTERNAL_SERVER_ERROR, GeneralError::job_failed())
        }
        Ok(Err(e)) => errors::launch_error_to_response(e),
        Err(e) => errors::internal_error(&e),
    }
}

pub async fn list_runs(
    Extension(services): Extension<Arc<AppServices>>,
    Path(name): Path<String>,
    Query(query): Query<dto::ListRunsQuery>,
) -> axum::response::Response {
    let limit = query.limit.unwrap_or(dto::DEFAULT_RUN_LIMIT);
    match services.runner.history(&name, limit) {
        Ok(items) => (StatusCode::OK, Json(dto::Items { items })).into_response(),
        Err(e) => errors::launch_error_to_response(e),
    }
}

pub async fn get_run(
    Extension(services): Extension<Arc<AppServices>>,
    Path((name, run_id)): Path<(String, u64)>,
) -> axum::response::Response {
    match services.runs.get(RunId(run_id)) {
        Ok(Some(run)) if run.job_name == name => (StatusCode::OK, Json(run)).into_response(),
        Ok(_) => errors::json_error(StatusCode::NOT_FOUND, UNKNOWN_RUN_CODE, "run not found"),
        Err(e) => errors::internal_error(&e),
    }
}
