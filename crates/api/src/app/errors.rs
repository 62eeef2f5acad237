use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use ledgerbatch_infra::errors::{
    error_chain, generalize, most_specific_cause, GeneralError, INTERNAL_CODE, JOB_RUNNING_CODE,
    UNKNOWN_JOB_CODE,
};
use ledgerbatch_infra::jobs::LaunchError;

pub fn launch_error_to_response(err: LaunchError) -> axum::response::Response {
    match err {
        LaunchError::UnknownJob(name) => json_error(
            StatusCode::NOT_FOUND,
            UNKNOWN_JOB_CODE,
            format!("no job named '{name}'"),
        ),
        LaunchError::AlreadyRunning(name) => json_error(
            StatusCode::CONFLICT,
            JOB_RUNNING_CODE,
            format!("job '{name}' is already running"),
        ),
        e @ (LaunchError::Store(_) | LaunchError::IllegalTransition(_)) => {
            general_error(StatusCode::INTERNAL_SERVER_ERROR, generalize(&e))
        }
    }
}

/// Log `err` and answer with a generic 500; the cause never reaches the caller.
pub fn internal_error(err: &(dyn std::error::Error + 'static)) -> axum::response::Response {
    tracing::error!(
        cause = %most_specific_cause(err),
        chain = %error_chain(err),
        "request failed"
    );
    json_error(
        StatusCode::INTERNAL_SERVER_ERROR,
        INTERNAL_CODE,
        "An internal error occurred.",
    )
}

pub fn general_error(status: StatusCode, err: GeneralError) -> axum::response::Response {
    json_error(status, err.code, err.default_user_message)
}

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code.into(),
            "message": message.into(),
        })),
    )
        .into_response()
}
