use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use ledgerbatch_accounting::{Account, RunningBalance};
use ledgerbatch_core::BusinessDate;
use ledgerbatch_infra::errors::{most_specific_cause, INVALID_REQUEST_CODE};
use ledgerbatch_infra::jobs::JobRun;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /jobs/:name/runs`. An empty body means "today".
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LaunchRunRequest {
    pub business_date: Option<BusinessDate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRunsQuery {
    pub limit: Option<usize>,
}

pub const DEFAULT_RUN_LIMIT: usize = 50;

/// Parse a launch body. Malformed JSON is logged with its most specific
/// cause and answered with a generic message.
pub fn parse_launch_request(body: &[u8]) -> Result<LaunchRunRequest, axum::response::Response> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(LaunchRunRequest::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        tracing::warn!(
            cause = %most_specific_cause(&e),
            line = e.line(),
            column = e.column(),
            "invalid launch request body"
        );
        errors::json_error(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST_CODE,
            "The request body could not be parsed.",
        )
    })
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct JobSummary {
    pub name: String,
    pub running: bool,
    pub last_run: Option<JobRun>,
}

#[derive(Debug, Serialize)]
pub struct AccountView {
    pub account: Option<Account>,
    pub running_balances: Vec<RunningBalance>,
}

#[derive(Debug, Serialize)]
pub struct Items<T> {
    pub items: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_defaults() {
        assert!(parse_launch_request(b"").unwrap().business_date.is_none());
        assert!(parse_launch_request(b"  \n").unwrap().business_date.is_none());
    }

    #[test]
    fn parses_business_date() {
        let req = parse_launch_request(br#"{"business_date":"2024-01-01"}"#).unwrap();
        assert_eq!(
            req.business_date,
            Some(BusinessDate::from_ymd(2024, 1, 1).unwrap())
        );
    }

    #[test]
    fn malformed_body_is_rejected() {
        let resp = parse_launch_request(b"{not json").unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = parse_launch_request(br#"{"business_date":"yesterday"}"#).unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = parse_launch_request(br#"{"unexpected":1}"#).unwrap_err();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
