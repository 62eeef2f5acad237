//! Generalized error surface for callers outside the batch core.
//!
//! Internal failures are logged with their most specific cause and then
//! replaced by a stable code plus a default message. Callers never see the
//! internal error text.

use std::error::Error as StdError;

use serde::{Deserialize, Serialize};

pub const JOB_FAILED_CODE: &str = "error.msg.job.failed";
pub const JOB_FAILED_MESSAGE: &str =
    "The job could not be completed. The failure has been logged for operators.";

pub const UNKNOWN_JOB_CODE: &str = "error.msg.job.not.found";
pub const UNKNOWN_RUN_CODE: &str = "error.msg.run.not.found";
pub const UNKNOWN_ACCOUNT_CODE: &str = "error.msg.account.not.found";
pub const INVALID_ACCOUNT_ID_CODE: &str = "error.msg.account.id.invalid";
pub const JOB_RUNNING_CODE: &str = "error.msg.job.already.running";
pub const INVALID_REQUEST_CODE: &str = "error.msg.invalid.request.body";
pub const INTERNAL_CODE: &str = "error.msg.platform.internal";

/// A caller-facing error: stable code + human-readable default message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralError {
    pub code: String,
    pub default_user_message: String,
}

impl GeneralError {
    pub fn new(code: impl Into<String>, default_user_message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            default_user_message: default_user_message.into(),
        }
    }

    pub fn job_failed() -> Self {
        Self::new(JOB_FAILED_CODE, JOB_FAILED_MESSAGE)
    }
}

/// The deepest error in `err`'s source chain.
pub fn most_specific_cause<'a>(err: &'a (dyn StdError + 'static)) -> &'a (dyn StdError + 'static) {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current
}

/// `err` and all of its sources joined with `": "`.
pub fn error_chain(err: &(dyn StdError + 'static)) -> String {
    let mut out = err.to_string();
    let mut current = err.source();
    while let Some(source) = current {
        out.push_str(": ");
        out.push_str(&source.to_string());
        current = source.source();
    }
    out
}

/// Log `err` with its cause chain and return the generic job failure.
pub fn generalize(err: &(dyn StdError + 'static)) -> GeneralError {
    tracing::warn!(
        cause = %most_specific_cause(err),
        chain = %error_chain(err),
        "job failure generalized for caller"
    );
    GeneralError::job_failed()
}
