use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use ledgerbatch_core::AccountId;
use ledgerbatch_infra::errors::{INVALID_ACCOUNT_ID_CODE, UNKNOWN_ACCOUNT_CODE};
use ledgerbatch_infra::store::{AccountStore, RunningBalanceStore, StoreError};

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new().route("/accounts/:id", get(get_account))
}

/// Account status plus its last committed running balances.
pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let Ok(account_id) = id.parse::<AccountId>() else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            INVALID_ACCOUNT_ID_CODE,
            "invalid account id",
        );
    };

    let account = match services.db.fetch_account(account_id) {
        Ok(a) => Some(a),
        Err(StoreError::AccountNotFound(_)) => None,
        Err(e) => return errors::internal_error(&e),
    };
    let running_balances = match services.db.running_balances(account_id) {
        Ok(b) => b,
        Err(e) => return errors::internal_error(&e),
    };

    if account.is_none() && running_balances.is_empty() {
        return errors::json_error(StatusCode::NOT_FOUND, UNKNOWN_ACCOUNT_CODE, "account not found");
    }

    (
        StatusCode::OK,
        Json(dto::AccountView {
            account,
            running_balances,
        }),
    )
        .into_response()
}
