//! 转移相关 HTTP 处理函数。

use axum::{
    body::Body,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::warn;
use ts_shared_protocol::{TRANSFER_COUNT_HEADER, TransferRole};

use crate::{api::error::ApiError, state::AppState, transfer::table::TransferError};

/// `POST /admin/authenticate/transfer/{pin}/{role}`：等待对方到达后回传对方的请求体。
pub(crate) async fn transfer_handler(
    State(state): State<AppState>,
    Path((pin, role)): Path<(String, String)>,
    body: Body,
) -> Response {
    let Some(role) = TransferRole::from_segment(&role) else {
        return ApiError::from(TransferError::UnknownPin).into_response();
    };
    let receiver = match state.transfers.attach(&pin, role, body) {
        Ok(receiver) => receiver,
        Err(err) => return ApiError::from(err).into_response(),
    };

    match receiver.await {
        Ok(Ok(leg)) => (
            StatusCode::OK,
            [(TRANSFER_COUNT_HEADER, leg.step.to_string())],
            leg.body,
        )
            .into_response(),
        Ok(Err(err)) => ApiError::from(err).into_response(),
        Err(_) => {
            warn!(role = role.as_str(), "transfer reply channel dropped");
            ApiError::internal().into_response()
        }
    }
}
