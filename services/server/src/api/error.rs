//! API 错误定义与响应转换。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::response::ApiEnvelope;

/// 请求拒绝：状态码 + 稳定机器码 + 简短原因，不携带内部细节。
#[derive(Debug)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) code: &'static str,
    pub(crate) message: String,
}

impl ApiError {
    /// 构造统一 API 错误。
    pub(crate) fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 仅按状态码构造错误（树路由的 404/403/405/412 等）。
    pub(crate) fn from_status(status: StatusCode) -> Self {
        let code = match status {
            StatusCode::BAD_REQUEST => "BAD_REQUEST",
            StatusCode::FORBIDDEN => "FORBIDDEN",
            StatusCode::NOT_FOUND => "NOT_FOUND",
            StatusCode::METHOD_NOT_ALLOWED => "METHOD_NOT_ALLOWED",
            StatusCode::PRECONDITION_FAILED => "PRECONDITION_FAILED",
            StatusCode::INTERNAL_SERVER_ERROR => "INTERNAL_ERROR",
            _ => "REQUEST_REJECTED",
        };
        let message = status.canonical_reason().unwrap_or("Request rejected");
        Self::new(status, code, message)
    }

    /// 内部错误：细节只进日志。
    pub(crate) fn internal() -> Self {
        Self::from_status(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ApiEnvelope::<Value> {
                ok: false,
                code: self.code.to_string(),
                message: self.message,
                data: None,
            }),
        )
            .into_response()
    }
}
