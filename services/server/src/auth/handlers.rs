//! `/admin/authenticate/*` 路由处理函数。

use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use tracing::{info, warn};
use ts_shared_protocol::{AUTH_COOKIE_NAME, AuthCookie};

use crate::{
    access::RequestContext,
    api::{
        error::ApiError,
        response::ok_response,
        types::{LoginRequest, PendingPinData},
    },
    auth::{
        cookie_header::set_cookie,
        validator::{RegisterNotice, validate_cookie},
    },
    state::AppState,
};

fn bad_request(code: &'static str, message: &'static str) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, code, message)
}

/// 登录：校验客户端自签 cookie，通过后原样写回 `Set-Cookie`。
pub(crate) async fn login_handler(
    Extension(ctx): Extension<RequestContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(bad_request("EMPTY_REQUEST_BODY", "Empty request body"));
    }
    let req: LoginRequest = serde_json::from_slice(&body)
        .map_err(|_| bad_request("MALFORMED_JSON", "Malformed JSON"))?;
    let cookie = AuthCookie::parse(&req.set_cookie)
        .map_err(|_| bad_request("BAD_COOKIE_FORMAT", "Bad cookie format"))?;

    let notice = ctx.register_notice().then_some(RegisterNotice {
        public_key: &req.public_key,
    });
    let Some(identity) = validate_cookie(&ctx.settings.registry, &cookie, notice) else {
        return Err(bad_request("INVALID_CREDENTIALS", "INVALID_CREDENTIALS"));
    };

    let config = &ctx.settings.config;
    let header = HeaderValue::from_str(&set_cookie(
        AUTH_COOKIE_NAME,
        &req.set_cookie,
        config.auth_cookie_secure,
        config.auth_cookie_age,
    ))
    .map_err(|_| bad_request("BAD_COOKIE_FORMAT", "Bad cookie format"))?;

    info!(
        account = %identity.account,
        username = %identity.username,
        bucket = %ctx.permission_key,
        "login succeeded"
    );
    Ok((
        [(SET_COOKIE, header)],
        ok_response(StatusCode::OK, "Login succeeded", None::<()>),
    )
        .into_response())
}

/// 登出：下发立即过期的空 cookie。
pub(crate) async fn logout_handler(Extension(ctx): Extension<RequestContext>) -> Response {
    let secure = ctx.settings.config.auth_cookie_secure;
    let cleared = set_cookie(AUTH_COOKIE_NAME, "", secure, 0);
    match HeaderValue::from_str(&cleared) {
        Ok(header) => (
            [(SET_COOKIE, header)],
            ok_response(StatusCode::OK, "Logged out", None::<()>),
        )
            .into_response(),
        Err(err) => {
            warn!("build logout cookie failed: {err}");
            ApiError::internal().into_response()
        }
    }
}

/// 申请转移 pin。
pub(crate) async fn pending_pin_handler(
    State(state): State<AppState>,
) -> Result<Json<PendingPinData>, ApiError> {
    let pending_pin = state.transfers.request_pin()?;
    Ok(Json(PendingPinData { pending_pin }))
}

/// `/admin/*` 下未注册的路径：缺角色的转移请求为 400，其余 404。
pub(crate) async fn admin_fallback_handler(Path(rest): Path<String>) -> ApiError {
    let segments: Vec<&str> = rest.split('/').filter(|part| !part.is_empty()).collect();
    match segments.as_slice() {
        ["authenticate", "transfer", ..] => bad_request(
            "INVALID_REQUEST_PARAMETERS",
            "Invalid request parameters",
        ),
        _ => ApiError::from_status(StatusCode::NOT_FOUND),
    }
}
