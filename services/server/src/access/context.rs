//! 每个请求的上下文：权限桶、身份与设置快照。

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
};

use axum::{
    extract::{ConnectInfo, Request, State, connect_info::Connected},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
    serve::IncomingStream,
};
use tokio::net::TcpListener;
use tracing::debug;
use ts_shared_protocol::{AUTH_COOKIE_NAME, AuthCookie};

use crate::{
    api::error::ApiError,
    auth::{
        cookie_header::read_cookie,
        validator::{Identity, validate_cookie},
    },
    state::{AppState, LoadedSettings},
};

/// 连接信息：权限桶按本地地址（客户端连到的是哪块网卡）选择。
#[derive(Debug, Clone, Copy)]
pub(crate) struct ConnInfo {
    pub(crate) local: SocketAddr,
    pub(crate) remote: SocketAddr,
}

impl Connected<IncomingStream<'_, TcpListener>> for ConnInfo {
    fn connect_info(stream: IncomingStream<'_, TcpListener>) -> Self {
        let local = stream
            .io()
            .local_addr()
            .unwrap_or_else(|_| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        Self {
            local,
            remote: *stream.remote_addr(),
        }
    }
}

/// 中间件写入请求扩展的上下文。
#[derive(Debug, Clone)]
pub(crate) struct RequestContext {
    pub(crate) permission_key: String,
    pub(crate) identity: Option<Identity>,
    pub(crate) settings: Arc<LoadedSettings>,
}

impl RequestContext {
    pub(crate) fn register_notice(&self) -> bool {
        self.settings
            .config
            .permission(&self.permission_key)
            .register_notice
    }
}

fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.eq_ignore_ascii_case("websocket"))
}

/// 解析权限桶与 cookie 身份，挂到请求上。
pub(crate) async fn request_context(
    State(state): State<AppState>,
    ConnectInfo(conn): ConnectInfo<ConnInfo>,
    mut request: Request,
    next: Next,
) -> Response {
    let settings = state.snapshot().await;
    let permission_key = settings.hosts.resolve_key(conn.local.ip()).to_string();

    if is_websocket_upgrade(request.headers())
        && !settings.config.permission(&permission_key).websockets
    {
        debug!(
            remote = %conn.remote,
            bucket = %permission_key,
            "websocket upgrade rejected by host permissions"
        );
        return ApiError::from_status(StatusCode::FORBIDDEN).into_response();
    }

    let identity = read_cookie(request.headers(), AUTH_COOKIE_NAME)
        .and_then(|raw| AuthCookie::parse(&raw).ok())
        .and_then(|cookie| validate_cookie(&settings.registry, &cookie, None));

    request.extensions_mut().insert(RequestContext {
        permission_key,
        identity,
        settings,
    });
    next.run(request).await
}
