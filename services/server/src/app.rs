//! 应用装配：路由、上下文中间件、监听与设置重载。

use anyhow::Context as _;
use axum::{
    Router, middleware,
    routing::{any, post},
};
use tokio::{net::TcpListener, task::JoinSet};
use tracing::{info, warn};

use crate::{
    access::{ConnInfo, request_context},
    auth::handlers::{admin_fallback_handler, login_handler, logout_handler, pending_pin_handler},
    files::tree_handler,
    state::AppState,
    transfer::handlers::transfer_handler,
};

/// 组装路由：`/admin/authenticate/*` 之外的路径全部交给树路由。
pub(crate) fn router(state: AppState) -> Router {
    Router::new()
        .route("/admin/authenticate/login", post(login_handler))
        .route("/admin/authenticate/logout", post(logout_handler))
        .route("/admin/authenticate/pendingpin", post(pending_pin_handler))
        .route(
            "/admin/authenticate/transfer/{pin}/{role}",
            post(transfer_handler),
        )
        .route("/admin/{*rest}", any(admin_fallback_handler))
        .fallback(tree_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            request_context,
        ))
        .with_state(state)
}

/// 在每个 bindAddress 上监听同一端口，直到任一监听退出。
pub(crate) async fn run(state: AppState) -> anyhow::Result<()> {
    let settings = state.snapshot().await;
    let bind = &settings.config.bind_info;
    let app = router(state.clone());

    let mut servers = JoinSet::new();
    for host in &bind.bind_address {
        let listener = TcpListener::bind((host.as_str(), bind.port))
            .await
            .with_context(|| format!("bind {host}:{}", bind.port))?;
        let local = listener.local_addr()?;
        info!("tiddlyserver listening on {local}");
        let app = app.clone();
        servers.spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<ConnInfo>(),
            )
            .await
        });
    }

    spawn_reload_listener(state);

    while let Some(joined) = servers.join_next().await {
        joined.context("listener task panicked")??;
    }
    Ok(())
}

/// SIGHUP 触发设置重载；监听地址只在启动时生效。
#[cfg(unix)]
fn spawn_reload_listener(state: AppState) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(hangup) => hangup,
            Err(err) => {
                warn!("install SIGHUP handler failed: {err}");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            if let Err(err) = state.reload().await {
                warn!("settings reload failed, keeping previous settings: {err}");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_listener(_state: AppState) {}
