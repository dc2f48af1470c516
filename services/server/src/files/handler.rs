//! 树路由入口：路径解析 -> 选项合并 -> 授权 -> 文件操作。

use std::path::Path;

use axum::{
    Extension,
    body::Body,
    extract::Request,
    http::{HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{debug, warn};
use ts_shared_protocol::{API_ACCESS_TYPE_HEADER, FileEtag};

use crate::{
    access::{RequestContext, authorize},
    api::error::ApiError,
    files::{
        index::{
            find_index_file, list_folder, list_group, render_listing, slash_redirect, sort_entries,
        },
        put::put_file,
        stat::{ItemKind, stat_path},
    },
    tree::{IndexDefault, TreeGroup, TreeNode, TreeOptions, resolve_tree, split_request_path},
};

/// 所有未被 `/admin` 占用的路径都落到这里。
pub(crate) async fn tree_handler(
    Extension(ctx): Extension<RequestContext>,
    request: Request,
) -> Response {
    match handle(&ctx, request).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

async fn handle(ctx: &RequestContext, request: Request) -> Result<Response, ApiError> {
    let segments = split_request_path(request.uri().path()).map_err(|_| {
        ApiError::new(StatusCode::BAD_REQUEST, "INVALID_PATH", "Invalid path")
    })?;
    let config = &ctx.settings.config;
    let found = resolve_tree(&config.tree, &segments)
        .ok_or_else(|| ApiError::from_status(StatusCode::NOT_FOUND))?;
    let options = found.options();
    authorize(&options.auth, ctx.identity.as_ref())?;

    let path = match (found.item, found.physical_path()) {
        (TreeNode::Group(group), _) => {
            return serve_group(ctx, group, &options, &segments, request).await;
        }
        (TreeNode::Folder(_), Some(path)) => path,
        (TreeNode::Folder(_), None) => return Err(ApiError::internal()),
    };

    let stat = stat_path(&path)
        .await
        .map_err(|err| {
            warn!("stat {} failed: {err}", path.display());
            ApiError::internal()
        })?
        .ok_or_else(|| ApiError::from_status(StatusCode::NOT_FOUND))?;

    match stat.kind {
        ItemKind::Folder => serve_folder(ctx, &path, &options, &segments, request).await,
        ItemKind::File => match *request.method() {
            Method::GET | Method::HEAD => Ok(serve_file(&path, Some(&stat.etag), request).await),
            Method::PUT => {
                let (parts, body) = request.into_parts();
                put_file(
                    &config.putsaver,
                    &options,
                    &path,
                    &stat.etag,
                    &parts.headers,
                    body,
                )
                .await
            }
            Method::OPTIONS => Ok(file_options()),
            _ => Err(ApiError::from_status(StatusCode::METHOD_NOT_ALLOWED)),
        },
    }
}

/// 文件的 OPTIONS 响应，声明支持 PUT 保存。
fn file_options() -> Response {
    (
        StatusCode::OK,
        [
            (
                HeaderName::from_static(API_ACCESS_TYPE_HEADER),
                HeaderValue::from_static("file"),
            ),
            (
                HeaderName::from_static("dav"),
                HeaderValue::from_static("tw5/put"),
            ),
        ],
        "GET,HEAD,PUT,OPTIONS",
    )
        .into_response()
}

/// 交给 `ServeFile` 处理 GET/HEAD（含 Range 与条件请求），并补上 etag。
async fn serve_file(path: &Path, etag: Option<&FileEtag>, request: Request) -> Response {
    let Ok(response) = ServeFile::new(path).oneshot(request).await;
    let mut response = response.map(Body::new);
    if response.status().is_success()
        && let Some(etag) = etag
        && let Ok(value) = HeaderValue::from_str(&etag.to_string())
    {
        response.headers_mut().insert(header::ETAG, value);
    }
    response
}

async fn serve_group(
    ctx: &RequestContext,
    group: &TreeGroup,
    options: &TreeOptions,
    segments: &[String],
    request: Request,
) -> Result<Response, ApiError> {
    if let Some(redirect) = slash_redirect(request.uri().path(), segments) {
        return Ok(redirect);
    }
    if request.method() != Method::GET {
        return Err(ApiError::from_status(StatusCode::METHOD_NOT_ALLOWED));
    }
    if let Some(index_path) = &group.index_path {
        debug!("serving group index {}", index_path.display());
        let etag = stat_path(index_path)
            .await
            .ok()
            .flatten()
            .map(|stat| stat.etag);
        return Ok(serve_file(index_path, etag.as_ref(), request).await);
    }
    if let IndexDefault::Status(_) = options.index.default_type {
        return Ok(render_listing(options.index.default_type, "", &[], None));
    }

    let mut entries = list_group(group);
    sort_entries(&mut entries, ctx.settings.config.directory_index.mix_folders);
    Ok(render_listing(
        options.index.default_type,
        request.uri().path(),
        &entries,
        ctx.identity.as_ref(),
    ))
}

async fn serve_folder(
    ctx: &RequestContext,
    dir: &Path,
    options: &TreeOptions,
    segments: &[String],
    request: Request,
) -> Result<Response, ApiError> {
    if let Some(redirect) = slash_redirect(request.uri().path(), segments) {
        return Ok(redirect);
    }
    if request.method() != Method::GET {
        return Err(ApiError::from_status(StatusCode::METHOD_NOT_ALLOWED));
    }

    let index = &options.index;
    let index_file = find_index_file(dir, &index.index_file, &index.index_exts)
        .await
        .map_err(|err| {
            warn!("readdir {} failed: {err}", dir.display());
            ApiError::internal()
        })?;
    if let Some(file) = index_file {
        debug!("serving folder index {}", file.display());
        return Ok(serve_file(&file, None, request).await);
    }
    if let IndexDefault::Status(_) = index.default_type {
        return Ok(render_listing(index.default_type, "", &[], None));
    }

    let mut entries = list_folder(dir).await.map_err(|err| {
        warn!("list {} failed: {err}", dir.display());
        ApiError::internal()
    })?;
    sort_entries(&mut entries, ctx.settings.config.directory_index.mix_folders);
    Ok(render_listing(
        index.default_type,
        request.uri().path(),
        &entries,
        ctx.identity.as_ref(),
    ))
}
