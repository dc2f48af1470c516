//! PUT 保存：If-Match 乐观并发校验与流式写入。

use std::path::Path;

use axum::{
    body::Body,
    http::{HeaderMap, HeaderName, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use ts_shared_protocol::{API_ACCESS_TYPE_HEADER, FileEtag};

use crate::{
    api::error::ApiError,
    config::{EtagMode, PutsaverConfig},
    files::stat::stat_path,
    tree::TreeOptions,
};

/// 判断本次写入是否因 etag 不一致而被拒绝。
///
/// 仅在模式不是 `disabled`，且携带了 If-Match 或模式为 `required` 时比较；
/// 不一致时若磁盘 mtime 与 If-Match 中的 mtime 相差不超过宽限窗口，仍允许写入。
pub(crate) fn check_if_match(
    putsaver: &PutsaverConfig,
    current: &FileEtag,
    if_match: Option<&str>,
) -> Result<(), ApiError> {
    let header = if_match.unwrap_or("");
    let expected = current.to_string();
    let applies = putsaver.etag != EtagMode::Disabled
        && (!header.is_empty() || putsaver.etag == EtagMode::Required);
    if !applies {
        return Ok(());
    }
    let Some(field) = current.mismatch_field(header) else {
        return Ok(());
    };

    info!("412 if-match {header:?} etag {expected}");
    info!("412 caused by difference in {field}");

    let window_ms = putsaver.etag_window.saturating_mul(1000);
    let within_window = putsaver.etag_window > 0
        && FileEtag::header_mtime(header)
            .is_some_and(|head| current.mtime_ms.saturating_sub(window_ms) <= head);
    if !within_window {
        return Err(ApiError::from_status(StatusCode::PRECONDITION_FAILED));
    }
    info!(
        "412 prevented by etagWindow of {} seconds",
        putsaver.etag_window
    );
    Ok(())
}

/// 把请求体流式写入同目录的临时文件，完整收到后再替换目标，返回新 etag。
///
/// 请求体中途出错时临时文件随 `TempPath` 一起删除，目标文件保持原样。
async fn write_body(path: &Path, body: Body) -> std::io::Result<Option<FileEtag>> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let permissions = tokio::fs::metadata(path).await?.permissions();
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".ts-put-")
        .suffix(".tmp")
        .tempfile_in(dir)?
        .into_parts();

    let mut file = tokio::fs::File::from_std(file);
    let mut stream = body.into_data_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(std::io::Error::other)?;
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::set_permissions(&temp_path, permissions).await?;
    temp_path.persist(path).map_err(|err| err.error)?;
    Ok(stat_path(path).await?.map(|stat| stat.etag))
}

/// `PUT` 文件。调用方已完成授权并确认目标是已存在的文件。
pub(crate) async fn put_file(
    putsaver: &PutsaverConfig,
    options: &TreeOptions,
    path: &Path,
    current: &FileEtag,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let if_match = headers
        .get(header::IF_MATCH)
        .and_then(|value| value.to_str().ok());
    check_if_match(putsaver, current, if_match)?;

    if !options.backups.backup_folder.is_empty() {
        debug!(
            folder = %options.backups.backup_folder,
            gzip = options.backups.gzip,
            etag_age = options.backups.etag_age,
            "backup folder configured; skipping backup copy"
        );
    }

    let written = write_body(path, body).await.map_err(|err| {
        warn!("write {} failed: {err}", path.display());
        ApiError::internal()
    })?;
    let Some(etag) = written else {
        warn!("{} vanished after write", path.display());
        return Err(ApiError::internal());
    };
    debug!(etag = %etag, "file saved: {}", path.display());

    Ok((
        StatusCode::OK,
        [
            (
                HeaderName::from_static(API_ACCESS_TYPE_HEADER),
                "file".to_string(),
            ),
            (header::ETAG, etag.to_string()),
        ],
    )
        .into_response())
}
