//! 路径状态与 etag 计算。

use std::{
    fs::Metadata,
    io,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use ts_shared_protocol::FileEtag;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum ItemKind {
    File,
    Folder,
}

/// 一次 stat 的结果。
#[derive(Debug, Clone, Copy)]
pub(crate) struct PathStat {
    pub(crate) kind: ItemKind,
    pub(crate) etag: FileEtag,
}

impl PathStat {
    pub(crate) fn from_metadata(meta: &Metadata) -> Self {
        let kind = if meta.is_dir() {
            ItemKind::Folder
        } else {
            ItemKind::File
        };
        Self {
            kind,
            etag: FileEtag {
                ino: inode(meta),
                size: meta.len(),
                mtime_ms: meta.modified().map(millis_since_epoch).unwrap_or(0),
            },
        }
    }
}

/// 路径不存在时返回 `None`，其他 I/O 错误照常上抛。
pub(crate) async fn stat_path(path: &Path) -> io::Result<Option<PathStat>> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(Some(PathStat::from_metadata(&meta))),
        Err(err) if matches!(err.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

pub(crate) fn millis_since_epoch(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(unix)]
fn inode(meta: &Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.ino()
}

#[cfg(not(unix))]
fn inode(_meta: &Metadata) -> u64 {
    0
}
