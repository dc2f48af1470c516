//! 目录索引：补斜杠重定向、索引文件发现与列表渲染。

use std::{
    io,
    path::{Path, PathBuf},
};

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{
    auth::validator::Identity,
    files::stat::{ItemKind, PathStat},
    tree::{IndexDefault, TreeGroup, TreeNode},
};

/// 不以 `/` 结尾的目录路径先 302 到斜杠形式，保证相对链接正确。
///
/// `Location` 由已解码的路径段重新编码拼出，不回显原始路径。
pub(crate) fn slash_redirect(raw_path: &str, segments: &[String]) -> Option<Response> {
    if raw_path.ends_with('/') {
        return None;
    }
    let mut location = String::from("/");
    for segment in segments {
        location.push_str(&urlencoding::encode(segment));
        location.push('/');
    }
    let location = HeaderValue::from_str(&location).ok()?;
    Some((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

/// 按 `indexFile x indexExts` 的顺序找第一个存在的索引文件。
/// 扩展名为空串时匹配不带扩展名的文件。
pub(crate) async fn find_index_file(
    dir: &Path,
    index_file: &[String],
    index_exts: &[String],
) -> io::Result<Option<PathBuf>> {
    if index_file.is_empty() || index_exts.is_empty() {
        return Ok(None);
    }
    let mut names = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }

    for file in index_file {
        for ext in index_exts {
            let candidate = if ext.is_empty() {
                file.clone()
            } else {
                format!("{file}.{ext}")
            };
            if names.contains(&candidate) {
                return Ok(Some(dir.join(candidate)));
            }
        }
    }
    Ok(None)
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum EntryKind {
    Group,
    Folder,
    File,
}

/// 列表中的一项。
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ListingEntry {
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) modified: Option<u64>,
}

impl ListingEntry {
    fn is_container(&self) -> bool {
        self.kind != EntryKind::File
    }
}

/// 分组的子节点。
pub(crate) fn list_group(group: &TreeGroup) -> Vec<ListingEntry> {
    group
        .children
        .iter()
        .map(|child| ListingEntry {
            name: child.key().to_string(),
            kind: match child {
                TreeNode::Group(_) => EntryKind::Group,
                TreeNode::Folder(_) => EntryKind::Folder,
            },
            size: None,
            modified: None,
        })
        .collect()
}

/// 物理目录内容；无法 stat 的条目跳过。
pub(crate) async fn list_folder(dir: &Path) -> io::Result<Vec<ListingEntry>> {
    let mut listing = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(meta) = tokio::fs::metadata(entry.path()).await else {
            continue;
        };
        let stat = PathStat::from_metadata(&meta);
        let (kind, size) = match stat.kind {
            ItemKind::Folder => (EntryKind::Folder, None),
            ItemKind::File => (EntryKind::File, Some(stat.etag.size)),
        };
        listing.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            kind,
            size,
            modified: Some(stat.etag.mtime_ms),
        });
    }
    Ok(listing)
}

/// 按名称排序；`mix_folders` 为 false 时目录在前。
pub(crate) fn sort_entries(entries: &mut [ListingEntry], mix_folders: bool) {
    entries.sort_by(|a, b| {
        let group = if mix_folders {
            std::cmp::Ordering::Equal
        } else {
            b.is_container().cmp(&a.is_container())
        };
        group.then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListingBody<'a> {
    path: &'a str,
    logged_in: Option<String>,
    entries: &'a [ListingEntry],
}

fn logged_in(identity: Option<&Identity>) -> Option<String> {
    identity.map(|identity| format!("{} (group {})", identity.username, identity.account))
}

/// 没有索引文件可用时的最终响应。
pub(crate) fn render_listing(
    default_type: IndexDefault,
    path: &str,
    entries: &[ListingEntry],
    identity: Option<&Identity>,
) -> Response {
    let body = ListingBody {
        path,
        logged_in: logged_in(identity),
        entries,
    };
    match default_type {
        IndexDefault::Status(code) => StatusCode::from_u16(code)
            .unwrap_or(StatusCode::FORBIDDEN)
            .into_response(),
        IndexDefault::Json => Json(body).into_response(),
        IndexDefault::Html => (
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/html; charset=utf-8"),
            )],
            render_html(&body),
        )
            .into_response(),
    }
}

fn render_html(body: &ListingBody<'_>) -> String {
    let title = escape_html(body.path);
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Index of {title}</title></head>\n<body>\n<h1>Index of {title}</h1>\n"
    );
    if let Some(user) = &body.logged_in {
        html.push_str(&format!("<p>Logged in as {}</p>\n", escape_html(user)));
    }
    html.push_str("<ul>\n");
    if body.path != "/" {
        html.push_str("<li><a href=\"../\">../</a></li>\n");
    }
    for entry in body.entries {
        let suffix = if entry.is_container() { "/" } else { "" };
        html.push_str(&format!(
            "<li><a href=\"{}{suffix}\">{}{suffix}</a></li>\n",
            urlencoding::encode(&entry.name),
            escape_html(&entry.name)
        ));
    }
    html.push_str("</ul>\n</body></html>\n");
    html
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::http::{StatusCode, header};

    use super::{
        EntryKind, ListingEntry, escape_html, find_index_file, list_folder, render_listing,
        slash_redirect, sort_entries,
    };
    use crate::tree::IndexDefault;

    fn entry(name: &str, kind: EntryKind) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            kind,
            size: None,
            modified: None,
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    fn location(raw: &str, segments: &[&str]) -> Option<String> {
        let response = slash_redirect(raw, &strings(segments))?;
        assert_eq!(response.status(), StatusCode::FOUND);
        let value = response.headers().get(header::LOCATION).expect("location");
        Some(value.to_str().expect("ascii").to_string())
    }

    #[test]
    fn redirect_appends_slash() {
        assert_eq!(location("/notes/", &["notes"]), None);
        assert_eq!(location("/notes", &["notes"]).as_deref(), Some("/notes/"));
        assert_eq!(
            location("/team/a%20b", &["team", "a b"]).as_deref(),
            Some("/team/a%20b/")
        );
    }

    #[test]
    fn redirect_never_leaves_the_host() {
        assert_eq!(
            location("//evil.example/notes", &["evil.example", "notes"]).as_deref(),
            Some("/evil.example/notes/")
        );
        assert_eq!(location("/.", &[]).as_deref(), Some("/"));
    }

    #[tokio::test]
    async fn index_discovery_follows_file_then_extension_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("index.htm"), b"a").expect("write");
        fs::write(dir.path().join("home.html"), b"b").expect("write");
        fs::write(dir.path().join("README"), b"c").expect("write");

        let found = find_index_file(
            dir.path(),
            &strings(&["index", "home"]),
            &strings(&["html", "htm"]),
        )
        .await
        .expect("readdir");
        assert_eq!(found, Some(dir.path().join("index.htm")));

        let bare = find_index_file(dir.path(), &strings(&["README"]), &strings(&[""]))
            .await
            .expect("readdir");
        assert_eq!(bare, Some(dir.path().join("README")));

        let none = find_index_file(dir.path(), &strings(&["index"]), &[])
            .await
            .expect("readdir");
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn folder_listing_reports_kinds() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::create_dir(dir.path().join("sub")).expect("mkdir");
        fs::write(dir.path().join("a.txt"), b"abc").expect("write");

        let mut entries = list_folder(dir.path()).await.expect("list");
        sort_entries(&mut entries, true);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[0].size, Some(3));
        assert_eq!(entries[1].kind, EntryKind::Folder);
    }

    #[test]
    fn folders_first_unless_mixed() {
        let mut entries = vec![
            entry("b.txt", EntryKind::File),
            entry("zeta", EntryKind::Folder),
            entry("Alpha", EntryKind::Group),
        ];
        sort_entries(&mut entries, false);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "b.txt"]);

        sort_entries(&mut entries, true);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "b.txt", "zeta"]);
    }

    #[test]
    fn default_type_selects_rendering() {
        let entries = vec![entry("x", EntryKind::File)];
        let status = render_listing(IndexDefault::Status(404), "/a/", &entries, None);
        assert_eq!(status.status(), StatusCode::NOT_FOUND);

        let json = render_listing(IndexDefault::Json, "/a/", &entries, None);
        assert_eq!(
            json.headers().get(header::CONTENT_TYPE).expect("type"),
            "application/json"
        );

        let html = render_listing(IndexDefault::Html, "/a/", &entries, None);
        assert_eq!(
            html.headers().get(header::CONTENT_TYPE).expect("type"),
            "text/html; charset=utf-8"
        );
    }

    #[test]
    fn html_escape_covers_markup() {
        assert_eq!(escape_html("<a href=\"x\">&"), "&lt;a href=&quot;x&quot;&gt;&amp;");
    }
}
