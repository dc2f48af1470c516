//! 请求路径到树节点的前缀匹配。

use std::{
    iter,
    path::{Path, PathBuf},
};

use super::{TreeGroup, TreeNode, TreeOptions, merge_options};

/// 一次成功的树解析。
#[derive(Debug)]
pub(crate) struct TreeMatch<'a> {
    /// 根到父节点的分组链（不含 `item`）。
    pub(crate) ancestry: Vec<&'a TreeGroup>,
    pub(crate) item: &'a TreeNode,
    /// `folder` 之下剩余的路径段；`group` 命中时为空。
    pub(crate) filepath_portion: Vec<String>,
}

impl TreeMatch<'_> {
    /// 沿 ancestry + item 合并选项。
    pub(crate) fn options(&self) -> TreeOptions {
        merge_options(
            self.ancestry
                .iter()
                .map(|group| group.options.as_slice())
                .chain(iter::once(self.item.options())),
        )
    }

    /// `folder` 命中时的物理路径。
    pub(crate) fn physical_path(&self) -> Option<PathBuf> {
        let TreeNode::Folder(folder) = self.item else {
            return None;
        };
        Some(
            self.filepath_portion
                .iter()
                .fold(folder.path.clone(), |path, segment| path.join(segment)),
        )
    }
}

/// 逐层匹配路径段。
///
/// 在 `group` 中找不到下一段对应的子节点时视为不存在（404）；
/// 遇到 `folder` 立即停止，剩余段交给文件系统；
/// 路径段用尽时停在当前节点（目录索引）。
pub(crate) fn resolve_tree<'a>(root: &'a TreeNode, segments: &[String]) -> Option<TreeMatch<'a>> {
    let mut ancestry = Vec::new();
    let mut item = root;
    let mut consumed = 0;

    while let TreeNode::Group(group) = item {
        let Some(next) = segments.get(consumed) else {
            break;
        };
        let child = group.children.iter().find(|child| child.key() == next)?;
        ancestry.push(group);
        item = child;
        consumed += 1;
    }

    Some(TreeMatch {
        ancestry,
        item,
        filepath_portion: segments[consumed..].to_vec(),
    })
}

/// 非法请求路径。
#[derive(Debug, Eq, PartialEq)]
pub(crate) struct InvalidPath;

/// 拆分并解码 URL 路径，拒绝任何可能逃出目录的段。
pub(crate) fn split_request_path(raw: &str) -> Result<Vec<String>, InvalidPath> {
    let mut segments = Vec::new();
    for part in raw.split('/') {
        let decoded = urlencoding::decode(part).map_err(|_| InvalidPath)?;
        match decoded.as_ref() {
            "" | "." => continue,
            ".." => return Err(InvalidPath),
            value if value.contains(['/', '\\', '\0']) => return Err(InvalidPath),
            value if Path::new(value).is_absolute() => return Err(InvalidPath),
            _ => segments.push(decoded.into_owned()),
        }
    }
    Ok(segments)
}
