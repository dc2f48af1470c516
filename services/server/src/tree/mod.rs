//! 虚拟路径树：配置结构、路径解析与祖先选项合并。
//!
//! 树由两类节点构成：
//! - `group`：纯虚拟分组，子节点按 `key` 匹配下一段 URL 路径；
//! - `folder`：映射到一个物理目录，剩余路径段作为目录内的子路径。
//!
//! 每个节点的 `$children` 中还可以声明 `auth` / `backups` / `index` 选项，
//! 这些选项沿祖先链向下继承，只覆盖显式写出的键。

mod options;
mod resolve;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

pub(crate) use options::{
    AuthOptions, AuthPatch, BackupsPatch, IndexDefault, IndexPatch, TreeOption, TreeOptions,
    merge_options,
};
pub(crate) use resolve::{resolve_tree, split_request_path};

/// 树节点。
#[derive(Debug, Clone)]
pub(crate) enum TreeNode {
    Group(TreeGroup),
    Folder(TreeFolder),
}

/// 虚拟分组节点。
#[derive(Debug, Clone)]
pub(crate) struct TreeGroup {
    pub(crate) key: String,
    /// 分组自身的索引文件；未配置时渲染子节点列表。
    pub(crate) index_path: Option<PathBuf>,
    pub(crate) children: Vec<TreeNode>,
    pub(crate) options: Vec<TreeOption>,
}

/// 物理目录节点。
#[derive(Debug, Clone)]
pub(crate) struct TreeFolder {
    pub(crate) key: String,
    pub(crate) path: PathBuf,
    pub(crate) options: Vec<TreeOption>,
}

impl TreeNode {
    pub(crate) fn key(&self) -> &str {
        match self {
            TreeNode::Group(group) => &group.key,
            TreeNode::Folder(folder) => &folder.key,
        }
    }

    pub(crate) fn options(&self) -> &[TreeOption] {
        match self {
            TreeNode::Group(group) => &group.options,
            TreeNode::Folder(folder) => &folder.options,
        }
    }

    /// 将相对路径解析到设置文件目录。
    pub(crate) fn resolve_paths(&mut self, base: &Path) {
        match self {
            TreeNode::Group(group) => {
                if let Some(index) = group.index_path.as_mut()
                    && index.is_relative()
                {
                    *index = base.join(&*index);
                }
                for child in &mut group.children {
                    child.resolve_paths(base);
                }
            }
            TreeNode::Folder(folder) => {
                if folder.path.is_relative() {
                    folder.path = base.join(&folder.path);
                }
            }
        }
    }
}

/// `$children` 数组中的原始元素。
#[derive(Debug, Deserialize)]
#[serde(tag = "$element", rename_all = "lowercase")]
enum RawElement {
    Group(RawGroup),
    Folder(RawFolder),
    Auth(AuthPatch),
    Backups(BackupsPatch),
    Index(IndexPatch),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawGroup {
    #[serde(default)]
    key: String,
    #[serde(default)]
    index_path: Option<PathBuf>,
    #[serde(default, rename = "$children")]
    children: Vec<RawElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFolder {
    #[serde(default)]
    key: String,
    path: PathBuf,
    #[serde(default, rename = "$children")]
    children: Vec<RawElement>,
}

impl RawElement {
    fn into_node(self) -> Result<Result<TreeNode, TreeOption>, String> {
        Ok(match self {
            RawElement::Group(raw) => Ok(TreeNode::Group(raw.into_group()?)),
            RawElement::Folder(raw) => Ok(TreeNode::Folder(raw.into_folder()?)),
            RawElement::Auth(patch) => Err(TreeOption::Auth(patch)),
            RawElement::Backups(patch) => Err(TreeOption::Backups(patch)),
            RawElement::Index(patch) => Err(TreeOption::Index(patch)),
        })
    }
}

impl RawGroup {
    fn into_group(self) -> Result<TreeGroup, String> {
        let mut children = Vec::new();
        let mut options = Vec::new();
        for element in self.children {
            match element.into_node()? {
                Ok(node) => {
                    if node.key().is_empty() {
                        return Err(format!("child of group {:?} has an empty key", self.key));
                    }
                    children.push(node);
                }
                Err(option) => options.push(option),
            }
        }
        Ok(TreeGroup {
            key: self.key,
            index_path: self.index_path,
            children,
            options,
        })
    }
}

impl RawFolder {
    fn into_folder(self) -> Result<TreeFolder, String> {
        let mut options = Vec::new();
        for element in self.children {
            match element.into_node()? {
                Ok(_) => {
                    return Err(format!(
                        "folder {:?} may only contain option elements",
                        self.key
                    ));
                }
                Err(option) => options.push(option),
            }
        }
        Ok(TreeFolder {
            key: self.key,
            path: self.path,
            options,
        })
    }
}

impl<'de> Deserialize<'de> for TreeNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawElement::deserialize(deserializer)?;
        match raw.into_node().map_err(serde::de::Error::custom)? {
            Ok(node) => Ok(node),
            Err(_) => Err(serde::de::Error::custom(
                "tree root must be a group or folder element",
            )),
        }
    }
}
