//! 树选项（auth / backups / index）与沿祖先链的覆盖合并。

use serde::{Deserialize, Deserializer};

/// 节点上声明的一个选项元素。
#[derive(Debug, Clone)]
pub(crate) enum TreeOption {
    Auth(AuthPatch),
    Backups(BackupsPatch),
    Index(IndexPatch),
}

/// `auth` 元素中显式写出的键。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AuthPatch {
    /// 外层 `None` 表示未写；`Some(None)` 表示显式写成 `null`（解除限制）。
    #[serde(default, deserialize_with = "explicit_nullable")]
    pub(crate) auth_list: Option<Option<Vec<String>>>,
    #[serde(default)]
    pub(crate) auth_error: Option<u16>,
}

/// `backups` 元素中显式写出的键。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BackupsPatch {
    #[serde(default)]
    pub(crate) backup_folder: Option<String>,
    #[serde(default)]
    pub(crate) etag_age: Option<u64>,
    #[serde(default)]
    pub(crate) gzip: Option<bool>,
}

/// `index` 元素中显式写出的键。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct IndexPatch {
    #[serde(default)]
    pub(crate) default_type: Option<IndexDefault>,
    #[serde(default)]
    pub(crate) index_file: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) index_exts: Option<Vec<String>>,
}

/// 目录没有索引文件时的行为：渲染列表或直接返回状态码。
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum IndexDefault {
    Html,
    Json,
    Status(u16),
}

impl<'de> Deserialize<'de> for IndexDefault {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Name(String),
            Code(u16),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Name(name) if name == "html" => Ok(IndexDefault::Html),
            Raw::Name(name) if name == "json" => Ok(IndexDefault::Json),
            Raw::Code(code @ (403 | 404)) => Ok(IndexDefault::Status(code)),
            Raw::Name(other) => Err(serde::de::Error::custom(format!(
                "unsupported index defaultType {other:?}"
            ))),
            Raw::Code(other) => Err(serde::de::Error::custom(format!(
                "unsupported index defaultType {other}"
            ))),
        }
    }
}

/// 区分“未写”与“写成 null”。
fn explicit_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 合并后的访问控制选项。
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct AuthOptions {
    /// `None` 表示不限制。
    pub(crate) auth_list: Option<Vec<String>>,
    pub(crate) auth_error: u16,
}

/// 合并后的备份选项。
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct BackupOptions {
    pub(crate) backup_folder: String,
    pub(crate) etag_age: u64,
    pub(crate) gzip: bool,
}

/// 合并后的目录索引选项。
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct IndexOptions {
    pub(crate) default_type: IndexDefault,
    pub(crate) index_file: Vec<String>,
    pub(crate) index_exts: Vec<String>,
}

/// 请求生效的树选项。
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct TreeOptions {
    pub(crate) auth: AuthOptions,
    pub(crate) backups: BackupOptions,
    pub(crate) index: IndexOptions,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            auth: AuthOptions {
                auth_list: None,
                auth_error: 403,
            },
            backups: BackupOptions {
                backup_folder: String::new(),
                etag_age: 0,
                gzip: true,
            },
            index: IndexOptions {
                default_type: IndexDefault::Html,
                index_file: Vec::new(),
                index_exts: Vec::new(),
            },
        }
    }
}

impl TreeOptions {
    fn apply(&mut self, option: &TreeOption) {
        match option {
            TreeOption::Auth(patch) => {
                if let Some(list) = &patch.auth_list {
                    self.auth.auth_list = list.clone();
                }
                if let Some(status) = patch.auth_error {
                    self.auth.auth_error = status;
                }
            }
            TreeOption::Backups(patch) => {
                if let Some(folder) = &patch.backup_folder {
                    self.backups.backup_folder = folder.clone();
                }
                if let Some(age) = patch.etag_age {
                    self.backups.etag_age = age;
                }
                if let Some(gzip) = patch.gzip {
                    self.backups.gzip = gzip;
                }
            }
            TreeOption::Index(patch) => {
                if let Some(default_type) = patch.default_type {
                    self.index.default_type = default_type;
                }
                if let Some(files) = &patch.index_file {
                    self.index.index_file = files.clone();
                }
                if let Some(exts) = &patch.index_exts {
                    self.index.index_exts = exts.clone();
                }
            }
        }
    }
}

/// 从默认值出发，按根到叶的顺序逐层覆盖显式写出的键。
pub(crate) fn merge_options<'a, I>(levels: I) -> TreeOptions
where
    I: IntoIterator<Item = &'a [TreeOption]>,
{
    let mut merged = TreeOptions::default();
    for level in levels {
        for option in level {
            merged.apply(option);
        }
    }
    merged
}
