// 文件职责：
// 1) 定义浏览器端与服务端共用的认证 cookie 线格式（`TiddlyServerAuth`）。
// 2) 定义密钥转移会合协议的角色与响应头名称。
// 3) 定义文件写入乐观并发使用的 etag 组合格式。

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 认证 cookie 名称。
pub const AUTH_COOKIE_NAME: &str = "TiddlyServerAuth";
/// 认证 cookie 默认有效期（秒，30 天）。
pub const DEFAULT_AUTH_COOKIE_AGE_SEC: u64 = 2_592_000;
/// 配对成功后携带转移次数的响应头。
pub const TRANSFER_COUNT_HEADER: &str = "x-tiddlyserver-transfer-count";
/// 文件接口访问类型响应头。
pub const API_ACCESS_TYPE_HEADER: &str = "x-api-access-type";
/// cookie 字段分隔符。
const COOKIE_SEPARATOR: char = '|';
/// cookie 固定尾部字段数：type、timestamp、hash、signature。
const COOKIE_TAIL_FIELDS: usize = 4;

/// cookie 凭证类型。
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
pub enum CookieKind {
    /// 口令凭证：仅做结构解析，语义上始终拒绝。
    #[serde(rename = "pw")]
    Password,
    /// 公钥签名凭证。
    #[serde(rename = "key")]
    Key,
}

impl CookieKind {
    /// 线格式中的类型字符串。
    pub fn as_str(self) -> &'static str {
        match self {
            CookieKind::Password => "pw",
            CookieKind::Key => "key",
        }
    }
}

impl FromStr for CookieKind {
    type Err = CookieFormatError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "pw" => Ok(CookieKind::Password),
            "key" => Ok(CookieKind::Key),
            other => Err(CookieFormatError::UnknownKind(other.to_string())),
        }
    }
}

/// cookie 解析错误。
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum CookieFormatError {
    #[error("auth cookie has {0} fields, expected at least 5")]
    TooFewFields(usize),
    #[error("unknown auth cookie type: {0}")]
    UnknownKind(String),
}

/// 认证 cookie：`username|type|timestamp|keyHash|signature`。
///
/// 用户名本身可能包含 `|`，解析时固定从右侧取 4 个字段，其余全部拼回用户名。
/// 该格式不做任何转义，含有形似合法尾部的用户名会被按右侧规则切分。
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuthCookie {
    pub username: String,
    pub kind: CookieKind,
    pub timestamp: String,
    pub key_hash: String,
    pub signature: String,
}

impl AuthCookie {
    /// 解析 cookie 原文。
    pub fn parse(raw: &str) -> Result<Self, CookieFormatError> {
        let fields: Vec<&str> = raw.split(COOKIE_SEPARATOR).collect();
        if fields.len() <= COOKIE_TAIL_FIELDS {
            return Err(CookieFormatError::TooFewFields(fields.len()));
        }
        let (name, tail) = fields.split_at(fields.len() - COOKIE_TAIL_FIELDS);
        Ok(Self {
            username: name.join("|"),
            kind: tail[0].parse()?,
            timestamp: tail[1].to_string(),
            key_hash: tail[2].to_string(),
            signature: tail[3].to_string(),
        })
    }

    /// 序列化为 cookie 原文。
    pub fn serialize(&self) -> String {
        [
            self.username.as_str(),
            self.kind.as_str(),
            self.timestamp.as_str(),
            self.key_hash.as_str(),
            self.signature.as_str(),
        ]
        .join("|")
    }

    /// 签名覆盖的消息：`username + timestamp + keyHash`。
    pub fn signed_message(&self) -> String {
        format!("{}{}{}", self.username, self.timestamp, self.key_hash)
    }
}

impl fmt::Display for AuthCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}

/// 密钥转移会合中的一方。
///
/// `reciever` 的拼写是线协议的一部分，必须保持原样。
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum TransferRole {
    Sender,
    Reciever,
}

impl TransferRole {
    /// 路径段中的角色名。
    pub fn as_str(self) -> &'static str {
        match self {
            TransferRole::Sender => "sender",
            TransferRole::Reciever => "reciever",
        }
    }

    /// 解析路径段，未知角色返回 `None`。
    pub fn from_segment(raw: &str) -> Option<Self> {
        match raw {
            "sender" => Some(TransferRole::Sender),
            "reciever" => Some(TransferRole::Reciever),
            _ => None,
        }
    }
}

/// 文件 etag：`"<inode>-<size>-<mtimeMillis>"`（包含双引号）。
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct FileEtag {
    pub ino: u64,
    pub size: u64,
    pub mtime_ms: u64,
}

impl FileEtag {
    /// 从 `If-Match` 头中取出 mtime 字段；无法解析时返回 `None`。
    ///
    /// 只需要 mtime 参与时间窗判断，inode 与 size 仅用于精确匹配。
    pub fn header_mtime(raw: &str) -> Option<u64> {
        unquote(raw).split('-').nth(2)?.parse().ok()
    }

    /// 与 `If-Match` 比较，返回第一个不一致的字段名，用于日志。
    pub fn mismatch_field(&self, raw: &str) -> Option<&'static str> {
        let mut parts = unquote(raw).split('-');
        let expected = [self.ino, self.size, self.mtime_ms];
        for (name, value) in ["inode", "size", "modified"].into_iter().zip(expected) {
            let matches = parts
                .next()
                .and_then(|part| part.parse::<u64>().ok())
                .is_some_and(|part| part == value);
            if !matches {
                return Some(name);
            }
        }
        None
    }
}

/// 去掉弱校验前缀 `W/` 与包裹的双引号。
fn unquote(raw: &str) -> &str {
    raw.trim().trim_start_matches("W/").trim_matches('"')
}

impl fmt::Display for FileEtag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}-{}-{}\"", self.ino, self.size, self.mtime_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthCookie, CookieFormatError, CookieKind, FileEtag, TransferRole};

    fn sample(username: &str) -> AuthCookie {
        AuthCookie {
            username: username.to_string(),
            kind: CookieKind::Key,
            timestamp: "2024-01-01T00:00:00.000Z".to_string(),
            key_hash: "aGFzaA".to_string(),
            signature: "c2ln".to_string(),
        }
    }

    #[test]
    fn cookie_round_trips_plain_username() {
        let cookie = sample("alice");
        let raw = cookie.serialize();
        assert_eq!(raw, "alice|key|2024-01-01T00:00:00.000Z|aGFzaA|c2ln");
        assert_eq!(AuthCookie::parse(&raw), Ok(cookie));
    }

    #[test]
    fn username_with_pipes_is_recovered_from_the_right() {
        let cookie = sample("a|b|c");
        let parsed = AuthCookie::parse(&cookie.serialize()).expect("parse");
        assert_eq!(parsed.username, "a|b|c");
        assert_eq!(parsed.kind, CookieKind::Key);
        assert_eq!(parsed.signature, "c2ln");
    }

    #[test]
    fn short_or_unknown_cookies_are_rejected() {
        assert_eq!(
            AuthCookie::parse("alice|key|ts|hash"),
            Err(CookieFormatError::TooFewFields(4))
        );
        assert_eq!(
            AuthCookie::parse("alice|jwt|ts|hash|sig"),
            Err(CookieFormatError::UnknownKind("jwt".to_string()))
        );
    }

    #[test]
    fn password_cookie_still_parses() {
        let parsed = AuthCookie::parse("bob|pw|ts|hash|sig").expect("parse");
        assert_eq!(parsed.kind, CookieKind::Password);
    }

    #[test]
    fn signed_message_concatenates_without_separator() {
        assert_eq!(
            sample("alice").signed_message(),
            "alice2024-01-01T00:00:00.000ZaGFzaA"
        );
    }

    #[test]
    fn cookie_kind_uses_wire_names_in_json() {
        assert_eq!(
            serde_json::to_string(&CookieKind::Password).expect("encode"),
            "\"pw\""
        );
    }

    #[test]
    fn transfer_role_keeps_wire_spelling() {
        assert_eq!(
            TransferRole::from_segment("reciever"),
            Some(TransferRole::Reciever)
        );
        assert_eq!(TransferRole::from_segment("receiver"), None);
        assert_eq!(TransferRole::Sender.as_str(), "sender");
    }

    #[test]
    fn etag_formats_and_compares() {
        let etag = FileEtag {
            ino: 1,
            size: 100,
            mtime_ms: 1000,
        };
        assert_eq!(etag.to_string(), "\"1-100-1000\"");
        assert_eq!(etag.mismatch_field("\"1-100-1000\""), None);
        assert_eq!(etag.mismatch_field("\"1-101-1000\""), Some("size"));
        assert_eq!(FileEtag::header_mtime("\"1-100-900\""), Some(900));
        assert_eq!(FileEtag::header_mtime("garbage"), None);
    }

    #[test]
    fn weak_if_match_is_compared_by_value() {
        let etag = FileEtag {
            ino: 7,
            size: 10,
            mtime_ms: 5000,
        };
        assert_eq!(etag.mismatch_field("W/\"7-10-5000\""), None);
        assert_eq!(etag.mismatch_field("W/\"7-10-4000\""), Some("modified"));
        assert_eq!(FileEtag::header_mtime("W/\"7-10-4000\""), Some(4000));
    }
}
