//! cookie -> 身份。

use tracing::{debug, info};
use ts_shared_protocol::{AuthCookie, CookieKind};

use crate::auth::{registry::AccountRegistry, signature::verify_detached};

/// 已验证的调用方。
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct Identity {
    pub(crate) account: String,
    pub(crate) username: String,
}

/// 未知公钥登录时的注册提示；携带客户端自报的公钥。
#[derive(Debug, Clone, Copy)]
pub(crate) struct RegisterNotice<'a> {
    pub(crate) public_key: &'a str,
}

/// 校验 cookie。任何失败都只返回 `None`。
///
/// 不检查时间戳是否过期，过期只依赖浏览器按 `Max-Age` 丢弃 cookie。
pub(crate) fn validate_cookie(
    registry: &AccountRegistry,
    cookie: &AuthCookie,
    notice: Option<RegisterNotice<'_>>,
) -> Option<Identity> {
    if cookie.kind == CookieKind::Password {
        debug!(username = %cookie.username, "password cookie rejected");
        return None;
    }

    let Some(entry) = registry.lookup(&cookie.key_hash, &cookie.username) else {
        if let Some(notice) = notice {
            info!(
                "login attempted with unknown public key\n    {}\n    username: {}\n    timestamp: {}",
                notice.public_key, cookie.username, cookie.timestamp
            );
        }
        return None;
    };

    if !verify_detached(
        &entry.public_key,
        cookie.signed_message().as_bytes(),
        &cookie.signature,
    ) {
        debug!(username = %cookie.username, "auth cookie signature mismatch");
        return None;
    }

    Some(Identity {
        account: entry.account.clone(),
        username: cookie.username.clone(),
    })
}
