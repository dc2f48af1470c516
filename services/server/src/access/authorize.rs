//! 合并后的 auth 选项 + 身份 -> 放行或拒绝。

use axum::http::StatusCode;
use tracing::debug;

use crate::{api::error::ApiError, auth::validator::Identity, tree::AuthOptions};

/// 未登录调用方在 authList 中对应的账户名。
pub(crate) const ANONYMOUS_ACCOUNT: &str = "";

/// 必须在任何文件 I/O 之前调用。
pub(crate) fn authorize(auth: &AuthOptions, identity: Option<&Identity>) -> Result<(), ApiError> {
    let Some(allowed) = &auth.auth_list else {
        return Ok(());
    };
    let account = identity.map_or(ANONYMOUS_ACCOUNT, |identity| identity.account.as_str());
    if allowed.iter().any(|entry| entry == account) {
        return Ok(());
    }
    debug!(account, status = auth.auth_error, "request denied by authList");
    let status = StatusCode::from_u16(auth.auth_error).unwrap_or(StatusCode::FORBIDDEN);
    Err(ApiError::from_status(status))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::authorize;
    use crate::{auth::validator::Identity, tree::AuthOptions};

    fn identity(account: &str) -> Identity {
        Identity {
            account: account.to_string(),
            username: "someone".to_string(),
        }
    }

    fn restricted(list: &[&str], status: u16) -> AuthOptions {
        AuthOptions {
            auth_list: Some(list.iter().map(|entry| entry.to_string()).collect()),
            auth_error: status,
        }
    }

    #[test]
    fn unset_list_allows_everyone() {
        let open = AuthOptions {
            auth_list: None,
            auth_error: 403,
        };
        assert!(authorize(&open, None).is_ok());
        assert!(authorize(&open, Some(&identity("guests"))).is_ok());
    }

    #[test]
    fn listed_account_is_allowed() {
        let auth = restricted(&["admins"], 403);
        assert!(authorize(&auth, Some(&identity("admins"))).is_ok());
        let denied = authorize(&auth, Some(&identity("guests"))).expect_err("denied");
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn anonymous_callers_match_empty_marker() {
        assert!(authorize(&restricted(&["admins", ""], 403), None).is_ok());
        let denied = authorize(&restricted(&["admins"], 404), None).expect_err("denied");
        assert_eq!(denied.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn empty_list_denies_everyone() {
        assert!(authorize(&restricted(&[], 403), Some(&identity("admins"))).is_err());
    }
}
