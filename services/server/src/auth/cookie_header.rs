//! `Cookie` 请求头读取与 `Set-Cookie` 响应头拼装。

use axum::http::{HeaderMap, header::COOKIE};

/// 取出指定 cookie 的值（URI 解码后）。同名多次出现时取第一个。
pub(crate) fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|line| line.split(';'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| {
            let value = value.trim();
            urlencoding::decode(value)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| value.to_string())
        })
}

/// `name=value; [Secure; ]HttpOnly; Max-Age=<age>; SameSite=Strict; Path=/`
pub(crate) fn set_cookie(name: &str, value: &str, secure: bool, max_age: u64) -> String {
    let mut parts = vec![format!("{name}={value}")];
    if secure {
        parts.push("Secure".to_string());
    }
    parts.push("HttpOnly".to_string());
    parts.push(format!("Max-Age={max_age}"));
    parts.push("SameSite=Strict".to_string());
    parts.push("Path=/".to_string());
    parts.join("; ")
}
