//! API 请求/响应类型与协议常量。

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 登录请求：客户端自签 cookie 与公钥。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest {
    pub(crate) set_cookie: String,
    /// 仅用于未知公钥的注册提示日志。
    #[serde(default)]
    pub(crate) public_key: String,
}

/// 申请转移 pin 的返回。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PendingPinData {
    pub(crate) pending_pin: String,
}

/// 同时挂起的转移 pin 上限。
pub(crate) const MAX_PENDING_PINS: usize = 1000;
/// pin 空闲淘汰时间。
pub(crate) const TRANSFER_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// pin 原始字节长度（hex 后 16 字符）。
pub(crate) const PIN_BYTES: usize = 8;
