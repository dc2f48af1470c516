//! 密钥转移会合：两个 HTTP 请求按 pin 配对，互换请求体。

pub(crate) mod handlers;
pub(crate) mod table;

pub(crate) use table::TransferTable;
