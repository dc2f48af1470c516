//! 鉴权模块：公钥签名校验、账户索引、cookie 校验与登录接口。

pub(crate) mod cookie_header;
pub(crate) mod handlers;
pub(crate) mod registry;
pub(crate) mod signature;
pub(crate) mod validator;
