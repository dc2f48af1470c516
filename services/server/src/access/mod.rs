//! 请求上下文与访问授权。

pub(crate) mod authorize;
pub(crate) mod context;

pub(crate) use authorize::authorize;
pub(crate) use context::{ConnInfo, RequestContext, request_context};
