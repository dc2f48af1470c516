//! 树路由下的文件操作：stat、读取、条件写入与目录索引。

mod handler;
mod index;
mod put;
mod stat;

pub(crate) use handler::tree_handler;
