// rio_client: 运行在客户端的 RIO
// 按 layout 把名字空间操作路由到 MDS，数据操作路由到 DS，并处理一次 EREMOTE 重定向

mod client;
mod routing;

pub use client::*;
pub use routing::*;

#[macro_use]
extern crate log;
