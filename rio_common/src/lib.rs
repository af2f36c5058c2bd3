// rio_common: client 与 server 共用的部分
// layout、subvol 列表解析、请求上下文(local)、启动事件计数、卷配置

mod conf;
mod layout;
mod local;
mod notify;
mod subvol_list;

pub use conf::*;
pub use layout::*;
pub use local::*;
pub use notify::*;
pub use subvol_list::*;

#[macro_use]
extern crate log;
