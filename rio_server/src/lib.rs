// rio_server: 运行在存储节点上的 RIO
// MDS 端负责 mkdir/create 事务、属性刷新以及 EREMOTE 重定向，DS 端只做数据透传

mod common;
mod ds;
mod mds;
mod refresh;

pub use common::*;
pub use ds::*;
pub use mds::*;
pub use refresh::*;

#[macro_use]
extern crate log;

#[cfg(test)]
mod rio_server_mds_tests;
