// posix2: GFID 寻址的单节点存储，分 MDS 与 DS 两种角色
// engine 只描述存储接口，mem_engine 是内存实现，mds/ds 把它们接到 Subvolume 上

mod ds;
mod engine;
mod mds;
mod mem_engine;

pub use ds::*;
pub use engine::*;
pub use mds::*;
pub use mem_engine::*;

#[macro_use]
extern crate log;
