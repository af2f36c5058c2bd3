use std::fmt;

use crate::{FdRef, Iatt, InodeRef, XData};

/// Operation kinds known to the routing layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FopKind {
    Lookup,
    Stat,
    Fstat,
    Truncate,
    Ftruncate,
    Access,
    Readlink,
    Mknod,
    Mkdir,
    Unlink,
    Rmdir,
    Symlink,
    Rename,
    Link,
    Create,
    Open,
    Readv,
    Writev,
    Flush,
    Fsync,
    Opendir,
    Readdir,
    Readdirp,
    Fsyncdir,
    Statfs,
    Setxattr,
    Getxattr,
    Removexattr,
    Fsetxattr,
    Fgetxattr,
    Fremovexattr,
    Lk,
    Inodelk,
    Entrylk,
    Rchecksum,
    Xattrop,
    Fxattrop,
    Setattr,
    Fsetattr,
    Fallocate,
    Discard,
    Zerofill,
    Seek,
    Icreate,
    Namelink,
}

impl FopKind {
    pub fn name(&self) -> &'static str {
        match self {
            FopKind::Lookup => "lookup",
            FopKind::Stat => "stat",
            FopKind::Fstat => "fstat",
            FopKind::Truncate => "truncate",
            FopKind::Ftruncate => "ftruncate",
            FopKind::Access => "access",
            FopKind::Readlink => "readlink",
            FopKind::Mknod => "mknod",
            FopKind::Mkdir => "mkdir",
            FopKind::Unlink => "unlink",
            FopKind::Rmdir => "rmdir",
            FopKind::Symlink => "symlink",
            FopKind::Rename => "rename",
            FopKind::Link => "link",
            FopKind::Create => "create",
            FopKind::Open => "open",
            FopKind::Readv => "readv",
            FopKind::Writev => "writev",
            FopKind::Flush => "flush",
            FopKind::Fsync => "fsync",
            FopKind::Opendir => "opendir",
            FopKind::Readdir => "readdir",
            FopKind::Readdirp => "readdirp",
            FopKind::Fsyncdir => "fsyncdir",
            FopKind::Statfs => "statfs",
            FopKind::Setxattr => "setxattr",
            FopKind::Getxattr => "getxattr",
            FopKind::Removexattr => "removexattr",
            FopKind::Fsetxattr => "fsetxattr",
            FopKind::Fgetxattr => "fgetxattr",
            FopKind::Fremovexattr => "fremovexattr",
            FopKind::Lk => "lk",
            FopKind::Inodelk => "inodelk",
            FopKind::Entrylk => "entrylk",
            FopKind::Rchecksum => "rchecksum",
            FopKind::Xattrop => "xattrop",
            FopKind::Fxattrop => "fxattrop",
            FopKind::Setattr => "setattr",
            FopKind::Fsetattr => "fsetattr",
            FopKind::Fallocate => "fallocate",
            FopKind::Discard => "discard",
            FopKind::Zerofill => "zerofill",
            FopKind::Seek => "seek",
            FopKind::Icreate => "icreate",
            FopKind::Namelink => "namelink",
        }
    }
}

impl fmt::Display for FopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which attributes a setattr call should apply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SetAttrValid(pub u32);

impl SetAttrValid {
    pub const MODE: u32 = 1 << 0;
    pub const UID: u32 = 1 << 1;
    pub const GID: u32 = 1 << 2;
    pub const SIZE: u32 = 1 << 3;
    pub const ATIME: u32 = 1 << 4;
    pub const MTIME: u32 = 1 << 5;

    pub fn has(&self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

// ==================== Replies ====================

#[derive(Clone, Debug, Default)]
pub struct LookupReply {
    pub inode: Option<InodeRef>,
    pub buf: Iatt,
    pub xdata: Option<XData>,
    pub postparent: Iatt,
}

/// stat / fstat
#[derive(Clone, Debug, Default)]
pub struct AttrReply {
    pub buf: Iatt,
    pub xdata: Option<XData>,
}

/// Replies carrying attributes before and after a modification: setattr,
/// truncate, writev, fallocate, discard, zerofill, namelink.
#[derive(Clone, Debug, Default)]
pub struct PrePostReply {
    pub prebuf: Iatt,
    pub postbuf: Iatt,
    pub xdata: Option<XData>,
}

/// mkdir
#[derive(Clone, Debug, Default)]
pub struct EntryReply {
    pub inode: Option<InodeRef>,
    pub buf: Iatt,
    pub preparent: Iatt,
    pub postparent: Iatt,
    pub xdata: Option<XData>,
}

#[derive(Clone, Debug)]
pub struct CreateReply {
    pub fd: FdRef,
    pub inode: InodeRef,
    pub buf: Iatt,
    pub preparent: Iatt,
    pub postparent: Iatt,
    pub xdata: Option<XData>,
}

/// icreate
#[derive(Clone, Debug)]
pub struct InodeReply {
    pub inode: InodeRef,
    pub buf: Iatt,
    pub xdata: Option<XData>,
}

#[derive(Clone, Debug)]
pub struct OpenReply {
    pub fd: FdRef,
    pub xdata: Option<XData>,
}

#[derive(Clone, Debug, Default)]
pub struct ReadReply {
    pub data: Vec<u8>,
    pub buf: Iatt,
    pub xdata: Option<XData>,
}

#[derive(Clone, Debug, Default)]
pub struct XattrReply {
    pub dict: XData,
    pub xdata: Option<XData>,
}

/// access, flush, setxattr, removexattr
#[derive(Clone, Debug, Default)]
pub struct EmptyReply {
    pub xdata: Option<XData>,
}
