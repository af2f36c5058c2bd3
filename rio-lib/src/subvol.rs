use async_trait::async_trait;
use std::sync::Arc;

use crate::*;

fn unsupported<T>(subvol: &str, fop: FopKind) -> RioResult<T> {
    debug!("{} not supported by subvolume {}", fop, subvol);
    Err(RioError::Unsupported(format!("{} on {}", fop, subvol)))
}

/// Namespace operation surface of one node in the translator graph.
///
/// Every operation defaults to `Unsupported`, so a layer only implements the
/// calls it handles.
#[async_trait]
pub trait Subvolume: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(&self, _loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        unsupported(self.name(), FopKind::Lookup)
    }

    async fn stat(&self, _loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        unsupported(self.name(), FopKind::Stat)
    }

    async fn fstat(&self, _fd: &FdRef, _xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        unsupported(self.name(), FopKind::Fstat)
    }

    async fn truncate(
        &self,
        _loc: &Loc,
        _offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Truncate)
    }

    async fn ftruncate(
        &self,
        _fd: &FdRef,
        _offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Ftruncate)
    }

    async fn access(&self, _loc: &Loc, _mask: i32, _xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        unsupported(self.name(), FopKind::Access)
    }

    async fn open(
        &self,
        _loc: &Loc,
        _flags: i32,
        _fd: FdRef,
        _xdata: Option<XDataRef>,
    ) -> RioResult<OpenReply> {
        unsupported(self.name(), FopKind::Open)
    }

    async fn create(
        &self,
        _loc: &Loc,
        _flags: i32,
        _mode: u32,
        _umask: u32,
        _fd: FdRef,
        _xdata: Option<XDataRef>,
    ) -> RioResult<CreateReply> {
        unsupported(self.name(), FopKind::Create)
    }

    async fn mkdir(
        &self,
        _loc: &Loc,
        _mode: u32,
        _umask: u32,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EntryReply> {
        unsupported(self.name(), FopKind::Mkdir)
    }

    /// Creates an inode without linking it into any directory.
    async fn icreate(&self, _loc: &Loc, _mode: u32, _xdata: Option<XDataRef>) -> RioResult<InodeReply> {
        unsupported(self.name(), FopKind::Icreate)
    }

    /// Links the name in `loc` to the GFID carried in `gfid-req`.
    async fn namelink(&self, _loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Namelink)
    }

    async fn setattr(
        &self,
        _loc: &Loc,
        _stbuf: &Iatt,
        _valid: SetAttrValid,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Setattr)
    }

    async fn fsetattr(
        &self,
        _fd: &FdRef,
        _stbuf: &Iatt,
        _valid: SetAttrValid,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Fsetattr)
    }

    async fn getxattr(
        &self,
        _loc: &Loc,
        _name: Option<&str>,
        _xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        unsupported(self.name(), FopKind::Getxattr)
    }

    async fn setxattr(
        &self,
        _loc: &Loc,
        _dict: &XData,
        _flags: i32,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        unsupported(self.name(), FopKind::Setxattr)
    }

    async fn removexattr(
        &self,
        _loc: &Loc,
        _name: &str,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        unsupported(self.name(), FopKind::Removexattr)
    }

    async fn fgetxattr(
        &self,
        _fd: &FdRef,
        _name: Option<&str>,
        _xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        unsupported(self.name(), FopKind::Fgetxattr)
    }

    async fn fsetxattr(
        &self,
        _fd: &FdRef,
        _dict: &XData,
        _flags: i32,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        unsupported(self.name(), FopKind::Fsetxattr)
    }

    async fn flush(&self, _fd: &FdRef, _xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        unsupported(self.name(), FopKind::Flush)
    }

    async fn readv(
        &self,
        _fd: &FdRef,
        _size: usize,
        _offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<ReadReply> {
        unsupported(self.name(), FopKind::Readv)
    }

    async fn writev(
        &self,
        _fd: &FdRef,
        _data: &[u8],
        _offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Writev)
    }

    async fn fallocate(
        &self,
        _fd: &FdRef,
        _keep_size: bool,
        _offset: u64,
        _len: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Fallocate)
    }

    async fn discard(
        &self,
        _fd: &FdRef,
        _offset: u64,
        _len: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Discard)
    }

    async fn zerofill(
        &self,
        _fd: &FdRef,
        _offset: u64,
        _len: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        unsupported(self.name(), FopKind::Zerofill)
    }
}

pub type SubvolRef = Arc<dyn Subvolume>;
