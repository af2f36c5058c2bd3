use async_trait::async_trait;
use std::sync::Arc;

use rio_common::{RioConf, RioEvent, RioLocal};
use rio_lib::*;

use crate::{entry_key, fd_key, inode_key, lookup_key, route};

/// RIO on the client.
///
/// Namespace and attribute operations go to the metadata server that owns the
/// addressed GFID, data operations on open files to the data server that owns
/// it. Anything else is answered with `Unsupported`.
pub struct RioClient {
    conf: Arc<RioConf>,
}

impl RioClient {
    pub fn new(conf: Arc<RioConf>) -> Self {
        Self { conf }
    }

    pub fn conf(&self) -> &Arc<RioConf> {
        &self.conf
    }

    /// CHILD_UP goes up once, when the last expected child reported. Every
    /// other event passes straight through.
    pub fn notify(&self, event: RioEvent, from: &str) -> Option<RioEvent> {
        if event != RioEvent::ChildUp {
            debug!("{}: {} from {}", self.conf.name, event, from);
            return Some(event);
        }

        if self.conf.child_up.child_up() {
            info!(
                "{}: all {} children up, last was {}",
                self.conf.name,
                self.conf.child_up.expected(),
                from
            );
            Some(event)
        } else {
            debug!(
                "{}: {} up, {}/{} children",
                self.conf.name,
                from,
                self.conf.child_up.seen(),
                self.conf.child_up.expected()
            );
            None
        }
    }

    fn mds_by_entry(&self, loc: &Loc, fop: FopKind) -> RioResult<SubvolRef> {
        route(&self.conf.mdclayout, entry_key(loc), fop)
    }

    fn mds_by_inode(&self, loc: &Loc, fop: FopKind) -> RioResult<SubvolRef> {
        route(&self.conf.mdclayout, inode_key(loc), fop)
    }

    fn mds_by_fd(&self, fd: &FdRef, fop: FopKind) -> RioResult<SubvolRef> {
        route(&self.conf.mdclayout, fd_key(fd), fop)
    }

    fn ds_by_fd(&self, fd: &FdRef, fop: FopKind) -> RioResult<SubvolRef> {
        route(&self.conf.dclayout, fd_key(fd), fop)
    }

    /// Second and last attempt of a lookup that came back `EREMOTE`.
    async fn lookup_remote(&self, local: &mut RioLocal, gfid: Gfid) -> RioResult<LookupReply> {
        let loc = Loc::prepare_inode_loc(local.inode.clone(), gfid, false);
        let subvol = route(&self.conf.mdclayout, Some(gfid), FopKind::Lookup)?;
        debug!(
            "{}: lookup {:?} redirected to {} as {}",
            self.conf.name,
            local.loc.path,
            subvol.name(),
            gfid
        );

        let mut reply = subvol.lookup(&loc, local.xdata_in.clone()).await?;
        reply.postparent = local.stbuf;
        Ok(reply)
    }
}

#[async_trait]
impl Subvolume for RioClient {
    fn name(&self) -> &str {
        &self.conf.name
    }

    async fn lookup(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        let mut local = RioLocal::new(&self.conf, Some(loc), None, xdata.as_ref(), FopKind::Lookup);
        let subvol = route(&self.conf.mdclayout, lookup_key(loc), FopKind::Lookup)?;

        let err = match subvol.lookup(loc, xdata).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        let retained = match &err {
            RioError::Remote(Some(buf)) if !buf.ia_gfid.is_null() => Some(**buf),
            _ => None,
        };
        let Some(stbuf) = retained else {
            if err.is_remote() {
                warn!("{}: {} answered EREMOTE without a gfid", self.conf.name, subvol.name());
            }
            return Err(err);
        };

        local.stbuf = stbuf;
        local.inode = loc.inode.clone();
        self.lookup_remote(&mut local, stbuf.ia_gfid).await
    }

    async fn mkdir(
        &self,
        loc: &Loc,
        mode: u32,
        umask: u32,
        xdata: Option<XDataRef>,
    ) -> RioResult<EntryReply> {
        self.mds_by_entry(loc, FopKind::Mkdir)?
            .mkdir(loc, mode, umask, xdata)
            .await
    }

    async fn create(
        &self,
        loc: &Loc,
        flags: i32,
        mode: u32,
        umask: u32,
        fd: FdRef,
        xdata: Option<XDataRef>,
    ) -> RioResult<CreateReply> {
        self.mds_by_entry(loc, FopKind::Create)?
            .create(loc, flags, mode, umask, fd, xdata)
            .await
    }

    async fn stat(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        self.mds_by_inode(loc, FopKind::Stat)?.stat(loc, xdata).await
    }

    async fn truncate(
        &self,
        loc: &Loc,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.mds_by_inode(loc, FopKind::Truncate)?
            .truncate(loc, offset, xdata)
            .await
    }

    async fn open(
        &self,
        loc: &Loc,
        flags: i32,
        fd: FdRef,
        xdata: Option<XDataRef>,
    ) -> RioResult<OpenReply> {
        self.mds_by_inode(loc, FopKind::Open)?
            .open(loc, flags, fd, xdata)
            .await
    }

    async fn access(&self, loc: &Loc, mask: i32, xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        self.mds_by_inode(loc, FopKind::Access)?
            .access(loc, mask, xdata)
            .await
    }

    async fn setattr(
        &self,
        loc: &Loc,
        stbuf: &Iatt,
        valid: SetAttrValid,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.mds_by_inode(loc, FopKind::Setattr)?
            .setattr(loc, stbuf, valid, xdata)
            .await
    }

    async fn getxattr(
        &self,
        loc: &Loc,
        name: Option<&str>,
        xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        self.mds_by_inode(loc, FopKind::Getxattr)?
            .getxattr(loc, name, xdata)
            .await
    }

    async fn setxattr(
        &self,
        loc: &Loc,
        dict: &XData,
        flags: i32,
        xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.mds_by_inode(loc, FopKind::Setxattr)?
            .setxattr(loc, dict, flags, xdata)
            .await
    }

    async fn removexattr(
        &self,
        loc: &Loc,
        name: &str,
        xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.mds_by_inode(loc, FopKind::Removexattr)?
            .removexattr(loc, name, xdata)
            .await
    }

    async fn fstat(&self, fd: &FdRef, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        self.mds_by_fd(fd, FopKind::Fstat)?.fstat(fd, xdata).await
    }

    async fn ftruncate(
        &self,
        fd: &FdRef,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.mds_by_fd(fd, FopKind::Ftruncate)?
            .ftruncate(fd, offset, xdata)
            .await
    }

    async fn flush(&self, fd: &FdRef, xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        self.mds_by_fd(fd, FopKind::Flush)?.flush(fd, xdata).await
    }

    async fn fsetattr(
        &self,
        fd: &FdRef,
        stbuf: &Iatt,
        valid: SetAttrValid,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.mds_by_fd(fd, FopKind::Fsetattr)?
            .fsetattr(fd, stbuf, valid, xdata)
            .await
    }

    async fn fgetxattr(
        &self,
        fd: &FdRef,
        name: Option<&str>,
        xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        self.mds_by_fd(fd, FopKind::Fgetxattr)?
            .fgetxattr(fd, name, xdata)
            .await
    }

    async fn fsetxattr(
        &self,
        fd: &FdRef,
        dict: &XData,
        flags: i32,
        xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.mds_by_fd(fd, FopKind::Fsetxattr)?
            .fsetxattr(fd, dict, flags, xdata)
            .await
    }

    async fn readv(
        &self,
        fd: &FdRef,
        size: usize,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<ReadReply> {
        self.ds_by_fd(fd, FopKind::Readv)?
            .readv(fd, size, offset, xdata)
            .await
    }

    async fn writev(
        &self,
        fd: &FdRef,
        data: &[u8],
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.ds_by_fd(fd, FopKind::Writev)?
            .writev(fd, data, offset, xdata)
            .await
    }

    async fn fallocate(
        &self,
        fd: &FdRef,
        keep_size: bool,
        offset: u64,
        len: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.ds_by_fd(fd, FopKind::Fallocate)?
            .fallocate(fd, keep_size, offset, len, xdata)
            .await
    }

    async fn discard(
        &self,
        fd: &FdRef,
        offset: u64,
        len: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.ds_by_fd(fd, FopKind::Discard)?
            .discard(fd, offset, len, xdata)
            .await
    }

    async fn zerofill(
        &self,
        fd: &FdRef,
        offset: u64,
        len: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.ds_by_fd(fd, FopKind::Zerofill)?
            .zerofill(fd, offset, len, xdata)
            .await
    }
}
