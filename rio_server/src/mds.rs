use async_trait::async_trait;
use std::sync::Arc;

use rio_common::{RioConf, RioEvent, RioLocal};
use rio_lib::*;

use crate::{server_notify, RefreshStep, RefreshTarget, Suspended};

/// RIO on a metadata server.
///
/// Namespace operations are stored into the configured local subvolume.
/// Directory inodes are created on the metadata server the layout picks for
/// their GFID, regular files next to their parent. Attributes of regular
/// files are completed from the data server when the dirty check asks for it.
pub struct RioServerMds {
    conf: Arc<RioConf>,
    local: SubvolRef,
    dirty: Arc<dyn DirtyCheck>,
}

impl RioServerMds {
    pub fn new(conf: Arc<RioConf>, dirty: Arc<dyn DirtyCheck>) -> RioResult<Self> {
        let local = conf.server_local.clone().ok_or_else(|| {
            error!("{}: server needs a local subvolume", conf.name);
            RioError::InvalidParam(format!("{}: no server local subvolume", conf.name))
        })?;
        Ok(Self { conf, local, dirty })
    }

    pub fn conf(&self) -> &Arc<RioConf> {
        &self.conf
    }

    pub fn notify(&self, event: RioEvent, from: &str) -> Option<RioEvent> {
        server_notify(&self.conf.name, Some(self.local.name()), event, from)
    }

    fn new_local(
        &self,
        loc: Option<&Loc>,
        fd: Option<&FdRef>,
        xdata: Option<&XDataRef>,
        fop: FopKind,
    ) -> RioLocal {
        RioLocal::new(&self.conf, loc, fd, xdata, fop)
    }

    fn require_gfid(loc: &Loc) -> RioResult<Gfid> {
        loc.inode_gfid()
            .ok_or_else(|| RioError::InvalidParam(format!("no gfid in loc {:?}", loc.path)))
    }

    /// Inode addressed requests for an inode another metadata server owns are
    /// bounced back to the client.
    fn check_owner(&self, gfid: &Gfid) -> RioResult<()> {
        let owner = self.conf.mdclayout.search(gfid).ok_or_else(|| {
            error!("{}: no metadata subvolume for {}", self.conf.name, gfid);
            RioError::InvalidParam(format!("no metadata subvolume for {}", gfid))
        })?;
        if owner.name() == self.local.name() {
            return Ok(());
        }
        debug!(
            "{}: {} belongs to {}, answering EREMOTE",
            self.conf.name,
            gfid,
            owner.name()
        );
        Err(RioError::remote(*gfid))
    }

    fn check_refresh<R: RefreshTarget>(
        &self,
        local: &RioLocal,
        inode: Option<&Inode>,
        reply: R,
    ) -> RefreshStep<R> {
        if local.is_refreshed() || !reply.attr().is_regular() {
            return RefreshStep::Respond(Ok(reply));
        }
        if !self.dirty.is_dirty(inode, reply.attr()) {
            return RefreshStep::Respond(Ok(reply));
        }
        RefreshStep::Suspend(Suspended::new(reply))
    }

    async fn refresh_from_ds<R: RefreshTarget + Send>(
        &self,
        local: &mut RioLocal,
        inode: Option<&Inode>,
        mut frozen: Suspended<R>,
    ) -> RefreshStep<R> {
        let gfid = frozen.gfid();
        let Some(ds) = self.conf.dclayout.search(&gfid) else {
            local.mark_refreshed();
            error!("{}: no data subvolume for {}", self.conf.name, gfid);
            return RefreshStep::Respond(Err(RioError::InvalidParam(format!(
                "no data subvolume for {}",
                gfid
            ))));
        };

        debug!("{}: refreshing {} from {}", self.conf.name, gfid, ds.name());
        let ds_loc = Loc::prepare_inode_loc(None, gfid, false);
        let result = ds.lookup(&ds_loc, None).await;
        local.mark_refreshed();
        match result {
            Ok(ds_reply) => {
                frozen.merge_ds(&ds_reply.buf);
                self.check_refresh(local, inode, frozen.resume())
            }
            Err(e) => {
                warn!("{}: refresh of {} from {} failed: {}", self.conf.name, gfid, ds.name(), e);
                RefreshStep::Respond(Err(e))
            }
        }
    }

    /// Runs a reply through the dirty check, consulting the data server at
    /// most once per request.
    async fn refresh<R: RefreshTarget + Send>(
        &self,
        local: &mut RioLocal,
        inode: Option<&Inode>,
        reply: R,
    ) -> RioResult<R> {
        let mut step = self.check_refresh(local, inode, reply);
        loop {
            step = match step {
                RefreshStep::Respond(result) => return result,
                RefreshStep::Suspend(frozen) => self.refresh_from_ds(local, inode, frozen).await,
            };
        }
    }
}

#[async_trait]
impl Subvolume for RioServerMds {
    fn name(&self) -> &str {
        &self.conf.name
    }

    async fn lookup(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        let mut local = self.new_local(Some(loc), None, xdata.as_ref(), FopKind::Lookup);
        if loc.is_nameless() {
            let gfid = Self::require_gfid(loc)?;
            self.check_owner(&gfid)?;
        }

        // EREMOTE from the store goes back to the client untouched
        let reply = self.local.lookup(loc, xdata).await?;
        let inode = reply.inode.clone();
        self.refresh(&mut local, inode.as_deref(), reply).await
    }

    async fn stat(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        let mut local = self.new_local(Some(loc), None, xdata.as_ref(), FopKind::Stat);
        let gfid = Self::require_gfid(loc)?;
        self.check_owner(&gfid)?;

        let reply = self.local.stat(loc, xdata).await?;
        self.refresh(&mut local, loc.inode.as_deref(), reply).await
    }

    async fn fstat(&self, fd: &FdRef, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        let mut local = self.new_local(None, Some(fd), xdata.as_ref(), FopKind::Fstat);
        let reply = self.local.fstat(fd, xdata).await?;
        self.refresh(&mut local, Some(&*fd.inode), reply).await
    }

    async fn setattr(
        &self,
        loc: &Loc,
        stbuf: &Iatt,
        valid: SetAttrValid,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let mut local = self.new_local(Some(loc), None, xdata.as_ref(), FopKind::Setattr);
        let gfid = Self::require_gfid(loc)?;
        self.check_owner(&gfid)?;

        let reply = self.local.setattr(loc, stbuf, valid, xdata).await?;
        self.refresh(&mut local, loc.inode.as_deref(), reply).await
    }

    async fn fsetattr(
        &self,
        fd: &FdRef,
        stbuf: &Iatt,
        valid: SetAttrValid,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let mut local = self.new_local(None, Some(fd), xdata.as_ref(), FopKind::Fsetattr);
        let reply = self.local.fsetattr(fd, stbuf, valid, xdata).await?;
        self.refresh(&mut local, Some(&*fd.inode), reply).await
    }

    /// The refresh action for truncate is forwarding the truncate itself; the
    /// held reply goes out unmerged whatever the data server answers.
    async fn truncate(
        &self,
        loc: &Loc,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let mut local = self.new_local(Some(loc), None, xdata.as_ref(), FopKind::Truncate);
        let gfid = Self::require_gfid(loc)?;
        self.check_owner(&gfid)?;

        let reply = self.local.truncate(loc, offset, xdata.clone()).await?;
        let inode = loc.inode.as_deref();
        let mut step = self.check_refresh(&local, inode, reply);
        loop {
            step = match step {
                RefreshStep::Respond(result) => return result,
                RefreshStep::Suspend(frozen) => {
                    let gfid = frozen.gfid();
                    match self.conf.dclayout.search(&gfid) {
                        Some(ds) => {
                            let ds_loc = Loc::prepare_inode_loc(None, gfid, false);
                            if let Err(e) = ds.truncate(&ds_loc, offset, xdata.clone()).await {
                                warn!("{}: truncate of {} on {} failed: {}", self.conf.name, gfid, ds.name(), e);
                            }
                        }
                        None => warn!("{}: no data subvolume to truncate {}", self.conf.name, gfid),
                    }
                    local.mark_refreshed();
                    self.check_refresh(&local, inode, frozen.resume())
                }
            };
        }
    }

    async fn mkdir(
        &self,
        loc: &Loc,
        mode: u32,
        _umask: u32,
        xdata: Option<XDataRef>,
    ) -> RioResult<EntryReply> {
        let mut local = self.new_local(Some(loc), None, xdata.as_ref(), FopKind::Mkdir);
        let name = loc.name.as_deref().ok_or_else(|| {
            RioError::InvalidParam(format!("mkdir without a name: {:?}", loc.path))
        })?;

        let gfid = match xdata.as_ref() {
            Some(xdata) => xdata.get_gfid(GFID_REQ_KEY)?,
            None => None,
        }
        .ok_or_else(|| {
            error!(
                "{}: missing {} for directory {} under {}",
                self.conf.name, GFID_REQ_KEY, name, loc.pargfid
            );
            RioError::InvalidParam(format!("mkdir {} without {}", name, GFID_REQ_KEY))
        })?;

        let owner = self.conf.mdclayout.search(&gfid).ok_or_else(|| {
            error!(
                "{}: no subvolume for {}, failing mkdir of {} under {}",
                self.conf.name, gfid, name, loc.pargfid
            );
            RioError::InvalidParam(format!("no metadata subvolume for {}", gfid))
        })?;

        let inode_loc = Loc::prepare_inode_loc(loc.inode.clone(), gfid, true);
        let created = owner
            .icreate(&inode_loc, S_IFDIR | (mode & PROT_MASK), xdata.clone())
            .await
            .map_err(|e| {
                warn!("{}: icreate {} on {} failed: {}", self.conf.name, gfid, owner.name(), e);
                e
            })?;

        local.stbuf.copy_from(&created.buf);
        local.inode = Some(created.inode);
        local.xdata_out = created.xdata;

        // no journal: an inode left by a failed namelink stays orphaned
        let linked = self
            .local
            .namelink(&local.loc, local.xdata_in.clone())
            .await
            .map_err(|e| {
                warn!(
                    "{}: namelink {} -> {} failed, inode on {} is orphaned: {}",
                    self.conf.name,
                    name,
                    gfid,
                    owner.name(),
                    e
                );
                e
            })?;

        Ok(EntryReply {
            inode: local.inode.take(),
            buf: local.stbuf,
            preparent: linked.prebuf,
            postparent: linked.postbuf,
            xdata: linked.xdata,
        })
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
        let _local = self.new_local(Some(loc), Some(&fd), xdata.as_ref(), FopKind::Create);
        let parent = loc.parent_gfid().ok_or_else(|| {
            RioError::InvalidParam(format!("create without a parent: {:?}", loc.path))
        })?;

        let gfid = self.conf.mdclayout.colocate(&parent);
        let mut req = xdata.as_deref().cloned().unwrap_or_default();
        req.set_gfid(GFID_REQ_KEY, gfid);
        debug!("{}: create {:?} as {}", self.conf.name, loc.name, gfid);

        self.local
            .create(loc, flags, mode, umask, fd, Some(Arc::new(req)))
            .await
    }

    async fn icreate(&self, loc: &Loc, mode: u32, xdata: Option<XDataRef>) -> RioResult<InodeReply> {
        self.local.icreate(loc, mode, xdata).await
    }

    async fn namelink(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<PrePostReply> {
        self.local.namelink(loc, xdata).await
    }

    async fn open(
        &self,
        loc: &Loc,
        flags: i32,
        fd: FdRef,
        xdata: Option<XDataRef>,
    ) -> RioResult<OpenReply> {
        self.local.open(loc, flags, fd, xdata).await
    }

    async fn access(&self, loc: &Loc, mask: i32, xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        self.local.access(loc, mask, xdata).await
    }

    async fn flush(&self, fd: &FdRef, xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        self.local.flush(fd, xdata).await
    }

    async fn ftruncate(
        &self,
        fd: &FdRef,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.local.ftruncate(fd, offset, xdata).await
    }

    async fn getxattr(
        &self,
        loc: &Loc,
        name: Option<&str>,
        xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        self.local.getxattr(loc, name, xdata).await
    }

    async fn setxattr(
        &self,
        loc: &Loc,
        dict: &XData,
        flags: i32,
        xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.local.setxattr(loc, dict, flags, xdata).await
    }

    async fn removexattr(
        &self,
        loc: &Loc,
        name: &str,
        xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.local.removexattr(loc, name, xdata).await
    }

    async fn fgetxattr(
        &self,
        fd: &FdRef,
        name: Option<&str>,
        xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        self.local.fgetxattr(fd, name, xdata).await
    }

    async fn fsetxattr(
        &self,
        fd: &FdRef,
        dict: &XData,
        flags: i32,
        xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.local.fsetxattr(fd, dict, flags, xdata).await
    }
}
