use async_trait::async_trait;

use rio_lib::*;

use crate::StorageEngineRef;

pub(crate) fn inode_for(live: Option<&InodeRef>, gfid: Gfid) -> InodeRef {
    match live {
        Some(inode) if inode.gfid() == gfid => inode.clone(),
        _ => Inode::new(gfid),
    }
}

pub(crate) fn require_gfid(loc: &Loc) -> RioResult<Gfid> {
    loc.inode_gfid()
        .ok_or_else(|| RioError::InvalidParam(format!("no gfid in loc {:?}", loc.path)))
}

fn require_entry(loc: &Loc) -> RioResult<(Gfid, &str)> {
    let parent = loc
        .parent_gfid()
        .ok_or_else(|| RioError::InvalidParam(format!("no parent in loc {:?}", loc.path)))?;
    let name = loc
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| RioError::InvalidParam(format!("no name in loc {:?}", loc.path)))?;
    Ok((parent, name))
}

// the MDS record never holds a size of its own
fn mds_valid(valid: SetAttrValid) -> SetAttrValid {
    SetAttrValid(valid.0 & !SetAttrValid::SIZE)
}

fn gfid_req(xdata: Option<&XDataRef>) -> RioResult<Option<Gfid>> {
    match xdata {
        Some(xdata) => xdata.get_gfid(GFID_REQ_KEY),
        None => Ok(None),
    }
}

/// Metadata store: inodes plus the directory entries of the inodes it owns.
///
/// A name may point at an inode held by another metadata store; resolving it
/// here answers `Remote` with the inode's GFID.
pub struct Posix2Mds {
    name: String,
    engine: StorageEngineRef,
}

impl Posix2Mds {
    pub fn new(name: &str, engine: StorageEngineRef) -> Self {
        Self {
            name: name.to_string(),
            engine,
        }
    }

    pub fn engine(&self) -> &StorageEngineRef {
        &self.engine
    }

    async fn stat_local(&self, gfid: &Gfid) -> RioResult<Iatt> {
        self.engine.stat(gfid).await
    }
}

#[async_trait]
impl Subvolume for Posix2Mds {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        if loc.is_nameless() {
            let gfid = require_gfid(loc)?;
            let buf = self.stat_local(&gfid).await?;
            return Ok(LookupReply {
                inode: Some(inode_for(loc.inode.as_ref(), gfid)),
                buf,
                xdata: None,
                postparent: Iatt::default(),
            });
        }

        let (parent, name) = require_entry(loc)?;
        let gfid = self.engine.lookup_entry(&parent, name).await?;
        let postparent = self.stat_local(&parent).await?;
        let buf = match self.stat_local(&gfid).await {
            Ok(buf) => buf,
            Err(e) if e.is_not_found() => {
                debug!("{}: {}/{} resolves to remote inode {}", self.name, parent, name, gfid);
                return Err(RioError::remote(gfid));
            }
            Err(e) => return Err(e),
        };

        Ok(LookupReply {
            inode: Some(inode_for(loc.inode.as_ref(), gfid)),
            buf,
            xdata: None,
            postparent,
        })
    }

    async fn stat(&self, loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        let gfid = require_gfid(loc)?;
        Ok(AttrReply {
            buf: self.stat_local(&gfid).await?,
            xdata: None,
        })
    }

    async fn fstat(&self, fd: &FdRef, _xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        Ok(AttrReply {
            buf: self.stat_local(&fd.gfid()).await?,
            xdata: None,
        })
    }

    // size lives on the data server; only the inode's existence is checked here
    async fn truncate(
        &self,
        loc: &Loc,
        _offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = require_gfid(loc)?;
        let buf = self.stat_local(&gfid).await?;
        Ok(PrePostReply {
            prebuf: buf,
            postbuf: buf,
            xdata: None,
        })
    }

    async fn ftruncate(
        &self,
        fd: &FdRef,
        _offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let buf = self.stat_local(&fd.gfid()).await?;
        Ok(PrePostReply {
            prebuf: buf,
            postbuf: buf,
            xdata: None,
        })
    }

    async fn access(&self, loc: &Loc, _mask: i32, _xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        let gfid = require_gfid(loc)?;
        self.stat_local(&gfid).await?;
        Ok(EmptyReply::default())
    }

    async fn open(
        &self,
        loc: &Loc,
        flags: i32,
        fd: FdRef,
        _xdata: Option<XDataRef>,
    ) -> RioResult<OpenReply> {
        let gfid = require_gfid(loc)?;
        self.stat_local(&gfid).await?;
        let fd = if fd.gfid() == gfid {
            fd
        } else {
            Fd::new(inode_for(loc.inode.as_ref(), gfid), flags)
        };
        Ok(OpenReply { fd, xdata: None })
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
        let (parent, name) = require_entry(loc)?;

        match self.engine.lookup_entry(&parent, name).await {
            Ok(existing) => {
                if self.engine.contains(&existing).await {
                    return Err(RioError::AlreadyExists(format!("{}/{}", parent, name)));
                }
                debug!("{}: create hit remote inode {}", self.name, existing);
                return Err(RioError::remote(existing));
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let gfid = gfid_req(xdata.as_ref())?.unwrap_or_else(Gfid::generate);
        let buf = self
            .engine
            .create_inode(gfid, S_IFREG | (mode & !umask & PROT_MASK))
            .await?;
        let (preparent, postparent) = self.engine.link_entry(&parent, name, gfid).await?;

        let inode = inode_for(loc.inode.as_ref(), gfid);
        let fd = if fd.gfid() == gfid {
            fd
        } else {
            Fd::new(inode.clone(), flags)
        };
        Ok(CreateReply {
            fd,
            inode,
            buf,
            preparent,
            postparent,
            xdata: None,
        })
    }

    async fn icreate(&self, loc: &Loc, mode: u32, _xdata: Option<XDataRef>) -> RioResult<InodeReply> {
        let gfid = require_gfid(loc)?;
        let buf = self.engine.create_inode(gfid, mode).await?;
        Ok(InodeReply {
            inode: inode_for(loc.inode.as_ref(), gfid),
            buf,
            xdata: None,
        })
    }

    async fn namelink(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<PrePostReply> {
        let (parent, name) = require_entry(loc)?;
        let gfid = gfid_req(xdata.as_ref())?.ok_or_else(|| {
            RioError::InvalidParam(format!("namelink {}/{} without {}", parent, name, GFID_REQ_KEY))
        })?;
        let (prebuf, postbuf) = self.engine.link_entry(&parent, name, gfid).await?;
        Ok(PrePostReply {
            prebuf,
            postbuf,
            xdata: None,
        })
    }

    async fn setattr(
        &self,
        loc: &Loc,
        stbuf: &Iatt,
        valid: SetAttrValid,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = require_gfid(loc)?;
        let (prebuf, postbuf) = self.engine.setattr(&gfid, stbuf, mds_valid(valid)).await?;
        Ok(PrePostReply {
            prebuf,
            postbuf,
            xdata: None,
        })
    }

    async fn fsetattr(
        &self,
        fd: &FdRef,
        stbuf: &Iatt,
        valid: SetAttrValid,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let (prebuf, postbuf) = self
            .engine
            .setattr(&fd.gfid(), stbuf, mds_valid(valid))
            .await?;
        Ok(PrePostReply {
            prebuf,
            postbuf,
            xdata: None,
        })
    }

    async fn getxattr(
        &self,
        loc: &Loc,
        name: Option<&str>,
        _xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        let gfid = require_gfid(loc)?;
        Ok(XattrReply {
            dict: self.engine.get_xattr(&gfid, name).await?,
            xdata: None,
        })
    }

    async fn setxattr(
        &self,
        loc: &Loc,
        dict: &XData,
        flags: i32,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        let gfid = require_gfid(loc)?;
        self.engine.set_xattr(&gfid, dict, flags).await?;
        Ok(EmptyReply::default())
    }

    async fn removexattr(
        &self,
        loc: &Loc,
        name: &str,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        let gfid = require_gfid(loc)?;
        self.engine.remove_xattr(&gfid, name).await?;
        Ok(EmptyReply::default())
    }

    async fn fgetxattr(
        &self,
        fd: &FdRef,
        name: Option<&str>,
        _xdata: Option<XDataRef>,
    ) -> RioResult<XattrReply> {
        Ok(XattrReply {
            dict: self.engine.get_xattr(&fd.gfid(), name).await?,
            xdata: None,
        })
    }

    async fn fsetxattr(
        &self,
        fd: &FdRef,
        dict: &XData,
        flags: i32,
        _xdata: Option<XDataRef>,
    ) -> RioResult<EmptyReply> {
        self.engine.set_xattr(&fd.gfid(), dict, flags).await?;
        Ok(EmptyReply::default())
    }

    async fn flush(&self, fd: &FdRef, _xdata: Option<XDataRef>) -> RioResult<EmptyReply> {
        self.stat_local(&fd.gfid()).await?;
        Ok(EmptyReply::default())
    }
}
