use async_trait::async_trait;

use rio_lib::*;

use crate::mds::{inode_for, require_gfid};
use crate::StorageEngineRef;

/// Mode of objects a data store creates on first access.
pub const DS_MATERIALIZE_MODE: u32 = S_IFREG | 0o600;

/// Data store: file content keyed by GFID, no namespace.
///
/// An object the store has never seen springs into existence as an empty
/// regular file on first lookup or data access.
pub struct Posix2Ds {
    name: String,
    engine: StorageEngineRef,
}

impl Posix2Ds {
    pub fn new(name: &str, engine: StorageEngineRef) -> Self {
        Self {
            name: name.to_string(),
            engine,
        }
    }

    pub fn engine(&self) -> &StorageEngineRef {
        &self.engine
    }

    async fn materialize(&self, gfid: &Gfid) -> RioResult<Iatt> {
        match self.engine.stat(gfid).await {
            Ok(buf) => return Ok(buf),
            Err(e) if e.is_not_found() => {}
            Err(e) => {
                warn!("{}: stat {} failed: {}", self.name, gfid, e);
                return Err(RioError::InvalidParam(format!("stat {} failed: {}", gfid, e)));
            }
        }

        match self.engine.create_inode(*gfid, DS_MATERIALIZE_MODE).await {
            Ok(_) => debug!("{}: materialized {}", self.name, gfid),
            // a concurrent first access got there first
            Err(RioError::AlreadyExists(_)) => {}
            Err(e) => {
                warn!("{}: create {} failed: {}", self.name, gfid, e);
                return Err(RioError::InvalidParam(format!("create {} failed: {}", gfid, e)));
            }
        }

        self.engine.stat(gfid).await.map_err(|e| {
            warn!("{}: stat {} after create failed: {}", self.name, gfid, e);
            RioError::InvalidParam(format!("stat {} failed: {}", gfid, e))
        })
    }

    fn pre_post((prebuf, postbuf): (Iatt, Iatt)) -> PrePostReply {
        PrePostReply {
            prebuf,
            postbuf,
            xdata: None,
        }
    }
}

#[async_trait]
impl Subvolume for Posix2Ds {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        let gfid = require_gfid(loc)?;
        let buf = self.materialize(&gfid).await?;
        Ok(LookupReply {
            inode: Some(inode_for(loc.inode.as_ref(), gfid)),
            buf,
            xdata: None,
            postparent: Iatt::default(),
        })
    }

    async fn stat(&self, loc: &Loc, _xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        let gfid = require_gfid(loc)?;
        Ok(AttrReply {
            buf: self.materialize(&gfid).await?,
            xdata: None,
        })
    }

    async fn fstat(&self, fd: &FdRef, _xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        Ok(AttrReply {
            buf: self.materialize(&fd.gfid()).await?,
            xdata: None,
        })
    }

    async fn truncate(
        &self,
        loc: &Loc,
        offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = require_gfid(loc)?;
        self.materialize(&gfid).await?;
        Ok(Self::pre_post(self.engine.truncate(&gfid, offset).await?))
    }

    async fn ftruncate(
        &self,
        fd: &FdRef,
        offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = fd.gfid();
        self.materialize(&gfid).await?;
        Ok(Self::pre_post(self.engine.truncate(&gfid, offset).await?))
    }

    async fn readv(
        &self,
        fd: &FdRef,
        size: usize,
        offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<ReadReply> {
        let gfid = fd.gfid();
        self.materialize(&gfid).await?;
        let (data, buf) = self.engine.read(&gfid, offset, size).await?;
        Ok(ReadReply {
            data,
            buf,
            xdata: None,
        })
    }

    async fn writev(
        &self,
        fd: &FdRef,
        data: &[u8],
        offset: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = fd.gfid();
        self.materialize(&gfid).await?;
        Ok(Self::pre_post(self.engine.write(&gfid, offset, data).await?))
    }

    async fn fallocate(
        &self,
        fd: &FdRef,
        keep_size: bool,
        offset: u64,
        len: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = fd.gfid();
        self.materialize(&gfid).await?;
        Ok(Self::pre_post(
            self.engine.allocate(&gfid, offset, len, keep_size).await?,
        ))
    }

    async fn discard(
        &self,
        fd: &FdRef,
        offset: u64,
        len: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = fd.gfid();
        self.materialize(&gfid).await?;
        Ok(Self::pre_post(
            self.engine.zero_range(&gfid, offset, len, false).await?,
        ))
    }

    async fn zerofill(
        &self,
        fd: &FdRef,
        offset: u64,
        len: u64,
        _xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        let gfid = fd.gfid();
        self.materialize(&gfid).await?;
        Ok(Self::pre_post(
            self.engine.zero_range(&gfid, offset, len, true).await?,
        ))
    }
}
