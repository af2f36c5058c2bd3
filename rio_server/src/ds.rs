use async_trait::async_trait;

use rio_common::RioEvent;
use rio_lib::*;

use crate::server_notify;

/// RIO on a data server: every data operation goes to the local store, and
/// the attributes coming back are stripped to what the data server owns.
pub struct RioServerDs {
    name: String,
    local: SubvolRef,
}

impl RioServerDs {
    pub fn new(name: &str, local: SubvolRef) -> Self {
        Self {
            name: name.to_string(),
            local,
        }
    }

    pub fn notify(&self, event: RioEvent, from: &str) -> Option<RioEvent> {
        server_notify(&self.name, Some(self.local.name()), event, from)
    }

    fn cleanse(mut reply: PrePostReply) -> PrePostReply {
        reply.prebuf.cleanse_ds();
        reply.postbuf.cleanse_ds();
        reply
    }
}

#[async_trait]
impl Subvolume for RioServerDs {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        let mut reply = self.local.lookup(loc, xdata).await?;
        reply.buf.cleanse_ds();
        Ok(reply)
    }

    async fn stat(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        let mut reply = self.local.stat(loc, xdata).await?;
        reply.buf.cleanse_ds();
        Ok(reply)
    }

    async fn fstat(&self, fd: &FdRef, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        let mut reply = self.local.fstat(fd, xdata).await?;
        reply.buf.cleanse_ds();
        Ok(reply)
    }

    async fn truncate(
        &self,
        loc: &Loc,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        Ok(Self::cleanse(self.local.truncate(loc, offset, xdata).await?))
    }

    async fn ftruncate(
        &self,
        fd: &FdRef,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        Ok(Self::cleanse(self.local.ftruncate(fd, offset, xdata).await?))
    }

    async fn readv(
        &self,
        fd: &FdRef,
        size: usize,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<ReadReply> {
        let mut reply = self.local.readv(fd, size, offset, xdata).await?;
        reply.buf.cleanse_ds();
        Ok(reply)
    }

    async fn writev(
        &self,
        fd: &FdRef,
        data: &[u8],
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        Ok(Self::cleanse(self.local.writev(fd, data, offset, xdata).await?))
    }

    async fn fallocate(
        &self,
        fd: &FdRef,
        keep_size: bool,
        offset: u64,
        len: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        Ok(Self::cleanse(
            self.local.fallocate(fd, keep_size, offset, len, xdata).await?,
        ))
    }

    async fn discard(
        &self,
        fd: &FdRef,
        offset: u64,
        len: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        Ok(Self::cleanse(self.local.discard(fd, offset, len, xdata).await?))
    }

    async fn zerofill(
        &self,
        fd: &FdRef,
        offset: u64,
        len: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        Ok(Self::cleanse(self.local.zerofill(fd, offset, len, xdata).await?))
    }
}
