use async_trait::async_trait;
use std::sync::Arc;

use rio_lib::{Gfid, Iatt, RioResult, SetAttrValid, XData};

/// Single node object store keyed by GFID.
///
/// Entries map `(parent, name)` to a GFID; the named object may live in a
/// different store. Modifying calls return the attributes before and after
/// the change.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// `mode` carries both the file type and the permission bits.
    /// Fails with `AlreadyExists` when the GFID is taken.
    async fn create_inode(&self, gfid: Gfid, mode: u32) -> RioResult<Iatt>;

    async fn stat(&self, gfid: &Gfid) -> RioResult<Iatt>;

    async fn contains(&self, gfid: &Gfid) -> bool {
        self.stat(gfid).await.is_ok()
    }

    /// Returns the parent attributes before and after the link.
    async fn link_entry(&self, parent: &Gfid, name: &str, gfid: Gfid) -> RioResult<(Iatt, Iatt)>;

    async fn lookup_entry(&self, parent: &Gfid, name: &str) -> RioResult<Gfid>;

    async fn read(&self, gfid: &Gfid, offset: u64, size: usize) -> RioResult<(Vec<u8>, Iatt)>;

    async fn write(&self, gfid: &Gfid, offset: u64, data: &[u8]) -> RioResult<(Iatt, Iatt)>;

    async fn truncate(&self, gfid: &Gfid, size: u64) -> RioResult<(Iatt, Iatt)>;

    async fn setattr(&self, gfid: &Gfid, stbuf: &Iatt, valid: SetAttrValid)
        -> RioResult<(Iatt, Iatt)>;

    /// Zeroes `[offset, offset + len)`. With `extend` the size grows to cover
    /// the range, otherwise the range is clipped to the current size.
    async fn zero_range(
        &self,
        gfid: &Gfid,
        offset: u64,
        len: u64,
        extend: bool,
    ) -> RioResult<(Iatt, Iatt)>;

    async fn allocate(
        &self,
        gfid: &Gfid,
        offset: u64,
        len: u64,
        keep_size: bool,
    ) -> RioResult<(Iatt, Iatt)>;

    async fn get_xattr(&self, gfid: &Gfid, name: Option<&str>) -> RioResult<XData>;

    async fn set_xattr(&self, gfid: &Gfid, dict: &XData, flags: i32) -> RioResult<()>;

    async fn remove_xattr(&self, gfid: &Gfid, name: &str) -> RioResult<()>;
}

pub type StorageEngineRef = Arc<dyn StorageEngine>;
