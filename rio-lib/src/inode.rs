use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::{Gfid, Iatt};

/// Live in-memory handle for an object. Shared through `InodeRef`.
#[derive(Debug)]
pub struct Inode {
    gfid: Gfid,
    dirty: AtomicBool,
}

pub type InodeRef = Arc<Inode>;

impl Inode {
    pub fn new(gfid: Gfid) -> InodeRef {
        Arc::new(Self {
            gfid,
            dirty: AtomicBool::new(false),
        })
    }

    pub fn gfid(&self) -> Gfid {
        self.gfid
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }
}

/// Open file handle.
#[derive(Debug)]
pub struct Fd {
    pub inode: InodeRef,
    pub flags: i32,
}

pub type FdRef = Arc<Fd>;

impl Fd {
    pub fn new(inode: InodeRef, flags: i32) -> FdRef {
        Arc::new(Self { inode, flags })
    }

    pub fn gfid(&self) -> Gfid {
        self.inode.gfid()
    }
}

/// Decides whether the MDS copy of the data owned attributes may be stale.
pub trait DirtyCheck: Send + Sync {
    fn is_dirty(&self, inode: Option<&Inode>, buf: &Iatt) -> bool;
}

/// Uses the flag carried by the inode handle. Objects without a live handle
/// are treated as clean.
pub struct InodeDirtyFlag;

impl DirtyCheck for InodeDirtyFlag {
    fn is_dirty(&self, inode: Option<&Inode>, buf: &Iatt) -> bool {
        if !buf.is_regular() {
            return false;
        }
        inode.map(|i| i.is_dirty()).unwrap_or(false)
    }
}

/// Every regular file is considered dirty.
pub struct AlwaysDirty;

impl DirtyCheck for AlwaysDirty {
    fn is_dirty(&self, _inode: Option<&Inode>, buf: &Iatt) -> bool {
        buf.is_regular()
    }
}

pub struct NeverDirty;

impl DirtyCheck for NeverDirty {
    fn is_dirty(&self, _inode: Option<&Inode>, _buf: &Iatt) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IaType;

    #[test]
    fn test_dirty_flag_only_for_regular_files() {
        let inode = Inode::new(Gfid::generate());
        let file = Iatt::new(inode.gfid(), IaType::Regular, 0o644);
        let dir = Iatt::new(inode.gfid(), IaType::Directory, 0o755);

        let check = InodeDirtyFlag;
        assert!(!check.is_dirty(Some(&inode), &file));
        inode.mark_dirty();
        assert!(check.is_dirty(Some(&inode), &file));
        assert!(!check.is_dirty(Some(&inode), &dir));
        assert!(!check.is_dirty(None, &file));
        inode.clear_dirty();
        assert!(!inode.is_dirty());

        assert!(AlwaysDirty.is_dirty(None, &file));
        assert!(!NeverDirty.is_dirty(Some(&inode), &file));
    }
}
