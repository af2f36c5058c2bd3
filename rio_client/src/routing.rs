use rio_common::Layout;
use rio_lib::{FdRef, FopKind, Gfid, Loc, RioError, RioResult, SubvolRef};

/// Placement key of a lookup: the object itself when addressed by GFID, the
/// parent directory otherwise.
pub fn lookup_key(loc: &Loc) -> Option<Gfid> {
    if loc.is_nameless() {
        loc.inode_gfid()
    } else {
        loc.parent_gfid()
    }
}

/// Placement key of entry creating operations.
pub fn entry_key(loc: &Loc) -> Option<Gfid> {
    loc.parent_gfid()
}

pub fn inode_key(loc: &Loc) -> Option<Gfid> {
    loc.inode_gfid()
}

pub fn fd_key(fd: &FdRef) -> Option<Gfid> {
    let gfid = fd.gfid();
    if gfid.is_null() {
        None
    } else {
        Some(gfid)
    }
}

/// Resolves `key` through `layout`. Both a missing key and a layout miss are
/// `InvalidParam`.
pub fn route(layout: &Layout, key: Option<Gfid>, fop: FopKind) -> RioResult<SubvolRef> {
    let gfid = key.ok_or_else(|| {
        warn!("{}: no gfid to place the request by", fop);
        RioError::InvalidParam(format!("{}: no placement gfid", fop))
    })?;
    layout.search(&gfid).ok_or_else(|| {
        error!("{}: no subvolume for {}", fop, gfid);
        RioError::InvalidParam(format!("{}: no subvolume for {}", fop, gfid))
    })
}
