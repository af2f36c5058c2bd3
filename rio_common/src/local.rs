use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use rio_lib::{FdRef, FopKind, Iatt, InodeRef, Loc, XData, XDataRef};

use crate::RioConf;

/// Whether the dirty-attribute refresh already ran for this request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RefreshState {
    #[default]
    NotRefreshed,
    Refreshed,
}

/// Creation and release counters for request contexts of one configuration.
#[derive(Debug, Default)]
pub struct LocalStats {
    created: AtomicU64,
    released: AtomicU64,
}

impl LocalStats {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Acquire)
    }

    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.released())
    }
}

/// Per-request context, alive from the start of one operation until its
/// reply is produced. Dropping it releases every reference it holds and
/// counts the release exactly once.
pub struct RioLocal {
    pub loc: Loc,
    pub fd: Option<FdRef>,
    pub xdata_in: Option<XDataRef>,
    pub fop: FopKind,
    /// Inode handle retained across a redirect or a two-step create.
    pub inode: Option<InodeRef>,
    pub xdata_out: Option<XData>,
    /// Attribute record retained across a redirect or a two-step create.
    pub stbuf: Iatt,
    pub refresh: RefreshState,
    stats: Arc<LocalStats>,
}

impl RioLocal {
    pub fn new(
        conf: &RioConf,
        loc: Option<&Loc>,
        fd: Option<&FdRef>,
        xdata: Option<&XDataRef>,
        fop: FopKind,
    ) -> Self {
        Self::with_stats(conf.local_stats.clone(), loc, fd, xdata, fop)
    }

    pub fn with_stats(
        stats: Arc<LocalStats>,
        loc: Option<&Loc>,
        fd: Option<&FdRef>,
        xdata: Option<&XDataRef>,
        fop: FopKind,
    ) -> Self {
        stats.created.fetch_add(1, Ordering::AcqRel);
        Self {
            loc: loc.cloned().unwrap_or_default(),
            fd: fd.cloned(),
            xdata_in: xdata.cloned(),
            fop,
            inode: None,
            xdata_out: None,
            stbuf: Iatt::default(),
            refresh: RefreshState::NotRefreshed,
            stats,
        }
    }

    pub fn is_refreshed(&self) -> bool {
        self.refresh == RefreshState::Refreshed
    }

    pub fn mark_refreshed(&mut self) {
        self.refresh = RefreshState::Refreshed;
    }
}

impl Drop for RioLocal {
    fn drop(&mut self) {
        self.stats.released.fetch_add(1, Ordering::AcqRel);
        trace!("release local for {} {:?}", self.fop, self.loc.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rio_lib::{Fd, Gfid, Inode};

    #[test]
    fn test_release_once() {
        let stats = Arc::new(LocalStats::default());
        let inode = Inode::new(Gfid::generate());
        let fd = Fd::new(inode.clone(), 0);
        let xdata: XDataRef = Arc::new(XData::new());
        let loc = Loc::from_gfid(inode.gfid()).with_inode(inode.clone());

        {
            let mut local = RioLocal::with_stats(
                stats.clone(),
                Some(&loc),
                Some(&fd),
                Some(&xdata),
                FopKind::Stat,
            );
            local.inode = Some(inode.clone());
            assert_eq!(stats.live(), 1);
            assert_eq!(Arc::strong_count(&xdata), 2);
            assert_eq!(Arc::strong_count(&fd), 2);
        }

        assert_eq!(stats.created(), 1);
        assert_eq!(stats.released(), 1);
        assert_eq!(Arc::strong_count(&xdata), 1);
        assert_eq!(Arc::strong_count(&fd), 1);
        // loc + fd + the test's own handle
        assert_eq!(Arc::strong_count(&inode), 3);
    }

    #[test]
    fn test_loc_copy_is_independent() {
        let stats = Arc::new(LocalStats::default());
        let mut loc = Loc::from_parent(Gfid::ROOT, "a");
        let local = RioLocal::with_stats(stats, Some(&loc), None, None, FopKind::Lookup);
        loc.name = Some("b".to_string());
        assert_eq!(local.loc.name.as_deref(), Some("a"));
        assert!(!local.is_refreshed());
    }
}
