use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use posix2::{MemEngine, Posix2Ds, Posix2Mds, StorageEngine};
use rio_common::{RioConf, RioEvent, RioVolumeConfig};
use rio_lib::*;

use crate::{RioServerDs, RioServerMds};

type CallLog = Arc<Mutex<Vec<String>>>;

/// Forwards to a real store, recording `name:fop` for every call and failing
/// the fops it was told to fail.
struct Recorder {
    inner: SubvolRef,
    log: CallLog,
    fail: Mutex<HashSet<FopKind>>,
}

impl Recorder {
    fn new(inner: SubvolRef, log: CallLog) -> Arc<Self> {
        Arc::new(Self {
            inner,
            log,
            fail: Mutex::new(HashSet::new()),
        })
    }

    fn fail_on(&self, fop: FopKind) {
        self.fail.lock().unwrap().insert(fop);
    }

    fn enter(&self, fop: FopKind) -> RioResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:{}", self.inner.name(), fop));
        if self.fail.lock().unwrap().contains(&fop) {
            return Err(RioError::IoError(format!("{} injected failure", fop)));
        }
        Ok(())
    }
}

#[async_trait]
impl Subvolume for Recorder {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn lookup(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<LookupReply> {
        self.enter(FopKind::Lookup)?;
        self.inner.lookup(loc, xdata).await
    }

    async fn stat(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        self.enter(FopKind::Stat)?;
        self.inner.stat(loc, xdata).await
    }

    async fn fstat(&self, fd: &FdRef, xdata: Option<XDataRef>) -> RioResult<AttrReply> {
        self.enter(FopKind::Fstat)?;
        self.inner.fstat(fd, xdata).await
    }

    async fn truncate(
        &self,
        loc: &Loc,
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.enter(FopKind::Truncate)?;
        self.inner.truncate(loc, offset, xdata).await
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
        self.enter(FopKind::Create)?;
        self.inner.create(loc, flags, mode, umask, fd, xdata).await
    }

    async fn icreate(&self, loc: &Loc, mode: u32, xdata: Option<XDataRef>) -> RioResult<InodeReply> {
        self.enter(FopKind::Icreate)?;
        self.inner.icreate(loc, mode, xdata).await
    }

    async fn namelink(&self, loc: &Loc, xdata: Option<XDataRef>) -> RioResult<PrePostReply> {
        self.enter(FopKind::Namelink)?;
        self.inner.namelink(loc, xdata).await
    }

    async fn setattr(
        &self,
        loc: &Loc,
        stbuf: &Iatt,
        valid: SetAttrValid,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.enter(FopKind::Setattr)?;
        self.inner.setattr(loc, stbuf, valid, xdata).await
    }

    async fn writev(
        &self,
        fd: &FdRef,
        data: &[u8],
        offset: u64,
        xdata: Option<XDataRef>,
    ) -> RioResult<PrePostReply> {
        self.enter(FopKind::Writev)?;
        self.inner.writev(fd, data, offset, xdata).await
    }
}

struct Cluster {
    server: RioServerMds,
    conf: Arc<RioConf>,
    log: CallLog,
    mds0: Arc<MemEngine>,
    mds1: Arc<MemEngine>,
    recorders: Vec<Arc<Recorder>>,
}

impl Cluster {
    fn recorder(&self, name: &str) -> &Arc<Recorder> {
        self.recorders
            .iter()
            .find(|r| r.name() == name)
            .expect("recorder")
    }

    fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, suffix: &str) -> usize {
        self.calls().iter().filter(|c| c.ends_with(suffix)).count()
    }

    fn clear(&self) {
        self.log.lock().unwrap().clear();
    }

    /// A fresh GFID the metadata layout places on `owner`.
    fn gfid_owned_by(&self, owner: &str) -> Gfid {
        loop {
            let gfid = Gfid::generate();
            if self.conf.mdclayout.search(&gfid).unwrap().name() == owner {
                return gfid;
            }
        }
    }

    /// Regular file `name` under the root, inode and entry both on mds-0.
    async fn local_file(&self, name: &str) -> Gfid {
        let gfid = self.gfid_owned_by("mds-0");
        self.mds0.create_inode(gfid, S_IFREG | 0o644).await.unwrap();
        self.mds0.link_entry(&Gfid::ROOT, name, gfid).await.unwrap();
        let mut owner = Iatt::default();
        owner.ia_uid = 1000;
        self.mds0
            .setattr(&gfid, &owner, SetAttrValid(SetAttrValid::UID))
            .await
            .unwrap();
        gfid
    }

    async fn write_ds(&self, gfid: Gfid, data: &[u8]) {
        let ds = self.conf.dclayout.search(&gfid).unwrap();
        let fd = Fd::new(Inode::new(gfid), 0);
        ds.writev(&fd, data, 0, None).await.unwrap();
    }
}

async fn create_cluster(dirty: Arc<dyn DirtyCheck>) -> Cluster {
    let _ = env_logger::builder().is_test(true).try_init();
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));

    let mds0 = Arc::new(MemEngine::with_root("mds-0", 1).await.unwrap());
    let mds1 = Arc::new(MemEngine::with_root("mds-1", 2).await.unwrap());
    let mut recorders = vec![
        Recorder::new(Arc::new(Posix2Mds::new("mds-0", mds0.clone())), log.clone()),
        Recorder::new(Arc::new(Posix2Mds::new("mds-1", mds1.clone())), log.clone()),
    ];
    for (dev, name) in ["ds-0", "ds-1"].iter().enumerate() {
        let store = Arc::new(Posix2Ds::new(name, Arc::new(MemEngine::new(name, 10 + dev as u64))));
        recorders.push(Recorder::new(
            Arc::new(RioServerDs::new(name, store)),
            log.clone(),
        ));
    }

    let config = RioVolumeConfig {
        data_subvolumes: "ds-0:ds-1".to_string(),
        metadata_subvolumes: "mds-0:mds-1".to_string(),
        server_local_subvol: Some("mds-0".to_string()),
        ..Default::default()
    };
    let children: Vec<SubvolRef> = recorders.iter().map(|r| r.clone() as SubvolRef).collect();
    let conf = Arc::new(RioConf::init("rio-server-0", config, &children).unwrap());
    let server = RioServerMds::new(conf.clone(), dirty).unwrap();

    Cluster {
        server,
        conf,
        log,
        mds0,
        mds1,
        recorders,
    }
}

fn gfid_req(gfid: Gfid) -> Option<XDataRef> {
    let mut xdata = XData::new();
    xdata.set_gfid(GFID_REQ_KEY, gfid);
    Some(Arc::new(xdata))
}

// ==================== mkdir ====================

#[tokio::test]
async fn test_mkdir_icreate_before_namelink() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let gfid = cluster.gfid_owned_by("mds-1");
    let loc = Loc::from_parent(Gfid::ROOT, "alpha");

    let reply = cluster
        .server
        .mkdir(&loc, 0o755, 0o022, gfid_req(gfid))
        .await
        .unwrap();
    assert_eq!(cluster.calls(), vec!["mds-1:icreate", "mds-0:namelink"]);
    assert!(reply.buf.is_dir());
    assert_eq!(reply.buf.ia_gfid, gfid);
    // no umask on the inode side
    assert_eq!(reply.buf.ia_prot, 0o755);
    assert_eq!(reply.inode.unwrap().gfid(), gfid);
    assert!(reply.postparent.is_dir());

    assert!(cluster.mds1.contains(&gfid).await);
    assert!(!cluster.mds0.contains(&gfid).await);
    assert_eq!(cluster.mds0.lookup_entry(&Gfid::ROOT, "alpha").await.unwrap(), gfid);

    // the name is here, the inode is not
    let err = cluster.server.lookup(&loc, None).await.unwrap_err();
    assert_eq!(err.errno(), libc::EREMOTE);
    assert_eq!(err.remote_gfid(), Some(gfid));
}

#[tokio::test]
async fn test_mkdir_requires_gfid_req_and_name() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let err = cluster
        .server
        .mkdir(&Loc::from_parent(Gfid::ROOT, "beta"), 0o755, 0, None)
        .await
        .unwrap_err();
    assert_eq!(err.errno(), libc::EINVAL);

    let err = cluster
        .server
        .mkdir(&Loc::from_gfid(Gfid::generate()), 0o755, 0, gfid_req(Gfid::generate()))
        .await
        .unwrap_err();
    assert_eq!(err.errno(), libc::EINVAL);
    assert!(cluster.calls().is_empty());
}

#[tokio::test]
async fn test_mkdir_icreate_failure_skips_namelink() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let gfid = cluster.gfid_owned_by("mds-1");
    cluster.recorder("mds-1").fail_on(FopKind::Icreate);

    let err = cluster
        .server
        .mkdir(&Loc::from_parent(Gfid::ROOT, "gamma"), 0o755, 0, gfid_req(gfid))
        .await
        .unwrap_err();
    assert!(matches!(err, RioError::IoError(_)));
    assert_eq!(cluster.calls(), vec!["mds-1:icreate"]);
    assert!(cluster.mds0.lookup_entry(&Gfid::ROOT, "gamma").await.is_err());
}

#[tokio::test]
async fn test_mkdir_namelink_failure_leaves_orphan() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let gfid = cluster.gfid_owned_by("mds-1");
    cluster.recorder("mds-0").fail_on(FopKind::Namelink);

    let err = cluster
        .server
        .mkdir(&Loc::from_parent(Gfid::ROOT, "delta"), 0o700, 0, gfid_req(gfid))
        .await
        .unwrap_err();
    assert!(matches!(err, RioError::IoError(_)));
    assert_eq!(cluster.calls(), vec!["mds-1:icreate", "mds-0:namelink"]);
    assert!(cluster.mds1.contains(&gfid).await);
}

// ==================== create ====================

#[tokio::test]
async fn test_create_colocates_with_parent() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let loc = Loc::from_parent(Gfid::ROOT, "file");
    let fd = Fd::new(Inode::new(Gfid::NULL), 0);

    let reply = cluster
        .server
        .create(&loc, 0, 0o644, 0o022, fd, None)
        .await
        .unwrap();
    let gfid = reply.inode.gfid();
    assert_ne!(gfid, Gfid::ROOT);
    assert_eq!(gfid.as_bytes()[..2], Gfid::ROOT.as_bytes()[..2]);
    assert!(reply.buf.is_regular());
    assert_eq!(cluster.calls(), vec!["mds-0:create"]);
    assert!(cluster.mds0.contains(&gfid).await);
}

#[tokio::test]
async fn test_create_remote_entry_is_surfaced() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let remote = Gfid::generate();
    cluster.mds0.link_entry(&Gfid::ROOT, "elsewhere", remote).await.unwrap();

    let err = cluster
        .server
        .create(
            &Loc::from_parent(Gfid::ROOT, "elsewhere"),
            0,
            0o644,
            0,
            Fd::new(Inode::new(Gfid::NULL), 0),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.errno(), libc::EREMOTE);
    assert_eq!(err.remote_gfid(), Some(remote));

    let err = cluster
        .server
        .create(&Loc::default(), 0, 0o644, 0, Fd::new(Inode::new(Gfid::NULL), 0), None)
        .await
        .unwrap_err();
    assert_eq!(err.errno(), libc::EINVAL);
}

// ==================== refresh ====================

#[tokio::test]
async fn test_stat_refreshes_once_from_ds() {
    let cluster = create_cluster(Arc::new(AlwaysDirty)).await;
    let gfid = cluster.local_file("data").await;
    cluster.write_ds(gfid, b"hello world").await;
    cluster.clear();

    let reply = cluster.server.stat(&Loc::from_gfid(gfid), None).await.unwrap();
    assert_eq!(cluster.count(":lookup"), 1);
    assert_eq!(reply.buf.ia_size, 11);
    assert_eq!(reply.buf.ia_uid, 1000);
    assert_eq!(reply.buf.ia_prot, 0o644);

    let reply = cluster
        .server
        .lookup(&Loc::from_parent(Gfid::ROOT, "data"), None)
        .await
        .unwrap();
    assert_eq!(cluster.count(":lookup"), 3);
    assert_eq!(reply.buf.ia_size, 11);
}

#[tokio::test]
async fn test_refresh_skipped_for_clean_and_directories() {
    let cluster = create_cluster(Arc::new(InodeDirtyFlag)).await;
    let gfid = cluster.local_file("clean").await;
    cluster.write_ds(gfid, b"abc").await;
    cluster.clear();

    let inode = Inode::new(gfid);
    let loc = Loc::from_gfid(gfid).with_inode(inode.clone());
    let reply = cluster.server.stat(&loc, None).await.unwrap();
    assert_eq!(reply.buf.ia_size, 0);
    assert_eq!(cluster.count(":lookup"), 0);

    inode.mark_dirty();
    let reply = cluster.server.stat(&loc, None).await.unwrap();
    assert_eq!(reply.buf.ia_size, 3);
    assert_eq!(cluster.count(":lookup"), 1);

    let root = cluster.conf.mdclayout.search(&Gfid::ROOT).unwrap();
    if root.name() == "mds-0" {
        cluster.clear();
        let reply = cluster.server.stat(&Loc::from_gfid(Gfid::ROOT), None).await.unwrap();
        assert!(reply.buf.is_dir());
        assert!(cluster.calls().iter().all(|c| !c.starts_with("ds-")));
    }
}

#[tokio::test]
async fn test_refresh_failure_is_returned() {
    let cluster = create_cluster(Arc::new(AlwaysDirty)).await;
    let gfid = cluster.local_file("broken").await;
    let ds = cluster.conf.dclayout.search(&gfid).unwrap();
    cluster.recorder(ds.name()).fail_on(FopKind::Lookup);
    cluster.clear();

    let err = cluster.server.stat(&Loc::from_gfid(gfid), None).await.unwrap_err();
    assert!(matches!(err, RioError::IoError(_)));
    assert_eq!(cluster.count(":lookup"), 1);
}

#[tokio::test]
async fn test_setattr_reply_is_refreshed() {
    let cluster = create_cluster(Arc::new(AlwaysDirty)).await;
    let gfid = cluster.local_file("owned").await;
    cluster.write_ds(gfid, b"0123456789").await;

    let mut stbuf = Iatt::default();
    stbuf.ia_prot = 0o600;
    stbuf.ia_size = 1;
    let reply = cluster
        .server
        .setattr(
            &Loc::from_gfid(gfid),
            &stbuf,
            SetAttrValid(SetAttrValid::MODE | SetAttrValid::SIZE),
            None,
        )
        .await
        .unwrap();
    assert_eq!(reply.postbuf.ia_prot, 0o600);
    assert_eq!(reply.postbuf.ia_size, 10);
    assert_eq!(reply.prebuf.ia_prot, 0o644);
}

#[tokio::test]
async fn test_truncate_forwards_to_ds() {
    let cluster = create_cluster(Arc::new(AlwaysDirty)).await;
    let gfid = cluster.local_file("trunc").await;
    cluster.write_ds(gfid, b"0123456789").await;
    cluster.clear();

    let reply = cluster
        .server
        .truncate(&Loc::from_gfid(gfid), 4, None)
        .await
        .unwrap();
    assert_eq!(cluster.count(":truncate"), 2);
    assert_eq!(cluster.count(":lookup"), 0);
    // held reply goes out as the metadata server produced it
    assert_eq!(reply.postbuf.ia_size, 0);
    assert_eq!(reply.postbuf.ia_uid, 1000);

    let ds = cluster.conf.dclayout.search(&gfid).unwrap();
    let buf = ds.stat(&Loc::from_gfid(gfid), None).await.unwrap().buf;
    assert_eq!(buf.ia_size, 4);
}

// ==================== redirect ====================

#[tokio::test]
async fn test_inode_ops_on_foreign_gfid_redirect() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    let gfid = cluster.gfid_owned_by("mds-1");
    let loc = Loc::from_gfid(gfid);

    let err = cluster.server.stat(&loc, None).await.unwrap_err();
    assert_eq!(err.errno(), libc::EREMOTE);
    assert_eq!(err.remote_gfid(), Some(gfid));

    let err = cluster.server.lookup(&loc, None).await.unwrap_err();
    assert_eq!(err.remote_gfid(), Some(gfid));

    let err = cluster.server.truncate(&loc, 0, None).await.unwrap_err();
    assert!(err.is_remote());

    let err = cluster
        .server
        .setattr(&loc, &Iatt::default(), SetAttrValid(SetAttrValid::UID), None)
        .await
        .unwrap_err();
    assert!(err.is_remote());
    assert!(cluster.calls().is_empty());
}

// ==================== context and notify ====================

#[tokio::test]
async fn test_every_context_is_released() {
    let cluster = create_cluster(Arc::new(AlwaysDirty)).await;
    let gfid = cluster.local_file("ctx").await;
    let stats = cluster.conf.local_stats.clone();

    cluster.server.stat(&Loc::from_gfid(gfid), None).await.unwrap();
    let _ = cluster.server.stat(&Loc::from_gfid(cluster.gfid_owned_by("mds-1")), None).await;
    let _ = cluster
        .server
        .mkdir(&Loc::from_parent(Gfid::ROOT, "x"), 0o755, 0, None)
        .await;
    cluster
        .server
        .truncate(&Loc::from_gfid(gfid), 0, None)
        .await
        .unwrap();

    assert_eq!(stats.created(), 4);
    assert_eq!(stats.released(), 4);
    assert_eq!(stats.live(), 0);
}

#[tokio::test]
async fn test_notify_passes_local_child_events_only() {
    let cluster = create_cluster(Arc::new(NeverDirty)).await;
    assert_eq!(
        cluster.server.notify(RioEvent::ChildUp, "mds-0"),
        Some(RioEvent::ChildUp)
    );
    assert_eq!(cluster.server.notify(RioEvent::ChildDown, "mds-1"), None);
    assert_eq!(cluster.server.notify(RioEvent::SomeDescendentUp, "ds-0"), None);
    assert_eq!(
        cluster.server.notify(RioEvent::ParentUp, "ds-1"),
        Some(RioEvent::ParentUp)
    );
}

#[tokio::test]
async fn test_server_without_local_subvol_fails() {
    let log: CallLog = Arc::new(Mutex::new(Vec::new()));
    let engine = Arc::new(MemEngine::with_root("mds-0", 1).await.unwrap());
    let children: Vec<SubvolRef> = vec![
        Recorder::new(Arc::new(Posix2Mds::new("mds-0", engine.clone())), log.clone()),
        Recorder::new(Arc::new(Posix2Ds::new("ds-0", engine)), log),
    ];
    let config = RioVolumeConfig {
        data_subvolumes: "ds-0".to_string(),
        metadata_subvolumes: "mds-0".to_string(),
        ..Default::default()
    };
    let conf = Arc::new(RioConf::init("rio-server", config, &children).unwrap());
    let err = RioServerMds::new(conf, Arc::new(NeverDirty)).err().unwrap();
    assert_eq!(err.errno(), libc::EINVAL);
}
