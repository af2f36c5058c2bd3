use log::{debug, info, warn};
use posix2::{MemEngine, Posix2Ds, Posix2Mds};
use rio_client::RioClient;
use rio_common::{
    LayoutOptions, RioConf, RioVolumeConfig, SubvolOrdering, LAYOUT_INODEHASH_BUCKET,
    SUBVOL_STRING_SEP,
};
use rio_lib::*;
use rio_server::{RioServerDs, RioServerMds};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Runtime;

pub const DEFAULT_CLUSTER_CONFIG_PATH: &str = "/opt/rio/etc/rio_cluster.json";
const SELFTEST_DIR: &str = "rio-selftest";
const SELFTEST_FILE: &str = "data";
const SELFTEST_PAYLOAD: &[u8] = b"rio selftest payload";

#[derive(Debug, Clone)]
pub enum DaemonCommand {
    Search(Gfid),
    Colocate(Gfid),
    Dump,
    Selftest,
}

#[derive(Debug, Clone)]
pub struct RioDaemonRunOptions {
    pub config_path: PathBuf,
    pub command: DaemonCommand,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct ClusterConfigFile {
    #[serde(alias = "volume", alias = "name")]
    pub volume_name: String,
    #[serde(alias = "mds", alias = "metadata_servers")]
    pub metadata_nodes: Vec<String>,
    #[serde(alias = "ds", alias = "data_servers")]
    pub data_nodes: Vec<String>,
    #[serde(alias = "layout-type", alias = "layout")]
    pub layout_type: String,
    #[serde(alias = "subvol-ordering")]
    pub subvol_ordering: SubvolOrdering,
    #[serde(alias = "layout-options")]
    pub layout_options: LayoutOptions,
}

impl Default for ClusterConfigFile {
    fn default() -> Self {
        Self {
            volume_name: "rio".to_string(),
            metadata_nodes: Vec::new(),
            data_nodes: Vec::new(),
            layout_type: LAYOUT_INODEHASH_BUCKET.to_string(),
            subvol_ordering: SubvolOrdering::default(),
            layout_options: LayoutOptions::new(),
        }
    }
}

impl ClusterConfigFile {
    fn check(&self) -> RioResult<()> {
        if self.metadata_nodes.is_empty() || self.data_nodes.is_empty() {
            return Err(RioError::InvalidParam(format!(
                "cluster {} needs at least one metadata and one data node",
                self.volume_name
            )));
        }
        if let Some(dup) = self
            .metadata_nodes
            .iter()
            .find(|n| self.data_nodes.contains(n))
        {
            return Err(RioError::InvalidParam(format!(
                "node {} is both a metadata and a data node",
                dup
            )));
        }
        Ok(())
    }

    /// Volume options of one RIO instance. Node lists are written sorted by
    /// name whatever order the cluster file uses, and a server lists its own
    /// metadata node first, the way server side volume files are written.
    /// Repositioning that first token then yields the same order everywhere.
    pub(crate) fn volume_config(&self, local: Option<&str>) -> RioVolumeConfig {
        let sep = SUBVOL_STRING_SEP.to_string();
        let mut others: Vec<&str> = self
            .metadata_nodes
            .iter()
            .map(|n| n.as_str())
            .filter(|n| Some(*n) != local)
            .collect();
        others.sort_unstable();

        let mut metadata: Vec<&str> = Vec::with_capacity(self.metadata_nodes.len());
        if let Some(local) = local {
            metadata.push(local);
        }
        metadata.extend(others);

        let mut data: Vec<&str> = self.data_nodes.iter().map(|n| n.as_str()).collect();
        data.sort_unstable();

        RioVolumeConfig {
            layout_type: self.layout_type.clone(),
            data_subvolumes: data.join(&sep),
            metadata_subvolumes: metadata.join(&sep),
            server_local_subvol: local.map(|l| l.to_string()),
            subvol_ordering: self.subvol_ordering,
            layout_options: self.layout_options.clone(),
        }
    }
}

fn read_json_config<T: DeserializeOwned>(path: &Path) -> RioResult<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| RioError::IoError(format!("read {} failed: {}", path.display(), e)))?;
    serde_json::from_str::<T>(&content)
        .map_err(|e| RioError::InvalidParam(format!("parse {} failed: {}", path.display(), e)))
}

/// A whole RIO volume in one process: a memory store per node, a RIO server
/// in front of every store and one client over the servers.
pub(crate) struct RioCluster {
    pub client: RioClient,
    pub servers: Vec<Arc<RioServerMds>>,
    pub mds_engines: Vec<Arc<MemEngine>>,
    pub ds_engines: Vec<Arc<MemEngine>>,
}

impl RioCluster {
    pub(crate) async fn build(config: &ClusterConfigFile) -> RioResult<Self> {
        config.check()?;
        let mut dev = 0u64;

        let mut mds_engines = Vec::with_capacity(config.metadata_nodes.len());
        let mut mds_stores: Vec<SubvolRef> = Vec::with_capacity(config.metadata_nodes.len());
        for node in config.metadata_nodes.iter() {
            dev += 1;
            let engine = Arc::new(MemEngine::with_root(node, dev).await?);
            mds_stores.push(Arc::new(Posix2Mds::new(node, engine.clone())));
            mds_engines.push(engine);
        }

        let mut ds_engines = Vec::with_capacity(config.data_nodes.len());
        let mut ds_servers: Vec<SubvolRef> = Vec::with_capacity(config.data_nodes.len());
        for node in config.data_nodes.iter() {
            dev += 1;
            let engine = Arc::new(MemEngine::new(node, dev));
            let store = Arc::new(Posix2Ds::new(node, engine.clone()));
            ds_servers.push(Arc::new(RioServerDs::new(node, store)));
            ds_engines.push(engine);
        }

        // every server reaches every metadata store for directory creation
        let mut server_children = mds_stores.clone();
        server_children.extend(ds_servers.iter().cloned());

        let dirty: Arc<dyn DirtyCheck> = Arc::new(InodeDirtyFlag);
        let mut servers = Vec::with_capacity(config.metadata_nodes.len());
        for node in config.metadata_nodes.iter() {
            let volume = config.volume_config(Some(node.as_str()));
            let conf = RioConf::init(node, volume, &server_children)?;
            servers.push(Arc::new(RioServerMds::new(Arc::new(conf), dirty.clone())?));
        }

        let mut client_children: Vec<SubvolRef> =
            servers.iter().map(|s| s.clone() as SubvolRef).collect();
        client_children.extend(ds_servers.iter().cloned());
        let client_conf = RioConf::init(
            &config.volume_name,
            config.volume_config(None),
            &client_children,
        )?;

        info!(
            "rio cluster {} ready: {} metadata nodes, {} data nodes, layout {}",
            config.volume_name,
            servers.len(),
            ds_engines.len(),
            client_conf.mdclayout.layout_type()
        );
        Ok(Self {
            client: RioClient::new(Arc::new(client_conf)),
            servers,
            mds_engines,
            ds_engines,
        })
    }

    fn conf(&self) -> &RioConf {
        self.client.conf()
    }

    pub(crate) fn search(&self, gfid: &Gfid) -> RioResult<Placement> {
        let conf = self.conf();
        let mds = conf
            .mdclayout
            .search(gfid)
            .ok_or_else(|| RioError::InvalidParam(format!("no metadata subvolume for {}", gfid)))?;
        let ds = conf
            .dclayout
            .search(gfid)
            .ok_or_else(|| RioError::InvalidParam(format!("no data subvolume for {}", gfid)))?;
        Ok(Placement {
            gfid: *gfid,
            bucket: conf.mdclayout.bucket_of(gfid),
            mds: mds.name().to_string(),
            ds: ds.name().to_string(),
        })
    }

    pub(crate) fn colocate(&self, gfid: &Gfid) -> RioResult<Placement> {
        let out = self.conf().mdclayout.colocate(gfid);
        debug!("colocated {} with {}", out, gfid);
        self.search(&out)
    }

    pub(crate) fn dump(&self) -> String {
        let conf = self.conf();
        let mut out = format!("layout {}\n", conf.mdclayout.layout_type());
        for (title, layout) in [("metadata", &conf.mdclayout), ("data", &conf.dclayout)] {
            out.push_str(&format!("{}:\n", title));
            for (name, buckets) in layout.distribution() {
                out.push_str(&format!("  {} {}\n", name, buckets));
            }
        }
        out
    }

    /// mkdir under the root, create a file in it, write through the data
    /// layout, then look both up again with the file marked dirty.
    pub(crate) async fn selftest(&self) -> RioResult<SelftestReport> {
        let client = &self.client;

        let dir_gfid = Gfid::generate();
        let mut req = XData::new();
        req.set_gfid(GFID_REQ_KEY, dir_gfid);
        let dir_loc = Loc::from_parent(Gfid::ROOT, SELFTEST_DIR);
        let dir = client
            .mkdir(&dir_loc, 0o755, 0o022, Some(Arc::new(req)))
            .await?;
        info!("selftest: mkdir {} -> {}", SELFTEST_DIR, dir.buf.ia_gfid);

        let file_loc = Loc::from_parent(dir_gfid, SELFTEST_FILE);
        let created = client
            .create(
                &file_loc,
                libc::O_RDWR,
                0o644,
                0o022,
                Fd::new(Inode::new(Gfid::NULL), libc::O_RDWR),
                None,
            )
            .await?;
        let file_gfid = created.inode.gfid();
        info!("selftest: create {} -> {}", SELFTEST_FILE, file_gfid);

        let written = client
            .writev(&created.fd, SELFTEST_PAYLOAD, 0, None)
            .await?;
        created.inode.mark_dirty();
        debug!("selftest: wrote {} bytes", written.postbuf.ia_size);

        let dir_found = client.lookup(&dir_loc, None).await?;
        let file_found = client
            .lookup(&file_loc.with_inode(created.inode.clone()), None)
            .await?;
        created.inode.clear_dirty();

        let report = SelftestReport {
            dir: dir_found.buf.ia_gfid,
            file: file_found.buf.ia_gfid,
            size: file_found.buf.ia_size,
            expected_size: SELFTEST_PAYLOAD.len() as u64,
        };
        if !report.passed() || report.dir != dir_gfid || report.file != file_gfid {
            warn!("selftest mismatch: {}", report);
            return Err(RioError::IoError(format!("selftest failed: {}", report)));
        }
        Ok(report)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placement {
    pub gfid: Gfid,
    pub bucket: usize,
    pub mds: String,
    pub ds: String,
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} bucket={} mds={} ds={}",
            self.gfid, self.bucket, self.mds, self.ds
        )
    }
}

#[derive(Debug, Clone)]
pub(crate) struct SelftestReport {
    pub dir: Gfid,
    pub file: Gfid,
    pub size: u64,
    pub expected_size: u64,
}

impl SelftestReport {
    pub fn passed(&self) -> bool {
        self.size == self.expected_size
    }
}

impl fmt::Display for SelftestReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "dir={} file={} size={}/{}",
            self.dir, self.file, self.size, self.expected_size
        )
    }
}

pub(crate) fn run_command(
    runtime: &Runtime,
    cluster: &RioCluster,
    command: &DaemonCommand,
) -> RioResult<String> {
    match command {
        DaemonCommand::Search(gfid) => Ok(cluster.search(gfid)?.to_string()),
        DaemonCommand::Colocate(gfid) => {
            let placement = cluster.colocate(gfid)?;
            Ok(format!("{} (from {})", placement, gfid))
        }
        DaemonCommand::Dump => Ok(cluster.dump()),
        DaemonCommand::Selftest => {
            let report = runtime.block_on(cluster.selftest())?;
            Ok(format!("selftest passed: {}", report))
        }
    }
}

pub fn run_rio_daemon(options: RioDaemonRunOptions) -> RioResult<String> {
    let runtime = Runtime::new().map_err(|e| RioError::IoError(e.to_string()))?;
    let config: ClusterConfigFile = read_json_config(&options.config_path)?;
    info!(
        "loading rio cluster {} from {}",
        config.volume_name,
        options.config_path.display()
    );

    let cluster = runtime.block_on(RioCluster::build(&config))?;
    run_command(&runtime, &cluster, &options.command)
}
