use std::path::Path;
use std::sync::Arc;

use rio_lib::{RioError, RioResult, SubvolRef};
use serde::{Deserialize, Serialize};

use crate::{
    process_volume_lists, ChildUpCounter, Layout, LayoutOptions, LocalStats, SubvolOrdering,
    LAYOUT_INODEHASH_BUCKET,
};

/// Volume options shared by the RIO client and server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RioVolumeConfig {
    #[serde(alias = "layout-type", alias = "layout")]
    pub layout_type: String,
    /// `:` separated data subvolume names.
    #[serde(alias = "data-subvolumes", alias = "ds_subvolumes")]
    pub data_subvolumes: String,
    /// `:` separated metadata subvolume names.
    #[serde(alias = "metadata-subvolumes", alias = "mds_subvolumes")]
    pub metadata_subvolumes: String,
    /// Server only: the child this server stores into.
    #[serde(alias = "server-local-subvol", alias = "local_subvol")]
    pub server_local_subvol: Option<String>,
    #[serde(alias = "subvol-ordering")]
    pub subvol_ordering: SubvolOrdering,
    #[serde(alias = "layout-options")]
    pub layout_options: LayoutOptions,
}

impl Default for RioVolumeConfig {
    fn default() -> Self {
        Self {
            layout_type: LAYOUT_INODEHASH_BUCKET.to_string(),
            data_subvolumes: String::new(),
            metadata_subvolumes: String::new(),
            server_local_subvol: None,
            subvol_ordering: SubvolOrdering::default(),
            layout_options: LayoutOptions::new(),
        }
    }
}

impl RioVolumeConfig {
    pub fn load(path: &Path) -> RioResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RioError::IoError(format!("read {} failed: {}", path.display(), e)))?;
        serde_json::from_str::<Self>(&content).map_err(|e| {
            RioError::InvalidParam(format!("parse {} failed: {}", path.display(), e))
        })
    }
}

/// Runtime configuration of one RIO client or server instance.
pub struct RioConf {
    pub name: String,
    pub config: RioVolumeConfig,
    pub dc_list: Vec<SubvolRef>,
    pub mdc_list: Vec<SubvolRef>,
    pub dclayout: Layout,
    pub mdclayout: Layout,
    /// Set on servers; the child operations are stored into.
    pub server_local: Option<SubvolRef>,
    pub child_up: ChildUpCounter,
    pub local_stats: Arc<LocalStats>,
}

impl RioConf {
    pub fn init(name: &str, config: RioVolumeConfig, children: &[SubvolRef]) -> RioResult<Self> {
        let set = process_volume_lists(
            name,
            &config.data_subvolumes,
            &config.metadata_subvolumes,
            children,
            config.subvol_ordering,
        )?;

        let dclayout = Layout::new(
            &config.layout_type,
            set.dc_count(),
            &set.dc_list,
            &config.layout_options,
        )?;
        let mdclayout = Layout::new(
            &config.layout_type,
            set.mdc_count(),
            &set.mdc_list,
            &config.layout_options,
        )?;

        let server_local = match config.server_local_subvol.as_deref() {
            Some(local_name) => {
                let local = children
                    .iter()
                    .find(|c| c.name() == local_name)
                    .cloned()
                    .ok_or_else(|| {
                        error!("{}: local subvolume {} is not a child", name, local_name);
                        RioError::InvalidParam(format!(
                            "{}: unknown local subvolume {}",
                            name, local_name
                        ))
                    })?;
                Some(local)
            }
            None => None,
        };

        let expected = set.dc_count() + set.mdc_count();
        info!(
            "{}: rio conf ready, layout {}, expecting {} CHILD_UP events",
            name,
            dclayout.layout_type(),
            expected
        );

        Ok(Self {
            name: name.to_string(),
            config,
            dc_list: set.dc_list,
            mdc_list: set.mdc_list,
            dclayout,
            mdclayout,
            server_local,
            child_up: ChildUpCounter::new(expected),
            local_stats: Arc::new(LocalStats::default()),
        })
    }

    pub fn dc_count(&self) -> usize {
        self.dc_list.len()
    }

    pub fn mdc_count(&self) -> usize {
        self.mdc_list.len()
    }

    pub fn local_name(&self) -> Option<&str> {
        self.server_local.as_ref().map(|s| s.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Named(String);

    impl rio_lib::Subvolume for Named {
        fn name(&self) -> &str {
            &self.0
        }
    }

    fn children(names: &[&str]) -> Vec<SubvolRef> {
        names
            .iter()
            .map(|n| Arc::new(Named(n.to_string())) as SubvolRef)
            .collect()
    }

    #[test]
    fn test_load_with_aliases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("volume.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "layout-type": "static-bucket",
                "data-subvolumes": "d0:d1",
                "metadata_subvolumes": "m0",
                "subvol-ordering": "sorted",
                "layout-options": {{ "static-bucket.d1": "0-15" }}
            }}"#
        )
        .unwrap();

        let config = RioVolumeConfig::load(&path).unwrap();
        assert_eq!(config.layout_type, "static-bucket");
        assert_eq!(config.data_subvolumes, "d0:d1");
        assert_eq!(config.metadata_subvolumes, "m0");
        assert_eq!(config.subvol_ordering, SubvolOrdering::Sorted);
        assert!(config.server_local_subvol.is_none());
        assert_eq!(config.layout_options.len(), 1);

        assert!(RioVolumeConfig::load(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_defaults() {
        let config: RioVolumeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.layout_type, LAYOUT_INODEHASH_BUCKET);
        assert_eq!(config.subvol_ordering, SubvolOrdering::FirstTokenReposition);
    }

    #[test]
    fn test_conf_init() {
        let _ = env_logger::builder().is_test(true).try_init();
        let kids = children(&["d0", "d1", "m0", "m1"]);
        let config = RioVolumeConfig {
            data_subvolumes: "d0:d1".to_string(),
            metadata_subvolumes: "m1:m0".to_string(),
            server_local_subvol: Some("m1".to_string()),
            ..Default::default()
        };

        let conf = RioConf::init("rio-server-m1", config, &kids).unwrap();
        assert_eq!(conf.dc_count(), 2);
        assert_eq!(conf.mdc_count(), 2);
        assert_eq!(conf.mdc_list[0].name(), "m0");
        assert_eq!(conf.local_name(), Some("m1"));
        assert_eq!(conf.child_up.expected(), 4);

        let bad = RioVolumeConfig {
            data_subvolumes: "d0".to_string(),
            metadata_subvolumes: "m0".to_string(),
            server_local_subvol: Some("nope".to_string()),
            ..Default::default()
        };
        assert!(RioConf::init("x", bad, &kids).is_err());

        let bad_layout = RioVolumeConfig {
            layout_type: "ring".to_string(),
            data_subvolumes: "d0".to_string(),
            metadata_subvolumes: "m0".to_string(),
            ..Default::default()
        };
        assert!(RioConf::init("x", bad_layout, &kids).is_err());
    }
}
