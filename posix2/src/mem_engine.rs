use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;

use rio_lib::*;

use crate::StorageEngine;

const BLOCK_SIZE: u64 = 512;

/// Largest size an object may grow to.
pub const MAX_OBJECT_SIZE: u64 = 1 << 32;

/// End of `[offset, offset + len)`, refused when it overflows or lies past
/// `MAX_OBJECT_SIZE`.
fn range_end(offset: u64, len: u64) -> RioResult<u64> {
    offset
        .checked_add(len)
        .filter(|end| *end <= MAX_OBJECT_SIZE)
        .ok_or_else(|| {
            RioError::InvalidParam(format!(
                "range {}+{} exceeds the object size limit {}",
                offset, len, MAX_OBJECT_SIZE
            ))
        })
}

fn now() -> (i64, u32) {
    let d = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (d.as_secs() as i64, d.subsec_nanos())
}

fn touch_ctime(attr: &mut Iatt) {
    let (sec, nsec) = now();
    attr.ia_ctime = sec;
    attr.ia_ctime_nsec = nsec;
}

fn touch_mtime(attr: &mut Iatt) {
    let (sec, nsec) = now();
    attr.ia_mtime = sec;
    attr.ia_mtime_nsec = nsec;
    attr.ia_ctime = sec;
    attr.ia_ctime_nsec = nsec;
}

struct MemObject {
    attr: Iatt,
    data: Vec<u8>,
    xattrs: BTreeMap<String, Vec<u8>>,
}

impl MemObject {
    fn resize(&mut self, size: u64) -> RioResult<()> {
        let len = range_end(size, 0)? as usize;
        if len > self.data.len() {
            self.data
                .try_reserve(len - self.data.len())
                .map_err(|e| RioError::NoMemory(format!("grow object to {}: {}", size, e)))?;
        }
        self.data.resize(len, 0);
        self.attr.ia_size = size;
        self.attr.ia_blocks = size.div_ceil(BLOCK_SIZE);
        Ok(())
    }
}

#[derive(Default)]
struct MemState {
    objects: HashMap<Gfid, MemObject>,
    entries: HashMap<(Gfid, String), Gfid>,
}

impl MemState {
    fn object_mut(&mut self, gfid: &Gfid) -> RioResult<&mut MemObject> {
        self.objects
            .get_mut(gfid)
            .ok_or_else(|| RioError::NotFound(format!("object {}", gfid)))
    }

    fn object(&self, gfid: &Gfid) -> RioResult<&MemObject> {
        self.objects
            .get(gfid)
            .ok_or_else(|| RioError::NotFound(format!("object {}", gfid)))
    }
}

/// In-memory `StorageEngine`.
pub struct MemEngine {
    name: String,
    dev: u64,
    next_ino: AtomicU64,
    state: RwLock<MemState>,
}

impl MemEngine {
    pub fn new(name: &str, dev: u64) -> Self {
        Self {
            name: name.to_string(),
            dev,
            next_ino: AtomicU64::new(1),
            state: RwLock::new(MemState::default()),
        }
    }

    /// Engine that already holds the root directory.
    pub async fn with_root(name: &str, dev: u64) -> RioResult<Self> {
        let engine = Self::new(name, dev);
        engine.create_inode(Gfid::ROOT, S_IFDIR | 0o755).await?;
        Ok(engine)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn object_count(&self) -> usize {
        self.state.read().await.objects.len()
    }

    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.len()
    }
}

#[async_trait]
impl StorageEngine for MemEngine {
    async fn create_inode(&self, gfid: Gfid, mode: u32) -> RioResult<Iatt> {
        if gfid.is_null() {
            return Err(RioError::InvalidParam("create with null gfid".to_string()));
        }

        let mut state = self.state.write().await;
        if state.objects.contains_key(&gfid) {
            return Err(RioError::AlreadyExists(format!("object {}", gfid)));
        }

        let ia_type = IaType::from_mode(mode);
        let mut attr = Iatt::new(gfid, ia_type, mode);
        attr.ia_dev = self.dev;
        attr.ia_ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        attr.ia_blksize = BLOCK_SIZE as u32 * 8;
        if ia_type == IaType::Directory {
            attr.ia_nlink = 2;
        }
        let (sec, nsec) = now();
        attr.ia_atime = sec;
        attr.ia_atime_nsec = nsec;
        attr.ia_mtime = sec;
        attr.ia_mtime_nsec = nsec;
        attr.ia_ctime = sec;
        attr.ia_ctime_nsec = nsec;

        state.objects.insert(
            gfid,
            MemObject {
                attr,
                data: Vec::new(),
                xattrs: BTreeMap::new(),
            },
        );
        debug!("{}: created {} as {:?}", self.name, gfid, ia_type);
        Ok(attr)
    }

    async fn stat(&self, gfid: &Gfid) -> RioResult<Iatt> {
        let state = self.state.read().await;
        Ok(state.object(gfid)?.attr)
    }

    async fn link_entry(&self, parent: &Gfid, name: &str, gfid: Gfid) -> RioResult<(Iatt, Iatt)> {
        let mut state = self.state.write().await;
        let key = (*parent, name.to_string());
        if state.entries.contains_key(&key) {
            return Err(RioError::AlreadyExists(format!("{}/{}", parent, name)));
        }

        let dir = state.object_mut(parent)?;
        if !dir.attr.is_dir() {
            return Err(RioError::InvalidParam(format!("{} is not a directory", parent)));
        }
        let pre = dir.attr;
        touch_mtime(&mut dir.attr);
        let post = dir.attr;

        state.entries.insert(key, gfid);
        Ok((pre, post))
    }

    async fn lookup_entry(&self, parent: &Gfid, name: &str) -> RioResult<Gfid> {
        let state = self.state.read().await;
        state
            .entries
            .get(&(*parent, name.to_string()))
            .copied()
            .ok_or_else(|| RioError::NotFound(format!("{}/{}", parent, name)))
    }

    async fn read(&self, gfid: &Gfid, offset: u64, size: usize) -> RioResult<(Vec<u8>, Iatt)> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        let start = (offset as usize).min(obj.data.len());
        let end = start.saturating_add(size).min(obj.data.len());
        let data = obj.data[start..end].to_vec();

        let (sec, nsec) = now();
        obj.attr.ia_atime = sec;
        obj.attr.ia_atime_nsec = nsec;
        Ok((data, obj.attr))
    }

    async fn write(&self, gfid: &Gfid, offset: u64, data: &[u8]) -> RioResult<(Iatt, Iatt)> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        let pre = obj.attr;

        let end = range_end(offset, data.len() as u64)?;
        if end > obj.attr.ia_size {
            obj.resize(end)?;
        }
        obj.data[offset as usize..end as usize].copy_from_slice(data);
        touch_mtime(&mut obj.attr);
        Ok((pre, obj.attr))
    }

    async fn truncate(&self, gfid: &Gfid, size: u64) -> RioResult<(Iatt, Iatt)> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        let pre = obj.attr;
        obj.resize(size)?;
        touch_mtime(&mut obj.attr);
        Ok((pre, obj.attr))
    }

    async fn setattr(
        &self,
        gfid: &Gfid,
        stbuf: &Iatt,
        valid: SetAttrValid,
    ) -> RioResult<(Iatt, Iatt)> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        let pre = obj.attr;

        // size first so a refused resize leaves the object untouched
        if valid.has(SetAttrValid::SIZE) {
            obj.resize(stbuf.ia_size)?;
        }
        if valid.has(SetAttrValid::MODE) {
            obj.attr.ia_prot = stbuf.ia_prot & PROT_MASK;
        }
        if valid.has(SetAttrValid::UID) {
            obj.attr.ia_uid = stbuf.ia_uid;
        }
        if valid.has(SetAttrValid::GID) {
            obj.attr.ia_gid = stbuf.ia_gid;
        }
        if valid.has(SetAttrValid::ATIME) {
            obj.attr.ia_atime = stbuf.ia_atime;
            obj.attr.ia_atime_nsec = stbuf.ia_atime_nsec;
        }
        if valid.has(SetAttrValid::MTIME) {
            obj.attr.ia_mtime = stbuf.ia_mtime;
            obj.attr.ia_mtime_nsec = stbuf.ia_mtime_nsec;
        }
        touch_ctime(&mut obj.attr);
        Ok((pre, obj.attr))
    }

    async fn zero_range(
        &self,
        gfid: &Gfid,
        offset: u64,
        len: u64,
        extend: bool,
    ) -> RioResult<(Iatt, Iatt)> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        let pre = obj.attr;

        let end = if extend {
            let end = range_end(offset, len)?;
            if end > obj.attr.ia_size {
                obj.resize(end)?;
            }
            end
        } else {
            offset.saturating_add(len).min(obj.attr.ia_size)
        };
        if offset < end {
            obj.data[offset as usize..end as usize].fill(0);
        }
        touch_mtime(&mut obj.attr);
        Ok((pre, obj.attr))
    }

    async fn allocate(
        &self,
        gfid: &Gfid,
        offset: u64,
        len: u64,
        keep_size: bool,
    ) -> RioResult<(Iatt, Iatt)> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        let pre = obj.attr;

        let end = offset.saturating_add(len);
        if end > obj.attr.ia_size {
            if keep_size {
                let blocks = end.div_ceil(BLOCK_SIZE);
                if blocks > obj.attr.ia_blocks {
                    obj.attr.ia_blocks = blocks;
                }
            } else {
                obj.resize(range_end(offset, len)?)?;
            }
        }
        touch_ctime(&mut obj.attr);
        Ok((pre, obj.attr))
    }

    async fn get_xattr(&self, gfid: &Gfid, name: Option<&str>) -> RioResult<XData> {
        let state = self.state.read().await;
        let obj = state.object(gfid)?;

        let mut dict = XData::new();
        match name {
            Some(name) => {
                let value = obj
                    .xattrs
                    .get(name)
                    .ok_or_else(|| RioError::NoData(format!("xattr {} on {}", name, gfid)))?;
                dict.set_bin(name, value.clone());
            }
            None => {
                for (key, value) in obj.xattrs.iter() {
                    dict.set_bin(key, value.clone());
                }
            }
        }
        Ok(dict)
    }

    async fn set_xattr(&self, gfid: &Gfid, dict: &XData, flags: i32) -> RioResult<()> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;

        for (key, _) in dict.iter() {
            let exists = obj.xattrs.contains_key(key);
            if flags & libc::XATTR_CREATE != 0 && exists {
                return Err(RioError::AlreadyExists(format!("xattr {} on {}", key, gfid)));
            }
            if flags & libc::XATTR_REPLACE != 0 && !exists {
                return Err(RioError::NoData(format!("xattr {} on {}", key, gfid)));
            }
        }
        for (key, value) in dict.iter() {
            obj.xattrs.insert(key.clone(), value.clone());
        }
        touch_ctime(&mut obj.attr);
        Ok(())
    }

    async fn remove_xattr(&self, gfid: &Gfid, name: &str) -> RioResult<()> {
        let mut state = self.state.write().await;
        let obj = state.object_mut(gfid)?;
        obj.xattrs
            .remove(name)
            .ok_or_else(|| RioError::NoData(format!("xattr {} on {}", name, gfid)))?;
        touch_ctime(&mut obj.attr);
        Ok(())
    }
}
