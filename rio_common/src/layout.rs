// layout 构造完成后不可变，多个请求可以并发 search，不需要加锁
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rio_lib::{Gfid, RioError, RioResult, SubvolRef};
use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

pub const LAYOUT_INODEHASH_BUCKET: &str = "inodehash-bucket";
pub const LAYOUT_STATIC_BUCKET: &str = "static-bucket";

/// Option key prefix for administrator assigned bucket ranges.
pub const STATIC_BUCKET_OPTION_PREFIX: &str = "static-bucket.";

pub const MAX_BUCKETS: usize = 65536;
pub const LAYOUT_HASH_SEED: u64 = 0;

pub type LayoutOptions = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutType {
    InodehashBucket,
    StaticBucket,
}

impl LayoutType {
    const SUPPORTED: [(&'static str, LayoutType); 2] = [
        (LAYOUT_INODEHASH_BUCKET, LayoutType::InodehashBucket),
        (LAYOUT_STATIC_BUCKET, LayoutType::StaticBucket),
    ];

    /// A name selects a strategy when it starts with the strategy's
    /// registered name, so "inodehash-bucket-v2" still selects inodehash.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::SUPPORTED
            .iter()
            .find(|(registered, _)| name.starts_with(registered))
            .map(|(_, t)| *t)
    }

    pub fn name(&self) -> &'static str {
        match self {
            LayoutType::InodehashBucket => LAYOUT_INODEHASH_BUCKET,
            LayoutType::StaticBucket => LAYOUT_STATIC_BUCKET,
        }
    }
}

impl fmt::Display for LayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayoutType {
    type Err = RioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
            .ok_or_else(|| RioError::InvalidParam(format!("unknown layout type: {}", s)))
    }
}

/// Direct byte bucket: the first two GFID bytes, big endian.
pub fn gfid_to_bucket(gfid: &Gfid) -> usize {
    let bytes = gfid.as_bytes();
    ((bytes[0] as usize) << 8) | (bytes[1] as usize)
}

/// XXH64 over the raw GFID, top 16 bits of the hash.
pub fn inodehash_bucket(gfid: &Gfid) -> usize {
    let hash = XxHash64::oneshot(LAYOUT_HASH_SEED, gfid.as_bytes());
    (hash >> 48) as usize
}

/// Fresh random GFID whose direct byte bucket equals that of `in_gfid`.
pub fn generate_colocated_gfid(in_gfid: &Gfid) -> Gfid {
    let bucket = gfid_to_bucket(in_gfid);
    let mut out = Gfid::generate();
    let bytes = out.as_bytes_mut();
    bytes[0] = ((bucket >> 8) & 0xff) as u8;
    bytes[1] = (bucket & 0xff) as u8;
    out
}

/// GFID to subvolume placement.
///
/// Both strategies share a table of `MAX_BUCKETS` entries, each holding an
/// index into `subvols`:
/// - inodehash-bucket: buckets are dealt round-robin over the subvolume list,
///   lookup is `buckets[xxh64(gfid) >> 48]`
/// - static-bucket: ranges from `static-bucket.<subvol>` options are pinned
///   first, the rest are dealt round-robin; lookup uses the direct byte bucket
///
/// The table depends only on the strategy, the subvolume order and the
/// options, so every process builds the same one.
pub struct Layout {
    layout_type: LayoutType,
    subvols: Vec<SubvolRef>,
    buckets: Vec<u32>,
    bucket_fn: fn(&Gfid) -> usize,
}

impl fmt::Debug for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layout")
            .field("layout_type", &self.layout_type)
            .field(
                "subvols",
                &self.subvols.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Layout {
    pub fn new(
        layout_type: &str,
        count: usize,
        subvols: &[SubvolRef],
        options: &LayoutOptions,
    ) -> RioResult<Self> {
        if count == 0 || subvols.is_empty() {
            return Err(RioError::InvalidParam(format!(
                "layout {} needs at least one subvolume",
                layout_type
            )));
        }

        let resolved = LayoutType::from_name(layout_type).ok_or_else(|| {
            error!("unsupported layout type {}", layout_type);
            RioError::InvalidParam(format!("unknown layout type: {}", layout_type))
        })?;

        if count != subvols.len() {
            error!(
                "layout {}: count {} does not match {} subvolumes",
                resolved,
                count,
                subvols.len()
            );
            return Err(RioError::InvalidParam(format!(
                "layout {} given count {} for {} subvolumes",
                resolved,
                count,
                subvols.len()
            )));
        }

        let layout = match resolved {
            LayoutType::InodehashBucket => Self::new_inodehash(subvols),
            LayoutType::StaticBucket => Self::new_static(subvols, options)?,
        };

        debug!(
            "layout {} built over {} subvolumes, first buckets: {:?}",
            layout.layout_type,
            layout.subvols.len(),
            (0..layout.subvols.len().min(4))
                .filter_map(|b| layout.subvol_at(b).map(|s| s.name().to_string()))
                .collect::<Vec<_>>()
        );
        Ok(layout)
    }

    fn round_robin(count: usize) -> Vec<u32> {
        (0..MAX_BUCKETS).map(|i| (i % count) as u32).collect()
    }

    fn new_inodehash(subvols: &[SubvolRef]) -> Self {
        Layout {
            layout_type: LayoutType::InodehashBucket,
            subvols: subvols.to_vec(),
            buckets: Self::round_robin(subvols.len()),
            bucket_fn: inodehash_bucket,
        }
    }

    fn new_static(subvols: &[SubvolRef], options: &LayoutOptions) -> RioResult<Self> {
        let mut pinned: Vec<Option<u32>> = vec![None; MAX_BUCKETS];

        for (key, value) in options.iter() {
            let Some(subvol_name) = key.strip_prefix(STATIC_BUCKET_OPTION_PREFIX) else {
                continue;
            };
            let index = subvols
                .iter()
                .position(|s| s.name() == subvol_name)
                .ok_or_else(|| {
                    RioError::InvalidParam(format!(
                        "static bucket option names unknown subvolume {}",
                        subvol_name
                    ))
                })?;

            for (lo, hi) in parse_bucket_ranges(value)? {
                for bucket in lo..=hi {
                    if let Some(owner) = pinned[bucket] {
                        if owner as usize != index {
                            return Err(RioError::InvalidParam(format!(
                                "bucket {} assigned to both {} and {}",
                                bucket,
                                subvols[owner as usize].name(),
                                subvol_name
                            )));
                        }
                    }
                    pinned[bucket] = Some(index as u32);
                }
            }
        }

        // 未指定的 bucket 按顺序轮流分配
        let mut next = 0usize;
        let buckets = pinned
            .into_iter()
            .map(|slot| match slot {
                Some(index) => index,
                None => {
                    let index = (next % subvols.len()) as u32;
                    next += 1;
                    index
                }
            })
            .collect();

        Ok(Layout {
            layout_type: LayoutType::StaticBucket,
            subvols: subvols.to_vec(),
            buckets,
            bucket_fn: gfid_to_bucket,
        })
    }

    pub fn layout_type(&self) -> LayoutType {
        self.layout_type
    }

    pub fn subvols(&self) -> &[SubvolRef] {
        &self.subvols
    }

    pub fn bucket_of(&self, gfid: &Gfid) -> usize {
        (self.bucket_fn)(gfid)
    }

    pub fn subvol_at(&self, bucket: usize) -> Option<&SubvolRef> {
        self.buckets
            .get(bucket)
            .and_then(|index| self.subvols.get(*index as usize))
    }

    pub fn search(&self, gfid: &Gfid) -> Option<SubvolRef> {
        self.subvol_at(self.bucket_of(gfid)).cloned()
    }

    pub fn colocate(&self, in_gfid: &Gfid) -> Gfid {
        generate_colocated_gfid(in_gfid)
    }

    /// Number of buckets owned by each subvolume, in list order.
    pub fn distribution(&self) -> Vec<(String, usize)> {
        let mut counts = vec![0usize; self.subvols.len()];
        for index in self.buckets.iter() {
            counts[*index as usize] += 1;
        }
        self.subvols
            .iter()
            .zip(counts)
            .map(|(s, c)| (s.name().to_string(), c))
            .collect()
    }
}

/// Absent layout finds nothing.
pub fn layout_search(layout: Option<&Layout>, gfid: &Gfid) -> Option<SubvolRef> {
    layout?.search(gfid)
}

/// Parses "lo-hi,lo-hi,n". Bounds are inclusive bucket numbers.
pub fn parse_bucket_ranges(value: &str) -> RioResult<Vec<(usize, usize)>> {
    let mut ranges = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (lo, hi) = match part.split_once('-') {
            Some((lo, hi)) => (parse_bucket(lo)?, parse_bucket(hi)?),
            None => {
                let single = parse_bucket(part)?;
                (single, single)
            }
        };
        if lo > hi {
            return Err(RioError::InvalidParam(format!(
                "bucket range {} is reversed",
                part
            )));
        }
        ranges.push((lo, hi));
    }
    Ok(ranges)
}

fn parse_bucket(text: &str) -> RioResult<usize> {
    let bucket: usize = text
        .trim()
        .parse()
        .map_err(|_| RioError::InvalidParam(format!("invalid bucket number: {}", text)))?;
    if bucket >= MAX_BUCKETS {
        return Err(RioError::InvalidParam(format!(
            "bucket {} out of range (max {})",
            bucket,
            MAX_BUCKETS - 1
        )));
    }
    Ok(bucket)
}
