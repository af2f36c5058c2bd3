use serde::{Deserialize, Serialize};

use crate::Gfid;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFSOCK: u32 = 0o140000;
pub const S_IFLNK: u32 = 0o120000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFBLK: u32 = 0o060000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFCHR: u32 = 0o020000;
pub const S_IFIFO: u32 = 0o010000;
pub const PROT_MASK: u32 = 0o7777;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IaType {
    #[default]
    Invalid,
    Regular,
    Directory,
    Link,
    Block,
    Char,
    Fifo,
    Socket,
}

impl IaType {
    pub fn from_mode(mode: u32) -> Self {
        match mode & S_IFMT {
            S_IFREG => IaType::Regular,
            S_IFDIR => IaType::Directory,
            S_IFLNK => IaType::Link,
            S_IFBLK => IaType::Block,
            S_IFCHR => IaType::Char,
            S_IFIFO => IaType::Fifo,
            S_IFSOCK => IaType::Socket,
            _ => IaType::Invalid,
        }
    }

    pub fn mode_bits(&self) -> u32 {
        match self {
            IaType::Regular => S_IFREG,
            IaType::Directory => S_IFDIR,
            IaType::Link => S_IFLNK,
            IaType::Block => S_IFBLK,
            IaType::Char => S_IFCHR,
            IaType::Fifo => S_IFIFO,
            IaType::Socket => S_IFSOCK,
            IaType::Invalid => 0,
        }
    }
}

/// Attribute snapshot of one object.
///
/// Split authority: size, blocks, atime and mtime belong to the data server,
/// ownership, permissions, link count, type and ctime to the metadata server.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iatt {
    pub ia_dev: u64,
    pub ia_gfid: Gfid,
    pub ia_ino: u64,
    pub ia_prot: u32,
    pub ia_type: IaType,
    pub ia_nlink: u32,
    pub ia_uid: u32,
    pub ia_gid: u32,
    pub ia_rdev: u64,
    pub ia_size: u64,
    pub ia_blksize: u32,
    pub ia_blocks: u64,
    pub ia_atime: i64,
    pub ia_atime_nsec: u32,
    pub ia_mtime: i64,
    pub ia_mtime_nsec: u32,
    pub ia_ctime: i64,
    pub ia_ctime_nsec: u32,
}

fn set_if_greater<T: PartialOrd + Copy>(a: &mut T, b: T) {
    if *a < b {
        *a = b;
    }
}

fn set_if_greater_time(a: &mut i64, an: &mut u32, b: i64, bn: u32) {
    if (*a < b) || (*a == b && *an < bn) {
        *a = b;
        *an = bn;
    }
}

impl Iatt {
    pub fn new(gfid: Gfid, ia_type: IaType, prot: u32) -> Self {
        Self {
            ia_gfid: gfid,
            ia_type,
            ia_prot: prot & PROT_MASK,
            ia_nlink: 1,
            ia_blksize: 4096,
            ..Default::default()
        }
    }

    pub fn is_regular(&self) -> bool {
        self.ia_type == IaType::Regular
    }

    pub fn is_dir(&self) -> bool {
        self.ia_type == IaType::Directory
    }

    pub fn st_mode(&self) -> u32 {
        self.ia_type.mode_bits() | (self.ia_prot & PROT_MASK)
    }

    /// Aggregates `from` into `self`: identity fields are overwritten, size
    /// and blocks are summed, ownership and timestamps keep the greater value.
    pub fn merge(&mut self, from: &Iatt) {
        self.ia_dev = from.ia_dev;
        self.ia_gfid = from.ia_gfid;
        self.ia_ino = from.ia_ino;
        self.ia_prot = from.ia_prot;
        self.ia_type = from.ia_type;
        self.ia_nlink = from.ia_nlink;
        self.ia_rdev = from.ia_rdev;
        self.ia_size = self.ia_size.wrapping_add(from.ia_size);
        self.ia_blksize = from.ia_blksize;
        self.ia_blocks = self.ia_blocks.wrapping_add(from.ia_blocks);

        set_if_greater(&mut self.ia_uid, from.ia_uid);
        set_if_greater(&mut self.ia_gid, from.ia_gid);

        set_if_greater_time(
            &mut self.ia_atime,
            &mut self.ia_atime_nsec,
            from.ia_atime,
            from.ia_atime_nsec,
        );
        set_if_greater_time(
            &mut self.ia_mtime,
            &mut self.ia_mtime_nsec,
            from.ia_mtime,
            from.ia_mtime_nsec,
        );
        set_if_greater_time(
            &mut self.ia_ctime,
            &mut self.ia_ctime_nsec,
            from.ia_ctime,
            from.ia_ctime_nsec,
        );
    }

    /// Folds the data server owned fields of `from` into an MDS record.
    pub fn merge_ds(&mut self, from: &Iatt) {
        self.ia_size = self.ia_size.wrapping_add(from.ia_size);
        self.ia_blocks = self.ia_blocks.wrapping_add(from.ia_blocks);
        if from.ia_blksize != 0 {
            self.ia_blksize = from.ia_blksize;
        }

        set_if_greater_time(
            &mut self.ia_atime,
            &mut self.ia_atime_nsec,
            from.ia_atime,
            from.ia_atime_nsec,
        );
        set_if_greater_time(
            &mut self.ia_mtime,
            &mut self.ia_mtime_nsec,
            from.ia_mtime,
            from.ia_mtime_nsec,
        );
    }

    pub fn copy_from(&mut self, from: &Iatt) {
        *self = *from;
    }

    /// Copies everything except the data server owned fields.
    pub fn copy_mds(&mut self, from: &Iatt) {
        self.ia_dev = from.ia_dev;
        self.ia_gfid = from.ia_gfid;
        self.ia_ino = from.ia_ino;
        self.ia_prot = from.ia_prot;
        self.ia_type = from.ia_type;
        self.ia_nlink = from.ia_nlink;
        self.ia_rdev = from.ia_rdev;
        self.ia_blksize = from.ia_blksize;
        self.ia_uid = from.ia_uid;
        self.ia_gid = from.ia_gid;
        self.ia_ctime = from.ia_ctime;
        self.ia_ctime_nsec = from.ia_ctime_nsec;
    }

    /// Drops the fields a data server is not authoritative for.
    pub fn cleanse_ds(&mut self) {
        self.ia_uid = 0;
        self.ia_gid = 0;
        self.ia_prot = 0;
        self.ia_nlink = 0;
        self.ia_ctime = 0;
        self.ia_ctime_nsec = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(size: u64, uid: u32, mtime: (i64, u32)) -> Iatt {
        let mut buf = Iatt::new(Gfid::generate(), IaType::Regular, 0o644);
        buf.ia_size = size;
        buf.ia_blocks = size / 512;
        buf.ia_uid = uid;
        buf.ia_gid = uid + 1;
        buf.ia_mtime = mtime.0;
        buf.ia_mtime_nsec = mtime.1;
        buf.ia_atime = mtime.0;
        buf.ia_ctime = mtime.0;
        buf
    }

    fn without_sums(buf: &Iatt) -> Iatt {
        let mut out = *buf;
        out.ia_size = 0;
        out.ia_blocks = 0;
        out
    }

    #[test]
    fn test_merge_into_self_keeps_max_and_overwrite_fields() {
        let a = sample(4096, 10, (100, 5));
        let mut merged = a;
        merged.merge(&a);
        assert_eq!(without_sums(&merged), without_sums(&a));
    }

    #[test]
    fn test_merge_twice_equals_once_for_max_fields() {
        let a = sample(0, 10, (100, 5));
        let b = sample(8192, 7, (100, 9));

        let mut once = a;
        once.merge(&b);
        let mut twice = once;
        twice.merge(&b);

        assert_eq!(without_sums(&once), without_sums(&twice));
        assert_eq!(once.ia_uid, 10);
        assert_eq!(once.ia_gfid, b.ia_gfid);
        assert_eq!((once.ia_mtime, once.ia_mtime_nsec), (100, 9));
    }

    #[test]
    fn test_summation_is_not_idempotent() {
        let a = sample(100, 1, (1, 0));
        let b = sample(50, 1, (1, 0));

        let mut once = a;
        once.merge(&b);
        assert_eq!(once.ia_size, 150);

        let mut twice = once;
        twice.merge(&b);
        assert_eq!(twice.ia_size, 200);
        assert_ne!(once.ia_size, twice.ia_size);

        // folding the original size back in only grows the sum
        let mut back = once;
        back.merge(&a);
        assert_eq!(back.ia_size, 250);
    }

    #[test]
    fn test_time_merge_is_lexicographic() {
        let mut a = sample(0, 0, (10, 900));
        let later_sec = sample(0, 0, (11, 0));
        let same_sec_earlier = sample(0, 0, (10, 100));

        a.merge(&same_sec_earlier);
        assert_eq!((a.ia_mtime, a.ia_mtime_nsec), (10, 900));
        a.merge(&later_sec);
        assert_eq!((a.ia_mtime, a.ia_mtime_nsec), (11, 0));
    }

    #[test]
    fn test_merge_ds_keeps_mds_fields() {
        let mut mds = sample(0, 1000, (50, 0));
        mds.ia_prot = 0o755;
        mds.ia_nlink = 2;
        let mut ds = sample(12345, 0, (60, 1));
        ds.ia_prot = 0o600;
        ds.ia_ctime = 70;

        let before = mds;
        mds.merge_ds(&ds);

        assert_eq!(mds.ia_size, 12345);
        assert_eq!(mds.ia_blocks, ds.ia_blocks);
        assert_eq!((mds.ia_mtime, mds.ia_mtime_nsec), (60, 1));
        assert_eq!(mds.ia_uid, 1000);
        assert_eq!(mds.ia_prot, 0o755);
        assert_eq!(mds.ia_nlink, 2);
        assert_eq!(mds.ia_ctime, before.ia_ctime);
        assert_eq!(mds.ia_gfid, before.ia_gfid);
    }

    #[test]
    fn test_copy_mds_skips_data_fields() {
        let mut to = sample(777, 1, (5, 0));
        let from = sample(1, 42, (9, 9));
        to.copy_mds(&from);
        assert_eq!(to.ia_size, 777);
        assert_eq!(to.ia_mtime, 5);
        assert_eq!(to.ia_uid, 42);
        assert_eq!(to.ia_gfid, from.ia_gfid);

        let mut full = Iatt::default();
        full.copy_from(&from);
        assert_eq!(full, from);
    }

    #[test]
    fn test_cleanse_ds() {
        let mut buf = sample(10, 5, (3, 3));
        buf.cleanse_ds();
        assert_eq!(buf.ia_uid, 0);
        assert_eq!(buf.ia_prot, 0);
        assert_eq!(buf.ia_ctime, 0);
        assert_eq!(buf.ia_size, 10);
        assert_eq!(buf.ia_mtime, 3);
    }

    #[test]
    fn test_mode_conversion() {
        assert_eq!(IaType::from_mode(S_IFDIR | 0o755), IaType::Directory);
        let buf = Iatt::new(Gfid::NULL, IaType::Regular, 0o100600);
        assert_eq!(buf.ia_prot, 0o600);
        assert_eq!(buf.st_mode(), S_IFREG | 0o600);
    }
}
