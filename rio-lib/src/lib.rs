// rio-lib: RIO 各个组件共用的基础类型
// GFID / iatt / loc / xdata 以及 Subvolume 操作接口都在这里定义

mod fop;
mod gfid;
mod iatt;
mod inode;
mod loc;
mod subvol;
mod xdata;

pub use fop::*;
pub use gfid::*;
pub use iatt::*;
pub use inode::*;
pub use loc::*;
pub use subvol::*;
pub use xdata::*;

use thiserror::Error;

#[macro_use]
extern crate log;

/// Side-data key carrying the GFID an entry creation must use.
pub const GFID_REQ_KEY: &str = "gfid-req";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RioError {
    #[error("invalid param: {0}")]
    InvalidParam(String),

    #[error("allocation failed: {0}")]
    NoMemory(String),

    /// The addressed object lives on another subvolume. The attribute record,
    /// when present, carries the GFID to chase.
    #[error("object is remote{}", remote_hint(.0))]
    Remote(Option<Box<Iatt>>),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("no data: {0}")]
    NoData(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("I/O error: {0}")]
    IoError(String),

    #[error("operation failed with errno {0}")]
    Errno(i32),
}

fn remote_hint(buf: &Option<Box<Iatt>>) -> String {
    match buf {
        Some(buf) if !buf.ia_gfid.is_null() => format!(", gfid {}", buf.ia_gfid),
        _ => String::new(),
    }
}

impl RioError {
    pub fn remote(gfid: Gfid) -> Self {
        let mut buf = Iatt::default();
        buf.ia_gfid = gfid;
        RioError::Remote(Some(Box::new(buf)))
    }

    pub fn errno(&self) -> i32 {
        match self {
            RioError::InvalidParam(_) => libc::EINVAL,
            RioError::NoMemory(_) => libc::ENOMEM,
            RioError::Remote(_) => libc::EREMOTE,
            RioError::NotFound(_) => libc::ENOENT,
            RioError::AlreadyExists(_) => libc::EEXIST,
            RioError::NoData(_) => libc::ENODATA,
            RioError::Unsupported(_) => libc::ENOTSUP,
            RioError::IoError(_) => libc::EIO,
            RioError::Errno(code) => *code,
        }
    }

    pub fn from_errno(code: i32) -> Self {
        match code {
            libc::EINVAL => RioError::InvalidParam("remote EINVAL".to_string()),
            libc::ENOMEM => RioError::NoMemory("remote ENOMEM".to_string()),
            libc::EREMOTE => RioError::Remote(None),
            libc::ENOENT => RioError::NotFound("remote ENOENT".to_string()),
            libc::EEXIST => RioError::AlreadyExists("remote EEXIST".to_string()),
            libc::ENODATA => RioError::NoData("remote ENODATA".to_string()),
            libc::ENOTSUP => RioError::Unsupported("remote ENOTSUP".to_string()),
            libc::EIO => RioError::IoError("remote EIO".to_string()),
            other => RioError::Errno(other),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RioError::NotFound(_))
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, RioError::Remote(_))
    }

    /// GFID to re-resolve against, when a redirect came with a usable one.
    pub fn remote_gfid(&self) -> Option<Gfid> {
        match self {
            RioError::Remote(Some(buf)) if !buf.ia_gfid.is_null() => Some(buf.ia_gfid),
            _ => None,
        }
    }
}

pub type RioResult<T> = std::result::Result<T, RioError>;

impl From<std::io::Error> for RioError {
    fn from(err: std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => RioError::from_errno(code),
            None => RioError::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RioError {
    fn from(err: serde_json::Error) -> Self {
        RioError::InvalidParam(format!("json: {}", err))
    }
}
