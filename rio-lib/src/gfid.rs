use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{RioError, RioResult};

/// Last byte of the placeholder parent GFID used while an inode is created
/// without a name.
pub const GF_AUXILLARY_PARGFID: u8 = 0x0d;

pub const GFID_LEN: usize = 16;

/// Globally unique, location independent name of a filesystem object.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Gfid([u8; GFID_LEN]);

impl Gfid {
    pub const NULL: Gfid = Gfid([0; GFID_LEN]);
    pub const ROOT: Gfid = Gfid([0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);

    pub const fn from_bytes(bytes: [u8; GFID_LEN]) -> Self {
        Gfid(bytes)
    }

    pub fn generate() -> Self {
        Gfid(*Uuid::new_v4().as_bytes())
    }

    pub fn aux_parent() -> Self {
        let mut bytes = [0u8; GFID_LEN];
        bytes[GFID_LEN - 1] = GF_AUXILLARY_PARGFID;
        Gfid(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> RioResult<Self> {
        let raw: [u8; GFID_LEN] = bytes.try_into().map_err(|_| {
            RioError::InvalidParam(format!("gfid must be {} bytes, got {}", GFID_LEN, bytes.len()))
        })?;
        Ok(Gfid(raw))
    }

    pub fn as_bytes(&self) -> &[u8; GFID_LEN] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; GFID_LEN] {
        &mut self.0
    }

    pub fn is_null(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn is_aux_parent(&self) -> bool {
        *self == Self::aux_parent()
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }
}

impl fmt::Display for Gfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0).hyphenated())
    }
}

impl fmt::Debug for Gfid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gfid({})", self)
    }
}

impl FromStr for Gfid {
    type Err = RioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::parse_str(s.trim())
            .map_err(|e| RioError::InvalidParam(format!("invalid gfid {}: {}", s, e)))?;
        Ok(Gfid(*uuid.as_bytes()))
    }
}
