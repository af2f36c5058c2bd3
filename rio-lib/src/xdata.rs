use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Gfid, RioError, RioResult};

/// Key/value side-data carried alongside a request or reply.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XData {
    entries: BTreeMap<String, Vec<u8>>,
}

pub type XDataRef = Arc<XData>;

impl XData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set_bin(&mut self, key: &str, value: Vec<u8>) {
        self.entries.insert(key.to_string(), value);
    }

    pub fn get_bin(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.entries.remove(key)
    }

    pub fn set_gfid(&mut self, key: &str, gfid: Gfid) {
        self.set_bin(key, gfid.as_bytes().to_vec());
    }

    /// Missing key is `None`; a value of the wrong length is an error.
    pub fn get_gfid(&self, key: &str) -> RioResult<Option<Gfid>> {
        match self.get_bin(key) {
            Some(raw) => Gfid::from_slice(raw).map(Some),
            None => Ok(None),
        }
    }

    pub fn set_str(&mut self, key: &str, value: &str) {
        self.set_bin(key, value.as_bytes().to_vec());
    }

    pub fn get_str(&self, key: &str) -> RioResult<Option<String>> {
        match self.get_bin(key) {
            Some(raw) => String::from_utf8(raw.to_vec())
                .map(Some)
                .map_err(|e| RioError::InvalidParam(format!("xdata {} is not utf8: {}", key, e))),
            None => Ok(None),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GFID_REQ_KEY;

    #[test]
    fn test_gfid_value() {
        let mut xdata = XData::new();
        assert_eq!(xdata.get_gfid(GFID_REQ_KEY).unwrap(), None);

        let gfid = Gfid::generate();
        xdata.set_gfid(GFID_REQ_KEY, gfid);
        assert_eq!(xdata.get_gfid(GFID_REQ_KEY).unwrap(), Some(gfid));

        xdata.set_bin(GFID_REQ_KEY, vec![1, 2, 3]);
        assert!(xdata.get_gfid(GFID_REQ_KEY).is_err());
    }
}
