use crate::{Gfid, InodeRef};

/// Location of an object: either a (parent, name) pair or a bare GFID.
#[derive(Clone, Debug, Default)]
pub struct Loc {
    pub path: Option<String>,
    pub name: Option<String>,
    pub inode: Option<InodeRef>,
    pub parent: Option<InodeRef>,
    pub gfid: Gfid,
    pub pargfid: Gfid,
}

impl Loc {
    pub fn from_gfid(gfid: Gfid) -> Self {
        Self {
            path: Some(format!("<gfid:{}>", gfid)),
            gfid,
            ..Default::default()
        }
    }

    pub fn from_parent(pargfid: Gfid, name: &str) -> Self {
        Self {
            path: Some(format!("<gfid:{}>/{}", pargfid, name)),
            name: Some(name.to_string()),
            pargfid,
            ..Default::default()
        }
    }

    pub fn with_parent_inode(mut self, parent: InodeRef) -> Self {
        self.pargfid = parent.gfid();
        self.parent = Some(parent);
        self
    }

    pub fn with_inode(mut self, inode: InodeRef) -> Self {
        self.gfid = inode.gfid();
        self.inode = Some(inode);
        self
    }

    /// No usable parent reference: the object is addressed by GFID alone.
    pub fn is_nameless(&self) -> bool {
        self.pargfid.is_null() || self.name.is_none()
    }

    /// GFID of the object, preferring the live inode handle.
    pub fn inode_gfid(&self) -> Option<Gfid> {
        if let Some(inode) = &self.inode {
            if !inode.gfid().is_null() {
                return Some(inode.gfid());
            }
        }
        if self.gfid.is_null() {
            None
        } else {
            Some(self.gfid)
        }
    }

    /// GFID of the parent, preferring the live parent handle.
    pub fn parent_gfid(&self) -> Option<Gfid> {
        if let Some(parent) = &self.parent {
            if !parent.gfid().is_null() {
                return Some(parent.gfid());
            }
        }
        if self.pargfid.is_null() {
            None
        } else {
            Some(self.pargfid)
        }
    }

    /// Builds a location that names an inode only by GFID. With `auxparent`
    /// the parent is the auxiliary placeholder used during inode creation.
    pub fn prepare_inode_loc(inode: Option<InodeRef>, gfid: Gfid, auxparent: bool) -> Self {
        let mut loc = Loc::from_gfid(gfid);
        loc.inode = inode;
        if auxparent {
            loc.pargfid = Gfid::aux_parent();
        }
        loc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Inode;

    #[test]
    fn test_nameless_detection() {
        let gfid = Gfid::generate();
        assert!(Loc::from_gfid(gfid).is_nameless());
        assert!(!Loc::from_parent(Gfid::ROOT, "a").is_nameless());

        let mut no_name = Loc::from_parent(Gfid::ROOT, "a");
        no_name.name = None;
        assert!(no_name.is_nameless());
    }

    #[test]
    fn test_key_prefers_live_handles() {
        let live = Inode::new(Gfid::generate());
        let mut loc = Loc::from_gfid(Gfid::generate());
        loc.inode = Some(live.clone());
        assert_eq!(loc.inode_gfid(), Some(live.gfid()));

        loc.inode = Some(Inode::new(Gfid::NULL));
        assert_eq!(loc.inode_gfid(), Some(loc.gfid));

        let empty = Loc::default();
        assert_eq!(empty.inode_gfid(), None);
        assert_eq!(empty.parent_gfid(), None);

        let parent = Inode::new(Gfid::generate());
        let loc = Loc::from_parent(Gfid::ROOT, "x").with_parent_inode(parent.clone());
        assert_eq!(loc.parent_gfid(), Some(parent.gfid()));
    }

    #[test]
    fn test_aux_parent_loc() {
        let gfid = Gfid::generate();
        let loc = Loc::prepare_inode_loc(None, gfid, true);
        assert_eq!(loc.gfid, gfid);
        assert!(loc.pargfid.is_aux_parent());
        assert!(loc.name.is_none());
        assert!(loc.is_nameless());

        let plain = Loc::prepare_inode_loc(None, gfid, false);
        assert!(plain.pargfid.is_null());
        assert!(plain.is_nameless());
    }
}
