use rio_lib::{AttrReply, Gfid, Iatt, LookupReply, PrePostReply};

/// A reply whose attribute record the refresh may rewrite.
pub trait RefreshTarget {
    fn attr(&self) -> &Iatt;
    fn attr_mut(&mut self) -> &mut Iatt;
}

impl RefreshTarget for LookupReply {
    fn attr(&self) -> &Iatt {
        &self.buf
    }

    fn attr_mut(&mut self) -> &mut Iatt {
        &mut self.buf
    }
}

impl RefreshTarget for AttrReply {
    fn attr(&self) -> &Iatt {
        &self.buf
    }

    fn attr_mut(&mut self) -> &mut Iatt {
        &mut self.buf
    }
}

impl RefreshTarget for PrePostReply {
    fn attr(&self) -> &Iatt {
        &self.postbuf
    }

    fn attr_mut(&mut self) -> &mut Iatt {
        &mut self.postbuf
    }
}

/// A reply held back while the data server is consulted.
#[derive(Debug)]
pub struct Suspended<R> {
    gfid: Gfid,
    reply: R,
}

impl<R: RefreshTarget> Suspended<R> {
    pub fn new(reply: R) -> Self {
        Self {
            gfid: reply.attr().ia_gfid,
            reply,
        }
    }

    pub fn gfid(&self) -> Gfid {
        self.gfid
    }

    /// Folds the data server record into the held reply.
    pub fn merge_ds(&mut self, ds_buf: &Iatt) {
        self.reply.attr_mut().merge_ds(ds_buf);
    }

    pub fn resume(self) -> R {
        self.reply
    }
}

/// Next step of a reply on its way out of the MDS coordinator.
#[derive(Debug)]
pub enum RefreshStep<R> {
    Respond(rio_lib::RioResult<R>),
    Suspend(Suspended<R>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rio_lib::IaType;

    #[test]
    fn test_suspended_merges_into_postbuf() {
        let gfid = Gfid::generate();
        let mut reply = PrePostReply::default();
        reply.postbuf = Iatt::new(gfid, IaType::Regular, 0o644);
        reply.postbuf.ia_uid = 7;

        let mut frozen = Suspended::new(reply);
        assert_eq!(frozen.gfid(), gfid);

        let mut ds = Iatt::new(gfid, IaType::Regular, 0o600);
        ds.ia_size = 99;
        ds.ia_mtime = 5;
        frozen.merge_ds(&ds);

        let reply = frozen.resume();
        assert_eq!(reply.postbuf.ia_size, 99);
        assert_eq!(reply.postbuf.ia_uid, 7);
        assert_eq!(reply.postbuf.ia_prot, 0o644);
        assert_eq!(reply.prebuf.ia_size, 0);
    }
}
