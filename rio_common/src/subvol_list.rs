use rio_lib::{RioError, RioResult, SubvolRef};
use serde::{Deserialize, Serialize};

pub const SUBVOL_STRING_SEP: char = ':';

/// How a parsed subvolume list is ordered before it feeds a layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubvolOrdering {
    /// Configuration order, except that the first token moves in front of
    /// the first later token that sorts after it. Server side lists name the
    /// local subvolume first, so this keeps their bucket tables identical to
    /// the client's.
    #[default]
    FirstTokenReposition,
    /// Plain lexicographic order by name.
    Sorted,
}

fn same_subvol(a: &SubvolRef, b: &SubvolRef) -> bool {
    a.name() == b.name()
}

/// Parses a `:` separated list of subvolume names against `children`.
///
/// Unknown names are skipped with a warning, repeated names are dropped.
/// The result may be empty; callers decide whether that is fatal.
pub fn create_subvol_list(
    owner: &str,
    spec: &str,
    children: &[SubvolRef],
    ordering: SubvolOrdering,
) -> Vec<SubvolRef> {
    let mut matched: Vec<SubvolRef> = Vec::new();
    for token in spec.split(SUBVOL_STRING_SEP).map(str::trim) {
        if token.is_empty() {
            continue;
        }
        let Some(child) = children.iter().find(|c| c.name() == token) else {
            warn!("{}: subvolume {} is not a child, skipped", owner, token);
            continue;
        };
        if matched.iter().any(|m| same_subvol(m, child)) {
            debug!("{}: subvolume {} listed twice", owner, token);
            continue;
        }
        matched.push(child.clone());
    }

    match ordering {
        SubvolOrdering::Sorted => {
            matched.sort_by(|a, b| a.name().cmp(b.name()));
            matched
        }
        SubvolOrdering::FirstTokenReposition => reposition_first(matched),
    }
}

fn reposition_first(matched: Vec<SubvolRef>) -> Vec<SubvolRef> {
    let mut iter = matched.into_iter();
    let Some(first) = iter.next() else {
        return Vec::new();
    };

    let mut list = Vec::new();
    let mut first_done = false;
    for subvol in iter {
        if !first_done && first.name() < subvol.name() {
            list.push(first.clone());
            first_done = true;
        }
        list.push(subvol);
    }
    if !first_done {
        list.push(first);
    }
    list
}

/// Data and metadata subvolume lists of one RIO instance.
#[derive(Clone, Default)]
pub struct SubvolSet {
    pub dc_list: Vec<SubvolRef>,
    pub mdc_list: Vec<SubvolRef>,
}

impl SubvolSet {
    pub fn dc_count(&self) -> usize {
        self.dc_list.len()
    }

    pub fn mdc_count(&self) -> usize {
        self.mdc_list.len()
    }

    pub fn find(&self, name: &str) -> Option<SubvolRef> {
        self.dc_list
            .iter()
            .chain(self.mdc_list.iter())
            .find(|s| s.name() == name)
            .cloned()
    }
}

/// Builds both lists. Either list ending up empty is an error.
pub fn process_volume_lists(
    owner: &str,
    data_spec: &str,
    metadata_spec: &str,
    children: &[SubvolRef],
    ordering: SubvolOrdering,
) -> RioResult<SubvolSet> {
    let dc_list = create_subvol_list(owner, data_spec, children, ordering);
    if dc_list.is_empty() {
        error!("{}: no data subvolumes in \"{}\"", owner, data_spec);
        return Err(RioError::InvalidParam(format!(
            "{}: data subvolume list is empty",
            owner
        )));
    }

    let mdc_list = create_subvol_list(owner, metadata_spec, children, ordering);
    if mdc_list.is_empty() {
        error!("{}: no metadata subvolumes in \"{}\"", owner, metadata_spec);
        return Err(RioError::InvalidParam(format!(
            "{}: metadata subvolume list is empty",
            owner
        )));
    }

    for subvol in dc_list.iter() {
        if mdc_list.iter().any(|m| same_subvol(m, subvol)) {
            warn!(
                "{}: subvolume {} is in both the data and metadata lists",
                owner,
                subvol.name()
            );
        }
    }

    info!(
        "{}: {} data subvolumes, {} metadata subvolumes",
        owner,
        dc_list.len(),
        mdc_list.len()
    );
    Ok(SubvolSet { dc_list, mdc_list })
}
