use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Events exchanged between layers at startup and on connectivity changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RioEvent {
    ParentUp,
    ParentDown,
    ChildUp,
    ChildDown,
    ChildConnecting,
    SomeDescendentUp,
    SomeDescendentDown,
}

impl RioEvent {
    pub fn is_child_event(&self) -> bool {
        matches!(
            self,
            RioEvent::ChildUp
                | RioEvent::ChildDown
                | RioEvent::SomeDescendentUp
                | RioEvent::SomeDescendentDown
        )
    }
}

impl fmt::Display for RioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RioEvent::ParentUp => "PARENT_UP",
            RioEvent::ParentDown => "PARENT_DOWN",
            RioEvent::ChildUp => "CHILD_UP",
            RioEvent::ChildDown => "CHILD_DOWN",
            RioEvent::ChildConnecting => "CHILD_CONNECTING",
            RioEvent::SomeDescendentUp => "SOME_DESCENDENT_UP",
            RioEvent::SomeDescendentDown => "SOME_DESCENDENT_DOWN",
        };
        f.write_str(name)
    }
}

/// Counts CHILD_UP events until every expected child reported.
#[derive(Debug)]
pub struct ChildUpCounter {
    seen: AtomicUsize,
    expected: usize,
}

impl ChildUpCounter {
    pub fn new(expected: usize) -> Self {
        Self {
            seen: AtomicUsize::new(0),
            expected,
        }
    }

    /// Records one CHILD_UP. True only for the event that completes the set.
    pub fn child_up(&self) -> bool {
        let seen = self.seen.fetch_add(1, Ordering::AcqRel) + 1;
        seen == self.expected
    }

    pub fn seen(&self) -> usize {
        self.seen.load(Ordering::Acquire)
    }

    pub fn expected(&self) -> usize {
        self.expected
    }
}
