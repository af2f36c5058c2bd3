use rio_common::RioEvent;

/// Filters events on their way up from a server's children.
///
/// Connectivity of the local store is the server's own; the other children
/// are peers the server only reaches for directory creation, so their ups and
/// downs stay below this layer. Returns the event to pass to the parent.
pub fn server_notify(
    name: &str,
    local: Option<&str>,
    event: RioEvent,
    from: &str,
) -> Option<RioEvent> {
    if !event.is_child_event() {
        return Some(event);
    }

    if local == Some(from) {
        info!("{}: {} from local subvolume {}", name, event, from);
        Some(event)
    } else {
        debug!("{}: dropping {} from {}", name, event, from);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_events_only_from_local() {
        let local = Some("mds-0");
        assert_eq!(
            server_notify("srv", local, RioEvent::ChildUp, "mds-0"),
            Some(RioEvent::ChildUp)
        );
        assert_eq!(server_notify("srv", local, RioEvent::ChildUp, "mds-1"), None);
        assert_eq!(server_notify("srv", local, RioEvent::SomeDescendentDown, "ds-0"), None);
        assert_eq!(server_notify("srv", None, RioEvent::ChildDown, "mds-0"), None);
    }

    #[test]
    fn test_other_events_pass() {
        assert_eq!(
            server_notify("srv", Some("mds-0"), RioEvent::ParentUp, "mds-1"),
            Some(RioEvent::ParentUp)
        );
        assert_eq!(
            server_notify("srv", Some("mds-0"), RioEvent::ChildConnecting, "mds-1"),
            Some(RioEvent::ChildConnecting)
        );
    }
}
