//! Versioned member list and membership change notifications.

use std::collections::HashSet;

use hazelcast_core::protocol::codecs::client::MemberInfo;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::membership::{Member, MemberEvent};

const MEMBERSHIP_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct MemberList {
    version: Option<i32>,
    members: Vec<Member>,
}

/// Holds the latest member list pushed by the cluster.
///
/// Applying a newer list diffs it against the current one and broadcasts a
/// [`MemberEvent`] per member that left or joined, removals first.
#[derive(Debug)]
pub struct ClusterService {
    state: RwLock<MemberList>,
    sender: broadcast::Sender<MemberEvent>,
}

impl ClusterService {
    pub(crate) fn new() -> Self {
        let (sender, _) = broadcast::channel(MEMBERSHIP_CHANNEL_CAPACITY);
        Self {
            state: RwLock::new(MemberList::default()),
            sender,
        }
    }

    /// Returns the current members, in member list order.
    pub fn members(&self) -> Vec<Member> {
        self.state.read().members.clone()
    }

    /// Returns the member with the given UUID.
    pub fn member(&self, uuid: &Uuid) -> Option<Member> {
        self.state
            .read()
            .members
            .iter()
            .find(|member| member.uuid() == *uuid)
            .cloned()
    }

    /// Returns the number of known members.
    pub fn member_count(&self) -> usize {
        self.state.read().members.len()
    }

    /// Returns the version of the current member list, if one was applied.
    pub fn member_list_version(&self) -> Option<i32> {
        self.state.read().version
    }

    /// Subscribes to membership changes.
    pub fn subscribe(&self) -> broadcast::Receiver<MemberEvent> {
        self.sender.subscribe()
    }

    /// Applies a member list unless it is older than or equal to the current one.
    ///
    /// Returns the events that were broadcast.
    pub(crate) fn apply_member_list(&self, version: i32, infos: &[MemberInfo]) -> Vec<MemberEvent> {
        let mut members = Vec::with_capacity(infos.len());
        for info in infos {
            match Member::from_info(info) {
                Ok(member) => members.push(member),
                Err(e) => tracing::warn!(uuid = %info.uuid, error = %e, "ignoring malformed member"),
            }
        }

        let events = {
            let mut state = self.state.write();
            if state.version.is_some_and(|current| current >= version) {
                tracing::debug!(version, "ignoring stale member list");
                return Vec::new();
            }

            let new_ids: HashSet<Uuid> = members.iter().map(Member::uuid).collect();
            let old_ids: HashSet<Uuid> = state.members.iter().map(Member::uuid).collect();

            let mut events: Vec<MemberEvent> = state
                .members
                .iter()
                .filter(|member| !new_ids.contains(&member.uuid()))
                .cloned()
                .map(MemberEvent::member_removed)
                .collect();
            events.extend(
                members
                    .iter()
                    .filter(|member| !old_ids.contains(&member.uuid()))
                    .cloned()
                    .map(MemberEvent::member_added),
            );

            state.version = Some(version);
            state.members = members;
            events
        };

        for event in &events {
            tracing::info!(
                uuid = %event.member.uuid(),
                address = %event.member.address(),
                change = %event.event_type,
                "cluster membership changed"
            );
            let _ = self.sender.send(event.clone());
        }
        events
    }

    /// Forgets the member list, reporting every known member as removed.
    pub(crate) fn reset(&self) {
        let removed = {
            let mut state = self.state.write();
            state.version = None;
            std::mem::take(&mut state.members)
        };
        for member in removed {
            let _ = self.sender.send(MemberEvent::member_removed(member));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemberEventType;
    use hazelcast_core::protocol::codecs::client::{MemberVersion, WireAddress};
    use std::collections::HashMap;

    fn info(uuid: Uuid, port: i32) -> MemberInfo {
        MemberInfo {
            uuid,
            lite_member: false,
            address: WireAddress::new("127.0.0.1", port),
            attributes: HashMap::new(),
            version: MemberVersion::default(),
        }
    }

    #[test]
    fn test_apply_reports_added_members() {
        let service = ClusterService::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let events = service.apply_member_list(1, &[info(a, 5701), info(b, 5702)]);
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.event_type == MemberEventType::Added));
        assert_eq!(service.member_count(), 2);
        assert_eq!(service.member_list_version(), Some(1));
    }

    #[test]
    fn test_diff_removed_before_added() {
        let service = ClusterService::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        service.apply_member_list(1, &[info(a, 5701), info(b, 5702)]);

        let events = service.apply_member_list(2, &[info(a, 5701), info(c, 5703)]);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, MemberEventType::Removed);
        assert_eq!(events[0].member.uuid(), b);
        assert_eq!(events[1].event_type, MemberEventType::Added);
        assert_eq!(events[1].member.uuid(), c);
        assert!(service.member(&b).is_none());
    }

    #[test]
    fn test_stale_version_is_ignored() {
        let service = ClusterService::new();
        let a = Uuid::new_v4();
        service.apply_member_list(5, &[info(a, 5701)]);

        assert!(service.apply_member_list(5, &[]).is_empty());
        assert!(service.apply_member_list(4, &[]).is_empty());
        assert_eq!(service.member_count(), 1);
    }

    #[tokio::test]
    async fn test_reset_broadcasts_removals() {
        let service = ClusterService::new();
        let a = Uuid::new_v4();
        service.apply_member_list(3, &[info(a, 5701)]);
        let mut events = service.subscribe();

        service.reset();
        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, MemberEventType::Removed);
        assert_eq!(service.member_list_version(), None);

        // A lower version is accepted after a reset.
        assert_eq!(service.apply_member_list(1, &[info(a, 5701)]).len(), 1);
    }

    #[test]
    fn test_malformed_member_is_skipped() {
        let service = ClusterService::new();
        service.apply_member_list(1, &[info(Uuid::new_v4(), -1), info(Uuid::new_v4(), 5701)]);
        assert_eq!(service.member_count(), 1);
    }
}
