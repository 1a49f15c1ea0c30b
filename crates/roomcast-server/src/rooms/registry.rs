//! Room membership registry.
//!
//! A room exists exactly while it has at least one member: joining creates
//! it, and the leave that removes its last member deletes it under the same
//! shard lock. Every method is synchronous and releases its lock before
//! returning, so callers may freely `.await` between registry calls.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use roomcast_core::ConnectionId;
use serde::Serialize;
use tracing::debug;

use super::connection::ConnectionHandle;

/// Members of one room, in join order.
#[derive(Default)]
struct Room {
    members: Vec<Arc<dyn ConnectionHandle>>,
}

impl Room {
    fn contains(&self, id: &ConnectionId) -> bool {
        self.members.iter().any(|m| m.id() == id)
    }
}

/// One row of [`RoomRegistry::rooms`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RoomSummary {
    /// Room identifier.
    pub room_id: String,
    /// Current member count.
    pub user_count: usize,
}

/// Concurrent map from room id to member set.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<String, Room>,
}

impl RoomRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `handle` to `room_id`, creating the room if needed.
    ///
    /// Joining twice with the same connection id is a no-op. Returns the
    /// member count after the join.
    pub fn join(&self, room_id: &str, handle: Arc<dyn ConnectionHandle>) -> usize {
        let mut room = self.rooms.entry(room_id.to_owned()).or_default();
        if room.contains(handle.id()) {
            debug!(room_id, conn_id = %handle.id(), "connection already in room");
        } else {
            room.members.push(handle);
        }
        room.members.len()
    }

    /// Remove `connection_id` from `room_id`, deleting the room when it
    /// empties.
    ///
    /// Absent rooms and non-members are accepted. Returns the member count
    /// after the leave (0 when the room no longer exists).
    pub fn leave(&self, room_id: &str, connection_id: &ConnectionId) -> usize {
        match self.rooms.entry(room_id.to_owned()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().members.retain(|m| m.id() != connection_id);
                let remaining = entry.get().members.len();
                if remaining == 0 {
                    let _ = entry.remove();
                    debug!(room_id, "room emptied and removed");
                }
                remaining
            }
            Entry::Vacant(_) => 0,
        }
    }

    /// Point-in-time copy of a room's members (empty for an absent room).
    pub fn members_snapshot(&self, room_id: &str) -> Vec<Arc<dyn ConnectionHandle>> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Current member count of a room (0 for an absent room).
    pub fn member_count(&self, room_id: &str) -> usize {
        self.rooms.get(room_id).map_or(0, |room| room.members.len())
    }

    /// Whether the room currently exists.
    pub fn room_exists(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Summary of every live room, sorted by room id.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<RoomSummary> = self
            .rooms
            .iter()
            .map(|entry| RoomSummary {
                room_id: entry.key().clone(),
                user_count: entry.members.len(),
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::connection::ClientConnection;

    fn handle() -> Arc<dyn ConnectionHandle> {
        let (conn, _rx) = ClientConnection::channel(4);
        conn
    }

    fn assert_existence_matches_count(registry: &RoomRegistry, room_id: &str) {
        assert_eq!(
            registry.room_exists(room_id),
            registry.member_count(room_id) > 0,
            "room {room_id}"
        );
    }

    #[test]
    fn join_creates_room_and_counts() {
        let registry = RoomRegistry::new();
        assert!(!registry.room_exists("r1"));
        assert_eq!(registry.join("r1", handle()), 1);
        assert_eq!(registry.join("r1", handle()), 2);
        assert!(registry.room_exists("r1"));
        assert_eq!(registry.member_count("r1"), 2);
    }

    #[test]
    fn rejoin_is_deduplicated() {
        let registry = RoomRegistry::new();
        let a = handle();
        assert_eq!(registry.join("r1", a.clone()), 1);
        assert_eq!(registry.join("r1", a), 1);
        assert_eq!(registry.members_snapshot("r1").len(), 1);
    }

    #[test]
    fn leave_last_member_deletes_room() {
        let registry = RoomRegistry::new();
        let a = handle();
        let _ = registry.join("r2", a.clone());
        assert_eq!(registry.leave("r2", a.id()), 0);
        assert!(!registry.room_exists("r2"));
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn leave_absent_room_or_member_is_noop() {
        let registry = RoomRegistry::new();
        assert_eq!(registry.leave("nowhere", &ConnectionId::new()), 0);
        assert!(!registry.room_exists("nowhere"));

        let a = handle();
        let _ = registry.join("r1", a.clone());
        assert_eq!(registry.leave("r1", &ConnectionId::new()), 1);
        assert!(registry.room_exists("r1"));
    }

    #[test]
    fn snapshot_of_absent_room_is_empty() {
        let registry = RoomRegistry::new();
        assert!(registry.members_snapshot("ghost").is_empty());
        assert!(!registry.room_exists("ghost"));
    }

    #[test]
    fn snapshot_is_detached_from_later_mutations() {
        let registry = RoomRegistry::new();
        let a = handle();
        let b = handle();
        let _ = registry.join("r1", a.clone());
        let _ = registry.join("r1", b.clone());

        let snapshot = registry.members_snapshot("r1");
        let _ = registry.leave("r1", a.id());

        assert_eq!(snapshot.len(), 2);
        let ids: Vec<_> = registry
            .members_snapshot("r1")
            .iter()
            .map(|m| m.id().clone())
            .collect();
        assert_eq!(ids, vec![b.id().clone()]);
    }

    #[test]
    fn snapshot_preserves_join_order() {
        let registry = RoomRegistry::new();
        let handles: Vec<_> = (0..4).map(|_| handle()).collect();
        for h in &handles {
            let _ = registry.join("r1", h.clone());
        }
        let snapshot: Vec<_> = registry
            .members_snapshot("r1")
            .iter()
            .map(|m| m.id().clone())
            .collect();
        let expected: Vec<_> = handles.iter().map(|h| h.id().clone()).collect();
        assert_eq!(snapshot, expected);
    }

    #[test]
    fn existence_tracks_count_through_sequence() {
        let registry = RoomRegistry::new();
        let handles: Vec<_> = (0..5).map(|_| handle()).collect();
        let rooms = ["a", "b", "c"];

        // Deterministic interleaving of joins and leaves across rooms.
        for step in 0..60usize {
            let room = rooms[step % rooms.len()];
            let h = &handles[(step * 7) % handles.len()];
            if step % 3 == 0 {
                let _ = registry.leave(room, h.id());
            } else {
                let _ = registry.join(room, h.clone());
            }
            for room in rooms {
                assert_existence_matches_count(&registry, room);
            }
        }

        for h in &handles {
            for room in rooms {
                let _ = registry.leave(room, h.id());
            }
        }
        assert_eq!(registry.room_count(), 0);
        for room in rooms {
            assert_existence_matches_count(&registry, room);
        }
    }

    #[test]
    fn rooms_summary_is_sorted() {
        let registry = RoomRegistry::new();
        let _ = registry.join("zeta", handle());
        let _ = registry.join("alpha", handle());
        let _ = registry.join("alpha", handle());

        assert_eq!(
            registry.rooms(),
            vec![
                RoomSummary {
                    room_id: "alpha".into(),
                    user_count: 2,
                },
                RoomSummary {
                    room_id: "zeta".into(),
                    user_count: 1,
                },
            ]
        );
        assert_eq!(registry.room_count(), 2);
    }

    #[test]
    fn same_handle_in_two_rooms() {
        let registry = RoomRegistry::new();
        let a = handle();
        let _ = registry.join("r1", a.clone());
        let _ = registry.join("r2", a.clone());
        assert_eq!(registry.leave("r1", a.id()), 0);
        assert!(registry.room_exists("r2"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_join_leave_keeps_rooms_consistent() {
        let registry = Arc::new(RoomRegistry::new());
        let mut tasks = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let h = handle();
                let room = if i % 2 == 0 { "even" } else { "odd" };
                for _ in 0..50 {
                    let _ = registry.join(room, h.clone());
                    tokio::task::yield_now().await;
                    let _ = registry.leave(room, h.id());
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(registry.room_count(), 0);
        assert!(!registry.room_exists("even"));
        assert!(!registry.room_exists("odd"));
    }
}
