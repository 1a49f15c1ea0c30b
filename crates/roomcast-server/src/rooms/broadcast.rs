//! Room fan-out with eviction of unreachable members.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use metrics::counter;
use roomcast_core::{Envelope, TransportError};
use tracing::{debug, warn};

use super::connection::ConnectionHandle;
use super::registry::RoomRegistry;
use crate::metrics::{ROOM_BROADCASTS_TOTAL, ROOM_EVICTIONS_TOTAL};

/// Outcome of one [`Broadcaster::broadcast`] call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Members in the snapshot.
    pub recipients: usize,
    /// Sends that completed.
    pub delivered: usize,
    /// Members removed because their send failed.
    pub evicted: usize,
}

/// Delivers envelopes to room members through a shared [`RoomRegistry`].
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
    send_timeout: Duration,
}

impl Broadcaster {
    /// Create a broadcaster whose every send is bounded by `send_timeout`.
    pub fn new(registry: Arc<RoomRegistry>, send_timeout: Duration) -> Self {
        Self {
            registry,
            send_timeout,
        }
    }

    /// Send `envelope` to every current member of `room_id`.
    ///
    /// The envelope is serialized once and sent to a snapshot of the room
    /// concurrently. After the fan-out, every member whose send failed or
    /// timed out is removed from the room and closed, which ends its
    /// session. Never fails.
    pub async fn broadcast(&self, room_id: &str, envelope: &Envelope) -> BroadcastReport {
        let json: Arc<str> = match envelope.to_json() {
            Ok(j) => j.into(),
            Err(e) => {
                warn!(event_type = envelope.kind(), error = %e, "failed to serialize envelope");
                return BroadcastReport::default();
            }
        };

        let members = self.registry.members_snapshot(room_id);
        let recipients = members.len();
        debug!(
            event_type = envelope.kind(),
            room_id, recipients, "broadcast to room"
        );
        counter!(ROOM_BROADCASTS_TOTAL, "type" => envelope.kind()).increment(1);

        let sends = members.iter().map(|member| {
            let json = json.clone();
            async move { self.deliver(member.as_ref(), json).await.err() }
        });
        let results = join_all(sends).await;

        let mut evicted = 0;
        for (member, error) in members.iter().zip(results) {
            let Some(error) = error else { continue };
            let _ = self.registry.leave(room_id, member.id());
            member.close();
            evicted += 1;
            warn!(
                conn_id = %member.id(),
                room_id,
                error = %error,
                error_kind = error.error_kind(),
                "failed to send envelope to client, evicting"
            );
            counter!(ROOM_EVICTIONS_TOTAL, "reason" => error.error_kind()).increment(1);
        }

        BroadcastReport {
            recipients,
            delivered: recipients - evicted,
            evicted,
        }
    }

    /// Send `envelope` to one connection only. No eviction.
    pub async fn send_to(
        &self,
        handle: &dyn ConnectionHandle,
        envelope: &Envelope,
    ) -> Result<(), TransportError> {
        let json: Arc<str> = match envelope.to_json() {
            Ok(j) => j.into(),
            Err(e) => {
                warn!(event_type = envelope.kind(), error = %e, "failed to serialize envelope");
                return Ok(());
            }
        };
        self.deliver(handle, json).await
    }

    async fn deliver(
        &self,
        handle: &dyn ConnectionHandle,
        json: Arc<str>,
    ) -> Result<(), TransportError> {
        match tokio::time::timeout(self.send_timeout, handle.send(json)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.send_timeout)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rooms::connection::ClientConnection;
    use roomcast_core::logging::test_utils::capture_logs;
    use tokio::sync::mpsc;
    use tracing::Level;

    const TIMEOUT: Duration = Duration::from_millis(200);

    fn setup() -> (Arc<RoomRegistry>, Broadcaster) {
        let registry = Arc::new(RoomRegistry::new());
        let broadcaster = Broadcaster::new(registry.clone(), TIMEOUT);
        (registry, broadcaster)
    }

    fn join(
        registry: &RoomRegistry,
        room_id: &str,
        capacity: usize,
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (conn, rx) = ClientConnection::channel(capacity);
        let _ = registry.join(room_id, conn.clone());
        (conn, rx)
    }

    fn recv_json(rx: &mut mpsc::Receiver<Arc<str>>) -> serde_json::Value {
        let text = rx.try_recv().expect("expected a frame");
        serde_json::from_str(&text).unwrap()
    }

    async fn assert_closed(conn: &ClientConnection) {
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .expect("evicted connection was not closed");
    }

    #[tokio::test]
    async fn delivers_to_every_member() {
        let (registry, broadcaster) = setup();
        let (_a, mut rx_a) = join(&registry, "r1", 8);
        let (_b, mut rx_b) = join(&registry, "r1", 8);

        let report = broadcaster
            .broadcast("r1", &Envelope::user_joined("r1", 2))
            .await;
        assert_eq!(
            report,
            BroadcastReport {
                recipients: 2,
                delivered: 2,
                evicted: 0,
            }
        );
        assert_eq!(recv_json(&mut rx_a)["type"], "user_joined");
        assert_eq!(recv_json(&mut rx_b)["user_count"], 2);
    }

    #[tokio::test]
    async fn does_not_reach_other_rooms() {
        let (registry, broadcaster) = setup();
        let (_a, mut rx_a) = join(&registry, "r1", 8);
        let (_b, mut rx_b) = join(&registry, "r2", 8);

        let _ = broadcaster.broadcast("r1", &Envelope::system("r1")).await;
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_member_is_evicted_and_others_still_receive() {
        let (registry, broadcaster) = setup();
        let (_a, mut rx_a) = join(&registry, "r1", 8);
        let (b, rx_b) = join(&registry, "r1", 8);
        let (_c, mut rx_c) = join(&registry, "r1", 8);
        drop(rx_b);

        let (logs, _guard) = capture_logs();
        let report = broadcaster
            .broadcast("r1", &Envelope::chat_message("Bob", "hi", "r1", 1))
            .await;

        assert_eq!(
            report,
            BroadcastReport {
                recipients: 3,
                delivered: 2,
                evicted: 1,
            }
        );
        assert_eq!(recv_json(&mut rx_a)["message"], "hi");
        assert_eq!(recv_json(&mut rx_c)["message"], "hi");

        let remaining: Vec<_> = registry
            .members_snapshot("r1")
            .iter()
            .map(|m| m.id().clone())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(!remaining.contains(b.id()));
        assert_closed(&b).await;

        let warnings = logs.matching("evicting");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].level, Level::WARN);
        assert_eq!(warnings[0].field("conn_id"), Some(b.id().as_str()));
        assert_eq!(warnings[0].field("error_kind"), Some("closed"));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_member_times_out_and_is_closed() {
        let (registry, broadcaster) = setup();
        let (fast, mut rx_fast) = join(&registry, "r1", 8);
        // Capacity 1 and never drained: the second frame blocks.
        let (slow, _rx_slow) = join(&registry, "r1", 1);

        let first = broadcaster.broadcast("r1", &Envelope::system("r1")).await;
        assert_eq!(first.evicted, 0);

        let second = broadcaster.broadcast("r1", &Envelope::system("r1")).await;
        assert_eq!(
            second,
            BroadcastReport {
                recipients: 2,
                delivered: 1,
                evicted: 1,
            }
        );
        assert_eq!(registry.member_count("r1"), 1);
        assert!(
            registry
                .members_snapshot("r1")
                .iter()
                .all(|m| m.id() != slow.id())
        );
        assert_closed(&slow).await;
        assert!(rx_fast.try_recv().is_ok());
        assert!(rx_fast.try_recv().is_ok());

        // The healthy member stays open.
        let still_open = tokio::time::timeout(Duration::from_millis(50), fast.closed()).await;
        assert!(still_open.is_err());
    }

    #[tokio::test]
    async fn evicting_last_member_deletes_room() {
        let (registry, broadcaster) = setup();
        let (_a, rx_a) = join(&registry, "solo", 8);
        drop(rx_a);

        let report = broadcaster
            .broadcast("solo", &Envelope::system("solo"))
            .await;
        assert_eq!(report.evicted, 1);
        assert!(!registry.room_exists("solo"));
    }

    #[tokio::test]
    async fn broadcast_to_absent_room_is_empty() {
        let (registry, broadcaster) = setup();
        let report = broadcaster
            .broadcast("ghost", &Envelope::user_left("ghost", 0))
            .await;
        assert_eq!(report, BroadcastReport::default());
        assert!(!registry.room_exists("ghost"));
    }

    #[tokio::test]
    async fn send_to_reaches_only_target() {
        let (registry, broadcaster) = setup();
        let (a, mut rx_a) = join(&registry, "r1", 8);
        let (_b, mut rx_b) = join(&registry, "r1", 8);

        broadcaster
            .send_to(a.as_ref(), &Envelope::system("r1"))
            .await
            .unwrap();
        assert_eq!(recv_json(&mut rx_a)["type"], "system");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_closed_handle_does_not_evict() {
        let (registry, broadcaster) = setup();
        let (a, rx_a) = join(&registry, "r1", 8);
        drop(rx_a);

        let err = broadcaster
            .send_to(a.as_ref(), &Envelope::system("r1"))
            .await
            .unwrap_err();
        assert_eq!(err, TransportError::Closed);
        assert_eq!(registry.member_count("r1"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_joins_then_broadcast_reaches_all() {
        const N: usize = 64;
        let (registry, broadcaster) = setup();

        let joins = (0..N).map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move {
                let (conn, rx) = ClientConnection::channel(4);
                let _ = registry.join("crowd", conn.clone());
                (conn, rx)
            })
        });
        let mut joined = Vec::new();
        for handle in join_all(joins).await {
            joined.push(handle.unwrap());
        }
        assert_eq!(registry.member_count("crowd"), N);

        let report = broadcaster
            .broadcast("crowd", &Envelope::system("crowd"))
            .await;
        assert_eq!(report.delivered, N);
        for (_, rx) in &mut joined {
            assert!(rx.try_recv().is_ok());
        }
    }
}
