//! Connection hub.
//!
//! One spawned task owns the [`Registry`] of live connections and applies
//! [`HubEvent`]s strictly in arrival order. Everything else talks to it through the
//! cloneable [`Hub`] handle, so the indices themselves never need a lock.
//!
//! Delivery is best effort: each connection has a bounded queue and a frame that
//! does not fit is dropped for that connection only.
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cardroom_engine::game::Game;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::protocol::{Envelope, MessageType};

pub type ConnectionId = u64;

/// Serialized envelope, shared between every recipient of a broadcast.
pub type Frame = Arc<str>;

pub const DEFAULT_SEND_QUEUE: usize = 256;

#[derive(Debug)]
pub enum HubEvent {
    Register {
        id: ConnectionId,
        table_id: String,
        player_id: String,
        sender: mpsc::Sender<Frame>,
    },
    Unregister {
        id: ConnectionId,
    },
    BroadcastToTable {
        table_id: String,
        frame: Frame,
    },
    BroadcastGameUpdate {
        game: Arc<Game>,
    },
    SendToPlayer {
        player_id: String,
        frame: Frame,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub connections: usize,
    pub tables: usize,
    pub players: usize,
}

#[derive(Debug)]
struct Connection {
    table_id: String,
    player_id: String,
    sender: mpsc::Sender<Frame>,
}

#[derive(Debug, Default)]
struct Registry {
    connections: HashMap<ConnectionId, Connection>,
    by_table: HashMap<String, HashSet<ConnectionId>>,
    by_player: HashMap<String, ConnectionId>,
}

impl Registry {
    fn apply(&mut self, event: HubEvent) {
        match event {
            HubEvent::Register {
                id,
                table_id,
                player_id,
                sender,
            } => self.register(id, table_id, player_id, sender),
            HubEvent::Unregister { id } => self.unregister(id),
            HubEvent::BroadcastToTable { table_id, frame } => {
                self.broadcast_to_table(&table_id, &frame)
            }
            HubEvent::BroadcastGameUpdate { game } => self.broadcast_game_update(&game),
            HubEvent::SendToPlayer { player_id, frame } => self.send_to_player(&player_id, &frame),
            HubEvent::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
        }
    }

    fn register(
        &mut self,
        id: ConnectionId,
        table_id: String,
        player_id: String,
        sender: mpsc::Sender<Frame>,
    ) {
        self.by_table.entry(table_id.clone()).or_default().insert(id);
        if !player_id.is_empty() {
            if let Some(previous) = self.by_player.insert(player_id.clone(), id) {
                tracing::debug!(
                    player_id = %player_id,
                    previous,
                    connection_id = id,
                    "player reconnected, newer connection takes over direct messages"
                );
            }
        }
        tracing::info!(
            connection_id = id,
            table_id = %table_id,
            player_id = %player_id,
            "connection registered"
        );
        self.connections.insert(
            id,
            Connection {
                table_id,
                player_id,
                sender,
            },
        );
    }

    /// Dropping the connection drops its only sender, which closes the queue.
    fn unregister(&mut self, id: ConnectionId) {
        let Some(conn) = self.connections.remove(&id) else {
            return;
        };
        if let Some(members) = self.by_table.get_mut(&conn.table_id) {
            members.remove(&id);
            if members.is_empty() {
                self.by_table.remove(&conn.table_id);
            }
        }
        if self.by_player.get(&conn.player_id) == Some(&id) {
            self.by_player.remove(&conn.player_id);
        }
        tracing::info!(
            connection_id = id,
            table_id = %conn.table_id,
            player_id = %conn.player_id,
            "connection unregistered"
        );
    }

    fn table_members(&self, table_id: &str) -> impl Iterator<Item = (ConnectionId, &Connection)> {
        self.by_table
            .get(table_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.connections.get(id).map(|conn| (*id, conn)))
    }

    fn broadcast_to_table(&self, table_id: &str, frame: &Frame) {
        let mut recipients = 0usize;
        for (id, conn) in self.table_members(table_id) {
            deliver(id, conn, Arc::clone(frame));
            recipients += 1;
        }
        tracing::trace!(table_id = %table_id, recipients, "table broadcast");
    }

    fn broadcast_game_update(&self, game: &Game) {
        for (id, conn) in self.table_members(game.table_id()) {
            let viewer = (!conn.player_id.is_empty()).then_some(conn.player_id.as_str());
            let envelope = Envelope::new(MessageType::GameUpdate)
                .game(game.id())
                .table(game.table_id())
                .with_data(&game.view_for(viewer));
            if let Some(frame) = encode(&envelope) {
                deliver(id, conn, frame);
            }
        }
    }

    fn send_to_player(&self, player_id: &str, frame: &Frame) {
        let target = self
            .by_player
            .get(player_id)
            .and_then(|id| self.connections.get(id).map(|conn| (*id, conn)));
        match target {
            Some((id, conn)) => deliver(id, conn, Arc::clone(frame)),
            None => tracing::debug!(player_id = %player_id, "no connection for player"),
        }
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.connections.len(),
            tables: self.by_table.len(),
            players: self.by_player.len(),
        }
    }
}

fn deliver(id: ConnectionId, conn: &Connection, frame: Frame) {
    match conn.sender.try_send(frame) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => tracing::debug!(
            connection_id = id,
            player_id = %conn.player_id,
            "send queue full, dropping frame"
        ),
        Err(TrySendError::Closed(_)) => tracing::warn!(
            connection_id = id,
            player_id = %conn.player_id,
            "send queue closed, dropping frame"
        ),
    }
}

fn encode(envelope: &Envelope) -> Option<Frame> {
    match serde_json::to_string(envelope) {
        Ok(json) => Some(Arc::from(json)),
        Err(err) => {
            tracing::warn!(error = %err, kind = ?envelope.kind, "failed to encode envelope");
            None
        }
    }
}

/// Handle to the hub task. Cloning is cheap; the task stops once every handle is gone.
#[derive(Debug, Clone)]
pub struct Hub {
    events: mpsc::UnboundedSender<HubEvent>,
    next_id: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl Hub {
    /// Spawns the hub task on the current tokio runtime.
    pub fn spawn(queue_capacity: usize) -> (Self, JoinHandle<()>) {
        let (events, mut inbox) = mpsc::unbounded_channel::<HubEvent>();
        let task = tokio::spawn(async move {
            let mut registry = Registry::default();
            while let Some(event) = inbox.recv().await {
                registry.apply(event);
            }
            tracing::debug!(
                connections = registry.connections.len(),
                "hub stopped"
            );
        });
        let hub = Self {
            events,
            next_id: Arc::new(AtomicU64::new(1)),
            queue_capacity: queue_capacity.max(1),
        };
        (hub, task)
    }

    fn send(&self, event: HubEvent) {
        if self.events.send(event).is_err() {
            tracing::warn!("hub task is gone, event discarded");
        }
    }

    /// Creates the connection's queue with the welcome message already on it.
    pub fn register(
        &self,
        table_id: impl Into<String>,
        player_id: impl Into<String>,
    ) -> (ConnectionId, mpsc::Receiver<Frame>) {
        let table_id = table_id.into();
        let player_id = player_id.into();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(self.queue_capacity);

        if let Some(frame) = encode(&Envelope::welcome(&player_id, &table_id)) {
            let _ = sender.try_send(frame);
        }
        self.send(HubEvent::Register {
            id,
            table_id,
            player_id,
            sender,
        });
        (id, receiver)
    }

    pub fn unregister(&self, id: ConnectionId) {
        self.send(HubEvent::Unregister { id });
    }

    /// Serializes once and fans the same frame out to the whole table.
    pub fn broadcast_to_table(&self, table_id: &str, envelope: &Envelope) {
        if let Some(frame) = encode(envelope) {
            self.send(HubEvent::BroadcastToTable {
                table_id: table_id.to_string(),
                frame,
            });
        }
    }

    /// Each connection on the game's table receives its own view of `game`.
    pub fn broadcast_game_update(&self, game: &Game) {
        self.send(HubEvent::BroadcastGameUpdate {
            game: Arc::new(game.clone()),
        });
    }

    pub fn send_to_player(&self, player_id: &str, envelope: &Envelope) {
        if let Some(frame) = encode(envelope) {
            self.send(HubEvent::SendToPlayer {
                player_id: player_id.to_string(),
                frame,
            });
        }
    }

    /// Counts as of every event sent before this call. `None` if the hub has stopped.
    pub async fn stats(&self) -> Option<HubStats> {
        let (reply, rx) = oneshot::channel();
        self.events.send(HubEvent::Stats { reply }).ok()?;
        rx.await.ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn parse(frame: &Frame) -> Value {
        serde_json::from_str(frame).expect("frame is json")
    }

    async fn expect_welcome(rx: &mut mpsc::Receiver<Frame>) {
        let frame = rx.recv().await.expect("welcome");
        assert_eq!(parse(&frame)["type"], "welcome");
    }

    fn betting_game(table: &str) -> Game {
        let mut game = Game::new(table, 10, 500);
        game.add_player("p1", "One", 1_000).unwrap();
        game.add_player("p2", "Two", 1_000).unwrap();
        game.open_betting().unwrap();
        game.place_bet("p1", 100).unwrap();
        game.place_bet("p2", 20).unwrap();
        game
    }

    #[tokio::test]
    async fn register_queues_welcome_and_counts() {
        let (hub, _task) = Hub::spawn(8);
        let (_id, mut rx) = hub.register("t1", "p1");

        let welcome = parse(&rx.recv().await.unwrap());
        assert_eq!(welcome["data"]["playerId"], "p1");
        assert_eq!(welcome["data"]["tableId"], "t1");

        let stats = hub.stats().await.unwrap();
        assert_eq!(
            stats,
            HubStats {
                connections: 1,
                tables: 1,
                players: 1
            }
        );
    }

    #[tokio::test]
    async fn table_broadcast_reaches_each_member_once() {
        let (hub, _task) = Hub::spawn(8);
        let mut members: Vec<_> = (0..3)
            .map(|i| hub.register("t1", format!("p{i}")).1)
            .collect();
        let (_other, mut outsider) = hub.register("t2", "x");

        let env = Envelope::new(MessageType::PlayerJoined).table("t1").player("p9");
        hub.broadcast_to_table("t1", &env);
        hub.stats().await.unwrap();

        for rx in &mut members {
            expect_welcome(rx).await;
            let frame = rx.try_recv().expect("broadcast delivered");
            assert_eq!(parse(&frame)["type"], "playerJoined");
            assert!(rx.try_recv().is_err(), "exactly one message");
        }
        expect_welcome(&mut outsider).await;
        assert!(outsider.try_recv().is_err());
    }

    #[tokio::test]
    async fn game_update_is_customized_per_player() {
        let (hub, _task) = Hub::spawn(8);
        let (_a, mut rx1) = hub.register("t1", "p1");
        let (_b, mut rx2) = hub.register("t1", "p2");
        let (_c, mut spectator) = hub.register("t1", "");

        let game = betting_game("t1");
        hub.broadcast_game_update(&game);
        hub.stats().await.unwrap();

        for rx in [&mut rx1, &mut rx2, &mut spectator] {
            expect_welcome(rx).await;
        }
        let one = parse(&rx1.try_recv().unwrap());
        let two = parse(&rx2.try_recv().unwrap());
        let spec = parse(&spectator.try_recv().unwrap());

        assert_eq!(one["type"], "gameUpdate");
        assert_eq!(one["gameId"], game.id());
        assert_eq!(one["data"]["players"][0]["balance"], 900);
        assert!(one["data"]["players"][1].get("balance").is_none());
        assert_eq!(two["data"]["players"][1]["balance"], 980);
        assert!(two["data"]["players"][0].get("balance").is_none());
        assert!(spec["data"]["players"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p.get("balance").is_none()));
    }

    #[tokio::test]
    async fn unregister_removes_from_every_index_and_closes_queue() {
        let (hub, _task) = Hub::spawn(8);
        let (id, mut rx) = hub.register("t1", "p1");
        let (_keep, mut other) = hub.register("t1", "p2");

        hub.unregister(id);
        hub.broadcast_to_table("t1", &Envelope::new(MessageType::PlayerLeft));
        hub.send_to_player("p1", &Envelope::new(MessageType::GameCreated));
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.players, 1);

        expect_welcome(&mut rx).await;
        assert!(rx.recv().await.is_none(), "queue closed after unregister");

        expect_welcome(&mut other).await;
        assert_eq!(parse(&other.try_recv().unwrap())["type"], "playerLeft");
    }

    #[tokio::test]
    async fn empty_tables_are_pruned() {
        let (hub, _task) = Hub::spawn(8);
        let (a, _rx_a) = hub.register("t1", "p1");
        let (b, _rx_b) = hub.register("t2", "p2");
        hub.unregister(a);
        assert_eq!(hub.stats().await.unwrap().tables, 1);
        hub.unregister(b);
        assert_eq!(hub.stats().await.unwrap(), HubStats::default());
    }

    #[tokio::test]
    async fn stale_unregister_keeps_newer_player_connection() {
        let (hub, _task) = Hub::spawn(8);
        let (old, _old_rx) = hub.register("t1", "p1");
        let (_new, mut new_rx) = hub.register("t1", "p1");

        hub.unregister(old);
        hub.send_to_player("p1", &Envelope::new(MessageType::GameCreated).table("t1"));
        hub.stats().await.unwrap();

        expect_welcome(&mut new_rx).await;
        let frame = new_rx.try_recv().expect("direct message still routed");
        assert_eq!(parse(&frame)["type"], "gameCreated");
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (hub, _task) = Hub::spawn(1);
        let (_id, mut rx) = hub.register("t1", "p1");

        for _ in 0..5 {
            hub.broadcast_to_table("t1", &Envelope::new(MessageType::PlayerJoined));
        }
        let stats = hub.stats().await.unwrap();
        assert_eq!(stats.connections, 1, "slow reader stays registered");

        expect_welcome(&mut rx).await;
        assert!(rx.try_recv().is_err(), "broadcasts beyond capacity were dropped");
    }
}
