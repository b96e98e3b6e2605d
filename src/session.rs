//! Per-frame driver
//!
//! Glues the replication link to the simulation: clamp dt, sync authority
//! from the link, apply everything received since the last frame, tick, then
//! flush this peer's transform and queued events. Without a link (or after it
//! drops) the session keeps simulating as a single player.

use crate::clamp_dt;
use crate::net::NetClient;
use crate::net::replication::{action_to_event, apply_inbox, own_state};
use crate::sim::world::{ChunkCoord, FloorTile};
use crate::sim::{CosmeticEffect, GameState, RenderItem, SimConfig, TickInput, tick};

/// Everything a renderer needs for one frame
#[derive(Debug)]
pub struct RenderView<'a> {
    /// Obstacles, enemies, remote players, then the local player
    pub items: Vec<RenderItem>,
    /// Floor descriptors of every loaded chunk, for baking
    pub floors: Vec<(ChunkCoord, &'a [FloorTile])>,
    /// Remote attacks to draw since the last view
    pub effects: Vec<CosmeticEffect>,
    pub hit_stop: bool,
    pub connected: bool,
}

pub struct Session {
    pub state: GameState,
    link: Option<NetClient>,
    online: bool,
}

impl Session {
    /// Single-player session
    pub fn offline(config: SimConfig) -> Self {
        Self {
            state: GameState::new(config),
            link: None,
            online: false,
        }
    }

    /// Session replicated through `link`
    pub fn networked(config: SimConfig, link: NetClient) -> Self {
        let mut session = Self {
            state: GameState::new(config),
            online: link.is_connected(),
            link: Some(link),
        };
        session.sync_authority();
        session
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(NetClient::is_connected)
    }

    /// Advance one frame
    pub fn frame(&mut self, raw_dt: f32, input: &TickInput) {
        let dt = clamp_dt(raw_dt);
        self.sync_authority();

        if let Some(link) = &self.link {
            let inbox = link.drain();
            apply_inbox(&mut self.state, &inbox);
            // No snapshots arrive after a drop, so proxies would freeze in place
            if !self.online {
                self.state.retain_remotes(|_| false);
            }
        }

        tick(&mut self.state, input, dt);

        self.flush();
    }

    /// Snapshot of the current frame for drawing
    pub fn render_view(&mut self) -> RenderView<'_> {
        let effects = self.state.drain_effects();
        let connected = self.is_connected();
        let state = &self.state;
        RenderView {
            items: state.render_items(),
            floors: state
                .world
                .active_chunks()
                .map(|c| (c.coord, c.floor.as_slice()))
                .collect(),
            effects,
            hit_stop: state.hit_stop.is_active(state.clock_ms),
            connected,
        }
    }

    /// Host flag and peer id follow the link; a lost link makes us our own host
    /// and sheds every remote proxy
    fn sync_authority(&mut self) {
        let Some(link) = &self.link else {
            return;
        };
        let authority = &mut self.state.authority;
        authority.peer_id = Some(link.id().to_string());

        let connected = link.is_connected();
        if self.online && !connected {
            log::warn!("Link lost, continuing single-player");
        }
        self.online = connected;

        let is_host = !connected || link.is_host();
        if is_host != authority.is_host {
            log::info!("Authority changed: host = {}", is_host);
            authority.is_host = is_host;
        }
    }

    fn flush(&mut self) {
        let actions = self.state.drain_outbox();
        let Some(link) = self.link.as_ref().filter(|l| l.is_connected()) else {
            return;
        };
        link.send_state(own_state(&self.state));
        for action in actions {
            link.send_event(action_to_event(action));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::Server;
    use crate::net::protocol::{PeerState, ServerMessage, Snapshot, Welcome, encode_line};
    use crate::sim::ReplicatedAction;
    use glam::Vec2;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio::time::sleep;

    fn config(seed: u64) -> SimConfig {
        SimConfig {
            seed,
            load_radius: 0,
            ..SimConfig::default()
        }
    }

    #[test]
    fn test_offline_session_hosts_itself() {
        let mut session = Session::offline(config(7));
        for _ in 0..200 {
            session.frame(1.0 / 60.0, &TickInput::default());
        }
        assert!(session.state.authority.is_host);
        assert!(!session.is_connected());
        assert!(!session.state.enemies.is_empty());
        // Outbound actions are discarded without a link
        assert!(session.state.outbox.is_empty());
    }

    #[test]
    fn test_frame_clamps_dt() {
        let mut session = Session::offline(config(1));
        session.frame(5.0, &TickInput::default());
        assert!((session.state.clock_ms - 1000.0 / 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_render_view_lists_floors_and_player() {
        let mut session = Session::offline(config(3));
        session.frame(1.0 / 60.0, &TickInput::default());
        let view = session.render_view();
        assert_eq!(view.floors.len(), 1);
        assert_eq!(view.floors[0].1.len(), 256);
        assert!(view.items.iter().any(|i| matches!(i.kind, crate::sim::RenderKind::Player { .. })));
        assert!(!view.connected);
    }

    #[tokio::test]
    async fn test_host_spawns_reach_guest() {
        let server = Server::bind("127.0.0.1:0", 30).await.unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(server.run());

        let mut host = Session::networked(config(5), NetClient::connect(&addr).await.unwrap());
        let mut guest = Session::networked(config(5), NetClient::connect(&addr).await.unwrap());
        assert!(host.state.authority.is_host);
        assert!(!guest.state.authority.is_host);

        let input = TickInput::default();
        for _ in 0..400 {
            host.frame(1.0 / 60.0, &input);
            guest.frame(1.0 / 60.0, &input);
            if !guest.state.enemies.is_empty() && guest.state.remote_players.contains_key("001") {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }

        assert!(!guest.state.enemies.is_empty());
        assert!(guest.state.remote_players.contains_key("001"));
        for enemy in &guest.state.enemies {
            assert!(enemy.uid.starts_with("001-"));
            assert!(host.state.enemy(&enemy.uid).is_some());
        }
        // The guest never mints enemies of its own
        assert!(
            !guest
                .state
                .drain_outbox()
                .iter()
                .any(|a| matches!(a, ReplicatedAction::SpawnEnemy { .. }))
        );
    }

    #[tokio::test]
    async fn test_lost_link_drops_remote_players() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (close_tx, close_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut players = BTreeMap::new();
            players.insert(
                "001".to_string(),
                PeerState {
                    pos: Vec2::new(0.0, 2000.0),
                    status: "idle".to_string(),
                    char_type: "adventurer".to_string(),
                },
            );
            for msg in [
                ServerMessage::Welcome(Welcome::new("002", false)),
                ServerMessage::Snapshot(Snapshot { players }),
            ] {
                stream.write_all(encode_line(&msg).unwrap().as_bytes()).await.unwrap();
            }
            let _ = close_rx.await;
        });

        let mut session = Session::networked(config(9), NetClient::connect(&addr).await.unwrap());
        let input = TickInput::default();
        for _ in 0..200 {
            session.frame(1.0 / 60.0, &input);
            if session.state.remote_players.contains_key("001") {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        assert!(session.state.remote_players.contains_key("001"));

        close_tx.send(()).unwrap();
        for _ in 0..200 {
            session.frame(1.0 / 60.0, &input);
            if !session.is_connected() {
                break;
            }
            sleep(Duration::from_millis(5)).await;
        }
        session.frame(1.0 / 60.0, &input);

        assert!(!session.is_connected());
        assert!(session.state.authority.is_host);
        assert!(session.state.remote_players.is_empty());
    }
}
