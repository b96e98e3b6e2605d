//! Bridge between simulation mutations and wire events
//!
//! Enemy operations are keyed on globally unique uids, so inbound events
//! apply idempotently in any order: a repeated spawn is ignored and a kill
//! of a dead or unknown enemy does nothing.

use std::collections::BTreeMap;

use glam::Vec2;

use super::client::Inbox;
use super::protocol::{EventEnvelope, NetEvent, PeerId, PeerState};
use crate::sim::{CharacterKind, CosmeticEffect, EnemyKind, GameState, ReplicatedAction, Status};

/// Wire form of a local mutation
pub fn action_to_event(action: ReplicatedAction) -> NetEvent {
    match action {
        ReplicatedAction::Attack { weapon, angles } => NetEvent::Attack { weapon, angles },
        ReplicatedAction::SpawnEnemy {
            uid,
            kind,
            pos,
            difficulty,
        } => NetEvent::SpawnEnemy {
            uid,
            kind: kind.id().to_string(),
            pos,
            diff: difficulty,
        },
        ReplicatedAction::KillEnemy { uid } => NetEvent::KillEnemy { uid },
    }
}

/// This peer's transform record
pub fn own_state(state: &GameState) -> PeerState {
    PeerState {
        pos: state.player.center(),
        status: state.player.status.as_str().to_string(),
        char_type: state.player.character.id().to_string(),
    }
}

/// Create, update and drop remote proxies to match a snapshot
pub fn apply_snapshot(state: &mut GameState, players: &BTreeMap<PeerId, PeerState>) {
    for (peer, ps) in players {
        state.upsert_remote(
            peer,
            ps.pos,
            Status::from_wire(&ps.status),
            CharacterKind::from_id(&ps.char_type),
        );
    }
    state.retain_remotes(|peer| players.contains_key(peer));
}

/// Apply one remote event; returns true if local state changed
pub fn apply_event(state: &mut GameState, env: &EventEnvelope) -> bool {
    let sender = env.sender.as_deref().unwrap_or("server");
    match &env.event {
        NetEvent::Attack { weapon, angles } => {
            let Some(origin) = effect_origin(state, sender) else {
                log::trace!("Attack from unknown peer {}", sender);
                return false;
            };
            state.effects.push(CosmeticEffect {
                peer: sender.to_string(),
                weapon: weapon.clone(),
                angles: angles.clone(),
                origin,
            });
            true
        }
        NetEvent::SpawnEnemy {
            uid,
            kind,
            pos,
            diff,
        } => {
            if !pos.is_finite() || !diff.is_finite() {
                log::debug!("Ignoring spawn of {} with non-finite data", uid);
                return false;
            }
            state.spawn_enemy(uid, EnemyKind::from_id(kind), *pos, *diff)
        }
        NetEvent::KillEnemy { uid } => state.kill_enemy(uid),
        // The link tracks host status itself
        NetEvent::HostMigration { .. } => false,
    }
}

/// Apply everything received since the last frame
pub fn apply_inbox(state: &mut GameState, inbox: &Inbox) {
    if let Some(players) = &inbox.snapshot {
        apply_snapshot(state, players);
    }
    for env in &inbox.events {
        apply_event(state, env);
    }
}

/// Where a remote attack should be drawn from, if the peer is known
pub fn effect_origin(state: &GameState, peer: &str) -> Option<Vec2> {
    state.remote_players.get(peer).map(|r| r.pos)
}
