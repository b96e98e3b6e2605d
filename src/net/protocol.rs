//! Wire protocol
//!
//! Every message is one JSON object per line. Recognized shapes:
//! - handshake: `{"message": "Welcome", "id": "001", "is_host": true}`
//! - snapshot: `{"players": {"001": {"pos": [x, y], "status": "walk", "char_type": "adventurer"}}}`
//! - event: `{"event": "spawn_enemy", "sender": "001", "uid": ..., "type": ..., "pos": ..., "diff": ...}`
//! - own state (client → server): `{"pos": [x, y], "status": "idle", "char_type": "female"}`

use std::collections::BTreeMap;

use glam::Vec2;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque peer id assigned by the coordinator
pub type PeerId = String;

pub const WELCOME: &str = "Welcome";

/// Errors encoding or decoding a wire line
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("encode error: {0}")]
    Encode(serde_json::Error),

    #[error("decode error: {0}")]
    Decode(serde_json::Error),

    #[error("empty line")]
    Empty,
}

/// A peer's last reported transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerState {
    /// Hitbox center in world units
    pub pos: Vec2,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default = "default_char_type")]
    pub char_type: String,
}

fn default_status() -> String {
    "idle".to_string()
}

fn default_char_type() -> String {
    "adventurer".to_string()
}

/// Discrete gameplay events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum NetEvent {
    Attack {
        weapon: String,
        angles: Vec<f32>,
    },
    SpawnEnemy {
        uid: String,
        #[serde(rename = "type")]
        kind: String,
        /// Visual top-left in world units
        pos: Vec2,
        diff: f32,
    },
    KillEnemy {
        uid: String,
    },
    HostMigration {
        new_host: PeerId,
    },
}

impl NetEvent {
    pub fn name(&self) -> &'static str {
        match self {
            NetEvent::Attack { .. } => "attack",
            NetEvent::SpawnEnemy { .. } => "spawn_enemy",
            NetEvent::KillEnemy { .. } => "kill_enemy",
            NetEvent::HostMigration { .. } => "host_migration",
        }
    }
}

/// An event plus the peer that raised it
///
/// Server-originated events (host migration) carry no sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<PeerId>,
    #[serde(flatten)]
    pub event: NetEvent,
}

impl EventEnvelope {
    pub fn from_peer(sender: impl Into<PeerId>, event: NetEvent) -> Self {
        Self {
            sender: Some(sender.into()),
            event,
        }
    }

    pub fn from_server(event: NetEvent) -> Self {
        Self {
            sender: None,
            event,
        }
    }
}

/// One-time handshake sent on connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Welcome {
    pub message: String,
    pub id: PeerId,
    pub is_host: bool,
}

impl Welcome {
    pub fn new(id: impl Into<PeerId>, is_host: bool) -> Self {
        Self {
            message: WELCOME.to_string(),
            id: id.into(),
            is_host,
        }
    }
}

/// Periodic state broadcast
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub players: BTreeMap<PeerId, PeerState>,
}

/// Server → client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Welcome(Welcome),
    Snapshot(Snapshot),
    Event(EventEnvelope),
}

/// Client → server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    Event(EventEnvelope),
    State(PeerState),
}

/// Serialize a message as one newline-terminated line
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(message).map_err(ProtocolError::Encode)?;
    line.push('\n');
    Ok(line)
}

/// Parse one line (surrounding whitespace ignored)
pub fn decode_line<T: DeserializeOwned>(line: &str) -> Result<T, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProtocolError::Empty);
    }
    serde_json::from_str(line).map_err(ProtocolError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_welcome_shape() {
        let line = encode_line(&ServerMessage::Welcome(Welcome::new("001", true))).unwrap();
        assert!(line.ends_with('\n'));
        let value: Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value, json!({"message": "Welcome", "id": "001", "is_host": true}));
    }

    #[test]
    fn test_event_is_flat() {
        let env = EventEnvelope::from_peer(
            "002",
            NetEvent::SpawnEnemy {
                uid: "002-7".to_string(),
                kind: "orc_captain".to_string(),
                pos: Vec2::new(10.0, -20.0),
                diff: 1.5,
            },
        );
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(
            value,
            json!({
                "event": "spawn_enemy",
                "sender": "002",
                "uid": "002-7",
                "type": "orc_captain",
                "pos": [10.0, -20.0],
                "diff": 1.5
            })
        );
    }

    #[test]
    fn test_server_messages_are_told_apart() {
        let snapshot = r#"{"players": {"001": {"pos": [1, 2], "status": "walk", "char_type": "female"}}}"#;
        match decode_line::<ServerMessage>(snapshot).unwrap() {
            ServerMessage::Snapshot(s) => {
                assert_eq!(s.players["001"].pos, Vec2::new(1.0, 2.0));
                assert_eq!(s.players["001"].char_type, "female");
            }
            other => panic!("expected snapshot, got {:?}", other),
        }

        let migration = r#"{"event": "host_migration", "new_host": "002"}"#;
        match decode_line::<ServerMessage>(migration).unwrap() {
            ServerMessage::Event(env) => {
                assert_eq!(env.sender, None);
                assert_eq!(
                    env.event,
                    NetEvent::HostMigration {
                        new_host: "002".to_string()
                    }
                );
            }
            other => panic!("expected event, got {:?}", other),
        }

        let welcome = r#"{"message": "Welcome", "id": "003", "is_host": false}"#;
        assert!(matches!(
            decode_line::<ServerMessage>(welcome).unwrap(),
            ServerMessage::Welcome(w) if w.id == "003" && !w.is_host
        ));
    }

    #[test]
    fn test_client_state_versus_event() {
        let state = r#"{"pos": [5, 6]}"#;
        match decode_line::<ClientMessage>(state).unwrap() {
            ClientMessage::State(s) => {
                assert_eq!(s.status, "idle");
                assert_eq!(s.char_type, "adventurer");
            }
            other => panic!("expected state, got {:?}", other),
        }

        let kill = r#"{"event": "kill_enemy", "sender": "001", "uid": "001-3"}"#;
        assert!(matches!(
            decode_line::<ClientMessage>(kill).unwrap(),
            ClientMessage::Event(env) if env.event.name() == "kill_enemy"
        ));
    }

    #[test]
    fn test_bad_lines() {
        assert!(matches!(decode_line::<ServerMessage>("  \n"), Err(ProtocolError::Empty)));
        assert!(matches!(
            decode_line::<ServerMessage>("{not json"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(decode_line::<ClientMessage>(r#"{"event": "teleport"}"#).is_err());
    }
}
