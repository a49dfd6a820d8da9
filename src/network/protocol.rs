//! Replication Messages
//!
//! Peer-to-peer wire format. Every message travels inside an [`Envelope`]
//! carrying the sender's peer id and a per-sender sequence number.
//! Frames are JSON for debugging ease, with bincode for compact transport.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::game::projectile::ProjectileKind;
use crate::game::state::{AnimKey, CharacterKind, Facing};

// =============================================================================
// PAYLOADS
// =============================================================================

/// Periodic pose of the sender's player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateMessage {
    /// Capsule center
    pub position: Vec3,
    /// Heading
    pub yaw: f32,
    /// Animation
    pub anim_key: AnimKey,
    /// Sprite facing
    pub facing: Facing,
    /// Standing on ground
    pub grounded: bool,
    /// Sprinting
    pub running: bool,
}

/// A projectile the sender just fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileCreateMessage {
    /// Sender-scoped projectile id
    pub network_id: String,
    /// Bolt or mortar
    pub kind: ProjectileKind,
    /// Spawn point
    pub origin: Vec3,
    /// Initial velocity
    pub velocity: Vec3,
    /// Homing point (bolt) or landing point (mortar)
    pub target: Option<Vec3>,
    /// Firing character
    pub character: CharacterKind,
    /// Nominal damage
    pub damage: f32,
}

/// Owner-authoritative projectile position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileUpdateMessage {
    /// Sender-scoped projectile id
    pub network_id: String,
    /// Position
    pub position: Vec3,
    /// Velocity
    pub velocity: Vec3,
}

/// Health report or damage request.
///
/// When `target` equals the sender this is the sender's authoritative
/// health. Otherwise it asks `target` to apply `damage` to itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerDamageMessage {
    /// Peer whose player is affected
    pub target: String,
    /// Damage dealt (0 for a resync)
    pub damage: f32,
    /// Health after the damage, as known by the sender
    pub health: f32,
    /// Health ceiling
    pub max_health: f32,
}

/// Everything exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMessage {
    /// Sender entered the room.
    Join {
        /// Starting character
        character: CharacterKind,
    },

    /// Sender's player pose.
    PlayerState(PlayerStateMessage),

    /// Sender fired a projectile.
    ProjectileCreate(ProjectileCreateMessage),

    /// Sender's projectile moved.
    ProjectileUpdate(ProjectileUpdateMessage),

    /// Health report or damage request.
    PlayerDamage(PlayerDamageMessage),

    /// Sender swapped character.
    CharacterChange {
        /// New character
        character: CharacterKind,
    },

    /// Sender left the room.
    Leave,
}

impl ReplicationMessage {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ReplicationMessage::Join { .. } => "join",
            ReplicationMessage::PlayerState(_) => "player_state",
            ReplicationMessage::ProjectileCreate(_) => "projectile_create",
            ReplicationMessage::ProjectileUpdate(_) => "projectile_update",
            ReplicationMessage::PlayerDamage(_) => "player_damage",
            ReplicationMessage::CharacterChange { .. } => "character_change",
            ReplicationMessage::Leave => "leave",
        }
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// A message with its origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender peer id
    pub sender: String,
    /// Per-sender sequence number, strictly increasing
    pub seq: u64,
    /// Payload
    pub message: ReplicationMessage,
}

impl Envelope {
    /// Wrap a message.
    pub fn new(sender: impl Into<String>, seq: u64, message: ReplicationMessage) -> Self {
        Self {
            sender: sender.into(),
            seq,
            message,
        }
    }

    /// Reject envelopes that cannot be attributed to another peer.
    pub fn validate(&self, own_peer_id: &str) -> Result<(), ProtocolError> {
        if self.sender.is_empty() {
            return Err(ProtocolError::MissingSender);
        }
        if self.sender == own_peer_id {
            return Err(ProtocolError::Loopback(self.sender.clone()));
        }
        Ok(())
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        Ok(bincode::deserialize(data)?)
    }
}

/// Raw or decoded frame handed to the replicator by the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Already decoded
    Envelope(Envelope),
    /// JSON text frame
    Json(String),
    /// bincode frame
    Binary(Vec<u8>),
}

impl InboundFrame {
    /// Decode to an envelope.
    pub fn decode(self) -> Result<Envelope, ProtocolError> {
        match self {
            InboundFrame::Envelope(env) => Ok(env),
            InboundFrame::Json(text) => Envelope::from_json(&text),
            InboundFrame::Binary(bytes) => Envelope::from_bytes(&bytes),
        }
    }
}

impl From<Envelope> for InboundFrame {
    fn from(env: Envelope) -> Self {
        InboundFrame::Envelope(env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn damage() -> Envelope {
        Envelope::new(
            "peer-a",
            7,
            ReplicationMessage::PlayerDamage(PlayerDamageMessage {
                target: "peer-a".into(),
                damage: 0.0,
                health: 100.0,
                max_health: 100.0,
            }),
        )
    }

    #[test]
    fn test_json_frame() {
        let json = damage().to_json().unwrap();
        assert!(json.contains("player_damage"));
        assert_eq!(Envelope::from_json(&json).unwrap(), damage());
    }

    #[test]
    fn test_binary_frame() {
        let env = Envelope::new(
            "peer-b",
            1,
            ReplicationMessage::ProjectileCreate(ProjectileCreateMessage {
                network_id: "local:3".into(),
                kind: ProjectileKind::Mortar,
                origin: Vec3::new(1.0, 1.0, 0.0),
                velocity: Vec3::new(2.0, 9.0, 0.0),
                target: Some(Vec3::new(8.0, 0.0, 0.0)),
                character: CharacterKind::Herald,
                damage: 8.0,
            }),
        );
        let bytes = env.to_bytes().unwrap();
        assert_eq!(Envelope::from_bytes(&bytes).unwrap(), env);
    }

    #[test]
    fn test_malformed_frames_error() {
        assert!(matches!(InboundFrame::Json("{nope".into()).decode(), Err(ProtocolError::Json(_))));
        assert!(matches!(InboundFrame::Binary(vec![1, 2]).decode(), Err(ProtocolError::Binary(_))));
    }

    #[test]
    fn test_validate_sender() {
        assert!(damage().validate("peer-b").is_ok());
        assert!(matches!(damage().validate("peer-a"), Err(ProtocolError::Loopback(_))));
        let mut anon = damage();
        anon.sender.clear();
        assert!(matches!(anon.validate("peer-b"), Err(ProtocolError::MissingSender)));
    }
}
