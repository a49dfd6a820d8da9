//! Game Events
//!
//! Events generated during a tick. They are drained after the tick and
//! dispatched to the optional bridges (sound, particles, vibration,
//! renderer) and scanned by replication for outbound messages.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::state::{CharacterKind, EntityId};

/// Priority for event processing order.
///
/// Lower value = processed first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EventPriority {
    /// Deaths and kill credit
    Death = 0,
    /// Health changes
    Damage = 1,
    /// Ability activations and projectiles
    Ability = 2,
    /// Movement (jump/land/bounce)
    Movement = 3,
    /// Session notices (controller, appearance, mode)
    Notice = 4,
    /// Lowest priority
    Other = 255,
}

/// What dealt a point of damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DamageSource {
    /// Straight-line projectile
    Bolt,
    /// Mortar splash area
    Splash,
    /// Sword swing
    Melee,
    /// Poison ledger tick
    Poison,
    /// Fell out of the arena
    Fallout,
    /// Explore-mode hazard
    Hazard,
    /// Damage request received from a peer
    Remote,
}

/// Ability identifiers used in events and cooldown reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbilityKind {
    /// Bolt shot
    Bolt,
    /// Mortar launch
    Mortar,
    /// Sword swing
    Melee,
    /// Herald blast
    Blast,
    /// Lucy ring of bolts
    MultiShot,
    /// Heal hold
    Heal,
    /// Manual or automatic reload
    Reload,
    /// Speed boost
    SpeedBoost,
    /// Character swap
    Swap,
    /// Herald sprint pulse
    SprintPulse,
}

/// Named vibration patterns for the vibration bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VibrationPattern {
    /// Local player took damage
    Hurt,
    /// Nearby mortar explosion
    Explosion,
    /// Local player died
    Death,
    /// Local player landed a melee hit
    MeleeHit,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameEventData {
    /// Health was reduced on a locally owned entity
    Damaged {
        victim: EntityId,
        attacker: Option<EntityId>,
        amount: f32,
        health: f32,
        max_health: f32,
        source: DamageSource,
        position: Vec3,
    },

    /// Damage aimed at a remote player; its owner applies it
    RemoteDamageRequested {
        target: EntityId,
        attacker: EntityId,
        amount: f32,
        source: DamageSource,
    },

    /// An entity's health crossed to zero
    Died {
        victim: EntityId,
        killer: Option<EntityId>,
        source: DamageSource,
        position: Vec3,
    },

    /// A kill was credited on the score table
    KillCredited { killer: EntityId, victim: EntityId },

    /// An entity dropped below the fall threshold
    FellOut {
        victim: EntityId,
        pusher: Option<EntityId>,
    },

    /// Entity came back after its death fade
    Respawned { id: EntityId, position: Vec3 },

    /// Bot despawned after its death fade
    Despawned { id: EntityId },

    /// Jump or double jump
    Jumped { id: EntityId, double: bool },

    /// Airborne entity touched ground
    Landed { id: EntityId, impact_speed: f32 },

    /// Knocked-back entity bounced on landing
    Bounced { id: EntityId, speed: f32 },

    /// Ability activated
    AbilityUsed {
        id: EntityId,
        ability: AbilityKind,
        character: CharacterKind,
        position: Vec3,
        radius: f32,
        duration: f32,
    },

    /// Projectile created locally (owner side)
    ProjectileSpawned {
        network_id: String,
        owner: EntityId,
        character: CharacterKind,
        mortar: bool,
        origin: Vec3,
        velocity: Vec3,
        target: Option<Vec3>,
        damage: f32,
    },

    /// Bolt or mortar shell struck an entity
    ProjectileHit {
        network_id: String,
        target: EntityId,
    },

    /// Mortar shell burst into a splash area
    MortarExploded {
        network_id: String,
        owner: EntityId,
        character: CharacterKind,
        position: Vec3,
        radius: f32,
    },

    /// Poison enrolled or refreshed
    Poisoned {
        victim: EntityId,
        source: Option<EntityId>,
        duration: f32,
        speed_multiplier: f32,
    },

    /// Poison expired and slow was cleared
    PoisonCleared { victim: EntityId },

    /// Health restored by the heal hold
    Healed {
        id: EntityId,
        amount: f32,
        health: f32,
        position: Vec3,
    },

    /// Magazine refilled
    Reloaded { id: EntityId },

    /// Character swapped
    CharacterSwapped {
        id: EntityId,
        from: CharacterKind,
        to: CharacterKind,
        position: Vec3,
    },

    /// Remote player spawned (join or first state)
    RemoteJoined { id: EntityId },

    /// Remote player left
    RemoteLeft { id: EntityId },

    /// Remote health overwritten by its owner
    RemoteHealthSynced {
        id: EntityId,
        health: f32,
        max_health: f32,
    },

    /// Renderer should (re)load the appearance of a remote
    AppearanceRequested {
        id: EntityId,
        character: CharacterKind,
    },

    /// Explore-mode collectible picked up
    Collected {
        id: EntityId,
        collectible: u32,
        value: u32,
    },

    /// Explore-mode checkpoint reached
    CheckpointReached {
        id: EntityId,
        index: u32,
        position: Vec3,
    },

    /// Gamepad failed; input fell back to keyboard
    ControllerDisconnected { reason: String },

    /// Camera shake request
    ScreenShake { offset: Vec3 },

    /// Vibration request (already distance-scaled)
    Vibration {
        pattern: VibrationPattern,
        intensity: f32,
    },
}

impl GameEventData {
    /// Default processing priority for this kind of event.
    pub fn priority(&self) -> EventPriority {
        use GameEventData::*;
        match self {
            Died { .. } | KillCredited { .. } | FellOut { .. } => EventPriority::Death,
            Damaged { .. }
            | RemoteDamageRequested { .. }
            | RemoteHealthSynced { .. }
            | Poisoned { .. }
            | PoisonCleared { .. }
            | Healed { .. } => EventPriority::Damage,
            AbilityUsed { .. }
            | ProjectileSpawned { .. }
            | ProjectileHit { .. }
            | MortarExploded { .. }
            | Reloaded { .. }
            | CharacterSwapped { .. } => EventPriority::Ability,
            Jumped { .. } | Landed { .. } | Bounced { .. } | Respawned { .. } | Despawned { .. } => {
                EventPriority::Movement
            }
            RemoteJoined { .. }
            | RemoteLeft { .. }
            | AppearanceRequested { .. }
            | ControllerDisconnected { .. }
            | Collected { .. }
            | CheckpointReached { .. } => EventPriority::Notice,
            ScreenShake { .. } | Vibration { .. } => EventPriority::Other,
        }
    }
}

/// A game event with timing and priority.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameEvent {
    /// Tick when event occurred
    pub tick: u64,

    /// Processing priority
    pub priority: EventPriority,

    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(tick: u64, data: GameEventData) -> Self {
        Self {
            tick,
            priority: data.priority(),
            data,
        }
    }
}

impl PartialEq for GameEvent {
    fn eq(&self, other: &Self) -> bool {
        self.tick == other.tick && self.priority == other.priority
    }
}

impl Eq for GameEvent {}

impl PartialOrd for GameEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GameEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Sort by: tick, then priority
        self.tick.cmp(&other.tick).then(self.priority.cmp(&other.priority))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_ordering() {
        let death = GameEvent::new(
            10,
            GameEventData::Died {
                victim: EntityId::bot(1),
                killer: Some(EntityId::local()),
                source: DamageSource::Bolt,
                position: Vec3::ZERO,
            },
        );
        let jump = GameEvent::new(
            10,
            GameEventData::Jumped {
                id: EntityId::local(),
                double: false,
            },
        );
        let earlier = GameEvent::new(9, GameEventData::Reloaded { id: EntityId::local() });

        // Same tick, death before movement
        assert!(death < jump);
        // Earlier tick first regardless of priority
        assert!(earlier < death);
    }

    #[test]
    fn test_event_json_tagging() {
        let event = GameEventData::KillCredited {
            killer: EntityId::local(),
            victim: EntityId::bot(2),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("kill_credited"));
        let back: GameEventData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
