//! Core Configuration
//!
//! Every tunable the simulation reads, bundled into one [`CoreConfig`]
//! passed in at construction. All sections implement `Default` with the
//! shipping values and deserialize with `#[serde(default)]`, so a JSON
//! file only needs to list the fields it overrides.

use std::collections::BTreeMap;
use std::path::Path;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::game::state::CharacterKind;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// JSON was malformed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value was out of range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

/// Inclusive `[min, max]` range of seconds or units.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Span {
    /// Lower bound
    pub min: f32,
    /// Upper bound
    pub max: f32,
}

impl Span {
    /// Create a span.
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    fn check(&self, field: &str) -> Result<(), ConfigError> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min < 0.0 || self.min > self.max {
            return Err(invalid(field, "expected 0 <= min <= max"));
        }
        Ok(())
    }
}

// =============================================================================
// ENTITY / PHYSICS
// =============================================================================

/// Shared body and physics parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityConfig {
    /// Health on spawn
    pub default_health: f32,
    /// Health ceiling
    pub max_health: f32,
    /// Capsule radius used for footprints and hit tests
    pub player_size: f32,
    /// Capsule height
    pub player_height: f32,
    /// Downward acceleration (units/s²)
    pub gravity: f32,
    /// Maximum sink speed right after releasing fly
    pub fly_terminal_velocity: f32,
    /// Default bounce restitution for knocked-back bodies
    pub bounce_restitution: f32,
    /// Below this landing speed a knocked-back body stops bouncing
    pub min_bounce_velocity: f32,
    /// Horizontal knockback decay per 1/60 s, in the air and on the ground.
    /// Pushes that carry their own decay (melee) override it per victim.
    pub knockback_decay: f32,
    /// Horizontal knockback speed under which the flag clears
    pub knockback_stop_threshold: f32,
    /// Length of the death fade before respawn / despawn (seconds)
    pub death_fade_duration: f32,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            default_health: 100.0,
            max_health: 100.0,
            player_size: 0.5,
            player_height: 2.0,
            gravity: 20.0,
            fly_terminal_velocity: 4.0,
            bounce_restitution: 0.85,
            min_bounce_velocity: 2.0,
            knockback_decay: 0.85,
            knockback_stop_threshold: 0.1,
            death_fade_duration: 1.2,
        }
    }
}

impl EntityConfig {
    /// Half of the capsule height.
    #[inline]
    pub fn half_height(&self) -> f32 {
        self.player_height * 0.5
    }
}

// =============================================================================
// PER-CHARACTER ABILITIES
// =============================================================================

/// Locomotion stats.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    /// Walk speed (units/s)
    pub move_speed: f32,
    /// Multiplier applied while running
    pub run_speed_multiplier: f32,
    /// Vertical velocity of a grounded jump
    pub jump_velocity: f32,
    /// Vertical velocity of the airborne second jump
    pub double_jump_velocity: f32,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            move_speed: 6.0,
            run_speed_multiplier: 1.6,
            jump_velocity: 8.0,
            double_jump_velocity: 7.0,
        }
    }
}

/// Straight-line projectile.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BoltConfig {
    /// Travel speed (units/s)
    pub speed: f32,
    /// Damage per hit
    pub damage: f32,
    /// Seconds between shots
    pub cooldown: f32,
    /// Seconds before the bolt fizzles
    pub lifetime: f32,
    /// Bolt sphere radius
    pub radius: f32,
    /// Shots per magazine
    pub magazine_size: u32,
    /// Seconds to refill an empty magazine
    pub reload_time: f32,
    /// Maximum homing correction (radians/s) when a target is set
    pub homing_turn_rate: f32,
    /// Distance of the aim point in controller mode
    pub nominal_distance: f32,
}

impl Default for BoltConfig {
    fn default() -> Self {
        Self {
            speed: 20.0,
            damage: 25.0,
            cooldown: 0.4,
            lifetime: 2.0,
            radius: 0.2,
            magazine_size: 8,
            reload_time: 1.5,
            homing_turn_rate: 1.5,
            nominal_distance: 12.0,
        }
    }
}

/// Damage-over-time plus slow applied through the poison ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoisonConfig {
    /// Damage per poison tick
    pub damage: f32,
    /// Seconds between ticks
    pub tick_interval: f32,
    /// Total duration (seconds)
    pub duration: f32,
    /// Movement speed multiplier while poisoned
    pub speed_multiplier: f32,
}

impl Default for PoisonConfig {
    fn default() -> Self {
        Self {
            damage: 2.0,
            tick_interval: 1.0,
            duration: 3.0,
            speed_multiplier: 0.6,
        }
    }
}

/// Ballistic projectile that leaves a splash area.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MortarConfig {
    /// Gravity used for the arc (units/s²)
    pub gravity: f32,
    /// Furthest landing distance
    pub max_range: f32,
    /// Closest landing distance
    pub min_range: f32,
    /// Apex height above the higher of launch point and target
    pub arc_height: f32,
    /// Splash radius
    pub splash_radius: f32,
    /// Splash lifetime (seconds)
    pub splash_duration: f32,
    /// Damage applied per splash tick
    pub damage_per_tick: f32,
    /// Seconds between splash ticks for one victim
    pub tick_interval: f32,
    /// Seconds between launches
    pub cooldown: f32,
    /// Poison enrolled when a victim touches the splash
    pub poison: Option<PoisonConfig>,
    /// Shell sphere radius for direct hits
    pub radius: f32,
}

impl Default for MortarConfig {
    fn default() -> Self {
        Self {
            gravity: 20.0,
            max_range: 14.0,
            min_range: 1.5,
            arc_height: 4.0,
            splash_radius: 2.0,
            splash_duration: 3.0,
            damage_per_tick: 5.0,
            tick_interval: 0.5,
            cooldown: 3.0,
            poison: Some(PoisonConfig::default()),
            radius: 0.3,
        }
    }
}

/// Circular sword swing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeleeConfig {
    /// Swing radius
    pub range: f32,
    /// Damage on activation
    pub initial_damage: f32,
    /// Damage per tick during the animation window
    pub damage: f32,
    /// Seconds between in-window ticks
    pub tick_interval: f32,
    /// Animation window (seconds)
    pub animation_duration: f32,
    /// Seconds between swings
    pub cooldown: f32,
    /// Poison damage enrolled at animation end (0 disables poison)
    pub poison_damage: f32,
    /// Poison tick interval
    pub poison_tick_interval: f32,
    /// Poison duration (0 disables poison)
    pub poison_duration: f32,
    /// Speed multiplier while poisoned
    pub slow_speed_multiplier: f32,
    /// Outward knockback at the centre
    pub horizontal_velocity: f32,
    /// Upward knockback
    pub vertical_velocity: f32,
    /// Knockback decay per 1/60 s applied to bodies this swing pushes
    pub velocity_decay: f32,
    /// Ring projectiles for the multi-shot special
    pub projectile_count: Option<u32>,
    /// Ring projectile speed override
    pub projectile_speed: Option<f32>,
    /// Ring projectile damage override
    pub projectile_damage: Option<f32>,
}

impl Default for MeleeConfig {
    fn default() -> Self {
        Self {
            range: 2.5,
            initial_damage: 10.0,
            damage: 3.0,
            tick_interval: 0.25,
            animation_duration: 0.5,
            cooldown: 1.5,
            poison_damage: 2.0,
            poison_tick_interval: 1.0,
            poison_duration: 3.0,
            slow_speed_multiplier: 0.6,
            horizontal_velocity: 5.0,
            vertical_velocity: 3.0,
            velocity_decay: 0.85,
            projectile_count: Some(8),
            projectile_speed: Some(14.0),
            projectile_damage: Some(10.0),
        }
    }
}

impl MeleeConfig {
    /// Poison enrolled at the end of the swing, if any.
    pub fn poison(&self) -> Option<PoisonConfig> {
        if self.poison_duration <= 0.0 || self.poison_damage <= 0.0 {
            return None;
        }
        Some(PoisonConfig {
            damage: self.poison_damage,
            tick_interval: self.poison_tick_interval,
            duration: self.poison_duration,
            speed_multiplier: self.slow_speed_multiplier,
        })
    }
}

/// Radial knockback impulse (Herald special).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BlastConfig {
    /// Effect radius
    pub radius: f32,
    /// Outward speed at the centre
    pub horizontal_velocity: f32,
    /// Upward speed
    pub vertical_velocity: f32,
    /// Restitution of the first ground bounce
    pub bounce_restitution: f32,
    /// Bounces stop below this landing speed
    pub min_bounce_velocity: f32,
    /// Seconds between blasts
    pub cooldown: f32,
    /// Ring visual duration
    pub animation_duration: f32,
}

impl Default for BlastConfig {
    fn default() -> Self {
        Self {
            radius: 3.0,
            horizontal_velocity: 8.0,
            vertical_velocity: 6.0,
            bounce_restitution: 0.85,
            min_bounce_velocity: 2.0,
            cooldown: 5.0,
            animation_duration: 0.4,
        }
    }
}

/// The character's special ability.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialAbility {
    /// Ring of bolts around the caster (uses the melee projectile fields).
    MultiShot {
        /// Seconds between rings
        cooldown: f32,
    },
    /// Radial knockback.
    Blast(BlastConfig),
}

impl SpecialAbility {
    /// Cooldown applied after use.
    pub fn cooldown(&self) -> f32 {
        match self {
            SpecialAbility::MultiShot { cooldown } => *cooldown,
            SpecialAbility::Blast(blast) => blast.cooldown,
        }
    }
}

/// Hold-to-heal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct HealConfig {
    /// Health per second at the start of a hold
    pub base_rate: f32,
    /// Ceiling on the ramp multiplier
    pub max_multiplier: f32,
    /// Hold time per ramp step (seconds)
    pub ramp_step: f32,
    /// Multiplier added per completed step
    pub ramp_bonus: f32,
    /// Releases shorter than this count as a reload tap in combat modes
    pub tap_reload_threshold: f32,
    /// Seconds before a new hold can start after release
    pub cooldown: f32,
}

impl Default for HealConfig {
    fn default() -> Self {
        Self {
            base_rate: 8.0,
            max_multiplier: 3.0,
            ramp_step: 0.5,
            ramp_bonus: 0.5,
            tap_reload_threshold: 0.3,
            cooldown: 0.5,
        }
    }
}

/// Knockback pulses emitted while sprinting (Herald).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SprintKnockbackConfig {
    /// Pulse radius
    pub radius: f32,
    /// Targets closer than this are pushed along the sprint direction
    pub min_radius: f32,
    /// Horizontal pulse speed
    pub horizontal_velocity: f32,
    /// Vertical pulse speed
    pub vertical_velocity: f32,
    /// Seconds before the same target can be pulsed again
    pub per_target_cooldown: f32,
}

impl Default for SprintKnockbackConfig {
    fn default() -> Self {
        Self {
            radius: 1.6,
            min_radius: 0.2,
            horizontal_velocity: 6.0,
            vertical_velocity: 3.0,
            per_target_cooldown: 0.3,
        }
    }
}

/// Temporary movement boost.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedBoostConfig {
    /// Speed multiplier while active
    pub multiplier: f32,
    /// Active duration (seconds)
    pub duration: f32,
    /// Seconds between boosts
    pub cooldown: f32,
}

impl Default for SpeedBoostConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.5,
            duration: 2.0,
            cooldown: 6.0,
        }
    }
}

/// Everything that differs between characters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CharacterProfile {
    /// Locomotion
    #[serde(default)]
    pub movement: MovementConfig,
    /// Primary fire
    #[serde(default)]
    pub bolt: BoltConfig,
    /// Secondary fire
    #[serde(default)]
    pub mortar: MortarConfig,
    /// Sword swing
    #[serde(default)]
    pub melee: MeleeConfig,
    /// Special ability
    pub special: SpecialAbility,
    /// Hold-to-heal
    #[serde(default)]
    pub heal: HealConfig,
    /// Sprint pulses (None = sprint does not push)
    #[serde(default)]
    pub sprint: Option<SprintKnockbackConfig>,
    /// Speed boost
    #[serde(default)]
    pub speed_boost: SpeedBoostConfig,
}

impl CharacterProfile {
    /// Lucy: poison sword, poison mortar, ring of bolts.
    pub fn lucy() -> Self {
        Self {
            movement: MovementConfig::default(),
            bolt: BoltConfig::default(),
            mortar: MortarConfig::default(),
            melee: MeleeConfig::default(),
            special: SpecialAbility::MultiShot { cooldown: 6.0 },
            heal: HealConfig::default(),
            sprint: None,
            speed_boost: SpeedBoostConfig::default(),
        }
    }

    /// Herald: heavy sword, high-damage mortar, blast, sprint pulses.
    pub fn herald() -> Self {
        Self {
            movement: MovementConfig {
                move_speed: 5.5,
                run_speed_multiplier: 1.8,
                jump_velocity: 7.5,
                double_jump_velocity: 6.5,
            },
            bolt: BoltConfig {
                speed: 18.0,
                damage: 20.0,
                cooldown: 0.5,
                magazine_size: 6,
                ..BoltConfig::default()
            },
            mortar: MortarConfig {
                damage_per_tick: 10.0,
                cooldown: 3.5,
                poison: None,
                ..MortarConfig::default()
            },
            melee: MeleeConfig {
                range: 2.2,
                initial_damage: 18.0,
                damage: 4.0,
                poison_damage: 0.0,
                poison_duration: 0.0,
                horizontal_velocity: 6.0,
                vertical_velocity: 3.5,
                cooldown: 1.8,
                projectile_count: None,
                projectile_speed: None,
                projectile_damage: None,
                ..MeleeConfig::default()
            },
            special: SpecialAbility::Blast(BlastConfig::default()),
            heal: HealConfig {
                base_rate: 6.0,
                ..HealConfig::default()
            },
            sprint: Some(SprintKnockbackConfig::default()),
            speed_boost: SpeedBoostConfig::default(),
        }
    }
}

// =============================================================================
// BOTS
// =============================================================================

/// Bot tactical parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Seconds between tactical behaviour rotations
    pub change_direction_interval: Span,
    /// Seconds between ability beats
    pub shoot_interval: Span,
    /// Random +/- fraction applied to each beat
    pub shoot_cooldown_variance: f32,
    /// Maximum bolt range
    pub shoot_range: f32,
    /// Distance at which walls and other bots are steered around
    pub avoidance_distance: f32,
    /// Preferred distance to the player
    pub follow_distance: f32,
    /// Mortar is considered from this distance
    pub mortar_medium_range: f32,
    /// Beyond this the long-range mortar weighting applies
    pub mortar_long_range: f32,
    /// Mortar probability in the medium band
    pub mortar_medium_chance: f32,
    /// Mortar probability in the long band
    pub mortar_long_chance: f32,
    /// Seconds between shots inside a burst
    pub burst_shot_spacing: f32,
    /// Health fraction that triggers retreat
    pub retreat_health: f32,
    /// Health fraction that ends retreat
    pub recover_health: f32,
    /// Per-beat chance of the Herald blast when in radius
    pub blast_chance: f32,
    /// Per-beat chance of the Lucy ring when in radius
    pub multi_shot_chance: f32,
    /// Radius within which the Lucy ring is considered
    pub multi_shot_radius: f32,
    /// Bot movement speed multiplier relative to the character
    pub speed_multiplier: f32,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            change_direction_interval: Span::new(2.0, 4.0),
            shoot_interval: Span::new(1.0, 2.0),
            shoot_cooldown_variance: 0.3,
            shoot_range: 14.0,
            avoidance_distance: 1.5,
            follow_distance: 7.0,
            mortar_medium_range: 6.0,
            mortar_long_range: 10.0,
            mortar_medium_chance: 0.3,
            mortar_long_chance: 0.6,
            burst_shot_spacing: 0.15,
            retreat_health: 0.3,
            recover_health: 0.7,
            blast_chance: 0.4,
            multi_shot_chance: 0.35,
            multi_shot_radius: 5.0,
            speed_multiplier: 0.8,
        }
    }
}

/// Named difficulty presets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Difficulty {
    /// Forgiving bots
    Easy,
    /// Default
    #[default]
    Normal,
    /// Accurate, aggressive bots
    Hard,
}

/// Difficulty-scaled bot parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyConfig {
    /// Blend weight of the learning collaborator
    pub learning_rate: f32,
    /// How fast learned patterns move toward new observations
    pub adaptation_speed: f32,
    /// 1.0 = perfect aim
    pub ai_accuracy: f32,
    /// Delay before reacting to a state change (seconds)
    pub ai_reaction_time: f32,
    /// > 0.5 enables lead prediction
    pub movement_intelligence: f32,
    /// Decay of learned patterns per second (1.0 = never forget)
    pub pattern_retention: f32,
    /// Scales ability beat spacing
    pub shoot_interval_multiplier: f32,
    /// Scales preferred distance
    pub follow_distance_multiplier: f32,
    /// Pause after a burst (seconds)
    pub burst_pause: Span,
    /// Per-rotation chance of idling
    pub idle_chance: f32,
    /// Idle length (seconds)
    pub idle_duration: Span,
    /// Per-rotation chance of a movement pause
    pub movement_pause_chance: f32,
    /// Movement pause length (seconds)
    pub movement_pause: Span,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Difficulty::Normal.preset()
    }
}

impl Difficulty {
    /// Parameters for this preset.
    pub fn preset(self) -> DifficultyConfig {
        match self {
            Difficulty::Easy => DifficultyConfig {
                learning_rate: 0.1,
                adaptation_speed: 0.2,
                ai_accuracy: 0.5,
                ai_reaction_time: 0.6,
                movement_intelligence: 0.3,
                pattern_retention: 0.8,
                shoot_interval_multiplier: 1.5,
                follow_distance_multiplier: 1.2,
                burst_pause: Span::new(2.5, 4.5),
                idle_chance: 0.15,
                idle_duration: Span::new(1.0, 2.5),
                movement_pause_chance: 0.2,
                movement_pause: Span::new(0.5, 1.5),
            },
            Difficulty::Normal => DifficultyConfig {
                learning_rate: 0.3,
                adaptation_speed: 0.4,
                ai_accuracy: 0.75,
                ai_reaction_time: 0.35,
                movement_intelligence: 0.6,
                pattern_retention: 0.9,
                shoot_interval_multiplier: 1.0,
                follow_distance_multiplier: 1.0,
                burst_pause: Span::new(1.5, 3.0),
                idle_chance: 0.08,
                idle_duration: Span::new(0.8, 1.8),
                movement_pause_chance: 0.12,
                movement_pause: Span::new(0.4, 1.0),
            },
            Difficulty::Hard => DifficultyConfig {
                learning_rate: 0.6,
                adaptation_speed: 0.7,
                ai_accuracy: 0.92,
                ai_reaction_time: 0.15,
                movement_intelligence: 0.9,
                pattern_retention: 0.97,
                shoot_interval_multiplier: 0.7,
                follow_distance_multiplier: 0.9,
                burst_pause: Span::new(0.8, 1.6),
                idle_chance: 0.02,
                idle_duration: Span::new(0.4, 0.8),
                movement_pause_chance: 0.05,
                movement_pause: Span::new(0.2, 0.5),
            },
        }
    }
}

// =============================================================================
// RESPAWN / REPLICATION / INPUT
// =============================================================================

/// Arena extent and respawn rules.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RespawnConfig {
    /// Entities below this height have fallen out
    pub fall_threshold: f32,
    /// Half extent of the square arena floor
    pub arena_half_size: f32,
    /// Fixed respawn point (None = random inside the arena)
    pub respawn_point: Option<Vec3>,
    /// Keep random respawns this far from the edge
    pub edge_margin: f32,
    /// Push credit window for fallout kills (seconds)
    pub push_credit_window: f32,
    /// Push records older than this are purged (seconds)
    pub push_max_age: f32,
}

impl Default for RespawnConfig {
    fn default() -> Self {
        Self {
            fall_threshold: -10.0,
            arena_half_size: 20.0,
            respawn_point: None,
            edge_margin: 2.0,
            push_credit_window: 5.0,
            push_max_age: 10.0,
        }
    }
}

/// Replication pacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Send `playerState` every N simulated frames
    pub state_interval_frames: u32,
    /// Seconds between owner `projectileUpdate` messages per projectile
    pub projectile_update_interval: f32,
    /// Inbound messages applied per tick before deferring the rest
    pub max_inbound_per_tick: usize,
    /// Remembered damage idempotency keys
    pub damage_key_memory: usize,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            state_interval_frames: 3,
            projectile_update_interval: 0.1,
            max_inbound_per_tick: 256,
            damage_key_memory: 512,
        }
    }
}

/// Logical keyboard actions.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Move along camera forward
    MoveForward,
    /// Move along camera back
    MoveBack,
    /// Strafe left
    MoveLeft,
    /// Strafe right
    MoveRight,
    /// Run / sprint
    Run,
    /// Jump (tap) and fly (hold)
    Jump,
    /// Heal (hold) / reload (tap)
    Heal,
    /// Sword swing
    Sword,
    /// Character special
    Special,
    /// Speed boost
    SpeedBoost,
    /// Character swap
    Swap,
    /// Scoreboard overlay
    Scoreboard,
    /// Mortar arc preview
    Preview,
}

/// Map from action to the physical key codes that trigger it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyBindings(pub BTreeMap<Action, Vec<String>>);

impl Default for KeyBindings {
    fn default() -> Self {
        let pairs: [(Action, &[&str]); 13] = [
            (Action::MoveForward, &["KeyW", "ArrowUp"]),
            (Action::MoveBack, &["KeyS", "ArrowDown"]),
            (Action::MoveLeft, &["KeyA", "ArrowLeft"]),
            (Action::MoveRight, &["KeyD", "ArrowRight"]),
            (Action::Run, &["ShiftLeft", "ShiftRight"]),
            (Action::Jump, &["Space"]),
            (Action::Heal, &["KeyR"]),
            (Action::Sword, &["KeyE"]),
            (Action::Special, &["KeyQ"]),
            (Action::SpeedBoost, &["KeyF"]),
            (Action::Swap, &["KeyC"]),
            (Action::Scoreboard, &["Tab"]),
            (Action::Preview, &["KeyV"]),
        ];
        Self(
            pairs
                .iter()
                .map(|(action, keys)| (*action, keys.iter().map(|k| k.to_string()).collect()))
                .collect(),
        )
    }
}

impl KeyBindings {
    /// Key codes bound to an action.
    pub fn keys(&self, action: Action) -> &[String] {
        self.0.get(&action).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Input routing parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Radial dead-zone for both sticks
    pub dead_zone: f32,
    /// Two jump presses within this window make a double jump (seconds)
    pub double_jump_window: f32,
    /// Shoot stays suppressed this long after a mortar release or cancel
    pub mortar_release_cooldown: f32,
    /// Holding B at least this long fires the special instead of the sword
    pub special_hold_threshold: f32,
    /// Stick magnitude that counts as controller activity for mode switching
    pub controller_activity_threshold: f32,
    /// Keyboard bindings
    pub bindings: KeyBindings,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dead_zone: 0.2,
            double_jump_window: 0.5,
            mortar_release_cooldown: 0.3,
            special_hold_threshold: 0.35,
            controller_activity_threshold: 0.5,
            bindings: KeyBindings::default(),
        }
    }
}

// =============================================================================
// ENVIRONMENT
// =============================================================================

/// Per-session identity handed to the core at construction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Our peer id on the replication channel
    pub peer_id: String,
    /// Seed for bot decisions, spreads and respawn points
    pub seed: u64,
    /// True when this peer hosts the room
    pub is_host: bool,
}

impl Environment {
    /// Environment for a peer.
    pub fn new(peer_id: impl Into<String>, seed: u64) -> Self {
        Self {
            peer_id: peer_id.into(),
            seed,
            is_host: false,
        }
    }

    /// Mark as host.
    pub fn as_host(mut self) -> Self {
        self.is_host = true;
        self
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new("offline", 0x5EED)
    }
}

// =============================================================================
// CORE CONFIG
// =============================================================================

/// All configuration consumed by the simulation core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Bodies and physics
    pub entity: EntityConfig,
    /// Lucy's profile
    pub lucy: CharacterProfile,
    /// Herald's profile
    pub herald: CharacterProfile,
    /// Bot tactics
    pub bot: BotConfig,
    /// Selected difficulty preset
    pub difficulty: Difficulty,
    /// Explicit difficulty parameters overriding the preset
    pub difficulty_overrides: Option<DifficultyConfig>,
    /// Arena and respawn
    pub respawn: RespawnConfig,
    /// Replication pacing
    pub replication: ReplicationConfig,
    /// Input routing
    pub input: InputConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            entity: EntityConfig::default(),
            lucy: CharacterProfile::lucy(),
            herald: CharacterProfile::herald(),
            bot: BotConfig::default(),
            difficulty: Difficulty::Normal,
            difficulty_overrides: None,
            respawn: RespawnConfig::default(),
            replication: ReplicationConfig::default(),
            input: InputConfig::default(),
        }
    }
}

impl CoreConfig {
    /// Profile for a character.
    #[inline]
    pub fn profile(&self, kind: CharacterKind) -> &CharacterProfile {
        match kind {
            CharacterKind::Lucy => &self.lucy,
            CharacterKind::Herald => &self.herald,
        }
    }

    /// Effective difficulty parameters.
    pub fn difficulty_config(&self) -> DifficultyConfig {
        self.difficulty_overrides
            .clone()
            .unwrap_or_else(|| self.difficulty.preset())
    }

    /// Parse from a JSON string and validate.
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let config: CoreConfig = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file and validate.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Serialize to pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let e = &self.entity;
        if e.max_health <= 0.0 {
            return Err(invalid("entity.max_health", "must be positive"));
        }
        if e.default_health <= 0.0 || e.default_health > e.max_health {
            return Err(invalid("entity.default_health", "must be in (0, max_health]"));
        }
        if e.player_size <= 0.0 || e.player_height <= 0.0 {
            return Err(invalid("entity.player_size", "body dimensions must be positive"));
        }
        if e.gravity <= 0.0 {
            return Err(invalid("entity.gravity", "must be positive"));
        }
        for (field, v) in [
            ("entity.bounce_restitution", e.bounce_restitution),
            ("entity.knockback_decay", e.knockback_decay),
        ] {
            if !(0.0..1.0).contains(&v) {
                return Err(invalid(field, "must be in [0, 1)"));
            }
        }

        for (name, profile) in [("lucy", &self.lucy), ("herald", &self.herald)] {
            validate_profile(name, profile)?;
        }

        self.bot.change_direction_interval.check("bot.change_direction_interval")?;
        self.bot.shoot_interval.check("bot.shoot_interval")?;
        let d = self.difficulty_config();
        if !(0.0..=1.0).contains(&d.ai_accuracy) {
            return Err(invalid("difficulty.ai_accuracy", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&d.learning_rate) {
            return Err(invalid("difficulty.learning_rate", "must be in [0, 1]"));
        }
        d.burst_pause.check("difficulty.burst_pause")?;
        d.idle_duration.check("difficulty.idle_duration")?;
        d.movement_pause.check("difficulty.movement_pause")?;

        if self.respawn.arena_half_size <= 0.0 {
            return Err(invalid("respawn.arena_half_size", "must be positive"));
        }
        if self.respawn.push_credit_window > self.respawn.push_max_age {
            return Err(invalid("respawn.push_credit_window", "must not exceed push_max_age"));
        }
        if self.replication.state_interval_frames == 0 {
            return Err(invalid("replication.state_interval_frames", "must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.input.dead_zone) {
            return Err(invalid("input.dead_zone", "must be in [0, 1)"));
        }
        Ok(())
    }
}

fn validate_profile(name: &str, p: &CharacterProfile) -> Result<(), ConfigError> {
    let field = |f: &str| format!("{name}.{f}");
    if p.movement.move_speed <= 0.0 {
        return Err(invalid(&field("movement.move_speed"), "must be positive"));
    }
    if p.bolt.speed <= 0.0 || p.bolt.lifetime <= 0.0 {
        return Err(invalid(&field("bolt"), "speed and lifetime must be positive"));
    }
    if p.bolt.magazine_size == 0 {
        return Err(invalid(&field("bolt.magazine_size"), "must be at least 1"));
    }
    if p.mortar.tick_interval <= 0.0 || p.mortar.gravity <= 0.0 {
        return Err(invalid(&field("mortar"), "gravity and tick_interval must be positive"));
    }
    if p.mortar.min_range > p.mortar.max_range {
        return Err(invalid(&field("mortar.min_range"), "must not exceed max_range"));
    }
    if p.melee.tick_interval <= 0.0 || p.melee.range <= 0.0 {
        return Err(invalid(&field("melee"), "range and tick_interval must be positive"));
    }
    if !(0.0..1.0).contains(&p.melee.velocity_decay) {
        return Err(invalid(&field("melee.velocity_decay"), "must be in [0, 1)"));
    }
    if let Some(poison) = &p.mortar.poison {
        if poison.tick_interval <= 0.0 {
            return Err(invalid(&field("mortar.poison.tick_interval"), "must be positive"));
        }
    }
    if p.heal.ramp_step <= 0.0 || p.heal.max_multiplier < 1.0 {
        return Err(invalid(&field("heal"), "ramp_step > 0 and max_multiplier >= 1 required"));
    }
    if let SpecialAbility::Blast(blast) = &p.special {
        if blast.radius <= 0.0 {
            return Err(invalid(&field("special.blast.radius"), "must be positive"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        CoreConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "entity": { "max_health": 150.0 }, "difficulty": "hard" }"#;
        let config = CoreConfig::from_json_str(json).unwrap();
        assert_eq!(config.entity.max_health, 150.0);
        assert_eq!(config.entity.default_health, 100.0);
        assert_eq!(config.difficulty, Difficulty::Hard);
        assert_eq!(config.difficulty_config().ai_accuracy, Difficulty::Hard.preset().ai_accuracy);
    }

    #[test]
    fn test_json_roundtrip_keeps_bindings() {
        let config = CoreConfig::default();
        let json = config.to_json_pretty().unwrap();
        let parsed = CoreConfig::from_json_str(&json).unwrap();
        assert_eq!(parsed.input.bindings.keys(Action::Jump), &["Space".to_string()]);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = CoreConfig::default();
        config.entity.default_health = 500.0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid { .. })));

        let mut config = CoreConfig::default();
        config.input.dead_zone = 1.0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.herald.mortar.min_range = 50.0;
        assert!(config.validate().is_err());

        let mut config = CoreConfig::default();
        config.lucy.melee.velocity_decay = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_knockback_decays_alike_in_air_and_on_ground() {
        let config = CoreConfig::default();
        assert_eq!(config.entity.knockback_decay, 0.85);
        assert_eq!(config.lucy.melee.velocity_decay, 0.85);
        assert_eq!(config.lucy.melee, config.lucy.melee.clone());
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        assert!(matches!(CoreConfig::from_json_str("{ nope"), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_character_profiles_differ() {
        let config = CoreConfig::default();
        assert!(config.lucy.mortar.poison.is_some());
        assert!(config.herald.mortar.poison.is_none());
        assert!(config.lucy.melee.poison().is_some());
        assert!(config.herald.melee.poison().is_none());
        assert!(matches!(config.herald.special, SpecialAbility::Blast(_)));
        assert!(config.herald.sprint.is_some());
    }
}
