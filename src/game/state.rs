//! Game State Definitions
//!
//! Entity records and the world that owns them.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::config::{CharacterProfile, CoreConfig, EntityConfig};
use crate::core::math::direction_xz;
use crate::core::rng::DeterministicRng;
use crate::game::character;
use crate::game::events::{DamageSource, GameEvent, GameEventData};

// =============================================================================
// ENTITY ID
// =============================================================================

/// Stable entity identifier.
///
/// `local` for this peer's player, `bot_<n>` for bots, the peer id for
/// remote players. Implements Ord for deterministic BTreeMap ordering.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Id of the local player.
    pub const LOCAL: &'static str = "local";

    /// The local player.
    pub fn local() -> Self {
        Self(Self::LOCAL.to_string())
    }

    /// Bot number `n`.
    pub fn bot(n: u32) -> Self {
        Self(format!("bot_{n}"))
    }

    /// A remote player keyed by peer id.
    pub fn remote(peer_id: impl Into<String>) -> Self {
        Self(peer_id.into())
    }

    /// True for the local player.
    #[inline]
    pub fn is_local(&self) -> bool {
        self.0 == Self::LOCAL
    }

    /// True for bot ids.
    #[inline]
    pub fn is_bot(&self) -> bool {
        self.0.starts_with("bot_")
    }

    /// Raw string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for EntityId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// ROLES AND KINDS
// =============================================================================

/// Who drives an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityRole {
    /// This peer's player; driven by the input snapshot
    LocalPlayer,
    /// AI-driven, simulated on this peer
    Bot,
    /// Mirror of another peer's player; driven by replication
    RemotePlayer,
}

impl EntityRole {
    /// True when this peer simulates the entity's physics and health.
    #[inline]
    pub fn is_simulated(self) -> bool {
        !matches!(self, EntityRole::RemotePlayer)
    }
}

/// Playable characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum CharacterKind {
    /// Poison sword, poison mortar, ring of bolts
    #[default]
    Lucy,
    /// Heavy sword, heavy mortar, blast, sprint pulses
    Herald,
}

impl CharacterKind {
    /// The other character (swap target).
    pub fn other(self) -> Self {
        match self {
            CharacterKind::Lucy => CharacterKind::Herald,
            CharacterKind::Herald => CharacterKind::Lucy,
        }
    }

    /// Signature colour (linear RGB) for particles.
    pub fn color(self) -> [f32; 3] {
        match self {
            CharacterKind::Lucy => [0.62, 0.25, 0.92],
            CharacterKind::Herald => [0.95, 0.55, 0.15],
        }
    }
}

/// Last facing used by the sprite animation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum Facing {
    /// Toward the camera (+Z)
    #[default]
    Front,
    /// Away from the camera (-Z)
    Back,
    /// -X
    Left,
    /// +X
    Right,
}

impl Facing {
    /// Facing for a horizontal movement direction (dominant axis wins).
    ///
    /// Returns `None` for a zero vector so callers keep the last facing.
    pub fn from_direction(dir: Vec3) -> Option<Self> {
        if dir.x.abs() < 1e-4 && dir.z.abs() < 1e-4 {
            return None;
        }
        Some(if dir.z.abs() >= dir.x.abs() {
            if dir.z > 0.0 {
                Facing::Front
            } else {
                Facing::Back
            }
        } else if dir.x > 0.0 {
            Facing::Right
        } else {
            Facing::Left
        })
    }

    /// Unit world direction for this facing.
    pub fn to_direction(self) -> Vec3 {
        match self {
            Facing::Front => Vec3::Z,
            Facing::Back => Vec3::NEG_Z,
            Facing::Left => Vec3::NEG_X,
            Facing::Right => Vec3::X,
        }
    }
}

/// Animation key replicated with `playerState`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum AnimKey {
    /// Standing
    #[default]
    Idle,
    /// Walking
    Walk,
    /// Running
    Run,
    /// Rising
    Jump,
    /// Falling
    Fall,
    /// Levitating
    Fly,
    /// Dying / fading
    Death,
}

// =============================================================================
// COOLDOWNS AND AMMO
// =============================================================================

/// Named cooldown slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CooldownSlot {
    /// Bolt
    Bolt,
    /// Mortar
    Mortar,
    /// Sword
    Melee,
    /// Blast / ring
    Special,
    /// Heal hold
    Heal,
    /// Magazine reload
    Reload,
    /// Speed boost
    SpeedBoost,
}

/// Seconds remaining per ability. Only [`Cooldowns::tick`] lowers them.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cooldowns {
    /// Bolt
    pub bolt: f32,
    /// Mortar
    pub mortar: f32,
    /// Sword
    pub melee: f32,
    /// Special
    pub special: f32,
    /// Heal
    pub heal: f32,
    /// Reload
    pub reload: f32,
    /// Speed boost
    pub speed_boost: f32,
}

impl Cooldowns {
    /// Advance all timers toward zero.
    pub fn tick(&mut self, dt: f32) {
        for slot in self.slots_mut() {
            *slot = (*slot - dt).max(0.0);
        }
    }

    /// Remaining seconds in a slot.
    pub fn get(&self, slot: CooldownSlot) -> f32 {
        match slot {
            CooldownSlot::Bolt => self.bolt,
            CooldownSlot::Mortar => self.mortar,
            CooldownSlot::Melee => self.melee,
            CooldownSlot::Special => self.special,
            CooldownSlot::Heal => self.heal,
            CooldownSlot::Reload => self.reload,
            CooldownSlot::SpeedBoost => self.speed_boost,
        }
    }

    /// Set a slot (ability fired or explicit override).
    pub fn set(&mut self, slot: CooldownSlot, seconds: f32) {
        let value = seconds.max(0.0);
        match slot {
            CooldownSlot::Bolt => self.bolt = value,
            CooldownSlot::Mortar => self.mortar = value,
            CooldownSlot::Melee => self.melee = value,
            CooldownSlot::Special => self.special = value,
            CooldownSlot::Heal => self.heal = value,
            CooldownSlot::Reload => self.reload = value,
            CooldownSlot::SpeedBoost => self.speed_boost = value,
        }
    }

    /// True when the slot is ready.
    #[inline]
    pub fn ready(&self, slot: CooldownSlot) -> bool {
        self.get(slot) <= 0.0
    }

    /// Zero every slot (respawn, swap).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn slots_mut(&mut self) -> [&mut f32; 7] {
        [
            &mut self.bolt,
            &mut self.mortar,
            &mut self.melee,
            &mut self.special,
            &mut self.heal,
            &mut self.reload,
            &mut self.speed_boost,
        ]
    }
}

/// Bolt magazine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ammo {
    /// Shots left
    pub loaded: u32,
    /// Magazine size
    pub capacity: u32,
    /// Reload in progress (completes when the reload cooldown hits zero)
    pub reloading: bool,
}

impl Ammo {
    /// Full magazine.
    pub fn full(capacity: u32) -> Self {
        Self {
            loaded: capacity,
            capacity,
            reloading: false,
        }
    }

    /// Spend one shot; false when empty or reloading.
    pub fn take(&mut self) -> bool {
        if self.reloading || self.loaded == 0 {
            return false;
        }
        self.loaded -= 1;
        true
    }

    /// Refill and end any reload.
    pub fn refill(&mut self) {
        self.loaded = self.capacity;
        self.reloading = false;
    }

    /// True when a shot is available.
    #[inline]
    pub fn has_round(&self) -> bool {
        !self.reloading && self.loaded > 0
    }
}

/// Bounce and decay behaviour of the current knockback.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct KnockbackParams {
    /// Fraction of landing speed kept
    pub restitution: f32,
    /// No bounce below this landing speed
    pub min_velocity: f32,
    /// Horizontal decay per 1/60 s
    pub decay: f32,
}

impl KnockbackParams {
    /// Body defaults, used by pushes that bring no parameters of their own.
    pub fn from_body(body: &EntityConfig) -> Self {
        Self {
            restitution: body.bounce_restitution,
            min_velocity: body.min_bounce_velocity,
            decay: body.knockback_decay,
        }
    }
}

// =============================================================================
// ENTITY
// =============================================================================

/// A player or bot. All three roles share this shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Entity {
    /// Stable id
    pub id: EntityId,

    /// Who drives it
    pub role: EntityRole,

    /// Capsule centre
    pub position: Vec3,

    /// Velocity (horizontal part is knockback while `knockback` is set)
    pub velocity: Vec3,

    /// Resting on a floor
    pub grounded: bool,

    /// Death animation playing; no movement input accepted
    pub is_dying: bool,

    /// Invisible to collision scans until respawn
    pub dead: bool,

    /// Current health
    pub health: f32,

    /// Health ceiling
    pub max_health: f32,

    /// Last non-zero movement facing
    pub facing: Facing,

    /// Selected character
    pub character: CharacterKind,

    /// Slow from poison (None = unslowed)
    pub poison_speed_multiplier: Option<f32>,

    /// Externally imposed velocity is decaying
    pub knockback: bool,

    /// Bounce and decay parameters of the active knockback
    pub knockback_params: KnockbackParams,

    /// One restitution bounce allowed per knockback application
    pub bounce_available: bool,

    /// Seconds left in the death fade
    pub death_fade: f32,

    /// Heading (radians, 0 = +Z)
    pub yaw: f32,

    /// Animation key
    pub anim_key: AnimKey,

    /// Running this tick
    pub running: bool,

    /// Levitating this tick
    pub flying: bool,

    /// Fly was released mid-air; descent is bounded until landing
    pub fly_descent: bool,

    /// Second jump spent since the last landing
    pub double_jump_used: bool,

    /// Ability cooldowns
    pub cooldowns: Cooldowns,

    /// Bolt magazine
    pub ammo: Ammo,

    /// Seconds of speed boost left
    pub speed_boost_timer: f32,

    /// Speed boost multiplier while the timer runs
    pub speed_boost_multiplier: f32,
}

impl Entity {
    /// Create an entity at `position` using the character's profile.
    pub fn new(
        id: EntityId,
        role: EntityRole,
        character: CharacterKind,
        position: Vec3,
        config: &CoreConfig,
    ) -> Self {
        let profile = config.profile(character);
        Self {
            id,
            role,
            position,
            velocity: Vec3::ZERO,
            grounded: false,
            is_dying: false,
            dead: false,
            health: config.entity.default_health.min(config.entity.max_health),
            max_health: config.entity.max_health,
            facing: Facing::Front,
            character,
            poison_speed_multiplier: None,
            knockback: false,
            knockback_params: KnockbackParams::from_body(&config.entity),
            bounce_available: false,
            death_fade: 0.0,
            yaw: 0.0,
            anim_key: AnimKey::Idle,
            running: false,
            flying: false,
            fly_descent: false,
            double_jump_used: false,
            cooldowns: Cooldowns::default(),
            ammo: Ammo::full(profile.bolt.magazine_size),
            speed_boost_timer: 0.0,
            speed_boost_multiplier: profile.speed_boost.multiplier,
        }
    }

    /// Alive and not fading.
    #[inline]
    pub fn is_alive(&self) -> bool {
        !self.dead && !self.is_dying
    }

    /// Included in hit, splash and area scans.
    #[inline]
    pub fn is_targetable(&self) -> bool {
        self.is_alive() && self.health > 0.0
    }

    /// Health as 0..=1.
    pub fn health_fraction(&self) -> f32 {
        if self.max_health <= 0.0 {
            return 0.0;
        }
        (self.health / self.max_health).clamp(0.0, 1.0)
    }

    /// Combined poison and boost multiplier on move speed.
    pub fn speed_multiplier(&self) -> f32 {
        let poison = self.poison_speed_multiplier.unwrap_or(1.0);
        let boost = if self.speed_boost_timer > 0.0 {
            self.speed_boost_multiplier
        } else {
            1.0
        };
        poison * boost
    }

    /// Position of the capsule's feet.
    #[inline]
    pub fn feet(&self, half_height: f32) -> Vec3 {
        self.position - Vec3::Y * half_height
    }

    /// Switch to another character's ability set.
    ///
    /// Cooldowns reset and the magazine is refilled with the new capacity.
    pub fn apply_profile(&mut self, character: CharacterKind, profile: &CharacterProfile) {
        self.character = character;
        self.cooldowns.reset();
        self.ammo = Ammo::full(profile.bolt.magazine_size);
        self.speed_boost_multiplier = profile.speed_boost.multiplier;
    }
}

// =============================================================================
// GAME MODE / SCORES
// =============================================================================

/// Active game mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum GameMode {
    /// Free-for-all combat, bots despawn on death
    #[default]
    Deathmatch,
    /// Combat practice, bots respawn
    Training,
    /// Non-combat traversal with collectibles, hazards and checkpoints
    Explore,
}

impl GameMode {
    /// Weapons and abilities enabled.
    #[inline]
    pub fn is_combat(self) -> bool {
        !matches!(self, GameMode::Explore)
    }
}

/// Kill/death tally.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Kills credited
    pub kills: u32,
    /// Deaths
    pub deaths: u32,
    /// Collectible points (Explore)
    pub points: u32,
}

/// Result of a damage application.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DamageOutcome {
    /// Target missing, dead, or not ours to damage
    Ignored,
    /// Health changed locally
    Applied {
        /// Health after the hit
        health: f32,
        /// Health crossed to zero on this hit
        died: bool,
    },
    /// Target is remote; its owner was asked to apply the damage
    Forwarded,
}

impl DamageOutcome {
    /// True if the hit killed the target.
    pub fn died(&self) -> bool {
        matches!(self, DamageOutcome::Applied { died: true, .. })
    }
}

// =============================================================================
// WORLD
// =============================================================================

/// Everything the core owns between ticks.
///
/// Uses BTreeMap for deterministic iteration order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct World {
    /// Ticks simulated
    pub tick: u64,

    /// Simulated seconds
    pub time: f64,

    /// Current mode
    pub mode: GameMode,

    /// All entities by id
    pub entities: BTreeMap<EntityId, Entity>,

    /// Kill/death table
    pub scores: BTreeMap<EntityId, Score>,

    /// Deterministic RNG state
    #[serde(skip)]
    pub rng: DeterministicRng,

    /// Events generated this tick (cleared each tick)
    #[serde(skip)]
    pub pending_events: Vec<GameEvent>,

    /// Next bot number
    pub next_bot: u32,

    /// Death fade length applied when health crosses zero
    pub death_fade_duration: f32,
}

impl World {
    /// Create an empty world.
    pub fn new(seed: u64, mode: GameMode, death_fade_duration: f32) -> Self {
        Self {
            tick: 0,
            time: 0.0,
            mode,
            entities: BTreeMap::new(),
            scores: BTreeMap::new(),
            rng: DeterministicRng::new(seed),
            pending_events: Vec::new(),
            next_bot: 1,
            death_fade_duration,
        }
    }

    /// Insert an entity. Returns false if the id already exists.
    pub fn spawn(&mut self, entity: Entity) -> bool {
        if self.entities.contains_key(&entity.id) {
            return false;
        }
        self.scores.entry(entity.id.clone()).or_default();
        self.entities.insert(entity.id.clone(), entity);
        true
    }

    /// Remove an entity.
    pub fn remove(&mut self, id: &EntityId) -> Option<Entity> {
        self.entities.remove(id)
    }

    /// Allocate the next bot id.
    pub fn next_bot_id(&mut self) -> EntityId {
        let id = EntityId::bot(self.next_bot);
        self.next_bot += 1;
        id
    }

    /// Get an entity by ID.
    pub fn get(&self, id: &EntityId) -> Option<&Entity> {
        self.entities.get(id)
    }

    /// Get an entity mutably by ID.
    pub fn get_mut(&mut self, id: &EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    /// The local player, if spawned.
    pub fn local(&self) -> Option<&Entity> {
        self.entities.get(EntityId::LOCAL)
    }

    /// The local player mutably.
    pub fn local_mut(&mut self) -> Option<&mut Entity> {
        self.entities.get_mut(EntityId::LOCAL)
    }

    /// Ids with a given role, in id order.
    pub fn ids_with_role(&self, role: EntityRole) -> Vec<EntityId> {
        self.entities
            .values()
            .filter(|e| e.role == role)
            .map(|e| e.id.clone())
            .collect()
    }

    /// Targetable entities other than `exclude` within `radius` (XZ) of `center`,
    /// with their horizontal distance.
    pub fn targets_within(
        &self,
        center: Vec3,
        radius: f32,
        exclude: &EntityId,
    ) -> Vec<(EntityId, f32)> {
        self.entities
            .values()
            .filter(|e| &e.id != exclude && e.is_targetable())
            .filter_map(|e| {
                let d = crate::core::math::distance_xz(center, e.position);
                (d <= radius).then(|| (e.id.clone(), d))
            })
            .collect()
    }

    /// Score entry for an id.
    pub fn score(&self, id: &EntityId) -> Score {
        self.scores.get(id).copied().unwrap_or_default()
    }

    /// Push a game event stamped with the current tick.
    pub fn push_event(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.tick, data));
    }

    /// Take pending events (consumes them).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    /// Apply damage with owner-authoritative health.
    ///
    /// Locally simulated targets lose health here. Remote targets are never
    /// modified; when the local player is the attacker a
    /// `RemoteDamageRequested` event is queued for replication instead.
    pub fn apply_damage(
        &mut self,
        victim: &EntityId,
        amount: f32,
        source: DamageSource,
        attacker: Option<&EntityId>,
    ) -> DamageOutcome {
        if !amount.is_finite() || amount < 0.0 {
            return DamageOutcome::Ignored;
        }
        let Some(target) = self.entities.get_mut(victim) else {
            return DamageOutcome::Ignored;
        };
        if !target.is_targetable() {
            return DamageOutcome::Ignored;
        }

        if target.role == EntityRole::RemotePlayer {
            return match attacker {
                Some(a) if a.is_local() => {
                    let data = GameEventData::RemoteDamageRequested {
                        target: victim.clone(),
                        attacker: a.clone(),
                        amount,
                        source,
                    };
                    self.push_event(data);
                    DamageOutcome::Forwarded
                }
                _ => DamageOutcome::Ignored,
            };
        }

        let died = character::take_damage(target, amount);
        let health = target.health;
        let max_health = target.max_health;
        let position = target.position;
        if died {
            character::play_death_animation(target, self.death_fade_duration);
        }

        self.push_event(GameEventData::Damaged {
            victim: victim.clone(),
            attacker: attacker.cloned(),
            amount,
            health,
            max_health,
            source,
            position,
        });

        if died {
            self.record_death(victim, attacker, source, position);
        }
        DamageOutcome::Applied { health, died }
    }

    /// Kill outright (fallout). Health drops to zero and the fade starts.
    pub fn kill(&mut self, victim: &EntityId, killer: Option<&EntityId>, source: DamageSource) -> bool {
        let Some(target) = self.entities.get_mut(victim) else {
            return false;
        };
        if !target.is_alive() || !target.role.is_simulated() {
            return false;
        }
        let amount = target.health;
        character::set_health(target, 0.0);
        character::play_death_animation(target, self.death_fade_duration);
        let position = target.position;
        let max_health = target.max_health;
        self.push_event(GameEventData::Damaged {
            victim: victim.clone(),
            attacker: killer.cloned(),
            amount,
            health: 0.0,
            max_health,
            source,
            position,
        });
        self.record_death(victim, killer, source, position);
        true
    }

    fn record_death(
        &mut self,
        victim: &EntityId,
        killer: Option<&EntityId>,
        source: DamageSource,
        position: Vec3,
    ) {
        self.scores.entry(victim.clone()).or_default().deaths += 1;
        self.push_event(GameEventData::Died {
            victim: victim.clone(),
            killer: killer.cloned(),
            source,
            position,
        });
        if let Some(k) = killer.filter(|k| *k != victim) {
            self.credit_kill(k, victim);
        }
    }

    /// Credit a kill on the score table.
    pub fn credit_kill(&mut self, killer: &EntityId, victim: &EntityId) {
        self.scores.entry(killer.clone()).or_default().kills += 1;
        self.push_event(GameEventData::KillCredited {
            killer: killer.clone(),
            victim: victim.clone(),
        });
    }

    /// Outward XZ direction from `from` to entity `to`, falling back to
    /// `fallback` when they overlap.
    pub fn outward_from(&self, from: Vec3, to: &EntityId, fallback: Vec3) -> Vec3 {
        self.entities
            .get(to)
            .and_then(|e| direction_xz(from, e.position))
            .unwrap_or(fallback)
    }
}

// =============================================================================
// TESTS
// =============================================================================
