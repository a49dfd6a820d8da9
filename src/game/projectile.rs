//! Projectiles and Splash Areas
//!
//! Bolts fly straight (with an optional weak curve toward a target point)
//! and end on the first body, wall, floor or bound they touch. Mortars
//! follow an analytic parabola that lands on the requested point and leave
//! a [`SplashArea`] behind.
//!
//! Projectiles owned by remote peers are visual only: they integrate and
//! accept owner position updates, but never apply damage here. Damage to
//! remote bodies is forwarded by [`World::apply_damage`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::collision::CollisionProvider;
use super::effects::{apply_poison, PoisonLedger};
use super::events::{DamageSource, GameEventData, VibrationPattern};
use super::state::{CharacterKind, CooldownSlot, Entity, EntityId, World};
use crate::config::{BoltConfig, CoreConfig, EntityConfig, MortarConfig, PoisonConfig};
use crate::core::math::{direction_xz, distance_xz, horizontal, is_finite_vec3, rotate_y, yaw_of};
use crate::error::{CoreError, ProtocolError};

/// Explosions farther than this from the local player do not vibrate.
pub const VIBRATION_MAX_DISTANCE: f32 = 20.0;

/// Vibration intensities below this are dropped.
pub const VIBRATION_CUTOFF: f32 = 0.3;

/// Horizontal offset used when a mortar target sits on the caster.
pub const MIN_MORTAR_OFFSET: f32 = 0.1;

/// Extra room past the arena edge before a projectile is culled.
const BOUNDS_MARGIN: f32 = 5.0;

/// Points in a mortar preview polyline.
const PREVIEW_SAMPLES: usize = 24;

/// Mortars are culled this long after their planned landing.
const MORTAR_GRACE: f32 = 1.0;

/// Inverse-quintic falloff for explosion rumble.
///
/// `1 - (d / d_max)^5`, or `None` once the result drops under the cutoff.
pub fn explosion_vibration(distance: f32, max_distance: f32) -> Option<f32> {
    if max_distance <= 0.0 || !distance.is_finite() {
        return None;
    }
    let ratio = (distance / max_distance).clamp(0.0, 1.0);
    let intensity = 1.0 - ratio.powi(5);
    (intensity >= VIBRATION_CUTOFF).then_some(intensity)
}

// =============================================================================
// IDS / KINDS
// =============================================================================

/// Session-unique projectile id, `"<owner>:<seq>"` for local projectiles.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub String);

impl NetworkId {
    /// Id for the `seq`th projectile fired by `owner`.
    pub fn new(owner: &EntityId, seq: u64) -> Self {
        Self(format!("{owner}:{seq}"))
    }

    /// Borrow as str.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Projectile kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectileKind {
    /// Straight bolt
    Bolt,
    /// Ballistic mortar
    Mortar,
}

// =============================================================================
// MORTAR BALLISTICS
// =============================================================================

/// Area effect left by a mortar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplashParams {
    /// XZ radius
    pub radius: f32,
    /// Damage per tick per victim
    pub damage_per_tick: f32,
    /// Seconds between ticks on one victim
    pub tick_interval: f32,
    /// Seconds the area lasts
    pub duration: f32,
    /// Poison applied on first touch
    pub poison: Option<PoisonConfig>,
}

impl From<&MortarConfig> for SplashParams {
    fn from(m: &MortarConfig) -> Self {
        Self {
            radius: m.splash_radius,
            damage_per_tick: m.damage_per_tick,
            tick_interval: m.tick_interval.max(f32::EPSILON),
            duration: m.splash_duration,
            poison: m.poison.clone(),
        }
    }
}

/// Solved launch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MortarLaunch {
    /// Initial velocity
    pub velocity: Vec3,
    /// Landing point (ground height)
    pub target: Vec3,
    /// Seconds until landing
    pub flight_time: f32,
    /// Downward acceleration
    pub gravity: f32,
}

impl MortarLaunch {
    /// Position `t` seconds after leaving `origin`.
    #[inline]
    pub fn position_at(&self, origin: Vec3, t: f32) -> Vec3 {
        origin + self.velocity * t - Vec3::Y * (0.5 * self.gravity * t * t)
    }
}

/// Resolve the launch velocity so the arc lands on `target`.
///
/// The horizontal range is clamped to the mortar's `[min_range, max_range]`.
/// Targets on top of the caster use `forward` with a tiny offset before the
/// clamp. With no target at all the shell goes straight up and comes back
/// down on the origin.
pub fn solve_mortar_launch(
    origin: Vec3,
    target: Option<Vec3>,
    forward: Vec3,
    params: &MortarConfig,
    collider: &dyn CollisionProvider,
) -> MortarLaunch {
    let gravity = params.gravity.max(f32::EPSILON);
    let arc = params.arc_height.max(0.1);
    let ground_at = |p: Vec3| collider.ground_height(p.x, p.z, params.radius).unwrap_or(0.0);

    let Some(raw_target) = target.filter(|t| is_finite_vec3(*t)) else {
        let vy = (2.0 * gravity * arc).sqrt();
        let flight_time = 2.0 * vy / gravity;
        return MortarLaunch {
            velocity: Vec3::Y * vy,
            target: origin,
            flight_time,
            gravity,
        };
    };

    let (dir, dist) = match direction_xz(origin, raw_target) {
        Some(dir) if distance_xz(origin, raw_target) >= MIN_MORTAR_OFFSET => (dir, distance_xz(origin, raw_target)),
        _ => (
            horizontal(forward).try_normalize().unwrap_or(Vec3::Z),
            MIN_MORTAR_OFFSET,
        ),
    };
    let dist = dist.clamp(params.min_range, params.max_range);
    let mut landing = origin + dir * dist;
    landing.y = ground_at(landing);

    let apex = origin.y.max(landing.y) + arc;
    let vy = (2.0 * gravity * (apex - origin.y)).sqrt();
    let rise = vy / gravity;
    let fall = (2.0 * (apex - landing.y) / gravity).sqrt();
    let flight_time = (rise + fall).max(f32::EPSILON);
    let horizontal_velocity = horizontal(landing - origin) / flight_time;

    MortarLaunch {
        velocity: horizontal_velocity + Vec3::Y * vy,
        target: landing,
        flight_time,
        gravity,
    }
}

/// Sampled arc for the aim preview, cut short at the first wall.
pub fn preview_trajectory(
    origin: Vec3,
    target: Option<Vec3>,
    forward: Vec3,
    params: &MortarConfig,
    collider: &dyn CollisionProvider,
) -> Vec<Vec3> {
    let launch = solve_mortar_launch(origin, target, forward, params, collider);
    let mut points = Vec::with_capacity(PREVIEW_SAMPLES + 1);
    for i in 0..=PREVIEW_SAMPLES {
        let t = launch.flight_time * i as f32 / PREVIEW_SAMPLES as f32;
        let p = launch.position_at(origin, t);
        if i > 0 && collider.will_collide(p, params.radius) {
            break;
        }
        points.push(p);
    }
    points
}

/// In-flight mortar state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MortarFlight {
    /// Where the current arc segment started
    pub origin: Vec3,
    /// Velocity at `origin`
    pub launch_velocity: Vec3,
    /// Landing point
    pub target: Vec3,
    /// Seconds from `origin` to landing
    pub flight_time: f32,
    /// Seconds since `origin`
    pub elapsed: f32,
    /// Downward acceleration
    pub gravity: f32,
    /// Area left on impact
    pub splash: SplashParams,
}

// =============================================================================
// PROJECTILE
// =============================================================================

/// A live projectile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Projectile {
    /// Session-unique id
    pub network_id: NetworkId,
    /// Bolt or mortar
    pub kind: ProjectileKind,
    /// Who fired it
    pub owner: EntityId,
    /// Owner's character at fire time
    pub character: CharacterKind,
    /// Current position
    pub position: Vec3,
    /// Current velocity
    pub velocity: Vec3,
    /// Optional homing point (bolts) or landing point (mortars)
    pub target_xz: Option<Vec3>,
    /// Damage on hit (bolts)
    pub damage: f32,
    /// Simulated time at creation
    pub created_at: f64,
    /// Seconds alive
    pub age: f32,
    /// Seconds before it is culled
    pub lifetime: f32,
    /// Collision radius
    pub radius: f32,
    /// Max heading change per second toward `target_xz` (radians)
    pub homing_turn_rate: f32,
    /// Fired by a remote peer; visual only
    pub remote_owned: bool,
    /// Mortar arc
    pub mortar: Option<MortarFlight>,
    /// Seconds since the last outbound position update
    pub since_update: f32,
}

impl Projectile {
    /// True for mortars.
    #[inline]
    pub fn is_mortar(&self) -> bool {
        self.kind == ProjectileKind::Mortar
    }
}

/// Bolt launch parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoltRequest {
    /// Spawn point
    pub origin: Vec3,
    /// Flight direction (projected to XZ)
    pub direction: Vec3,
    /// Weak homing point
    pub target: Option<Vec3>,
    /// Speed
    pub speed: f32,
    /// Damage
    pub damage: f32,
    /// Skip the cooldown and magazine (multi-shot ring)
    pub force: bool,
}

impl BoltRequest {
    /// Standard aimed bolt.
    pub fn aimed(origin: Vec3, direction: Vec3, target: Option<Vec3>, params: &BoltConfig) -> Self {
        Self {
            origin,
            direction,
            target,
            speed: params.speed,
            damage: params.damage,
            force: false,
        }
    }
}

/// Projectile announced by a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteProjectile {
    /// Peer-assigned id
    pub network_id: NetworkId,
    /// Bolt or mortar
    pub kind: ProjectileKind,
    /// Firing peer
    pub owner: EntityId,
    /// Firing character
    pub character: CharacterKind,
    /// Spawn point
    pub origin: Vec3,
    /// Initial velocity
    pub velocity: Vec3,
    /// Homing / landing point
    pub target: Option<Vec3>,
    /// Nominal damage (informational)
    pub damage: f32,
}

// =============================================================================
// SPLASH AREA
// =============================================================================

/// Ground area left by a mortar.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplashArea {
    /// Local id
    pub id: u64,
    /// Center (ground height)
    pub center: Vec3,
    /// XZ radius
    pub radius: f32,
    /// Damage per tick per victim
    pub damage_per_tick: f32,
    /// Seconds between ticks on one victim
    pub tick_interval: f32,
    /// Simulated time when it disappears
    pub expires_at: f64,
    /// Mortar owner
    pub owner: EntityId,
    /// Owner's character
    pub character: CharacterKind,
    /// Poison applied on first touch
    pub poison: Option<PoisonConfig>,
    /// Time each victim has spent inside, and ticks charged for it
    pub exposure: BTreeMap<EntityId, SplashExposure>,
    /// Victims already poisoned by this area
    pub poisoned: BTreeSet<EntityId>,
}

/// One victim's stay in a splash area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SplashExposure {
    /// Seconds spent inside, summed over visits
    pub stay: f32,
    /// Ticks already applied
    pub charged: u32,
}

impl SplashExposure {
    /// Ticks owed after `stay` seconds inside: one on touch, paying for the
    /// first interval, then one as each further interval completes.
    pub fn ticks_due(&self, interval: f32) -> u32 {
        // Absorbs the drift of summing 1/60 s steps
        const STAY_SLACK: f32 = 1e-4;
        if interval <= 0.0 {
            return 1;
        }
        (((self.stay + STAY_SLACK) / interval).floor() as u32).max(1)
    }
}

impl SplashArea {
    /// True if `entity`'s feet are inside the area.
    pub fn contains(&self, entity: &Entity, body: &EntityConfig) -> bool {
        let feet = entity.feet(body.half_height());
        let dy = feet.y - self.center.y;
        distance_xz(self.center, entity.position) <= self.radius && (-1.0..=self.radius).contains(&dy)
    }
}

/// Mortar cooldown view for the HUD.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MortarCooldownInfo {
    /// Seconds left
    pub remaining: f32,
    /// Full cooldown
    pub total: f32,
    /// Ready to fire
    pub ready: bool,
}

// =============================================================================
// SYSTEM
// =============================================================================

enum StepResult {
    Keep,
    Remove,
    Explode(Vec3),
}

/// Owner of every projectile and splash area.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ProjectileSystem {
    projectiles: BTreeMap<NetworkId, Projectile>,
    splashes: Vec<SplashArea>,
    next_seq: u64,
    next_splash: u64,
}

impl ProjectileSystem {
    /// Empty system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Live projectiles in id order.
    pub fn projectiles(&self) -> impl Iterator<Item = &Projectile> {
        self.projectiles.values()
    }

    /// Projectile by id.
    pub fn get(&self, id: &NetworkId) -> Option<&Projectile> {
        self.projectiles.get(id)
    }

    /// Active splash areas.
    pub fn splashes(&self) -> &[SplashArea] {
        &self.splashes
    }

    /// Live projectile count.
    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    /// No live projectiles.
    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }

    /// Drop everything (mode change).
    pub fn clear(&mut self) {
        self.projectiles.clear();
        self.splashes.clear();
    }

    /// Drop projectiles and areas owned by `owner` (peer left).
    pub fn remove_owned_by(&mut self, owner: &EntityId) {
        self.projectiles.retain(|_, p| &p.owner != owner);
        self.splashes.retain(|s| &s.owner != owner);
    }

    fn next_id(&mut self, owner: &EntityId) -> NetworkId {
        self.next_seq += 1;
        NetworkId::new(owner, self.next_seq)
    }

    /// Bolt cooldown clear and a round loaded.
    pub fn can_shoot(world: &World, id: &EntityId) -> bool {
        world
            .get(id)
            .is_some_and(|e| e.is_alive() && e.cooldowns.ready(CooldownSlot::Bolt) && e.ammo.has_round())
    }

    /// Mortar cooldown clear.
    pub fn can_shoot_mortar(world: &World, id: &EntityId) -> bool {
        world
            .get(id)
            .is_some_and(|e| e.is_alive() && e.cooldowns.ready(CooldownSlot::Mortar))
    }

    /// Override an entity's melee cooldown.
    pub fn set_melee_cooldown(world: &mut World, id: &EntityId, seconds: f32) -> Result<(), CoreError> {
        let entity = world
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownEntity(id.to_string()))?;
        entity.cooldowns.set(CooldownSlot::Melee, seconds);
        Ok(())
    }

    /// Override an entity's special cooldown.
    pub fn set_special_ability_cooldown(world: &mut World, id: &EntityId, seconds: f32) -> Result<(), CoreError> {
        let entity = world
            .get_mut(id)
            .ok_or_else(|| CoreError::UnknownEntity(id.to_string()))?;
        entity.cooldowns.set(CooldownSlot::Special, seconds);
        Ok(())
    }

    /// Mortar cooldown for the HUD.
    pub fn mortar_cooldown_info(world: &World, id: &EntityId, config: &CoreConfig) -> Option<MortarCooldownInfo> {
        let entity = world.get(id)?;
        let remaining = entity.cooldowns.mortar;
        Some(MortarCooldownInfo {
            remaining,
            total: config.profile(entity.character).mortar.cooldown,
            ready: remaining <= 0.0,
        })
    }

    /// Fire a bolt.
    ///
    /// Unless forced, this spends a round and starts the bolt cooldown; the
    /// last round starts the reload. Returns `None` when the owner cannot
    /// fire or the direction is degenerate.
    pub fn create_bolt(
        &mut self,
        world: &mut World,
        owner: &EntityId,
        request: BoltRequest,
        params: &BoltConfig,
    ) -> Option<NetworkId> {
        let direction = horizontal(request.direction).try_normalize()?;
        if !is_finite_vec3(request.origin) {
            return None;
        }
        if !request.force && !Self::can_shoot(world, owner) {
            return None;
        }
        let entity = world.get_mut(owner)?;
        if !entity.is_alive() {
            return None;
        }
        if !request.force {
            entity.ammo.take();
            entity.cooldowns.set(CooldownSlot::Bolt, params.cooldown);
            if entity.ammo.loaded == 0 {
                entity.ammo.reloading = true;
                entity.cooldowns.set(CooldownSlot::Reload, params.reload_time);
            }
        }
        let character = entity.character;

        let network_id = self.next_id(owner);
        let velocity = direction * request.speed;
        let projectile = Projectile {
            network_id: network_id.clone(),
            kind: ProjectileKind::Bolt,
            owner: owner.clone(),
            character,
            position: request.origin,
            velocity,
            target_xz: request.target,
            damage: request.damage,
            created_at: world.time,
            age: 0.0,
            lifetime: params.lifetime,
            radius: params.radius,
            homing_turn_rate: params.homing_turn_rate,
            remote_owned: false,
            mortar: None,
            since_update: 0.0,
        };
        trace!(id = %network_id, owner = %owner, "bolt created");
        self.projectiles.insert(network_id.clone(), projectile);
        world.push_event(GameEventData::ProjectileSpawned {
            network_id: network_id.0.clone(),
            owner: owner.clone(),
            character,
            mortar: false,
            origin: request.origin,
            velocity,
            target: request.target,
            damage: request.damage,
        });
        Some(network_id)
    }

    /// Launch a mortar at `target` (or straight up when `None`).
    pub fn create_mortar(
        &mut self,
        world: &mut World,
        owner: &EntityId,
        target: Option<Vec3>,
        params: &MortarConfig,
        collider: &dyn CollisionProvider,
    ) -> Option<NetworkId> {
        if !Self::can_shoot_mortar(world, owner) {
            return None;
        }
        let entity = world.get_mut(owner)?;
        entity.cooldowns.set(CooldownSlot::Mortar, params.cooldown);
        let origin = entity.position;
        let forward = entity.facing.to_direction();
        let character = entity.character;

        let launch = solve_mortar_launch(origin, target, forward, params, collider);
        let network_id = self.next_id(owner);
        let projectile = Projectile {
            network_id: network_id.clone(),
            kind: ProjectileKind::Mortar,
            owner: owner.clone(),
            character,
            position: origin,
            velocity: launch.velocity,
            target_xz: Some(launch.target),
            damage: params.damage_per_tick,
            created_at: world.time,
            age: 0.0,
            lifetime: launch.flight_time + MORTAR_GRACE,
            radius: params.radius,
            homing_turn_rate: 0.0,
            remote_owned: false,
            mortar: Some(MortarFlight {
                origin,
                launch_velocity: launch.velocity,
                target: launch.target,
                flight_time: launch.flight_time,
                elapsed: 0.0,
                gravity: launch.gravity,
                splash: SplashParams::from(params),
            }),
            since_update: 0.0,
        };
        debug!(id = %network_id, owner = %owner, target = ?launch.target, "mortar launched");
        self.projectiles.insert(network_id.clone(), projectile);
        world.push_event(GameEventData::ProjectileSpawned {
            network_id: network_id.0.clone(),
            owner: owner.clone(),
            character,
            mortar: true,
            origin,
            velocity: launch.velocity,
            target: Some(launch.target),
            damage: params.damage_per_tick,
        });
        Some(network_id)
    }

    /// Mirror a projectile announced by a peer. Duplicate ids are ignored.
    pub fn create_remote(&mut self, remote: RemoteProjectile, config: &CoreConfig, now: f64) -> bool {
        if self.projectiles.contains_key(&remote.network_id) {
            return false;
        }
        if !is_finite_vec3(remote.origin) || !is_finite_vec3(remote.velocity) {
            warn!(id = %remote.network_id, "rejecting remote projectile with non-finite state");
            return false;
        }
        let profile = config.profile(remote.character);
        let (lifetime, radius, mortar) = match remote.kind {
            ProjectileKind::Bolt => (profile.bolt.lifetime, profile.bolt.radius, None),
            ProjectileKind::Mortar => {
                let gravity = profile.mortar.gravity.max(f32::EPSILON);
                let target = remote.target.unwrap_or(remote.origin);
                let flight_time = flight_time_to(remote.origin, remote.velocity, gravity, target.y);
                (
                    flight_time + MORTAR_GRACE,
                    profile.mortar.radius,
                    Some(MortarFlight {
                        origin: remote.origin,
                        launch_velocity: remote.velocity,
                        target,
                        flight_time,
                        elapsed: 0.0,
                        gravity,
                        splash: SplashParams::from(&profile.mortar),
                    }),
                )
            }
        };
        let projectile = Projectile {
            network_id: remote.network_id.clone(),
            kind: remote.kind,
            owner: remote.owner,
            character: remote.character,
            position: remote.origin,
            velocity: remote.velocity,
            target_xz: remote.target,
            damage: remote.damage,
            created_at: now,
            age: 0.0,
            lifetime,
            radius,
            homing_turn_rate: profile.bolt.homing_turn_rate,
            remote_owned: true,
            mortar,
            since_update: 0.0,
        };
        self.projectiles.insert(remote.network_id, projectile);
        true
    }

    /// Owner-authoritative position override for a mirrored projectile.
    pub fn apply_remote_update(&mut self, id: &NetworkId, position: Vec3, velocity: Vec3) -> Result<(), ProtocolError> {
        let projectile = self
            .projectiles
            .get_mut(id)
            .ok_or_else(|| ProtocolError::UnknownProjectile(id.to_string()))?;
        if !is_finite_vec3(position) || !is_finite_vec3(velocity) {
            return Ok(());
        }
        projectile.position = position;
        projectile.velocity = velocity;
        if let Some(flight) = projectile.mortar.as_mut() {
            // Re-anchor the arc on the reported state
            flight.flight_time = flight_time_to(position, velocity, flight.gravity, flight.target.y);
            flight.origin = position;
            flight.launch_velocity = velocity;
            flight.elapsed = 0.0;
        }
        Ok(())
    }

    /// Locally owned projectiles due for an outbound position update.
    pub fn take_due_updates(&mut self, dt: f32, interval: f32) -> Vec<(NetworkId, Vec3, Vec3)> {
        let mut due = Vec::new();
        for p in self.projectiles.values_mut() {
            if p.remote_owned || !p.owner.is_local() {
                continue;
            }
            p.since_update += dt;
            if p.since_update >= interval {
                p.since_update = 0.0;
                due.push((p.network_id.clone(), p.position, p.velocity));
            }
        }
        due
    }

    /// Capsule-vs-sphere test of a projectile against a body.
    pub fn check_hit_against(projectile: &Projectile, entity: &Entity, body: &EntityConfig) -> bool {
        entity.id != projectile.owner
            && entity.is_targetable()
            && capsule_contains(entity.position, body, projectile.position, projectile.radius)
    }

    /// Ids of splash areas currently covering `entity`.
    pub fn splash_hits_against(&self, entity: &Entity, body: &EntityConfig) -> Vec<u64> {
        self.splashes
            .iter()
            .filter(|s| entity.is_targetable() && s.contains(entity, body))
            .map(|s| s.id)
            .collect()
    }

    /// Place a splash area directly.
    pub fn create_splash(
        &mut self,
        center: Vec3,
        owner: &EntityId,
        character: CharacterKind,
        params: &SplashParams,
        now: f64,
    ) -> u64 {
        self.next_splash += 1;
        let id = self.next_splash;
        self.splashes.push(SplashArea {
            id,
            center,
            radius: params.radius,
            damage_per_tick: params.damage_per_tick,
            tick_interval: params.tick_interval.max(f32::EPSILON),
            expires_at: now + params.duration as f64,
            owner: owner.clone(),
            character,
            poison: params.poison.clone(),
            exposure: BTreeMap::new(),
            poisoned: BTreeSet::new(),
        });
        id
    }

    /// Integrate projectiles, resolve hits and explosions, then tick splash areas.
    pub fn update(
        &mut self,
        dt: f32,
        world: &mut World,
        collider: &dyn CollisionProvider,
        poison: &mut PoisonLedger,
        config: &CoreConfig,
    ) {
        let ids: Vec<NetworkId> = self.projectiles.keys().cloned().collect();
        for id in ids {
            let Some(mut projectile) = self.projectiles.remove(&id) else {
                continue;
            };
            let result = match projectile.kind {
                ProjectileKind::Bolt => step_bolt(&mut projectile, dt, world, collider, config),
                ProjectileKind::Mortar => step_mortar(&mut projectile, dt, world, collider, config),
            };
            match result {
                StepResult::Keep => {
                    self.projectiles.insert(id, projectile);
                }
                StepResult::Remove => {
                    trace!(id = %id, "projectile removed");
                }
                StepResult::Explode(at) => self.explode(&projectile, at, world),
            }
        }
        self.update_splashes(dt, world, poison, config);
    }

    fn explode(&mut self, projectile: &Projectile, at: Vec3, world: &mut World) {
        let Some(flight) = projectile.mortar.as_ref() else {
            return;
        };
        debug!(id = %projectile.network_id, position = ?at, "mortar exploded");
        world.push_event(GameEventData::MortarExploded {
            network_id: projectile.network_id.0.clone(),
            owner: projectile.owner.clone(),
            character: projectile.character,
            position: at,
            radius: flight.splash.radius,
        });
        if let Some(local) = world.local() {
            if let Some(intensity) = explosion_vibration(local.position.distance(at), VIBRATION_MAX_DISTANCE) {
                let away = direction_xz(at, local.position).unwrap_or(Vec3::X);
                world.push_event(GameEventData::Vibration {
                    pattern: VibrationPattern::Explosion,
                    intensity,
                });
                world.push_event(GameEventData::ScreenShake {
                    offset: (away * 0.2 + Vec3::Y * 0.1) * intensity,
                });
            }
        }
        if !projectile.remote_owned {
            self.create_splash(at, &projectile.owner, projectile.character, &flight.splash, world.time);
        }
    }

    fn update_splashes(&mut self, dt: f32, world: &mut World, poison: &mut PoisonLedger, config: &CoreConfig) {
        let now = world.time;
        self.splashes.retain(|s| now < s.expires_at);
        let body = &config.entity;

        for area in self.splashes.iter_mut() {
            let inside: Vec<EntityId> = world
                .entities
                .values()
                .filter(|e| e.id != area.owner && e.is_targetable() && area.contains(e, body))
                .map(|e| e.id.clone())
                .collect();

            for victim in inside {
                let first_touch = !area.exposure.contains_key(&victim);
                let exposure = area.exposure.entry(victim.clone()).or_default();
                if !first_touch {
                    exposure.stay += dt;
                }
                if exposure.charged >= exposure.ticks_due(area.tick_interval) {
                    continue;
                }
                exposure.charged += 1;
                trace!(area = area.id, victim = %victim, "splash tick");
                let outcome = world.apply_damage(&victim, area.damage_per_tick, DamageSource::Splash, Some(&area.owner));
                if outcome.died() {
                    continue;
                }
                if let Some(params) = area.poison.as_ref() {
                    if area.poisoned.insert(victim.clone()) {
                        apply_poison(world, poison, &victim, params, Some(&area.owner));
                    }
                }
            }
        }
    }
}

// =============================================================================
// STEPPING
// =============================================================================

fn step_bolt(
    p: &mut Projectile,
    dt: f32,
    world: &mut World,
    collider: &dyn CollisionProvider,
    config: &CoreConfig,
) -> StepResult {
    p.age += dt;
    if p.age >= p.lifetime {
        return StepResult::Remove;
    }

    if let Some(target) = p.target_xz {
        steer_toward(p, target, dt);
    }

    let start = p.position;
    let end = start + p.velocity * dt;
    if !is_finite_vec3(end) {
        warn!(id = %p.network_id, "dropping projectile with non-finite position");
        return StepResult::Remove;
    }

    let travel = start.distance(end);
    let substeps = ((travel / p.radius.max(0.05)).ceil() as usize).clamp(1, 16);
    for i in 1..=substeps {
        let q = start.lerp(end, i as f32 / substeps as f32);
        p.position = q;
        if collider.will_collide(q, p.radius) {
            return StepResult::Remove;
        }
        if let Some(victim) = first_hit(p, world, &config.entity) {
            world.push_event(GameEventData::ProjectileHit {
                network_id: p.network_id.0.clone(),
                target: victim.clone(),
            });
            if !p.remote_owned {
                world.apply_damage(&victim, p.damage, DamageSource::Bolt, Some(&p.owner));
            }
            return StepResult::Remove;
        }
        if let Some(ground) = collider.ground_height(q.x, q.z, p.radius) {
            if q.y < ground {
                return StepResult::Remove;
            }
        }
    }

    if out_of_bounds(p.position, config) {
        return StepResult::Remove;
    }
    StepResult::Keep
}

fn step_mortar(
    p: &mut Projectile,
    dt: f32,
    world: &mut World,
    collider: &dyn CollisionProvider,
    config: &CoreConfig,
) -> StepResult {
    p.age += dt;
    let Some(flight) = p.mortar.as_mut() else {
        return StepResult::Remove;
    };
    flight.elapsed += dt;
    let launch = MortarLaunch {
        velocity: flight.launch_velocity,
        target: flight.target,
        flight_time: flight.flight_time,
        gravity: flight.gravity,
    };
    if flight.elapsed >= flight.flight_time {
        p.position = flight.target;
        return StepResult::Explode(flight.target);
    }

    let next = launch.position_at(flight.origin, flight.elapsed);
    if !is_finite_vec3(next) {
        warn!(id = %p.network_id, "dropping mortar with non-finite position");
        return StepResult::Remove;
    }
    let descending = flight.launch_velocity.y - flight.gravity * flight.elapsed <= 0.0;
    p.velocity = flight.launch_velocity - Vec3::Y * (flight.gravity * flight.elapsed);
    p.position = next;

    let ground_below = |pos: Vec3| collider.ground_height(pos.x, pos.z, p.radius);
    if collider.will_collide(next, p.radius) {
        let y = ground_below(next).unwrap_or(flight.target.y);
        return StepResult::Explode(Vec3::new(next.x, y, next.z));
    }
    if let Some(victim) = first_hit(p, world, &config.entity) {
        if let Some(e) = world.get(&victim) {
            let feet = e.feet(config.entity.half_height());
            world.push_event(GameEventData::ProjectileHit {
                network_id: p.network_id.0.clone(),
                target: victim,
            });
            return StepResult::Explode(feet);
        }
    }
    if descending {
        if let Some(ground) = ground_below(next) {
            if next.y <= ground {
                return StepResult::Explode(Vec3::new(next.x, ground, next.z));
            }
        }
    }
    if p.age >= p.lifetime || out_of_bounds(next, config) {
        return StepResult::Remove;
    }
    StepResult::Keep
}

/// First targetable body (id order) whose capsule contains the projectile.
fn first_hit(p: &Projectile, world: &World, body: &EntityConfig) -> Option<EntityId> {
    world
        .entities
        .values()
        .find(|e| ProjectileSystem::check_hit_against(p, e, body))
        .map(|e| e.id.clone())
}

/// Turn the heading toward `target` by at most `turn_rate * dt`.
fn steer_toward(p: &mut Projectile, target: Vec3, dt: f32) {
    if p.homing_turn_rate <= 0.0 {
        return;
    }
    let Some(desired) = direction_xz(p.position, target) else {
        return;
    };
    // Past the target: stop curving
    if distance_xz(p.position, target) < 0.5 {
        return;
    }
    let speed = horizontal(p.velocity).length();
    let Some(current) = horizontal(p.velocity).try_normalize() else {
        return;
    };
    let mut delta = yaw_of(desired) - yaw_of(current);
    while delta > std::f32::consts::PI {
        delta -= std::f32::consts::TAU;
    }
    while delta < -std::f32::consts::PI {
        delta += std::f32::consts::TAU;
    }
    let max_turn = p.homing_turn_rate * dt;
    let turned = rotate_y(current, delta.clamp(-max_turn, max_turn));
    p.velocity = turned * speed + Vec3::Y * p.velocity.y;
}

fn out_of_bounds(pos: Vec3, config: &CoreConfig) -> bool {
    let limit = config.respawn.arena_half_size + BOUNDS_MARGIN;
    pos.x.abs() > limit || pos.z.abs() > limit || pos.y < config.respawn.fall_threshold
}

/// Sphere at `point` with `radius` touches the body's vertical capsule.
pub fn capsule_contains(center: Vec3, body: &EntityConfig, point: Vec3, radius: f32) -> bool {
    let r = body.player_size;
    let half_segment = (body.half_height() - r).max(0.0);
    let a = center - Vec3::Y * half_segment;
    let b = center + Vec3::Y * half_segment;
    point_segment_distance(point, a, b) <= r + radius
}

fn point_segment_distance(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Time for a shell at `origin` with `velocity` to descend to `target_y`.
fn flight_time_to(origin: Vec3, velocity: Vec3, gravity: f32, target_y: f32) -> f32 {
    // origin.y + vy t - g t^2 / 2 = target_y
    let a = 0.5 * gravity;
    let b = -velocity.y;
    let c = target_y - origin.y;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 || a <= 0.0 {
        return 0.0;
    }
    ((-b + disc.sqrt()) / (2.0 * a)).max(0.0)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::game::collision::{Aabb, ArenaCollider};
    use crate::game::state::{EntityRole, GameMode};
    use proptest::prelude::*;

    const DT: f32 = 1.0 / 60.0;

    fn setup() -> (World, CoreConfig, ArenaCollider) {
        let config = CoreConfig::default();
        let mut world = World::new(3, GameMode::Deathmatch, 1.2);
        world.spawn(Entity::new(
            EntityId::local(),
            EntityRole::LocalPlayer,
            CharacterKind::Lucy,
            Vec3::new(0.0, 1.0, 0.0),
            &config,
        ));
        (world, config, ArenaCollider::new(20.0))
    }

    fn spawn_bot(world: &mut World, config: &CoreConfig, kind: CharacterKind, pos: Vec3) -> EntityId {
        let id = world.next_bot_id();
        let mut bot = Entity::new(id.clone(), EntityRole::Bot, kind, pos, config);
        bot.grounded = true;
        world.spawn(bot);
        id
    }

    fn run(
        system: &mut ProjectileSystem,
        world: &mut World,
        collider: &ArenaCollider,
        poison: &mut PoisonLedger,
        config: &CoreConfig,
        seconds: f32,
    ) {
        let steps = (seconds / DT).round() as usize;
        for _ in 0..steps {
            world.time += DT as f64;
            system.update(DT, world, collider, poison, config);
        }
    }

    #[test]
    fn test_vibration_falloff() {
        assert_eq!(explosion_vibration(0.0, 20.0), Some(1.0));
        let mid = explosion_vibration(10.0, 20.0).unwrap();
        assert!((mid - (1.0 - 0.5f32.powi(5))).abs() < 1e-6);
        // 1 - 0.9^5 = 0.41, 1 - 0.95^5 = 0.23
        assert!(explosion_vibration(18.0, 20.0).is_some());
        assert!(explosion_vibration(19.0, 20.0).is_none());
    }

    #[test]
    fn test_bolt_hits_and_damages() {
        let (mut world, config, collider) = setup();
        let bot = spawn_bot(&mut world, &config, CharacterKind::Lucy, Vec3::new(4.0, 1.0, 0.0));
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        let bolt = &config.lucy.bolt;

        let id = system.create_bolt(
            &mut world,
            &EntityId::local(),
            BoltRequest::aimed(Vec3::new(0.0, 1.0, 0.0), Vec3::X, None, bolt),
            bolt,
        );
        assert!(id.is_some());
        assert!(!ProjectileSystem::can_shoot(&world, &EntityId::local()));

        run(&mut system, &mut world, &collider, &mut poison, &config, 0.5);
        assert!(system.is_empty());
        assert_eq!(world.get(&bot).map(|b| b.health), Some(75.0));
    }

    #[test]
    fn test_bolt_stopped_by_wall() {
        let (mut world, config, _) = setup();
        let collider = ArenaCollider::new(20.0).with_wall(Aabb::new(Vec3::new(2.0, 0.0, -2.0), Vec3::new(2.5, 4.0, 2.0)));
        let bot = spawn_bot(&mut world, &config, CharacterKind::Lucy, Vec3::new(4.0, 1.0, 0.0));
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        let bolt = &config.lucy.bolt;
        system.create_bolt(
            &mut world,
            &EntityId::local(),
            BoltRequest::aimed(Vec3::new(0.0, 1.0, 0.0), Vec3::X, None, bolt),
            bolt,
        );
        run(&mut system, &mut world, &collider, &mut poison, &config, 0.5);
        assert!(system.is_empty());
        assert_eq!(world.get(&bot).map(|b| b.health), Some(100.0));
    }

    #[test]
    fn test_magazine_empties_into_reload() {
        let (mut world, config, _) = setup();
        let mut system = ProjectileSystem::new();
        let bolt = &config.lucy.bolt;
        for _ in 0..bolt.magazine_size {
            if let Some(e) = world.local_mut() {
                e.cooldowns.bolt = 0.0;
            }
            assert!(system
                .create_bolt(&mut world, &EntityId::local(), BoltRequest::aimed(Vec3::Y, Vec3::X, None, bolt), bolt)
                .is_some());
        }
        let local = world.local().unwrap();
        assert!(local.ammo.reloading);
        assert!(local.cooldowns.reload > 0.0);
        // Forced bolts ignore the magazine
        let mut forced = BoltRequest::aimed(Vec3::Y, Vec3::Z, None, bolt);
        forced.force = true;
        assert!(system.create_bolt(&mut world, &EntityId::local(), forced, bolt).is_some());
    }

    #[test]
    fn test_mortar_lands_on_target() {
        let (_, config, collider) = setup();
        let params = &config.lucy.mortar;
        let origin = Vec3::new(0.0, 1.0, 0.0);
        let launch = solve_mortar_launch(origin, Some(Vec3::new(6.0, 0.0, 0.0)), Vec3::Z, params, &collider);
        let landing = launch.position_at(origin, launch.flight_time);
        assert!((landing - Vec3::new(6.0, 0.0, 0.0)).length() < 1e-3);
    }

    #[test]
    fn test_mortar_range_clamp_and_tiny_offset() {
        let (_, config, collider) = setup();
        let params = &config.lucy.mortar;
        let origin = Vec3::new(0.0, 1.0, 0.0);
        let far = solve_mortar_launch(origin, Some(Vec3::new(100.0, 0.0, 0.0)), Vec3::Z, params, &collider);
        assert!((distance_xz(origin, far.target) - params.max_range).abs() < 1e-3);

        let near = solve_mortar_launch(origin, Some(origin), Vec3::Z, params, &collider);
        assert!((distance_xz(origin, near.target) - params.min_range).abs() < 1e-3);
        assert!(near.target.z > 0.0);

        let up = solve_mortar_launch(origin, None, Vec3::Z, params, &collider);
        assert_eq!(up.target, origin);
        assert!(up.velocity.x == 0.0 && up.velocity.z == 0.0 && up.velocity.y > 0.0);
    }

    #[test]
    fn test_preview_truncated_by_wall() {
        let (_, config, _) = setup();
        let params = &config.lucy.mortar;
        let open = ArenaCollider::new(20.0);
        let walled = ArenaCollider::new(20.0).with_wall(Aabb::new(Vec3::new(3.0, 0.0, -3.0), Vec3::new(3.5, 20.0, 3.0)));
        let origin = Vec3::new(0.0, 1.0, 0.0);
        let target = Some(Vec3::new(8.0, 0.0, 0.0));
        let full = preview_trajectory(origin, target, Vec3::Z, params, &open);
        let cut = preview_trajectory(origin, target, Vec3::Z, params, &walled);
        assert_eq!(full.len(), PREVIEW_SAMPLES + 1);
        assert!(cut.len() < full.len());
        assert!(cut.iter().all(|p| p.x < 3.0));
    }

    #[test]
    fn test_mortar_explodes_into_splash() {
        let (mut world, config, collider) = setup();
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        system.create_mortar(&mut world, &EntityId::local(), Some(Vec3::new(6.0, 0.0, 0.0)), &config.lucy.mortar, &collider);
        assert!(!ProjectileSystem::can_shoot_mortar(&world, &EntityId::local()));
        run(&mut system, &mut world, &collider, &mut poison, &config, 2.0);
        assert!(system.is_empty());
        assert_eq!(system.splashes().len(), 1);
        let events = world.take_events();
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::MortarExploded { .. })));
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::Vibration { .. })));
    }

    #[test]
    fn test_splash_ticks_and_poisons_on_touch() {
        let (mut world, config, collider) = setup();
        let bot = spawn_bot(&mut world, &config, CharacterKind::Herald, Vec3::new(2.5, 1.0, 0.0));
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        let splash = SplashParams::from(&config.lucy.mortar);
        system.create_splash(Vec3::new(2.0, 0.0, 0.0), &EntityId::local(), CharacterKind::Lucy, &splash, world.time);

        system.update(0.0, &mut world, &collider, &mut poison, &config);
        assert_eq!(world.get(&bot).map(|b| b.health), Some(95.0));
        assert!(poison.contains(&bot));
        assert_eq!(world.get(&bot).and_then(|b| b.poison_speed_multiplier), Some(0.6));

        // The touch paid for the first interval
        run(&mut system, &mut world, &collider, &mut poison, &config, 0.95);
        assert_eq!(world.get(&bot).map(|b| b.health), Some(95.0));
        run(&mut system, &mut world, &collider, &mut poison, &config, 0.15);
        assert_eq!(world.get(&bot).map(|b| b.health), Some(90.0));
        assert_eq!(system.splash_hits_against(world.get(&bot).unwrap(), &config.entity).len(), 1);
    }

    #[test]
    fn test_splash_stay_charges_whole_intervals() {
        let due = |stay: f32| SplashExposure { stay, charged: 0 }.ticks_due(0.5);
        assert_eq!(due(0.0), 1);
        assert_eq!(due(0.9), 1);
        assert_eq!(due(1.1), 2);
        assert_eq!(due(1.5), 3);
        assert_eq!(SplashExposure::default().ticks_due(0.0), 1);

        let mut stay = SplashExposure::default();
        for _ in 0..60 {
            stay.stay += DT;
        }
        assert_eq!(stay.ticks_due(0.5), 2);
    }

    #[test]
    fn test_splash_stay_survives_leaving_and_returning() {
        let (mut world, config, collider) = setup();
        let bot = spawn_bot(&mut world, &config, CharacterKind::Herald, Vec3::new(2.5, 1.0, 0.0));
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        let splash = SplashParams::from(&config.herald.mortar);
        system.create_splash(Vec3::new(2.0, 0.0, 0.0), &EntityId::local(), CharacterKind::Herald, &splash, world.time);

        run(&mut system, &mut world, &collider, &mut poison, &config, 0.6);
        let touched = world.get(&bot).map(|b| b.health).unwrap_or_default();
        assert_eq!(touched, 100.0 - splash.damage_per_tick);

        // Time outside does not count toward the next tick
        if let Some(b) = world.get_mut(&bot) {
            b.position.x = 9.0;
        }
        run(&mut system, &mut world, &collider, &mut poison, &config, 0.6);
        if let Some(b) = world.get_mut(&bot) {
            b.position.x = 2.5;
        }
        run(&mut system, &mut world, &collider, &mut poison, &config, 0.3);
        assert_eq!(world.get(&bot).map(|b| b.health), Some(touched));
        run(&mut system, &mut world, &collider, &mut poison, &config, 0.2);
        assert_eq!(world.get(&bot).map(|b| b.health), Some(touched - splash.damage_per_tick));
    }

    #[test]
    fn test_splash_expires() {
        let (mut world, config, collider) = setup();
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        let splash = SplashParams::from(&config.herald.mortar);
        system.create_splash(Vec3::new(5.0, 0.0, 5.0), &EntityId::local(), CharacterKind::Herald, &splash, world.time);
        run(&mut system, &mut world, &collider, &mut poison, &config, splash.duration + 0.1);
        assert!(system.splashes().is_empty());
    }

    #[test]
    fn test_remote_projectile_is_visual_only() {
        let (mut world, config, collider) = setup();
        let mut system = ProjectileSystem::new();
        let mut poison = PoisonLedger::new();
        let id = NetworkId("peer-1:1".into());
        let remote = RemoteProjectile {
            network_id: id.clone(),
            kind: ProjectileKind::Bolt,
            owner: EntityId::remote("peer-1"),
            character: CharacterKind::Lucy,
            origin: Vec3::new(-4.0, 1.0, 0.0),
            velocity: Vec3::X * 20.0,
            target: None,
            damage: 25.0,
        };
        assert!(system.create_remote(remote.clone(), &config, 0.0));
        assert!(!system.create_remote(remote, &config, 0.0));

        system
            .apply_remote_update(&id, Vec3::new(-3.0, 1.0, 0.0), Vec3::X * 20.0)
            .unwrap();
        assert!(matches!(
            system.apply_remote_update(&NetworkId("nope".into()), Vec3::ZERO, Vec3::ZERO),
            Err(ProtocolError::UnknownProjectile(_))
        ));

        run(&mut system, &mut world, &collider, &mut poison, &config, 0.5);
        assert_eq!(world.local().map(|e| e.health), Some(100.0));
        assert!(system.take_due_updates(1.0, 0.1).is_empty());
    }

    #[test]
    fn test_cooldown_api() {
        let (mut world, config, _) = setup();
        ProjectileSystem::set_melee_cooldown(&mut world, &EntityId::local(), 1.0).unwrap();
        ProjectileSystem::set_special_ability_cooldown(&mut world, &EntityId::local(), 2.0).unwrap();
        assert!(ProjectileSystem::set_melee_cooldown(&mut world, &EntityId::bot(9), 1.0).is_err());
        let local = world.local().unwrap();
        assert_eq!((local.cooldowns.melee, local.cooldowns.special), (1.0, 2.0));
        let info = ProjectileSystem::mortar_cooldown_info(&world, &EntityId::local(), &config).unwrap();
        assert!(info.ready);
        assert_eq!(info.total, config.lucy.mortar.cooldown);
    }

    #[test]
    fn test_homing_turn_is_limited() {
        let mut p = Projectile {
            network_id: NetworkId("x".into()),
            kind: ProjectileKind::Bolt,
            owner: EntityId::local(),
            character: CharacterKind::Lucy,
            position: Vec3::ZERO,
            velocity: Vec3::Z * 20.0,
            target_xz: Some(Vec3::new(10.0, 0.0, 0.0)),
            damage: 0.0,
            created_at: 0.0,
            age: 0.0,
            lifetime: 2.0,
            radius: 0.2,
            homing_turn_rate: 1.5,
            remote_owned: false,
            mortar: None,
            since_update: 0.0,
        };
        steer_toward(&mut p, Vec3::new(10.0, 0.0, 0.0), 0.1);
        let yaw = yaw_of(p.velocity);
        assert!((yaw - 0.15).abs() < 1e-4);
        assert!((p.velocity.length() - 20.0).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn prop_projectile_positions_stay_finite(
            dx in -1.0f32..1.0, dz in -1.0f32..1.0, steps in 1usize..120
        ) {
            let (mut world, config, collider) = setup();
            let mut system = ProjectileSystem::new();
            let mut poison = PoisonLedger::new();
            let bolt = config.lucy.bolt.clone();
            let mut req = BoltRequest::aimed(Vec3::new(0.0, 1.0, 0.0), Vec3::new(dx, 0.0, dz), Some(Vec3::new(3.0, 0.0, 3.0)), &bolt);
            req.force = true;
            system.create_bolt(&mut world, &EntityId::local(), req, &bolt);
            system.create_mortar(&mut world, &EntityId::local(), Some(Vec3::new(dx * 10.0, 0.0, dz * 10.0)), &config.lucy.mortar, &collider);
            for _ in 0..steps {
                world.time += DT as f64;
                system.update(DT, &mut world, &collider, &mut poison, &config);
                for p in system.projectiles() {
                    prop_assert!(is_finite_vec3(p.position));
                }
            }
        }
    }
}
