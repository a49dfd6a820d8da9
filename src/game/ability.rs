//! Character Abilities
//!
//! Every action an entity can take besides moving: bolts, mortars, the
//! sword swing, the character special (blast or bolt ring), heal, reload,
//! swap and speed boost. The local player drives these from an
//! [`InputSnapshot`]; bots call the same entry points directly.
//!
//! Cooldowns live on the entity and only tick down in [`AbilitySystem::update`].

use std::collections::{BTreeMap, BTreeSet};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::character;
use super::collision::{has_line_of_sight, CollisionProvider, DEFAULT_BLOCKAGE_THRESHOLD};
use super::effects::{apply_poison, update_poison, PoisonLedger};
use super::events::{AbilityKind, DamageSource, GameEventData, VibrationPattern};
use super::input::{InputMode, InputRouter, InputSnapshot};
use super::projectile::{preview_trajectory, BoltRequest, NetworkId, ProjectileSystem};
use super::push::PushLedger;
use super::render::VisualTimers;
use super::state::{CharacterKind, CooldownSlot, EntityId, EntityRole, KnockbackParams, World};
use crate::config::{BlastConfig, CoreConfig, HealConfig, MeleeConfig, SpecialAbility};
use crate::core::math::{direction_xz, rotate_y};

/// Probe radius for sword line-of-sight.
const MELEE_SIGHT_RADIUS: f32 = 0.2;

/// Everything an ability touches during one evaluation.
pub struct AbilityContext<'a> {
    /// Entities and event queue
    pub world: &'a mut World,
    /// Projectile owner
    pub projectiles: &'a mut ProjectileSystem,
    /// Poison records
    pub poison: &'a mut PoisonLedger,
    /// Push attribution
    pub pushes: &'a mut PushLedger,
    /// Core-owned visuals
    pub visuals: &'a mut VisualTimers,
    /// Walls and floors
    pub collider: &'a dyn CollisionProvider,
    /// Tuning
    pub config: &'a CoreConfig,
}

/// Aim supplied with a shot.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aim {
    /// Unit XZ direction
    pub direction: Option<Vec3>,
    /// Ground point under the cursor (keyboard)
    pub target: Option<Vec3>,
    /// Stick deflection, 1.0 for mouse aim
    pub magnitude: f32,
}

impl Aim {
    /// Aim from the input snapshot.
    pub fn from_snapshot(snapshot: &InputSnapshot) -> Self {
        Self {
            direction: snapshot.aim_world_dir,
            target: match snapshot.mode {
                InputMode::Keyboard => snapshot.aim_target,
                InputMode::Controller => None,
            },
            magnitude: snapshot.aim_magnitude,
        }
    }

    /// Aim at a point (bots).
    pub fn at(from: Vec3, target: Vec3) -> Self {
        Self {
            direction: direction_xz(from, target),
            target: Some(target),
            magnitude: 1.0,
        }
    }
}

/// Heal rate after holding for `hold` seconds.
///
/// `base_rate · min(max_multiplier, 1 + ⌊hold / ramp_step⌋ · ramp_bonus)`
pub fn heal_rate(params: &HealConfig, hold: f32) -> f32 {
    let steps = if params.ramp_step > 0.0 { (hold / params.ramp_step).floor() } else { 0.0 };
    params.base_rate * (1.0 + steps * params.ramp_bonus).min(params.max_multiplier)
}

/// An active sword swing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeleeSwing {
    /// Character the swing was started with
    pub character: CharacterKind,
    /// Seconds left in the animation
    pub remaining: f32,
    /// Seconds toward the next damage tick
    pub tick_timer: f32,
    /// Everyone damaged by this swing
    pub hit: BTreeSet<EntityId>,
    /// Swing parameters
    pub params: MeleeConfig,
}

// =============================================================================
// SYSTEM
// =============================================================================

/// Per-entity ability state not stored on the entity.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AbilitySystem {
    swings: BTreeMap<EntityId, MeleeSwing>,
    heal_holds: BTreeMap<EntityId, f32>,
    /// (pusher, target) → seconds until the target can be pulsed again
    pulse_cooldowns: BTreeMap<(EntityId, EntityId), f32>,
    sprint_gate: bool,
}

impl AbilitySystem {
    /// Empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Entity is mid-swing.
    pub fn is_swinging(&self, id: &EntityId) -> bool {
        self.swings.contains_key(id)
    }

    /// Swing state.
    pub fn swing(&self, id: &EntityId) -> Option<&MeleeSwing> {
        self.swings.get(id)
    }

    /// Local Herald sprint gate active this tick.
    pub fn sprint_gate_active(&self) -> bool {
        self.sprint_gate
    }

    /// Seconds the heal has been held.
    pub fn heal_hold(&self, id: &EntityId) -> f32 {
        self.heal_holds.get(id).copied().unwrap_or(0.0)
    }

    /// Cancel in-flight states for an entity (death, swap).
    pub fn cancel_for(&mut self, id: &EntityId) {
        self.swings.remove(id);
        self.heal_holds.remove(id);
        self.pulse_cooldowns.retain(|(pusher, _), _| pusher != id);
    }

    /// Drop all state (mode change).
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    // -------------------------------------------------------------------------
    // Projectiles
    // -------------------------------------------------------------------------

    /// Fire one bolt along the aim, or along the facing without aim.
    pub fn shoot_bolt(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId, aim: Aim) -> Option<NetworkId> {
        let entity = ctx.world.get(id)?;
        let params = &ctx.config.profile(entity.character).bolt;
        let origin = entity.position;
        let character = entity.character;
        let (direction, target) = match aim.direction {
            Some(dir) => (dir, Some(aim.target.unwrap_or(origin + dir * params.nominal_distance))),
            None => (entity.facing.to_direction(), None),
        };

        let request = BoltRequest::aimed(origin, direction, target, params);
        let network_id = ctx.projectiles.create_bolt(ctx.world, id, request, params)?;
        ctx.world.push_event(GameEventData::AbilityUsed {
            id: id.clone(),
            ability: AbilityKind::Bolt,
            character,
            position: origin,
            radius: 0.0,
            duration: 0.0,
        });
        Some(network_id)
    }

    /// Mortar landing point for an aim.
    ///
    /// Mouse aim lands on the cursor; stick aim scales between the min and
    /// max range by deflection; no aim lands mid-range along the facing.
    pub fn mortar_target(ctx: &AbilityContext<'_>, id: &EntityId, aim: Aim) -> Option<Vec3> {
        let entity = ctx.world.get(id)?;
        let params = &ctx.config.profile(entity.character).mortar;
        if let Some(target) = aim.target {
            return Some(target);
        }
        let (dir, reach) = match aim.direction {
            Some(dir) => (
                dir,
                params.min_range + (params.max_range - params.min_range) * aim.magnitude.clamp(0.0, 1.0),
            ),
            None => (entity.facing.to_direction(), 0.5 * (params.min_range + params.max_range)),
        };
        Some(entity.position + dir * reach)
    }

    /// Launch a mortar toward `target`.
    pub fn launch_mortar(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId, target: Option<Vec3>) -> Option<NetworkId> {
        let entity = ctx.world.get(id)?;
        let character = entity.character;
        let origin = entity.position;
        let params = &ctx.config.profile(character).mortar;
        let network_id = ctx.projectiles.create_mortar(ctx.world, id, target, params, ctx.collider)?;
        ctx.world.push_event(GameEventData::AbilityUsed {
            id: id.clone(),
            ability: AbilityKind::Mortar,
            character,
            position: origin,
            radius: params.splash_radius,
            duration: params.splash_duration,
        });
        Some(network_id)
    }

    /// Ring of forced bolts around the caster.
    pub fn multi_shot(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId) -> usize {
        let Some(entity) = ctx.world.get(id) else {
            return 0;
        };
        if !entity.is_alive() {
            return 0;
        }
        let profile = ctx.config.profile(entity.character);
        let melee = &profile.melee;
        let bolt = &profile.bolt;
        let count = melee.projectile_count.unwrap_or(8).max(1);
        let speed = melee.projectile_speed.unwrap_or(bolt.speed);
        let damage = melee.projectile_damage.unwrap_or(bolt.damage);
        let origin = entity.position;
        let base = entity.facing.to_direction();

        let mut fired = 0;
        for i in 0..count {
            let angle = std::f32::consts::TAU * i as f32 / count as f32;
            let request = BoltRequest {
                origin,
                direction: rotate_y(base, angle),
                target: None,
                speed,
                damage,
                force: true,
            };
            if ctx.projectiles.create_bolt(ctx.world, id, request, bolt).is_some() {
                fired += 1;
            }
        }
        fired
    }

    // -------------------------------------------------------------------------
    // Melee
    // -------------------------------------------------------------------------

    /// Start a sword swing: initial damage, knockback and push records now,
    /// ticks for the rest of the animation, poison at the end.
    pub fn swing_melee(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId) -> bool {
        if self.swings.contains_key(id) {
            return false;
        }
        let Some(entity) = ctx.world.get(id) else {
            return false;
        };
        if !entity.is_alive() || !entity.cooldowns.ready(CooldownSlot::Melee) {
            return false;
        }
        let character = entity.character;
        let center = entity.position;
        let params = ctx.config.profile(character).melee.clone();

        let victims = melee_victims(ctx, id, center, params.range);
        let mut hit = BTreeSet::new();
        for (victim, distance) in victims {
            ctx.world.apply_damage(&victim, params.initial_damage, DamageSource::Melee, Some(id));
            let falloff = (1.0 - distance / params.range).clamp(0.0, 1.0);
            let dir = outward(ctx, id, center, &victim);
            knock_back(
                ctx,
                id,
                &victim,
                dir * (params.horizontal_velocity * falloff),
                params.vertical_velocity,
                KnockbackParams { decay: params.velocity_decay, ..KnockbackParams::from_body(&ctx.config.entity) },
            );
            hit.insert(victim);
        }
        if !hit.is_empty() {
            ctx.world.push_event(GameEventData::Vibration {
                pattern: VibrationPattern::MeleeHit,
                intensity: 0.6,
            });
        }

        if let Some(e) = ctx.world.get_mut(id) {
            e.cooldowns.set(CooldownSlot::Melee, params.cooldown);
        }
        ctx.visuals
            .add_sword_circle(id, center, params.range, character.color(), params.animation_duration);
        ctx.world.push_event(GameEventData::AbilityUsed {
            id: id.clone(),
            ability: AbilityKind::Melee,
            character,
            position: center,
            radius: params.range,
            duration: params.animation_duration,
        });
        debug!(id = %id, hits = hit.len(), "melee swing");
        self.swings.insert(
            id.clone(),
            MeleeSwing {
                character,
                remaining: params.animation_duration,
                tick_timer: 0.0,
                hit,
                params,
            },
        );
        true
    }

    fn update_swings(&mut self, ctx: &mut AbilityContext<'_>, dt: f32) {
        let owners: Vec<EntityId> = self.swings.keys().cloned().collect();
        for owner in owners {
            let Some(center) = ctx.world.get(&owner).filter(|e| e.is_alive()).map(|e| e.position) else {
                self.swings.remove(&owner);
                ctx.visuals.cancel_for(&owner);
                continue;
            };
            let Some(mut swing) = self.swings.remove(&owner) else {
                continue;
            };

            swing.tick_timer += dt;
            let interval = swing.params.tick_interval.max(f32::EPSILON);
            while swing.tick_timer >= interval {
                swing.tick_timer -= interval;
                for (victim, _) in melee_victims(ctx, &owner, center, swing.params.range) {
                    trace!(owner = %owner, victim = %victim, "melee tick");
                    ctx.world
                        .apply_damage(&victim, swing.params.damage, DamageSource::Melee, Some(&owner));
                    swing.hit.insert(victim);
                }
            }

            swing.remaining -= dt;
            if swing.remaining > 0.0 {
                self.swings.insert(owner, swing);
                continue;
            }
            if let Some(poison) = swing.params.poison() {
                for victim in &swing.hit {
                    apply_poison(ctx.world, ctx.poison, victim, &poison, Some(&owner));
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Specials
    // -------------------------------------------------------------------------

    /// Fire the character special if its cooldown is clear.
    pub fn cast_special(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId) -> bool {
        let Some(entity) = ctx.world.get(id) else {
            return false;
        };
        if !entity.is_alive() || !entity.cooldowns.ready(CooldownSlot::Special) {
            return false;
        }
        let character = entity.character;
        let position = entity.position;
        let special = ctx.config.profile(character).special.clone();

        let (ability, radius, duration) = match &special {
            SpecialAbility::MultiShot { .. } => {
                self.multi_shot(ctx, id);
                (AbilityKind::MultiShot, 0.0, 0.0)
            }
            SpecialAbility::Blast(blast) => {
                self.blast(ctx, id, blast);
                (AbilityKind::Blast, blast.radius, blast.animation_duration)
            }
        };
        if let Some(e) = ctx.world.get_mut(id) {
            e.cooldowns.set(CooldownSlot::Special, special.cooldown());
        }
        ctx.world.push_event(GameEventData::AbilityUsed {
            id: id.clone(),
            ability,
            character,
            position,
            radius,
            duration,
        });
        true
    }

    /// Radial knockback. No damage. Returns the entities pushed.
    pub fn blast(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId, params: &BlastConfig) -> Vec<EntityId> {
        let Some(center) = ctx.world.get(id).map(|e| e.position) else {
            return Vec::new();
        };
        let mut pushed = Vec::new();
        for (victim, distance) in ctx.world.targets_within(center, params.radius, id) {
            let falloff = (1.0 - distance / params.radius).clamp(0.0, 1.0);
            let dir = outward(ctx, id, center, &victim);
            let moved = knock_back(
                ctx,
                id,
                &victim,
                dir * (params.horizontal_velocity * falloff),
                params.vertical_velocity,
                KnockbackParams {
                    restitution: params.bounce_restitution,
                    min_velocity: params.min_bounce_velocity,
                    ..KnockbackParams::from_body(&ctx.config.entity)
                },
            );
            if moved {
                pushed.push(victim);
            }
        }
        ctx.visuals.add_blast_ring(center, params.radius, params.animation_duration);
        debug!(id = %id, pushed = pushed.len(), "blast");
        pushed
    }

    /// Herald sprint: knock nearby bodies aside, once per target per
    /// `per_target_cooldown`. Bodies inside `min_radius` are pushed along
    /// the sprinter's facing.
    pub fn sprint_pulse(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId) -> usize {
        let Some(entity) = ctx.world.get(id) else {
            return 0;
        };
        let Some(params) = ctx.config.profile(entity.character).sprint.clone() else {
            return 0;
        };
        let center = entity.position;
        let character = entity.character;
        let heading = entity.facing.to_direction();
        let mut pulsed = 0;
        for (victim, distance) in ctx.world.targets_within(center, params.radius, id) {
            let key = (id.clone(), victim.clone());
            if self.pulse_cooldowns.get(&key).is_some_and(|t| *t > 0.0) {
                continue;
            }
            let direction = if distance < params.min_radius { heading } else { outward(ctx, id, center, &victim) };
            let falloff = (1.0 - distance.max(params.min_radius) / params.radius).clamp(0.0, 1.0);
            let velocity = direction * (params.horizontal_velocity * falloff);
            let push = KnockbackParams::from_body(&ctx.config.entity);
            if knock_back(ctx, id, &victim, velocity, params.vertical_velocity, push) {
                self.pulse_cooldowns.insert(key, params.per_target_cooldown);
                pulsed += 1;
            }
        }
        if pulsed > 0 {
            ctx.world.push_event(GameEventData::AbilityUsed {
                id: id.clone(),
                ability: AbilityKind::SprintPulse,
                character,
                position: center,
                radius: params.radius,
                duration: 0.0,
            });
        }
        pulsed
    }

    // -------------------------------------------------------------------------
    // Heal / reload / swap / boost
    // -------------------------------------------------------------------------

    /// Hold-ramped heal. Returns the health restored this step.
    pub fn heal(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId, held: bool, dt: f32) -> f32 {
        let Some(entity) = ctx.world.get_mut(id) else {
            return 0.0;
        };
        let params = &ctx.config.profile(entity.character).heal;
        if !held || !entity.is_alive() {
            if self.heal_holds.remove(id).is_some_and(|h| h > 0.0) {
                entity.cooldowns.set(CooldownSlot::Heal, params.cooldown);
            }
            return 0.0;
        }
        if !entity.cooldowns.ready(CooldownSlot::Heal) || entity.health >= entity.max_health {
            return 0.0;
        }

        let hold = self.heal_holds.entry(id.clone()).or_insert(0.0);
        *hold += dt;
        let amount = heal_rate(params, *hold) * dt;
        let before = entity.health;
        character::set_health(entity, before + amount);
        let restored = entity.health - before;
        let health = entity.health;
        let position = entity.position;
        if restored > 0.0 {
            ctx.world.push_event(GameEventData::Healed {
                id: id.clone(),
                amount: restored,
                health,
                position,
            });
        }
        restored
    }

    /// Start a manual reload. False when full or already reloading.
    pub fn reload(ctx: &mut AbilityContext<'_>, id: &EntityId) -> bool {
        let Some(entity) = ctx.world.get_mut(id) else {
            return false;
        };
        if !entity.is_alive() || entity.ammo.reloading || entity.ammo.loaded >= entity.ammo.capacity {
            return false;
        }
        let profile = ctx.config.profile(entity.character);
        entity.ammo.reloading = true;
        entity.cooldowns.set(CooldownSlot::Reload, profile.bolt.reload_time);
        let (character, position) = (entity.character, entity.position);
        ctx.world.push_event(GameEventData::AbilityUsed {
            id: id.clone(),
            ability: AbilityKind::Reload,
            character,
            position,
            radius: 0.0,
            duration: profile.bolt.reload_time,
        });
        true
    }

    /// Toggle between the two characters.
    pub fn swap_character(&mut self, ctx: &mut AbilityContext<'_>, id: &EntityId) -> bool {
        let Some(entity) = ctx.world.get_mut(id) else {
            return false;
        };
        if !entity.is_alive() {
            return false;
        }
        let from = entity.character;
        let to = from.other();
        entity.apply_profile(to, ctx.config.profile(to));
        let position = entity.position;
        self.cancel_for(id);
        ctx.visuals.cancel_for(id);
        debug!(id = %id, ?from, ?to, "character swapped");
        ctx.world.push_event(GameEventData::CharacterSwapped {
            id: id.clone(),
            from,
            to,
            position,
        });
        true
    }

    /// Start the speed boost.
    pub fn speed_boost(ctx: &mut AbilityContext<'_>, id: &EntityId) -> bool {
        let Some(entity) = ctx.world.get_mut(id) else {
            return false;
        };
        if !entity.is_alive() || !entity.cooldowns.ready(CooldownSlot::SpeedBoost) {
            return false;
        }
        let params = &ctx.config.profile(entity.character).speed_boost;
        entity.speed_boost_timer = params.duration;
        entity.speed_boost_multiplier = params.multiplier;
        entity.cooldowns.set(CooldownSlot::SpeedBoost, params.cooldown);
        let (character, position) = (entity.character, entity.position);
        ctx.world.push_event(GameEventData::AbilityUsed {
            id: id.clone(),
            ability: AbilityKind::SpeedBoost,
            character,
            position,
            radius: 0.0,
            duration: params.duration,
        });
        true
    }

    // -------------------------------------------------------------------------
    // Per-tick
    // -------------------------------------------------------------------------

    /// Cooldowns, reloads, boosts, swings, pulse timers and poison.
    pub fn update(&mut self, ctx: &mut AbilityContext<'_>, dt: f32) {
        let mut reloaded = Vec::new();
        for entity in ctx.world.entities.values_mut() {
            if !entity.role.is_simulated() {
                continue;
            }
            entity.cooldowns.tick(dt);
            entity.speed_boost_timer = (entity.speed_boost_timer - dt).max(0.0);
            if entity.ammo.reloading && entity.cooldowns.ready(CooldownSlot::Reload) {
                entity.ammo.refill();
                reloaded.push(entity.id.clone());
            }
        }
        for id in reloaded {
            ctx.world.push_event(GameEventData::Reloaded { id });
        }

        for timer in self.pulse_cooldowns.values_mut() {
            *timer -= dt;
        }
        self.pulse_cooldowns.retain(|_, t| *t > 0.0);

        self.update_swings(ctx, dt);
        update_poison(ctx.world, ctx.poison, dt);
    }

    /// Apply the local player's snapshot.
    pub fn evaluate_local(
        &mut self,
        ctx: &mut AbilityContext<'_>,
        snapshot: &InputSnapshot,
        router: &mut InputRouter,
        dt: f32,
    ) {
        let id = EntityId::local();
        let Some(local) = ctx.world.local() else {
            return;
        };
        if !local.is_alive() {
            router.cancel_mortar_hold();
            ctx.visuals.set_mortar_preview(None);
            self.cancel_for(&id);
            if self.sprint_gate {
                router.set_ability_inputs_blocked(false);
                self.sprint_gate = false;
            }
            return;
        }
        let character = local.character;
        let position = local.position;
        let facing = local.facing.to_direction();
        let combat = ctx.world.mode.is_combat();

        // Herald sprint blocks every other ability and drops a latched mortar.
        // The raw button counts, so a latched mortar cannot hold the gate open.
        let sprinting =
            character == CharacterKind::Herald && ctx.config.profile(character).sprint.is_some() && snapshot.sprint_held;
        if sprinting != self.sprint_gate {
            router.set_ability_inputs_blocked(sprinting);
            self.sprint_gate = sprinting;
        }

        if snapshot.swap_pressed && self.swap_character(ctx, &id) {
            router.cancel_mortar_hold();
            return;
        }

        if sprinting {
            if combat {
                self.sprint_pulse(ctx, &id);
            }
            self.heal(ctx, &id, false, dt);
            ctx.visuals.set_mortar_preview(None);
            return;
        }

        if snapshot.speed_boost_pressed {
            Self::speed_boost(ctx, &id);
        }

        let aim = Aim::from_snapshot(snapshot);
        if combat {
            if snapshot.shoot_held {
                self.shoot_bolt(ctx, &id, aim);
            }
            if snapshot.mortar_release_edge {
                let target = Self::mortar_target(ctx, &id, aim);
                self.launch_mortar(ctx, &id, target);
            }
            if snapshot.sword_pressed {
                self.swing_melee(ctx, &id);
            }
            if snapshot.special_pressed {
                self.cast_special(ctx, &id);
            }
            if snapshot.reload_pressed {
                Self::reload(ctx, &id);
            }
        }

        let preview = if combat && snapshot.preview_held {
            Self::mortar_target(ctx, &id, aim).map(|target| {
                let params = &ctx.config.profile(character).mortar;
                preview_trajectory(position, Some(target), facing, params, ctx.collider)
            })
        } else {
            None
        };
        ctx.visuals.set_mortar_preview(preview);

        self.heal(ctx, &id, snapshot.heal_held, dt);
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Targetable bodies within `range` of `center` with clear line of sight.
fn melee_victims(ctx: &AbilityContext<'_>, attacker: &EntityId, center: Vec3, range: f32) -> Vec<(EntityId, f32)> {
    ctx.world
        .targets_within(center, range, attacker)
        .into_iter()
        .filter(|(victim, _)| {
            ctx.world.get(victim).is_some_and(|e| {
                has_line_of_sight(ctx.collider, center, e.position, MELEE_SIGHT_RADIUS, DEFAULT_BLOCKAGE_THRESHOLD).clear
            })
        })
        .collect()
}

/// Unit XZ direction from `center` to `victim`; the pusher's facing when
/// they overlap.
fn outward(ctx: &AbilityContext<'_>, pusher: &EntityId, center: Vec3, victim: &EntityId) -> Vec3 {
    let fallback = ctx.world.get(pusher).map(|e| e.facing.to_direction()).unwrap_or(Vec3::X);
    ctx.world.outward_from(center, victim, fallback)
}

/// Impose knockback on `victim` and record the push.
///
/// Remote bodies are owned by their peer and never moved here.
fn knock_back(
    ctx: &mut AbilityContext<'_>,
    pusher: &EntityId,
    victim: &EntityId,
    horizontal: Vec3,
    vertical: f32,
    params: KnockbackParams,
) -> bool {
    let Some(entity) = ctx.world.get_mut(victim) else {
        return false;
    };
    if entity.role == EntityRole::RemotePlayer || !entity.is_alive() {
        return false;
    }
    character::apply_knockback(entity, horizontal, vertical, params);
    ctx.pushes.record(victim, pusher, ctx.world.time);
    true
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collision::{Aabb, ArenaCollider};
    use crate::game::input::InputRouter;
    use crate::game::state::{Entity, GameMode};

    struct Rig {
        world: World,
        projectiles: ProjectileSystem,
        poison: PoisonLedger,
        pushes: PushLedger,
        visuals: VisualTimers,
        collider: ArenaCollider,
        config: CoreConfig,
        abilities: AbilitySystem,
    }

    impl Rig {
        fn new(local: CharacterKind) -> Self {
            let config = CoreConfig::default();
            let mut world = World::new(11, GameMode::Deathmatch, 1.2);
            let mut player = Entity::new(EntityId::local(), EntityRole::LocalPlayer, local, Vec3::new(0.0, 1.0, 0.0), &config);
            player.grounded = true;
            world.spawn(player);
            Self {
                world,
                projectiles: ProjectileSystem::new(),
                poison: PoisonLedger::new(),
                pushes: PushLedger::default(),
                visuals: VisualTimers::new(),
                collider: ArenaCollider::new(20.0),
                config,
                abilities: AbilitySystem::new(),
            }
        }

        fn bot(&mut self, kind: CharacterKind, pos: Vec3) -> EntityId {
            let id = self.world.next_bot_id();
            let mut bot = Entity::new(id.clone(), EntityRole::Bot, kind, pos, &self.config);
            bot.grounded = true;
            self.world.spawn(bot);
            id
        }

        fn with<R>(&mut self, f: impl FnOnce(&mut AbilitySystem, &mut AbilityContext<'_>) -> R) -> R {
            let mut ctx = AbilityContext {
                world: &mut self.world,
                projectiles: &mut self.projectiles,
                poison: &mut self.poison,
                pushes: &mut self.pushes,
                visuals: &mut self.visuals,
                collider: &self.collider,
                config: &self.config,
            };
            f(&mut self.abilities, &mut ctx)
        }

        fn health(&self, id: &EntityId) -> f32 {
            self.world.get(id).map(|e| e.health).unwrap_or(-1.0)
        }
    }

    #[test]
    fn test_heal_rate_ramp() {
        let params = HealConfig::default();
        assert_eq!(heal_rate(&params, 0.2), params.base_rate);
        assert_eq!(heal_rate(&params, 0.5), params.base_rate * 1.5);
        assert_eq!(heal_rate(&params, 1.2), params.base_rate * 2.0);
        assert_eq!(heal_rate(&params, 10.0), params.base_rate * params.max_multiplier);
    }

    #[test]
    fn test_melee_initial_ticks_then_poison() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        let bot = rig.bot(CharacterKind::Herald, Vec3::new(1.5, 1.0, 0.0));
        assert!(rig.with(|a, ctx| a.swing_melee(ctx, &EntityId::local())));
        assert_eq!(rig.health(&bot), 90.0);
        assert!(rig.pushes.peek(&bot).is_some());
        assert!(rig.world.get(&bot).unwrap().knockback);
        // Second swing blocked by the active swing and the cooldown
        assert!(!rig.with(|a, ctx| a.swing_melee(ctx, &EntityId::local())));

        // Pin the bot in range for the whole animation
        for _ in 0..40 {
            if let Some(b) = rig.world.get_mut(&bot) {
                b.position = Vec3::new(1.5, 1.0, 0.0);
                b.knockback = false;
                b.velocity = Vec3::ZERO;
            }
            rig.with(|a, ctx| a.update(ctx, 1.0 / 60.0));
        }
        assert!(!rig.abilities.is_swinging(&EntityId::local()));
        // 0.5 s animation with 0.25 s ticks: one or two ticks of 3
        let h = rig.health(&bot);
        assert!(h == 87.0 || h == 84.0, "health {h}");
        assert!(rig.poison.contains(&bot));
        assert_eq!(rig.world.get(&bot).and_then(|b| b.poison_speed_multiplier), Some(0.6));
    }

    #[test]
    fn test_melee_knockback_uses_swing_decay() {
        let decayed_vx = |decay: f32| {
            let mut rig = Rig::new(CharacterKind::Lucy);
            rig.config.lucy.melee.velocity_decay = decay;
            let bot = rig.bot(CharacterKind::Herald, Vec3::new(1.5, 1.0, 0.0));
            rig.with(|a, ctx| a.swing_melee(ctx, &EntityId::local()));
            let body = rig.config.entity.clone();
            let b = rig.world.get_mut(&bot).unwrap();
            assert_eq!(b.knockback_params.decay, decay);
            assert!((b.velocity.x - 2.0).abs() < 1e-5);
            character::decay_knockback(b, 1.0 / 60.0, &body);
            b.velocity.x
        };
        assert!((decayed_vx(0.85) - 1.7).abs() < 1e-5);
        assert!((decayed_vx(0.5) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_melee_blocked_by_wall() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        rig.collider = ArenaCollider::new(20.0).with_wall(Aabb::new(Vec3::new(0.7, 0.0, -3.0), Vec3::new(1.1, 4.0, 3.0)));
        let bot = rig.bot(CharacterKind::Herald, Vec3::new(2.0, 1.0, 0.0));
        rig.with(|a, ctx| a.swing_melee(ctx, &EntityId::local()));
        assert_eq!(rig.health(&bot), 100.0);
    }

    #[test]
    fn test_herald_melee_does_not_poison() {
        let mut rig = Rig::new(CharacterKind::Herald);
        let bot = rig.bot(CharacterKind::Lucy, Vec3::new(1.0, 1.0, 0.0));
        rig.with(|a, ctx| a.swing_melee(ctx, &EntityId::local()));
        for _ in 0..40 {
            rig.with(|a, ctx| a.update(ctx, 1.0 / 60.0));
        }
        assert!(!rig.poison.contains(&bot));
    }

    #[test]
    fn test_blast_velocity_and_no_damage() {
        let mut rig = Rig::new(CharacterKind::Herald);
        let bot = rig.bot(CharacterKind::Lucy, Vec3::new(1.0, 1.0, 0.0));
        rig.world.time = 12.0;
        assert!(rig.with(|a, ctx| a.cast_special(ctx, &EntityId::local())));

        let b = rig.world.get(&bot).unwrap();
        let expected_h = 8.0 * (1.0 - 1.0 / 3.0);
        assert!((b.velocity.x - expected_h).abs() < 1e-5);
        assert!(b.velocity.z.abs() < 1e-6);
        assert_eq!(b.velocity.y, 6.0);
        assert!(b.knockback);
        assert_eq!(b.health, 100.0);
        let record = rig.pushes.peek(&bot).unwrap();
        assert_eq!(record.pusher, EntityId::local());
        assert_eq!(record.timestamp, 12.0);
        assert_eq!(rig.visuals.blast_rings.len(), 1);
        // Cooldown applied
        assert!(!rig.with(|a, ctx| a.cast_special(ctx, &EntityId::local())));
    }

    #[test]
    fn test_multi_shot_ring_ignores_bolt_cooldown() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        if let Some(e) = rig.world.local_mut() {
            e.cooldowns.bolt = 5.0;
        }
        assert!(rig.with(|a, ctx| a.cast_special(ctx, &EntityId::local())));
        assert_eq!(rig.projectiles.len(), 8);
        let speeds: Vec<f32> = rig.projectiles.projectiles().map(|p| p.velocity.length()).collect();
        assert!(speeds.iter().all(|s| (s - 14.0).abs() < 1e-3));
        assert_eq!(rig.world.local().unwrap().ammo.loaded, rig.config.lucy.bolt.magazine_size);
    }

    #[test]
    fn test_heal_clamps_and_sets_cooldown_on_release() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        if let Some(e) = rig.world.local_mut() {
            e.health = 99.0;
        }
        for _ in 0..60 {
            rig.with(|a, ctx| a.heal(ctx, &EntityId::local(), true, 1.0 / 60.0));
        }
        assert_eq!(rig.health(&EntityId::local()), 100.0);
        rig.with(|a, ctx| a.heal(ctx, &EntityId::local(), false, 1.0 / 60.0));
        assert!(rig.world.local().unwrap().cooldowns.heal > 0.0);
        assert_eq!(rig.abilities.heal_hold(&EntityId::local()), 0.0);
    }

    #[test]
    fn test_reload_completes_in_update() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        if let Some(e) = rig.world.local_mut() {
            e.ammo.loaded = 2;
        }
        assert!(rig.with(|_, ctx| AbilitySystem::reload(ctx, &EntityId::local())));
        assert!(!rig.with(|_, ctx| AbilitySystem::reload(ctx, &EntityId::local())));
        for _ in 0..100 {
            rig.with(|a, ctx| a.update(ctx, 1.0 / 60.0));
        }
        let local = rig.world.local().unwrap();
        assert_eq!(local.ammo.loaded, local.ammo.capacity);
        assert!(!local.ammo.reloading);
    }

    #[test]
    fn test_swap_applies_profile() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        if let Some(e) = rig.world.local_mut() {
            e.cooldowns.mortar = 2.0;
            e.ammo.loaded = 1;
        }
        assert!(rig.with(|a, ctx| a.swap_character(ctx, &EntityId::local())));
        let local = rig.world.local().unwrap();
        assert_eq!(local.character, CharacterKind::Herald);
        assert_eq!(local.cooldowns.mortar, 0.0);
        assert_eq!(local.ammo.loaded, rig.config.herald.bolt.magazine_size);
    }

    #[test]
    fn test_speed_boost_multiplies_and_expires() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        assert!(rig.with(|_, ctx| AbilitySystem::speed_boost(ctx, &EntityId::local())));
        assert!((rig.world.local().unwrap().speed_multiplier() - 1.5).abs() < 1e-6);
        assert!(!rig.with(|_, ctx| AbilitySystem::speed_boost(ctx, &EntityId::local())));
        for _ in 0..130 {
            rig.with(|a, ctx| a.update(ctx, 1.0 / 60.0));
        }
        assert_eq!(rig.world.local().unwrap().speed_multiplier(), 1.0);
    }

    #[test]
    fn test_herald_sprint_gate_blocks_and_pulses() {
        let mut rig = Rig::new(CharacterKind::Herald);
        let bot = rig.bot(CharacterKind::Lucy, Vec3::new(1.0, 1.0, 0.0));
        let mut router = InputRouter::new(rig.config.input.clone());
        let snapshot = InputSnapshot {
            running: true,
            sprint_held: true,
            move_vec: glam::Vec2::new(0.0, 1.0),
            shoot_held: true,
            ..InputSnapshot::default()
        };
        rig.with(|a, ctx| a.evaluate_local(ctx, &snapshot, &mut router, 1.0 / 60.0));
        assert!(router.ability_inputs_blocked());
        assert!(rig.projectiles.is_empty());
        assert!(rig.world.get(&bot).unwrap().knockback);
        assert!(rig.pushes.peek(&bot).is_some());

        // Same target is not pulsed again inside the per-target window
        if let Some(b) = rig.world.get_mut(&bot) {
            b.knockback = false;
            b.position = Vec3::new(1.0, 1.0, 0.0);
        }
        rig.with(|a, ctx| a.evaluate_local(ctx, &snapshot, &mut router, 1.0 / 60.0));
        assert!(!rig.world.get(&bot).unwrap().knockback);

        let stop = InputSnapshot::default();
        rig.with(|a, ctx| a.evaluate_local(ctx, &stop, &mut router, 1.0 / 60.0));
        assert!(!router.ability_inputs_blocked());
    }

    #[test]
    fn test_shoot_without_aim_uses_facing() {
        let mut rig = Rig::new(CharacterKind::Lucy);
        if let Some(e) = rig.world.local_mut() {
            e.facing = crate::game::state::Facing::Right;
        }
        let id = rig.with(|a, ctx| a.shoot_bolt(ctx, &EntityId::local(), Aim::default()));
        let p = rig.projectiles.get(&id.unwrap()).unwrap();
        assert!(p.velocity.x > 0.0 && p.velocity.z.abs() < 1e-6);
        assert!(p.target_xz.is_none());
    }
}
