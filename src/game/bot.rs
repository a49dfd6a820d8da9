//! Bot AI
//!
//! Each bot carries a small tactical brain: a state picked from distance
//! to the local player and own health, a direction of travel, and an
//! ability beat. Bots only ever target the local player and are never
//! replicated.
//!
//! Movement is produced here and consumed by the physics step on the next
//! tick; wall hits reported by physics flip the strafe direction.

use std::collections::BTreeMap;
use std::f32::consts::{FRAC_PI_2, PI};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::ability::{AbilityContext, AbilitySystem, Aim};
use super::character::MoveIntent;
use super::projectile::ProjectileSystem;
use super::state::{CharacterKind, CooldownSlot, Entity, EntityId, EntityRole, World};
use crate::config::{CoreConfig, DifficultyConfig, SpecialAbility, Span};
use crate::core::math::{direction_xz, distance_xz, horizontal, rotate_y};
use crate::core::rng::DeterministicRng;

/// Fraction of the preferred distance treated as "at range".
const OPTIMAL_BAND: f32 = 0.2;

/// Share of the learned direction at full learning rate.
const LEARNED_MOVE_WEIGHT: f32 = 0.5;

/// Share of the learned shot interval.
const LEARNED_INTERVAL_WEIGHT: f32 = 0.3;

/// Smoothing of the target velocity estimate used for leading shots.
const LEAD_SMOOTHING: f32 = 0.25;

/// Lead prediction only above this movement intelligence.
const LEAD_THRESHOLD: f32 = 0.5;

/// Tactical state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotState {
    /// Close the distance
    #[default]
    Approach,
    /// Sidestep while correcting range
    Strafe,
    /// Orbit the player
    Circle,
    /// Back away
    Retreat,
    /// Stand still; no abilities
    Idle,
    /// Stand still; abilities allowed
    MovementPause,
}

impl BotState {
    /// Abilities may fire in this state.
    pub fn allows_abilities(self) -> bool {
        !matches!(self, BotState::Idle)
    }

    /// The bot moves in this state.
    pub fn moves(self) -> bool {
        !matches!(self, BotState::Idle | BotState::MovementPause)
    }
}

// =============================================================================
// LEARNING
// =============================================================================

/// What the learner sees of the local player each tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlayerObservation {
    /// Player position
    pub position: Vec3,
    /// Player velocity
    pub velocity: Vec3,
    /// Player fired a bolt this tick
    pub fired: bool,
    /// Simulated time
    pub time: f64,
}

/// Optional collaborator that adapts bots to the player's habits.
pub trait LearningModel: Send {
    /// Record one tick of player behaviour.
    fn observe(&mut self, observation: &PlayerObservation, dt: f32);

    /// Preferred travel direction for a bot at `bot` hunting `player`.
    fn suggest_direction(&self, bot: Vec3, player: Vec3) -> Option<Vec3>;

    /// Preferred seconds between ability beats.
    fn suggest_shoot_interval(&self) -> Option<f32>;
}

/// Built-in learner: decaying histogram of the player's travel direction
/// and a running average of their shot spacing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PatternLearner {
    /// Weight per 45° sector, sector 0 = +Z
    pub direction_bins: [f32; 8],
    /// Average seconds between player shots
    pub shot_interval: Option<f32>,
    last_shot: Option<f64>,
    retention: f32,
    adaptation: f32,
}

impl PatternLearner {
    /// Lead distance along the predicted path.
    const INTERCEPT_DISTANCE: f32 = 2.0;

    /// Learner with the difficulty's retention and adaptation speed.
    pub fn new(difficulty: &DifficultyConfig) -> Self {
        Self {
            direction_bins: [0.0; 8],
            shot_interval: None,
            last_shot: None,
            retention: difficulty.pattern_retention.clamp(0.0, 1.0),
            adaptation: difficulty.adaptation_speed.clamp(0.0, 1.0),
        }
    }

    fn sector(dir: Vec3) -> usize {
        let angle = dir.x.atan2(dir.z).rem_euclid(std::f32::consts::TAU);
        ((angle / (PI / 4.0)).round() as usize) % 8
    }

    fn sector_direction(sector: usize) -> Vec3 {
        rotate_y(Vec3::Z, sector as f32 * PI / 4.0)
    }

    /// Dominant travel direction, if the histogram has any weight.
    pub fn dominant_direction(&self) -> Option<Vec3> {
        let (best, weight) = self
            .direction_bins
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |acc, (i, w)| if *w > acc.1 { (i, *w) } else { acc });
        (weight > 1e-3).then(|| Self::sector_direction(best))
    }
}

impl LearningModel for PatternLearner {
    fn observe(&mut self, observation: &PlayerObservation, dt: f32) {
        let decay = self.retention.powf(dt);
        for w in self.direction_bins.iter_mut() {
            *w *= decay;
        }
        let travel = horizontal(observation.velocity);
        if travel.length_squared() > 0.01 {
            self.direction_bins[Self::sector(travel)] += self.adaptation * dt;
        }

        if observation.fired {
            if let Some(last) = self.last_shot {
                let interval = (observation.time - last) as f32;
                if interval > 0.0 {
                    let avg = self.shot_interval.unwrap_or(interval);
                    self.shot_interval = Some(avg + self.adaptation * (interval - avg));
                }
            }
            self.last_shot = Some(observation.time);
        }
    }

    fn suggest_direction(&self, bot: Vec3, player: Vec3) -> Option<Vec3> {
        let heading = self.dominant_direction()?;
        direction_xz(bot, player + heading * Self::INTERCEPT_DISTANCE)
    }

    fn suggest_shoot_interval(&self) -> Option<f32> {
        self.shot_interval
    }
}

// =============================================================================
// BRAIN
// =============================================================================

/// Per-bot tactical memory.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct BotBrain {
    /// Current state
    pub state: BotState,
    /// Seconds until the next behaviour rotation
    pub state_timer: f32,
    /// Health-triggered retreat in progress
    pub fleeing: bool,
    /// Strafe/circle tie-break (+1 or -1)
    pub strafe_sign: f32,
    /// Seconds until the next tactical re-evaluation
    pub reaction_timer: f32,
    /// Seconds until the next ability beat
    pub beat_timer: f32,
    /// Bolts left in the current burst
    pub burst_remaining: u32,
    /// Seconds until the next bolt of the burst
    pub burst_timer: f32,
    /// Movement direction for the next physics step
    pub direction: Vec3,
    /// Last seen player position
    pub last_target: Option<Vec3>,
    /// Smoothed player velocity
    pub target_velocity: Vec3,
}

impl BotBrain {
    fn new(rng: &mut DeterministicRng, first_beat: f32) -> Self {
        Self {
            strafe_sign: rng.sign(),
            beat_timer: first_beat,
            ..Self::default()
        }
    }

    fn enter(&mut self, state: BotState, duration: f32) {
        if state != self.state {
            trace!(from = ?self.state, to = ?state, "bot state");
        }
        self.state = state;
        self.state_timer = duration;
        if !state.allows_abilities() {
            self.burst_remaining = 0;
        }
    }
}

/// Sample a span.
fn sample(rng: &mut DeterministicRng, span: Span) -> f32 {
    rng.range_f32(span.min, span.max)
}

/// Random angular error for a bolt: uniform in `±π·0.2·(1 − accuracy)`.
pub fn spread_angle(rng: &mut DeterministicRng, accuracy: f32) -> f32 {
    let inaccuracy = (1.0 - accuracy).clamp(0.0, 1.0);
    let limit = PI * 0.2 * inaccuracy;
    if limit <= 0.0 {
        return 0.0;
    }
    rng.range_f32(-limit, limit)
}

/// Blend a tactical direction with a learned one.
///
/// `out = (1 − lr·0.5)·tactical + (lr·0.5)·learned`
pub fn blend_direction(tactical: Vec3, learned: Vec3, learning_rate: f32) -> Vec3 {
    let w = learning_rate.clamp(0.0, 1.0) * LEARNED_MOVE_WEIGHT;
    tactical * (1.0 - w) + learned * w
}

/// Blend a tactical beat interval with a learned one (70/30).
pub fn blend_interval(tactical: f32, learned: f32) -> f32 {
    tactical * (1.0 - LEARNED_INTERVAL_WEIGHT) + learned * LEARNED_INTERVAL_WEIGHT
}

// =============================================================================
// AI
// =============================================================================

/// Every bot's brain plus the optional learner.
pub struct BotAI {
    brains: BTreeMap<EntityId, BotBrain>,
    learner: Option<Box<dyn LearningModel>>,
    difficulty: DifficultyConfig,
}

impl std::fmt::Debug for BotAI {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotAI")
            .field("brains", &self.brains)
            .field("learning", &self.learner.is_some())
            .finish()
    }
}

impl BotAI {
    /// AI without a learner.
    pub fn new(difficulty: DifficultyConfig) -> Self {
        Self {
            brains: BTreeMap::new(),
            learner: None,
            difficulty,
        }
    }

    /// Attach a learning collaborator.
    pub fn with_learning(mut self, model: Box<dyn LearningModel>) -> Self {
        self.learner = Some(model);
        self
    }

    /// Replace (or drop) the learning collaborator.
    pub fn set_learning_model(&mut self, model: Option<Box<dyn LearningModel>>) {
        self.learner = model;
    }

    /// Swap difficulty parameters.
    pub fn set_difficulty(&mut self, difficulty: DifficultyConfig) {
        self.difficulty = difficulty;
    }

    /// Active difficulty.
    pub fn difficulty(&self) -> &DifficultyConfig {
        &self.difficulty
    }

    /// Brain for a bot.
    pub fn brain(&self, id: &EntityId) -> Option<&BotBrain> {
        self.brains.get(id)
    }

    /// Tactical state of a bot.
    pub fn state(&self, id: &EntityId) -> Option<BotState> {
        self.brains.get(id).map(|b| b.state)
    }

    /// Bots with a brain.
    pub fn len(&self) -> usize {
        self.brains.len()
    }

    /// No bots.
    pub fn is_empty(&self) -> bool {
        self.brains.is_empty()
    }

    /// Spawn a bot entity and give it a brain.
    pub fn spawn(&mut self, world: &mut World, config: &CoreConfig, character: CharacterKind, position: Vec3) -> EntityId {
        let id = world.next_bot_id();
        world.spawn(Entity::new(id.clone(), EntityRole::Bot, character, position, config));
        self.register(world, config, &id);
        debug!(id = %id, ?character, "bot spawned");
        id
    }

    /// Give an existing bot entity a brain.
    pub fn register(&mut self, world: &mut World, config: &CoreConfig, id: &EntityId) {
        let first_beat = sample(&mut world.rng, config.bot.shoot_interval) * self.difficulty.shoot_interval_multiplier;
        let mut brain = BotBrain::new(&mut world.rng, first_beat);
        brain.state_timer = sample(&mut world.rng, config.bot.change_direction_interval);
        self.brains.insert(id.clone(), brain);
    }

    /// Forget a bot.
    pub fn remove(&mut self, id: &EntityId) {
        self.brains.remove(id);
    }

    /// Forget every bot (mode change).
    pub fn clear(&mut self) {
        self.brains.clear();
    }

    /// Force a state for `duration` seconds (scripted encounters, tests).
    pub fn set_state(&mut self, id: &EntityId, state: BotState, duration: f32) {
        if let Some(brain) = self.brains.get_mut(id) {
            brain.fleeing = state == BotState::Retreat && brain.fleeing;
            brain.enter(state, duration);
            if !state.moves() {
                brain.direction = Vec3::ZERO;
            }
        }
    }

    /// Movement intent for the physics step.
    pub fn intent(&self, id: &EntityId, config: &CoreConfig) -> MoveIntent {
        let direction = self
            .brains
            .get(id)
            .filter(|b| b.state.moves())
            .map(|b| b.direction * config.bot.speed_multiplier)
            .unwrap_or(Vec3::ZERO);
        MoveIntent {
            direction,
            running: false,
            fly: false,
        }
    }

    /// Physics reported a wall: strafe the other way.
    pub fn notify_wall_hit(&mut self, id: &EntityId, rng: &mut DeterministicRng, config: &CoreConfig) {
        if let Some(brain) = self.brains.get_mut(id) {
            if !brain.state.moves() {
                return;
            }
            brain.strafe_sign = -brain.strafe_sign;
            let duration = sample(rng, config.bot.change_direction_interval);
            brain.enter(BotState::Strafe, duration);
        }
    }

    /// Feed the learner one tick of local player behaviour.
    pub fn observe_player(&mut self, world: &World, fired: bool, dt: f32) {
        let (Some(learner), Some(player)) = (self.learner.as_mut(), world.local()) else {
            return;
        };
        learner.observe(
            &PlayerObservation {
                position: player.position,
                velocity: player.velocity,
                fired,
                time: world.time,
            },
            dt,
        );
    }

    /// Decide movement and fire abilities for every bot.
    pub fn update(&mut self, ctx: &mut AbilityContext<'_>, abilities: &mut AbilitySystem, dt: f32) {
        let target = ctx
            .world
            .local()
            .filter(|p| p.is_targetable())
            .map(|p| (p.position, p.feet(ctx.config.entity.half_height())));
        let combat = ctx.world.mode.is_combat();
        let ids: Vec<EntityId> = self.brains.keys().cloned().collect();

        for id in ids {
            let Some(bot) = ctx.world.get(&id).filter(|b| b.is_alive()) else {
                continue;
            };
            let bot_pos = bot.position;
            let health = bot.health_fraction();
            let character = bot.character;
            let Some(mut brain) = self.brains.remove(&id) else {
                continue;
            };

            match target {
                Some((player_pos, player_feet)) => {
                    self.track_target(&mut brain, player_pos, dt);
                    self.think(ctx, &mut brain, bot_pos, player_pos, health, dt);
                    brain.direction = self.steer(ctx, &brain, &id, bot_pos, player_pos);
                    if combat && brain.state.allows_abilities() {
                        self.fire(ctx, abilities, &mut brain, &id, character, bot_pos, player_pos, player_feet, dt);
                    }
                }
                None => {
                    brain.direction = Vec3::ZERO;
                    brain.burst_remaining = 0;
                }
            }
            self.brains.insert(id, brain);
        }
    }

    fn track_target(&self, brain: &mut BotBrain, player: Vec3, dt: f32) {
        if let Some(last) = brain.last_target {
            if dt > 0.0 {
                let observed = horizontal(player - last) / dt;
                brain.target_velocity = brain.target_velocity.lerp(observed, LEAD_SMOOTHING);
            }
        }
        brain.last_target = Some(player);
    }

    /// State transitions.
    fn think(&self, ctx: &mut AbilityContext<'_>, brain: &mut BotBrain, bot: Vec3, player: Vec3, health: f32, dt: f32) {
        let params = &ctx.config.bot;
        let rng = &mut ctx.world.rng;
        let optimal = params.follow_distance * self.difficulty.follow_distance_multiplier;
        let distance = distance_xz(bot, player);

        brain.state_timer -= dt;
        brain.reaction_timer -= dt;

        if brain.reaction_timer <= 0.0 {
            brain.reaction_timer = self.difficulty.ai_reaction_time;
            if health < params.retreat_health && !brain.fleeing {
                brain.fleeing = true;
                brain.enter(BotState::Retreat, sample(rng, params.change_direction_interval));
                return;
            }
            if brain.fleeing {
                let off_range = (distance - optimal).abs() > optimal * OPTIMAL_BAND;
                if health > params.recover_health && off_range {
                    brain.fleeing = false;
                    brain.state_timer = 0.0;
                } else {
                    brain.enter(BotState::Retreat, brain.state_timer.max(0.0));
                    return;
                }
            }
        }

        if brain.state_timer > 0.0 || brain.fleeing {
            return;
        }

        // Rotation
        if rng.chance(self.difficulty.idle_chance) {
            brain.enter(BotState::Idle, sample(rng, self.difficulty.idle_duration));
            return;
        }
        if rng.chance(self.difficulty.movement_pause_chance) {
            brain.enter(BotState::MovementPause, sample(rng, self.difficulty.movement_pause));
            return;
        }
        let next = if distance < optimal * (1.0 - OPTIMAL_BAND) {
            if rng.chance(0.5) { BotState::Strafe } else { BotState::Retreat }
        } else if distance > optimal * (1.0 + OPTIMAL_BAND) {
            BotState::Approach
        } else if rng.chance(0.5) {
            BotState::Strafe
        } else {
            BotState::Circle
        };
        if rng.chance(0.3) {
            brain.strafe_sign = -brain.strafe_sign;
        }
        brain.enter(next, sample(rng, params.change_direction_interval));
    }

    /// Unit travel direction (or zero) for the current state.
    fn steer(&self, ctx: &AbilityContext<'_>, brain: &BotBrain, id: &EntityId, bot: Vec3, player: Vec3) -> Vec3 {
        if !brain.state.moves() {
            return Vec3::ZERO;
        }
        let params = &ctx.config.bot;
        let optimal = params.follow_distance * self.difficulty.follow_distance_multiplier;
        let distance = distance_xz(bot, player);
        let Some(toward) = direction_xz(bot, player) else {
            return Vec3::ZERO;
        };
        let side = rotate_y(toward, FRAC_PI_2 * brain.strafe_sign);
        let range_error = if optimal > 0.0 { ((distance - optimal) / optimal).clamp(-0.5, 0.5) } else { 0.0 };

        let mut tactical = match brain.state {
            BotState::Approach => toward,
            BotState::Retreat => -toward,
            BotState::Strafe => side + toward * range_error,
            BotState::Circle => side + toward * (range_error * 0.3),
            BotState::Idle | BotState::MovementPause => Vec3::ZERO,
        };

        // Keep clear of other bots
        for other in ctx.world.entities.values() {
            if &other.id == id || other.role != EntityRole::Bot || !other.is_alive() {
                continue;
            }
            let d = distance_xz(bot, other.position);
            if d < params.avoidance_distance && d > 0.01 {
                let weight = 1.0 - d / params.avoidance_distance;
                if let Some(away) = direction_xz(other.position, bot) {
                    tactical += away * weight * weight;
                }
            }
        }

        if let Some(learned) = self.learner.as_ref().and_then(|l| l.suggest_direction(bot, player)) {
            tactical = blend_direction(tactical, learned, self.difficulty.learning_rate);
        }
        tactical.try_normalize().unwrap_or(Vec3::ZERO)
    }

    /// Ability beat and burst fire.
    #[allow(clippy::too_many_arguments)]
    fn fire(
        &self,
        ctx: &mut AbilityContext<'_>,
        abilities: &mut AbilitySystem,
        brain: &mut BotBrain,
        id: &EntityId,
        character: CharacterKind,
        bot: Vec3,
        player: Vec3,
        player_feet: Vec3,
        dt: f32,
    ) {
        let config = ctx.config;
        let profile = config.profile(character);
        let params = &config.bot;
        let distance = distance_xz(bot, player);

        if brain.burst_remaining > 0 {
            brain.burst_timer -= dt;
            if brain.burst_timer > 0.0 {
                return;
            }
            if ProjectileSystem::can_shoot(ctx.world, id) {
                let aim = self.burst_aim(&mut ctx.world.rng, brain, bot, player, profile.bolt.speed);
                abilities.shoot_bolt(ctx, id, aim);
                brain.burst_remaining -= 1;
                brain.burst_timer = params.burst_shot_spacing;
            } else if ctx.world.get(id).map_or(true, |b| !b.ammo.has_round()) {
                // Magazine ran dry mid-burst
                brain.burst_remaining = 0;
            }
            if brain.burst_remaining == 0 {
                brain.beat_timer = sample(&mut ctx.world.rng, self.difficulty.burst_pause);
            }
            return;
        }

        brain.beat_timer -= dt;
        if brain.beat_timer > 0.0 {
            return;
        }
        let cooldowns = ctx.world.get(id).map(|b| b.cooldowns).unwrap_or_default();
        let rng = &mut ctx.world.rng;

        let special_ready = cooldowns.ready(CooldownSlot::Special);
        let wants_special = special_ready
            && match &profile.special {
                SpecialAbility::Blast(blast) => distance <= blast.radius && rng.chance(params.blast_chance),
                SpecialAbility::MultiShot { .. } => {
                    distance <= params.multi_shot_radius && rng.chance(params.multi_shot_chance)
                }
            };
        let mortar_chance = if distance >= params.mortar_long_range {
            params.mortar_long_chance
        } else {
            params.mortar_medium_chance
        };
        let mortar_in_range = distance >= params.mortar_medium_range && distance <= profile.mortar.max_range;

        if wants_special {
            abilities.cast_special(ctx, id);
        } else if distance <= profile.melee.range && cooldowns.ready(CooldownSlot::Melee) {
            abilities.swing_melee(ctx, id);
        } else if mortar_in_range && cooldowns.ready(CooldownSlot::Mortar) && rng.chance(mortar_chance) {
            abilities.launch_mortar(ctx, id, Some(player_feet));
        } else if distance <= params.shoot_range {
            brain.burst_remaining = 1 + rng.next_int(2);
            brain.burst_timer = 0.0;
        }

        let rng = &mut ctx.world.rng;
        let variance = params.shoot_cooldown_variance;
        let mut interval = sample(rng, params.shoot_interval)
            * self.difficulty.shoot_interval_multiplier
            * (1.0 + rng.range_f32(-variance, variance));
        if let Some(learned) = self.learner.as_ref().and_then(|l| l.suggest_shoot_interval()) {
            interval = blend_interval(interval, learned);
        }
        brain.beat_timer = interval.max(0.05);
    }

    /// Aim for one burst bolt: spread, sideways offset and optional lead.
    fn burst_aim(&self, rng: &mut DeterministicRng, brain: &BotBrain, bot: Vec3, player: Vec3, speed: f32) -> Aim {
        let mut point = player;
        if self.difficulty.movement_intelligence > LEAD_THRESHOLD && speed > 0.0 {
            let travel = distance_xz(bot, player) / speed;
            point += brain.target_velocity * travel;
        }
        let Some(toward) = direction_xz(bot, point) else {
            return Aim::default();
        };
        let inaccuracy = (1.0 - self.difficulty.ai_accuracy).clamp(0.0, 1.0);
        let side = rotate_y(toward, FRAC_PI_2) * rng.range_f32(-1.0, 1.0) * inaccuracy;
        let offset_point = point + side;
        let base = direction_xz(bot, offset_point).unwrap_or(toward);
        let direction = rotate_y(base, spread_angle(rng, self.difficulty.ai_accuracy));
        Aim {
            direction: Some(direction),
            target: None,
            magnitude: 1.0,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Difficulty;
    use crate::game::collision::ArenaCollider;
    use crate::game::effects::PoisonLedger;
    use crate::game::projectile::ProjectileSystem;
    use crate::game::push::PushLedger;
    use crate::game::render::VisualTimers;
    use crate::game::state::GameMode;
    use proptest::prelude::*;

    struct Rig {
        world: World,
        projectiles: ProjectileSystem,
        poison: PoisonLedger,
        pushes: PushLedger,
        visuals: VisualTimers,
        collider: ArenaCollider,
        config: CoreConfig,
        abilities: AbilitySystem,
        ai: BotAI,
    }

    impl Rig {
        fn new() -> Self {
            let mut config = CoreConfig::default();
            config.bot.mortar_medium_chance = 0.0;
            config.bot.mortar_long_chance = 0.0;
            config.bot.blast_chance = 0.0;
            config.bot.multi_shot_chance = 0.0;
            let mut difficulty = Difficulty::Normal.preset();
            difficulty.idle_chance = 0.0;
            difficulty.movement_pause_chance = 0.0;
            let mut world = World::new(5, GameMode::Deathmatch, 1.2);
            world.spawn(Entity::new(EntityId::local(), EntityRole::LocalPlayer, CharacterKind::Lucy, Vec3::Y, &config));
            Self {
                world,
                projectiles: ProjectileSystem::new(),
                poison: PoisonLedger::new(),
                pushes: PushLedger::default(),
                visuals: VisualTimers::new(),
                collider: ArenaCollider::new(20.0),
                config,
                abilities: AbilitySystem::new(),
                ai: BotAI::new(difficulty),
            }
        }

        fn spawn(&mut self, kind: CharacterKind, pos: Vec3) -> EntityId {
            self.ai.spawn(&mut self.world, &self.config, kind, pos)
        }

        fn step(&mut self, dt: f32) {
            let mut ctx = AbilityContext {
                world: &mut self.world,
                projectiles: &mut self.projectiles,
                poison: &mut self.poison,
                pushes: &mut self.pushes,
                visuals: &mut self.visuals,
                collider: &self.collider,
                config: &self.config,
            };
            self.ai.update(&mut ctx, &mut self.abilities, dt);
            self.abilities.update(&mut ctx, dt);
            self.world.time += dt as f64;
        }
    }

    #[test]
    fn test_low_health_retreats_away_from_player() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Herald, Vec3::new(5.0, 1.0, 0.0));
        if let Some(b) = rig.world.get_mut(&bot) {
            b.health = 20.0;
        }
        rig.step(1.0 / 60.0);
        let brain = rig.ai.brain(&bot).unwrap();
        assert_eq!(brain.state, BotState::Retreat);
        assert!(brain.fleeing);
        assert!(brain.direction.x > 0.5);
    }

    #[test]
    fn test_far_bot_approaches() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Lucy, Vec3::new(0.0, 1.0, 15.0));
        rig.ai.set_state(&bot, BotState::Approach, 0.0);
        rig.step(1.0 / 60.0);
        assert_eq!(rig.ai.state(&bot), Some(BotState::Approach));
        assert!(rig.ai.brain(&bot).unwrap().direction.z < -0.9);
        let intent = rig.ai.intent(&bot, &rig.config);
        assert!((intent.direction.length() - rig.config.bot.speed_multiplier).abs() < 1e-4);
    }

    #[test]
    fn test_idle_bot_stands_and_holds_fire() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Lucy, Vec3::new(6.0, 1.0, 0.0));
        rig.ai.set_state(&bot, BotState::Idle, 5.0);
        for _ in 0..240 {
            rig.step(1.0 / 60.0);
            assert_eq!(rig.ai.state(&bot), Some(BotState::Idle));
            assert_eq!(rig.ai.intent(&bot, &rig.config).direction, Vec3::ZERO);
        }
        assert!(rig.projectiles.is_empty());
        assert_eq!(rig.world.local().unwrap().health, 100.0);
    }

    #[test]
    fn test_wall_hit_flips_strafe() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Lucy, Vec3::new(7.0, 1.0, 0.0));
        let before = rig.ai.brain(&bot).unwrap().strafe_sign;
        rig.ai.notify_wall_hit(&bot, &mut rig.world.rng, &rig.config);
        let brain = rig.ai.brain(&bot).unwrap();
        assert_eq!(brain.state, BotState::Strafe);
        assert_eq!(brain.strafe_sign, -before);
    }

    #[test]
    fn test_adjacent_bot_swings_sword() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Herald, Vec3::new(1.5, 1.0, 0.0));
        if let Some(brain) = rig.ai.brains.get_mut(&bot) {
            brain.beat_timer = 0.0;
        }
        rig.step(1.0 / 60.0);
        assert!(rig.abilities.is_swinging(&bot));
        assert_eq!(rig.world.local().unwrap().health, 82.0);
    }

    #[test]
    fn test_burst_fires_one_or_two_bolts_then_pauses() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Lucy, Vec3::new(0.0, 1.0, 12.0));
        rig.ai.set_state(&bot, BotState::MovementPause, 10.0);
        if let Some(brain) = rig.ai.brains.get_mut(&bot) {
            brain.beat_timer = 0.0;
        }
        rig.step(1.0 / 60.0);
        let burst = rig.ai.brain(&bot).unwrap().burst_remaining;
        assert!((1..=2).contains(&burst));
        // The second bolt waits for the bolt cooldown
        for _ in 0..60 {
            rig.step(1.0 / 60.0);
        }
        let fired = rig.world.get(&bot).unwrap().ammo;
        assert_eq!(fired.capacity - fired.loaded, burst);
        let brain = rig.ai.brain(&bot).unwrap();
        assert_eq!(brain.burst_remaining, 0);
        assert!(brain.beat_timer > 0.0);
    }

    #[test]
    fn test_no_target_no_movement() {
        let mut rig = Rig::new();
        let bot = rig.spawn(CharacterKind::Lucy, Vec3::new(3.0, 1.0, 0.0));
        rig.world.remove(&EntityId::local());
        rig.step(1.0 / 60.0);
        assert_eq!(rig.ai.brain(&bot).unwrap().direction, Vec3::ZERO);
    }

    struct FixedLearner(Vec3);

    impl LearningModel for FixedLearner {
        fn observe(&mut self, _: &PlayerObservation, _: f32) {}
        fn suggest_direction(&self, _: Vec3, _: Vec3) -> Option<Vec3> {
            Some(self.0)
        }
        fn suggest_shoot_interval(&self) -> Option<f32> {
            Some(1.0)
        }
    }

    #[test]
    fn test_learning_blend_weights() {
        let out = blend_direction(Vec3::X, Vec3::Z, 0.6);
        assert!((out.x - 0.7).abs() < 1e-6);
        assert!((out.z - 0.3).abs() < 1e-6);
        assert!((blend_interval(2.0, 1.0) - 1.7).abs() < 1e-6);
    }

    #[test]
    fn test_learned_direction_bends_approach() {
        let mut rig = Rig::new();
        rig.ai.set_learning_model(Some(Box::new(FixedLearner(Vec3::X))));
        let bot = rig.spawn(CharacterKind::Lucy, Vec3::new(0.0, 1.0, 15.0));
        rig.ai.set_state(&bot, BotState::Approach, 5.0);
        rig.step(1.0 / 60.0);
        let dir = rig.ai.brain(&bot).unwrap().direction;
        assert!(dir.x > 0.1 && dir.z < -0.5);
    }

    #[test]
    fn test_pattern_learner_tracks_habits() {
        let difficulty = Difficulty::Hard.preset();
        let mut learner = PatternLearner::new(&difficulty);
        for i in 0..120 {
            learner.observe(
                &PlayerObservation {
                    position: Vec3::ZERO,
                    velocity: Vec3::new(6.0, 0.0, 0.0),
                    fired: i % 30 == 0,
                    time: i as f64 / 60.0,
                },
                1.0 / 60.0,
            );
        }
        let dominant = learner.dominant_direction().unwrap();
        assert!((dominant - Vec3::X).length() < 1e-4);
        let interval = learner.suggest_shoot_interval().unwrap();
        assert!((interval - 0.5).abs() < 1e-3);
    }

    proptest! {
        #[test]
        fn prop_spread_bounded(seed in 1u64..u64::MAX, accuracy in 0.0f32..1.0) {
            let mut rng = DeterministicRng::new(seed);
            let limit = PI * 0.2 * (1.0 - accuracy);
            for _ in 0..16 {
                let angle = spread_angle(&mut rng, accuracy);
                prop_assert!(angle.abs() <= limit + 1e-5);
            }
        }
    }
}
