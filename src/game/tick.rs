//! Simulation Tick Driver
//!
//! [`Simulation`] owns every subsystem and advances them once per host
//! frame in a fixed order:
//!
//! 1. Clock
//! 2. Input refresh
//! 3. Character physics and death fades
//! 4. Projectiles and splash areas
//! 5. Local abilities, cooldowns and poison
//! 6. Bots, then explore-mode props
//! 7. Knockback decay
//! 8. Fallout with push credit
//! 9. Replication
//! 10. Presentation
//!
//! Nothing inside a tick suspends. A stage that produces an unusable
//! value is logged and repaired; the tick always completes.

use glam::Vec3;
use tracing::{debug, error, info, warn};

use super::ability::{AbilityContext, AbilitySystem};
use super::bot::BotAI;
use super::bridge::Bridges;
use super::character::{self, MoveIntent};
use super::collision::CollisionProvider;
use super::effects::PoisonLedger;
use super::entities::EntityManager;
use super::events::{DamageSource, GameEvent, GameEventData};
use super::input::{InputDevices, InputRouter, InputSnapshot, RefreshContext};
use super::projectile::ProjectileSystem;
use super::push::PushLedger;
use super::render::{RenderFrame, VisualTimers};
use super::state::{CharacterKind, Entity, EntityId, EntityRole, GameMode, World};
use crate::config::{CoreConfig, Difficulty, Environment};
use crate::core::math::{is_finite_vec3, sanitize_dt};
use crate::error::CoreError;
use crate::network::replication::{PeerLink, Replicator};

// =============================================================================
// RUN STATE
// =============================================================================

/// Whether frames advance the simulation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    /// Frames are ignored
    #[default]
    Stopped,
    /// Frames simulate and render
    Running,
    /// Frames render only
    Paused,
}

/// What one frame produced.
#[derive(Clone, Debug)]
pub struct TickReport {
    /// World tick after the frame
    pub tick: u64,
    /// Sanitized delta used
    pub dt: f32,
    /// False when paused (render only)
    pub simulated: bool,
    /// Events emitted during the frame, in order
    pub events: Vec<GameEvent>,
    /// Frame handed to the renderer
    pub frame: RenderFrame,
}

// =============================================================================
// SIMULATION
// =============================================================================

/// The whole game core for one peer.
pub struct Simulation {
    config: CoreConfig,
    environment: Environment,
    world: World,
    collider: Box<dyn CollisionProvider>,
    input: InputRouter,
    projectiles: ProjectileSystem,
    abilities: AbilitySystem,
    bots: BotAI,
    pushes: PushLedger,
    poison: PoisonLedger,
    entities: EntityManager,
    replicator: Replicator,
    visuals: VisualTimers,
    bridges: Bridges,
    run_state: RunState,
    last_frame: Option<f64>,
}

impl Simulation {
    /// Validate `config` and build a world holding only the local player.
    ///
    /// The returned [`PeerLink`] is the transport's end of the replication
    /// queues.
    pub fn new(
        config: CoreConfig,
        environment: Environment,
        collider: Box<dyn CollisionProvider>,
        mode: GameMode,
    ) -> Result<(Self, PeerLink), CoreError> {
        config.validate()?;
        let (replicator, link) = Replicator::new(environment.peer_id.clone());
        let mut sim = Self {
            world: World::new(environment.seed, mode, config.entity.death_fade_duration),
            collider,
            input: InputRouter::new(config.input.clone()),
            projectiles: ProjectileSystem::new(),
            abilities: AbilitySystem::new(),
            bots: BotAI::new(config.difficulty_config()),
            pushes: PushLedger::new(f64::from(config.respawn.push_credit_window)),
            poison: PoisonLedger::new(),
            entities: EntityManager::new(),
            replicator,
            visuals: VisualTimers::new(),
            bridges: Bridges::none(),
            run_state: RunState::Stopped,
            last_frame: None,
            config,
            environment,
        };
        sim.collider.update_respawn_system(mode, None);

        let feet = sim.respawn_feet();
        let center = feet + Vec3::Y * sim.config.entity.half_height();
        let local = Entity::new(
            EntityId::local(),
            EntityRole::LocalPlayer,
            CharacterKind::default(),
            center,
            &sim.config,
        );
        sim.world.spawn(local);
        info!(
            peer = %sim.environment.peer_id,
            seed = sim.environment.seed,
            host = sim.environment.is_host,
            ?mode,
            "simulation created"
        );
        Ok((sim, link))
    }

    /// Attach presentation bridges.
    pub fn with_bridges(mut self, bridges: Bridges) -> Self {
        self.bridges = bridges;
        self
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    /// World state.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// World state, mutably (tools and tests).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Active configuration.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Who this peer is.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Projectiles and splash areas.
    pub fn projectiles(&self) -> &ProjectileSystem {
        &self.projectiles
    }

    /// Ability state.
    pub fn abilities(&self) -> &AbilitySystem {
        &self.abilities
    }

    /// Bot controllers.
    pub fn bots(&self) -> &BotAI {
        &self.bots
    }

    /// Bot controllers, mutably.
    pub fn bots_mut(&mut self) -> &mut BotAI {
        &mut self.bots
    }

    /// Explore-mode props.
    pub fn entities_mut(&mut self) -> &mut EntityManager {
        &mut self.entities
    }

    /// Replication endpoint.
    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    /// Replication endpoint, mutably.
    pub fn replicator_mut(&mut self) -> &mut Replicator {
        &mut self.replicator
    }

    /// Presentation bridges, mutably.
    pub fn bridges_mut(&mut self) -> &mut Bridges {
        &mut self.bridges
    }

    /// Push credit ledger.
    pub fn pushes(&self) -> &PushLedger {
        &self.pushes
    }

    /// Poison ledger.
    pub fn poison(&self) -> &PoisonLedger {
        &self.poison
    }

    /// Input router.
    pub fn input(&self) -> &InputRouter {
        &self.input
    }

    /// Run state.
    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    /// Current mode.
    pub fn mode(&self) -> GameMode {
        self.world.mode
    }

    // -------------------------------------------------------------------------
    // Run control
    // -------------------------------------------------------------------------

    /// Begin simulating; `now` is the host clock in seconds.
    pub fn start(&mut self, now: f64) {
        self.run_state = RunState::Running;
        self.last_frame = Some(now);
        info!(now, "simulation started");
    }

    /// Stop; later frames are ignored.
    pub fn stop(&mut self) {
        self.run_state = RunState::Stopped;
        self.last_frame = None;
        info!(tick = self.world.tick, "simulation stopped");
    }

    /// Keep rendering without advancing.
    pub fn pause(&mut self) {
        if self.run_state == RunState::Running {
            self.run_state = RunState::Paused;
            debug!(tick = self.world.tick, "paused");
        }
    }

    /// Continue after [`Simulation::pause`].
    pub fn resume(&mut self) {
        if self.run_state == RunState::Paused {
            self.run_state = RunState::Running;
            debug!(tick = self.world.tick, "resumed");
        }
    }

    /// Host frame callback. Returns None while stopped.
    pub fn frame(&mut self, now: f64, devices: &InputDevices) -> Option<TickReport> {
        match self.run_state {
            RunState::Stopped => None,
            RunState::Paused => {
                self.last_frame = Some(now);
                Some(self.render_only())
            }
            RunState::Running => {
                let raw = match self.last_frame {
                    Some(last) => now - last,
                    None => f64::NAN,
                };
                self.last_frame = Some(now);
                Some(self.advance(sanitize_dt(raw), devices))
            }
        }
    }

    /// Advance one tick by `dt` seconds regardless of run state.
    ///
    /// Non-finite or non-positive deltas fall back to the default step;
    /// large ones are clamped.
    pub fn step(&mut self, dt: f32, devices: &InputDevices) -> TickReport {
        let sanitized = sanitize_dt(f64::from(dt));
        if sanitized != dt {
            debug!(raw = dt, used = sanitized, "delta sanitized");
        }
        self.advance(sanitized, devices)
    }

    // -------------------------------------------------------------------------
    // Mode and population
    // -------------------------------------------------------------------------

    /// Switch mode. Bots, projectiles, splash areas, poison, push records
    /// and visual timers are dropped; the local player respawns with full
    /// health. Remote players stay.
    pub fn set_mode(&mut self, mode: GameMode) {
        info!(from = ?self.world.mode, to = ?mode, "mode change");
        for id in self.world.ids_with_role(EntityRole::Bot) {
            self.world.remove(&id);
        }
        self.bots.clear();
        self.projectiles.clear();
        self.abilities.clear();
        self.poison.clear();
        self.pushes.clear();
        self.visuals.clear();
        self.entities.clear();
        self.input.reset();

        self.world.mode = mode;
        self.collider.update_respawn_system(mode, None);
        self.bridges.set_mushrooms_visible(mode == GameMode::Explore);

        let feet = self.respawn_feet();
        if let Some(local) = self.world.local_mut() {
            character::respawn(local, feet, &self.config.entity);
        }
    }

    /// Change bot difficulty for every bot.
    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.config.difficulty = difficulty;
        self.bots.set_difficulty(self.config.difficulty_config());
        info!(?difficulty, "difficulty changed");
    }

    /// Spawn one AI bot at `position` (capsule center) or a random point.
    pub fn spawn_bot(&mut self, kind: CharacterKind, position: Option<Vec3>) -> EntityId {
        let center = match position {
            Some(p) => p,
            None => self.respawn_feet() + Vec3::Y * self.config.entity.half_height(),
        };
        self.bots.spawn(&mut self.world, &self.config, kind, center)
    }

    /// Spawn `count` bots alternating characters.
    pub fn spawn_bots(&mut self, count: usize) -> Vec<EntityId> {
        (0..count)
            .map(|i| {
                let kind = if i % 2 == 0 { CharacterKind::Lucy } else { CharacterKind::Herald };
                self.spawn_bot(kind, None)
            })
            .collect()
    }

    /// Feet position for the next respawn.
    ///
    /// Checkpoint first, then the configured point, then a random spot
    /// away from the edge.
    fn respawn_feet(&mut self) -> Vec3 {
        let mode = self.world.mode;
        if let Some(point) = self.collider.respawn_point(mode).or(self.config.respawn.respawn_point) {
            return point;
        }
        let rules = &self.config.respawn;
        let (x, z) = self
            .world
            .rng
            .point_in_square(rules.arena_half_size - rules.edge_margin);
        let y = self
            .collider
            .ground_height(x, z, self.config.entity.player_size)
            .unwrap_or(0.0);
        Vec3::new(x, y, z)
    }

    // -------------------------------------------------------------------------
    // Tick
    // -------------------------------------------------------------------------

    fn advance(&mut self, dt: f32, devices: &InputDevices) -> TickReport {
        // 1. Clock
        self.world.tick += 1;
        self.world.time += f64::from(dt);

        // 2. Input
        let snapshot = self.refresh_input(devices, dt);

        // 3. Physics
        self.advance_characters(&snapshot, dt);
        if let Err(e) = self.repair_entities() {
            error!(error = %e, "entity state repaired");
        }

        // 4. Projectiles
        self.projectiles
            .update(dt, &mut self.world, self.collider.as_ref(), &mut self.poison, &self.config);

        // 5. Abilities
        {
            let mut ctx = AbilityContext {
                world: &mut self.world,
                projectiles: &mut self.projectiles,
                poison: &mut self.poison,
                pushes: &mut self.pushes,
                visuals: &mut self.visuals,
                collider: self.collider.as_ref(),
                config: &self.config,
            };
            self.abilities.evaluate_local(&mut ctx, &snapshot, &mut self.input, dt);
            self.abilities.update(&mut ctx, dt);
        }

        // 6. Bots and props
        self.bots.observe_player(&self.world, snapshot.shoot_held, dt);
        {
            let mut ctx = AbilityContext {
                world: &mut self.world,
                projectiles: &mut self.projectiles,
                poison: &mut self.poison,
                pushes: &mut self.pushes,
                visuals: &mut self.visuals,
                collider: self.collider.as_ref(),
                config: &self.config,
            };
            self.bots.update(&mut ctx, &mut self.abilities, dt);
        }
        let half_height = self.config.entity.half_height();
        self.entities
            .update(&mut self.world, self.collider.as_mut(), half_height, dt);

        // 7. Knockback decay
        for entity in self.world.entities.values_mut() {
            if entity.role.is_simulated() {
                character::decay_knockback(entity, dt, &self.config.entity);
            }
        }

        // 8. Fallout
        self.process_fallout();

        // 9. Replication
        self.replicator
            .step(&mut self.world, &mut self.projectiles, &self.config, dt);

        // 10. Presentation
        self.visuals.update(dt, &self.world);
        let events = self.world.take_events();
        self.bridges.dispatch(&events);
        let frame = RenderFrame::capture(&self.world, &self.projectiles, &self.visuals);
        self.bridges.render(&frame);

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(
            tick = self.world.tick,
            dt,
            events = events.len(),
            entities = self.world.entities.len(),
            projectiles = self.projectiles.len(),
            "tick complete"
        );

        TickReport {
            tick: self.world.tick,
            dt,
            simulated: true,
            events,
            frame,
        }
    }

    fn render_only(&mut self) -> TickReport {
        let frame = RenderFrame::capture(&self.world, &self.projectiles, &self.visuals);
        self.bridges.render(&frame);
        TickReport {
            tick: self.world.tick,
            dt: 0.0,
            simulated: false,
            events: Vec::new(),
            frame,
        }
    }

    fn refresh_input(&mut self, devices: &InputDevices, dt: f32) -> InputSnapshot {
        let (player_position, kind) = self
            .world
            .local()
            .map_or((Vec3::ZERO, CharacterKind::default()), |p| (p.position, p.character));
        let ctx = RefreshContext {
            now: self.world.time,
            dt,
            camera: self.bridges.camera(),
            player_position,
            mortar_ready: ProjectileSystem::can_shoot_mortar(&self.world, &EntityId::local()),
            combat: self.world.mode.is_combat(),
            heal_tap_threshold: self.config.profile(kind).heal.tap_reload_threshold,
            sprint_blocks_abilities: kind == CharacterKind::Herald && self.config.profile(kind).sprint.is_some(),
        };
        let snapshot = self.input.refresh(devices, &ctx);
        if let Some(reason) = self.input.take_disconnect_notice() {
            warn!(%reason, "controller disconnected");
            self.world
                .push_event(GameEventData::ControllerDisconnected { reason });
        }
        snapshot
    }

    fn advance_characters(&mut self, snapshot: &InputSnapshot, dt: f32) {
        let config = &self.config;
        let collider = self.collider.as_ref();
        let ids: Vec<EntityId> = self
            .world
            .entities
            .values()
            .filter(|e| e.role.is_simulated())
            .map(|e| e.id.clone())
            .collect();

        let mut events = Vec::new();
        let mut wall_hits = Vec::new();
        let mut faded = Vec::new();
        for id in ids {
            let local = id.is_local();
            let intent = if local {
                MoveIntent {
                    direction: snapshot.move_world,
                    running: snapshot.running,
                    fly: snapshot.fly_held,
                }
            } else {
                self.bots.intent(&id, config)
            };
            let Some(entity) = self.world.entities.get_mut(&id) else {
                continue;
            };
            let movement = &config.profile(entity.character).movement;

            if local && snapshot.jump_pressed {
                let double = snapshot.double_jump && !entity.grounded;
                let jumped = if double {
                    character::double_jump(entity, movement)
                } else {
                    character::jump(entity, movement)
                };
                if jumped {
                    events.push(GameEventData::Jumped { id: id.clone(), double });
                }
            }

            let outcome = character::apply_movement(entity, intent, dt, collider, movement, &config.entity);
            if outcome.bounced {
                events.push(GameEventData::Bounced {
                    id: id.clone(),
                    speed: outcome.impact_speed,
                });
            } else if outcome.landed {
                events.push(GameEventData::Landed {
                    id: id.clone(),
                    impact_speed: outcome.impact_speed,
                });
            }
            if outcome.hit_wall && !local {
                wall_hits.push(id.clone());
            }
            if character::update_death_fade(entity, dt) {
                faded.push(id);
            }
        }

        for data in events {
            self.world.push_event(data);
        }
        for id in wall_hits {
            self.bots.notify_wall_hit(&id, &mut self.world.rng, config);
        }
        for id in faded {
            self.finish_death(&id);
        }
    }

    /// Death fade completed: respawn or despawn.
    fn finish_death(&mut self, id: &EntityId) {
        let Some(role) = self.world.get(id).map(|e| e.role) else {
            return;
        };
        self.pushes.clear_for(id);
        self.poison.remove(id);
        self.abilities.cancel_for(id);
        self.visuals.cancel_for(id);

        let respawns = match role {
            EntityRole::LocalPlayer => true,
            EntityRole::Bot => self.world.mode == GameMode::Training,
            EntityRole::RemotePlayer => return,
        };
        if respawns {
            let feet = self.respawn_feet();
            let Some(entity) = self.world.get_mut(id) else {
                return;
            };
            character::respawn(entity, feet, &self.config.entity);
            let position = entity.position;
            info!(id = %id, ?position, "respawned");
            self.world.push_event(GameEventData::Respawned {
                id: id.clone(),
                position,
            });
        } else {
            self.world.remove(id);
            self.bots.remove(id);
            info!(id = %id, "despawned");
            self.world
                .push_event(GameEventData::Despawned { id: id.clone() });
        }
    }

    /// Clamp health and reset bodies whose position went non-finite.
    fn repair_entities(&mut self) -> Result<(), CoreError> {
        let mut broken = Vec::new();
        for entity in self.world.entities.values_mut() {
            entity.health = if entity.health.is_finite() {
                entity.health.clamp(0.0, entity.max_health)
            } else {
                0.0
            };
            if !is_finite_vec3(entity.position) || !is_finite_vec3(entity.velocity) {
                broken.push(entity.id.clone());
            }
        }
        if broken.is_empty() {
            return Ok(());
        }

        for id in &broken {
            let feet = self.respawn_feet();
            if let Some(entity) = self.world.get_mut(id) {
                entity.position = feet + Vec3::Y * self.config.entity.half_height();
                entity.velocity = Vec3::ZERO;
                entity.knockback = false;
                entity.bounce_available = false;
            }
        }
        let names: Vec<&str> = broken.iter().map(|id| id.as_str()).collect();
        Err(CoreError::stage("physics", format!("non-finite body: {}", names.join(", "))))
    }

    /// Kill entities below the fall threshold, crediting a recent pusher.
    fn process_fallout(&mut self) {
        let now = self.world.time;
        self.pushes.sweep(now, f64::from(self.config.respawn.push_max_age));

        let threshold = self.config.respawn.fall_threshold;
        let fallen: Vec<EntityId> = self
            .world
            .entities
            .values()
            .filter(|e| e.role.is_simulated() && e.is_alive() && e.position.y < threshold)
            .map(|e| e.id.clone())
            .collect();

        for id in fallen {
            let pusher = self.pushes.consume(&id, now);
            info!(victim = %id, pusher = ?pusher, "fell out of the arena");
            self.world.push_event(GameEventData::FellOut {
                victim: id.clone(),
                pusher: pusher.clone(),
            });
            self.world.kill(&id, pusher.as_ref(), DamageSource::Fallout);
        }
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("peer", &self.environment.peer_id)
            .field("tick", &self.world.tick)
            .field("mode", &self.world.mode)
            .field("entities", &self.world.entities.len())
            .field("projectiles", &self.projectiles.len())
            .field("run_state", &self.run_state)
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::math::{Ray, DT_DEFAULT, DT_MAX};
    use crate::game::collision::ArenaCollider;
    use crate::game::input::{GamepadButtons, GamepadState, KeyboardState};

    const DT: f32 = 1.0 / 60.0;

    fn sim_for(peer: &str, mode: GameMode) -> (Simulation, PeerLink) {
        sim_at(peer, mode, Some(Vec3::ZERO))
    }

    fn sim_at(peer: &str, mode: GameMode, respawn_point: Option<Vec3>) -> (Simulation, PeerLink) {
        let mut config = CoreConfig::default();
        config.respawn.respawn_point = respawn_point;
        Simulation::new(
            config,
            Environment::new(peer, 7),
            Box::new(ArenaCollider::new(20.0)),
            mode,
        )
        .unwrap()
    }

    /// A bot body with no controller.
    fn dummy_bot(sim: &mut Simulation, kind: CharacterKind, center: Vec3) -> EntityId {
        let config = sim.config().clone();
        let id = sim.world_mut().next_bot_id();
        sim.world_mut()
            .spawn(Entity::new(id.clone(), EntityRole::Bot, kind, center, &config));
        id
    }

    fn idle() -> InputDevices {
        InputDevices::default()
    }

    fn keys(codes: &[&str]) -> InputDevices {
        let mut keyboard = KeyboardState::default();
        for code in codes {
            keyboard = keyboard.with_key(code);
        }
        InputDevices {
            keyboard,
            ..InputDevices::default()
        }
    }

    fn mouse(left: bool, right: bool, ground: Vec3) -> InputDevices {
        InputDevices {
            keyboard: KeyboardState {
                mouse_left: left,
                mouse_right: right,
                mouse_ray: Some(Ray::new(ground + Vec3::Y * 10.0, Vec3::NEG_Y)),
                ..KeyboardState::default()
            },
            ..InputDevices::default()
        }
    }

    fn run(sim: &mut Simulation, ticks: usize, devices: &InputDevices) -> Vec<GameEvent> {
        (0..ticks).flat_map(|_| sim.step(DT, devices).events).collect()
    }

    fn set_feet(sim: &mut Simulation, id: &EntityId, feet: Vec3) {
        let hh = sim.config().entity.half_height();
        let entity = sim.world_mut().get_mut(id).unwrap();
        entity.position = feet + Vec3::Y * hh;
    }

    #[test]
    fn test_bolt_duel_kills_bot() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        let bot = dummy_bot(&mut sim, CharacterKind::Lucy, Vec3::new(4.0, 1.0, 0.0));
        let events = run(&mut sim, 100, &mouse(true, false, Vec3::new(4.0, 0.0, 0.0)));

        let hits: Vec<&GameEvent> = events
            .iter()
            .filter(|e| {
                matches!(&e.data, GameEventData::Damaged { victim, source: DamageSource::Bolt, .. } if *victim == bot)
            })
            .collect();
        assert_eq!(hits.len(), 4);
        let spread = (hits[3].tick - hits[0].tick) as f32 * DT;
        assert!(spread >= 1.2 - 1e-3, "hits only {spread}s apart");

        assert!(events.iter().any(|e| matches!(
            &e.data,
            GameEventData::Died { victim, killer: Some(k), .. } if *victim == bot && k.is_local()
        )));
        assert_eq!(sim.world().score(&EntityId::local()).kills, 1);
        assert!(!sim.world().get(&bot).unwrap().is_alive());
    }

    #[test]
    fn test_mortar_splash_ticks_and_poisons() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        set_feet(&mut sim, &EntityId::local(), Vec3::new(-2.0, 0.0, 0.0));
        let bot = dummy_bot(&mut sim, CharacterKind::Herald, Vec3::new(2.0, 1.0, 0.0));
        let target = Vec3::new(2.0, 0.0, 0.0);

        let mut events = Vec::new();
        events.extend(sim.step(DT, &mouse(false, true, target)).events);
        events.extend(sim.step(DT, &mouse(true, false, target)).events);
        let mut exploded = false;
        for _ in 0..300 {
            let report = sim.step(DT, &idle());
            exploded = report
                .events
                .iter()
                .any(|e| matches!(e.data, GameEventData::MortarExploded { .. }));
            events.extend(report.events);
            if exploded {
                break;
            }
        }
        assert!(exploded, "mortar never landed");

        // 1.1 s inside at 0.5 s ticks
        events.extend(run(&mut sim, 66, &idle()));
        let record = sim.poison().get(&bot).expect("bot poisoned");
        assert!((record.speed_multiplier - 0.6).abs() < 1e-6);
        assert!((sim.world().get(&bot).unwrap().speed_multiplier() - 0.6).abs() < 1e-6);

        set_feet(&mut sim, &bot, Vec3::new(12.0, 0.0, 0.0));
        events.extend(run(&mut sim, 60, &idle()));

        let splash: Vec<f32> = events
            .iter()
            .filter_map(|e| match &e.data {
                GameEventData::Damaged {
                    victim,
                    source: DamageSource::Splash,
                    amount,
                    ..
                } if *victim == bot => Some(*amount),
                _ => None,
            })
            .collect();
        assert_eq!(splash, vec![5.0, 5.0]);
    }

    fn herald_blasts(sim: &mut Simulation, herald_feet: Vec3, bot_center: Vec3) -> (EntityId, Vec<GameEvent>) {
        let config = sim.config().clone();
        if let Some(local) = sim.world_mut().local_mut() {
            local.apply_profile(CharacterKind::Herald, &config.herald);
        }
        set_feet(sim, &EntityId::local(), herald_feet);
        let bot = dummy_bot(sim, CharacterKind::Lucy, bot_center);
        let events = sim.step(DT, &keys(&["KeyQ"])).events;
        (bot, events)
    }

    fn bounces_of(events: &[GameEvent], bot: &EntityId) -> usize {
        events
            .iter()
            .filter(|e| matches!(&e.data, GameEventData::Bounced { id, .. } if id == bot))
            .count()
    }

    #[test]
    fn test_blast_off_the_edge_credits_pusher() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        let (bot, mut events) = herald_blasts(&mut sim, Vec3::new(19.2, 0.0, 0.0), Vec3::new(20.2, 1.0, 0.0));
        {
            let body = sim.world().get(&bot).unwrap();
            assert!(body.knockback && !body.grounded);
            assert!((body.velocity.y - 6.0).abs() < 1e-3, "vy {}", body.velocity.y);
            // One airborne decay step already applied
            assert!((body.velocity.x - 8.0 * (2.0 / 3.0) * 0.85).abs() < 1e-3, "vx {}", body.velocity.x);
        }
        assert_eq!(
            sim.pushes().peek(&bot).map(|r| r.pusher.clone()),
            Some(EntityId::local())
        );

        events.extend(run(&mut sim, 300, &idle()));
        let fell = events
            .iter()
            .find(|e| matches!(&e.data, GameEventData::FellOut { victim, .. } if *victim == bot))
            .expect("bot fell out");
        assert!(matches!(&fell.data, GameEventData::FellOut { pusher: Some(p), .. } if p.is_local()));
        assert!((fell.tick as f32) * DT < 5.0);
        assert!(events.iter().any(|e| matches!(
            &e.data,
            GameEventData::KillCredited { killer, victim } if killer.is_local() && *victim == bot
        )));
    }

    #[test]
    fn test_blast_bounces_once_and_settles() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        let (bot, mut events) = herald_blasts(&mut sim, Vec3::new(16.7, 0.0, 0.0), Vec3::new(17.7, 1.0, 0.0));
        events.extend(run(&mut sim, 240, &idle()));

        assert_eq!(bounces_of(&events, &bot), 1);
        assert!(!events
            .iter()
            .any(|e| matches!(&e.data, GameEventData::FellOut { victim, .. } if *victim == bot)));
        let body = sim.world().get(&bot).unwrap();
        assert!(body.grounded && !body.knockback);
        assert!(body.position.x > 17.7 && body.position.x < 20.0, "x {}", body.position.x);
    }

    #[test]
    fn test_herald_sprint_drops_latched_mortar() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        let config = sim.config().clone();
        if let Some(local) = sim.world_mut().local_mut() {
            local.apply_profile(CharacterKind::Herald, &config.herald);
        }
        let pad = |buttons: GamepadButtons| InputDevices::gamepad(GamepadState { axes: [0.0; 4], buttons });

        sim.step(DT, &pad(GamepadButtons { rb: true, ..Default::default() }));
        assert!(sim.input().mortar_hold_active());

        // LT with RT and B on the same tick: the gate lands before weapons read
        let report = sim.step(DT, &pad(GamepadButtons { lt: true, rt: true, b: true, ..Default::default() }));
        assert!(!sim.input().mortar_hold_active());
        assert!(!sim.input().last_snapshot().mortar_hold_active);
        assert!(sim.input().ability_inputs_blocked());
        assert!(sim.abilities().sprint_gate_active());
        assert!(sim.projectiles().is_empty());
        assert!(!report
            .events
            .iter()
            .any(|e| matches!(e.data, GameEventData::MortarExploded { .. } | GameEventData::AbilityUsed { .. })));

        run(&mut sim, 5, &pad(GamepadButtons { lt: true, rt: true, ..Default::default() }));
        assert!(sim.projectiles().is_empty());

        sim.step(DT, &pad(GamepadButtons::default()));
        assert!(!sim.input().ability_inputs_blocked());
    }

    #[test]
    fn test_double_jump_window() {
        let (mut sim, _link) = sim_for("solo", GameMode::Training);
        run(&mut sim, 5, &idle());
        assert!(sim.world().local().unwrap().grounded);

        let first = sim.step(DT, &keys(&["Space"])).events;
        assert!(first
            .iter()
            .any(|e| matches!(e.data, GameEventData::Jumped { double: false, .. })));
        run(&mut sim, 14, &idle());

        let second = sim.step(DT, &keys(&["Space"])).events;
        assert!(second
            .iter()
            .any(|e| matches!(e.data, GameEventData::Jumped { double: true, .. })));
        let vy = sim.world().local().unwrap().velocity.y;
        let expected = sim.config().lucy.movement.double_jump_velocity - sim.config().entity.gravity * DT;
        assert!((vy - expected).abs() < 1e-3, "vy {vy}");
    }

    #[test]
    fn test_late_second_press_ignored_in_air() {
        let (mut sim, _link) = sim_for("solo", GameMode::Training);
        run(&mut sim, 5, &idle());
        sim.step(DT, &keys(&["Space"]));
        run(&mut sim, 35, &idle());

        let events = sim.step(DT, &keys(&["Space"])).events;
        assert!(!events.iter().any(|e| matches!(e.data, GameEventData::Jumped { .. })));
        let local = sim.world().local().unwrap();
        assert!(!local.grounded);
        assert!(local.velocity.y <= 0.0);
    }

    #[test]
    fn test_fallout_without_push_has_no_killer() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        let bot = dummy_bot(&mut sim, CharacterKind::Lucy, Vec3::new(30.0, 1.0, 0.0));
        let events = run(&mut sim, 90, &idle());
        assert!(events.iter().any(|e| matches!(
            &e.data,
            GameEventData::FellOut { victim, pusher: None } if *victim == bot
        )));
        assert_eq!(sim.world().score(&bot).deaths, 1);
        assert!(!events
            .iter()
            .any(|e| matches!(e.data, GameEventData::KillCredited { .. })));
    }

    #[test]
    fn test_death_fade_then_respawn_or_despawn() {
        let (mut sim, _link) = sim_for("solo", GameMode::Deathmatch);
        let bot = dummy_bot(&mut sim, CharacterKind::Lucy, Vec3::new(5.0, 1.0, 0.0));
        run(&mut sim, 2, &idle());
        sim.world_mut().kill(&bot, None, DamageSource::Hazard);
        let events = run(&mut sim, 80, &idle());
        assert!(sim.world().get(&bot).is_none());
        assert!(events
            .iter()
            .any(|e| matches!(&e.data, GameEventData::Despawned { id } if *id == bot)));

        let (mut sim, _link) = sim_for("solo", GameMode::Training);
        let bot = dummy_bot(&mut sim, CharacterKind::Lucy, Vec3::new(5.0, 1.0, 0.0));
        run(&mut sim, 2, &idle());
        sim.world_mut().kill(&bot, None, DamageSource::Hazard);
        run(&mut sim, 80, &idle());
        let body = sim.world().get(&bot).unwrap();
        assert!(body.is_alive());
        assert_eq!(body.health, body.max_health);
    }

    #[test]
    fn test_remote_mirror_resyncs_after_respawn() {
        let (mut alice, mut link_a) = sim_for("alice", GameMode::Deathmatch);
        let (mut bob, link_b) = sim_for("bob", GameMode::Deathmatch);

        alice.step(DT, &idle());
        link_a.relay_to(&link_b);
        bob.step(DT, &idle());
        let mirror = EntityId::remote("alice");
        assert!(bob.world().get(&mirror).is_some());

        alice.world_mut().kill(&EntityId::local(), None, DamageSource::Fallout);
        let mut saw_dead = false;
        for _ in 0..90 {
            alice.step(DT, &idle());
            link_a.relay_to(&link_b);
            bob.step(DT, &idle());
            saw_dead |= bob.world().get(&mirror).is_some_and(|m| m.dead);
        }
        assert!(saw_dead);

        let local = alice.world().local().unwrap();
        assert!(local.is_alive());
        assert_eq!(local.health, local.max_health);
        let remote = bob.world().get(&mirror).unwrap();
        assert!(!remote.dead);
        assert_eq!(remote.health, remote.max_health);
    }

    #[test]
    fn test_pause_renders_without_simulating() {
        let (mut sim, _link) = sim_for("solo", GameMode::Training);
        assert!(sim.frame(0.0, &idle()).is_none());

        sim.start(0.0);
        let report = sim.frame(0.016, &idle()).unwrap();
        assert!(report.simulated);
        assert_eq!(report.tick, 1);

        sim.pause();
        let report = sim.frame(0.032, &idle()).unwrap();
        assert!(!report.simulated);
        assert_eq!(sim.world().tick, 1);
        assert!(report.frame.entity(&EntityId::local()).is_some());

        sim.resume();
        assert!(sim.frame(0.048, &idle()).unwrap().simulated);
        sim.stop();
        assert!(sim.frame(0.064, &idle()).is_none());
    }

    #[test]
    fn test_bad_deltas_are_sanitized() {
        let (mut sim, _link) = sim_for("solo", GameMode::Training);
        assert_eq!(sim.step(f32::NAN, &idle()).dt, DT_DEFAULT);
        assert_eq!(sim.step(-1.0, &idle()).dt, DT_DEFAULT);
        assert_eq!(sim.step(1.0, &idle()).dt, DT_MAX);

        sim.start(10.0);
        let report = sim.frame(9.0, &idle()).unwrap();
        assert_eq!(report.dt, DT_DEFAULT);
    }

    #[test]
    fn test_mode_change_clears_combat_state() {
        let (mut sim, _link) = sim_at("solo", GameMode::Deathmatch, None);
        sim.spawn_bots(2);
        run(&mut sim, 3, &mouse(true, false, Vec3::new(6.0, 0.0, 0.0)));
        assert!(!sim.projectiles().is_empty());
        sim.world_mut().local_mut().unwrap().health = 40.0;

        sim.set_mode(GameMode::Explore);
        assert!(sim.bots().is_empty());
        assert!(sim.world().ids_with_role(EntityRole::Bot).is_empty());
        assert!(sim.projectiles().is_empty());
        assert!(sim.poison().is_empty());
        let local = sim.world().local().unwrap();
        assert_eq!(local.health, local.max_health);
        assert_eq!(sim.mode(), GameMode::Explore);
    }

    #[test]
    fn test_seeded_runs_match() {
        let play = || {
            let (mut sim, _link) = sim_at("solo", GameMode::Deathmatch, None);
            sim.spawn_bots(3);
            run(&mut sim, 240, &idle());
            sim.world()
                .entities
                .values()
                .map(|e| (e.id.clone(), e.position, e.health))
                .collect::<Vec<_>>()
        };
        assert_eq!(play(), play());
    }
}
