//! Character State
//!
//! Per-entity physics and life cycle: jumps, gravity and levitation,
//! ground clamping with knockback bounce, wall-sliding movement, damage,
//! death fade and respawn. Players and bots run through the same code.

use glam::Vec3;

use crate::config::{EntityConfig, MovementConfig};
use crate::core::math::{finite_or_zero, horizontal, yaw_of, GROUND_EPSILON};
use crate::game::collision::{slide_move, CollisionProvider};
use crate::game::state::{AnimKey, Entity, Facing, KnockbackParams};

/// What happened during one movement step.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MovementOutcome {
    /// Touched ground this step after being airborne
    pub landed: bool,
    /// Knockback bounce on this landing
    pub bounced: bool,
    /// Landing speed (|v_y| at contact)
    pub impact_speed: f32,
    /// Horizontal move was clipped by a wall
    pub hit_wall: bool,
}

/// Per-step movement request.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveIntent {
    /// World-space XZ direction scaled by stick magnitude (length <= 1)
    pub direction: Vec3,
    /// Run multiplier applies
    pub running: bool,
    /// Levitate (jump held)
    pub fly: bool,
}

// =============================================================================
// JUMPING
// =============================================================================

/// Grounded jump. Returns false when airborne or dying.
pub fn jump(entity: &mut Entity, movement: &MovementConfig) -> bool {
    if !entity.grounded || !entity.is_alive() {
        return false;
    }
    entity.velocity.y = movement.jump_velocity;
    entity.grounded = false;
    entity.double_jump_used = false;
    entity.fly_descent = false;
    true
}

/// Airborne second jump. Once per airtime.
pub fn double_jump(entity: &mut Entity, movement: &MovementConfig) -> bool {
    if entity.grounded || entity.double_jump_used || !entity.is_alive() {
        return false;
    }
    entity.velocity.y = movement.double_jump_velocity;
    entity.double_jump_used = true;
    entity.fly_descent = false;
    true
}

// =============================================================================
// MOVEMENT
// =============================================================================

/// Advance one entity by `dt`.
///
/// Horizontal motion is the input velocity plus any knockback velocity,
/// applied with wall-sliding. Vertical motion integrates gravity unless
/// flying; landing clamps to the floor and may bounce a knocked-back body.
pub fn apply_movement(
    entity: &mut Entity,
    intent: MoveIntent,
    dt: f32,
    collider: &dyn CollisionProvider,
    movement: &MovementConfig,
    body: &EntityConfig,
) -> MovementOutcome {
    let mut outcome = MovementOutcome::default();
    if entity.dead {
        return outcome;
    }

    let half_height = body.half_height();
    let accepts_input = entity.is_alive();
    let dir = if accepts_input { finite_or_zero(horizontal(intent.direction)) } else { Vec3::ZERO };
    let dir = if dir.length_squared() > 1.0 { dir.normalize() } else { dir };

    let mut speed = movement.move_speed * entity.speed_multiplier();
    if intent.running && accepts_input {
        speed *= movement.run_speed_multiplier;
    }
    let input_velocity = dir * speed;

    // Horizontal: knockback carries its own velocity, input adds on top
    let carried = if entity.knockback { horizontal(entity.velocity) } else { Vec3::ZERO };
    let step = (input_velocity + carried) * dt;
    let before = entity.position;
    let (moved, hit_wall) = slide_move(collider, before, step, body.player_size);
    outcome.hit_wall = hit_wall;
    if hit_wall && entity.knockback {
        // Blocked components stop carrying knockback
        if (moved.x - (before.x + step.x)).abs() > 1e-6 {
            entity.velocity.x = 0.0;
        }
        if (moved.z - (before.z + step.z)).abs() > 1e-6 {
            entity.velocity.z = 0.0;
        }
    }
    entity.position.x = moved.x;
    entity.position.z = moved.z;
    if !entity.knockback {
        entity.velocity.x = input_velocity.x;
        entity.velocity.z = input_velocity.z;
    }

    // Vertical
    let flying = intent.fly && accepts_input && !entity.grounded && entity.velocity.y <= 0.0;
    if flying {
        entity.velocity.y = 0.0;
        entity.fly_descent = false;
    } else {
        if entity.flying && !entity.grounded {
            entity.fly_descent = true;
        }
        if !entity.grounded {
            entity.velocity.y -= body.gravity * dt;
            if entity.fly_descent {
                entity.velocity.y = entity.velocity.y.max(-body.fly_terminal_velocity);
            }
        }
    }
    entity.flying = flying;

    let ground = collider.ground_height(entity.position.x, entity.position.z, body.player_size);
    let next_y = entity.position.y + entity.velocity.y * dt;

    match ground {
        Some(g) if next_y <= g + half_height + GROUND_EPSILON && entity.velocity.y <= 0.0 => {
            let rest = g + half_height;
            if !entity.grounded {
                let impact = -entity.velocity.y;
                outcome.impact_speed = impact;
                if entity.knockback && entity.bounce_available && impact > entity.knockback_params.min_velocity {
                    entity.velocity.y = impact * entity.knockback_params.restitution;
                    entity.bounce_available = false;
                    entity.position.y = rest;
                    outcome.bounced = true;
                } else {
                    entity.velocity.y = 0.0;
                    entity.position.y = rest;
                    entity.grounded = true;
                    entity.double_jump_used = false;
                    entity.fly_descent = false;
                    outcome.landed = true;
                }
            } else {
                entity.velocity.y = 0.0;
                entity.position.y = rest;
            }
        }
        _ => {
            // Walked off an edge or onto lower ground
            if entity.grounded && ground.map_or(true, |g| entity.position.y > g + half_height + GROUND_EPSILON) {
                entity.grounded = false;
            }
            if !entity.grounded {
                entity.position.y = next_y;
            }
        }
    }

    if accepts_input {
        if let Some(facing) = Facing::from_direction(dir) {
            entity.facing = facing;
            entity.yaw = yaw_of(dir);
        }
    }
    entity.running = intent.running && dir.length_squared() > 0.0;
    entity.anim_key = pick_anim(entity, dir);
    outcome
}

fn pick_anim(entity: &Entity, dir: Vec3) -> AnimKey {
    if entity.is_dying || entity.dead {
        AnimKey::Death
    } else if entity.flying {
        AnimKey::Fly
    } else if !entity.grounded {
        if entity.velocity.y > 0.0 {
            AnimKey::Jump
        } else {
            AnimKey::Fall
        }
    } else if dir.length_squared() > 1e-4 {
        if entity.running {
            AnimKey::Run
        } else {
            AnimKey::Walk
        }
    } else {
        AnimKey::Idle
    }
}

/// Impose knockback velocity on an entity. `params` stays with the body
/// until the next push replaces it.
pub fn apply_knockback(entity: &mut Entity, horizontal_velocity: Vec3, vertical_velocity: f32, params: KnockbackParams) {
    entity.velocity.x = horizontal_velocity.x;
    entity.velocity.z = horizontal_velocity.z;
    entity.velocity.y = vertical_velocity;
    entity.grounded = false;
    entity.knockback = true;
    entity.bounce_available = true;
    entity.knockback_params = params;
}

/// Decay knockback velocity for one step.
///
/// The push's per-1/60 s factor applies in the air and on the ground,
/// rescaled to `dt`. The flag clears once both horizontal components drop
/// below the stop threshold on the ground.
pub fn decay_knockback(entity: &mut Entity, dt: f32, body: &EntityConfig) {
    if !entity.knockback {
        return;
    }
    let factor = entity.knockback_params.decay.clamp(0.0, 1.0).powf(dt * 60.0);
    entity.velocity.x *= factor;
    entity.velocity.z *= factor;

    let stop = body.knockback_stop_threshold;
    if entity.grounded && entity.velocity.x.abs() < stop && entity.velocity.z.abs() < stop {
        entity.velocity.x = 0.0;
        entity.velocity.z = 0.0;
        entity.knockback = false;
        entity.bounce_available = false;
    }
}

// =============================================================================
// HEALTH / DEATH / RESPAWN
// =============================================================================

/// Subtract health. Returns true if health crossed to zero on this call.
pub fn take_damage(entity: &mut Entity, amount: f32) -> bool {
    if amount <= 0.0 || entity.health <= 0.0 {
        return false;
    }
    entity.health = (entity.health - amount).clamp(0.0, entity.max_health);
    entity.health <= 0.0
}

/// Set health, clamped to `[0, max_health]`.
pub fn set_health(entity: &mut Entity, health: f32) {
    let value = if health.is_finite() { health } else { 0.0 };
    entity.health = value.clamp(0.0, entity.max_health);
}

/// Start the death animation and fade timer.
pub fn play_death_animation(entity: &mut Entity, fade_duration: f32) {
    entity.is_dying = true;
    entity.death_fade = fade_duration.max(0.0);
    entity.anim_key = AnimKey::Death;
    entity.running = false;
    entity.flying = false;
    entity.poison_speed_multiplier = None;
    entity.speed_boost_timer = 0.0;
}

/// Advance the fade. Returns true on the step it completes.
pub fn update_death_fade(entity: &mut Entity, dt: f32) -> bool {
    if !entity.is_dying {
        return false;
    }
    entity.death_fade -= dt;
    if entity.death_fade <= 0.0 {
        entity.death_fade = 0.0;
        entity.is_dying = false;
        entity.dead = true;
        return true;
    }
    false
}

/// Bring an entity back at `feet` with full health and fresh cooldowns.
pub fn respawn(entity: &mut Entity, feet: Vec3, body: &EntityConfig) {
    entity.position = feet + Vec3::Y * body.half_height();
    entity.velocity = Vec3::ZERO;
    entity.grounded = true;
    entity.is_dying = false;
    entity.dead = false;
    entity.health = entity.max_health;
    entity.knockback = false;
    entity.bounce_available = false;
    entity.poison_speed_multiplier = None;
    entity.death_fade = 0.0;
    entity.double_jump_used = false;
    entity.flying = false;
    entity.fly_descent = false;
    entity.speed_boost_timer = 0.0;
    entity.anim_key = AnimKey::Idle;
    entity.cooldowns.reset();
    entity.ammo.refill();
}

// =============================================================================
// TESTS
// =============================================================================
