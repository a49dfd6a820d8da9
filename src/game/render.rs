//! Render Proxies and Core-Owned Visual Timers
//!
//! The renderer never sees core state directly. Each tick produces a
//! [`RenderFrame`] with read-only proxies plus the short-lived visuals the
//! core animates itself (sword circles, blast rings, mortar preview).

use glam::Vec3;
use serde::{Deserialize, Serialize};

use super::projectile::{ProjectileKind, ProjectileSystem};
use super::state::{AnimKey, CharacterKind, Entity, EntityId, EntityRole, Facing, World};

/// What the renderer needs to draw one entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RenderProxy {
    /// Entity id
    pub id: EntityId,
    /// Local / bot / remote
    pub role: EntityRole,
    /// Character skin
    pub character: CharacterKind,
    /// World position (capsule center)
    pub position: Vec3,
    /// Heading
    pub yaw: f32,
    /// Sprite facing
    pub facing: Facing,
    /// Animation
    pub anim_key: AnimKey,
    /// Health bar fill
    pub health_fraction: f32,
    /// Drawn at all
    pub visible: bool,
    /// Fades to zero while dying
    pub opacity: f32,
    /// Tint for poison
    pub poisoned: bool,
}

impl RenderProxy {
    /// Snapshot an entity.
    pub fn from_entity(entity: &Entity, fade_duration: f32) -> Self {
        let opacity = if entity.dead {
            0.0
        } else if entity.is_dying && fade_duration > 0.0 {
            (entity.death_fade / fade_duration).clamp(0.0, 1.0)
        } else {
            1.0
        };
        Self {
            id: entity.id.clone(),
            role: entity.role,
            character: entity.character,
            position: entity.position,
            yaw: entity.yaw,
            facing: entity.facing,
            anim_key: entity.anim_key,
            health_fraction: entity.health_fraction(),
            visible: !entity.dead,
            opacity,
            poisoned: entity.poison_speed_multiplier.is_some(),
        }
    }
}

/// Projectile sprite.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectileProxy {
    /// Network id
    pub id: String,
    /// Bolt or mortar
    pub kind: ProjectileKind,
    /// Color source
    pub character: CharacterKind,
    /// Position
    pub position: Vec3,
}

/// Splash decal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SplashProxy {
    /// Center
    pub center: Vec3,
    /// Radius
    pub radius: f32,
    /// Color source
    pub character: CharacterKind,
}

// =============================================================================
// VISUAL TIMERS
// =============================================================================

/// Expanding circle drawn around a sword swing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwordCircle {
    /// Swinging entity (the circle follows it)
    pub owner: EntityId,
    /// Current center
    pub center: Vec3,
    /// Swing radius
    pub radius: f32,
    /// RGB
    pub color: [f32; 3],
    /// Seconds left
    pub remaining: f32,
    /// Total seconds
    pub duration: f32,
}

/// Expanding blast ring.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlastRing {
    /// Center
    pub center: Vec3,
    /// Current radius
    pub radius: f32,
    /// Final radius
    pub max_radius: f32,
    /// Seconds left
    pub remaining: f32,
    /// Total seconds
    pub duration: f32,
}

/// Δt-driven visuals owned by the core.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VisualTimers {
    /// Active sword circles
    pub sword_circles: Vec<SwordCircle>,
    /// Active blast rings
    pub blast_rings: Vec<BlastRing>,
    /// Mortar arc polyline while aiming
    pub mortar_preview: Option<Vec<Vec3>>,
}

impl VisualTimers {
    /// Empty.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a sword circle.
    pub fn add_sword_circle(&mut self, owner: &EntityId, center: Vec3, radius: f32, color: [f32; 3], duration: f32) {
        self.sword_circles.push(SwordCircle {
            owner: owner.clone(),
            center,
            radius,
            color,
            remaining: duration,
            duration,
        });
    }

    /// Start a blast ring.
    pub fn add_blast_ring(&mut self, center: Vec3, max_radius: f32, duration: f32) {
        self.blast_rings.push(BlastRing {
            center,
            radius: 0.0,
            max_radius,
            remaining: duration,
            duration,
        });
    }

    /// Show or hide the mortar preview.
    pub fn set_mortar_preview(&mut self, points: Option<Vec<Vec3>>) {
        self.mortar_preview = points;
    }

    /// Drop a dead owner's circles (death cancels the swing).
    pub fn cancel_for(&mut self, owner: &EntityId) {
        self.sword_circles.retain(|c| &c.owner != owner);
    }

    /// Advance every timer; expired visuals are dropped.
    pub fn update(&mut self, dt: f32, world: &World) {
        for circle in self.sword_circles.iter_mut() {
            circle.remaining -= dt;
            if let Some(owner) = world.get(&circle.owner) {
                circle.center = owner.position;
            }
        }
        self.sword_circles.retain(|c| c.remaining > 0.0);

        for ring in self.blast_rings.iter_mut() {
            ring.remaining -= dt;
            let progress = if ring.duration > 0.0 { 1.0 - ring.remaining / ring.duration } else { 1.0 };
            ring.radius = ring.max_radius * progress.clamp(0.0, 1.0);
        }
        self.blast_rings.retain(|r| r.remaining > 0.0);
    }

    /// Drop everything (mode change).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

// =============================================================================
// FRAME
// =============================================================================

/// Everything the renderer draws this frame.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderFrame {
    /// Tick the frame was captured on
    pub tick: u64,
    /// Entities in id order
    pub entities: Vec<RenderProxy>,
    /// Projectiles
    pub projectiles: Vec<ProjectileProxy>,
    /// Splash decals
    pub splashes: Vec<SplashProxy>,
    /// Sword circles
    pub sword_circles: Vec<SwordCircle>,
    /// Blast rings
    pub blast_rings: Vec<BlastRing>,
    /// Mortar preview
    pub mortar_preview: Option<Vec<Vec3>>,
    /// Camera follow target (local player)
    pub camera_target: Option<Vec3>,
}

impl RenderFrame {
    /// Capture the current state.
    pub fn capture(world: &World, projectiles: &ProjectileSystem, visuals: &VisualTimers) -> Self {
        Self {
            tick: world.tick,
            entities: world
                .entities
                .values()
                .map(|e| RenderProxy::from_entity(e, world.death_fade_duration))
                .collect(),
            projectiles: projectiles
                .projectiles()
                .map(|p| ProjectileProxy {
                    id: p.network_id.0.clone(),
                    kind: p.kind,
                    character: p.character,
                    position: p.position,
                })
                .collect(),
            splashes: projectiles
                .splashes()
                .iter()
                .map(|s| SplashProxy {
                    center: s.center,
                    radius: s.radius,
                    character: s.character,
                })
                .collect(),
            sword_circles: visuals.sword_circles.clone(),
            blast_rings: visuals.blast_rings.clone(),
            mortar_preview: visuals.mortar_preview.clone(),
            camera_target: world.local().map(|e| e.position),
        }
    }

    /// Proxy for an id.
    pub fn entity(&self, id: &EntityId) -> Option<&RenderProxy> {
        self.entities.iter().find(|p| &p.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::game::character;
    use crate::game::state::GameMode;

    #[test]
    fn test_sword_circle_follows_owner_and_expires() {
        let config = CoreConfig::default();
        let mut world = World::new(1, GameMode::Deathmatch, 1.2);
        world.spawn(Entity::new(EntityId::local(), EntityRole::LocalPlayer, CharacterKind::Lucy, Vec3::Y, &config));
        let mut visuals = VisualTimers::new();
        visuals.add_sword_circle(&EntityId::local(), Vec3::Y, 2.5, [1.0, 0.0, 1.0], 0.5);

        if let Some(e) = world.local_mut() {
            e.position = Vec3::new(3.0, 1.0, 0.0);
        }
        visuals.update(0.1, &world);
        assert_eq!(visuals.sword_circles[0].center, Vec3::new(3.0, 1.0, 0.0));
        visuals.update(0.5, &world);
        assert!(visuals.sword_circles.is_empty());
    }

    #[test]
    fn test_blast_ring_expands() {
        let world = World::new(1, GameMode::Deathmatch, 1.2);
        let mut visuals = VisualTimers::new();
        visuals.add_blast_ring(Vec3::ZERO, 3.0, 0.4);
        visuals.update(0.2, &world);
        assert!((visuals.blast_rings[0].radius - 1.5).abs() < 1e-5);
    }

    #[test]
    fn test_proxy_fades_while_dying() {
        let config = CoreConfig::default();
        let mut e = Entity::new(EntityId::bot(1), EntityRole::Bot, CharacterKind::Herald, Vec3::Y, &config);
        character::play_death_animation(&mut e, 1.2);
        e.death_fade = 0.6;
        let proxy = RenderProxy::from_entity(&e, 1.2);
        assert!((proxy.opacity - 0.5).abs() < 1e-6);
        assert!(proxy.visible);
    }
}
