//! Explore-Mode Entities
//!
//! Collectibles, hazards and checkpoints. Only active outside combat
//! modes; the manager is cleared on every mode change.

use std::collections::BTreeMap;

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::collision::{Aabb, CollisionProvider};
use super::events::{DamageSource, GameEventData};
use super::state::{EntityId, World};
use crate::core::math::distance_xz;
use crate::core::rng::DeterministicRng;

/// Pickup radius used by [`EntityManager::scatter_collectibles`].
pub const DEFAULT_PICKUP_RADIUS: f32 = 0.8;

/// A pickup worth score points.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Collectible {
    /// Unique id
    pub id: u32,
    /// Where it floats
    pub position: Vec3,
    /// Points awarded
    pub value: u32,
    /// Pickup radius (XZ)
    pub radius: f32,
    /// Already taken
    pub collected: bool,
}

/// Region that hurts while an entity stands in it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Hazard {
    /// Volume
    pub area: Aabb,
    /// Health lost per second inside
    pub damage_per_second: f32,
}

/// Ordered respawn marker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Order along the course
    pub index: u32,
    /// Respawn feet position
    pub position: Vec3,
    /// Trigger radius (XZ)
    pub radius: f32,
    /// Touched at least once
    pub reached: bool,
}

/// Owner of all explore-mode props.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct EntityManager {
    collectibles: BTreeMap<u32, Collectible>,
    hazards: Vec<Hazard>,
    checkpoints: Vec<Checkpoint>,
    last_checkpoint: Option<u32>,
    next_id: u32,
}

impl EntityManager {
    /// Empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a collectible; returns its id.
    pub fn add_collectible(&mut self, position: Vec3, value: u32, radius: f32) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        self.collectibles.insert(
            id,
            Collectible {
                id,
                position,
                value,
                radius,
                collected: false,
            },
        );
        id
    }

    /// Scatter `count` collectibles over the arena, `margin` from the edge.
    ///
    /// One in five is worth 5 points, the rest 1.
    pub fn scatter_collectibles(&mut self, rng: &mut DeterministicRng, count: u32, half_size: f32, margin: f32) {
        for _ in 0..count {
            let (x, z) = rng.point_in_square(half_size - margin);
            let value = if rng.next_int(5) == 0 { 5 } else { 1 };
            self.add_collectible(Vec3::new(x, 1.0, z), value, DEFAULT_PICKUP_RADIUS);
        }
    }

    /// Add a hazard volume.
    pub fn add_hazard(&mut self, area: Aabb, damage_per_second: f32) {
        self.hazards.push(Hazard {
            area,
            damage_per_second,
        });
    }

    /// Add the next checkpoint in course order; returns its index.
    pub fn add_checkpoint(&mut self, position: Vec3, radius: f32) -> u32 {
        let index = self.checkpoints.len() as u32;
        self.checkpoints.push(Checkpoint {
            index,
            position,
            radius,
            reached: false,
        });
        index
    }

    /// All collectibles in id order.
    pub fn collectibles(&self) -> impl Iterator<Item = &Collectible> {
        self.collectibles.values()
    }

    /// Collectibles not yet taken.
    pub fn remaining(&self) -> usize {
        self.collectibles.values().filter(|c| !c.collected).count()
    }

    /// Hazards.
    pub fn hazards(&self) -> &[Hazard] {
        &self.hazards
    }

    /// Checkpoints in course order.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Highest checkpoint reached.
    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.last_checkpoint.and_then(|i| self.checkpoints.get(i as usize))
    }

    /// Respawn feet position from the last checkpoint.
    pub fn respawn_point(&self) -> Option<Vec3> {
        self.last_checkpoint().map(|c| c.position)
    }

    /// Put every collectible back and forget progress.
    pub fn reset_progress(&mut self) {
        for c in self.collectibles.values_mut() {
            c.collected = false;
        }
        for cp in self.checkpoints.iter_mut() {
            cp.reached = false;
        }
        self.last_checkpoint = None;
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Pickups and checkpoints for the local player, hazard damage for
    /// every simulated entity.
    ///
    /// Checkpoints only advance; touching an earlier one does nothing.
    pub fn update(&mut self, world: &mut World, collider: &mut dyn CollisionProvider, half_height: f32, dt: f32) {
        if world.mode.is_combat() {
            return;
        }
        self.apply_hazards(world, half_height, dt);

        let Some(player) = world.local().filter(|p| p.is_alive()) else {
            return;
        };
        let position = player.position;
        let feet = player.feet(half_height);
        let local = EntityId::local();

        for c in self.collectibles.values_mut() {
            if c.collected || distance_xz(c.position, position) > c.radius {
                continue;
            }
            if (c.position.y - position.y).abs() > half_height + c.radius {
                continue;
            }
            c.collected = true;
            world.scores.entry(local.clone()).or_default().points += c.value;
            debug!(collectible = c.id, value = c.value, "collected");
            world.push_event(GameEventData::Collected {
                id: local.clone(),
                collectible: c.id,
                value: c.value,
            });
        }

        let next = self.last_checkpoint.map_or(0, |i| i + 1);
        let touched = self
            .checkpoints
            .iter()
            .filter(|cp| cp.index >= next && distance_xz(cp.position, feet) <= cp.radius)
            .map(|cp| cp.index)
            .max();
        if let Some(index) = touched {
            if let Some(cp) = self.checkpoints.get_mut(index as usize) {
                cp.reached = true;
                self.last_checkpoint = Some(index);
                info!(index, "checkpoint reached");
                collider.update_respawn_system(world.mode, Some(cp.position));
                world.push_event(GameEventData::CheckpointReached {
                    id: local,
                    index,
                    position: cp.position,
                });
            }
        }
    }

    fn apply_hazards(&self, world: &mut World, half_height: f32, dt: f32) {
        if self.hazards.is_empty() {
            return;
        }
        let exposed: Vec<(EntityId, f32)> = world
            .entities
            .values()
            .filter(|e| e.role.is_simulated() && e.is_targetable())
            .filter_map(|e| {
                let feet = e.feet(half_height);
                let dps: f32 = self
                    .hazards
                    .iter()
                    .filter(|h| h.area.contains(e.position) || h.area.contains(feet))
                    .map(|h| h.damage_per_second)
                    .sum();
                (dps > 0.0).then(|| (e.id.clone(), dps * dt))
            })
            .collect();
        for (id, amount) in exposed {
            world.apply_damage(&id, amount, DamageSource::Hazard, None);
        }
    }
}
