//! Collision Queries
//!
//! Wall, ground and line-of-sight queries against axis-aligned boxes.
//! The simulation only talks to the [`CollisionProvider`] trait; the
//! bundled [`ArenaCollider`] is a flat square arena with optional walls.

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::game::state::GameMode;

// =============================================================================
// AABB
// =============================================================================

/// Axis-aligned bounding box.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Box from corners (reordered if needed).
    pub fn new(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Box centred on `center` with half extents.
    pub fn from_center(center: Vec3, half: Vec3) -> Self {
        Self::new(center - half, center + half)
    }

    /// Overlap test (touching counts as no overlap).
    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Point containment (inclusive).
    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// True if the XZ footprint square `[x±size, z±size]` overlaps this box.
    #[inline]
    pub fn overlaps_footprint(&self, x: f32, z: f32, size: f32) -> bool {
        x + size > self.min.x && x - size < self.max.x && z + size > self.min.z && z - size < self.max.z
    }
}

/// Footprint box of a body of half-width `size` centred at `point`.
#[inline]
pub fn footprint(point: Vec3, size: f32) -> Aabb {
    Aabb::from_center(point, Vec3::splat(size))
}

// =============================================================================
// PROVIDER
// =============================================================================

/// Collision collaborator consumed by the core.
pub trait CollisionProvider {
    /// True if a footprint of half-width `size` at `point` overlaps a wall.
    fn will_collide(&self, point: Vec3, size: f32) -> bool;

    /// Highest floor top under the footprint, `None` over the void.
    fn ground_height(&self, x: f32, z: f32, size: f32) -> Option<f32>;

    /// Whether `mode` uses the perimeter walls.
    fn walls_for_mode(&self, mode: GameMode) -> bool {
        !mode.is_combat()
    }

    /// Called on mode change and when a checkpoint moves the respawn point.
    fn update_respawn_system(&mut self, _mode: GameMode, _checkpoint: Option<Vec3>) {}

    /// Provider-chosen respawn point (feet position), if any.
    fn respawn_point(&self, _mode: GameMode) -> Option<Vec3> {
        None
    }
}

/// Square arena: floor slabs plus free-standing walls and an optional
/// perimeter that is raised only in modes that want it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArenaCollider {
    /// Walkable slabs
    pub floors: Vec<Aabb>,
    /// Obstacles
    pub walls: Vec<Aabb>,
    /// Edge walls (active per mode)
    pub perimeter: Vec<Aabb>,
    /// Perimeter currently raised
    pub perimeter_active: bool,
    /// Last checkpoint reported by the core
    pub checkpoint: Option<Vec3>,
}

impl ArenaCollider {
    /// Flat floor covering `[-half_size, half_size]²` with its top at y = 0.
    pub fn new(half_size: f32) -> Self {
        let h = half_size;
        let t = 1.0;
        let height = 4.0;
        Self {
            floors: vec![Aabb::new(Vec3::new(-h, -1.0, -h), Vec3::new(h, 0.0, h))],
            walls: Vec::new(),
            perimeter: vec![
                Aabb::new(Vec3::new(-h - t, 0.0, -h - t), Vec3::new(h + t, height, -h)),
                Aabb::new(Vec3::new(-h - t, 0.0, h), Vec3::new(h + t, height, h + t)),
                Aabb::new(Vec3::new(-h - t, 0.0, -h), Vec3::new(-h, height, h)),
                Aabb::new(Vec3::new(h, 0.0, -h), Vec3::new(h + t, height, h)),
            ],
            perimeter_active: false,
            checkpoint: None,
        }
    }

    /// Add an obstacle.
    pub fn with_wall(mut self, wall: Aabb) -> Self {
        self.walls.push(wall);
        self
    }

    /// Add a walkable slab.
    pub fn with_floor(mut self, floor: Aabb) -> Self {
        self.floors.push(floor);
        self
    }

    fn active_walls(&self) -> impl Iterator<Item = &Aabb> {
        let perimeter: &[Aabb] = if self.perimeter_active { &self.perimeter } else { &[] };
        self.walls.iter().chain(perimeter.iter())
    }
}

impl CollisionProvider for ArenaCollider {
    fn will_collide(&self, point: Vec3, size: f32) -> bool {
        let probe = footprint(point, size);
        self.active_walls().any(|w| w.intersects(&probe))
    }

    fn ground_height(&self, x: f32, z: f32, size: f32) -> Option<f32> {
        self.floors
            .iter()
            .filter(|f| f.overlaps_footprint(x, z, size))
            .map(|f| f.max.y)
            .fold(None, |best: Option<f32>, y| Some(best.map_or(y, |b| b.max(y))))
    }

    fn update_respawn_system(&mut self, mode: GameMode, checkpoint: Option<Vec3>) {
        self.perimeter_active = self.walls_for_mode(mode);
        self.checkpoint = checkpoint;
    }

    fn respawn_point(&self, mode: GameMode) -> Option<Vec3> {
        match mode {
            GameMode::Explore => self.checkpoint,
            _ => None,
        }
    }
}

// =============================================================================
// MOVEMENT HELPERS
// =============================================================================

/// Move `pos` by horizontal `delta`, sliding along walls.
///
/// Tries the full step first; on collision each axis is tried on its own.
/// Returns the new position and whether a wall was hit.
pub fn slide_move(collider: &dyn CollisionProvider, pos: Vec3, delta: Vec3, size: f32) -> (Vec3, bool) {
    let full = pos + Vec3::new(delta.x, 0.0, delta.z);
    if !collider.will_collide(full, size) {
        return (full, false);
    }

    let mut out = pos;
    let try_x = out + Vec3::new(delta.x, 0.0, 0.0);
    if delta.x != 0.0 && !collider.will_collide(try_x, size) {
        out = try_x;
    }
    let try_z = out + Vec3::new(0.0, 0.0, delta.z);
    if delta.z != 0.0 && !collider.will_collide(try_z, size) {
        out = try_z;
    }
    (out, true)
}

// =============================================================================
// LINE OF SIGHT
// =============================================================================

/// Default fraction of blocked samples above which sight is lost.
pub const DEFAULT_BLOCKAGE_THRESHOLD: f32 = 0.3;

/// Sampled line-of-sight result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineOfSight {
    /// Sight is clear
    pub clear: bool,
    /// Blocked samples / samples checked
    pub blockage_percentage: f32,
    /// Distance from `a` to the nearest blocked sample (None if unblocked)
    pub blocked_distance: Option<f32>,
    /// Samples evaluated before returning
    pub samples_checked: u32,
}

/// Sample the segment `a..b` against walls.
///
/// 4 to 10 samples at `t = (i + 0.5) / n`, each tested as a footprint
/// widened to `radius * 1.5`. Sight is lost when more than `threshold` of
/// the samples are blocked, or immediately when two of the first three
/// are. Endpoints are put in canonical order first so the result does not
/// depend on which end the caller passes first.
pub fn has_line_of_sight(
    collider: &dyn CollisionProvider,
    a: Vec3,
    b: Vec3,
    radius: f32,
    threshold: f32,
) -> LineOfSight {
    let length = a.distance(b);
    if !length.is_finite() || length < 1e-4 {
        return LineOfSight {
            clear: true,
            blockage_percentage: 0.0,
            blocked_distance: None,
            samples_checked: 0,
        };
    }

    let (start, end) = if lexi_less(b, a) { (b, a) } else { (a, b) };
    let spacing = (radius * 2.0).max(0.25);
    let n = ((length / spacing).ceil() as u32).clamp(4, 10);
    let probe = radius * 1.5;

    let mut blocked = 0u32;
    let mut checked = 0u32;
    let mut nearest: Option<f32> = None;
    let mut early_exit = false;

    for i in 0..n {
        let t = (i as f32 + 0.5) / n as f32;
        let p = start.lerp(end, t);
        checked += 1;
        if collider.will_collide(p, probe) {
            blocked += 1;
            let d = a.distance(p);
            nearest = Some(nearest.map_or(d, |best: f32| best.min(d)));
        }
        if checked == 3 && blocked >= 2 {
            early_exit = true;
            break;
        }
    }

    let blockage = blocked as f32 / checked as f32;
    LineOfSight {
        clear: !early_exit && blockage <= threshold,
        blockage_percentage: blockage,
        blocked_distance: nearest,
        samples_checked: checked,
    }
}

fn lexi_less(a: Vec3, b: Vec3) -> bool {
    (a.x, a.y, a.z) < (b.x, b.y, b.z)
}

// =============================================================================
// TESTS
// =============================================================================
