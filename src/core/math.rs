//! Vector and Timestep Helpers
//!
//! Thin helpers over `glam` for the XZ-plane arithmetic the simulation
//! does everywhere (arena distances, knockback directions, aim vectors).

use glam::{Vec2, Vec3};

/// Lower clamp for a frame delta (seconds).
pub const DT_MIN: f32 = 0.0001;

/// Upper clamp for a frame delta (seconds).
pub const DT_MAX: f32 = 0.033;

/// Delta used when the host clock produces garbage.
pub const DT_DEFAULT: f32 = 0.016;

/// Tolerance for "resting on the ground" comparisons.
pub const GROUND_EPSILON: f32 = 1e-3;

/// Sanitize a raw frame delta.
///
/// Non-finite or non-positive values fall back to [`DT_DEFAULT`];
/// everything else is clamped into `[DT_MIN, DT_MAX]`.
#[inline]
pub fn sanitize_dt(raw: f64) -> f32 {
    if !raw.is_finite() || raw <= 0.0 {
        return DT_DEFAULT;
    }
    (raw as f32).clamp(DT_MIN, DT_MAX)
}

/// Project a 3D point onto the XZ plane.
#[inline]
pub fn xz(v: Vec3) -> Vec2 {
    Vec2::new(v.x, v.z)
}

/// Lift an XZ vector back to 3D at height `y`.
#[inline]
pub fn from_xz(v: Vec2, y: f32) -> Vec3 {
    Vec3::new(v.x, y, v.y)
}

/// Horizontal component of a 3D vector (y zeroed).
#[inline]
pub fn horizontal(v: Vec3) -> Vec3 {
    Vec3::new(v.x, 0.0, v.z)
}

/// Distance between two points measured on the XZ plane.
#[inline]
pub fn distance_xz(a: Vec3, b: Vec3) -> f32 {
    xz(a).distance(xz(b))
}

/// Unit vector on the XZ plane from `from` towards `to`.
///
/// Returns `None` when the points coincide horizontally.
#[inline]
pub fn direction_xz(from: Vec3, to: Vec3) -> Option<Vec3> {
    let d = horizontal(to - from);
    let len = d.length();
    if len > 1e-5 {
        Some(d / len)
    } else {
        None
    }
}

/// Rotate an XZ direction (y ignored) around the vertical axis.
#[inline]
pub fn rotate_y(v: Vec3, angle: f32) -> Vec3 {
    let (s, c) = angle.sin_cos();
    Vec3::new(v.x * c + v.z * s, v.y, -v.x * s + v.z * c)
}

/// Yaw (radians) of a horizontal direction; 0 faces +Z.
#[inline]
pub fn yaw_of(dir: Vec3) -> f32 {
    dir.x.atan2(dir.z)
}

/// True when every component is finite.
#[inline]
pub fn is_finite_vec3(v: Vec3) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}

/// Replace non-finite components with zero.
#[inline]
pub fn finite_or_zero(v: Vec3) -> Vec3 {
    if is_finite_vec3(v) {
        v
    } else {
        Vec3::ZERO
    }
}

/// A ray in world space (used for mouse picking).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (need not be normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray.
    pub const fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    /// Intersect with the horizontal plane `y = plane_y`.
    ///
    /// Returns `None` for rays parallel to the plane or pointing away from it.
    pub fn intersect_ground(&self, plane_y: f32) -> Option<Vec3> {
        let dy = self.direction.y;
        if dy.abs() < 1e-6 {
            return None;
        }
        let t = (plane_y - self.origin.y) / dy;
        if t < 0.0 || !t.is_finite() {
            return None;
        }
        Some(self.origin + self.direction * t)
    }
}
