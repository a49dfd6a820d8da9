//! Core primitives.
//!
//! Vector helpers, frame-delta sanitizing and the seeded generator shared
//! by every system.

pub mod math;
pub mod rng;

pub use math::{sanitize_dt, Ray, DT_DEFAULT, DT_MAX, DT_MIN};
pub use rng::DeterministicRng;
