//! Game Logic Module
//!
//! Everything that runs inside a tick. Iteration over entities is in id
//! order and all randomness comes from the world's seeded generator, so a
//! seed plus an input stream reproduces a match.
//!
//! ## Module Structure
//!
//! - `state`: Entities, roles, scores and the world container
//! - `character`: Movement, jumping, knockback, death and respawn
//! - `collision`: Arena geometry and the collision provider seam
//! - `input`: Keyboard and gamepad routing into per-tick snapshots
//! - `projectile`: Bolts, mortars and splash areas
//! - `ability`: Melee, specials, heal, reload, swap and boost
//! - `effects`: Poison ledger
//! - `push`: Knockback attribution for fallout kills
//! - `bot`: AI controllers
//! - `entities`: Explore-mode collectibles, hazards and checkpoints
//! - `render`: Visual timers and render frames
//! - `bridge`: Optional renderer, particle, sound and rumble hooks
//! - `events`: Events emitted during a tick
//! - `tick`: The simulation driver

pub mod ability;
pub mod bot;
pub mod bridge;
pub mod character;
pub mod collision;
pub mod effects;
pub mod entities;
pub mod events;
pub mod input;
pub mod projectile;
pub mod push;
pub mod render;
pub mod state;
pub mod tick;

// Re-export key types
pub use collision::{ArenaCollider, CollisionProvider};
pub use events::{GameEvent, GameEventData};
pub use input::{InputDevices, InputSnapshot};
pub use state::{CharacterKind, Entity, EntityId, EntityRole, GameMode, World};
pub use tick::{RunState, Simulation, TickReport};
