//! # Arena Clash Core
//!
//! Simulation core for a small arena combat game. Each peer hosts its own
//! player and bots; remote players are mirrors driven by replication.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ARENA CLASH CORE                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config.rs       - Tunables, profiles, difficulty presets    │
//! │  error.rs        - Error enums per layer                     │
//! │                                                              │
//! │  core/           - Primitives                                │
//! │  ├── math.rs     - Vector helpers, delta sanitizing, rays    │
//! │  └── rng.rs      - Seeded Xorshift128+                       │
//! │                                                              │
//! │  game/           - Everything inside a tick                  │
//! │  ├── state.rs    - Entities, scores, world                   │
//! │  ├── character.rs- Movement, knockback, death, respawn       │
//! │  ├── input.rs    - Keyboard and gamepad routing              │
//! │  ├── projectile.rs - Bolts, mortars, splash areas            │
//! │  ├── ability.rs  - Melee, specials, heal, swap               │
//! │  ├── bot.rs      - AI controllers                            │
//! │  └── tick.rs     - Simulation driver                         │
//! │                                                              │
//! │  network/        - Replication                               │
//! │  ├── protocol.rs - Envelopes and messages                    │
//! │  └── replication.rs - Inbound/outbound queues, mirrors       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! Entities live in `BTreeMap`s and every random decision draws from the
//! world's seeded generator. Two simulations built from the same seed and
//! fed the same inputs produce the same world.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod error;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use config::{CoreConfig, Difficulty, Environment};
pub use core::rng::DeterministicRng;
pub use error::{CoreError, ProtocolError};
pub use game::state::{CharacterKind, EntityId, GameMode, World};
pub use game::tick::{RunState, Simulation, TickReport};
pub use network::replication::PeerLink;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Nominal host frame rate (Hz)
pub const FRAME_RATE: u32 = 60;
