//! Error Types
//!
//! One enum per layer. Nothing here ever aborts a tick: the driver logs
//! stage errors and carries on.

pub use crate::config::ConfigError;

/// Simulation errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Entity id not present in the world.
    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    /// Configuration rejected.
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    /// A simulation stage produced an unusable value.
    #[error("Stage `{stage}` failed: {reason}")]
    Stage {
        /// Stage name
        stage: &'static str,
        /// What went wrong
        reason: String,
    },

    /// Replication failure.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

impl CoreError {
    /// Build a stage error.
    pub fn stage(stage: &'static str, reason: impl Into<String>) -> Self {
        CoreError::Stage {
            stage,
            reason: reason.into(),
        }
    }
}

/// Replication message errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// JSON frame could not be decoded.
    #[error("Malformed JSON frame: {0}")]
    Json(#[from] serde_json::Error),

    /// Binary frame could not be decoded.
    #[error("Malformed binary frame: {0}")]
    Binary(#[from] bincode::Error),

    /// Message claims to come from this peer.
    #[error("Loopback message from own peer id {0}")]
    Loopback(String),

    /// Sender id is empty.
    #[error("Message without sender")]
    MissingSender,

    /// Sender id collides with a locally reserved entity id.
    #[error("Reserved sender id: {0}")]
    ReservedSender(String),

    /// Message carries non-finite numbers.
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),

    /// Message references a projectile that does not exist.
    #[error("Unknown projectile: {0}")]
    UnknownProjectile(String),
}

/// Gamepad read failures. Any of these demotes input to keyboard mode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputSourceError {
    /// Pad was unplugged.
    #[error("Gamepad disconnected")]
    Disconnected,

    /// Host gamepad API threw.
    #[error("Gamepad API error: {0}")]
    Api(String),
}
