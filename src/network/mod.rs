//! Network Layer
//!
//! Peer-to-peer replication. The core never touches a socket: envelopes
//! leave through an unbounded queue and inbound frames arrive on another,
//! both drained synchronously inside the tick.

pub mod protocol;
pub mod replication;

pub use protocol::{
    Envelope, InboundFrame, PlayerDamageMessage, PlayerStateMessage, ProjectileCreateMessage,
    ProjectileUpdateMessage, ReplicationMessage,
};
pub use replication::{Appearance, PeerLink, RemotePeer, ReplicationStats, Replicator};
