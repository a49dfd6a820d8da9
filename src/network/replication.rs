//! Replication Step
//!
//! Applies inbound peer messages and emits outbound ones. Both directions
//! are tokio mpsc queues; the transport owns the other ends through a
//! [`PeerLink`]. Nothing here blocks: the tick drains what is queued and
//! moves on.
//!
//! Health is owner-authoritative. A peer never lowers a remote mirror's
//! health on its own; it asks the owner with a damage request and waits for
//! the owner's report.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::protocol::{
    Envelope, InboundFrame, PlayerDamageMessage, PlayerStateMessage, ProjectileCreateMessage,
    ProjectileUpdateMessage, ReplicationMessage,
};
use crate::config::CoreConfig;
use crate::core::math::is_finite_vec3;
use crate::error::ProtocolError;
use crate::game::character;
use crate::game::events::{DamageSource, GameEventData};
use crate::game::projectile::{NetworkId, ProjectileKind, ProjectileSystem, RemoteProjectile};
use crate::game::state::{CharacterKind, Entity, EntityId, EntityRole, World};

/// Remote appearance load progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Appearance {
    /// Renderer was asked for the character's look
    Requested,
    /// Renderer is loading it
    Loading,
    /// Drawn with the right look
    Ready,
}

/// What we know about one remote peer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePeer {
    /// Mirror entity id
    pub id: EntityId,
    /// Cached character
    pub character: CharacterKind,
    /// Appearance state
    pub appearance: Appearance,
    /// Highest sequence number seen
    pub last_seq: u64,
}

/// Message counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationStats {
    /// Envelopes queued outbound
    pub sent: u64,
    /// Envelopes applied
    pub applied: u64,
    /// Frames discarded as malformed or duplicate
    pub dropped: u64,
}

/// Transport side of the replication queues.
#[derive(Debug)]
pub struct PeerLink {
    /// Envelopes to deliver to peers
    pub outbound: mpsc::UnboundedReceiver<Envelope>,
    /// Frames received from peers
    pub inbound: mpsc::UnboundedSender<InboundFrame>,
}

impl PeerLink {
    /// Take everything queued outbound.
    pub fn drain(&mut self) -> Vec<Envelope> {
        let mut out = Vec::new();
        while let Ok(env) = self.outbound.try_recv() {
            out.push(env);
        }
        out
    }

    /// Hand a received frame to the replicator.
    pub fn deliver(&self, frame: impl Into<InboundFrame>) -> bool {
        self.inbound.send(frame.into()).is_ok()
    }

    /// Forward our outbound queue into another peer's inbound queue.
    pub fn relay_to(&mut self, other: &PeerLink) -> usize {
        let mut count = 0;
        while let Ok(env) = self.outbound.try_recv() {
            if !other.deliver(env) {
                break;
            }
            count += 1;
        }
        count
    }
}

/// Replication state for this peer.
#[derive(Debug)]
pub struct Replicator {
    peer_id: String,
    seq: u64,
    frames: u64,
    outbound: mpsc::UnboundedSender<Envelope>,
    inbound: mpsc::UnboundedReceiver<InboundFrame>,
    peers: BTreeMap<EntityId, RemotePeer>,
    seen_damage: BTreeSet<(String, u64)>,
    damage_order: VecDeque<(String, u64)>,
    health_dirty: bool,
    stats: ReplicationStats,
}

impl Replicator {
    /// Create a replicator and the transport's end of its queues.
    pub fn new(peer_id: impl Into<String>) -> (Self, PeerLink) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let replicator = Self {
            peer_id: peer_id.into(),
            seq: 0,
            frames: 0,
            outbound: out_tx,
            inbound: in_rx,
            peers: BTreeMap::new(),
            seen_damage: BTreeSet::new(),
            damage_order: VecDeque::new(),
            health_dirty: false,
            stats: ReplicationStats::default(),
        };
        let link = PeerLink {
            outbound: out_rx,
            inbound: in_tx,
        };
        (replicator, link)
    }

    /// Our peer id.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Known remote peers in id order.
    pub fn peers(&self) -> impl Iterator<Item = &RemotePeer> {
        self.peers.values()
    }

    /// One remote peer.
    pub fn peer(&self, id: &EntityId) -> Option<&RemotePeer> {
        self.peers.get(id)
    }

    /// Counters.
    pub fn stats(&self) -> ReplicationStats {
        self.stats
    }

    /// Renderer finished loading a remote's look.
    pub fn appearance_ready(&mut self, id: &EntityId) -> bool {
        match self.peers.get_mut(id) {
            Some(peer) => {
                peer.appearance = Appearance::Ready;
                true
            }
            None => false,
        }
    }

    /// Announce ourselves.
    pub fn announce_join(&mut self, character: CharacterKind) {
        self.send(ReplicationMessage::Join { character });
    }

    /// Say goodbye.
    pub fn announce_leave(&mut self) {
        self.send(ReplicationMessage::Leave);
    }

    /// Forget every remote (mode change keeps peers; this is for teardown).
    pub fn clear_peers(&mut self, world: &mut World) {
        for id in std::mem::take(&mut self.peers).into_keys() {
            world.remove(&id);
        }
    }

    fn send(&mut self, message: ReplicationMessage) {
        self.seq += 1;
        let kind = message.kind();
        let env = Envelope::new(self.peer_id.clone(), self.seq, message);
        if self.outbound.send(env).is_err() {
            trace!(kind, "no transport attached; message dropped");
            return;
        }
        self.stats.sent += 1;
    }

    // =========================================================================
    // STEP
    // =========================================================================

    /// Apply queued inbound frames, then emit this tick's outbound messages.
    pub fn step(&mut self, world: &mut World, projectiles: &mut ProjectileSystem, config: &CoreConfig, dt: f32) {
        self.apply_inbound(world, projectiles, config);
        self.emit_outbound(world, projectiles, config, dt);
    }

    /// Drain up to `max_inbound_per_tick` frames. Malformed frames are
    /// logged and skipped.
    pub fn apply_inbound(&mut self, world: &mut World, projectiles: &mut ProjectileSystem, config: &CoreConfig) {
        for peer in self.peers.values_mut() {
            if peer.appearance == Appearance::Requested {
                peer.appearance = Appearance::Loading;
            }
        }

        for _ in 0..config.replication.max_inbound_per_tick {
            let Ok(frame) = self.inbound.try_recv() else {
                break;
            };
            let result = frame
                .decode()
                .and_then(|env| self.apply_envelope(env, world, projectiles, config));
            match result {
                Ok(()) => self.stats.applied += 1,
                Err(ProtocolError::UnknownProjectile(id)) => {
                    // Already exploded or culled here
                    debug!(%id, "update for unknown projectile");
                    self.stats.dropped += 1;
                }
                Err(e) => {
                    warn!(error = %e, "discarding inbound message");
                    self.stats.dropped += 1;
                }
            }
        }
    }

    fn apply_envelope(
        &mut self,
        env: Envelope,
        world: &mut World,
        projectiles: &mut ProjectileSystem,
        config: &CoreConfig,
    ) -> Result<(), ProtocolError> {
        env.validate(&self.peer_id)?;
        let id = EntityId::remote(env.sender.clone());
        if id.is_local() || id.is_bot() {
            return Err(ProtocolError::ReservedSender(env.sender));
        }
        trace!(sender = %env.sender, seq = env.seq, kind = env.message.kind(), "inbound");
        if let Some(peer) = self.peers.get_mut(&id) {
            peer.last_seq = peer.last_seq.max(env.seq);
        }

        match env.message {
            ReplicationMessage::Join { character } => {
                self.ensure_remote(world, config, &id, character, None);
            }
            ReplicationMessage::PlayerState(state) => {
                if !is_finite_vec3(state.position) || !state.yaw.is_finite() {
                    return Err(ProtocolError::NonFinite("player_state"));
                }
                let kind = self.peers.get(&id).map_or(CharacterKind::default(), |p| p.character);
                self.ensure_remote(world, config, &id, kind, Some(state.position));
                if let Some(remote) = world.get_mut(&id) {
                    remote.position = state.position;
                    remote.yaw = state.yaw;
                    remote.anim_key = state.anim_key;
                    remote.facing = state.facing;
                    remote.grounded = state.grounded;
                    remote.running = state.running;
                }
            }
            ReplicationMessage::ProjectileCreate(create) => {
                let remote = RemoteProjectile {
                    network_id: scoped_projectile_id(&env.sender, &create.network_id),
                    kind: create.kind,
                    owner: id,
                    character: create.character,
                    origin: create.origin,
                    velocity: create.velocity,
                    target: create.target,
                    damage: create.damage,
                };
                if !projectiles.create_remote(remote, config, world.time) {
                    debug!(id = %create.network_id, "duplicate or invalid remote projectile");
                }
            }
            ReplicationMessage::ProjectileUpdate(update) => {
                let network_id = scoped_projectile_id(&env.sender, &update.network_id);
                projectiles.apply_remote_update(&network_id, update.position, update.velocity)?;
            }
            ReplicationMessage::PlayerDamage(damage) => {
                self.apply_damage_message(world, &env.sender, env.seq, &id, damage, config)?;
            }
            ReplicationMessage::CharacterChange { character } => {
                self.ensure_remote(world, config, &id, character, None);
                if let Some(remote) = world.get_mut(&id) {
                    remote.apply_profile(character, config.profile(character));
                }
                if let Some(peer) = self.peers.get_mut(&id) {
                    if peer.character != character {
                        peer.character = character;
                        peer.appearance = Appearance::Requested;
                        world.push_event(GameEventData::AppearanceRequested {
                            id: id.clone(),
                            character,
                        });
                    }
                }
            }
            ReplicationMessage::Leave => {
                if world.remove(&id).is_some() {
                    info!(peer = %id, "remote left");
                    world.push_event(GameEventData::RemoteLeft { id: id.clone() });
                }
                projectiles.remove_owned_by(&id);
                self.peers.remove(&id);
            }
        }
        Ok(())
    }

    fn apply_damage_message(
        &mut self,
        world: &mut World,
        sender: &str,
        seq: u64,
        sender_id: &EntityId,
        damage: PlayerDamageMessage,
        config: &CoreConfig,
    ) -> Result<(), ProtocolError> {
        if !damage.damage.is_finite() || !damage.health.is_finite() || !damage.max_health.is_finite() {
            return Err(ProtocolError::NonFinite("player_damage"));
        }

        if damage.target == sender {
            // Owner's own health report
            let kind = self.peers.get(sender_id).map_or(CharacterKind::default(), |p| p.character);
            self.ensure_remote(world, config, sender_id, kind, None);
            let Some(remote) = world.get_mut(sender_id) else {
                return Ok(());
            };
            remote.max_health = damage.max_health.max(1.0);
            character::set_health(remote, damage.health);
            remote.dead = remote.health <= 0.0;
            remote.is_dying = false;
            let (health, max_health) = (remote.health, remote.max_health);
            world.push_event(GameEventData::RemoteHealthSynced {
                id: sender_id.clone(),
                health,
                max_health,
            });
            return Ok(());
        }

        if damage.target != self.peer_id {
            return Ok(());
        }

        let key = (sender.to_string(), seq);
        if self.seen_damage.contains(&key) {
            debug!(sender, seq, "duplicate damage request ignored");
            return Ok(());
        }
        self.seen_damage.insert(key.clone());
        self.damage_order.push_back(key);
        while self.damage_order.len() > config.replication.damage_key_memory {
            if let Some(old) = self.damage_order.pop_front() {
                self.seen_damage.remove(&old);
            }
        }

        world.apply_damage(&EntityId::local(), damage.damage, DamageSource::Remote, Some(sender_id));
        Ok(())
    }

    /// Spawn a mirror the first time a peer shows up. Later calls are no-ops.
    fn ensure_remote(
        &mut self,
        world: &mut World,
        config: &CoreConfig,
        id: &EntityId,
        character: CharacterKind,
        position: Option<Vec3>,
    ) {
        if self.peers.contains_key(id) && world.get(id).is_some() {
            return;
        }
        let position = position.unwrap_or(Vec3::Y * config.entity.half_height());
        let mut mirror = Entity::new(id.clone(), EntityRole::RemotePlayer, character, position, config);
        mirror.grounded = false;
        world.spawn(mirror);
        self.peers.insert(
            id.clone(),
            RemotePeer {
                id: id.clone(),
                character,
                appearance: Appearance::Requested,
                last_seq: 0,
            },
        );
        info!(peer = %id, ?character, "remote joined");
        world.push_event(GameEventData::RemoteJoined { id: id.clone() });
        world.push_event(GameEventData::AppearanceRequested {
            id: id.clone(),
            character,
        });
    }

    /// Queue this tick's outbound messages from the world's pending events
    /// and the state throttle.
    pub fn emit_outbound(&mut self, world: &World, projectiles: &mut ProjectileSystem, config: &CoreConfig, dt: f32) {
        let mut messages = Vec::new();
        for event in &world.pending_events {
            match &event.data {
                GameEventData::ProjectileSpawned {
                    network_id,
                    owner,
                    character,
                    mortar,
                    origin,
                    velocity,
                    target,
                    damage,
                } if owner.is_local() => {
                    messages.push(ReplicationMessage::ProjectileCreate(ProjectileCreateMessage {
                        network_id: network_id.clone(),
                        kind: if *mortar { ProjectileKind::Mortar } else { ProjectileKind::Bolt },
                        origin: *origin,
                        velocity: *velocity,
                        target: *target,
                        character: *character,
                        damage: *damage,
                    }));
                }
                GameEventData::RemoteDamageRequested { target, amount, .. } => {
                    let (health, max_health) = world
                        .get(target)
                        .map_or((0.0, 0.0), |e| ((e.health - amount).max(0.0), e.max_health));
                    messages.push(ReplicationMessage::PlayerDamage(PlayerDamageMessage {
                        target: target.to_string(),
                        damage: *amount,
                        health,
                        max_health,
                    }));
                }
                GameEventData::Damaged {
                    victim,
                    amount,
                    health,
                    max_health,
                    ..
                } if victim.is_local() => {
                    messages.push(self.health_report(*amount, *health, *max_health));
                }
                GameEventData::Respawned { id, .. } if id.is_local() => {
                    if let Some(local) = world.local() {
                        messages.push(self.health_report(0.0, local.health, local.max_health));
                    }
                }
                GameEventData::Healed { id, .. } if id.is_local() => self.health_dirty = true,
                GameEventData::CharacterSwapped { id, to, .. } if id.is_local() => {
                    messages.push(ReplicationMessage::CharacterChange { character: *to });
                }
                _ => {}
            }
        }
        for message in messages {
            self.send(message);
        }

        for (id, position, velocity) in projectiles.take_due_updates(dt, config.replication.projectile_update_interval) {
            self.send(ReplicationMessage::ProjectileUpdate(ProjectileUpdateMessage {
                network_id: id.0,
                position,
                velocity,
            }));
        }

        let interval = u64::from(config.replication.state_interval_frames.max(1));
        let due = self.frames % interval == 0;
        self.frames += 1;
        if !due {
            return;
        }
        let Some(local) = world.local() else {
            return;
        };
        let state = PlayerStateMessage {
            position: local.position,
            yaw: local.yaw,
            anim_key: local.anim_key,
            facing: local.facing,
            grounded: local.grounded,
            running: local.running,
        };
        let report = self
            .health_dirty
            .then(|| self.health_report(0.0, local.health, local.max_health));
        self.send(ReplicationMessage::PlayerState(state));
        if let Some(report) = report {
            self.health_dirty = false;
            self.send(report);
        }
    }

    fn health_report(&self, damage: f32, health: f32, max_health: f32) -> ReplicationMessage {
        ReplicationMessage::PlayerDamage(PlayerDamageMessage {
            target: self.peer_id.clone(),
            damage,
            health,
            max_health,
        })
    }
}

/// Projectile ids are only unique per sender; prefix them locally.
pub fn scoped_projectile_id(sender: &str, id: &str) -> NetworkId {
    NetworkId(format!("{sender}/{id}"))
}

// =============================================================================
// TESTS
// =============================================================================
