//! Arena Clash headless simulator
//!
//! Runs two linked peers with bots for a fixed span of simulated time and
//! logs the match. Usage: `arena-clash-sim [config.json] [seconds]`.
//! Log verbosity follows `RUST_LOG`.

use anyhow::{Context, Result};
use glam::Vec3;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use arena_clash::{
    config::{CoreConfig, Environment},
    core::math::Ray,
    game::{
        collision::ArenaCollider,
        events::GameEventData,
        input::{InputDevices, KeyboardState},
        state::{EntityRole, GameMode},
    },
    network::{InboundFrame, PeerLink},
    Simulation, FRAME_RATE, VERSION,
};

const DEFAULT_SECONDS: u32 = 60;
const BOTS_PER_PEER: usize = 2;

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to set tracing subscriber")?;

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => CoreConfig::from_path(&path).with_context(|| format!("loading {path}"))?,
        None => CoreConfig::default(),
    };
    let seconds = match args.next() {
        Some(s) => s.parse::<u32>().with_context(|| format!("bad duration `{s}`"))?,
        None => DEFAULT_SECONDS,
    };

    info!("Arena Clash simulator v{}", VERSION);
    run_match(config, seconds)
}

/// Aim at the nearest bot and hold fire.
fn scripted_input(sim: &Simulation) -> InputDevices {
    let world = sim.world();
    let Some(me) = world.local() else {
        return InputDevices::default();
    };
    let target = world
        .entities
        .values()
        .filter(|e| e.role == EntityRole::Bot && e.is_targetable())
        .min_by(|a, b| {
            let da = a.position.distance_squared(me.position);
            let db = b.position.distance_squared(me.position);
            da.total_cmp(&db)
        })
        .map(|bot| bot.position);

    let mut keyboard = KeyboardState::default();
    if let Some(at) = target {
        keyboard.mouse_left = true;
        keyboard.mouse_ray = Some(Ray::new(at + Vec3::Y * 10.0, Vec3::NEG_Y));
        if at.distance(me.position) > 8.0 {
            keyboard = keyboard.with_key("KeyW");
        }
    }
    InputDevices {
        keyboard,
        ..InputDevices::default()
    }
}

/// Move one peer's outbound envelopes to the other, encoded as frames.
fn relay(from: &mut PeerLink, to: &PeerLink, binary: bool) -> Result<usize> {
    let mut delivered = 0;
    for envelope in from.drain() {
        let frame = if binary {
            InboundFrame::Binary(envelope.to_bytes()?)
        } else {
            InboundFrame::Json(envelope.to_json()?)
        };
        if to.deliver(frame) {
            delivered += 1;
        }
    }
    Ok(delivered)
}

fn run_match(config: CoreConfig, seconds: u32) -> Result<()> {
    let arena = config.respawn.arena_half_size;
    let (host, mut host_link) = Simulation::new(
        config.clone(),
        Environment::new("host", 12345).as_host(),
        Box::new(ArenaCollider::new(arena)),
        GameMode::Deathmatch,
    )?;
    let (guest, mut guest_link) = Simulation::new(
        config,
        Environment::new("guest", 67890),
        Box::new(ArenaCollider::new(arena)),
        GameMode::Deathmatch,
    )?;
    let mut peers = [host, guest];
    for sim in peers.iter_mut() {
        let bots = sim.spawn_bots(BOTS_PER_PEER);
        let character = sim.world().local().map(|p| p.character).unwrap_or_default();
        sim.replicator_mut().announce_join(character);
        info!(peer = %sim.environment().peer_id, bots = bots.len(), "peer ready");
    }

    let frames = seconds * FRAME_RATE;
    let dt = 1.0 / FRAME_RATE as f32;
    let mut total_events = 0usize;
    info!(seconds, frames, "running match");

    for frame in 0..frames {
        for sim in peers.iter_mut() {
            let devices = scripted_input(sim);
            let report = sim.step(dt, &devices);
            total_events += report.events.len();
            for event in &report.events {
                match &event.data {
                    GameEventData::Died { victim, killer, source, .. } => {
                        info!(peer = %sim.environment().peer_id, %victim, ?killer, ?source, "death");
                    }
                    GameEventData::FellOut { victim, pusher } => {
                        info!(peer = %sim.environment().peer_id, %victim, ?pusher, "fell out");
                    }
                    GameEventData::RemoteJoined { id } => {
                        info!(peer = %sim.environment().peer_id, %id, "remote joined");
                    }
                    _ => {}
                }
            }
        }
        relay(&mut host_link, &guest_link, true)?;
        relay(&mut guest_link, &host_link, false)?;

        if frame > 0 && frame % (10 * FRAME_RATE) == 0 {
            for sim in &peers {
                info!(
                    peer = %sim.environment().peer_id,
                    tick = sim.world().tick,
                    entities = sim.world().entities.len(),
                    projectiles = sim.projectiles().len(),
                    "status"
                );
            }
        }
    }

    info!("=== Results ===");
    for sim in &peers {
        let stats = sim.replicator().stats();
        if stats.dropped > 0 {
            warn!(peer = %sim.environment().peer_id, dropped = stats.dropped, "frames dropped");
        }
        for (id, score) in &sim.world().scores {
            info!(
                peer = %sim.environment().peer_id,
                %id,
                kills = score.kills,
                deaths = score.deaths,
                "score"
            );
        }
        info!(
            peer = %sim.environment().peer_id,
            sent = stats.sent,
            applied = stats.applied,
            "replication"
        );
    }
    info!(total_events, "done");
    Ok(())
}
