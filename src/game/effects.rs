//! Poison Ledger
//!
//! Damage-over-time plus slow, keyed by victim. One record per victim;
//! enrolling again refreshes it. Processing walks victims in id order so
//! tick results are reproducible.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::events::{DamageSource, GameEventData};
use super::state::{EntityId, EntityRole, World};
use crate::config::PoisonConfig;

/// What kind of entity a record is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    /// Local player
    Player,
    /// Bot
    Bot,
    /// Remote player (ticks are forwarded to its owner)
    Remote,
}

impl From<EntityRole> for TargetType {
    fn from(role: EntityRole) -> Self {
        match role {
            EntityRole::LocalPlayer => TargetType::Player,
            EntityRole::Bot => TargetType::Bot,
            EntityRole::RemotePlayer => TargetType::Remote,
        }
    }
}

/// Active poison on one victim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoisonRecord {
    /// Seconds until the effect ends
    pub time_left: f32,
    /// Seconds accumulated toward the next tick
    pub tick_timer: f32,
    /// Damage per tick
    pub damage: f32,
    /// Seconds between ticks
    pub tick_interval: f32,
    /// Movement multiplier while poisoned
    pub speed_multiplier: f32,
    /// Victim kind
    pub target_type: TargetType,
    /// Who applied it (kill credit)
    pub source: Option<EntityId>,
}

impl PoisonRecord {
    /// Fresh record from ability parameters.
    pub fn new(params: &PoisonConfig, target_type: TargetType, source: Option<EntityId>) -> Self {
        Self {
            time_left: params.duration,
            tick_timer: 0.0,
            damage: params.damage,
            tick_interval: params.tick_interval.max(f32::EPSILON),
            speed_multiplier: params.speed_multiplier,
            target_type,
            source,
        }
    }
}

/// One damage tick produced by [`PoisonLedger::process`].
#[derive(Clone, Debug, PartialEq)]
pub struct PoisonTick {
    /// Who takes the damage
    pub victim: EntityId,
    /// Who gets credit
    pub source: Option<EntityId>,
    /// Amount
    pub damage: f32,
}

/// Output of one processing pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PoisonReport {
    /// Damage ticks due this pass
    pub ticks: Vec<PoisonTick>,
    /// Victims whose poison ran out
    pub expired: Vec<EntityId>,
}

/// Active poison records by victim.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PoisonLedger {
    records: BTreeMap<EntityId, PoisonRecord>,
}

impl PoisonLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of poisoned victims.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No active records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for a victim.
    pub fn get(&self, victim: &EntityId) -> Option<&PoisonRecord> {
        self.records.get(victim)
    }

    /// Victim currently poisoned.
    pub fn contains(&self, victim: &EntityId) -> bool {
        self.records.contains_key(victim)
    }

    /// Add or refresh a record. Returns true if the victim was not poisoned.
    pub fn enroll(&mut self, victim: EntityId, record: PoisonRecord) -> bool {
        self.records.insert(victim, record).is_none()
    }

    /// Drop a victim's record.
    pub fn remove(&mut self, victim: &EntityId) -> Option<PoisonRecord> {
        self.records.remove(victim)
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Advance every record by `dt`.
    ///
    /// The tick timer is advanced before the duration check, so a record
    /// whose last interval ends exactly on expiry still ticks.
    pub fn process(&mut self, dt: f32) -> PoisonReport {
        let mut report = PoisonReport::default();
        for (victim, record) in self.records.iter_mut() {
            record.tick_timer += dt;
            while record.tick_timer >= record.tick_interval {
                record.tick_timer -= record.tick_interval;
                report.ticks.push(PoisonTick {
                    victim: victim.clone(),
                    source: record.source.clone(),
                    damage: record.damage,
                });
            }
            record.time_left -= dt;
            if record.time_left <= 0.0 {
                report.expired.push(victim.clone());
            }
        }
        for victim in &report.expired {
            self.records.remove(victim);
        }
        report
    }
}

// =============================================================================
// WORLD APPLICATION
// =============================================================================

/// Enroll a victim and apply the slow to simulated entities.
pub fn apply_poison(
    world: &mut World,
    ledger: &mut PoisonLedger,
    victim: &EntityId,
    params: &PoisonConfig,
    source: Option<&EntityId>,
) {
    let Some(entity) = world.get_mut(victim) else {
        return;
    };
    if !entity.is_targetable() {
        return;
    }
    let target_type = TargetType::from(entity.role);
    if target_type != TargetType::Remote {
        entity.poison_speed_multiplier = Some(params.speed_multiplier);
    }
    ledger.enroll(victim.clone(), PoisonRecord::new(params, target_type, source.cloned()));
    world.push_event(GameEventData::Poisoned {
        victim: victim.clone(),
        source: source.cloned(),
        duration: params.duration,
        speed_multiplier: params.speed_multiplier,
    });
}

/// Process the ledger against the world: apply ticks, lift expired slows.
///
/// Records on victims that vanished or died are dropped without ticking.
pub fn update_poison(world: &mut World, ledger: &mut PoisonLedger, dt: f32) {
    let gone: Vec<EntityId> = ledger
        .records
        .keys()
        .filter(|id| !world.get(id).is_some_and(|e| e.is_targetable()))
        .cloned()
        .collect();
    for id in gone {
        ledger.remove(&id);
        clear_slow(world, &id);
    }

    let report = ledger.process(dt);
    for tick in report.ticks {
        debug!(victim = %tick.victim, damage = tick.damage, "poison tick");
        let outcome = world.apply_damage(&tick.victim, tick.damage, DamageSource::Poison, tick.source.as_ref());
        if outcome.died() {
            ledger.remove(&tick.victim);
            clear_slow(world, &tick.victim);
        }
    }
    for victim in report.expired {
        clear_slow(world, &victim);
        world.push_event(GameEventData::PoisonCleared { victim });
    }
}

fn clear_slow(world: &mut World, victim: &EntityId) {
    if let Some(entity) = world.get_mut(victim) {
        entity.poison_speed_multiplier = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::game::state::{CharacterKind, Entity, GameMode};
    use glam::Vec3;

    fn params() -> PoisonConfig {
        PoisonConfig {
            damage: 2.0,
            tick_interval: 1.0,
            duration: 3.0,
            speed_multiplier: 0.6,
        }
    }

    #[test]
    fn test_ticks_then_expires() {
        let mut ledger = PoisonLedger::new();
        let id = EntityId::bot(1);
        ledger.enroll(id.clone(), PoisonRecord::new(&params(), TargetType::Bot, Some(EntityId::local())));

        let mut ticks = 0;
        let mut expired_at = None;
        for step in 1..=40 {
            let report = ledger.process(0.1);
            ticks += report.ticks.len();
            if !report.expired.is_empty() {
                expired_at = Some(step);
                break;
            }
        }
        assert!(ticks == 2 || ticks == 3, "ticks = {ticks}");
        let step = expired_at.expect("expired");
        assert!((29..=31).contains(&step));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_enroll_refreshes() {
        let mut ledger = PoisonLedger::new();
        let id = EntityId::bot(1);
        assert!(ledger.enroll(id.clone(), PoisonRecord::new(&params(), TargetType::Bot, None)));
        ledger.process(2.5);
        assert!(!ledger.enroll(id.clone(), PoisonRecord::new(&params(), TargetType::Bot, None)));
        assert_eq!(ledger.get(&id).map(|r| r.time_left), Some(3.0));
    }

    #[test]
    fn test_world_slow_applied_and_cleared() {
        let config = CoreConfig::default();
        let mut world = World::new(1, GameMode::Deathmatch, 1.2);
        let id = world.next_bot_id();
        world.spawn(Entity::new(id.clone(), EntityRole::Bot, CharacterKind::Herald, Vec3::Y, &config));
        let mut ledger = PoisonLedger::new();

        apply_poison(&mut world, &mut ledger, &id, &params(), Some(&EntityId::local()));
        assert_eq!(world.get(&id).and_then(|e| e.poison_speed_multiplier), Some(0.6));
        assert!((world.get(&id).map(|e| e.speed_multiplier()).unwrap_or(0.0) - 0.6).abs() < 1e-6);

        for _ in 0..31 {
            update_poison(&mut world, &mut ledger, 0.1);
        }
        let bot = world.get(&id).unwrap();
        assert_eq!(bot.poison_speed_multiplier, None);
        assert!(bot.health < 100.0);
        let events = world.take_events();
        assert!(events.iter().any(|e| matches!(e.data, GameEventData::PoisonCleared { .. })));
        assert!(events.iter().any(|e| matches!(
            e.data,
            GameEventData::Damaged { source: DamageSource::Poison, .. }
        )));
    }

    #[test]
    fn test_remote_victim_forwarded_not_slowed() {
        let config = CoreConfig::default();
        let mut world = World::new(1, GameMode::Deathmatch, 1.2);
        let id = EntityId::remote("peer-1");
        world.spawn(Entity::new(id.clone(), EntityRole::RemotePlayer, CharacterKind::Lucy, Vec3::Y, &config));
        let mut ledger = PoisonLedger::new();

        apply_poison(&mut world, &mut ledger, &id, &params(), Some(&EntityId::local()));
        assert_eq!(world.get(&id).and_then(|e| e.poison_speed_multiplier), None);
        update_poison(&mut world, &mut ledger, 1.0);
        assert_eq!(world.get(&id).map(|e| e.health), Some(100.0));
        assert!(world
            .take_events()
            .iter()
            .any(|e| matches!(e.data, GameEventData::RemoteDamageRequested { .. })));
    }
}
