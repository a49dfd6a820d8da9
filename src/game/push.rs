//! Push Ledger
//!
//! Remembers who last knocked each victim around so a fall out of the
//! arena can be credited to the pusher.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::EntityId;

/// Default credit window (seconds).
pub const PUSH_CREDIT_WINDOW: f64 = 5.0;

/// Default age after which records are purged (seconds).
pub const PUSH_MAX_AGE: f64 = 10.0;

/// Last push on a victim.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PushRecord {
    /// Who pushed
    pub pusher: EntityId,
    /// Simulated time of the push
    pub timestamp: f64,
}

/// Victim id → last pusher.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PushLedger {
    records: BTreeMap<EntityId, PushRecord>,
    credit_window: f64,
}

impl Default for PushLedger {
    fn default() -> Self {
        Self::new(PUSH_CREDIT_WINDOW)
    }
}

impl PushLedger {
    /// Ledger with a custom credit window.
    pub fn new(credit_window: f64) -> Self {
        Self {
            records: BTreeMap::new(),
            credit_window,
        }
    }

    /// Record a push. Self-pushes are ignored.
    pub fn record(&mut self, victim: &EntityId, pusher: &EntityId, now: f64) {
        if victim == pusher {
            return;
        }
        self.records.insert(
            victim.clone(),
            PushRecord {
                pusher: pusher.clone(),
                timestamp: now,
            },
        );
    }

    /// Take the pusher if the push is within the credit window.
    ///
    /// The record is removed either way.
    pub fn consume(&mut self, victim: &EntityId, now: f64) -> Option<EntityId> {
        let record = self.records.remove(victim)?;
        (now - record.timestamp <= self.credit_window).then_some(record.pusher)
    }

    /// Look without consuming.
    pub fn peek(&self, victim: &EntityId) -> Option<&PushRecord> {
        self.records.get(victim)
    }

    /// Drop records older than `max_age`. Returns how many were purged.
    pub fn sweep(&mut self, now: f64, max_age: f64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| now - r.timestamp <= max_age);
        before - self.records.len()
    }

    /// Forget a victim (respawn).
    pub fn clear_for(&mut self, victim: &EntityId) {
        self.records.remove(victim);
    }

    /// Forget everything (mode change).
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// No records held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_consume_within_window() {
        let mut ledger = PushLedger::default();
        let bot = EntityId::bot(1);
        ledger.record(&bot, &EntityId::local(), 10.0);
        assert_eq!(ledger.consume(&bot, 13.0), Some(EntityId::local()));
        // Consumed
        assert_eq!(ledger.consume(&bot, 13.0), None);
    }

    #[test]
    fn test_latest_push_wins() {
        let mut ledger = PushLedger::default();
        let bot = EntityId::bot(1);
        ledger.record(&bot, &EntityId::bot(2), 1.0);
        ledger.record(&bot, &EntityId::local(), 2.0);
        assert_eq!(ledger.consume(&bot, 3.0), Some(EntityId::local()));
    }

    #[test]
    fn test_self_push_ignored() {
        let mut ledger = PushLedger::default();
        ledger.record(&EntityId::local(), &EntityId::local(), 0.0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_sweep_purges_stale() {
        let mut ledger = PushLedger::default();
        ledger.record(&EntityId::bot(1), &EntityId::local(), 0.0);
        ledger.record(&EntityId::bot(2), &EntityId::local(), 8.0);
        assert_eq!(ledger.sweep(12.0, PUSH_MAX_AGE), 1);
        assert!(ledger.peek(&EntityId::bot(2)).is_some());
    }

    proptest! {
        #[test]
        fn prop_credit_iff_within_window(t0 in 0.0f64..1000.0, tau in 0.0f64..10.0) {
            let mut ledger = PushLedger::default();
            let bot = EntityId::bot(1);
            ledger.record(&bot, &EntityId::local(), t0);
            let credited = ledger.consume(&bot, t0 + tau);
            prop_assert_eq!(credited.is_some(), (t0 + tau) - t0 <= PUSH_CREDIT_WINDOW);
        }
    }
}
