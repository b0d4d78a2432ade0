//! Outstanding mix state.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use rand::Rng;

use crate::model::Transaction;
use crate::Amount;

/// A deposit observed by the poller, waiting to be mixed.
#[derive(Debug, Clone)]
pub(super) struct MixRequest {
    pub tx: Transaction,
    pub usr_addrs: Vec<String>,
}

/// Per-deposit record of the outstanding obligation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct MixState {
    /// Destinations registered for this deposit address.
    pub usr_addrs: Vec<String>,
    /// Amount yet to disperse. Never negative.
    pub remaining: Amount,
    /// Set at most once; immediately when the configured fee is zero.
    pub fee_paid: bool,
}

/// Outstanding mixes keyed by deposit address.
#[derive(Debug, Default)]
pub(super) struct MixTable {
    pub outstanding: HashMap<String, MixState>,
}

impl MixTable {
    /// Merge a batch of observed deposits into the table.
    ///
    /// This is the sole admission path: a repeat deposit only grows
    /// `remaining`, leaving the destination set and fee flag untouched.
    pub fn inject(&mut self, reqs: Vec<MixRequest>) {
        for req in reqs {
            match self.outstanding.entry(req.tx.to_address) {
                Entry::Occupied(mut entry) => {
                    entry.get_mut().remaining += req.tx.amount;
                }
                Entry::Vacant(entry) => {
                    entry.insert(MixState {
                        usr_addrs: req.usr_addrs,
                        remaining: req.tx.amount,
                        fee_paid: false,
                    });
                }
            }
        }
    }

    /// Pick a uniformly random deposit address.
    pub fn pick_random<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        if self.outstanding.is_empty() {
            return None;
        }
        let i = rng.gen_range(0..self.outstanding.len());
        self.outstanding.keys().nth(i).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn request(to: &str, amount: f64, usr_addrs: &[&str]) -> MixRequest {
        MixRequest {
            tx: Transaction {
                timestamp: DateTime::<Utc>::UNIX_EPOCH,
                from_address: Some("someone".to_string()),
                to_address: to.to_string(),
                amount: Amount::from_float(amount),
            },
            usr_addrs: usr_addrs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn inject_creates_fresh_state() {
        let mut table = MixTable::default();
        table.inject(vec![request("d1", 2.0, &["u1", "u2"])]);

        let state = &table.outstanding["d1"];
        assert_eq!(state.remaining, Amount::from_float(2.0));
        assert_eq!(state.usr_addrs, vec!["u1", "u2"]);
        assert!(!state.fee_paid);
    }

    #[test]
    fn inject_same_deposit_twice_in_one_batch_accumulates() {
        let mut table = MixTable::default();
        table.inject(vec![
            request("d1", 2.0, &["u1", "u2"]),
            request("d1", 2.0, &["u1", "u2"]),
        ]);

        assert_eq!(table.outstanding.len(), 1);
        assert_eq!(
            table.outstanding["d1"].remaining,
            Amount::from_float(4.0)
        );
    }

    #[test]
    fn inject_into_existing_state_only_grows_remaining() {
        let mut table = MixTable::default();
        table.inject(vec![request("d1", 2.0, &["u1", "u2"])]);
        table.outstanding.get_mut("d1").unwrap().fee_paid = true;

        // a later batch must not reset the fee flag or the destinations
        table.inject(vec![request("d1", 3.0, &["other"])]);

        let state = &table.outstanding["d1"];
        assert_eq!(state.remaining, Amount::from_float(5.0));
        assert_eq!(state.usr_addrs, vec!["u1", "u2"]);
        assert!(state.fee_paid);
    }

    #[test]
    fn inject_new_deposit_leaves_others_alone() {
        let mut table = MixTable::default();
        table.inject(vec![request("d1", 2.0, &["u1", "u2"])]);
        table.inject(vec![request("d2", 2.0, &["u3"])]);

        assert_eq!(table.outstanding.len(), 2);
        assert_eq!(
            table.outstanding["d1"].remaining,
            Amount::from_float(2.0)
        );
        assert_eq!(table.outstanding["d2"].usr_addrs, vec!["u3"]);
    }

    #[test]
    fn pick_random_on_empty_table_is_none() {
        let table = MixTable::default();
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(table.pick_random(&mut rng), None);
    }

    #[test]
    fn pick_random_returns_live_keys() {
        let mut table = MixTable::default();
        table.inject(vec![
            request("d1", 1.0, &["u1"]),
            request("d2", 1.0, &["u2"]),
        ]);

        let mut rng = SmallRng::seed_from_u64(1);
        for _ in 0..50 {
            let addr = table.pick_random(&mut rng).unwrap();
            assert!(table.outstanding.contains_key(&addr));
        }
    }
}
