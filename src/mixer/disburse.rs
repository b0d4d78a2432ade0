//! Disbursement.

use rand::Rng;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::{JobcoinClient, LedgerError};
use crate::Amount;

use super::state::MixState;
use super::Mixer;

impl<C: JobcoinClient> Mixer<C> {
    /// Emit mix payments until cancelled. Errors are logged and the next tick
    /// proceeds.
    pub(super) async fn run_disburser(&self, shutdown: CancellationToken) {
        let mut rng = self.jitter_rng(2);
        loop {
            debug!("running mix");
            if let Err(error) = self.disburse().await {
                warn!(%error, "mix failed");
            }

            let delay = self.mix_cfg.delay(&mut rng);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("disburser stopping");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// One disbursement tick: pick a random outstanding deposit, collect the
    /// fee if it is still owed, send one randomized payment to a random
    /// destination, then reconcile against the ledger.
    ///
    /// This function assumes nothing else spends from the deposit addresses
    /// the mixer knows about.
    pub(super) async fn disburse(&self) -> Result<(), LedgerError> {
        let mut table = self.table.lock().await;

        if table.outstanding.is_empty() {
            debug!("nothing to mix");
            return Ok(());
        }
        let Some(addr) = table.pick_random(&mut *self.rng.lock()) else {
            return Ok(());
        };
        let Some(m) = table.outstanding.get_mut(&addr) else {
            return Ok(());
        };
        // Possible but should never be hit: registration rejects empty
        // destination sets.
        if m.usr_addrs.is_empty() {
            return Ok(());
        }

        // The destination is drawn before any I/O so the rest of the tick is
        // deterministic relative to this choice.
        let usr_addr = {
            let mut rng = self.rng.lock();
            m.usr_addrs[rng.gen_range(0..m.usr_addrs.len())].clone()
        };

        debug!(deposit = %addr, "mixing");

        let result = self.pay_out(m, &addr, &usr_addr).await;

        // Reconciliation runs even when the payout failed. The ledger's view
        // of the balance repairs any tracking drift and is what triggers
        // deletion once a deposit is fully dispersed.
        match self.remaining_on_ledger(&addr).await {
            Ok(balance) if balance.is_zero() => {
                info!(deposit = %addr, "done mixing");
                table.outstanding.remove(&addr);
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "failed to update remaining"),
        }

        result
    }

    async fn pay_out(
        &self,
        m: &mut MixState,
        addr: &str,
        usr_addr: &str,
    ) -> Result<(), LedgerError> {
        if self.fee.is_zero() {
            m.fee_paid = true;
        }
        if !m.fee_paid {
            self.collect_fee(m, addr).await?;
        }

        self.send_mix(m, addr, usr_addr).await
    }

    /// Collect the flat fee, reduced to the remaining balance when the
    /// deposit cannot cover it.
    async fn collect_fee(&self, m: &mut MixState, addr: &str) -> Result<(), LedgerError> {
        let fee = self.fee.min(m.remaining);
        if fee < self.fee {
            debug!(%fee, "reduced fee");
        }

        info!(deposit = %addr, %fee, "collecting fee");
        self.client
            .post_transaction(addr, &self.address, fee)
            .await?;

        m.fee_paid = true;
        m.remaining -= fee;

        Ok(())
    }

    /// Send one payment, clamped to what is left to disperse.
    async fn send_mix(
        &self,
        m: &mut MixState,
        addr: &str,
        usr_addr: &str,
    ) -> Result<(), LedgerError> {
        let sampled = Amount::from_float(self.mix_cfg.amount(&mut *self.rng.lock()));
        let amt = sampled.min(m.remaining);
        if amt.is_zero() {
            return Ok(());
        }

        // This post can fail on a discrepancy between our accounting and the
        // ledger's balance; the reconciled remaining makes the next tick for
        // this address work.
        info!(from = %addr, to = %usr_addr, amount = %amt, "sending mix payment");
        self.client.post_transaction(addr, usr_addr, amt).await?;
        m.remaining -= amt;

        Ok(())
    }

    async fn remaining_on_ledger(&self, addr: &str) -> Result<Amount, LedgerError> {
        Ok(self.client.address_info(addr).await?.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::mixer::state::MixRequest;
    use crate::model::Transaction;
    use chrono::{DateTime, Utc};

    fn deposit_tx(to: &str, amount: f64) -> Transaction {
        Transaction {
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            from_address: Some("someone".to_string()),
            to_address: to.to_string(),
            amount: Amount::from_float(amount),
        }
    }

    /// Fund the deposit address on the ledger and seed the mix table, the
    /// state a poll tick plus injection would have produced.
    async fn seed(mixer: &Mixer<MockLedger>, addr: &str, amount: f64, usr_addrs: &[&str]) {
        mixer.client.fund(addr, Amount::from_float(amount));
        mixer.table.lock().await.inject(vec![MixRequest {
            tx: deposit_tx(addr, amount),
            usr_addrs: usr_addrs.iter().map(|s| s.to_string()).collect(),
        }]);
    }

    fn builder() -> crate::mixer::MixerBuilder<MockLedger> {
        Mixer::builder(MockLedger::new()).with_rng_seed(7)
    }

    #[tokio::test]
    async fn empty_table_is_a_no_op() {
        let mixer = builder().build();
        mixer.disburse().await.unwrap();
        assert!(mixer.client.posted().is_empty());
    }

    #[tokio::test]
    async fn fee_is_collected_once_then_payments_flow() {
        let mixer = builder()
            .with_fee(Amount::from_float(1.0))
            .with_address("mixer-fees")
            .build();
        seed(&mixer, "d1", 10.0, &["u1"]).await;

        mixer.disburse().await.unwrap();

        let posted = mixer.client.posted();
        assert_eq!(posted[0].to, "mixer-fees");
        assert_eq!(posted[0].amount, Amount::from_float(1.0));
        // the same tick also emits a mix payment
        assert_eq!(posted[1].to, "u1");

        let fee_posts = |mixer: &Mixer<MockLedger>| {
            mixer
                .client
                .posted()
                .iter()
                .filter(|p| p.to == "mixer-fees")
                .count()
        };
        assert_eq!(fee_posts(&mixer), 1);

        mixer.disburse().await.unwrap();
        assert_eq!(fee_posts(&mixer), 1);
    }

    #[tokio::test]
    async fn zero_fee_never_posts_to_the_fee_address() {
        let mixer = builder().with_address("mixer-fees").build();
        seed(&mixer, "d1", 10.0, &["u1"]).await;

        mixer.disburse().await.unwrap();

        assert!(mixer.client.posted().iter().all(|p| p.to == "u1"));
    }

    #[tokio::test]
    async fn fee_larger_than_deposit_takes_the_whole_deposit() {
        let mixer = builder()
            .with_fee(Amount::from_float(100.0))
            .with_address("mixer-fees")
            .build();
        seed(&mixer, "d1", 2.0, &["u1"]).await;

        mixer.disburse().await.unwrap();

        // the reduced fee drains the deposit; no user payment is made and
        // reconciliation deletes the entry
        let posted = mixer.client.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].to, "mixer-fees");
        assert_eq!(posted[0].amount, Amount::from_float(2.0));
        assert!(mixer.table.lock().await.outstanding.is_empty());
    }

    #[tokio::test]
    async fn failed_fee_post_is_retried_next_tick() {
        let mixer = builder()
            .with_fee(Amount::from_float(1.0))
            .with_address("mixer-fees")
            .build();
        seed(&mixer, "d1", 10.0, &["u1"]).await;
        mixer.client.fail_posts(1);

        assert!(mixer.disburse().await.is_err());
        {
            let table = mixer.table.lock().await;
            let m = table.outstanding.get("d1").unwrap();
            assert!(!m.fee_paid);
            assert_eq!(m.remaining, Amount::from_float(10.0));
        }

        mixer.disburse().await.unwrap();
        let table = mixer.table.lock().await;
        assert!(table.outstanding.get("d1").unwrap().fee_paid);
        assert_eq!(mixer.client.balance("mixer-fees"), Amount::from_float(1.0));
    }

    #[tokio::test]
    async fn failed_mix_post_leaves_remaining_for_the_next_tick() {
        let mixer = builder().build();
        seed(&mixer, "d1", 10.0, &["u1"]).await;
        mixer.client.fail_posts(1);

        assert!(mixer.disburse().await.is_err());
        {
            let table = mixer.table.lock().await;
            assert_eq!(
                table.outstanding.get("d1").unwrap().remaining,
                Amount::from_float(10.0)
            );
        }

        mixer.disburse().await.unwrap();
        let posted = mixer.client.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].from, "d1");
    }

    #[tokio::test]
    async fn payment_is_clamped_to_remaining() {
        // the default minimum sampled amount (5) exceeds this deposit
        let mixer = builder().build();
        seed(&mixer, "d1", 2.0, &["u1"]).await;

        mixer.disburse().await.unwrap();

        let posted = mixer.client.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].amount, Amount::from_float(2.0));
        // drained in one payment, so reconciliation deletes the entry
        assert!(mixer.table.lock().await.outstanding.is_empty());
    }

    #[tokio::test]
    async fn stale_dust_is_deleted_by_reconciliation() {
        let mixer = builder().build();
        // internal accounting says 0.01 remains, the ledger says nothing does
        mixer.table.lock().await.inject(vec![MixRequest {
            tx: deposit_tx("d1", 0.01),
            usr_addrs: vec!["u1".to_string()],
        }]);

        let _ = mixer.disburse().await;

        assert!(mixer.table.lock().await.outstanding.is_empty());
    }

    #[tokio::test]
    async fn reconciliation_read_failure_keeps_the_entry() {
        let mixer = builder().build();
        seed(&mixer, "d1", 10.0, &["u1"]).await;
        mixer.client.fail_reads(1);

        mixer.disburse().await.unwrap();

        assert!(mixer.table.lock().await.outstanding.get("d1").is_some());
    }

    #[tokio::test]
    async fn empty_destination_set_is_a_no_op() {
        let mixer = builder().build();
        mixer.table.lock().await.inject(vec![MixRequest {
            tx: deposit_tx("d1", 10.0),
            usr_addrs: vec![],
        }]);

        mixer.disburse().await.unwrap();

        assert!(mixer.client.posted().is_empty());
        assert!(mixer.table.lock().await.outstanding.get("d1").is_some());
    }

    #[tokio::test]
    async fn destinations_and_amounts_reproduce_for_a_seed() {
        let run = || async {
            let mixer = Mixer::builder(MockLedger::new()).with_rng_seed(42).build();
            seed(&mixer, "d1", 40.0, &["u1", "u2", "u3"]).await;
            for _ in 0..6 {
                let _ = mixer.disburse().await;
            }
            mixer.client.posted()
        };

        assert_eq!(run().await, run().await);
    }
}
