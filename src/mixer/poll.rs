//! Ledger polling.

use std::sync::Arc;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ledger::{JobcoinClient, LedgerError};

use super::state::MixRequest;
use super::Mixer;

impl<C: JobcoinClient> Mixer<C> {
    /// Poll the ledger until cancelled.
    ///
    /// Errors are logged and the next tick proceeds; the cursor is not
    /// advanced on a failed fetch, so nothing is ever skipped.
    pub(super) async fn run_poller(&self, shutdown: CancellationToken) {
        let mut last_seen_tx = 0;
        let mut rng = self.jitter_rng(1);
        loop {
            debug!("running poll");
            if let Err(error) = self.poll(&mut last_seen_tx, &shutdown).await {
                warn!(%error, "poll failed");
            }

            let delay = self.poll_cfg.delay(&mut rng);
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("poller stopping");
                    return;
                }
                _ = sleep(delay) => {}
            }
        }
    }

    /// One poll tick: fetch the history, narrow the unseen suffix down to
    /// deposits addressed to us, and schedule their delayed injection into
    /// the mix table.
    pub(super) async fn poll(
        &self,
        last_seen_tx: &mut usize,
        shutdown: &CancellationToken,
    ) -> Result<(), LedgerError> {
        let txs = self.client.transactions().await?;

        // ignore transactions we've already consumed
        let start = (*last_seen_tx).min(txs.len());
        let unseen = &txs[start..];
        *last_seen_tx += unseen.len();

        let mix_reqs: Vec<MixRequest> = unseen
            .iter()
            .filter_map(|tx| {
                let usr_addrs = self.registry.user_addresses(&tx.to_address);
                if usr_addrs.is_empty() {
                    // not one of our deposit addresses
                    return None;
                }

                info!(deposit = %tx.to_address, amount = %tx.amount, "found deposit to mix");
                Some(MixRequest {
                    tx: tx.clone(),
                    usr_addrs,
                })
            })
            .collect();

        if mix_reqs.is_empty() {
            return Ok(());
        }

        // Injection is deferred to decorrelate deposit arrival from the first
        // outgoing payment. The batch is moved into the task; the table mutex
        // serializes it against the disburser.
        let table = Arc::clone(&self.table);
        let initial_delay = self.mix_cfg.initial_delay;
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = sleep(initial_delay) => {}
            }
            table.lock().await.inject(mix_reqs);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::mock::MockLedger;
    use crate::mixer::MixConfig;
    use crate::Amount;
    use std::time::Duration;

    fn mixer_with_short_injection(ledger: MockLedger) -> Mixer<MockLedger> {
        Mixer::builder(ledger)
            .with_mix_config(MixConfig {
                initial_delay: Duration::from_millis(10),
                ..MixConfig::default()
            })
            .build()
    }

    async fn wait_for_injection() {
        sleep(Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn poll_injects_deposits_to_registered_addresses() {
        let ledger = MockLedger::new();
        let mixer = mixer_with_short_injection(ledger);
        let deposit = mixer.register(vec!["u1".to_string()]).unwrap();

        mixer.client.fund(&deposit, Amount::from_float(10.0));
        mixer.client.fund("unrelated", Amount::from_float(99.0));

        let mut cursor = 0;
        mixer.poll(&mut cursor, &CancellationToken::new()).await.unwrap();
        assert_eq!(cursor, 2);

        wait_for_injection().await;
        let table = mixer.table.lock().await;
        assert_eq!(table.outstanding.len(), 1);
        assert_eq!(
            table.outstanding.get(&deposit).unwrap().remaining,
            Amount::from_float(10.0)
        );
    }

    #[tokio::test]
    async fn poll_only_consumes_the_unseen_suffix() {
        let ledger = MockLedger::new();
        let mixer = mixer_with_short_injection(ledger);
        let deposit = mixer.register(vec!["u1".to_string()]).unwrap();

        mixer.client.fund(&deposit, Amount::from_float(2.0));
        let mut cursor = 0;
        let token = CancellationToken::new();
        mixer.poll(&mut cursor, &token).await.unwrap();

        // a second deposit lands between ticks
        mixer.client.fund(&deposit, Amount::from_float(3.0));
        mixer.poll(&mut cursor, &token).await.unwrap();
        assert_eq!(cursor, 2);

        wait_for_injection().await;
        let table = mixer.table.lock().await;
        assert_eq!(
            table.outstanding.get(&deposit).unwrap().remaining,
            Amount::from_float(5.0)
        );
    }

    #[tokio::test]
    async fn poll_error_does_not_advance_the_cursor() {
        let ledger = MockLedger::new();
        ledger.fail_reads(1);
        let mixer = mixer_with_short_injection(ledger);
        let deposit = mixer.register(vec!["u1".to_string()]).unwrap();
        mixer.client.fund(&deposit, Amount::from_float(10.0));

        let mut cursor = 0;
        let token = CancellationToken::new();
        assert!(mixer.poll(&mut cursor, &token).await.is_err());
        assert_eq!(cursor, 0);

        // the retry picks the deposit up
        mixer.poll(&mut cursor, &token).await.unwrap();
        assert_eq!(cursor, 1);

        wait_for_injection().await;
        assert!(mixer.table.lock().await.outstanding.get(&deposit).is_some());
    }

    #[tokio::test]
    async fn cancelled_token_abandons_pending_injection() {
        let ledger = MockLedger::new();
        let mixer = mixer_with_short_injection(ledger);
        let deposit = mixer.register(vec!["u1".to_string()]).unwrap();
        mixer.client.fund(&deposit, Amount::from_float(10.0));

        let token = CancellationToken::new();
        let mut cursor = 0;
        mixer.poll(&mut cursor, &token).await.unwrap();
        token.cancel();

        wait_for_injection().await;
        assert!(mixer.table.lock().await.outstanding.is_empty());
    }
}
