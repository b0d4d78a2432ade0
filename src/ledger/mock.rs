//! In-memory ledger for tests.
//!
//! Behaves like a tiny Jobcoin instance rather than a scripted stub: balances
//! move when transactions post, so reconciliation observes the same truth a
//! real ledger would report.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::StatusCode;

use crate::model::{AddressInfo, Transaction};
use crate::Amount;

use super::{JobcoinClient, LedgerError};

/// A transfer recorded by [`MockLedger::post_transaction`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Posted {
    pub from: String,
    pub to: String,
    pub amount: Amount,
}

#[derive(Default)]
struct State {
    transactions: Vec<Transaction>,
    balances: HashMap<String, Amount>,
    posted: Vec<Posted>,
    failing_posts: usize,
    failing_reads: usize,
}

/// In-memory Jobcoin ledger.
#[derive(Default)]
pub struct MockLedger {
    state: Mutex<State>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint `amount` to `addr`, recording a coinbase transaction.
    pub fn fund(&self, addr: &str, amount: Amount) {
        let mut state = self.state.lock().unwrap();
        *state.balances.entry(addr.to_string()).or_default() += amount;

        let timestamp = tick_timestamp(state.transactions.len());
        state.transactions.push(Transaction {
            timestamp,
            from_address: None,
            to_address: addr.to_string(),
            amount,
        });
    }

    /// Fail the next `n` posted transactions with a server error.
    pub fn fail_posts(&self, n: usize) {
        self.state.lock().unwrap().failing_posts = n;
    }

    /// Fail the next `n` reads (history or balance) with a server error.
    pub fn fail_reads(&self, n: usize) {
        self.state.lock().unwrap().failing_reads = n;
    }

    /// Every transfer posted through the client, in order.
    pub fn posted(&self) -> Vec<Posted> {
        self.state.lock().unwrap().posted.clone()
    }

    pub fn balance(&self, addr: &str) -> Amount {
        self.state
            .lock()
            .unwrap()
            .balances
            .get(addr)
            .copied()
            .unwrap_or_default()
    }
}

fn tick_timestamp(n: usize) -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(n as i64)
}

fn injected_failure() -> LedgerError {
    LedgerError::Api {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: "injected failure".to_string(),
    }
}

#[async_trait]
impl JobcoinClient for MockLedger {
    async fn address_info(&self, addr: &str) -> Result<AddressInfo, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(injected_failure());
        }

        let transactions = state
            .transactions
            .iter()
            .filter(|tx| tx.to_address == addr || tx.from_address.as_deref() == Some(addr))
            .cloned()
            .collect();

        Ok(AddressInfo {
            balance: state.balances.get(addr).copied().unwrap_or_default(),
            transactions,
        })
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_reads > 0 {
            state.failing_reads -= 1;
            return Err(injected_failure());
        }

        Ok(state.transactions.clone())
    }

    async fn post_transaction(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_posts > 0 {
            state.failing_posts -= 1;
            return Err(injected_failure());
        }

        let available = state.balances.get(from).copied().unwrap_or_default();
        if available < amount {
            return Err(LedgerError::Api {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "Insufficient Funds".to_string(),
            });
        }

        *state.balances.entry(from.to_string()).or_default() -= amount;
        *state.balances.entry(to.to_string()).or_default() += amount;
        state.posted.push(Posted {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        });

        let timestamp = tick_timestamp(state.transactions.len());
        state.transactions.push(Transaction {
            timestamp,
            from_address: Some(from.to_string()),
            to_address: to.to_string(),
            amount,
        });

        Ok(())
    }

    async fn create(&self, addr: &str) -> Result<(), LedgerError> {
        // the real faucet mints a fixed 50 Jobcoins
        self.fund(addr, Amount::from_float(50.0));
        Ok(())
    }
}
