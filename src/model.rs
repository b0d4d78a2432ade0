//! Boundary types for the Jobcoin ledger API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// A transfer recorded on the Jobcoin ledger.
///
/// Field names follow the Jobcoin API; `amount` is a decimal string on the
/// wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// Absent on coinbase transactions minted by the faucet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,
    pub to_address: String,
    pub amount: Amount,
}

/// Balance and full history of a single address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressInfo {
    pub balance: Amount,
    pub transactions: Vec<Transaction>,
}
