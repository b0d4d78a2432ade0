//! Jobcoin ledger client.

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::model::{AddressInfo, Transaction};
use crate::Amount;

mod http;
pub mod mock;

pub use http::HttpClient;

/// Error talking to the Jobcoin API.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("malformed API url: {0}")]
    MalformedUrl(#[from] url::ParseError),

    #[error("API error ({status}): {message}")]
    Api { status: StatusCode, message: String },
}

/// Client for the Jobcoin ledger API.
///
/// The engine is written against this trait so tests can drive it with
/// [`mock::MockLedger`] instead of a live instance.
#[async_trait]
pub trait JobcoinClient: Send + Sync {
    /// Balance and full transaction history of an address.
    async fn address_info(&self, addr: &str) -> Result<AddressInfo, LedgerError>;

    /// The complete ledger history in chronological order.
    ///
    /// The ledger is append-only: the returned length never decreases across
    /// calls.
    async fn transactions(&self) -> Result<Vec<Transaction>, LedgerError>;

    /// Submit a transfer.
    async fn post_transaction(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError>;

    /// Mint Jobcoins out of thin air. Testing only.
    async fn create(&self, addr: &str) -> Result<(), LedgerError>;
}

#[async_trait]
impl<T: JobcoinClient + ?Sized> JobcoinClient for std::sync::Arc<T> {
    async fn address_info(&self, addr: &str) -> Result<AddressInfo, LedgerError> {
        (**self).address_info(addr).await
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        (**self).transactions().await
    }

    async fn post_transaction(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        (**self).post_transaction(from, to, amount).await
    }

    async fn create(&self, addr: &str) -> Result<(), LedgerError> {
        (**self).create(addr).await
    }
}
