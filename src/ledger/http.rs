//! HTTP+JSON implementation of the ledger client.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use url::Url;

use crate::model::{AddressInfo, Transaction};
use crate::Amount;

use super::{JobcoinClient, LedgerError};

/// Jobcoin requests are cheap; anything slower than this is treated as a
/// transient failure and retried on a later tick.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for a Jobcoin API instance.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base: String,
    http: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostBody<'a> {
    from_address: &'a str,
    to_address: &'a str,
    amount: Amount,
}

impl HttpClient {
    /// Create a client for the API rooted at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, LedgerError> {
        let base = Url::parse(base_url)?;
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(HttpClient {
            base: base.as_str().trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl JobcoinClient for HttpClient {
    async fn address_info(&self, addr: &str) -> Result<AddressInfo, LedgerError> {
        let url = format!("{}/api/addresses/{addr}", self.base);
        let res = check_status(self.http.get(&url).send().await?).await?;
        Ok(res.json().await?)
    }

    async fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        let url = format!("{}/api/transactions", self.base);
        let res = check_status(self.http.get(&url).send().await?).await?;
        Ok(res.json().await?)
    }

    async fn post_transaction(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<(), LedgerError> {
        debug!(%from, %to, %amount, "posting transaction");

        let url = format!("{}/api/transactions", self.base);
        let body = PostBody {
            from_address: from,
            to_address: to,
            amount,
        };
        check_status(self.http.post(&url).json(&body).send().await?).await?;

        Ok(())
    }

    async fn create(&self, addr: &str) -> Result<(), LedgerError> {
        let url = format!("{}/create", self.base);
        let res = self.http.post(&url).form(&[("address", addr)]).send().await?;
        check_status(res).await?;

        Ok(())
    }
}

/// Map HTTP >= 400 to an API error, surfacing the body's `error` field when
/// present.
async fn check_status(res: reqwest::Response) -> Result<reqwest::Response, LedgerError> {
    let status = res.status();
    if !status.is_client_error() && !status.is_server_error() {
        return Ok(res);
    }

    let message = match res.json::<serde_json::Value>().await {
        Ok(body) => match body.get("error") {
            Some(serde_json::Value::String(msg)) => msg.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        Err(_) => "no error message provided".to_string(),
    };

    Err(LedgerError::Api { status, message })
}
