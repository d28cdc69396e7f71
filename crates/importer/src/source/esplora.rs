//! Esplora REST client (blockstream.info, mempool.space and self-hosted
//! electrs all expose the same address history endpoints).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;
use txsync_domain::model::{AddressId, RawLeg, RawTransaction};

use super::{LedgerSource, SourceError};

/// Confirmed transactions per `/txs/chain` page.
const PAGE_SIZE: usize = 25;
/// Satoshis carry eight decimal places.
const VALUE_SCALE: u32 = 8;

pub struct EsploraSource {
    client: Client,
    base_url: String,
    max_pages: usize,
}

impl EsploraSource {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
    pub const DEFAULT_MAX_PAGES: usize = 400;

    pub fn new(base_url: impl Into<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .build()
            .map_err(|err| SourceError::Unavailable(err.to_string()))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            max_pages: Self::DEFAULT_MAX_PAGES,
        }
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages.max(1);
        self
    }

    fn page_url(&self, address: &AddressId, last_seen: Option<&str>) -> String {
        match last_seen {
            Some(txid) => format!("{}/address/{}/txs/chain/{}", self.base_url, address, txid),
            None => format!("{}/address/{}/txs/chain", self.base_url, address),
        }
    }

    async fn fetch_page(
        &self,
        address: &AddressId,
        last_seen: Option<&str>,
    ) -> Result<Vec<EsploraTx>, SourceError> {
        let response = self
            .client
            .get(self.page_url(address, last_seen))
            .send()
            .await?
            .error_for_status()?;
        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|err| SourceError::Malformed(err.to_string()))
    }
}

#[async_trait]
impl LedgerSource for EsploraSource {
    async fn fetch_transactions(
        &self,
        address: &AddressId,
    ) -> Result<Vec<RawTransaction>, SourceError> {
        let mut newest_first = Vec::new();
        let mut last_seen: Option<String> = None;

        for page_index in 0..self.max_pages {
            let page = self.fetch_page(address, last_seen.as_deref()).await?;
            let page_len = page.len();
            debug!(%address, page_index, page_len, "fetched esplora page");
            last_seen = page.last().map(|tx| tx.txid.clone());
            newest_first.extend(page);

            if page_len < PAGE_SIZE {
                // oldest first reads like the ledger's own history
                return newest_first
                    .into_iter()
                    .rev()
                    .filter(|tx| tx.status.confirmed)
                    .map(convert_tx)
                    .collect();
            }
        }

        Err(SourceError::Unavailable(format!(
            "history for {address} exceeds {} pages",
            self.max_pages
        )))
    }
}

#[derive(Debug, Deserialize)]
struct EsploraTx {
    txid: String,
    vin: Vec<EsploraVin>,
    vout: Vec<EsploraVout>,
    status: EsploraStatus,
}

#[derive(Debug, Deserialize)]
struct EsploraVin {
    #[serde(default)]
    prevout: Option<EsploraVout>,
    #[serde(default)]
    is_coinbase: bool,
}

#[derive(Debug, Deserialize)]
struct EsploraVout {
    #[serde(default)]
    scriptpubkey_address: Option<String>,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraStatus {
    confirmed: bool,
}

fn convert_tx(tx: EsploraTx) -> Result<RawTransaction, SourceError> {
    let mut inputs = Vec::with_capacity(tx.vin.len());
    for vin in tx.vin {
        if vin.is_coinbase {
            continue;
        }
        let prevout = vin.prevout.ok_or_else(|| {
            SourceError::Malformed(format!("input of {} is missing its prevout", tx.txid))
        })?;
        inputs.push(convert_leg(prevout)?);
    }

    let outputs = tx
        .vout
        .into_iter()
        .map(convert_leg)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RawTransaction {
        identifier: tx.txid,
        inputs,
        outputs,
    })
}

fn convert_leg(vout: EsploraVout) -> Result<RawLeg, SourceError> {
    let sats = i64::try_from(vout.value)
        .map_err(|_| SourceError::Malformed(format!("value overflow: {}", vout.value)))?;
    Ok(RawLeg {
        value: Decimal::new(sats, VALUE_SCALE),
        owner_address: vout.scriptpubkey_address,
    })
}
