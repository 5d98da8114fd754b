//! # oracle — Price Oracle Client
//!
//! ดึงราคา BTC spot จาก Quote Service (CoinGecko-style) แล้ว normalize เป็น
//! **integer cents** — หน่วย canonical เดียวกับ Ledger
//!
//! ## Failure policy
//! Oracle ล้ม → propagate [`AppError::OracleUnavailable`] เสมอ
//! ห้าม fallback เป็นราคาเก่าหรือราคา mock เด็ดขาด — ราคาผิดวันเดียว
//! ทำให้ทั้งวัน Settlement เพี้ยน

use std::collections::HashMap;

use tracing::{error, info};

use crate::config::Config;
use crate::error::AppError;

/// Quote request timeout — ราคา spot ช้ากว่านี้ถือว่าใช้ไม่ได้
const QUOTE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);

// ─── PriceSource ──────────────────────────────────────────────────────────────

/// Seam for the scheduler: production uses [`CoinGecko`], tests plug in a
/// fixed-price stub.
#[async_trait::async_trait]
pub trait PriceSource: Send + Sync {
    /// Latest reference price in integer cents.
    async fn fetch_price_cents(&self) -> Result<u64, AppError>;
}

// ─── Unit conversion ──────────────────────────────────────────────────────────

/// USD decimal → integer cents, truncating (floor).
///
/// ต้อง floor เท่านั้น (ไม่ round) — convention เดียวกับ Ledger ฝั่ง contract
#[inline]
pub fn cents_from_usd(usd: f64) -> u64 {
    (usd * 100.0).floor() as u64
}

// ─── CoinGecko client ─────────────────────────────────────────────────────────

/// HTTP client for the CoinGecko `simple/price` quote endpoint.
pub struct CoinGecko {
    client: reqwest::Client,
    url: String,
    asset_id: String,
    vs_currency: String,
}

impl CoinGecko {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            url: config.oracle_url.clone(),
            asset_id: config.asset_id.clone(),
            vs_currency: config.vs_currency.clone(),
        }
    }
}

#[async_trait::async_trait]
impl PriceSource for CoinGecko {
    async fn fetch_price_cents(&self) -> Result<u64, AppError> {
        let url = format!(
            "{}?ids={}&vs_currencies={}",
            self.url, self.asset_id, self.vs_currency
        );

        let response = self
            .client
            .get(&url)
            .timeout(QUOTE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Oracle unreachable");
                AppError::OracleUnavailable(format!("quote service unreachable: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            error!(http_status = %status, "Oracle returned HTTP error");
            return Err(AppError::OracleUnavailable(format!(
                "quote service HTTP {status}"
            )));
        }

        // Payload: { "<asset>": { "<currency>": <decimal price> } }
        let quotes: HashMap<String, HashMap<String, f64>> =
            response.json().await.map_err(|e| {
                error!(error = %e, "Oracle payload parse failed");
                AppError::OracleUnavailable(format!("malformed quote payload: {e}"))
            })?;

        let price_usd = quotes
            .get(&self.asset_id)
            .and_then(|q| q.get(&self.vs_currency))
            .copied()
            .ok_or_else(|| {
                AppError::OracleUnavailable(format!(
                    "quote payload missing {}/{}",
                    self.asset_id, self.vs_currency
                ))
            })?;

        if !price_usd.is_finite() || price_usd <= 0.0 {
            return Err(AppError::OracleUnavailable(format!(
                "nonsensical quote: {price_usd}"
            )));
        }

        let cents = cents_from_usd(price_usd);
        info!(price_usd, cents, "📊 BTC reference price fetched");

        Ok(cents)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
