//! # ledger::http
//!
//! **HttpLedger** — เรียก Ledger จริงผ่าน chain gateway (JSON over HTTP)
//!
//! Gateway เป็น sidecar หน้า blockchain node: รับ call, เซ็น, ส่ง, รอ receipt
//! แล้วค่อยตอบกลับ — ดังนั้น "ตอบกลับ confirmed" = **finality**
//!
//! ## Gateway response contract
//! Mutating endpoint ทุกอันคืน envelope:
//! ```json
//! { "status": "confirmed", "tx_hash": "0x…" }
//! { "status": "reverted",  "reason": "Insufficient balance" }
//! ```
//! `reverted` ถูก map เป็น [`RejectReason`] ด้วย substring เดียวกับที่
//! web client เดิมใช้แยกข้อความ error ของ contract

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::{AppError, RejectReason};
use crate::ledger::Ledger;
use crate::models::{Account, DailyMarket, Direction, LeverageTier, Position, TodayMarket};
use crate::settlement::Settlement;

// ─── Wire envelopes ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum TxStatus {
    Confirmed,
    Reverted,
}

/// Envelope ของ mutating call — `data` แล้วแต่ endpoint
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: serde::de::Deserialize<'de>"))]
struct TxReceipt<T> {
    status: TxStatus,
    #[serde(default)]
    tx_hash: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    data: Option<T>,
}

/// Position ตาม ABI ของ contract — enums เป็นเลข ต้อง decode ก่อนใช้
#[derive(Debug, Deserialize)]
struct PositionWire {
    day_index: u64,
    owner: String,
    direction: u8,
    tier: u8,
    amount_cents: u64,
    claimed: bool,
    liquidated: bool,
}

impl PositionWire {
    fn decode(self) -> Result<Position, AppError> {
        let direction = Direction::from_wire(self.direction).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown direction encoding {}", self.direction))
        })?;
        let tier = LeverageTier::from_wire(self.tier).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("unknown leverage tier encoding {}", self.tier))
        })?;

        Ok(Position {
            day_index: self.day_index,
            owner: self.owner,
            tier,
            direction,
            amount_cents: self.amount_cents,
            claimed: self.claimed,
            liquidated: self.liquidated,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PositionEnvelope {
    position: Option<PositionWire>,
}

#[derive(Debug, Deserialize)]
struct AccountEnvelope {
    account: Option<Account>,
}

#[derive(Debug, Serialize)]
struct ResolveBody {
    end_price_cents: u64,
}

#[derive(Debug, Serialize)]
struct NewDayBody {
    start_price_cents: u64,
}

#[derive(Debug, Serialize)]
struct OpenBody<'a> {
    owner: &'a str,
    direction: u8,
    tier: u8,
    amount_cents: u64,
}

#[derive(Debug, Serialize)]
struct CloseBody<'a> {
    owner: &'a str,
    day_index: u64,
    tier: u8,
}

#[derive(Debug, Serialize)]
struct OwnerBody<'a> {
    owner: &'a str,
}

#[derive(Debug, Deserialize)]
struct BonusData {
    bonus_cents: u64,
}

// ─── HttpLedger ───────────────────────────────────────────────────────────────

pub struct HttpLedger {
    client: reqwest::Client,
    base_url: String,
    /// รอ finality ได้นานสุดเท่านี้ ก่อนตัดเป็น [`AppError::LedgerTimeout`]
    finality_timeout: Duration,
}

impl HttpLedger {
    pub fn new(client: reqwest::Client, base_url: &str, finality_timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            finality_timeout,
        }
    }

    // ── Transport helpers ─────────────────────────────────────────────────────

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, AppError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .get(&url)
            .timeout(self.finality_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("GET", path, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, path, body = %body, "Gateway returned HTTP error");
            return Err(AppError::Internal(anyhow::anyhow!(
                "gateway HTTP {status} on {path}: {body}"
            )));
        }

        response.json().await.map_err(|e| {
            error!(error = %e, path, "Gateway response parse failed");
            AppError::Internal(anyhow::anyhow!("gateway response parse error on {path}: {e}"))
        })
    }

    /// POST + ตรวจ receipt — reverted → LedgerRejected พร้อมเหตุผล
    async fn submit<B: Serialize, T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<T>, AppError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(body)
            .timeout(self.finality_timeout)
            .send()
            .await
            .map_err(|e| self.transport_error("POST", path, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response.text().await.unwrap_or_default();
            error!(http_status = %status, path, body = %body_text, "Gateway returned HTTP error");
            return Err(AppError::Internal(anyhow::anyhow!(
                "gateway HTTP {status} on {path}: {body_text}"
            )));
        }

        let receipt: TxReceipt<T> = response.json().await.map_err(|e| {
            error!(error = %e, path, "Gateway receipt parse failed");
            AppError::Internal(anyhow::anyhow!("gateway receipt parse error on {path}: {e}"))
        })?;

        match receipt.status {
            TxStatus::Confirmed => {
                info!(path, tx_hash = ?receipt.tx_hash, "✅ Ledger call confirmed");
                Ok(receipt.data)
            }
            TxStatus::Reverted => {
                let raw = receipt.reason.unwrap_or_else(|| "unknown revert".to_string());
                let reason = RejectReason::from_revert(&raw);
                warn!(path, raw_reason = %raw, "Ledger call reverted");
                Err(AppError::LedgerRejected(reason))
            }
        }
    }

    fn transport_error(&self, method: &str, path: &str, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            error!(method, path, "Gateway call timed out waiting for finality");
            AppError::LedgerTimeout(format!(
                "{method} {path}: no finality within {:?}",
                self.finality_timeout
            ))
        } else {
            error!(method, path, error = %e, "Gateway unreachable");
            AppError::Internal(anyhow::anyhow!("gateway unreachable on {method} {path}: {e}"))
        }
    }
}

// ─── Ledger impl ──────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl Ledger for HttpLedger {
    async fn get_today_market(&self) -> Result<TodayMarket, AppError> {
        self.get_json("/ledger/market/today").await
    }

    async fn get_market(&self, day_index: u64) -> Result<DailyMarket, AppError> {
        self.get_json(&format!("/ledger/market/{day_index}")).await
    }

    async fn resolve_day(&self, end_price_cents: u64) -> Result<(), AppError> {
        self.submit::<_, serde_json::Value>(
            "/ledger/market/resolve",
            &ResolveBody { end_price_cents },
        )
        .await?;
        Ok(())
    }

    async fn start_new_day(&self, start_price_cents: u64) -> Result<(), AppError> {
        self.submit::<_, serde_json::Value>(
            "/ledger/market/new-day",
            &NewDayBody { start_price_cents },
        )
        .await?;
        Ok(())
    }

    async fn get_position(
        &self,
        day_index: u64,
        owner: &str,
        tier: LeverageTier,
    ) -> Result<Option<Position>, AppError> {
        let envelope: PositionEnvelope = self
            .get_json(&format!("/ledger/position/{day_index}/{owner}/{}", tier.wire()))
            .await?;
        envelope.position.map(PositionWire::decode).transpose()
    }

    async fn open_position(
        &self,
        owner: &str,
        direction: Direction,
        tier: LeverageTier,
        amount_cents: u64,
    ) -> Result<Position, AppError> {
        let position: Option<PositionWire> = self
            .submit(
                "/ledger/position/open",
                &OpenBody {
                    owner,
                    direction: direction.wire(),
                    tier: tier.wire(),
                    amount_cents,
                },
            )
            .await?;

        position
            .ok_or_else(|| {
                AppError::Internal(anyhow::anyhow!("gateway confirmed open without position data"))
            })?
            .decode()
    }

    async fn close_position(
        &self,
        owner: &str,
        day_index: u64,
        tier: LeverageTier,
    ) -> Result<Settlement, AppError> {
        let settlement: Option<Settlement> = self
            .submit(
                "/ledger/position/close",
                &CloseBody { owner, day_index, tier: tier.wire() },
            )
            .await?;

        settlement.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("gateway confirmed close without settlement data"))
        })
    }

    async fn get_account(&self, owner: &str) -> Result<Account, AppError> {
        let envelope: AccountEnvelope =
            self.get_json(&format!("/ledger/account/{owner}")).await?;
        envelope
            .account
            .ok_or(AppError::LedgerRejected(RejectReason::NoAccount))
    }

    async fn initialize_account(&self, owner: &str) -> Result<Account, AppError> {
        let account: Option<Account> = self
            .submit("/ledger/account/init", &OwnerBody { owner })
            .await?;
        account.ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("gateway confirmed init without account data"))
        })
    }

    async fn claim_daily_bonus(&self, owner: &str) -> Result<u64, AppError> {
        let data: Option<BonusData> = self
            .submit("/ledger/account/bonus", &OwnerBody { owner })
            .await?;
        data.map(|d| d.bonus_cents).ok_or_else(|| {
            AppError::Internal(anyhow::anyhow!("gateway confirmed bonus without amount data"))
        })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_envelope_parses_confirmed() {
        let raw = r#"{"status":"confirmed","tx_hash":"0xabc","data":{"bonus_cents":600}}"#;
        let receipt: TxReceipt<BonusData> = serde_json::from_str(raw).unwrap();
        assert!(matches!(receipt.status, TxStatus::Confirmed));
        assert_eq!(receipt.tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(receipt.data.unwrap().bonus_cents, 600);
    }

    #[test]
    fn test_position_wire_decodes_abi_enums() {
        let raw = r#"{
            "position": {
                "day_index": 7,
                "owner": "0xa11ce",
                "direction": 1,
                "tier": 2,
                "amount_cents": 5000,
                "claimed": false,
                "liquidated": false
            }
        }"#;
        let envelope: PositionEnvelope = serde_json::from_str(raw).unwrap();
        let position = envelope.position.unwrap().decode().unwrap();
        assert_eq!(position.direction, Direction::Short);
        assert_eq!(position.tier, LeverageTier::X10);
        assert_eq!(position.amount_cents, 5_000);
    }

    #[test]
    fn test_position_wire_rejects_unknown_tier() {
        let wire = PositionWire {
            day_index: 1,
            owner: "0xa11ce".to_string(),
            direction: 0,
            tier: 9,
            amount_cents: 5_000,
            claimed: false,
            liquidated: false,
        };
        assert!(wire.decode().is_err());
    }

    #[test]
    fn test_receipt_envelope_parses_reverted() {
        let raw = r#"{"status":"reverted","reason":"Trading not active"}"#;
        let receipt: TxReceipt<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(matches!(receipt.status, TxStatus::Reverted));
        assert_eq!(
            RejectReason::from_revert(receipt.reason.as_deref().unwrap()),
            RejectReason::MarketInactive
        );
    }
}
