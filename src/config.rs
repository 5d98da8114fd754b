//! # config — อ่าน Config จาก Environment Variables

use std::time::Duration;

use anyhow::Context;
use chrono::NaiveTime;

/// Config ทั้งหมดที่ Daybreak ต้องการ
#[derive(Debug, Clone)]
pub struct Config {
    /// URL ของ chain gateway — `"mock"` = ใช้ in-memory ledger (dev/test)
    pub ledger_url: String,
    /// Quote endpoint (CoinGecko simple/price)
    pub oracle_url: String,
    /// Asset id ที่ถาม Oracle เช่น "bitcoin"
    pub asset_id: String,
    /// สกุลอ้างอิง เช่น "usd"
    pub vs_currency: String,
    /// เวลา UTC ที่ Cycle รันประจำวัน (default 00:00)
    pub resolve_utc: NaiveTime,
    /// หยุดรอให้ Ledger propagate หลัง resolve ก่อนเริ่มวันใหม่
    pub settle_delay: Duration,
    /// รอ Finality ของ Ledger call ได้นานสุดเท่าไร
    pub finality_timeout: Duration,
    /// รัน Cycle ทันทีตอน Start (สำหรับ operational testing)
    pub run_on_start: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let resolve_str =
            std::env::var("RESOLVE_UTC").unwrap_or_else(|_| "00:00".to_string());
        let resolve_utc = NaiveTime::parse_from_str(&resolve_str, "%H:%M")
            .with_context(|| format!("RESOLVE_UTC must be HH:MM, got '{resolve_str}'"))?;

        Ok(Self {
            ledger_url: std::env::var("LEDGER_URL").unwrap_or_else(|_| "mock".to_string()),
            oracle_url: std::env::var("ORACLE_URL").unwrap_or_else(|_| {
                "https://api.coingecko.com/api/v3/simple/price".to_string()
            }),
            asset_id: std::env::var("ORACLE_ASSET").unwrap_or_else(|_| "bitcoin".to_string()),
            vs_currency: std::env::var("ORACLE_VS").unwrap_or_else(|_| "usd".to_string()),
            resolve_utc,
            settle_delay: Duration::from_secs(env_u64("SETTLE_DELAY_SECS", 5)),
            finality_timeout: Duration::from_secs(env_u64("FINALITY_TIMEOUT_SECS", 60)),
            run_on_start: std::env::var("RUN_ON_START")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_utc_parses() {
        let t = NaiveTime::parse_from_str("00:00", "%H:%M").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        let t = NaiveTime::parse_from_str("14:30", "%H:%M").unwrap();
        assert_eq!(t, NaiveTime::from_hms_opt(14, 30, 0).unwrap());
    }
}
