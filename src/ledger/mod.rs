//! # ledger
//!
//! The **consumed** ledger contract. Daybreak ไม่ได้เป็นเจ้าของ storage —
//! balances, positions และ market records อยู่บน chain; เราเรียกผ่าน
//! [`Ledger`] trait แล้วปล่อยให้ transport เป็นเรื่องของ implementation:
//!
//! - [`http::HttpLedger`] — JSON over HTTP ไปยัง chain gateway (production)
//! - [`memory::MemoryLedger`] — in-memory semantics (dev mode / tests)
//!
//! Every mutating call **awaits finality**: when the future resolves Ok the
//! effects are irreversible and observable by subsequent reads.

pub mod http;
pub mod memory;

use crate::error::AppError;
use crate::models::{Account, DailyMarket, Direction, LeverageTier, Position, TodayMarket};
use crate::settlement::Settlement;

/// Operations the external ledger exposes to this core.
///
/// Preconditions mirror the contract: `resolve_day` needs an active market,
/// `start_new_day` needs none, `close_position` needs a resolved day and an
/// unclaimed position. Violations surface as
/// [`AppError::LedgerRejected`](crate::error::AppError).
#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Compact current-market view; the scheduler derives its phase from it.
    async fn get_today_market(&self) -> Result<TodayMarket, AppError>;

    /// Full record of one day (resolved days keep their closing price).
    async fn get_market(&self, day_index: u64) -> Result<DailyMarket, AppError>;

    /// Commit the closing price of the active day; flips it to resolved.
    async fn resolve_day(&self, end_price_cents: u64) -> Result<(), AppError>;

    /// Open the next day with its starting price.
    async fn start_new_day(&self, start_price_cents: u64) -> Result<(), AppError>;

    async fn get_position(
        &self,
        day_index: u64,
        owner: &str,
        tier: LeverageTier,
    ) -> Result<Option<Position>, AppError>;

    /// Open a position against the currently active day.
    async fn open_position(
        &self,
        owner: &str,
        direction: Direction,
        tier: LeverageTier,
        amount_cents: u64,
    ) -> Result<Position, AppError>;

    /// Settle a position against its resolved day. Returns the realized
    /// settlement; callable once per position.
    async fn close_position(
        &self,
        owner: &str,
        day_index: u64,
        tier: LeverageTier,
    ) -> Result<Settlement, AppError>;

    async fn get_account(&self, owner: &str) -> Result<Account, AppError>;

    /// Create the account with the starting virtual balance.
    async fn initialize_account(&self, owner: &str) -> Result<Account, AppError>;

    /// Claim today's bonus; returns the credited amount in cents.
    async fn claim_daily_bonus(&self, owner: &str) -> Result<u64, AppError>;
}
