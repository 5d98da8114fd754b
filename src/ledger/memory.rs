//! # ledger::memory
//!
//! **MemoryLedger** — Ledger semantics ทั้งหมดใน memory
//!
//! เลือกใช้ด้วย `LEDGER_URL=mock` สำหรับ dev โดยไม่ต้องมี chain gateway
//! และเป็น harness หลักของ scheduler/route tests — settlement path ของมัน
//! คือ [`settlement::settle`](crate::settlement::settle) ตัวเดียวกับ preview
//!
//! Single `RwLock` around the whole state: ทุก operation เป็น atomic
//! ต่อกัน เหมือน transaction ordering บน chain

use std::collections::{BTreeMap, HashMap};

use tokio::sync::RwLock;
use tracing::info;

use crate::error::{AppError, RejectReason};
use crate::ledger::Ledger;
use crate::models::position::{
    BONUS_BASE_CENTS, BONUS_PER_STREAK_CENTS, MIN_STAKE_CENTS,
};
use crate::models::{Account, DailyMarket, Direction, LeverageTier, Position, TodayMarket};
use crate::settlement::{settle, Settlement};

// ─── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct MemoryInner {
    /// day_index → market (BTreeMap เพื่อให้ last = วันล่าสุดเสมอ)
    markets: BTreeMap<u64, DailyMarket>,
    /// (owner, day_index, tier wire) → position
    positions: HashMap<(String, u64, u8), Position>,
    accounts: HashMap<String, Account>,
}

impl MemoryInner {
    fn active_market(&self) -> Option<&DailyMarket> {
        // มี active ได้มากสุดหนึ่งวัน และต้องเป็นวันล่าสุด
        self.markets.values().next_back().filter(|m| m.is_active)
    }

    fn current_day_index(&self) -> u64 {
        self.markets.keys().next_back().copied().unwrap_or(0)
    }
}

/// In-memory implementation of the full [`Ledger`] contract.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    inner: RwLock<MemoryInner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

// ─── Ledger impl ──────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl Ledger for MemoryLedger {
    async fn get_today_market(&self) -> Result<TodayMarket, AppError> {
        let inner = self.inner.read().await;

        // ยังไม่มีวันไหนเลย → day 0, inactive (scheduler จะ start วันแรกเอง)
        let Some(last) = inner.markets.values().next_back() else {
            return Ok(TodayMarket { day_index: 0, start_price_cents: 0, is_active: false });
        };

        Ok(TodayMarket {
            day_index: last.day_index,
            start_price_cents: last.start_price_cents,
            is_active: last.is_active,
        })
    }

    async fn get_market(&self, day_index: u64) -> Result<DailyMarket, AppError> {
        let inner = self.inner.read().await;
        inner
            .markets
            .get(&day_index)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("market for day {day_index}")))
    }

    async fn resolve_day(&self, end_price_cents: u64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        let Some(market) = inner.markets.values_mut().next_back().filter(|m| m.is_active)
        else {
            return Err(AppError::LedgerRejected(RejectReason::MarketInactive));
        };

        market.end_price_cents = Some(end_price_cents);
        market.resolved = true;
        market.is_active = false;

        info!(day_index = market.day_index, end_price_cents, "📉 Day resolved (memory ledger)");
        Ok(())
    }

    async fn start_new_day(&self, start_price_cents: u64) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;

        if inner.active_market().is_some() {
            return Err(AppError::LedgerRejected(RejectReason::MarketStillActive));
        }

        let day_index = inner.current_day_index() + 1;
        inner.markets.insert(
            day_index,
            DailyMarket {
                day_index,
                start_price_cents,
                end_price_cents: None,
                is_active: true,
                resolved: false,
            },
        );

        info!(day_index, start_price_cents, "🌅 New day started (memory ledger)");
        Ok(())
    }

    async fn get_position(
        &self,
        day_index: u64,
        owner: &str,
        tier: LeverageTier,
    ) -> Result<Option<Position>, AppError> {
        let inner = self.inner.read().await;
        Ok(inner
            .positions
            .get(&(owner.to_string(), day_index, tier.wire()))
            .cloned())
    }

    async fn open_position(
        &self,
        owner: &str,
        direction: Direction,
        tier: LeverageTier,
        amount_cents: u64,
    ) -> Result<Position, AppError> {
        let mut inner = self.inner.write().await;

        if amount_cents < MIN_STAKE_CENTS {
            return Err(AppError::LedgerRejected(RejectReason::BelowMinStake));
        }

        let day_index = match inner.active_market() {
            Some(m) => m.day_index,
            None => return Err(AppError::LedgerRejected(RejectReason::MarketInactive)),
        };

        let key = (owner.to_string(), day_index, tier.wire());
        if inner.positions.contains_key(&key) {
            return Err(AppError::LedgerRejected(RejectReason::DuplicatePosition));
        }

        let account = inner
            .accounts
            .get_mut(owner)
            .ok_or(AppError::LedgerRejected(RejectReason::NoAccount))?;
        if account.balance_cents < amount_cents {
            return Err(AppError::LedgerRejected(RejectReason::InsufficientBalance));
        }

        // Stake ถูกหักตอนเปิด แล้วคืนเป็น final amount ตอน settle
        account.balance_cents -= amount_cents;

        let position = Position {
            day_index,
            owner: owner.to_string(),
            tier,
            direction,
            amount_cents,
            claimed: false,
            liquidated: false,
        };
        inner.positions.insert(key, position.clone());

        Ok(position)
    }

    async fn close_position(
        &self,
        owner: &str,
        day_index: u64,
        tier: LeverageTier,
    ) -> Result<Settlement, AppError> {
        let mut inner = self.inner.write().await;

        let market = match inner.markets.get(&day_index) {
            Some(m) => m.clone(),
            None => return Err(AppError::LedgerRejected(RejectReason::NoPosition)),
        };
        let end_price_cents = match (market.resolved, market.end_price_cents) {
            (true, Some(p)) => p,
            _ => return Err(AppError::LedgerRejected(RejectReason::MarketUnresolved)),
        };

        let key = (owner.to_string(), day_index, tier.wire());
        let position = inner
            .positions
            .get(&key)
            .cloned()
            .ok_or(AppError::LedgerRejected(RejectReason::NoPosition))?;
        if position.claimed {
            // One-way latch — ห้าม re-apply P&L เด็ดขาด
            return Err(AppError::LedgerRejected(RejectReason::AlreadyClaimed));
        }

        let outcome = settle(
            position.direction,
            position.tier,
            position.amount_cents,
            market.start_price_cents,
            end_price_cents,
        );

        if let Some(stored) = inner.positions.get_mut(&key) {
            stored.claimed = true;
            stored.liquidated = outcome.is_liquidated;
        }

        let account = inner
            .accounts
            .get_mut(owner)
            .ok_or(AppError::LedgerRejected(RejectReason::NoAccount))?;

        account.balance_cents += outcome.final_cents;
        account.total_trades += 1;
        if outcome.is_profit {
            account.winning_trades += 1;
        }
        // Realized P&L — ขาดทุนโดน clamp ที่ stake เสมอ (final − stake)
        account.total_pnl_cents +=
            outcome.final_cents as i64 - position.amount_cents as i64;

        info!(
            owner,
            day_index,
            tier = ?tier,
            pnl_cents = outcome.pnl_cents,
            final_cents = outcome.final_cents,
            liquidated = outcome.is_liquidated,
            "Position settled (memory ledger)"
        );

        Ok(outcome)
    }

    async fn get_account(&self, owner: &str) -> Result<Account, AppError> {
        let inner = self.inner.read().await;
        inner
            .accounts
            .get(owner)
            .cloned()
            .ok_or(AppError::LedgerRejected(RejectReason::NoAccount))
    }

    async fn initialize_account(&self, owner: &str) -> Result<Account, AppError> {
        let mut inner = self.inner.write().await;

        if inner.accounts.contains_key(owner) {
            return Err(AppError::LedgerRejected(RejectReason::AccountExists));
        }

        let account = Account::fresh();
        inner.accounts.insert(owner.to_string(), account.clone());
        info!(owner, "Account initialized with starting balance");

        Ok(account)
    }

    async fn claim_daily_bonus(&self, owner: &str) -> Result<u64, AppError> {
        let mut inner = self.inner.write().await;
        let today = inner.current_day_index();

        let account = inner
            .accounts
            .get_mut(owner)
            .ok_or(AppError::LedgerRejected(RejectReason::NoAccount))?;

        if account.last_bonus_day == Some(today) {
            return Err(AppError::LedgerRejected(RejectReason::BonusAlreadyClaimed));
        }

        // Streak ต่อเนื่องเมื่อเคลมวันถัดจากครั้งก่อนพอดี ไม่งั้นเริ่มนับใหม่
        account.streak = match account.last_bonus_day {
            Some(prev) if prev + 1 == today => account.streak + 1,
            _ => 1,
        };
        account.best_streak = account.best_streak.max(account.streak);
        account.last_bonus_day = Some(today);

        let bonus = BONUS_BASE_CENTS + BONUS_PER_STREAK_CENTS * account.streak;
        account.balance_cents += bonus;

        info!(owner, bonus_cents = bonus, streak = account.streak, "🎁 Daily bonus claimed");
        Ok(bonus)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const ALICE: &str = "0xa11ce";

    async fn ledger_with_active_day(start_price: u64) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger.start_new_day(start_price).await.unwrap();
        ledger.initialize_account(ALICE).await.unwrap();
        ledger
    }

    #[tokio::test]
    async fn test_first_day_starts_at_index_one() {
        let ledger = MemoryLedger::new();
        let today = ledger.get_today_market().await.unwrap();
        assert!(!today.is_active);

        ledger.start_new_day(9_650_000).await.unwrap();
        let today = ledger.get_today_market().await.unwrap();
        assert_eq!(today.day_index, 1);
        assert_eq!(today.start_price_cents, 9_650_000);
        assert!(today.is_active);
    }

    #[tokio::test]
    async fn test_start_new_day_rejected_while_active() {
        let ledger = ledger_with_active_day(9_650_000).await;
        let err = ledger.start_new_day(9_700_000).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::MarketStillActive)
        ));
    }

    #[tokio::test]
    async fn test_resolve_requires_active_market() {
        let ledger = MemoryLedger::new();
        let err = ledger.resolve_day(9_700_000).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::MarketInactive)
        ));
    }

    #[tokio::test]
    async fn test_open_close_happy_path() {
        let ledger = ledger_with_active_day(9_650_000).await;

        let pos = ledger
            .open_position(ALICE, Direction::Long, LeverageTier::X2, 10_000)
            .await
            .unwrap();
        assert_eq!(pos.day_index, 1);
        assert!(!pos.claimed);

        // Stake หักออกทันทีตอนเปิด
        let acc = ledger.get_account(ALICE).await.unwrap();
        assert_eq!(acc.balance_cents, 90_000);

        // +5% ⇒ 2x LONG ได้ +10%
        ledger.resolve_day(10_132_500).await.unwrap();
        let outcome = ledger
            .close_position(ALICE, 1, LeverageTier::X2)
            .await
            .unwrap();
        assert_eq!(outcome.pnl_cents, 1_000);
        assert_eq!(outcome.final_cents, 11_000);

        let acc = ledger.get_account(ALICE).await.unwrap();
        assert_eq!(acc.balance_cents, 101_000);
        assert_eq!(acc.total_trades, 1);
        assert_eq!(acc.winning_trades, 1);
        assert_eq!(acc.total_pnl_cents, 1_000);
    }

    #[tokio::test]
    async fn test_close_twice_rejected_and_balance_unchanged() {
        let ledger = ledger_with_active_day(9_650_000).await;
        ledger
            .open_position(ALICE, Direction::Long, LeverageTier::X1, 10_000)
            .await
            .unwrap();
        ledger.resolve_day(10_132_500).await.unwrap();
        ledger.close_position(ALICE, 1, LeverageTier::X1).await.unwrap();

        let balance_after_first = ledger.get_account(ALICE).await.unwrap().balance_cents;

        let err = ledger
            .close_position(ALICE, 1, LeverageTier::X1)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::AlreadyClaimed)
        ));
        assert_eq!(
            ledger.get_account(ALICE).await.unwrap().balance_cents,
            balance_after_first
        );
    }

    #[tokio::test]
    async fn test_close_before_resolve_rejected() {
        let ledger = ledger_with_active_day(9_650_000).await;
        ledger
            .open_position(ALICE, Direction::Short, LeverageTier::X10, 5_000)
            .await
            .unwrap();

        let err = ledger
            .close_position(ALICE, 1, LeverageTier::X10)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::MarketUnresolved)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_position_rejected_other_tier_allowed() {
        let ledger = ledger_with_active_day(9_650_000).await;
        ledger
            .open_position(ALICE, Direction::Long, LeverageTier::X2, 5_000)
            .await
            .unwrap();

        let err = ledger
            .open_position(ALICE, Direction::Short, LeverageTier::X2, 5_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::DuplicatePosition)
        ));

        // คนละ Tier เปิดได้
        ledger
            .open_position(ALICE, Direction::Short, LeverageTier::X10, 5_000)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_guards() {
        let ledger = ledger_with_active_day(9_650_000).await;

        let err = ledger
            .open_position(ALICE, Direction::Long, LeverageTier::X1, 999)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::BelowMinStake)
        ));

        let err = ledger
            .open_position(ALICE, Direction::Long, LeverageTier::X1, 200_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::InsufficientBalance)
        ));

        let err = ledger
            .open_position("0xb0b", Direction::Long, LeverageTier::X1, 5_000)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::NoAccount)
        ));
    }

    #[tokio::test]
    async fn test_liquidated_position_pays_nothing() {
        let ledger = ledger_with_active_day(10_000_000).await;
        ledger
            .open_position(ALICE, Direction::Short, LeverageTier::X10, 50_000)
            .await
            .unwrap();
        ledger.resolve_day(11_100_000).await.unwrap();

        let outcome = ledger
            .close_position(ALICE, 1, LeverageTier::X10)
            .await
            .unwrap();
        assert!(outcome.is_liquidated);
        assert_eq!(outcome.final_cents, 0);

        let acc = ledger.get_account(ALICE).await.unwrap();
        assert_eq!(acc.balance_cents, 50_000);
        assert_eq!(acc.total_pnl_cents, -50_000);

        let pos = ledger
            .get_position(1, ALICE, LeverageTier::X10)
            .await
            .unwrap()
            .unwrap();
        assert!(pos.claimed);
        assert!(pos.liquidated);
    }

    #[tokio::test]
    async fn test_daily_bonus_streak() {
        let ledger = ledger_with_active_day(9_650_000).await;

        // วันแรก: base + 1 streak
        let bonus = ledger.claim_daily_bonus(ALICE).await.unwrap();
        assert_eq!(bonus, 600);

        let err = ledger.claim_daily_bonus(ALICE).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::BonusAlreadyClaimed)
        ));

        // วันถัดไป: streak ต่อเนื่อง
        ledger.resolve_day(9_700_000).await.unwrap();
        ledger.start_new_day(9_700_000).await.unwrap();
        let bonus = ledger.claim_daily_bonus(ALICE).await.unwrap();
        assert_eq!(bonus, 700);

        let acc = ledger.get_account(ALICE).await.unwrap();
        assert_eq!(acc.streak, 2);
        assert_eq!(acc.best_streak, 2);

        // ข้ามวัน → streak รีเซ็ต
        ledger.resolve_day(9_800_000).await.unwrap();
        ledger.start_new_day(9_800_000).await.unwrap();
        ledger.resolve_day(9_900_000).await.unwrap();
        ledger.start_new_day(9_900_000).await.unwrap();
        let bonus = ledger.claim_daily_bonus(ALICE).await.unwrap();
        assert_eq!(bonus, 600);

        let acc = ledger.get_account(ALICE).await.unwrap();
        assert_eq!(acc.streak, 1);
        assert_eq!(acc.best_streak, 2);
    }
}
