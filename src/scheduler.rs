//! # scheduler — Daily Market Lifecycle
//!
//! **Market Scheduler** — รันวันละครั้งตามเวลา UTC ที่ตั้งไว้ แล้วหมุน
//! State Machine ของ "วันปัจจุบัน":
//!
//! ```text
//! trigger (daily / RUN_ON_START / manual API)
//!     │
//!     ├─ get_today_market()
//!     │
//!     ├─ MarketActive?
//!     │    ├─ fetch price        → resolve_day(price)   [await finality]
//!     │    ├─ settling delay     (ให้ reads เห็น resolved state ก่อน)
//!     │    └─ fetch FRESH price  → start_new_day(price) [await finality]
//!     │
//!     └─ NoActiveMarket?
//!          └─ fetch price        → start_new_day(price)
//! ```
//!
//! ## Failure semantics
//! Step ไหนล้ม → **ทั้ง Cycle abort** ไม่มี retry ภายในรอบเดียวกัน
//! ตลาดอาจค้างกลางทาง (resolved แล้วแต่ยังไม่มีวันใหม่) จนกว่า Trigger
//! รอบหน้า — ยอมรับโดย design เพราะ Phase ถูกอ่านใหม่จาก Ledger ทุกรอบ
//! รอบถัดไปจึงทำเฉพาะ Phase ที่ค้างอยู่ให้จบ (resumable)
//!
//! ## Concurrency
//! Cycle ซ้อนกันต้องไม่เกิด — `try_run_cycle` จับ [`AppState::cycle_guard`]
//! ด้วย `try_lock`; Trigger ที่มาระหว่าง Cycle in flight โดน reject เป็น
//! [`AppError::CycleInFlight`] ไม่ใช่เข้าคิว

use std::sync::atomic::Ordering;

use chrono::{DateTime, NaiveTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::events::WsEvent;
use crate::models::TodayMarket;
use crate::state::{AppState, SharedState};

// ─── Phase ────────────────────────────────────────────────────────────────────

/// Phase ของ current-day slot — อ่านใหม่จาก Ledger ทุก Cycle
/// (`ResolvingMarket` เป็นสถานะชั่วคราวภายใน Cycle เท่านั้น)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketPhase {
    NoActiveMarket,
    MarketActive,
}

impl MarketPhase {
    pub fn of(today: &TodayMarket) -> Self {
        if today.is_active {
            MarketPhase::MarketActive
        } else {
            MarketPhase::NoActiveMarket
        }
    }
}

// ─── CycleReport ──────────────────────────────────────────────────────────────

/// ผลของ Cycle ที่จบสมบูรณ์ — ใช้ทั้ง Log และ Response ของ Manual trigger
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Phase ที่เจอตอนเริ่ม Cycle
    pub entry_phase: MarketPhase,
    /// วันที่ถูก resolve ในรอบนี้ (None ถ้าเริ่มจาก NoActiveMarket)
    pub resolved_day: Option<u64>,
    pub end_price_cents: Option<u64>,
    /// วันใหม่ที่เปิดในรอบนี้
    pub started_day: u64,
    pub start_price_cents: u64,
}

// ─── Cycle ────────────────────────────────────────────────────────────────────

/// รัน 1 Cycle ภายใต้ Single-flight guard
///
/// คืน [`AppError::CycleInFlight`] ทันทีถ้ามี Cycle อื่นกำลังรัน
pub async fn try_run_cycle(state: &AppState) -> Result<CycleReport, AppError> {
    let Ok(_guard) = state.cycle_guard.try_lock() else {
        warn!("Cycle trigger rejected — another cycle is in flight");
        return Err(AppError::CycleInFlight);
    };

    let cycle_id = Uuid::new_v4();
    let report = run_cycle_inner(state, cycle_id).await;

    match &report {
        Ok(r) => {
            state.cycles_run.fetch_add(1, Ordering::Relaxed);
            info!(
                cycle_id = %cycle_id,
                resolved_day = ?r.resolved_day,
                started_day = r.started_day,
                "🎉 Daily cycle complete"
            );
        }
        Err(e) => {
            state.cycles_failed.fetch_add(1, Ordering::Relaxed);
            // Abort ทั้งรอบ — ไม่ retry จนกว่า trigger หน้า (scheduled หรือ manual)
            error!(cycle_id = %cycle_id, error = %e, "❌ Cycle aborted");
            state.broadcast(&WsEvent::CycleFailed {
                cycle_id,
                reason: e.to_string(),
            });
        }
    }

    report
}

/// ลำดับ resolve → (delay) → start ตาม Phase ที่อ่านได้
///
/// Ledger calls ทุกอันถูก await จน Finality ก่อนขยับ Step ถัดไป —
/// ห้ามยิงสอง Mutating calls พร้อมกันในรอบเดียว
async fn run_cycle_inner(state: &AppState, cycle_id: Uuid) -> Result<CycleReport, AppError> {
    info!(cycle_id = %cycle_id, "🔄 Starting daily market cycle");

    // ── 1. Phase จาก Ledger (ไม่ cache ข้ามรอบ) ──────────────────────────────
    let today = state.ledger.get_today_market().await?;
    let entry_phase = MarketPhase::of(&today);
    info!(
        cycle_id   = %cycle_id,
        day_index  = today.day_index,
        phase      = ?entry_phase,
        "Current market state read"
    );

    // ── 2. Resolve วันที่ยัง active อยู่ ─────────────────────────────────────
    let (resolved_day, end_price_cents) = if entry_phase == MarketPhase::MarketActive {
        let end_price = state.oracle.fetch_price_cents().await?;

        info!(cycle_id = %cycle_id, day_index = today.day_index, end_price, "📉 Resolving current day...");
        state.ledger.resolve_day(end_price).await?;
        state.broadcast(&WsEvent::DayResolved {
            day_index: today.day_index,
            end_price_cents: end_price,
        });

        // ── Settling delay — ให้ dependent reads เห็น resolved state ก่อน ──
        if !state.config.settle_delay.is_zero() {
            info!(delay = ?state.config.settle_delay, "⏸ Settling delay before new day");
            tokio::time::sleep(state.config.settle_delay).await;
        }

        (Some(today.day_index), Some(end_price))
    } else {
        (None, None)
    };

    // ── 3. เปิดวันใหม่ด้วย Quote ใหม่เสมอ (ห้าม reuse ราคาขั้นตอนที่แล้ว) ──
    let start_price = state.oracle.fetch_price_cents().await?;

    info!(cycle_id = %cycle_id, start_price, "🌅 Starting new day...");
    state.ledger.start_new_day(start_price).await?;

    let new_today = state.ledger.get_today_market().await?;
    state.broadcast(&WsEvent::DayStarted {
        day_index: new_today.day_index,
        start_price_cents: start_price,
    });

    Ok(CycleReport {
        cycle_id,
        entry_phase,
        resolved_day,
        end_price_cents,
        started_day: new_today.day_index,
        start_price_cents: start_price,
    })
}

// ─── Daily trigger loop ───────────────────────────────────────────────────────

/// เวลาเหลือถึง Trigger ประจำวันรอบหน้า (instant UTC คงที่)
pub fn duration_until_next_trigger(now: DateTime<Utc>, at: NaiveTime) -> std::time::Duration {
    let today_trigger = now.date_naive().and_time(at).and_utc();
    let next = if today_trigger > now {
        today_trigger
    } else {
        today_trigger + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}

/// Scheduler task หลัก — spawn ครั้งเดียวจาก `main`
///
/// Shutdown (ctrl-c) ถูกเช็คเฉพาะ **ระหว่าง** Cycle: รอบที่กำลังรันอยู่
/// ปล่อยให้จบหรือล้มเองตามธรรมชาติ ห้าม abort กลาง Transition
pub async fn run_scheduler(state: SharedState) {
    info!(
        resolve_utc = %state.config.resolve_utc,
        "📅 Scheduler started — daily trigger armed"
    );

    // ── Optional: รันทันทีตอน Start สำหรับ operational testing ───────────────
    if state.config.run_on_start {
        info!("▶️ RUN_ON_START — running immediate cycle");
        run_scheduled_cycle(&state).await;
    }

    loop {
        let wait = duration_until_next_trigger(Utc::now(), state.config.resolve_utc);
        info!(next_trigger_in = ?wait, "💤 Sleeping until next daily trigger");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("👋 Scheduler shutting down between cycles");
                return;
            }
        }

        info!("⏰ Scheduled trigger fired");
        run_scheduled_cycle(&state).await;
    }
}

/// Automated trigger — ความล้มเหลวกลายเป็น [`AppError::CycleAborted`]
/// แล้วรอ Trigger รอบหน้า (scheduled หรือ manual) ไม่มี retry ที่นี่
async fn run_scheduled_cycle(state: &AppState) {
    if let Err(e) = try_run_cycle(state).await {
        let aborted = AppError::CycleAborted(e.to_string());
        warn!(error = %aborted, "Recovery deferred to the next scheduled or manual trigger");
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::NaiveDate;
    use tokio::sync::Mutex as AsyncMutex;

    use super::*;
    use crate::config::Config;
    use crate::error::RejectReason;
    use crate::ledger::memory::MemoryLedger;
    use crate::ledger::Ledger;
    use crate::oracle::PriceSource;

    /// Oracle stub — ป้อนผลลัพธ์ทีละอันตามลำดับ
    struct ScriptedOracle {
        quotes: AsyncMutex<VecDeque<Result<u64, ()>>>,
    }

    impl ScriptedOracle {
        fn new(quotes: Vec<Result<u64, ()>>) -> Self {
            Self { quotes: AsyncMutex::new(quotes.into_iter().collect()) }
        }
    }

    #[async_trait::async_trait]
    impl PriceSource for ScriptedOracle {
        async fn fetch_price_cents(&self) -> Result<u64, AppError> {
            let mut quotes = self.quotes.lock().await;
            match quotes.pop_front() {
                Some(Ok(price)) => Ok(price),
                _ => Err(AppError::OracleUnavailable("scripted failure".to_string())),
            }
        }
    }

    fn test_config() -> Config {
        Config {
            ledger_url: "mock".to_string(),
            oracle_url: "http://unused".to_string(),
            asset_id: "bitcoin".to_string(),
            vs_currency: "usd".to_string(),
            resolve_utc: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            settle_delay: Duration::ZERO,
            finality_timeout: Duration::from_secs(1),
            run_on_start: false,
        }
    }

    fn make_state(ledger: Arc<MemoryLedger>, quotes: Vec<Result<u64, ()>>) -> AppState {
        AppState::new(test_config(), ledger, Arc::new(ScriptedOracle::new(quotes)))
    }

    #[tokio::test]
    async fn test_no_active_market_cycle_only_starts_day() {
        let ledger = Arc::new(MemoryLedger::new());
        let state = make_state(ledger.clone(), vec![Ok(9_650_000)]);

        let report = try_run_cycle(&state).await.unwrap();
        assert_eq!(report.entry_phase, MarketPhase::NoActiveMarket);
        assert_eq!(report.resolved_day, None);
        assert_eq!(report.started_day, 1);
        assert_eq!(report.start_price_cents, 9_650_000);

        let day1 = ledger.get_market(1).await.unwrap();
        assert!(day1.is_active);
        assert!(!day1.resolved);
    }

    #[tokio::test]
    async fn test_active_market_cycle_resolves_then_starts_with_fresh_quote() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.start_new_day(9_650_000).await.unwrap();

        // Quote แรก = ราคาปิดวันเก่า, Quote ที่สอง = ราคาเปิดวันใหม่
        let state = make_state(ledger.clone(), vec![Ok(9_700_000), Ok(9_712_345)]);

        let report = try_run_cycle(&state).await.unwrap();
        assert_eq!(report.entry_phase, MarketPhase::MarketActive);
        assert_eq!(report.resolved_day, Some(1));
        assert_eq!(report.end_price_cents, Some(9_700_000));
        assert_eq!(report.started_day, 2);
        assert_eq!(report.start_price_cents, 9_712_345);

        // วันเก่า: resolved ด้วย Quote แรก — ห้ามถูก reuse เป็นราคาเปิด
        let day1 = ledger.get_market(1).await.unwrap();
        assert!(day1.resolved);
        assert!(!day1.is_active);
        assert_eq!(day1.end_price_cents, Some(9_700_000));

        let day2 = ledger.get_market(2).await.unwrap();
        assert!(day2.is_active);
        assert_eq!(day2.start_price_cents, 9_712_345);
    }

    #[tokio::test]
    async fn test_oracle_failure_aborts_cycle_before_any_submission() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.start_new_day(9_650_000).await.unwrap();

        let state = make_state(ledger.clone(), vec![Err(())]);

        let err = try_run_cycle(&state).await.unwrap_err();
        assert!(matches!(err, AppError::OracleUnavailable(_)));

        // ไม่มี Mutating call ไหนถูกยิงเลย
        let day1 = ledger.get_market(1).await.unwrap();
        assert!(day1.is_active);
        assert!(!day1.resolved);
    }

    #[tokio::test]
    async fn test_mid_cycle_failure_leaves_resumable_state() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.start_new_day(9_650_000).await.unwrap();

        // Resolve สำเร็จ แต่ Quote ที่สองล้ม → ค้างแบบ "resolved, no new day"
        let state = make_state(ledger.clone(), vec![Ok(9_700_000), Err(())]);
        let err = try_run_cycle(&state).await.unwrap_err();
        assert!(matches!(err, AppError::OracleUnavailable(_)));

        let day1 = ledger.get_market(1).await.unwrap();
        assert!(day1.resolved);
        assert!(ledger.get_market(2).await.is_err());

        // Trigger รอบถัดไปอ่าน Phase ใหม่ → ทำเฉพาะ Phase ที่เหลือ (start เท่านั้น)
        let state = make_state(ledger.clone(), vec![Ok(9_800_000)]);
        let report = try_run_cycle(&state).await.unwrap();
        assert_eq!(report.entry_phase, MarketPhase::NoActiveMarket);
        assert_eq!(report.resolved_day, None);
        assert_eq!(report.started_day, 2);
        assert_eq!(report.start_price_cents, 9_800_000);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_rejected() {
        let ledger = Arc::new(MemoryLedger::new());
        let state = make_state(ledger, vec![Ok(9_650_000)]);

        // จำลอง Cycle in flight ด้วยการถือ guard ไว้เอง
        let guard = state.cycle_guard.clone();
        let held = guard.lock().await;

        let err = try_run_cycle(&state).await.unwrap_err();
        assert!(matches!(err, AppError::CycleInFlight));

        drop(held);
        try_run_cycle(&state).await.unwrap();
    }

    #[tokio::test]
    async fn test_back_to_back_cycles_advance_days() {
        let ledger = Arc::new(MemoryLedger::new());
        let state = make_state(ledger.clone(), vec![Ok(1), Ok(2), Ok(3)]);

        try_run_cycle(&state).await.unwrap();

        // รอบสอง: ตลาด active → resolve ด้วย Ok(2), start ด้วย Ok(3)
        let report = try_run_cycle(&state).await.unwrap();
        assert_eq!(report.resolved_day, Some(1));
        assert_eq!(report.started_day, 2);

        // Memory ledger ยืนยัน invariant: resolve ซ้ำบนวันที่ปิดแล้วโดน reject
        let err = ledger.resolve_day(99).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::LedgerRejected(RejectReason::MarketInactive)
        ));
    }

    #[test]
    fn test_duration_until_next_trigger() {
        let at = NaiveTime::from_hms_opt(0, 0, 0).unwrap();

        // 23:00 → อีก 1 ชม.
        let now = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(duration_until_next_trigger(now, at), Duration::from_secs(3600));

        // เที่ยงคืนพอดี → รอเต็มวัน (trigger ของวันนี้เพิ่งผ่านไป)
        let now = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(
            duration_until_next_trigger(now, at),
            Duration::from_secs(24 * 3600)
        );

        // Trigger 14:30 เวลา 10:00 → รอ 4.5 ชม.
        let at = NaiveTime::from_hms_opt(14, 30, 0).unwrap();
        let now = NaiveDate::from_ymd_opt(2025, 6, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            .and_utc();
        assert_eq!(
            duration_until_next_trigger(now, at),
            Duration::from_secs(4 * 3600 + 1800)
        );
    }
}
