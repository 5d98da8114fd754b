//! # settlement
//!
//! **Settlement Calculator** — pure leveraged P&L + liquidation math.
//!
//! This is the single place the payout rules live. ทุก Consumer
//! (preview API, in-memory ledger, tests) เรียกฟังก์ชันเดียวกันนี้ —
//! ห้าม reimplement per call site.
//!
//! ## Payout rules
//!
//! ```text
//! change% = (end − start) / start × 100
//!     │
//!     ├─ 10x + adverse move ≥ 10 pct points → LIQUIDATED
//!     │      pnl = −stake, final = 0
//!     │
//!     └─ otherwise:
//!            pnl%  = ±change% × multiplier   (sign by direction)
//!            pnl   = stake × pnl% / 100
//!            final = max(0, stake + pnl)     (loss clamp)
//! ```
//!
//! Only the 10x tier liquidates. At 2x a move of −50% or worse already
//! exceeds the stake and is handled **only** by the final-amount clamp —
//! a tier asymmetry the product rules keep as-is.
//!
//! The external ledger remains the settlement authority; for remote ledgers
//! this function is the predictive mirror of it, for the in-memory ledger it
//! IS the settlement path.

use serde::{Deserialize, Serialize};

use crate::models::{Direction, LeverageTier};

/// Adverse move (in percentage points of the raw price change) that
/// liquidates a 10x position. Boundary inclusive.
pub const LIQUIDATION_THRESHOLD_PCT: f64 = 10.0;

// ─── Settlement ───────────────────────────────────────────────────────────────

/// Outcome of settling one position against its day's price bracket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    /// Raw price change of the day in percent (signed, leverage not applied).
    pub price_change_pct: f64,

    /// Signed P&L in cents. **Unclamped** — a 2x position down 120% reports
    /// the full −120% here even though `final_cents` bottoms out at zero.
    pub pnl_cents: i64,

    /// What the position pays back into the balance. Never negative.
    pub final_cents: u64,

    pub is_profit: bool,
    pub is_liquidated: bool,
}

// ─── settle ───────────────────────────────────────────────────────────────────

/// Settle one position against the start/end prices of its (resolved) day.
///
/// Prices are integer cents promoted to real arithmetic; `pnl_cents` is
/// rounded to the nearest cent (ties away from zero).
pub fn settle(
    direction: Direction,
    tier: LeverageTier,
    amount_cents: u64,
    start_price_cents: u64,
    end_price_cents: u64,
) -> Settlement {
    let start = start_price_cents as f64;
    let end = end_price_cents as f64;

    let price_change_pct = (end - start) / start * 100.0;

    // ── Liquidation check — 10x เท่านั้น ─────────────────────────────────────
    let is_liquidated = tier == LeverageTier::X10
        && match direction {
            Direction::Long => price_change_pct <= -LIQUIDATION_THRESHOLD_PCT,
            Direction::Short => price_change_pct >= LIQUIDATION_THRESHOLD_PCT,
        };

    if is_liquidated {
        return Settlement {
            price_change_pct,
            pnl_cents: -(amount_cents as i64),
            final_cents: 0,
            is_profit: false,
            is_liquidated: true,
        };
    }

    // ── Leveraged P&L ─────────────────────────────────────────────────────────
    let signed_move_pct = match direction {
        Direction::Long => price_change_pct,
        Direction::Short => -price_change_pct,
    };
    let pnl_pct = signed_move_pct * tier.multiplier() as f64;

    let pnl_cents = (amount_cents as f64 * pnl_pct / 100.0).round() as i64;
    // Loss clamp — a position can never drive the balance negative.
    let final_cents = (amount_cents as i64 + pnl_cents).max(0) as u64;

    Settlement {
        price_change_pct,
        pnl_cents,
        final_cents,
        is_profit: pnl_cents > 0,
        is_liquidated: false,
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
