//! # models::market
//!
//! Defines [`DailyMarket`] — the day-indexed market record the whole system
//! revolves around — plus the two wire enums ([`Direction`], [`LeverageTier`])
//! shared by the ledger interface, the settlement calculator and the API.
//!
//! All prices are **integer cents** (hundredths of a USD). This is the
//! canonical fixed-point convention of the on-chain ledger; every price that
//! enters the system is converted to cents exactly once, at the oracle edge.

use serde::{Deserialize, Serialize};

// ─── Direction ────────────────────────────────────────────────────────────────

/// The user's directional bet for a trading day.
///
/// Wire encoding (contract ABI order): `LONG = 0`, `SHORT = 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Bet that BTC closes **higher** than the day's opening price.
    Long,
    /// Bet that BTC closes **lower** than the day's opening price.
    Short,
}

impl Direction {
    /// Contract ABI encoding.
    #[inline]
    pub fn wire(self) -> u8 {
        match self {
            Direction::Long => 0,
            Direction::Short => 1,
        }
    }

    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Direction::Long),
            1 => Some(Direction::Short),
            _ => None,
        }
    }
}

// ─── LeverageTier ─────────────────────────────────────────────────────────────

/// Fixed leverage multiplier applied to the day's price-change percentage.
///
/// Wire encoding (contract ABI order): `X1 = 0`, `X2 = 1`, `X10 = 2`.
/// Liquidation exists **only** at the 10x tier; see the settlement module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeverageTier {
    X1,
    X2,
    X10,
}

impl LeverageTier {
    /// P&L multiplier for this tier.
    #[inline]
    pub fn multiplier(self) -> u32 {
        match self {
            LeverageTier::X1 => 1,
            LeverageTier::X2 => 2,
            LeverageTier::X10 => 10,
        }
    }

    /// Contract ABI encoding.
    #[inline]
    pub fn wire(self) -> u8 {
        match self {
            LeverageTier::X1 => 0,
            LeverageTier::X2 => 1,
            LeverageTier::X10 => 2,
        }
    }

    pub fn from_wire(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(LeverageTier::X1),
            1 => Some(LeverageTier::X2),
            2 => Some(LeverageTier::X10),
            _ => None,
        }
    }
}

// ─── DailyMarket ──────────────────────────────────────────────────────────────

/// One trading day as recorded by the ledger.
///
/// Created by `start_new_day` with an opening price; mutated exactly once by
/// `resolve_day`, which sets the closing price and flips `resolved`.
/// Immutable thereafter. The ledger guarantees at most one market has
/// `is_active = true` at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMarket {
    pub day_index: u64,

    /// Opening BTC price in cents, committed when the day started.
    pub start_price_cents: u64,

    /// Closing BTC price in cents — `None` until the day is resolved.
    pub end_price_cents: Option<u64>,

    /// `true` while positions may still be opened against this day.
    pub is_active: bool,

    /// One-way latch: set when the closing price is committed.
    pub resolved: bool,
}

// ─── TodayMarket ──────────────────────────────────────────────────────────────

/// The compact current-market view returned by the ledger's
/// `get_today_market` — just enough for the scheduler to pick its phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TodayMarket {
    pub day_index: u64,
    pub start_price_cents: u64,
    pub is_active: bool,
}

// ─── Tests ────────────────────────────────────────────────────────────────────
