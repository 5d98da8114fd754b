//! # routes::market
//!
//! Market lifecycle endpoints
//!
//! | Method | Path                 | Description                                |
//! |--------|----------------------|--------------------------------------------|
//! | GET    | `/api/market/today`  | Current-day market + phase                 |
//! | GET    | `/api/market/:day`   | Full record ของวันใดวันหนึ่ง                |
//! | POST   | `/api/market/cycle`  | Manual cycle trigger (ops recovery)        |

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;

use crate::error::AppError;
use crate::scheduler::{self, MarketPhase};
use crate::state::SharedState;

/// GET /api/market/today — สถานะ current-day slot
pub async fn get_today(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let today = state.ledger.get_today_market().await?;

    Ok(Json(json!({
        "ok":     true,
        "market": today,
        "phase":  MarketPhase::of(&today),
    })))
}

/// GET /api/market/:day — ดู Market record เต็ม (รวมราคาปิดถ้า resolved)
pub async fn get_day(
    State(state): State<SharedState>,
    Path(day_index): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let market = state.ledger.get_market(day_index).await?;

    Ok(Json(json!({
        "ok":     true,
        "market": market,
    })))
}

/// POST /api/market/cycle — **Manual trigger**
///
/// ใช้ logic เดียวกับ Scheduled trigger ทุกประการ (รวม Single-flight guard)
/// สำหรับ operational recovery ตอน Cycle อัตโนมัติล้มกลางทาง
pub async fn trigger_cycle(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let report = scheduler::try_run_cycle(&state).await?;

    Ok(Json(json!({
        "ok":    true,
        "cycle": report,
    })))
}
