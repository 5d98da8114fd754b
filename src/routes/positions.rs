//! # routes::positions
//!
//! Position endpoints — passthrough ไปยัง Ledger พร้อม Settlement preview
//!
//! | Method | Path                              | Description                       |
//! |--------|-----------------------------------|-----------------------------------|
//! | POST   | `/api/positions/open`             | เปิด Position กับวันปัจจุบัน        |
//! | POST   | `/api/positions/close`            | Settle Position ของวันที่จบแล้ว     |
//! | GET    | `/api/positions/:day/:owner/:tier`| Position + preview (ถ้า resolved)  |
//!
//! Rejection ทุกแบบออกเป็น Category ชัดเจน (Insufficient balance /
//! Duplicate position / Trading not active / …) — ห้ามตอบ generic failure

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::events::WsEvent;
use crate::models::{Direction, LeverageTier};
use crate::settlement::{settle, Settlement};
use crate::state::SharedState;

// ─── Request bodies ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OpenPositionBody {
    pub owner: String,
    pub direction: Direction,
    pub tier: LeverageTier,
    pub amount_cents: u64,
}

#[derive(Debug, Deserialize)]
pub struct ClosePositionBody {
    pub owner: String,
    pub day_index: u64,
    pub tier: LeverageTier,
}

// ─── POST /api/positions/open ─────────────────────────────────────────────────

pub async fn open_position(
    State(state): State<SharedState>,
    Json(body): Json<OpenPositionBody>,
) -> Result<impl IntoResponse, AppError> {
    let position = state
        .ledger
        .open_position(&body.owner, body.direction, body.tier, body.amount_cents)
        .await?;

    info!(
        owner     = %position.owner,
        day_index = position.day_index,
        tier      = ?position.tier,
        direction = ?position.direction,
        amount    = position.amount_cents,
        "📈 Position opened"
    );

    state.broadcast(&WsEvent::PositionOpened {
        owner: position.owner.clone(),
        day_index: position.day_index,
        tier: format!("{:?}", position.tier),
        direction: format!("{:?}", position.direction),
        amount_cents: position.amount_cents,
    });

    Ok(Json(json!({
        "ok":       true,
        "position": position,
    })))
}

// ─── POST /api/positions/close ────────────────────────────────────────────────

/// Settle แล้วรับเงินกลับเข้า Balance — ทำได้ครั้งเดียวต่อ Position
pub async fn close_position(
    State(state): State<SharedState>,
    Json(body): Json<ClosePositionBody>,
) -> Result<impl IntoResponse, AppError> {
    let outcome = state
        .ledger
        .close_position(&body.owner, body.day_index, body.tier)
        .await?;

    info!(
        owner       = %body.owner,
        day_index   = body.day_index,
        tier        = ?body.tier,
        pnl_cents   = outcome.pnl_cents,
        final_cents = outcome.final_cents,
        liquidated  = outcome.is_liquidated,
        "Position closed"
    );

    state.broadcast(&WsEvent::PositionClosed {
        owner: body.owner.clone(),
        day_index: body.day_index,
        tier: format!("{:?}", body.tier),
        settlement: outcome,
    });

    Ok(Json(json!({
        "ok":         true,
        "settlement": outcome,
    })))
}

// ─── GET /api/positions/:day/:owner/:tier ─────────────────────────────────────

/// Position record + **Settlement preview**
///
/// Preview ใช้ [`settle`] ตัวเดียวกับ Ledger path — ตัวเลขที่ผู้ใช้เห็น
/// ก่อนกด Close ต้องตรงกับที่ Settle จริงเป๊ะ
pub async fn get_position(
    State(state): State<SharedState>,
    Path((day_index, owner, tier_wire)): Path<(u64, String, u8)>,
) -> Result<impl IntoResponse, AppError> {
    let tier = LeverageTier::from_wire(tier_wire)
        .ok_or_else(|| AppError::BadRequest(format!("unknown leverage tier {tier_wire}")))?;

    let position = state
        .ledger
        .get_position(day_index, &owner, tier)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("position day={day_index} owner={owner} tier={tier_wire}"))
        })?;

    // Preview ได้เฉพาะวันที่ resolved แล้ว
    let market = state.ledger.get_market(day_index).await?;
    let preview: Option<Settlement> = match (market.resolved, market.end_price_cents) {
        (true, Some(end_price)) => Some(settle(
            position.direction,
            position.tier,
            position.amount_cents,
            market.start_price_cents,
            end_price,
        )),
        _ => None,
    };

    Ok(Json(json!({
        "ok":       true,
        "position": position,
        "market":   market,
        "preview":  preview,
    })))
}
