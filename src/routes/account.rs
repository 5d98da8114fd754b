//! # routes::account
//!
//! Virtual-account endpoints
//!
//! | Method | Path                  | Description                          |
//! |--------|-----------------------|--------------------------------------|
//! | GET    | `/api/account/:owner` | Balance + สถิติ (trades, P&L, streak) |
//! | POST   | `/api/account/init`   | เปิดบัญชีรับ $1,000 virtual           |
//! | POST   | `/api/account/bonus`  | เคลม Daily bonus ($5 + $1 × streak)   |

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
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct OwnerBody {
    pub owner: String,
}

/// GET /api/account/:owner — ดู Balance และสถิติทั้งหมด
pub async fn get_account(
    State(state): State<SharedState>,
    Path(owner): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.ledger.get_account(&owner).await?;

    Ok(Json(json!({
        "ok":      true,
        "account": account,
    })))
}

/// POST /api/account/init — เปิดบัญชีใหม่พร้อม starting balance
pub async fn initialize_account(
    State(state): State<SharedState>,
    Json(body): Json<OwnerBody>,
) -> Result<impl IntoResponse, AppError> {
    let account = state.ledger.initialize_account(&body.owner).await?;

    info!(owner = %body.owner, balance = account.balance_cents, "Account initialized");

    Ok(Json(json!({
        "ok":      true,
        "account": account,
    })))
}

/// POST /api/account/bonus — เคลม Daily bonus (ครั้งเดียวต่อ day index)
pub async fn claim_bonus(
    State(state): State<SharedState>,
    Json(body): Json<OwnerBody>,
) -> Result<impl IntoResponse, AppError> {
    let bonus_cents = state.ledger.claim_daily_bonus(&body.owner).await?;

    info!(owner = %body.owner, bonus_cents, "🎁 Daily bonus claimed");

    state.broadcast(&WsEvent::BonusClaimed {
        owner: body.owner.clone(),
        bonus_cents,
    });

    Ok(Json(json!({
        "ok":          true,
        "bonus_cents": bonus_cents,
    })))
}
