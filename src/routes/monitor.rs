//! # routes::monitor
//!
//! **Monitor Loop** — health + WebSocket event stream สำหรับ Dashboard
//!
//! | Method    | Path          | Description                        |
//! |-----------|---------------|------------------------------------|
//! | GET (WS)  | `/ws/monitor` | Real-time lifecycle event stream   |
//! | GET       | `/api/health` | Cycle counters + market phase      |

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::events::WsEvent;
use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Upgrade HTTP → WebSocket แล้ว subscribe broadcast channel
///
/// ทุก WsEvent จะถูกส่งมาเป็น JSON text frame
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    // ── ส่ง Snapshot ปัจจุบันทันทีที่ต่อ ─────────────────────────────────────
    let snapshot = {
        let market = state.ledger.get_today_market().await.ok();
        let cycles_run = state.cycles_run.load(Ordering::Relaxed);
        let cycles_failed = state.cycles_failed.load(Ordering::Relaxed);

        json!({
            "event":         "SNAPSHOT",
            "market":        market,
            "cycles_run":    cycles_run,
            "cycles_failed": cycles_failed,
        })
        .to_string()
    };

    if sender.send(Message::Text(snapshot.into())).await.is_err() {
        return; // Client ปิดก่อน snapshot ส่งได้
    }

    // ── Event Loop ────────────────────────────────────────────────────────────
    loop {
        tokio::select! {
            // รับ Event จาก broadcast channel → ส่งต่อไป WebSocket client
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str.into())).await.is_err() {
                            break; // Client disconnect
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        // Client read ช้าเกินไป — บาง Event ถูก skip
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(_) => break, // Channel closed
                }
            }

            // รับ Message จาก Client (Ping / Close)
            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {} // Text/Binary from client — ignored for now
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── Health ───────────────────────────────────────────────────────────────────

/// GET /api/health — Cycle counters + market phase ปัจจุบัน
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let cycles_run = state.cycles_run.load(Ordering::Relaxed);
    let cycles_failed = state.cycles_failed.load(Ordering::Relaxed);
    let market_active = state
        .ledger
        .get_today_market()
        .await
        .map(|m| m.is_active)
        .unwrap_or(false);

    // Broadcast stats event ไปด้วยทุกครั้งที่มีคน poll
    state.broadcast(&WsEvent::ServerStats {
        cycles_run,
        cycles_failed,
        market_active,
    });

    Json(json!({
        "ok":            true,
        "cycles_run":    cycles_run,
        "cycles_failed": cycles_failed,
        "market_active": market_active,
    }))
}
