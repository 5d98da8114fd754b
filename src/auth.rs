//! # auth — API Key Middleware
//!
//! ป้องกัน **Mutating endpoints** ด้วย `X-API-Key` header —
//! อ่านข้อมูล (GET / WebSocket) เปิด public เพราะเป็นข้อมูลตลาดอยู่แล้ว
//!
//! ## Mode
//! - `API_KEY` ไม่ได้ตั้ง (หรือ empty) → **Allow All** (Dev Mode)
//! - `API_KEY` ตั้งค่า → ทุก POST ต้องส่ง `X-API-Key: <key>`
//!
//! ## Usage
//! ```bash
//! API_KEY=super-secret-key-here cargo run
//! curl -X POST -H "X-API-Key: super-secret-key-here" \
//!      http://localhost:3000/api/market/cycle
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

/// Axum middleware — ตรวจสอบ X-API-Key header ของ mutating requests
pub async fn require_api_key(request: Request<Body>, next: Next) -> Response {
    let api_key_env = std::env::var("API_KEY").unwrap_or_default();

    // ── Dev Mode: ไม่มี API_KEY → ยอมให้ผ่านหมด ─────────────────────────────
    if api_key_env.is_empty() {
        return next.run(request).await;
    }

    // ── Read-only traffic ผ่านได้เสมอ ────────────────────────────────────────
    if request.method() != Method::POST {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == api_key_env {
        next.run(request).await
    } else {
        warn!(path = request.uri().path(), "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
                "hint":  "Set X-API-Key header with your API key"
            })),
        )
            .into_response()
    }
}
