//! # Daybreak — Daily BTC Market Lifecycle Automation
//!
//! ```text
//!  ┌────────────┐   daily @ RESOLVE_UTC      ┌──────────────────────────────┐
//!  │  Scheduler │ ─────────────────────────▶ │ Cycle                        │
//!  └────────────┘   (or POST /api/market/    │ ├─ get_today_market          │
//!                     cycle, RUN_ON_START)   │ ├─ resolve_day(close price)  │
//!  ┌────────────┐                            │ ├─ settling delay ⏸          │
//!  │  CoinGecko │ ◀── fetch_price_cents ──── │ └─ start_new_day(open price) │
//!  └────────────┘        ×2 per cycle        └──────────────┬───────────────┘
//!                                                           │
//!  ┌────────────┐  POST /api/positions/*     ┌──────────────▼───────────────┐
//!  │  Users     │ ─────────────────────────▶ │ Ledger (chain gateway / mock)│
//!  └────────────┘  GET  /api/account/:owner  └──────────────────────────────┘
//!  ┌────────────┐
//!  │  Dashboard │  ws://host/ws/monitor · GET /api/health
//!  └────────────┘
//! ```

use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod config;
mod error;
mod events;
mod ledger;
mod models;
mod oracle;
mod routes;
mod scheduler;
mod settlement;
mod state;

use auth::require_api_key;
use config::Config;
use routes::{
    account::{claim_bonus, get_account, initialize_account},
    market::{get_day, get_today, trigger_cycle},
    monitor::{health_check, ws_monitor},
    positions::{close_position, get_position, open_position},
};
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("daybreak=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║           DAYBREAK — BTC Market Automation            ║
  ║  Scheduler · Oracle · Settlement · Virtual Accounts   ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config + shared state ──────────────────────────────────────────────
    let config = Config::from_env()?;
    info!(
        ledger      = %config.ledger_url,
        resolve_utc = %config.resolve_utc,
        run_on_start = config.run_on_start,
        "Config loaded"
    );
    let state = build_state(config);

    // ── 4. Scheduler task (daily trigger + RUN_ON_START) ──────────────────────
    tokio::spawn(scheduler::run_scheduler(state.clone()));

    // ── 5. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        // ── Market Lifecycle ──────────────────────────────────────────────────
        .route("/api/market/today",     get(get_today))
        .route("/api/market/:day",      get(get_day))
        .route("/api/market/cycle",     post(trigger_cycle))
        // ── Positions ─────────────────────────────────────────────────────────
        .route("/api/positions/open",   post(open_position))
        .route("/api/positions/close",  post(close_position))
        .route("/api/positions/:day/:owner/:tier", get(get_position))
        // ── Accounts ──────────────────────────────────────────────────────────
        .route("/api/account/init",     post(initialize_account))
        .route("/api/account/bonus",    post(claim_bonus))
        .route("/api/account/:owner",   get(get_account))
        // ── Monitor Loop ──────────────────────────────────────────────────────
        .route("/ws/monitor",           get(ws_monitor))
        .route("/api/health",           get(health_check))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn(require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;

    info!(?addr, "🚀 Daybreak server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Ctrl-C = ปิดระบบ — Cycle ที่กำลังรันอยู่ปล่อยให้จบเองตามธรรมชาติ
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("👋 Shutting down automation service...");
}
