//! # state
//!
//! AppState ที่ share ระหว่าง Axum handlers กับ Scheduler task —
//! Ledger / Oracle trait objects, Cycle guard และ WebSocket Broadcast Channel

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tokio::sync::{broadcast, Mutex};
use tracing::info;

use crate::config::Config;
use crate::ledger::{http::HttpLedger, memory::MemoryLedger, Ledger};
use crate::oracle::{CoinGecko, PriceSource};

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Top-level shared state injected into every Axum handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,

    // ── External collaborators ───────────────────────────────────────────────
    /// Ledger จริง (chain gateway) หรือ in-memory (dev/test)
    pub ledger: Arc<dyn Ledger>,
    /// Quote service — Scheduler เรียกสองครั้งต่อ Cycle (close + open price)
    pub oracle: Arc<dyn PriceSource>,

    // ── Cycle discipline ─────────────────────────────────────────────────────
    /// Single-flight guard: Timer loop กับ Manual trigger แชร์ตัวเดียวกัน
    /// `try_lock` fail = มี Cycle in flight → reject, ห้าม queue
    pub cycle_guard: Arc<Mutex<()>>,

    // ── Monitor / WebSocket ──────────────────────────────────────────────────
    /// Broadcast channel สำหรับส่ง Event ไปยัง WebSocket clients
    pub broadcast_tx: broadcast::Sender<String>,

    // ── Metrics ──────────────────────────────────────────────────────────────
    pub cycles_run: Arc<AtomicU64>,
    pub cycles_failed: Arc<AtomicU64>,
}

impl AppState {
    pub fn new(config: Config, ledger: Arc<dyn Ledger>, oracle: Arc<dyn PriceSource>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(256);

        Self {
            config: Arc::new(config),
            ledger,
            oracle,
            cycle_guard: Arc::new(Mutex::new(())),
            broadcast_tx,
            cycles_run: Arc::new(AtomicU64::new(0)),
            cycles_failed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Broadcast WsEvent ไปยัง WebSocket clients ทั้งหมด
    /// ไม่ panic ถ้าไม่มี listener (ปลอดภัยสำหรับ headless mode)
    pub fn broadcast(&self, event: &crate::events::WsEvent) {
        // Err เกิดขึ้นเมื่อไม่มี receiver — ไม่ใช่ error จริงๆ
        let _ = self.broadcast_tx.send(event.to_json());
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

/// สร้าง State จาก Config: เลือก Ledger implementation ตาม `LEDGER_URL`
pub fn build_state(config: Config) -> SharedState {
    let http_client = reqwest::Client::new();

    let ledger: Arc<dyn Ledger> = if config.ledger_url == "mock" {
        info!("🎭 LEDGER_URL=mock — using in-memory ledger (dev mode)");
        Arc::new(MemoryLedger::new())
    } else {
        Arc::new(HttpLedger::new(
            http_client.clone(),
            &config.ledger_url,
            config.finality_timeout,
        ))
    };

    let oracle: Arc<dyn PriceSource> = Arc::new(CoinGecko::new(http_client, &config));

    Arc::new(AppState::new(config, ledger, oracle))
}
