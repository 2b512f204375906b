//! Clout Cards poker backend.
//!
//! The trusted service behind an on-chain poker escrow:
//! 1. Runs Texas Hold'em hands against an append-only signed event log
//! 2. Bridges the escrow contract (deposits in, signed withdrawals out)
//! 3. Streams ordered, resumable per-table events to clients over SSE
//!
//! Architecture:
//! - Postgres is the concurrency authority; every state change commits
//!   in one transaction with its EIP-712-signed event
//! - A single dedicated connection listens for event notifications and
//!   fans them out to SSE subscribers
//! - Two background tickers drive action timeouts and delayed hand
//!   starts; a websocket subscription ingests chain deposits and
//!   executed withdrawals

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

mod api;
mod chain;
mod config;
mod db;
mod error;
mod escrow;
mod events;
mod game;
mod payload;
mod sched;
mod signer;
mod stream;
mod tables;
#[cfg(test)]
mod test;
mod views;
mod wallet;

use config::AppConfig;
use signer::EventSigner;
use stream::EventNotice;

#[derive(Clone)]
pub struct AppState {
    pub pool: sqlx::PgPool,
    pub config: Arc<AppConfig>,
    pub signer: Arc<EventSigner>,
    pub notices: broadcast::Sender<EventNotice>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    // Missing MNEMONIC or DATABASE_URL must refuse to start
    let config = AppConfig::from_env()?;
    let signer = EventSigner::from_mnemonic(&config.mnemonic, config.chain_id)?;
    tracing::info!(
        "trusted key {} (chain {})",
        signer.address().to_checksum(None),
        config.chain_id
    );

    let pool = db::connect(&config.database_url).await?;
    let (notices, _) = broadcast::channel(1024);

    let state = AppState {
        pool,
        config: Arc::new(config),
        signer: Arc::new(signer),
        notices,
    };

    stream::spawn_listener(state.clone());
    chain::spawn_listener(state.clone());
    sched::spawn(state.clone());

    let cors = match state.config.cors_origin.as_deref() {
        Some(origin) => CorsLayer::new()
            .allow_origin(origin.parse::<HeaderValue>()?)
            .allow_methods(Any)
            .allow_headers(Any),
        None => CorsLayer::permissive(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/admins", get(api::admins))
        .route("/sessionMessage", get(api::session_message))
        .route("/tee/publicKey", get(api::tee_public_key))
        .route("/pokerTables", get(api::poker_tables))
        .route("/createTable", post(api::create_table))
        .route("/admin/tables/{table_id}/status", post(api::table_status))
        .route("/tablePlayers", get(api::table_players))
        .route("/joinTable", post(api::join_table))
        .route("/standUp", post(api::stand_up))
        .route("/rebuy", post(api::rebuy))
        .route("/currentHand", get(api::current_hand))
        .route("/watchCurrentHand", get(api::watch_current_hand))
        .route("/action", post(api::action))
        .route("/playerEscrowBalance", get(api::player_escrow_balance))
        .route("/signEscrowWithdrawal", post(api::sign_escrow_withdrawal))
        .route("/events", get(api::admin_events))
        .route("/admin/reprocessEvents", post(api::reprocess_events))
        .route("/admin/leaderboard/reset", post(api::leaderboard_reset))
        .route("/api/accounting/solvency", get(api::accounting_solvency))
        .route("/api/verify/events", get(api::verify_events))
        .route("/api/verify/stats", get(api::verify_stats))
        .route("/api/verify/activity", get(api::verify_activity))
        .route("/api/tables/{table_id}/events", get(stream::table_events))
        .route(
            "/api/tables/{table_id}/handHistory",
            get(api::table_hand_history),
        )
        .route("/api/hands/{hand_id}/events", get(api::hand_events))
        .layer(cors)
        .with_state(state.clone());

    let addr = format!("0.0.0.0:{}", state.config.app_port);
    tracing::info!("backend listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}
