//! REST API handlers.

pub mod auth;
pub mod types;

pub use types::*;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::{json, Value};

use crate::db::u256_from_input;
use crate::error::ApiError;
use crate::escrow;
use crate::events;
use crate::game::state as hand_state;
use crate::game::{self, PlayerAction};
use crate::payload::iso_millis;
use crate::tables;
use crate::views;
use crate::wallet;
use crate::{chain, AppState};

use auth::{admin_from_headers, twitter_from_headers, wallet_from_headers};

const DEFAULT_EVENT_LIMIT: i64 = 50;
const MAX_EVENT_LIMIT: i64 = 200;
const DEFAULT_WITHDRAWAL_EXPIRY_SECS: i64 = 300;

/// GET /sessionMessage?address
pub async fn session_message(
    Query(query): Query<AddressQuery>,
) -> Result<Json<Value>, ApiError> {
    let normalized = wallet::normalize(&query.address)?;
    Ok(Json(json!({
        "message": format!(
            "Sign on to Clout Cards with address {}",
            wallet::checksum(&normalized)
        ),
    })))
}

/// GET /admins
pub async fn admins(State(state): State<AppState>) -> Json<Value> {
    let admins: Vec<String> = state
        .config
        .admin_addresses
        .iter()
        .map(|a| wallet::checksum(a))
        .collect();
    Json(json!({ "admins": admins }))
}

/// GET /tee/publicKey
pub async fn tee_public_key(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "address": state.signer.address().to_checksum(None),
        "teeVersion": state.config.tee_version,
    }))
}

/// GET /pokerTables
pub async fn poker_tables(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let summaries = tables::list(&state.pool).await?;
    let tables: Vec<TableInfo> = summaries.iter().map(TableInfo::from).collect();
    Ok(Json(json!({ "tables": tables })))
}

/// POST /createTable (admin)
pub async fn create_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateTableRequest>,
) -> Result<Json<Value>, ApiError> {
    let admin = admin_from_headers(&state.config, &headers)?;
    let input = tables::CreateTableInput {
        name: req.name,
        minimum_buy_in: u256_from_input(&req.minimum_buy_in, "minimumBuyIn")?,
        maximum_buy_in: u256_from_input(&req.maximum_buy_in, "maximumBuyIn")?,
        small_blind: u256_from_input(&req.small_blind, "smallBlind")?,
        big_blind: u256_from_input(&req.big_blind, "bigBlind")?,
        per_hand_rake: req.per_hand_rake,
        max_seat_count: req.max_seat_count,
        action_timeout_seconds: req.action_timeout_seconds.unwrap_or(30),
        hand_start_delay_seconds: req.hand_start_delay_seconds.unwrap_or(5),
    };
    let table = tables::create(&state, &admin, input).await?;
    Ok(Json(json!({ "tableId": table.id })))
}

/// POST /admin/tables/:id/status (admin)
pub async fn table_status(
    State(state): State<AppState>,
    Path(table_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<TableStatusRequest>,
) -> Result<Json<Value>, ApiError> {
    let admin = admin_from_headers(&state.config, &headers)?;
    let table = tables::set_active(&state, table_id, req.is_active, &admin).await?;
    Ok(Json(json!({ "tableId": table.id, "isActive": table.is_active })))
}

/// GET /tablePlayers?tableId
pub async fn table_players(
    State(state): State<AppState>,
    Query(query): Query<TableIdQuery>,
) -> Result<Json<Value>, ApiError> {
    tables::get(&state.pool, query.table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    let sessions = tables::active_sessions(&state.pool, query.table_id).await?;
    let players: Vec<SessionInfo> = sessions.iter().map(SessionInfo::from).collect();
    Ok(Json(json!({ "tableId": query.table_id, "players": players })))
}

/// POST /joinTable (wallet + twitter)
pub async fn join_table(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<JoinTableRequest>,
) -> Result<Json<Value>, ApiError> {
    let wallet = wallet_from_headers(&headers)?;
    let twitter = twitter_from_headers(&headers);
    let session = tables::join(
        &state,
        &wallet,
        twitter.handle.as_deref(),
        twitter.avatar_url.as_deref(),
        tables::JoinInput {
            table_id: req.table_id,
            seat_number: req.seat_number,
            buy_in_gwei: u256_from_input(&req.buy_in_gwei, "buyInGwei")?,
        },
    )
    .await?;
    Ok(Json(json!({
        "tableId": session.table_id,
        "seatNumber": session.seat_number,
        "tableBalanceGwei": session.table_balance_gwei.to_string(),
    })))
}

/// POST /standUp (wallet)
pub async fn stand_up(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<StandUpRequest>,
) -> Result<Json<Value>, ApiError> {
    let wallet = wallet_from_headers(&headers)?;
    tables::stand_up(&state, &wallet, req.table_id).await?;
    Ok(Json(json!({ "status": "left", "tableId": req.table_id })))
}

/// POST /rebuy (wallet)
pub async fn rebuy(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RebuyRequest>,
) -> Result<Json<Value>, ApiError> {
    let wallet = wallet_from_headers(&headers)?;
    let amount = u256_from_input(&req.amount_gwei, "amountGwei")?;
    let session = tables::rebuy(&state, &wallet, req.table_id, amount).await?;
    Ok(Json(json!({
        "tableId": session.table_id,
        "seatNumber": session.seat_number,
        "tableBalanceGwei": session.table_balance_gwei.to_string(),
    })))
}

/// GET /currentHand?tableId (wallet) — includes own hole cards.
pub async fn current_hand(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<TableIdQuery>,
) -> Result<Json<Value>, ApiError> {
    let wallet = wallet_from_headers(&headers)?;
    let view = views::current_hand_view(&state, query.table_id, Some(&wallet)).await?;
    Ok(Json(view))
}

/// GET /watchCurrentHand?tableId — spectator view, no hole cards.
pub async fn watch_current_hand(
    State(state): State<AppState>,
    Query(query): Query<TableIdQuery>,
) -> Result<Json<Value>, ApiError> {
    let view = views::current_hand_view(&state, query.table_id, None).await?;
    Ok(Json(view))
}

/// POST /action (wallet)
///
/// RAISE against an empty bet is promoted to BET (and vice versa), and
/// ALL_IN is dispatched with the remaining balance; the state machine
/// itself stays strict.
pub async fn action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ActionRequest>,
) -> Result<Json<ActionResponse>, ApiError> {
    let wallet = wallet_from_headers(&headers)?;
    let normalized = req.action.trim().to_ascii_uppercase();
    let amount = req
        .amount_gwei
        .as_deref()
        .map(|s| u256_from_input(s, "amountGwei"))
        .transpose()?;

    let action = match normalized.as_str() {
        "FOLD" => PlayerAction::Fold,
        "CHECK" => PlayerAction::Check,
        "CALL" => PlayerAction::Call,
        "BET" | "RAISE" => {
            let amount = amount
                .ok_or_else(|| ApiError::validation("amountGwei is required for bets"))?;
            if amount.is_zero() {
                return Err(ApiError::validation("amountGwei must be positive"));
            }
            let current_bet = hand_state::open_hand(&state.pool, req.table_id)
                .await?
                .map(|h| h.current_bet)
                .unwrap_or_default();
            if current_bet.is_zero() {
                PlayerAction::Bet(amount)
            } else {
                PlayerAction::Raise(amount)
            }
        }
        "ALL_IN" | "ALLIN" => PlayerAction::AllIn,
        _ => return Err(ApiError::validation(format!("unknown action {:?}", normalized))),
    };

    game::apply_action(&state, req.table_id, &wallet, action).await?;
    Ok(Json(ActionResponse {
        status: "applied".to_string(),
        action: normalized,
    }))
}

/// GET /playerEscrowBalance?walletAddress (wallet)
pub async fn player_escrow_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<WalletAddressQuery>,
) -> Result<Json<EscrowBalanceResponse>, ApiError> {
    let caller = wallet_from_headers(&headers)?;
    let requested = wallet::normalize(&query.wallet_address)?;
    if caller != requested {
        return Err(ApiError::unauthorized("may only read your own balance"));
    }

    let account = escrow::get(&state.pool, &requested).await?;
    let (balance, pending) = match account {
        Some(acct) => {
            let pending = acct
                .has_pending_withdrawal(chrono::Utc::now())
                .then(|| PendingWithdrawalInfo {
                    nonce: acct.next_withdrawal_nonce.map(|n| n.to_string()),
                    expiry: acct
                        .withdrawal_signature_expiry
                        .map(iso_millis)
                        .unwrap_or_default(),
                });
            (acct.balance_gwei.to_string(), pending)
        }
        None => ("0".to_string(), None),
    };
    Ok(Json(EscrowBalanceResponse {
        wallet_address: wallet::checksum(&requested),
        balance_gwei: balance,
        pending_withdrawal: pending,
    }))
}

/// POST /signEscrowWithdrawal (wallet)
pub async fn sign_escrow_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SignWithdrawalRequest>,
) -> Result<Json<SignWithdrawalResponse>, ApiError> {
    let wallet = wallet_from_headers(&headers)?;
    let to = wallet::normalize(&req.to_address)?;
    let amount_gwei = u256_from_input(&req.amount_gwei, "amountGwei")?;
    let expiry_seconds = req
        .expiry_seconds
        .unwrap_or(DEFAULT_WITHDRAWAL_EXPIRY_SECS);

    let account = escrow::get(&state.pool, &wallet).await?;
    let expiry_unix =
        escrow::validate_withdrawal(&wallet, &to, amount_gwei, expiry_seconds, account.as_ref())?;

    let from_addr = wallet
        .parse()
        .map_err(|_| ApiError::internal("stored wallet unparseable"))?;
    let to_addr = to
        .parse()
        .map_err(|_| ApiError::internal("recipient unparseable"))?;
    let amount_wei = amount_gwei * alloy_primitives::U256::from(1_000_000_000u64);
    let (digest, nonce) =
        chain::compute_withdraw_digest(&state, from_addr, to_addr, amount_wei, expiry_unix).await?;

    let authorization = escrow::reserve_and_sign(
        &state.pool,
        &state.signer,
        state.config.tee_version,
        &wallet,
        &to,
        amount_gwei,
        digest,
        nonce,
        expiry_unix,
    )
    .await?;

    Ok(Json(SignWithdrawalResponse {
        nonce: authorization.nonce.to_string(),
        expiry: authorization.expiry_unix,
        digest: crate::signer::b256_hex(authorization.digest),
        v: authorization.v,
        r: crate::signer::hex32(authorization.r),
        s: crate::signer::hex32(authorization.s),
    }))
}

/// GET /events?limit (admin)
pub async fn admin_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    admin_from_headers(&state.config, &headers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);
    let rows = events::tail(&state.pool, limit).await?;
    let items: Vec<Value> = rows
        .iter()
        .map(|r| views::event_view(&state.signer, r))
        .collect();
    Ok(Json(json!({ "events": items })))
}

/// GET /api/verify/events?page&limit (public)
pub async fn verify_events(
    State(state): State<AppState>,
    Query(query): Query<PageQuery>,
) -> Result<Json<Value>, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(DEFAULT_EVENT_LIMIT)
        .clamp(1, MAX_EVENT_LIMIT);
    let (rows, total) = events::page(&state.pool, page, limit).await?;
    let items: Vec<Value> = rows
        .iter()
        .map(|r| views::event_view(&state.signer, r))
        .collect();
    Ok(Json(json!({
        "events": items,
        "page": page,
        "limit": limit,
        "total": total,
    })))
}

/// POST /admin/reprocessEvents (admin)
pub async fn reprocess_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ReprocessRequest>,
) -> Result<Json<chain::ReprocessSummary>, ApiError> {
    admin_from_headers(&state.config, &headers)?;
    let summary =
        chain::reprocess_events(&state, req.from_block, req.to_block, req.dry_run).await?;
    Ok(Json(summary))
}

/// GET /api/accounting/solvency (admin)
pub async fn accounting_solvency(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    admin_from_headers(&state.config, &headers)?;
    Ok(Json(views::solvency(&state).await?))
}

/// GET /api/verify/stats
pub async fn verify_stats(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(views::verify_stats(&state).await?))
}

/// GET /api/verify/activity
pub async fn verify_activity(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    Ok(Json(views::verify_activity(&state).await?))
}

/// GET /api/tables/:id/handHistory
pub async fn table_hand_history(
    State(state): State<AppState>,
    Path(table_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(views::hand_history(&state, table_id).await?))
}

/// GET /api/hands/:id/events
pub async fn hand_events(
    State(state): State<AppState>,
    Path(hand_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    Ok(Json(views::hand_events(&state, hand_id).await?))
}

/// POST /admin/leaderboard/reset (admin) — anchors the aggregate
/// window boundary in the log.
pub async fn leaderboard_reset(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let admin = admin_from_headers(&state.config, &headers)?;
    let mut tx = state.pool.begin().await?;
    let payload = crate::payload::leaderboard_reset(&admin, chrono::Utc::now());
    let event = events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        events::EventKind::LeaderboardReset,
        &payload,
        None,
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(Json(json!({ "eventId": event.event_id })))
}
