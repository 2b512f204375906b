//! Read-side views: solvency, verification feeds, hand history and
//! the live hand view. Event reads re-verify signatures per row.

use alloy_primitives::U256;
use serde_json::{json, Value};

use crate::chain;
use crate::db::u256_from_text;
use crate::error::ApiError;
use crate::events::{self, EventRow};
use crate::game::state::{self, HandStatus};
use crate::payload::iso_millis;
use crate::signer::EventSigner;
use crate::tables;
use crate::wallet;
use crate::AppState;

/// Event row as served to verification clients, with the signature
/// re-checked on the way out.
pub fn event_view(signer: &EventSigner, row: &EventRow) -> Value {
    json!({
        "eventId": row.event_id,
        "blockTs": iso_millis(row.block_ts),
        "kind": row.kind,
        "payloadJson": row.payload_json,
        "digest": row.digest,
        "sigR": row.sig_r,
        "sigS": row.sig_s,
        "sigV": row.sig_v,
        "nonce": row.nonce,
        "player": row.player.as_deref().map(wallet::checksum),
        "tableId": row.table_id,
        "handId": row.hand_id,
        "teeVersion": row.tee_version,
        "teePubkey": wallet::checksum(&row.tee_pubkey),
        "ingestedAt": iso_millis(row.ingested_at),
        "signatureValid": events::verify_row(signer, row),
    })
}

async fn sum_as_u256(state: &AppState, query: &str) -> Result<U256, ApiError> {
    let text: String = sqlx::query_scalar(query).fetch_one(&state.pool).await?;
    u256_from_text(&text)
}

/// Escrow + table balances against the on-chain contract balance. The
/// excess is house rake not yet withdrawn.
pub async fn solvency(state: &AppState) -> Result<Value, ApiError> {
    let total_escrow = sum_as_u256(
        state,
        "SELECT COALESCE(sum(balance_gwei), 0)::text FROM escrow_balances",
    )
    .await?;
    let total_table = sum_as_u256(
        state,
        "SELECT COALESCE(sum(table_balance_gwei), 0)::text FROM table_seat_sessions \
         WHERE is_active",
    )
    .await?;
    let total_backed = total_escrow + total_table;
    let contract_balance = chain::contract_balance_gwei(state).await?;

    let (difference, deficit) = if contract_balance >= total_backed {
        (contract_balance - total_backed, false)
    } else {
        (total_backed - contract_balance, true)
    };
    if deficit {
        tracing::error!(
            "solvency deficit: backed {} > contract {}",
            total_backed,
            contract_balance
        );
    }

    Ok(json!({
        "totalEscrowGwei": total_escrow.to_string(),
        "totalTableGwei": total_table.to_string(),
        "totalBackedGwei": total_backed.to_string(),
        "contractBalanceGwei": contract_balance.to_string(),
        "differenceGwei": if deficit {
            format!("-{}", difference)
        } else {
            difference.to_string()
        },
        "solvent": !deficit,
    }))
}

pub async fn verify_stats(state: &AppState) -> Result<Value, ApiError> {
    let events: i64 = sqlx::query_scalar("SELECT count(*) FROM events")
        .fetch_one(&state.pool)
        .await?;
    let tables: i64 = sqlx::query_scalar("SELECT count(*) FROM poker_tables")
        .fetch_one(&state.pool)
        .await?;
    let hands_completed: i64 =
        sqlx::query_scalar("SELECT count(*) FROM hands WHERE status = 'COMPLETED'")
            .fetch_one(&state.pool)
            .await?;
    let players: i64 = sqlx::query_scalar("SELECT count(*) FROM escrow_balances")
        .fetch_one(&state.pool)
        .await?;
    let total_escrow = sum_as_u256(
        state,
        "SELECT COALESCE(sum(balance_gwei), 0)::text FROM escrow_balances",
    )
    .await?;

    Ok(json!({
        "events": events,
        "tables": tables,
        "handsCompleted": hands_completed,
        "players": players,
        "totalEscrowGwei": total_escrow.to_string(),
    }))
}

pub async fn verify_activity(state: &AppState) -> Result<Value, ApiError> {
    let rows = events::tail(&state.pool, 20).await?;
    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            json!({
                "eventId": row.event_id,
                "kind": row.kind,
                "blockTs": iso_millis(row.block_ts),
                "signatureValid": events::verify_row(&state.signer, row),
            })
        })
        .collect();
    Ok(json!({ "activity": items }))
}

/// Completed hands for a table, newest first. Seed, nonce and deck are
/// on the row only once the hand is COMPLETED, so nothing here can
/// leak a live shuffle.
pub async fn hand_history(state: &AppState, table_id: i64) -> Result<Value, ApiError> {
    tables::get(&state.pool, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;

    let hand_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT id FROM hands WHERE table_id = $1 AND status = 'COMPLETED' \
         ORDER BY completed_at DESC LIMIT 50",
    )
    .bind(table_id)
    .fetch_all(&state.pool)
    .await?;

    let mut hands = Vec::with_capacity(hand_ids.len());
    for hand_id in hand_ids {
        let Some(hand) = state::hand_by_id(&state.pool, hand_id).await? else {
            continue;
        };
        let pots = state::pots(&state.pool, hand_id).await?;
        let mut winners: Vec<i32> = pots
            .iter()
            .flat_map(|p| p.winner_seat_numbers.clone().unwrap_or_default())
            .collect();
        winners.sort_unstable();
        winners.dedup();
        let total_pot: U256 = pots.iter().map(|p| p.amount).sum();

        hands.push(json!({
            "id": hand.id,
            "startedAt": iso_millis(hand.started_at),
            "completedAt": hand.completed_at.map(iso_millis),
            "dealerPosition": hand.dealer_position,
            "winnerSeatNumbers": winners,
            "totalPotGwei": total_pot.to_string(),
            "communityCards": hand.community_cards.iter().map(|c| c.code()).collect::<Vec<_>>(),
            "shuffleSeedHash": hand.shuffle_seed_hash,
            "shuffleSeed": hand.shuffle_seed,
            "deckNonce": hand.deck_nonce,
            "deck": hand.deck.iter().map(|c| c.code()).collect::<Vec<_>>(),
        }));
    }
    Ok(json!({ "tableId": table_id, "hands": hands }))
}

pub async fn hand_events(state: &AppState, hand_id: i64) -> Result<Value, ApiError> {
    let rows = events::by_hand(&state.pool, hand_id).await?;
    if rows.is_empty() && state::hand_by_id(&state.pool, hand_id).await?.is_none() {
        return Err(ApiError::not_found("unknown hand"));
    }
    let items: Vec<Value> = rows.iter().map(|r| event_view(&state.signer, r)).collect();
    Ok(json!({ "handId": hand_id, "events": items }))
}

/// The live hand at a table. Hole cards are included only for the
/// viewing wallet; pass None for the spectator view.
pub async fn current_hand_view(
    state: &AppState,
    table_id: i64,
    viewer: Option<&str>,
) -> Result<Value, ApiError> {
    tables::get(&state.pool, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    let hand = state::open_hand(&state.pool, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("no hand in progress"))?;

    let players = state::players(&state.pool, hand.id).await?;
    let actions = state::actions(&state.pool, hand.id).await?;
    let pots = state::pots(&state.pool, hand.id).await?;
    let completed = hand.status == HandStatus::Completed;

    let players_json: Vec<Value> = players
        .iter()
        .map(|p| {
            let own = viewer.is_some_and(|v| v == p.wallet_address);
            let hole: Option<Vec<String>> = (own || completed)
                .then(|| p.hole_cards.iter().map(|c| c.code()).collect());
            json!({
                "seatNumber": p.seat_number,
                "walletAddress": wallet::checksum(&p.wallet_address),
                "status": p.status.as_str(),
                "chipsCommitted": p.chips_committed.to_string(),
                "holeCards": hole,
            })
        })
        .collect();

    let actions_json: Vec<Value> = actions
        .iter()
        .map(|a| {
            json!({
                "seatNumber": a.seat_number,
                "round": a.round.as_str(),
                "action": a.action,
                "amount": a.amount.map(|x| x.to_string()),
                "timestamp": iso_millis(a.created_at),
            })
        })
        .collect();

    let pots_json: Vec<Value> = pots
        .iter()
        .map(|p| {
            json!({
                "potNumber": p.pot_number,
                "amount": p.amount.to_string(),
                "eligibleSeatNumbers": p.eligible_seat_numbers,
                "winnerSeatNumbers": p.winner_seat_numbers,
            })
        })
        .collect();

    Ok(json!({
        "hand": {
            "id": hand.id,
            "tableId": hand.table_id,
            "status": hand.status.as_str(),
            "round": hand.round.map(|r| r.as_str()),
            "dealerPosition": hand.dealer_position,
            "smallBlindSeat": hand.small_blind_seat,
            "bigBlindSeat": hand.big_blind_seat,
            "currentActionSeat": hand.current_action_seat,
            "currentBet": hand.current_bet.to_string(),
            "lastRaiseAmount": hand.last_raise_amount.to_string(),
            "communityCards": hand.community_cards.iter().map(|c| c.code()).collect::<Vec<_>>(),
            "shuffleSeedHash": hand.shuffle_seed_hash,
            "shuffleSeed": completed.then_some(hand.shuffle_seed).flatten(),
            "deckNonce": completed.then_some(hand.deck_nonce).flatten(),
            "actionTimeoutAt": hand.action_timeout_at.map(iso_millis),
            "startedAt": iso_millis(hand.started_at),
            "completedAt": hand.completed_at.map(iso_millis),
        },
        "players": players_json,
        "actions": actions_json,
        "pots": pots_json,
    }))
}
