//! Starting hands: eligibility, dealer rotation, blinds, the deck
//! commitment and the opening deal.

use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::U256;
use chrono::{Duration, Utc};
use poker_core::{shuffle_deck, PlayerStatus, SeatRound};
use sqlx::PgConnection;

use crate::error::ApiError;
use crate::events::{self, EventKind};
use crate::game::state::{self, HandStatus, Round};
use crate::game::advance;
use crate::payload;
use crate::tables::{self, SessionRow};
use crate::AppState;

/// Next eligible seat clockwise, wrapping. `seats` is sorted ascending.
fn next_seat_clockwise(seats: &[i32], from: i32) -> i32 {
    seats
        .iter()
        .copied()
        .find(|&s| s > from)
        .unwrap_or(seats[0])
}

/// Try to start a hand if the table is ready: active, no open hand,
/// past the inter-hand delay, and at least two seated players who can
/// cover the big blind. Quiet when the table simply is not ready.
pub async fn maybe_start_hand(state: &AppState, table_id: i64) -> Result<(), ApiError> {
    let Some(table) = tables::get(&state.pool, table_id).await? else {
        return Ok(());
    };
    if !table.is_active {
        return Ok(());
    }
    if state::open_hand(&state.pool, table_id).await?.is_some() {
        return Ok(());
    }
    if let Some(last) = state::latest_completed_hand(&state.pool, table_id).await? {
        if let Some(done) = last.completed_at {
            let ready_at = done + Duration::seconds(table.hand_start_delay_seconds as i64);
            if ready_at > Utc::now() {
                return Ok(());
            }
        }
    }
    let sessions = tables::active_sessions(&state.pool, table_id).await?;
    let eligible = sessions
        .iter()
        .filter(|s| s.table_balance_gwei >= table.big_blind)
        .count();
    if eligible < 2 {
        return Ok(());
    }

    match start_hand(state, table_id).await {
        Ok(_) => Ok(()),
        // Someone else started it first; that is the desired outcome
        Err(ApiError::Conflict(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Start a hand in one transaction: commit to the shuffled deck, deal
/// hole cards, post blinds, open the pre-flop round and append
/// `hand_start`.
pub async fn start_hand(state: &AppState, table_id: i64) -> Result<i64, ApiError> {
    let mut tx = state.pool.begin().await?;

    let table = tables::get_for_update(&mut tx, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    if !table.is_active {
        return Err(ApiError::conflict("table is deactivated"));
    }
    if state::lock_open_hand(&mut tx, table_id).await?.is_some() {
        return Err(ApiError::conflict("hand already in progress"));
    }

    let sessions = lock_sessions(&mut tx, table_id).await?;
    let eligible: Vec<&SessionRow> = sessions
        .iter()
        .filter(|s| s.table_balance_gwei >= table.big_blind)
        .collect();
    if eligible.len() < 2 {
        return Err(ApiError::conflict("not enough eligible players"));
    }
    let seats: Vec<i32> = eligible.iter().map(|s| s.seat_number).collect();

    let dealer = match state::latest_completed_hand(&mut *tx, table_id).await? {
        Some(prev) if seats.contains(&prev.dealer_position) => {
            next_seat_clockwise(&seats, prev.dealer_position)
        }
        _ => seats[0],
    };
    let (sb_seat, bb_seat, first_to_act) = if seats.len() == 2 {
        // Heads-up: the dealer posts the small blind and acts first
        let other = next_seat_clockwise(&seats, dealer);
        (dealer, other, dealer)
    } else {
        let sb = next_seat_clockwise(&seats, dealer);
        let bb = next_seat_clockwise(&seats, sb);
        let utg = next_seat_clockwise(&seats, bb);
        (sb, bb, utg)
    };

    // Commit-reveal: only the hash is written to the public columns,
    // the seed and nonce wait in the secret column until settlement
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| ApiError::internal("system clock before the epoch"))?
        .as_nanos() as u64;
    let nonce: u64 = rand::random();
    let shuffled = shuffle_deck(seed, nonce);

    let hand_id: i64 = sqlx::query_scalar(
        "INSERT INTO hands \
           (table_id, status, dealer_position, small_blind_seat, big_blind_seat, deck, \
            deck_position, community_cards, shuffle_seed_hash, shuffle_secret) \
         VALUES ($1, $2, $3, $4, $5, $6, 0, '[]', $7, $8) \
         RETURNING id",
    )
    .bind(table_id)
    .bind(HandStatus::Shuffling.as_str())
    .bind(dealer)
    .bind(sb_seat)
    .bind(bb_seat)
    .bind(state::cards_to_json(&shuffled.cards))
    .bind(&shuffled.commitment)
    .bind(format!("{}:{}", shuffled.seed, shuffled.nonce))
    .fetch_one(&mut *tx)
    .await?;

    // Two hole cards per player in seat order
    for (i, session) in eligible.iter().enumerate() {
        let hole = [shuffled.cards[2 * i], shuffled.cards[2 * i + 1]];
        sqlx::query(
            "INSERT INTO hand_players \
               (hand_id, seat_number, wallet_address, status, chips_committed, hole_cards) \
             VALUES ($1, $2, $3, 'ACTIVE', 0, $4)",
        )
        .bind(hand_id)
        .bind(session.seat_number)
        .bind(&session.wallet_address)
        .bind(state::cards_to_json(&hole))
        .execute(&mut *tx)
        .await?;
    }
    let deck_position = (2 * eligible.len()) as i32;

    for (seat, blind) in [(sb_seat, table.small_blind), (bb_seat, table.big_blind)] {
        post_blind(&mut tx, hand_id, &eligible, seat, blind).await?;
    }

    let pot_seats: Vec<i32> = seats.clone();
    sqlx::query(
        "INSERT INTO pots (hand_id, pot_number, amount, eligible_seat_numbers) \
         VALUES ($1, 0, $2::numeric, $3)",
    )
    .bind(hand_id)
    .bind((table.small_blind + table.big_blind).to_string())
    .bind(&pot_seats)
    .execute(&mut *tx)
    .await?;

    sqlx::query(
        "UPDATE hands SET status = $2, round = $3, current_bet = $4::numeric, \
                last_raise_amount = $5::numeric, current_action_seat = $6, \
                deck_position = $7, action_timeout_at = $8 \
         WHERE id = $1",
    )
    .bind(hand_id)
    .bind(HandStatus::PreFlop.as_str())
    .bind(Round::PreFlop.as_str())
    .bind(table.big_blind.to_string())
    .bind((table.big_blind - table.small_blind).to_string())
    .bind(first_to_act)
    .bind(deck_position)
    .bind(Utc::now() + Duration::seconds(table.action_timeout_seconds as i64))
    .execute(&mut *tx)
    .await?;

    let roster: Vec<(i32, String)> = eligible
        .iter()
        .map(|s| (s.seat_number, s.wallet_address.clone()))
        .collect();
    let event_payload = payload::hand_start(
        &table,
        hand_id,
        dealer,
        sb_seat,
        bb_seat,
        &shuffled.commitment,
        &roster,
    );
    events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        EventKind::HandStart,
        &event_payload,
        None,
        None,
    )
    .await?;

    for (seat, blind) in [(sb_seat, table.small_blind), (bb_seat, table.big_blind)] {
        let session = eligible
            .iter()
            .find(|s| s.seat_number == seat)
            .ok_or_else(|| ApiError::invariant("blind seat without a session"))?;
        let went_all_in = session.table_balance_gwei == blind;
        let blind_payload = payload::bet(
            &table,
            hand_id,
            Round::PreFlop.as_str(),
            HandStatus::PreFlop.as_str(),
            "POST_BLIND",
            seat,
            &session.wallet_address,
            Some(blind),
            went_all_in,
            Utc::now(),
        );
        events::append(
            &mut tx,
            &state.signer,
            state.config.tee_version,
            EventKind::Bet,
            &blind_payload,
            Some(&session.wallet_address),
            None,
        )
        .await?;
    }

    // Blinds can put players all-in; if nobody can bet, run the board
    // out immediately
    let players = state::players(&mut *tx, hand_id).await?;
    let actions = state::actions(&mut *tx, hand_id).await?;
    let seat_view: Vec<SeatRound> = state::seat_rounds(&players, &actions, Round::PreFlop);
    let active = seat_view
        .iter()
        .filter(|s| s.status == PlayerStatus::Active)
        .count();
    if active == 0 {
        advance::run_out_and_settle(&mut tx, state, &table, hand_id).await?;
    } else if !seat_view
        .iter()
        .any(|s| s.seat == first_to_act && s.status == PlayerStatus::Active)
    {
        // A blind put the intended first actor all-in; skip past them
        let next = poker_core::next_active(&seat_view, first_to_act)
            .ok_or_else(|| ApiError::invariant("no active seat to open the betting"))?;
        sqlx::query("UPDATE hands SET current_action_seat = $2 WHERE id = $1")
            .bind(hand_id)
            .bind(next)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    tracing::info!(
        "hand {} started at table {} (dealer seat {}, {} players)",
        hand_id,
        table_id,
        dealer,
        eligible.len()
    );
    Ok(hand_id)
}

async fn lock_sessions(
    conn: &mut PgConnection,
    table_id: i64,
) -> Result<Vec<SessionRow>, ApiError> {
    let rows = sqlx::query(
        "SELECT id, table_id, wallet_address, seat_number, \
                table_balance_gwei::text AS table_balance_gwei, twitter_handle, \
                twitter_avatar_url, joined_at, left_at, is_active \
         FROM table_seat_sessions \
         WHERE table_id = $1 AND is_active ORDER BY seat_number FOR UPDATE",
    )
    .bind(table_id)
    .fetch_all(conn)
    .await?;
    rows.iter().map(crate::tables::session_from_row).collect()
}

async fn post_blind(
    conn: &mut PgConnection,
    hand_id: i64,
    sessions: &[&SessionRow],
    seat: i32,
    blind: U256,
) -> Result<(), ApiError> {
    let session = sessions
        .iter()
        .find(|s| s.seat_number == seat)
        .ok_or_else(|| ApiError::invariant("blind seat without a session"))?;

    tables::debit_session(conn, session.id, blind).await?;
    let all_in = session.table_balance_gwei == blind;
    sqlx::query(
        "UPDATE hand_players SET chips_committed = $3::numeric, status = $4 \
         WHERE hand_id = $1 AND seat_number = $2",
    )
    .bind(hand_id)
    .bind(seat)
    .bind(blind.to_string())
    .bind(if all_in { "ALL_IN" } else { "ACTIVE" })
    .execute(&mut *conn)
    .await?;
    state::record_action(conn, hand_id, seat, Round::PreFlop, "POST_BLIND", Some(blind)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_seat_clockwise_wraps() {
        let seats = [0, 2, 5];
        assert_eq!(next_seat_clockwise(&seats, 0), 2);
        assert_eq!(next_seat_clockwise(&seats, 2), 5);
        assert_eq!(next_seat_clockwise(&seats, 5), 0);
        assert_eq!(next_seat_clockwise(&seats, 3), 5);
    }

    #[test]
    fn test_heads_up_blind_assignment() {
        // Dealer posts the small blind and acts first heads-up
        let seats = [1, 4];
        let dealer = 4;
        let other = next_seat_clockwise(&seats, dealer);
        assert_eq!(other, 1);
    }
}
