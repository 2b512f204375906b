//! Betting-round progression and the all-in run-out.

use alloy_primitives::U256;
use chrono::{Duration, Utc};
use poker_core::{first_active_after, Card, PlayerStatus, SeatRound};
use sqlx::PgConnection;

use crate::error::ApiError;
use crate::events::{self, EventKind};
use crate::game::settle;
use crate::game::state;
use crate::payload;
use crate::tables::TableRow;
use crate::AppState;

/// Close the current round: rebuild pots from the full history, deal
/// the next street (or settle after the river), reset per-round state
/// and hand the action to the first active seat past the dealer.
/// Returns true when the hand settled.
pub async fn advance_round(
    conn: &mut PgConnection,
    state: &AppState,
    table: &TableRow,
    hand_id: i64,
) -> Result<bool, ApiError> {
    let hand = state::lock_hand_by_id(conn, hand_id)
        .await?
        .ok_or_else(|| ApiError::invariant("hand vanished mid-transaction"))?;
    let round = hand
        .round
        .ok_or_else(|| ApiError::invariant("open hand without a betting round"))?;
    let players = state::players(&mut *conn, hand_id).await?;
    let actions = state::actions(&mut *conn, hand_id).await?;

    settle::rebuild_pots(conn, hand_id, &players, &actions).await?;

    let Some(next_round) = round.next() else {
        settle::settle(conn, state, table, hand_id, true).await?;
        return Ok(true);
    };

    let n = next_round.cards_dealt();
    let pos = hand.deck_position as usize;
    if pos + n > hand.deck.len() {
        return Err(ApiError::invariant("deck exhausted while dealing"));
    }
    let new_cards: Vec<Card> = hand.deck[pos..pos + n].to_vec();
    let mut community = hand.community_cards.clone();
    community.extend(new_cards.iter().copied());

    sqlx::query(
        "UPDATE hand_players SET chips_committed = 0 \
         WHERE hand_id = $1 AND status <> 'FOLDED'",
    )
    .bind(hand_id)
    .execute(&mut *conn)
    .await?;

    // Fresh street: no commitments, nobody has acted yet
    let seats: Vec<SeatRound> = players
        .iter()
        .map(|p| SeatRound {
            seat: p.seat_number,
            status: p.status,
            committed: U256::ZERO,
            acted: false,
        })
        .collect();
    let first = first_active_after(&seats, hand.dealer_position);
    let timeout_at =
        first.map(|_| Utc::now() + Duration::seconds(table.action_timeout_seconds as i64));

    sqlx::query(
        "UPDATE hands SET status = $2, round = $3, community_cards = $4, deck_position = $5, \
                current_bet = 0, last_raise_amount = 0, current_action_seat = $6, \
                action_timeout_at = $7 \
         WHERE id = $1",
    )
    .bind(hand_id)
    .bind(next_round.matching_status().as_str())
    .bind(next_round.as_str())
    .bind(state::cards_to_json(&community))
    .bind((pos + n) as i32)
    .bind(first)
    .bind(timeout_at)
    .execute(&mut *conn)
    .await?;

    let new_codes: Vec<String> = new_cards.iter().map(|c| c.code()).collect();
    let all_codes: Vec<String> = community.iter().map(|c| c.code()).collect();
    let event_payload =
        payload::community_cards(table, hand_id, next_round.as_str(), &new_codes, &all_codes);
    events::append(
        conn,
        &state.signer,
        state.config.tee_version,
        EventKind::CommunityCards,
        &event_payload,
        None,
        None,
    )
    .await?;

    Ok(false)
}

/// No further betting is possible: synthesize the checks that close
/// each remaining street, deal through the river and settle.
pub async fn run_out_and_settle(
    conn: &mut PgConnection,
    state: &AppState,
    table: &TableRow,
    hand_id: i64,
) -> Result<(), ApiError> {
    loop {
        let hand = state::lock_hand_by_id(conn, hand_id)
            .await?
            .ok_or_else(|| ApiError::invariant("hand vanished mid-transaction"))?;
        let round = hand
            .round
            .ok_or_else(|| ApiError::invariant("open hand without a betting round"))?;
        let players = state::players(&mut *conn, hand_id).await?;
        let actions = state::actions(&mut *conn, hand_id).await?;

        for p in &players {
            if p.status == PlayerStatus::Folded {
                continue;
            }
            let acted = actions.iter().any(|a| {
                a.seat_number == p.seat_number
                    && a.round == round
                    && a.action != "POST_BLIND"
            });
            if !acted {
                state::record_action(conn, hand_id, p.seat_number, round, "CHECK", None).await?;
            }
        }

        if advance_round(conn, state, table, hand_id).await? {
            return Ok(());
        }
    }
}
