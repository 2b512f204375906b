//! Player action processing. One transaction per action: validate the
//! turn, move chips, record the action row, append the `bet` event,
//! then drive the hand forward (next actor, round advance, run-out or
//! settlement).

use alloy_primitives::U256;
use chrono::{Duration, Utc};
use poker_core::{betting_is_over, next_active, round_complete, PlayerStatus};
use sqlx::PgConnection;

use crate::error::ApiError;
use crate::events::{self, EventKind};
use crate::game::state::{self, HandRow, HandStatus};
use crate::game::{advance, settle, start};
use crate::payload;
use crate::tables::{self, SessionRow, TableRow};
use crate::AppState;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerAction {
    Fold,
    Check,
    Call,
    Bet(U256),
    Raise(U256),
    AllIn,
}

/// Round a voluntary bet or raise down to a big-blind increment.
fn round_to_blind(amount: U256, big_blind: U256) -> U256 {
    if big_blind.is_zero() {
        amount
    } else {
        amount / big_blind * big_blind
    }
}

/// Entry point for `/action`: resolves the caller's seat and applies
/// the action. Starts the next hand afterwards if this one completed.
pub async fn apply_action(
    state: &AppState,
    table_id: i64,
    wallet: &str,
    action: PlayerAction,
) -> Result<(), ApiError> {
    let mut tx = state.pool.begin().await?;

    let table = tables::get(&mut *tx, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    let hand = state::lock_open_hand(&mut tx, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("no hand in progress"))?;
    let session = tables::session_for_wallet_for_update(&mut tx, table_id, wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("no active session at this table"))?;

    let completed =
        perform_action(&mut tx, state, &table, &hand, &session, session.seat_number, action)
            .await?;
    tx.commit().await?;

    if completed {
        if let Err(e) = start::maybe_start_hand(state, table_id).await {
            tracing::error!("next-hand start after settlement failed: {}", e);
        }
    }
    Ok(())
}

/// Scheduler path: fold the seat whose action timed out. Races with a
/// real action are no-ops that clear the stale timeout.
pub async fn fold_for_timeout(state: &AppState, hand_id: i64) -> Result<bool, ApiError> {
    let mut tx = state.pool.begin().await?;

    let Some(hand) = state::lock_hand_by_id(&mut tx, hand_id).await? else {
        return Ok(false);
    };
    let (Some(seat), Some(timeout_at)) = (hand.current_action_seat, hand.action_timeout_at)
    else {
        clear_timeout(&mut tx, hand_id).await?;
        tx.commit().await?;
        return Ok(false);
    };
    if hand.status == HandStatus::Completed || timeout_at > Utc::now() {
        return Ok(false);
    }

    let table = tables::get(&mut *tx, hand.table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    let players = state::players_for_update(&mut tx, hand_id).await?;
    let Some(player) = players.iter().find(|p| p.seat_number == seat) else {
        clear_timeout(&mut tx, hand_id).await?;
        tx.commit().await?;
        return Ok(false);
    };
    if player.status != PlayerStatus::Active {
        // Turn already moved on; just disarm the timer
        clear_timeout(&mut tx, hand_id).await?;
        tx.commit().await?;
        return Ok(false);
    }
    let session =
        tables::session_for_wallet_for_update(&mut tx, hand.table_id, &player.wallet_address)
            .await?
            .ok_or_else(|| ApiError::invariant("hand player without an active session"))?;

    tracing::info!(
        "action timeout: folding seat {} on hand {}",
        seat,
        hand_id
    );
    let completed =
        perform_action(&mut tx, state, &table, &hand, &session, seat, PlayerAction::Fold).await?;
    tx.commit().await?;

    if completed {
        if let Err(e) = start::maybe_start_hand(state, hand.table_id).await {
            tracing::error!("next-hand start after timeout settlement failed: {}", e);
        }
    }
    Ok(true)
}

async fn clear_timeout(conn: &mut PgConnection, hand_id: i64) -> Result<(), ApiError> {
    sqlx::query("UPDATE hands SET action_timeout_at = NULL WHERE id = $1")
        .bind(hand_id)
        .execute(conn)
        .await?;
    Ok(())
}

/// Apply one validated action on an open transaction. Returns true if
/// the hand completed.
async fn perform_action(
    conn: &mut PgConnection,
    state: &AppState,
    table: &TableRow,
    hand: &HandRow,
    session: &SessionRow,
    seat: i32,
    action: PlayerAction,
) -> Result<bool, ApiError> {
    let round = hand
        .round
        .ok_or_else(|| ApiError::invariant("open hand without a betting round"))?;
    let players = state::players_for_update(conn, hand.id).await?;
    let player = players
        .iter()
        .find(|p| p.seat_number == seat)
        .ok_or_else(|| ApiError::conflict("not seated in this hand"))?;
    if player.status != PlayerStatus::Active {
        return Err(ApiError::conflict("player cannot act in this hand"));
    }
    if hand.current_action_seat != Some(seat) {
        return Err(ApiError::conflict("not player's turn"));
    }

    let committed = player.chips_committed;
    let balance = session.table_balance_gwei;
    let current_bet = hand.current_bet;

    // (db action name, event action type, chips deducted now, new bet state)
    struct Applied {
        db_action: &'static str,
        event_type: &'static str,
        amount: Option<U256>,
        new_current_bet: U256,
        new_last_raise: U256,
        went_all_in: bool,
    }

    let applied = match action {
        PlayerAction::Fold => Applied {
            db_action: "FOLD",
            event_type: "FOLD",
            amount: None,
            new_current_bet: current_bet,
            new_last_raise: hand.last_raise_amount,
            went_all_in: false,
        },
        PlayerAction::Check => {
            if !current_bet.is_zero() && committed != current_bet {
                return Err(ApiError::validation("cannot check facing a bet"));
            }
            Applied {
                db_action: "CHECK",
                event_type: "CHECK",
                amount: None,
                new_current_bet: current_bet,
                new_last_raise: hand.last_raise_amount,
                went_all_in: false,
            }
        }
        PlayerAction::Call => {
            if current_bet.is_zero() || committed >= current_bet {
                return Err(ApiError::validation("nothing to call"));
            }
            let call_amount = current_bet - committed;
            if call_amount > balance {
                return Err(ApiError::validation("insufficient balance to call"));
            }
            Applied {
                db_action: "CALL",
                event_type: "CALL",
                amount: Some(call_amount),
                new_current_bet: current_bet,
                new_last_raise: hand.last_raise_amount,
                went_all_in: call_amount == balance,
            }
        }
        PlayerAction::Bet(amount) => {
            if !current_bet.is_zero() {
                return Err(ApiError::validation("cannot bet facing a bet; raise instead"));
            }
            let amount = round_to_blind(amount, table.big_blind);
            if amount < table.big_blind {
                return Err(ApiError::validation("bet below the big blind"));
            }
            if amount > balance {
                return Err(ApiError::validation("insufficient table balance"));
            }
            Applied {
                db_action: "RAISE",
                event_type: "BET",
                amount: Some(amount),
                new_current_bet: committed + amount,
                new_last_raise: amount,
                went_all_in: amount == balance,
            }
        }
        PlayerAction::Raise(amount) => {
            if current_bet.is_zero() {
                return Err(ApiError::validation("nothing to raise; bet instead"));
            }
            let amount = round_to_blind(amount, table.big_blind);
            if amount > balance {
                return Err(ApiError::validation("insufficient table balance"));
            }
            let new_committed = committed + amount;
            if new_committed <= current_bet {
                return Err(ApiError::validation("raise must exceed the current bet"));
            }
            let increment = new_committed - current_bet;
            if increment < hand.last_raise_amount {
                return Err(ApiError::validation("raise below the minimum raise"));
            }
            Applied {
                db_action: "RAISE",
                event_type: "RAISE",
                amount: Some(amount),
                new_current_bet: new_committed,
                new_last_raise: increment,
                went_all_in: amount == balance,
            }
        }
        PlayerAction::AllIn => {
            if balance.is_zero() {
                return Err(ApiError::validation("no chips left to push"));
            }
            let new_committed = committed + balance;
            let (new_current_bet, new_last_raise) = if new_committed > current_bet {
                // Counts as the bet or raise, min-raise rules waived
                (new_committed, new_committed - current_bet)
            } else {
                (current_bet, hand.last_raise_amount)
            };
            Applied {
                db_action: "ALL_IN",
                event_type: "ALL_IN",
                amount: Some(balance),
                new_current_bet,
                new_last_raise,
                went_all_in: true,
            }
        }
    };

    // Move the chips and the per-round commitment
    if let Some(amount) = applied.amount {
        tables::debit_session(conn, session.id, amount).await?;
        sqlx::query(
            "UPDATE hand_players \
             SET chips_committed = chips_committed + $3::numeric \
             WHERE hand_id = $1 AND seat_number = $2",
        )
        .bind(hand.id)
        .bind(seat)
        .bind(amount.to_string())
        .execute(&mut *conn)
        .await?;
    }

    let new_status = if action == PlayerAction::Fold {
        PlayerStatus::Folded
    } else if applied.went_all_in {
        PlayerStatus::AllIn
    } else {
        PlayerStatus::Active
    };
    if new_status != PlayerStatus::Active {
        sqlx::query(
            "UPDATE hand_players SET status = $3 WHERE hand_id = $1 AND seat_number = $2",
        )
        .bind(hand.id)
        .bind(seat)
        .bind(new_status.as_str())
        .execute(&mut *conn)
        .await?;
    }

    sqlx::query(
        "UPDATE hands SET current_bet = $2::numeric, last_raise_amount = $3::numeric \
         WHERE id = $1",
    )
    .bind(hand.id)
    .bind(applied.new_current_bet.to_string())
    .bind(applied.new_last_raise.to_string())
    .execute(&mut *conn)
    .await?;

    state::record_action(conn, hand.id, seat, round, applied.db_action, applied.amount).await?;

    let bet_payload = payload::bet(
        table,
        hand.id,
        round.as_str(),
        hand.status.as_str(),
        applied.event_type,
        seat,
        &session.wallet_address,
        applied.amount,
        applied.went_all_in,
        Utc::now(),
    );
    events::append(
        conn,
        &state.signer,
        state.config.tee_version,
        EventKind::Bet,
        &bet_payload,
        Some(&session.wallet_address),
        None,
    )
    .await?;

    // Pot upkeep: full rebuild on all-in, cheap main-pot refresh otherwise
    let players = state::players(&mut *conn, hand.id).await?;
    let actions = state::actions(&mut *conn, hand.id).await?;
    if applied.went_all_in {
        settle::rebuild_pots(conn, hand.id, &players, &actions).await?;
    } else if applied.amount.is_some() {
        settle::refresh_main_pot(conn, hand.id, &players, &actions).await?;
    }

    // Drive the hand forward
    let non_folded = players
        .iter()
        .filter(|p| p.status != PlayerStatus::Folded)
        .count();
    if non_folded == 1 {
        settle::settle(conn, state, table, hand.id, false).await?;
        return Ok(true);
    }

    let seats = state::seat_rounds(&players, &actions, round);
    if round_complete(&seats, applied.new_current_bet) {
        // With nobody left who can bet, deal straight through to the
        // river; otherwise open the next street normally
        if betting_is_over(&seats) {
            advance::run_out_and_settle(conn, state, table, hand.id).await?;
            return Ok(true);
        }
        return advance::advance_round(conn, state, table, hand.id).await;
    }

    let next = next_active(&seats, seat)
        .ok_or_else(|| ApiError::invariant("no active seat to pass the action to"))?;
    sqlx::query(
        "UPDATE hands SET current_action_seat = $2, action_timeout_at = $3 WHERE id = $1",
    )
    .bind(hand.id)
    .bind(next)
    .bind(Utc::now() + Duration::seconds(table.action_timeout_seconds as i64))
    .execute(conn)
    .await?;
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to_blind() {
        let bb = U256::from(2_000_000u64);
        assert_eq!(round_to_blind(U256::from(5_000_000u64), bb), U256::from(4_000_000u64));
        assert_eq!(round_to_blind(U256::from(4_000_000u64), bb), U256::from(4_000_000u64));
        assert_eq!(round_to_blind(U256::from(1_999_999u64), bb), U256::ZERO);
        assert_eq!(round_to_blind(U256::from(7u64), U256::ZERO), U256::from(7u64));
    }
}
