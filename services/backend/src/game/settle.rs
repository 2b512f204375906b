//! Pot maintenance, showdown evaluation, rake and settlement.

use std::collections::{BTreeMap, HashMap};

use alloy_primitives::U256;
use chrono::Utc;
use poker_core::{evaluate_seven, verify_commitment, HandScore, PlayerStatus, PotLayer};
use sqlx::PgConnection;

use crate::error::ApiError;
use crate::events::{self, EventKind};
use crate::game::state::{self, HandActionRow, HandPlayerRow};
use crate::payload::{self, HandEndAction, HandEndPlayer, HandEndPot};
use crate::tables::{self, TableRow};
use crate::AppState;

const BPS_DENOMINATOR: u64 = 10_000;

/// Per-action pot upkeep. While every acted player's total matches, a
/// single main-pot update suffices; once totals diverge the layers are
/// rebuilt so the pot sum always equals the committed chips.
pub async fn refresh_main_pot(
    conn: &mut PgConnection,
    hand_id: i64,
    players: &[HandPlayerRow],
    actions: &[HandActionRow],
) -> Result<(), ApiError> {
    let totals = state::totals_per_seat(actions);

    let mut acted_totals = Vec::new();
    for p in players {
        let acted = actions
            .iter()
            .any(|a| a.seat_number == p.seat_number && a.action != "POST_BLIND");
        if acted && p.status != PlayerStatus::Folded {
            acted_totals.push(totals.get(&p.seat_number).copied().unwrap_or(U256::ZERO));
        }
    }
    if poker_core::should_create_side_pots(&acted_totals) {
        rebuild_pots(conn, hand_id, players, actions).await?;
        return Ok(());
    }

    let sum: U256 = totals.values().copied().sum();
    let eligible: Vec<i32> = players
        .iter()
        .filter(|p| p.status != PlayerStatus::Folded)
        .map(|p| p.seat_number)
        .collect();

    sqlx::query(
        "UPDATE pots SET amount = $2::numeric, eligible_seat_numbers = $3 \
         WHERE hand_id = $1 AND pot_number = 0",
    )
    .bind(hand_id)
    .bind(sum.to_string())
    .bind(&eligible)
    .execute(conn)
    .await?;
    Ok(())
}

/// Re-layer the pots from the full action history (round end, all-in,
/// settlement). Chip conservation is checked on every rebuild.
pub async fn rebuild_pots(
    conn: &mut PgConnection,
    hand_id: i64,
    players: &[HandPlayerRow],
    actions: &[HandActionRow],
) -> Result<Vec<PotLayer>, ApiError> {
    let contributions = state::contributions(players, actions);
    let layers = poker_core::build_pots(&contributions);

    let committed: U256 = contributions.iter().map(|c| c.total).sum();
    let layered: U256 = layers.iter().map(|l| l.amount).sum();
    if committed != layered {
        return Err(ApiError::invariant(format!(
            "pot sum {} != committed chips {} on hand {}",
            layered, committed, hand_id
        )));
    }

    sqlx::query("DELETE FROM pots WHERE hand_id = $1")
        .bind(hand_id)
        .execute(&mut *conn)
        .await?;
    for (i, layer) in layers.iter().enumerate() {
        sqlx::query(
            "INSERT INTO pots (hand_id, pot_number, amount, eligible_seat_numbers) \
             VALUES ($1, $2, $3::numeric, $4)",
        )
        .bind(hand_id)
        .bind(i as i32)
        .bind(layer.amount.to_string())
        .bind(&layer.eligible)
        .execute(&mut *conn)
        .await?;
    }
    Ok(layers)
}

/// Settle the hand: decide winners per pot, take the rake, pay out,
/// reveal the shuffle and append `hand_end`. Runs on the transaction
/// of whichever action completed the hand.
pub async fn settle(
    conn: &mut PgConnection,
    state: &AppState,
    table: &TableRow,
    hand_id: i64,
    showdown: bool,
) -> Result<(), ApiError> {
    let hand = state::lock_hand_by_id(conn, hand_id)
        .await?
        .ok_or_else(|| ApiError::invariant("hand vanished mid-transaction"))?;
    let players = state::players_for_update(conn, hand_id).await?;
    let actions = state::actions(&mut *conn, hand_id).await?;
    let layers = rebuild_pots(conn, hand_id, &players, &actions).await?;

    let non_folded: Vec<&HandPlayerRow> = players
        .iter()
        .filter(|p| p.status != PlayerStatus::Folded)
        .collect();
    if non_folded.is_empty() {
        return Err(ApiError::invariant("settling a hand with no remaining players"));
    }

    // Showdown scores; skipped when a lone player takes everything
    let scores: HashMap<i32, HandScore> = if showdown && non_folded.len() > 1 {
        if hand.community_cards.len() != 5 {
            return Err(ApiError::invariant("showdown without a full board"));
        }
        non_folded
            .iter()
            .map(|p| {
                if p.hole_cards.len() != 2 {
                    return Err(ApiError::invariant("player without two hole cards"));
                }
                let mut seven = [p.hole_cards[0]; 7];
                seven[1] = p.hole_cards[1];
                for (i, c) in hand.community_cards.iter().enumerate() {
                    seven[2 + i] = *c;
                }
                Ok((p.seat_number, evaluate_seven(&seven)))
            })
            .collect::<Result<_, ApiError>>()?
    } else {
        HashMap::new()
    };

    let rake_bps = U256::from(table.per_hand_rake as u64);
    let mut house_rake = U256::ZERO;
    let mut total_pot = U256::ZERO;
    let mut payouts: BTreeMap<i32, U256> = BTreeMap::new();
    let mut all_winners: Vec<i32> = Vec::new();
    let mut end_pots: Vec<HandEndPot> = Vec::new();

    for (i, layer) in layers.iter().enumerate() {
        let mut winners: Vec<i32> = if scores.is_empty() {
            vec![non_folded[0].seat_number]
        } else {
            let best = layer
                .eligible
                .iter()
                .filter_map(|s| scores.get(s))
                .max()
                .copied()
                .ok_or_else(|| ApiError::invariant("pot with no eligible showdown hands"))?;
            layer
                .eligible
                .iter()
                .copied()
                .filter(|s| scores.get(s) == Some(&best))
                .collect()
        };
        winners.sort_unstable();

        let rake = layer.amount * rake_bps / U256::from(BPS_DENOMINATOR);
        let net = layer.amount - rake;
        house_rake += rake;
        total_pot += layer.amount;

        // Even split; the remainder goes one gwei at a time starting
        // from the lowest seat number
        let n = U256::from(winners.len() as u64);
        let share = net / n;
        let remainder = net % n;
        let mut pot_winners = Vec::with_capacity(winners.len());
        for (j, &seat) in winners.iter().enumerate() {
            let mut amount = share;
            if U256::from(j as u64) < remainder {
                amount += U256::from(1u64);
            }
            *payouts.entry(seat).or_insert(U256::ZERO) += amount;
            let wallet = players
                .iter()
                .find(|p| p.seat_number == seat)
                .map(|p| p.wallet_address.clone())
                .unwrap_or_default();
            pot_winners.push((seat, wallet, amount));
        }

        sqlx::query(
            "UPDATE pots SET amount = $3::numeric, winner_seat_numbers = $4 \
             WHERE hand_id = $1 AND pot_number = $2",
        )
        .bind(hand_id)
        .bind(i as i32)
        .bind(net.to_string())
        .bind(&winners)
        .execute(&mut *conn)
        .await?;

        for &w in &winners {
            if !all_winners.contains(&w) {
                all_winners.push(w);
            }
        }
        end_pots.push(HandEndPot {
            pot_number: i as i32,
            amount: net,
            rake_amount: rake,
            winner_seat_numbers: winners,
            winners: pot_winners,
        });
    }
    all_winners.sort_unstable();

    // Pay winners into their seat sessions; a player who already stood
    // up while all-in is paid straight back to escrow
    for (&seat, &amount) in &payouts {
        if amount.is_zero() {
            continue;
        }
        let wallet = players
            .iter()
            .find(|p| p.seat_number == seat)
            .map(|p| p.wallet_address.clone())
            .ok_or_else(|| ApiError::invariant("payout to a seat with no player"))?;
        match tables::session_for_wallet(&mut *conn, table.id, &wallet).await? {
            Some(session) => tables::credit_session(conn, session.id, amount).await?,
            None => crate::escrow::credit_internal(conn, &wallet, amount).await?,
        }
    }

    if !house_rake.is_zero() {
        let house = format!("{:#x}", state.signer.address());
        crate::escrow::credit_internal(conn, &house, house_rake).await?;
    }

    // Reveal the commitment material
    let secret = hand
        .shuffle_secret
        .as_deref()
        .ok_or_else(|| ApiError::invariant("hand is missing its shuffle secret"))?;
    let (seed_str, nonce_str) = secret
        .split_once(':')
        .ok_or_else(|| ApiError::invariant("malformed shuffle secret"))?;
    let seed: u64 = seed_str
        .parse()
        .map_err(|_| ApiError::invariant("non-numeric shuffle seed"))?;
    if !verify_commitment(seed, nonce_str, &hand.shuffle_seed_hash) {
        return Err(ApiError::invariant(format!(
            "revealed deck does not match the commitment on hand {}",
            hand_id
        )));
    }

    let completed_at = Utc::now();
    sqlx::query(
        "UPDATE hands SET status = 'COMPLETED', current_action_seat = NULL, \
                action_timeout_at = NULL, completed_at = $2, shuffle_seed = $3, \
                deck_nonce = $4, shuffle_secret = NULL \
         WHERE id = $1",
    )
    .bind(hand_id)
    .bind(completed_at)
    .bind(seed_str)
    .bind(nonce_str)
    .execute(&mut *conn)
    .await?;

    let deck_codes: Vec<String> = hand.deck.iter().map(|c| c.code()).collect();
    let community_codes: Vec<String> = hand.community_cards.iter().map(|c| c.code()).collect();
    let end_players: Vec<HandEndPlayer> = players
        .iter()
        .map(|p| HandEndPlayer {
            seat_number: p.seat_number,
            wallet_address: p.wallet_address.clone(),
            status: p.status.as_str().to_string(),
            hole_cards: (p.status != PlayerStatus::Folded)
                .then(|| p.hole_cards.iter().map(|c| c.code()).collect()),
            hand_rank: scores
                .get(&p.seat_number)
                .map(|s| s.category_name().to_string()),
        })
        .collect();
    let end_actions: Vec<HandEndAction> = actions
        .iter()
        .map(|a| HandEndAction {
            seat_number: a.seat_number,
            round: a.round.as_str().to_string(),
            action: a.action.clone(),
            amount: a.amount,
            timestamp: a.created_at,
        })
        .collect();

    let event_payload = payload::hand_end(
        table,
        hand_id,
        &all_winners,
        total_pot,
        seed_str,
        &deck_codes,
        &community_codes,
        completed_at,
        table.per_hand_rake,
        &end_pots,
        &end_players,
        &end_actions,
    );
    events::append(
        conn,
        &state.signer,
        state.config.tee_version,
        EventKind::HandEnd,
        &event_payload,
        None,
        None,
    )
    .await?;

    tracing::info!(
        "hand {} completed; winners {:?}, rake {}",
        hand_id,
        all_winners,
        house_rake
    );
    Ok(())
}
