//! Hand row types and loaders.

use std::collections::HashMap;

use alloy_primitives::U256;
use chrono::{DateTime, Utc};
use poker_core::{Card, Contribution, PlayerStatus, SeatRound};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, Row};

use crate::db::u256_from_text;
use crate::error::ApiError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandStatus {
    Shuffling,
    PreFlop,
    Flop,
    Turn,
    River,
    Completed,
}

impl HandStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HandStatus::Shuffling => "SHUFFLING",
            HandStatus::PreFlop => "PRE_FLOP",
            HandStatus::Flop => "FLOP",
            HandStatus::Turn => "TURN",
            HandStatus::River => "RIVER",
            HandStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SHUFFLING" => Some(HandStatus::Shuffling),
            "PRE_FLOP" => Some(HandStatus::PreFlop),
            "FLOP" => Some(HandStatus::Flop),
            "TURN" => Some(HandStatus::Turn),
            "RIVER" => Some(HandStatus::River),
            "COMPLETED" => Some(HandStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Round {
    PreFlop,
    Flop,
    Turn,
    River,
}

impl Round {
    pub fn as_str(self) -> &'static str {
        match self {
            Round::PreFlop => "PRE_FLOP",
            Round::Flop => "FLOP",
            Round::Turn => "TURN",
            Round::River => "RIVER",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PRE_FLOP" => Some(Round::PreFlop),
            "FLOP" => Some(Round::Flop),
            "TURN" => Some(Round::Turn),
            "RIVER" => Some(Round::River),
            _ => None,
        }
    }

    pub fn next(self) -> Option<Round> {
        match self {
            Round::PreFlop => Some(Round::Flop),
            Round::Flop => Some(Round::Turn),
            Round::Turn => Some(Round::River),
            Round::River => None,
        }
    }

    /// Community cards dealt when this round opens.
    pub fn cards_dealt(self) -> usize {
        match self {
            Round::PreFlop => 0,
            Round::Flop => 3,
            Round::Turn | Round::River => 1,
        }
    }

    pub fn matching_status(self) -> HandStatus {
        match self {
            Round::PreFlop => HandStatus::PreFlop,
            Round::Flop => HandStatus::Flop,
            Round::Turn => HandStatus::Turn,
            Round::River => HandStatus::River,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HandRow {
    pub id: i64,
    pub table_id: i64,
    pub status: HandStatus,
    pub round: Option<Round>,
    pub dealer_position: i32,
    pub small_blind_seat: i32,
    pub big_blind_seat: i32,
    pub current_action_seat: Option<i32>,
    pub current_bet: U256,
    pub last_raise_amount: U256,
    pub deck: Vec<Card>,
    pub deck_position: i32,
    pub community_cards: Vec<Card>,
    pub shuffle_seed_hash: String,
    /// Revealed only when COMPLETED.
    pub shuffle_seed: Option<String>,
    pub deck_nonce: Option<String>,
    /// `seed:nonce`, cleared on completion; never serialized anywhere.
    pub shuffle_secret: Option<String>,
    pub action_timeout_at: Option<DateTime<Utc>>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct HandPlayerRow {
    pub hand_id: i64,
    pub seat_number: i32,
    pub wallet_address: String,
    pub status: PlayerStatus,
    /// Chips committed in the current betting round.
    pub chips_committed: U256,
    pub hole_cards: Vec<Card>,
}

#[derive(Clone, Debug)]
pub struct HandActionRow {
    pub id: i64,
    pub hand_id: i64,
    pub seat_number: i32,
    pub round: Round,
    pub action: String,
    pub amount: Option<U256>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct PotRow {
    pub hand_id: i64,
    pub pot_number: i32,
    pub amount: U256,
    pub eligible_seat_numbers: Vec<i32>,
    pub winner_seat_numbers: Option<Vec<i32>>,
}

pub const HAND_COLUMNS: &str = "id, table_id, status, round, dealer_position, small_blind_seat, \
     big_blind_seat, current_action_seat, current_bet::text AS current_bet, \
     last_raise_amount::text AS last_raise_amount, deck, deck_position, community_cards, \
     shuffle_seed_hash, shuffle_seed, deck_nonce, shuffle_secret, action_timeout_at, \
     started_at, completed_at";

fn cards_from_json(text: &str) -> Result<Vec<Card>, ApiError> {
    serde_json::from_str(text)
        .map_err(|e| ApiError::invariant(format!("unreadable card list in storage: {}", e)))
}

pub fn cards_to_json(cards: &[Card]) -> String {
    serde_json::to_string(cards).unwrap_or_else(|_| "[]".to_string())
}

pub fn hand_from_row(row: &PgRow) -> Result<HandRow, ApiError> {
    let status: String = row.try_get("status")?;
    let round: Option<String> = row.try_get("round")?;
    let current_bet: String = row.try_get("current_bet")?;
    let last_raise: String = row.try_get("last_raise_amount")?;
    let deck: String = row.try_get("deck")?;
    let community: String = row.try_get("community_cards")?;
    Ok(HandRow {
        id: row.try_get("id")?,
        table_id: row.try_get("table_id")?,
        status: HandStatus::parse(&status)
            .ok_or_else(|| ApiError::invariant(format!("unknown hand status {:?}", status)))?,
        round: round
            .as_deref()
            .map(|r| {
                Round::parse(r)
                    .ok_or_else(|| ApiError::invariant(format!("unknown round {:?}", r)))
            })
            .transpose()?,
        dealer_position: row.try_get("dealer_position")?,
        small_blind_seat: row.try_get("small_blind_seat")?,
        big_blind_seat: row.try_get("big_blind_seat")?,
        current_action_seat: row.try_get("current_action_seat")?,
        current_bet: u256_from_text(&current_bet)?,
        last_raise_amount: u256_from_text(&last_raise)?,
        deck: cards_from_json(&deck)?,
        deck_position: row.try_get("deck_position")?,
        community_cards: cards_from_json(&community)?,
        shuffle_seed_hash: row.try_get("shuffle_seed_hash")?,
        shuffle_seed: row.try_get("shuffle_seed")?,
        deck_nonce: row.try_get("deck_nonce")?,
        shuffle_secret: row.try_get("shuffle_secret")?,
        action_timeout_at: row.try_get("action_timeout_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

fn player_from_row(row: &PgRow) -> Result<HandPlayerRow, ApiError> {
    let status: String = row.try_get("status")?;
    let committed: String = row.try_get("chips_committed")?;
    let hole: String = row.try_get("hole_cards")?;
    Ok(HandPlayerRow {
        hand_id: row.try_get("hand_id")?,
        seat_number: row.try_get("seat_number")?,
        wallet_address: row.try_get("wallet_address")?,
        status: PlayerStatus::parse(&status)
            .ok_or_else(|| ApiError::invariant(format!("unknown player status {:?}", status)))?,
        chips_committed: u256_from_text(&committed)?,
        hole_cards: cards_from_json(&hole)?,
    })
}

fn action_from_row(row: &PgRow) -> Result<HandActionRow, ApiError> {
    let round: String = row.try_get("round")?;
    let amount: Option<String> = row.try_get("amount")?;
    Ok(HandActionRow {
        id: row.try_get("id")?,
        hand_id: row.try_get("hand_id")?,
        seat_number: row.try_get("seat_number")?,
        round: Round::parse(&round)
            .ok_or_else(|| ApiError::invariant(format!("unknown action round {:?}", round)))?,
        action: row.try_get("action")?,
        amount: amount.as_deref().map(u256_from_text).transpose()?,
        created_at: row.try_get("created_at")?,
    })
}

fn pot_from_row(row: &PgRow) -> Result<PotRow, ApiError> {
    let amount: String = row.try_get("amount")?;
    Ok(PotRow {
        hand_id: row.try_get("hand_id")?,
        pot_number: row.try_get("pot_number")?,
        amount: u256_from_text(&amount)?,
        eligible_seat_numbers: row.try_get("eligible_seat_numbers")?,
        winner_seat_numbers: row.try_get("winner_seat_numbers")?,
    })
}

/// The table's non-completed hand, locked for this transaction.
pub async fn lock_open_hand(
    conn: &mut PgConnection,
    table_id: i64,
) -> Result<Option<HandRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM hands WHERE table_id = $1 AND status <> 'COMPLETED' FOR UPDATE",
        HAND_COLUMNS
    ))
    .bind(table_id)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(hand_from_row).transpose()
}

pub async fn open_hand<'e, E: PgExecutor<'e>>(
    exec: E,
    table_id: i64,
) -> Result<Option<HandRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM hands WHERE table_id = $1 AND status <> 'COMPLETED'",
        HAND_COLUMNS
    ))
    .bind(table_id)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(hand_from_row).transpose()
}

pub async fn hand_by_id<'e, E: PgExecutor<'e>>(
    exec: E,
    hand_id: i64,
) -> Result<Option<HandRow>, ApiError> {
    let row = sqlx::query(&format!("SELECT {} FROM hands WHERE id = $1", HAND_COLUMNS))
        .bind(hand_id)
        .fetch_optional(exec)
        .await?;
    row.as_ref().map(hand_from_row).transpose()
}

pub async fn lock_hand_by_id(
    conn: &mut PgConnection,
    hand_id: i64,
) -> Result<Option<HandRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM hands WHERE id = $1 FOR UPDATE",
        HAND_COLUMNS
    ))
    .bind(hand_id)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(hand_from_row).transpose()
}

pub async fn latest_completed_hand<'e, E: PgExecutor<'e>>(
    exec: E,
    table_id: i64,
) -> Result<Option<HandRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM hands WHERE table_id = $1 AND status = 'COMPLETED' \
         ORDER BY completed_at DESC LIMIT 1",
        HAND_COLUMNS
    ))
    .bind(table_id)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(hand_from_row).transpose()
}

const PLAYER_COLUMNS: &str = "hand_id, seat_number, wallet_address, status, \
     chips_committed::text AS chips_committed, hole_cards";

pub async fn players<'e, E: PgExecutor<'e>>(
    exec: E,
    hand_id: i64,
) -> Result<Vec<HandPlayerRow>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM hand_players WHERE hand_id = $1 ORDER BY seat_number",
        PLAYER_COLUMNS
    ))
    .bind(hand_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(player_from_row).collect()
}

pub async fn players_for_update(
    conn: &mut PgConnection,
    hand_id: i64,
) -> Result<Vec<HandPlayerRow>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM hand_players WHERE hand_id = $1 ORDER BY seat_number FOR UPDATE",
        PLAYER_COLUMNS
    ))
    .bind(hand_id)
    .fetch_all(conn)
    .await?;
    rows.iter().map(player_from_row).collect()
}

pub async fn actions<'e, E: PgExecutor<'e>>(
    exec: E,
    hand_id: i64,
) -> Result<Vec<HandActionRow>, ApiError> {
    let rows = sqlx::query(
        "SELECT id, hand_id, seat_number, round, action, amount::text AS amount, created_at \
         FROM hand_actions WHERE hand_id = $1 ORDER BY id",
    )
    .bind(hand_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(action_from_row).collect()
}

pub async fn pots<'e, E: PgExecutor<'e>>(exec: E, hand_id: i64) -> Result<Vec<PotRow>, ApiError> {
    let rows = sqlx::query(
        "SELECT hand_id, pot_number, amount::text AS amount, eligible_seat_numbers, \
                winner_seat_numbers \
         FROM pots WHERE hand_id = $1 ORDER BY pot_number",
    )
    .bind(hand_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(pot_from_row).collect()
}

/// Record one hand action row.
pub async fn record_action(
    conn: &mut PgConnection,
    hand_id: i64,
    seat_number: i32,
    round: Round,
    action: &str,
    amount: Option<U256>,
) -> Result<(), ApiError> {
    sqlx::query(
        "INSERT INTO hand_actions (hand_id, seat_number, round, action, amount) \
         VALUES ($1, $2, $3, $4, $5::numeric)",
    )
    .bind(hand_id)
    .bind(seat_number)
    .bind(round.as_str())
    .bind(action)
    .bind(amount.map(|a| a.to_string()))
    .execute(conn)
    .await?;
    Ok(())
}

/// Per-seat total committed across the hand, from the action history.
pub fn totals_per_seat(actions: &[HandActionRow]) -> HashMap<i32, U256> {
    let mut totals = HashMap::new();
    for a in actions {
        if let Some(amount) = a.amount {
            *totals.entry(a.seat_number).or_insert(U256::ZERO) += amount;
        }
    }
    totals
}

/// Full-hand contribution list for pot layering.
pub fn contributions(
    players: &[HandPlayerRow],
    actions: &[HandActionRow],
) -> Vec<Contribution> {
    let totals = totals_per_seat(actions);
    players
        .iter()
        .map(|p| Contribution {
            seat: p.seat_number,
            total: totals.get(&p.seat_number).copied().unwrap_or(U256::ZERO),
            folded: p.status == PlayerStatus::Folded,
        })
        .collect()
}

/// Current-round view for the betting predicates: a seat has "acted"
/// once it has a non-POST_BLIND action this round.
pub fn seat_rounds(
    players: &[HandPlayerRow],
    actions: &[HandActionRow],
    round: Round,
) -> Vec<SeatRound> {
    players
        .iter()
        .map(|p| SeatRound {
            seat: p.seat_number,
            status: p.status,
            committed: p.chips_committed,
            acted: actions.iter().any(|a| {
                a.seat_number == p.seat_number && a.round == round && a.action != "POST_BLIND"
            }),
        })
        .collect()
}
