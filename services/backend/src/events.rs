//! The signed append-only event log — the single authority on what
//! happened. Appends run on the caller's open transaction so domain
//! mutations and their events commit atomically; an insert trigger
//! broadcasts `{eventId, tableId, kind}` on the `new_event` channel
//! and a second trigger rejects UPDATE/DELETE outright.

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use crate::error::ApiError;
use crate::payload::{extract_hand_id, extract_table_id};
use crate::signer::{b256_hex, hex32, parse_b256, parse_u256_hex, EventSigner};

/// Closed enumeration of log entry kinds; unknown kinds are rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Deposit,
    WithdrawalRequest,
    WithdrawalExecuted,
    CreateTable,
    TableActivated,
    TableDeactivated,
    JoinTable,
    LeaveTable,
    HandStart,
    CommunityCards,
    Bet,
    HandEnd,
    LeaderboardReset,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Deposit => "deposit",
            EventKind::WithdrawalRequest => "withdrawal_request",
            EventKind::WithdrawalExecuted => "withdrawal_executed",
            EventKind::CreateTable => "create_table",
            EventKind::TableActivated => "table_activated",
            EventKind::TableDeactivated => "table_deactivated",
            EventKind::JoinTable => "join_table",
            EventKind::LeaveTable => "leave_table",
            EventKind::HandStart => "hand_start",
            EventKind::CommunityCards => "community_cards",
            EventKind::Bet => "bet",
            EventKind::HandEnd => "hand_end",
            EventKind::LeaderboardReset => "leaderboard_reset",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deposit" => Some(EventKind::Deposit),
            "withdrawal_request" => Some(EventKind::WithdrawalRequest),
            "withdrawal_executed" => Some(EventKind::WithdrawalExecuted),
            "create_table" => Some(EventKind::CreateTable),
            "table_activated" => Some(EventKind::TableActivated),
            "table_deactivated" => Some(EventKind::TableDeactivated),
            "join_table" => Some(EventKind::JoinTable),
            "leave_table" => Some(EventKind::LeaveTable),
            "hand_start" => Some(EventKind::HandStart),
            "community_cards" => Some(EventKind::CommunityCards),
            "bet" => Some(EventKind::Bet),
            "hand_end" => Some(EventKind::HandEnd),
            "leaderboard_reset" => Some(EventKind::LeaderboardReset),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventRow {
    pub event_id: i64,
    pub block_ts: DateTime<Utc>,
    pub kind: String,
    pub payload_json: String,
    pub digest: String,
    pub sig_r: String,
    pub sig_s: String,
    pub sig_v: i16,
    /// Decimal string; withdrawal events carry one.
    pub nonce: Option<String>,
    pub player: Option<String>,
    pub table_id: Option<i64>,
    pub hand_id: Option<i64>,
    pub tee_version: i32,
    pub tee_pubkey: String,
    pub ingested_at: DateTime<Utc>,
}

const EVENT_COLUMNS: &str = "event_id, block_ts, kind, payload_json, digest, sig_r, sig_s, \
     sig_v, nonce::text AS nonce, player, table_id, hand_id, tee_version, tee_pubkey, ingested_at";

fn event_from_row(row: &PgRow) -> Result<EventRow, sqlx::Error> {
    Ok(EventRow {
        event_id: row.try_get("event_id")?,
        block_ts: row.try_get("block_ts")?,
        kind: row.try_get("kind")?,
        payload_json: row.try_get("payload_json")?,
        digest: row.try_get("digest")?,
        sig_r: row.try_get("sig_r")?,
        sig_s: row.try_get("sig_s")?,
        sig_v: row.try_get("sig_v")?,
        nonce: row.try_get("nonce")?,
        player: row.try_get("player")?,
        table_id: row.try_get("table_id")?,
        hand_id: row.try_get("hand_id")?,
        tee_version: row.try_get("tee_version")?,
        tee_pubkey: row.try_get("tee_pubkey")?,
        ingested_at: row.try_get("ingested_at")?,
    })
}

/// Sign and append one event on the caller's transaction.
pub async fn append(
    conn: &mut PgConnection,
    signer: &EventSigner,
    tee_version: i32,
    kind: EventKind,
    payload_json: &str,
    player: Option<&str>,
    nonce: Option<U256>,
) -> Result<EventRow, ApiError> {
    let block_ts = Utc::now();
    let signed = signer
        .sign_event(kind.as_str(), payload_json, nonce)
        .map_err(|e| ApiError::internal(format!("event signing failed: {}", e)))?;

    let table_id = extract_table_id(payload_json);
    let hand_id = extract_hand_id(payload_json);
    let tee_pubkey = format!("{:#x}", signer.address());

    let row = sqlx::query(&format!(
        "INSERT INTO events \
           (block_ts, kind, payload_json, digest, sig_r, sig_s, sig_v, nonce, player, \
            table_id, hand_id, tee_version, tee_pubkey) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8::numeric, $9, $10, $11, $12, $13) \
         RETURNING {}",
        EVENT_COLUMNS
    ))
    .bind(block_ts)
    .bind(kind.as_str())
    .bind(payload_json)
    .bind(b256_hex(signed.digest))
    .bind(hex32(signed.r))
    .bind(hex32(signed.s))
    .bind(signed.v as i16)
    .bind(nonce.map(|n| n.to_string()))
    .bind(player)
    .bind(table_id)
    .bind(hand_id)
    .bind(tee_version)
    .bind(&tee_pubkey)
    .fetch_one(conn)
    .await?;

    let event = event_from_row(&row)?;

    // Freshly written events must verify; anything else is corrupted
    // storage or the wrong key.
    if !verify_row(signer, &event) {
        return Err(ApiError::invariant(format!(
            "freshly appended event {} does not verify",
            event.event_id
        )));
    }

    Ok(event)
}

/// Recompute the digest from stored fields and recover the signer.
pub fn verify_row(signer: &EventSigner, event: &EventRow) -> bool {
    let (Some(digest), Some(r), Some(s)) = (
        parse_b256(&event.digest),
        parse_u256_hex(&event.sig_r),
        parse_u256_hex(&event.sig_s),
    ) else {
        return false;
    };
    let nonce = match event.nonce.as_deref() {
        Some(text) => match U256::from_str_radix(text, 10) {
            Ok(n) => Some(n),
            Err(_) => return false,
        },
        None => None,
    };
    let Ok(expected) = event.tee_pubkey.parse::<Address>() else {
        return false;
    };
    signer.verify_event(
        &event.kind,
        &event.payload_json,
        nonce,
        digest,
        r,
        s,
        event.sig_v as u8,
        expected,
    )
}

/// Most recent events, newest first.
pub async fn tail(pool: &PgPool, limit: i64) -> Result<Vec<EventRow>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM events ORDER BY event_id DESC LIMIT $1",
        EVENT_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(|r| Ok(event_from_row(r)?)).collect()
}

/// One page of events, newest first, plus the total count.
pub async fn page(pool: &PgPool, page: i64, limit: i64) -> Result<(Vec<EventRow>, i64), ApiError> {
    let offset = (page.max(1) - 1) * limit;
    let rows = sqlx::query(&format!(
        "SELECT {} FROM events ORDER BY event_id DESC LIMIT $1 OFFSET $2",
        EVENT_COLUMNS
    ))
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    let events: Vec<EventRow> = rows
        .iter()
        .map(event_from_row)
        .collect::<Result<_, _>>()?;

    let total: i64 = sqlx::query_scalar("SELECT count(*) FROM events")
        .fetch_one(pool)
        .await?;
    Ok((events, total))
}

pub async fn by_id(pool: &PgPool, event_id: i64) -> Result<Option<EventRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM events WHERE event_id = $1",
        EVENT_COLUMNS
    ))
    .bind(event_id)
    .fetch_optional(pool)
    .await?;
    Ok(match row {
        Some(r) => Some(event_from_row(&r)?),
        None => None,
    })
}

/// Per-hand audit trail, oldest first.
pub async fn by_hand(pool: &PgPool, hand_id: i64) -> Result<Vec<EventRow>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM events WHERE hand_id = $1 ORDER BY event_id ASC",
        EVENT_COLUMNS
    ))
    .bind(hand_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(|r| Ok(event_from_row(r)?)).collect()
}

/// Resume query backing the SSE stream: events for a table after a
/// given id, oldest first.
pub async fn by_table_since(
    pool: &PgPool,
    table_id: i64,
    after_event_id: i64,
    limit: i64,
) -> Result<Vec<EventRow>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM events WHERE table_id = $1 AND event_id > $2 \
         ORDER BY event_id ASC LIMIT $3",
        EVENT_COLUMNS
    ))
    .bind(table_id)
    .bind(after_event_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(|r| Ok(event_from_row(r)?)).collect()
}

/// Idempotency probe for chain ingestion: has this txHash already been
/// recorded by a deposit or withdrawal_executed event?
pub async fn tx_hash_seen(conn: &mut PgConnection, tx_hash: &str) -> Result<bool, ApiError> {
    let needle = format!("\"txHash\":\"{}\"", tx_hash);
    let seen: bool = sqlx::query_scalar(
        "SELECT EXISTS( \
           SELECT 1 FROM events \
           WHERE kind IN ('deposit', 'withdrawal_executed') \
             AND payload_json LIKE '%' || $1 || '%')",
    )
    .bind(needle)
    .fetch_one(conn)
    .await?;
    Ok(seen)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in [
            EventKind::Deposit,
            EventKind::WithdrawalRequest,
            EventKind::WithdrawalExecuted,
            EventKind::CreateTable,
            EventKind::TableActivated,
            EventKind::TableDeactivated,
            EventKind::JoinTable,
            EventKind::LeaveTable,
            EventKind::HandStart,
            EventKind::CommunityCards,
            EventKind::Bet,
            EventKind::HandEnd,
            EventKind::LeaderboardReset,
        ] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("unknown_kind"), None);
    }
}
