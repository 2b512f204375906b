//! Poker-table records and per-wallet seat sessions: create/activate,
//! join with buy-in, rebuy, stand up. Every mutation runs in one
//! transaction with its event; seat and wallet uniqueness are enforced
//! by partial unique indexes and re-checked under row locks.

use alloy_primitives::U256;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, Row};

use crate::db::u256_from_text;
use crate::error::ApiError;
use crate::escrow;
use crate::events::{self, EventKind};
use crate::game;
use crate::payload;
use crate::AppState;

#[derive(Clone, Debug)]
pub struct TableRow {
    pub id: i64,
    pub name: String,
    pub minimum_buy_in: U256,
    pub maximum_buy_in: U256,
    pub small_blind: U256,
    pub big_blind: U256,
    /// Basis points, 0..=10000.
    pub per_hand_rake: i32,
    pub max_seat_count: i32,
    pub is_active: bool,
    pub action_timeout_seconds: i32,
    pub hand_start_delay_seconds: i32,
}

#[derive(Clone, Debug)]
pub struct SessionRow {
    pub id: i64,
    pub table_id: i64,
    pub wallet_address: String,
    pub seat_number: i32,
    pub table_balance_gwei: U256,
    pub twitter_handle: Option<String>,
    pub twitter_avatar_url: Option<String>,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Clone, Debug)]
pub struct CreateTableInput {
    pub name: String,
    pub minimum_buy_in: U256,
    pub maximum_buy_in: U256,
    pub small_blind: U256,
    pub big_blind: U256,
    pub per_hand_rake: i32,
    pub max_seat_count: i32,
    pub action_timeout_seconds: i32,
    pub hand_start_delay_seconds: i32,
}

#[derive(Clone, Debug)]
pub struct JoinInput {
    pub table_id: i64,
    pub seat_number: i32,
    pub buy_in_gwei: U256,
}

const TABLE_COLUMNS: &str = "id, name, minimum_buy_in::text AS minimum_buy_in, \
     maximum_buy_in::text AS maximum_buy_in, small_blind::text AS small_blind, \
     big_blind::text AS big_blind, per_hand_rake, max_seat_count, is_active, \
     action_timeout_seconds, hand_start_delay_seconds";

const SESSION_COLUMNS: &str = "id, table_id, wallet_address, seat_number, \
     table_balance_gwei::text AS table_balance_gwei, twitter_handle, twitter_avatar_url, \
     joined_at, left_at, is_active";

pub(crate) fn table_from_row(row: &PgRow) -> Result<TableRow, ApiError> {
    let min: String = row.try_get("minimum_buy_in")?;
    let max: String = row.try_get("maximum_buy_in")?;
    let sb: String = row.try_get("small_blind")?;
    let bb: String = row.try_get("big_blind")?;
    Ok(TableRow {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        minimum_buy_in: u256_from_text(&min)?,
        maximum_buy_in: u256_from_text(&max)?,
        small_blind: u256_from_text(&sb)?,
        big_blind: u256_from_text(&bb)?,
        per_hand_rake: row.try_get("per_hand_rake")?,
        max_seat_count: row.try_get("max_seat_count")?,
        is_active: row.try_get("is_active")?,
        action_timeout_seconds: row.try_get("action_timeout_seconds")?,
        hand_start_delay_seconds: row.try_get("hand_start_delay_seconds")?,
    })
}

pub(crate) fn session_from_row(row: &PgRow) -> Result<SessionRow, ApiError> {
    let balance: String = row.try_get("table_balance_gwei")?;
    Ok(SessionRow {
        id: row.try_get("id")?,
        table_id: row.try_get("table_id")?,
        wallet_address: row.try_get("wallet_address")?,
        seat_number: row.try_get("seat_number")?,
        table_balance_gwei: u256_from_text(&balance)?,
        twitter_handle: row.try_get("twitter_handle")?,
        twitter_avatar_url: row.try_get("twitter_avatar_url")?,
        joined_at: row.try_get("joined_at")?,
        left_at: row.try_get("left_at")?,
        is_active: row.try_get("is_active")?,
    })
}

pub async fn get<'e, E: PgExecutor<'e>>(exec: E, id: i64) -> Result<Option<TableRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM poker_tables WHERE id = $1",
        TABLE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(table_from_row).transpose()
}

pub async fn get_for_update(
    conn: &mut PgConnection,
    id: i64,
) -> Result<Option<TableRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM poker_tables WHERE id = $1 FOR UPDATE",
        TABLE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(table_from_row).transpose()
}

/// Listing row: table plus occupancy and next-hand timing info.
#[derive(Clone, Debug)]
pub struct TableSummary {
    pub table: TableRow,
    pub active_players: i64,
    pub has_open_hand: bool,
    pub next_hand_starts_at: Option<DateTime<Utc>>,
}

pub async fn list<'e, E: PgExecutor<'e>>(exec: E) -> Result<Vec<TableSummary>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {}, \
           (SELECT count(*) FROM table_seat_sessions s \
              WHERE s.table_id = poker_tables.id AND s.is_active) AS active_players, \
           EXISTS(SELECT 1 FROM hands h \
              WHERE h.table_id = poker_tables.id AND h.status <> 'COMPLETED') AS has_open_hand, \
           (SELECT max(h.completed_at) FROM hands h \
              WHERE h.table_id = poker_tables.id AND h.status = 'COMPLETED') AS last_completed_at \
         FROM poker_tables ORDER BY id",
        TABLE_COLUMNS
    ))
    .fetch_all(exec)
    .await?;

    rows.iter()
        .map(|row| {
            let table = table_from_row(row)?;
            let has_open_hand: bool = row.try_get("has_open_hand")?;
            let last_completed_at: Option<DateTime<Utc>> = row.try_get("last_completed_at")?;
            let next_hand_starts_at = if has_open_hand {
                None
            } else {
                last_completed_at
                    .map(|ts| ts + Duration::seconds(table.hand_start_delay_seconds as i64))
            };
            Ok(TableSummary {
                active_players: row.try_get("active_players")?,
                has_open_hand,
                next_hand_starts_at,
                table,
            })
        })
        .collect()
}

pub fn validate_table_input(input: &CreateTableInput) -> Result<(), ApiError> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("table name must not be empty"));
    }
    if input.small_blind.is_zero() || input.big_blind.is_zero() {
        return Err(ApiError::validation("blinds must be strictly positive"));
    }
    if input.small_blind > input.big_blind {
        return Err(ApiError::validation("small blind must not exceed big blind"));
    }
    if input.minimum_buy_in.is_zero() {
        return Err(ApiError::validation("minimum buy-in must be strictly positive"));
    }
    if input.minimum_buy_in > input.maximum_buy_in {
        return Err(ApiError::validation(
            "minimum buy-in must not exceed maximum buy-in",
        ));
    }
    if !(0..=10_000).contains(&input.per_hand_rake) {
        return Err(ApiError::validation("rake must be 0..=10000 basis points"));
    }
    if !(2..=8).contains(&input.max_seat_count) {
        return Err(ApiError::validation("seat count must be 2..=8"));
    }
    if input.action_timeout_seconds <= 0 || input.hand_start_delay_seconds < 0 {
        return Err(ApiError::validation("timeouts must be positive"));
    }
    Ok(())
}

pub async fn create(
    state: &AppState,
    admin: &str,
    input: CreateTableInput,
) -> Result<TableRow, ApiError> {
    validate_table_input(&input)?;

    let mut tx = state.pool.begin().await?;
    let row = sqlx::query(&format!(
        "INSERT INTO poker_tables \
           (name, minimum_buy_in, maximum_buy_in, small_blind, big_blind, per_hand_rake, \
            max_seat_count, is_active, action_timeout_seconds, hand_start_delay_seconds) \
         VALUES ($1, $2::numeric, $3::numeric, $4::numeric, $5::numeric, $6, $7, TRUE, $8, $9) \
         RETURNING {}",
        TABLE_COLUMNS
    ))
    .bind(&input.name)
    .bind(input.minimum_buy_in.to_string())
    .bind(input.maximum_buy_in.to_string())
    .bind(input.small_blind.to_string())
    .bind(input.big_blind.to_string())
    .bind(input.per_hand_rake)
    .bind(input.max_seat_count)
    .bind(input.action_timeout_seconds)
    .bind(input.hand_start_delay_seconds)
    .fetch_one(&mut *tx)
    .await?;
    let table = table_from_row(&row)?;

    let payload = payload::table_admin("create_table", admin, &table, Utc::now());
    events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        EventKind::CreateTable,
        &payload,
        None,
        None,
    )
    .await?;
    tx.commit().await?;

    tracing::info!("table {} created by {}", table.id, admin);
    Ok(table)
}

/// Activate or deactivate; a no-op transition is a conflict. A
/// deactivated table lets its current hand finish but rejects new
/// joins and new hand starts.
pub async fn set_active(
    state: &AppState,
    table_id: i64,
    is_active: bool,
    admin: &str,
) -> Result<TableRow, ApiError> {
    let mut tx = state.pool.begin().await?;
    let table = get_for_update(&mut tx, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    if table.is_active == is_active {
        return Err(ApiError::conflict("table already in requested state"));
    }

    sqlx::query("UPDATE poker_tables SET is_active = $2 WHERE id = $1")
        .bind(table_id)
        .bind(is_active)
        .execute(&mut *tx)
        .await?;
    let table = TableRow { is_active, ..table };

    let (kind, name) = if is_active {
        (EventKind::TableActivated, "table_activated")
    } else {
        (EventKind::TableDeactivated, "table_deactivated")
    };
    let payload = payload::table_admin(name, admin, &table, Utc::now());
    events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        kind,
        &payload,
        None,
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(table)
}

pub async fn active_sessions<'e, E: PgExecutor<'e>>(
    exec: E,
    table_id: i64,
) -> Result<Vec<SessionRow>, ApiError> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM table_seat_sessions \
         WHERE table_id = $1 AND is_active ORDER BY seat_number",
        SESSION_COLUMNS
    ))
    .bind(table_id)
    .fetch_all(exec)
    .await?;
    rows.iter().map(session_from_row).collect()
}

pub async fn session_for_wallet<'e, E: PgExecutor<'e>>(
    exec: E,
    table_id: i64,
    wallet: &str,
) -> Result<Option<SessionRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM table_seat_sessions \
         WHERE table_id = $1 AND wallet_address = $2 AND is_active",
        SESSION_COLUMNS
    ))
    .bind(table_id)
    .bind(wallet)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(session_from_row).transpose()
}

pub async fn session_for_wallet_for_update(
    conn: &mut PgConnection,
    table_id: i64,
    wallet: &str,
) -> Result<Option<SessionRow>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM table_seat_sessions \
         WHERE table_id = $1 AND wallet_address = $2 AND is_active FOR UPDATE",
        SESSION_COLUMNS
    ))
    .bind(table_id)
    .bind(wallet)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(session_from_row).transpose()
}

/// Debit chips from a seat session; the balance never goes negative.
pub async fn debit_session(
    conn: &mut PgConnection,
    session_id: i64,
    amount: U256,
) -> Result<(), ApiError> {
    let updated = sqlx::query(
        "UPDATE table_seat_sessions \
         SET table_balance_gwei = table_balance_gwei - $2::numeric \
         WHERE id = $1 AND table_balance_gwei >= $2::numeric",
    )
    .bind(session_id)
    .bind(amount.to_string())
    .execute(conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::validation("insufficient table balance"));
    }
    Ok(())
}

pub async fn credit_session(
    conn: &mut PgConnection,
    session_id: i64,
    amount: U256,
) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE table_seat_sessions \
         SET table_balance_gwei = table_balance_gwei + $2::numeric \
         WHERE id = $1",
    )
    .bind(session_id)
    .bind(amount.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

/// Seat a wallet: debit escrow by the buy-in, create the session,
/// append `join_table`; then opportunistically try to start a hand.
pub async fn join(
    state: &AppState,
    wallet: &str,
    twitter_handle: Option<&str>,
    twitter_avatar_url: Option<&str>,
    input: JoinInput,
) -> Result<SessionRow, ApiError> {
    let mut tx = state.pool.begin().await?;

    let table = get_for_update(&mut tx, input.table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    if !table.is_active {
        return Err(ApiError::conflict("table is deactivated"));
    }
    if !(0..table.max_seat_count).contains(&input.seat_number) {
        return Err(ApiError::validation("seat number out of range"));
    }
    if input.buy_in_gwei < table.minimum_buy_in || input.buy_in_gwei > table.maximum_buy_in {
        return Err(ApiError::validation("buy-in outside table limits"));
    }

    let account = escrow::get_for_update(&mut tx, wallet).await?;
    if let Some(acct) = &account {
        if acct.has_pending_withdrawal(Utc::now()) {
            return Err(ApiError::conflict("withdrawal pending"));
        }
    }

    let seated_anywhere: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM table_seat_sessions WHERE wallet_address = $1 AND is_active)",
    )
    .bind(wallet)
    .fetch_one(&mut *tx)
    .await?;
    if seated_anywhere {
        return Err(ApiError::conflict("wallet already seated at a table"));
    }

    // Seat availability re-checked under the table row lock
    let seat_taken: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM table_seat_sessions \
         WHERE table_id = $1 AND seat_number = $2 AND is_active)",
    )
    .bind(input.table_id)
    .bind(input.seat_number)
    .fetch_one(&mut *tx)
    .await?;
    if seat_taken {
        return Err(ApiError::conflict("seat occupied"));
    }

    escrow::debit(&mut tx, wallet, input.buy_in_gwei).await?;

    let row = sqlx::query(&format!(
        "INSERT INTO table_seat_sessions \
           (table_id, wallet_address, seat_number, table_balance_gwei, twitter_handle, \
            twitter_avatar_url, is_active) \
         VALUES ($1, $2, $3, $4::numeric, $5, $6, TRUE) \
         RETURNING {}",
        SESSION_COLUMNS
    ))
    .bind(input.table_id)
    .bind(wallet)
    .bind(input.seat_number)
    .bind(input.buy_in_gwei.to_string())
    .bind(twitter_handle)
    .bind(twitter_avatar_url)
    .fetch_one(&mut *tx)
    .await?;
    let session = session_from_row(&row)?;

    let payload = payload::join_table(
        wallet,
        &table,
        input.seat_number,
        input.buy_in_gwei,
        twitter_handle,
        twitter_avatar_url,
        false,
    );
    events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        EventKind::JoinTable,
        &payload,
        Some(wallet),
        None,
    )
    .await?;
    tx.commit().await?;

    if let Err(e) = game::start::maybe_start_hand(state, input.table_id).await {
        match e {
            ApiError::Conflict(_) | ApiError::Validation(_) => {}
            other => tracing::error!("opportunistic hand start failed: {}", other),
        }
    }

    Ok(session)
}

/// Top up a seated wallet outside of a live hand it is playing in.
pub async fn rebuy(
    state: &AppState,
    wallet: &str,
    table_id: i64,
    amount_gwei: U256,
) -> Result<SessionRow, ApiError> {
    if amount_gwei.is_zero() {
        return Err(ApiError::validation("rebuy amount must be positive"));
    }

    let mut tx = state.pool.begin().await?;
    let table = get(&mut *tx, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    let session = session_for_wallet_for_update(&mut tx, table_id, wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("no active session at this table"))?;

    if let Some(hand) = game::state::lock_open_hand(&mut tx, table_id).await? {
        let in_hand: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM hand_players \
             WHERE hand_id = $1 AND wallet_address = $2)",
        )
        .bind(hand.id)
        .bind(wallet)
        .fetch_one(&mut *tx)
        .await?;
        if in_hand {
            return Err(ApiError::conflict("cannot rebuy while in the current hand"));
        }
    }

    let account = escrow::get_for_update(&mut tx, wallet).await?;
    if let Some(acct) = &account {
        if acct.has_pending_withdrawal(Utc::now()) {
            return Err(ApiError::conflict("withdrawal pending"));
        }
    }

    if session.table_balance_gwei + amount_gwei > table.maximum_buy_in {
        return Err(ApiError::validation(
            "rebuy would exceed the table's maximum buy-in",
        ));
    }

    escrow::debit(&mut tx, wallet, amount_gwei).await?;
    credit_session(&mut tx, session.id, amount_gwei).await?;

    let payload = payload::join_table(
        wallet,
        &table,
        session.seat_number,
        amount_gwei,
        session.twitter_handle.as_deref(),
        session.twitter_avatar_url.as_deref(),
        true,
    );
    events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        EventKind::JoinTable,
        &payload,
        Some(wallet),
        None,
    )
    .await?;
    tx.commit().await?;

    session_for_wallet(&state.pool, table_id, wallet)
        .await?
        .ok_or_else(|| ApiError::internal("session vanished after rebuy"))
}

/// Leave the seat, returning the table balance to escrow. A player
/// still ACTIVE in a live hand must fold first.
pub async fn stand_up(state: &AppState, wallet: &str, table_id: i64) -> Result<(), ApiError> {
    let mut tx = state.pool.begin().await?;
    let table = get(&mut *tx, table_id)
        .await?
        .ok_or_else(|| ApiError::not_found("unknown table"))?;
    let session = session_for_wallet_for_update(&mut tx, table_id, wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("no active session at this table"))?;

    if let Some(hand) = game::state::lock_open_hand(&mut tx, table_id).await? {
        let still_active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM hand_players \
             WHERE hand_id = $1 AND wallet_address = $2 AND status = 'ACTIVE')",
        )
        .bind(hand.id)
        .bind(wallet)
        .fetch_one(&mut *tx)
        .await?;
        if still_active {
            return Err(ApiError::conflict("fold the current hand before standing up"));
        }
    }

    escrow::credit_internal(&mut tx, wallet, session.table_balance_gwei).await?;
    sqlx::query(
        "UPDATE table_seat_sessions \
         SET is_active = FALSE, left_at = now(), table_balance_gwei = 0 \
         WHERE id = $1",
    )
    .bind(session.id)
    .execute(&mut *tx)
    .await?;

    let payload = payload::leave_table(
        wallet,
        &table,
        session.seat_number,
        session.table_balance_gwei,
        session.twitter_handle.as_deref(),
        session.twitter_avatar_url.as_deref(),
    );
    events::append(
        &mut tx,
        &state.signer,
        state.config.tee_version,
        EventKind::LeaveTable,
        &payload,
        Some(wallet),
        None,
    )
    .await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CreateTableInput {
        CreateTableInput {
            name: "Main".to_string(),
            minimum_buy_in: U256::from(10_000_000u64),
            maximum_buy_in: U256::from(100_000_000u64),
            small_blind: U256::from(1_000_000u64),
            big_blind: U256::from(2_000_000u64),
            per_hand_rake: 0,
            max_seat_count: 8,
            action_timeout_seconds: 30,
            hand_start_delay_seconds: 5,
        }
    }

    #[test]
    fn test_validate_table_input() {
        assert!(validate_table_input(&input()).is_ok());

        let mut bad = input();
        bad.small_blind = U256::from(3_000_000u64);
        assert!(validate_table_input(&bad).is_err());

        let mut bad = input();
        bad.minimum_buy_in = U256::from(200_000_000u64);
        assert!(validate_table_input(&bad).is_err());

        let mut bad = input();
        bad.per_hand_rake = 10_001;
        assert!(validate_table_input(&bad).is_err());

        let mut bad = input();
        bad.max_seat_count = 9;
        assert!(validate_table_input(&bad).is_err());

        let mut bad = input();
        bad.big_blind = U256::ZERO;
        assert!(validate_table_input(&bad).is_err());
    }
}
