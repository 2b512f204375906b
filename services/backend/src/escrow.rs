//! Escrow ledger: per-wallet balances, withdrawal nonces and the
//! pending-withdrawal reservation, plus the withdrawal signing flow.
//!
//! Every mutation commits in the same transaction as its event. Wallet
//! keys are stored lower-case; a deposit or executed withdrawal is
//! idempotent by txHash.

use alloy_primitives::{B256, U256};
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgExecutor, PgPool, Row};

use crate::error::ApiError;
use crate::events::{self, EventKind, EventRow};
use crate::payload;
use crate::signer::EventSigner;

const GWEI_PER_ETH_UNIT: u64 = 1_000_000_000;

#[derive(Clone, Debug)]
pub struct EscrowAccount {
    pub wallet: String,
    pub balance_gwei: U256,
    pub next_withdrawal_nonce: Option<U256>,
    pub withdrawal_signature_expiry: Option<DateTime<Utc>>,
}

impl EscrowAccount {
    /// A withdrawal is pending iff the expiry is set and in the future.
    pub fn has_pending_withdrawal(&self, now: DateTime<Utc>) -> bool {
        matches!(self.withdrawal_signature_expiry, Some(expiry) if expiry > now)
    }
}

/// Signature handed back to the client for on-chain execution.
#[derive(Clone, Debug)]
pub struct WithdrawalAuthorization {
    pub nonce: U256,
    pub expiry_unix: u64,
    pub digest: B256,
    pub r: U256,
    pub s: U256,
    pub v: u8,
}

fn account_from_row(row: &PgRow) -> Result<EscrowAccount, ApiError> {
    let balance: String = row.try_get("balance_gwei")?;
    let nonce: Option<String> = row.try_get("next_withdrawal_nonce")?;
    Ok(EscrowAccount {
        wallet: row.try_get("wallet")?,
        balance_gwei: crate::db::u256_from_text(&balance)?,
        next_withdrawal_nonce: nonce
            .as_deref()
            .map(crate::db::u256_from_text)
            .transpose()?,
        withdrawal_signature_expiry: row.try_get("withdrawal_signature_expiry")?,
    })
}

const ACCOUNT_COLUMNS: &str = "wallet, balance_gwei::text AS balance_gwei, \
     next_withdrawal_nonce::text AS next_withdrawal_nonce, withdrawal_signature_expiry";

pub async fn get<'e, E: PgExecutor<'e>>(
    exec: E,
    wallet: &str,
) -> Result<Option<EscrowAccount>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM escrow_balances WHERE wallet = $1",
        ACCOUNT_COLUMNS
    ))
    .bind(wallet)
    .fetch_optional(exec)
    .await?;
    row.as_ref().map(account_from_row).transpose()
}

/// Row-locked read inside an open transaction.
pub async fn get_for_update(
    conn: &mut PgConnection,
    wallet: &str,
) -> Result<Option<EscrowAccount>, ApiError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM escrow_balances WHERE wallet = $1 FOR UPDATE",
        ACCOUNT_COLUMNS
    ))
    .bind(wallet)
    .fetch_optional(conn)
    .await?;
    row.as_ref().map(account_from_row).transpose()
}

async fn ensure_row(conn: &mut PgConnection, wallet: &str) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO escrow_balances (wallet) VALUES ($1) ON CONFLICT (wallet) DO NOTHING")
        .bind(wallet)
        .execute(conn)
        .await?;
    Ok(())
}

/// Add to a wallet's balance without appending an event; callers pair
/// this with an event of their own (stand-up, rake attribution).
pub async fn credit_internal(
    conn: &mut PgConnection,
    wallet: &str,
    amount_gwei: U256,
) -> Result<(), ApiError> {
    ensure_row(conn, wallet).await?;
    sqlx::query(
        "UPDATE escrow_balances SET balance_gwei = balance_gwei + $2::numeric WHERE wallet = $1",
    )
    .bind(wallet)
    .bind(amount_gwei.to_string())
    .execute(conn)
    .await?;
    Ok(())
}

/// Debit for seating buy-ins and rebuys; fails if the balance is short.
pub async fn debit(
    conn: &mut PgConnection,
    wallet: &str,
    amount_gwei: U256,
) -> Result<(), ApiError> {
    let updated = sqlx::query(
        "UPDATE escrow_balances \
         SET balance_gwei = balance_gwei - $2::numeric \
         WHERE wallet = $1 AND balance_gwei >= $2::numeric",
    )
    .bind(wallet)
    .bind(amount_gwei.to_string())
    .execute(conn)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::validation("insufficient escrow balance"));
    }
    Ok(())
}

/// Ingest a chain deposit. Returns None when the txHash was already
/// recorded (replay is a no-op).
#[allow(clippy::too_many_arguments)]
pub async fn credit_deposit(
    conn: &mut PgConnection,
    signer: &EventSigner,
    tee_version: i32,
    wallet: &str,
    amount_gwei: U256,
    tx_hash: &str,
    block_number: u64,
    block_ts: DateTime<Utc>,
) -> Result<Option<EventRow>, ApiError> {
    if events::tx_hash_seen(conn, tx_hash).await? {
        return Ok(None);
    }

    credit_internal(conn, wallet, amount_gwei).await?;

    let payload = payload::deposit(wallet, amount_gwei, tx_hash, block_number, block_ts);
    let event = events::append(
        conn,
        signer,
        tee_version,
        EventKind::Deposit,
        &payload,
        Some(wallet),
        None,
    )
    .await?;
    Ok(Some(event))
}

/// Ingest an on-chain withdrawal execution: saturating debit, clear the
/// reservation, append the event. The chain is authoritative, so a
/// nonce mismatch is logged loudly but still applied.
#[allow(clippy::too_many_arguments)]
pub async fn apply_withdrawal_executed(
    conn: &mut PgConnection,
    signer: &EventSigner,
    tee_version: i32,
    wallet: &str,
    amount_gwei: U256,
    nonce: U256,
    tx_hash: &str,
    block_number: u64,
    block_ts: DateTime<Utc>,
) -> Result<Option<EventRow>, ApiError> {
    if events::tx_hash_seen(conn, tx_hash).await? {
        return Ok(None);
    }

    ensure_row(conn, wallet).await?;
    let account = get_for_update(conn, wallet)
        .await?
        .ok_or_else(|| ApiError::internal("escrow row vanished under lock"))?;

    if let Some(stored) = account.next_withdrawal_nonce {
        if stored != nonce {
            tracing::error!(
                "withdrawal nonce mismatch for {}: stored {} chain {}; applying chain value",
                wallet,
                stored,
                nonce
            );
        }
    }

    sqlx::query(
        "UPDATE escrow_balances \
         SET balance_gwei = GREATEST(balance_gwei - $2::numeric, 0), \
             next_withdrawal_nonce = NULL, \
             withdrawal_signature_expiry = NULL \
         WHERE wallet = $1",
    )
    .bind(wallet)
    .bind(amount_gwei.to_string())
    .execute(&mut *conn)
    .await?;

    let payload =
        payload::withdrawal_executed(wallet, amount_gwei, nonce, tx_hash, block_number, block_ts);
    let event = events::append(
        conn,
        signer,
        tee_version,
        EventKind::WithdrawalExecuted,
        &payload,
        Some(wallet),
        Some(nonce),
    )
    .await?;
    Ok(Some(event))
}

/// The withdrawal signing flow, once the contract has answered with the
/// digest and the nonce it requires next. Split out so the reservation
/// logic is testable without an RPC endpoint.
#[allow(clippy::too_many_arguments)]
pub async fn reserve_and_sign(
    pool: &PgPool,
    signer: &EventSigner,
    tee_version: i32,
    wallet: &str,
    to: &str,
    amount_gwei: U256,
    digest: B256,
    contract_nonce: U256,
    expiry_unix: u64,
) -> Result<WithdrawalAuthorization, ApiError> {
    let amount_wei = amount_gwei * U256::from(GWEI_PER_ETH_UNIT);

    let mut tx = pool.begin().await?;

    // Re-check under lock: a single pending withdrawal at a time.
    let account = get_for_update(&mut tx, wallet)
        .await?
        .ok_or_else(|| ApiError::not_found("no escrow balance for wallet"))?;
    if account.has_pending_withdrawal(Utc::now()) {
        return Err(ApiError::conflict("withdrawal already pending"));
    }
    if amount_gwei > account.balance_gwei {
        return Err(ApiError::validation("amount exceeds escrow balance"));
    }

    let expiry_ts = DateTime::from_timestamp(expiry_unix as i64, 0)
        .ok_or_else(|| ApiError::validation("expiry out of range"))?;
    sqlx::query(
        "UPDATE escrow_balances \
         SET next_withdrawal_nonce = $2::numeric, withdrawal_signature_expiry = $3 \
         WHERE wallet = $1",
    )
    .bind(wallet)
    .bind(contract_nonce.to_string())
    .bind(expiry_ts)
    .execute(&mut *tx)
    .await?;

    let payload = payload::withdrawal_request(
        wallet,
        to,
        amount_gwei,
        amount_wei,
        contract_nonce,
        expiry_unix,
        &crate::signer::b256_hex(digest),
    );
    events::append(
        &mut tx,
        signer,
        tee_version,
        EventKind::WithdrawalRequest,
        &payload,
        Some(wallet),
        Some(contract_nonce),
    )
    .await?;

    tx.commit().await?;

    let signed = signer
        .sign_prehash(digest)
        .map_err(|e| ApiError::internal(format!("withdrawal signing failed: {}", e)))?;
    Ok(WithdrawalAuthorization {
        nonce: contract_nonce,
        expiry_unix,
        digest,
        r: signed.r,
        s: signed.s,
        v: signed.v,
    })
}

/// Validate a withdrawal request and compute its expiry; shared between
/// the RPC-backed entry point and tests.
pub fn validate_withdrawal(
    wallet: &str,
    to: &str,
    amount_gwei: U256,
    expiry_seconds: i64,
    account: Option<&EscrowAccount>,
) -> Result<u64, ApiError> {
    if wallet != to {
        return Err(ApiError::validation(
            "withdrawal recipient must equal the paying wallet",
        ));
    }
    if amount_gwei.is_zero() {
        return Err(ApiError::validation("amount must be positive"));
    }
    let account = account.ok_or_else(|| ApiError::not_found("no escrow balance for wallet"))?;
    if amount_gwei > account.balance_gwei {
        return Err(ApiError::validation("amount exceeds escrow balance"));
    }
    if account.has_pending_withdrawal(Utc::now()) {
        return Err(ApiError::conflict("withdrawal already pending"));
    }
    let expiry = Utc::now() + Duration::seconds(expiry_seconds.max(1));
    Ok(expiry.timestamp() as u64)
}

/// Gwei-denominated value of a wei amount, floor division.
pub fn wei_to_gwei(amount_wei: U256) -> U256 {
    amount_wei / U256::from(GWEI_PER_ETH_UNIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(balance: u64, expiry: Option<DateTime<Utc>>) -> EscrowAccount {
        EscrowAccount {
            wallet: "0x1111111111111111111111111111111111111111".to_string(),
            balance_gwei: U256::from(balance),
            next_withdrawal_nonce: None,
            withdrawal_signature_expiry: expiry,
        }
    }

    #[test]
    fn test_pending_requires_future_expiry() {
        let now = Utc::now();
        assert!(!account(1, None).has_pending_withdrawal(now));
        assert!(!account(1, Some(now - Duration::seconds(5))).has_pending_withdrawal(now));
        assert!(account(1, Some(now + Duration::seconds(5))).has_pending_withdrawal(now));
    }

    #[test]
    fn test_validate_withdrawal_rules() {
        let w = "0x1111111111111111111111111111111111111111";
        let other = "0x2222222222222222222222222222222222222222";
        let acct = account(10_000_000, None);

        assert!(matches!(
            validate_withdrawal(w, other, U256::from(1u64), 60, Some(&acct)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_withdrawal(w, w, U256::ZERO, 60, Some(&acct)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_withdrawal(w, w, U256::from(10_000_001u64), 60, Some(&acct)),
            Err(ApiError::Validation(_))
        ));
        assert!(matches!(
            validate_withdrawal(w, w, U256::from(1u64), 60, None),
            Err(ApiError::NotFound(_))
        ));

        let pending = account(10_000_000, Some(Utc::now() + Duration::seconds(60)));
        assert!(matches!(
            validate_withdrawal(w, w, U256::from(1u64), 60, Some(&pending)),
            Err(ApiError::Conflict(_))
        ));

        assert!(validate_withdrawal(w, w, U256::from(5_000_000u64), 60, Some(&acct)).is_ok());
    }

    #[test]
    fn test_wei_to_gwei_floors() {
        assert_eq!(
            wei_to_gwei(U256::from(1_999_999_999u64)),
            U256::from(1u64)
        );
        assert_eq!(wei_to_gwei(U256::from(123u64)), U256::ZERO);
    }
}
