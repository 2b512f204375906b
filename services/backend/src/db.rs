//! Database pool and NUMERIC <-> U256 plumbing.
//!
//! All 256-bit amounts live in NUMERIC columns; queries read them with
//! `::text` casts and write them by binding decimal strings through
//! `$n::numeric`, so no floating point ever touches an amount.

use std::str::FromStr;

use alloy_primitives::U256;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::ApiError;

pub async fn connect(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(16)
        .connect(database_url)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Parse a decimal string produced by a `::text` cast.
pub fn u256_from_text(s: &str) -> Result<U256, ApiError> {
    U256::from_str(s.trim())
        .map_err(|_| ApiError::invariant(format!("non-numeric amount in storage: {:?}", s)))
}

/// Parse a request-supplied decimal amount.
pub fn u256_from_input(s: &str, field: &str) -> Result<U256, ApiError> {
    U256::from_str(s.trim())
        .map_err(|_| ApiError::validation(format!("{} must be a decimal integer", field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u256_from_text() {
        assert_eq!(u256_from_text("0").unwrap(), U256::ZERO);
        assert_eq!(
            u256_from_text("50000000").unwrap(),
            U256::from(50_000_000u64)
        );
        assert!(u256_from_text("12.5").is_err());
        assert!(u256_from_text("abc").is_err());
    }
}
