//! Caller identity extraction.
//!
//! Authentication (wallet signatures, Twitter OAuth, admin session)
//! happens in middleware outside this service; the core trusts the
//! identity headers it forwards but still checks shape and admin
//! membership before acting on them.

use axum::http::HeaderMap;

use crate::config::AppConfig;
use crate::error::ApiError;
use crate::wallet;

pub struct TwitterIdentity {
    pub handle: Option<String>,
    pub avatar_url: Option<String>,
}

fn header_string(headers: &HeaderMap, key: &str) -> Option<String> {
    headers
        .get(key)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// The authenticated wallet, normalized to lower-case.
pub fn wallet_from_headers(headers: &HeaderMap) -> Result<String, ApiError> {
    let raw = header_string(headers, "x-wallet-address")
        .ok_or_else(|| ApiError::unauthorized("missing wallet identity"))?;
    wallet::normalize(&raw).map_err(|_| ApiError::unauthorized("malformed wallet identity"))
}

/// The authenticated admin; must appear in ADMIN_ADDRESSES.
pub fn admin_from_headers(config: &AppConfig, headers: &HeaderMap) -> Result<String, ApiError> {
    let raw = header_string(headers, "x-admin-address")
        .ok_or_else(|| ApiError::unauthorized("missing admin identity"))?;
    let address =
        wallet::normalize(&raw).map_err(|_| ApiError::unauthorized("malformed admin identity"))?;
    if !config.is_admin(&address) {
        return Err(ApiError::unauthorized("not an admin"));
    }
    Ok(address)
}

pub fn twitter_from_headers(headers: &HeaderMap) -> TwitterIdentity {
    TwitterIdentity {
        handle: header_string(headers, "x-twitter-handle"),
        avatar_url: header_string(headers, "x-twitter-avatar-url"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_wallet_from_headers() {
        let mut headers = HeaderMap::new();
        assert!(wallet_from_headers(&headers).is_err());

        headers.insert(
            "x-wallet-address",
            HeaderValue::from_static("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B"),
        );
        assert_eq!(
            wallet_from_headers(&headers).unwrap(),
            "0xab5801a7d398351b8be11c439e05c5b3259aec9b"
        );

        headers.insert("x-wallet-address", HeaderValue::from_static("garbage"));
        assert!(wallet_from_headers(&headers).is_err());
    }
}
