//! Wallet address normalization.
//!
//! Addresses are compared case-insensitively, stored lower-case and
//! rendered in EIP-55 checksum form on the way out.

use alloy_primitives::Address;

use crate::error::ApiError;

/// Validate and normalize an address to lower-case hex.
pub fn normalize(addr: &str) -> Result<String, ApiError> {
    let parsed: Address = addr
        .trim()
        .parse()
        .map_err(|_| ApiError::validation(format!("invalid wallet address: {:?}", addr)))?;
    Ok(format!("{:#x}", parsed))
}

/// EIP-55 checksum rendering of a stored (lower-case) address.
pub fn checksum(addr: &str) -> String {
    match addr.parse::<Address>() {
        Ok(parsed) => parsed.to_checksum(None),
        Err(_) => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases() {
        let n = normalize("0x1111111111111111111111111111111111111111").unwrap();
        assert_eq!(n, "0x1111111111111111111111111111111111111111");
        let mixed = normalize("0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B").unwrap();
        assert_eq!(mixed, "0xab5801a7d398351b8be11c439e05c5b3259aec9b");
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize("not-an-address").is_err());
        assert!(normalize("0x1234").is_err());
    }

    #[test]
    fn test_checksum_round_trip() {
        let lower = "0xab5801a7d398351b8be11c439e05c5b3259aec9b";
        assert_eq!(checksum(lower), "0xAb5801a7D398351b8bE11C439e05C5B3259aeC9B");
    }
}
