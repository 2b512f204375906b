//! EIP-712 signing and verification for the event log.
//!
//! Every event is signed by the trusted key over the typed payload
//! `RPCPayload{kind, payload, nonce}` under a fixed domain. Readers
//! recompute the digest from the stored fields and recover the signer
//! address; a mismatch means corrupted storage or the wrong key.

use alloy::signers::local::{coins_bip39::English, MnemonicBuilder, PrivateKeySigner};
use alloy::signers::SignerSync;
use alloy::sol;
use alloy::sol_types::{eip712_domain, Eip712Domain, SolStruct};
use alloy_primitives::{Address, PrimitiveSignature, B256, U256};

sol! {
    struct RPCPayload {
        string kind;
        string payload;
        uint256 nonce;
    }
}

/// A digest plus its secp256k1 signature components.
#[derive(Clone, Debug)]
pub struct SignedDigest {
    pub digest: B256,
    pub r: U256,
    pub s: U256,
    /// Legacy recovery id, 27 or 28.
    pub v: u8,
}

pub struct EventSigner {
    signer: PrivateKeySigner,
    domain: Eip712Domain,
    address: Address,
}

impl EventSigner {
    /// Derive the trusted key at the default path from the configured
    /// mnemonic. The mnemonic itself is never logged.
    pub fn from_mnemonic(mnemonic: &str, chain_id: u64) -> anyhow::Result<Self> {
        let signer = MnemonicBuilder::<English>::default()
            .phrase(mnemonic.trim())
            .index(0)?
            .build()?;
        let address = signer.address();
        let domain = eip712_domain! {
            name: "CloutCardsEvents",
            version: "1",
            chain_id: chain_id,
            verifying_contract: Address::ZERO,
        };
        Ok(Self {
            signer,
            domain,
            address,
        })
    }

    /// The published "TEE public key" address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Typed-data hash of (domain, kind, payload, nonce). An absent
    /// nonce signs as 0.
    pub fn event_digest(&self, kind: &str, payload_json: &str, nonce: Option<U256>) -> B256 {
        let typed = RPCPayload {
            kind: kind.to_string(),
            payload: payload_json.to_string(),
            nonce: nonce.unwrap_or(U256::ZERO),
        };
        typed.eip712_signing_hash(&self.domain)
    }

    pub fn sign_event(
        &self,
        kind: &str,
        payload_json: &str,
        nonce: Option<U256>,
    ) -> anyhow::Result<SignedDigest> {
        let digest = self.event_digest(kind, payload_json, nonce);
        self.sign_prehash(digest)
    }

    /// Sign an externally computed 32-byte digest (the withdrawal
    /// authorization path signs the contract's own digest).
    pub fn sign_prehash(&self, digest: B256) -> anyhow::Result<SignedDigest> {
        let sig = self.signer.sign_hash_sync(&digest)?;
        Ok(SignedDigest {
            digest,
            r: sig.r(),
            s: sig.s(),
            v: 27 + sig.v() as u8,
        })
    }

    /// Recompute the digest from stored fields and check both the
    /// stored digest and the recovered signer.
    pub fn verify_event(
        &self,
        kind: &str,
        payload_json: &str,
        nonce: Option<U256>,
        stored_digest: B256,
        r: U256,
        s: U256,
        v: u8,
        expected: Address,
    ) -> bool {
        let digest = self.event_digest(kind, payload_json, nonce);
        if digest != stored_digest {
            return false;
        }
        matches!(recover_signer(digest, r, s, v), Some(addr) if addr == expected)
    }
}

/// Recover the signing address from a prehash and r/s/v components.
pub fn recover_signer(digest: B256, r: U256, s: U256, v: u8) -> Option<Address> {
    if v != 27 && v != 28 {
        return None;
    }
    let sig = PrimitiveSignature::from_scalars_and_parity(B256::from(r), B256::from(s), v == 28);
    sig.recover_address_from_prehash(&digest).ok()
}

/// 0x-prefixed, 32-byte zero-padded hex for signature scalars and digests.
pub fn hex32(value: U256) -> String {
    format!("0x{:064x}", value)
}

pub fn b256_hex(value: B256) -> String {
    format!("{:#x}", value)
}

pub fn parse_b256(s: &str) -> Option<B256> {
    s.trim().parse().ok()
}

pub fn parse_u256_hex(s: &str) -> Option<U256> {
    U256::from_str_radix(s.trim().trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_MNEMONIC: &str =
        "test test test test test test test test test test test junk";

    fn signer() -> EventSigner {
        EventSigner::from_mnemonic(TEST_MNEMONIC, 31337).unwrap()
    }

    #[test]
    fn test_known_derivation() {
        // First account of the standard dev mnemonic
        assert_eq!(
            format!("{:#x}", signer().address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn test_sign_and_recover() {
        let s = signer();
        let signed = s
            .sign_event("deposit", r#"{"walletAddress":"0x11"}"#, None)
            .unwrap();
        let recovered = recover_signer(signed.digest, signed.r, signed.s, signed.v).unwrap();
        assert_eq!(recovered, s.address());
    }

    #[test]
    fn test_verify_rejects_tampered_payload() {
        let s = signer();
        let payload = r#"{"amountGwei":"100"}"#;
        let signed = s.sign_event("deposit", payload, None).unwrap();

        assert!(s.verify_event(
            "deposit",
            payload,
            None,
            signed.digest,
            signed.r,
            signed.s,
            signed.v,
            s.address()
        ));
        assert!(!s.verify_event(
            "deposit",
            r#"{"amountGwei":"999"}"#,
            None,
            signed.digest,
            signed.r,
            signed.s,
            signed.v,
            s.address()
        ));
    }

    #[test]
    fn test_nonce_is_part_of_the_digest() {
        let s = signer();
        let a = s.event_digest("withdrawal_request", "{}", Some(U256::from(1u64)));
        let b = s.event_digest("withdrawal_request", "{}", Some(U256::from(2u64)));
        let c = s.event_digest("withdrawal_request", "{}", None);
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_chain_id_separates_domains() {
        let a = EventSigner::from_mnemonic(TEST_MNEMONIC, 1).unwrap();
        let b = EventSigner::from_mnemonic(TEST_MNEMONIC, 31337).unwrap();
        assert_ne!(
            a.event_digest("deposit", "{}", None),
            b.event_digest("deposit", "{}", None)
        );
    }

    #[test]
    fn test_hex32_pads() {
        assert_eq!(hex32(U256::from(1u64)).len(), 66);
        assert_eq!(parse_u256_hex(&hex32(U256::from(77u64))), Some(U256::from(77u64)));
    }
}
