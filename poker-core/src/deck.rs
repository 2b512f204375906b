//! Deterministic commit-reveal shuffle.
//!
//! The shuffle is a manual Fisher-Yates driven by a ChaCha20 stream
//! seeded with a wall-clock value the backend captures at hand start.
//! Only `sha256(<deck json>:<nonce>)` is persisted up front; the seed
//! and nonce stay out of every log and event until the hand completes,
//! at which point anyone can re-run the shuffle and check the hash.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::cards::{ordered_deck, Card};

/// A shuffled deck together with the material needed to reveal it later.
#[derive(Clone, Debug)]
pub struct ShuffledDeck {
    pub cards: Vec<Card>,
    pub seed: u64,
    /// Hex-encoded random nonce mixed into the commitment.
    pub nonce: String,
    /// Hex-encoded sha256 commitment, published in `hand_start`.
    pub commitment: String,
}

/// Shuffle the standard deck with the given seed and commitment nonce.
pub fn shuffle_deck(seed: u64, nonce: u64) -> ShuffledDeck {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut cards = ordered_deck();

    // Fisher-Yates, high index down
    for i in (1..cards.len()).rev() {
        let j = rng.gen_range(0..=i);
        cards.swap(i, j);
    }

    let nonce = format!("{:016x}", nonce);
    let commitment = deck_commitment(&cards, &nonce);
    ShuffledDeck {
        cards,
        seed,
        nonce,
        commitment,
    }
}

/// The canonical JSON rendering of a deck: an array of card codes.
pub fn deck_json(cards: &[Card]) -> String {
    let codes: Vec<String> = cards.iter().map(|c| c.code()).collect();
    serde_json::to_string(&codes).unwrap_or_default()
}

/// sha256 over `<deck json>:<nonce>`, hex-encoded.
pub fn deck_commitment(cards: &[Card], nonce: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(deck_json(cards).as_bytes());
    hasher.update(b":");
    hasher.update(nonce.as_bytes());
    hex::encode(hasher.finalize())
}

/// Re-run the shuffle from the revealed seed and check it against the
/// commitment published at hand start.
pub fn verify_commitment(seed: u64, nonce: &str, commitment: &str) -> bool {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut cards = ordered_deck();
    for i in (1..cards.len()).rev() {
        let j = rng.gen_range(0..=i);
        cards.swap(i, j);
    }
    deck_commitment(&cards, nonce) == commitment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::DECK_SIZE;

    #[test]
    fn test_shuffle_produces_valid_deck() {
        let deck = shuffle_deck(42, 7);
        assert_eq!(deck.cards.len(), DECK_SIZE);

        let mut sorted = deck.cards.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), DECK_SIZE);
    }

    #[test]
    fn test_shuffle_is_deterministic() {
        let a = shuffle_deck(1234, 99);
        let b = shuffle_deck(1234, 99);
        assert_eq!(a.cards, b.cards);
        assert_eq!(a.commitment, b.commitment);

        let c = shuffle_deck(1235, 99);
        assert_ne!(a.cards, c.cards);
    }

    #[test]
    fn test_commitment_verifies() {
        let deck = shuffle_deck(555, 888);
        assert!(verify_commitment(555, &deck.nonce, &deck.commitment));
        assert!(!verify_commitment(556, &deck.nonce, &deck.commitment));
        assert!(!verify_commitment(555, "00", &deck.commitment));
    }

    #[test]
    fn test_nonce_changes_commitment_only() {
        let a = shuffle_deck(77, 1);
        let b = shuffle_deck(77, 2);
        assert_eq!(a.cards, b.cards);
        assert_ne!(a.commitment, b.commitment);
    }
}
