//! Pure no-limit Texas Hold'em game logic: card encoding, the
//! deterministic commit-reveal shuffle, 7-card hand evaluation,
//! side-pot layering and betting-round predicates.
//!
//! Nothing in this crate touches a database or the network; the
//! backend service feeds it rows and persists what comes back.

pub mod cards;
pub mod deck;
pub mod eval;
pub mod pot;
pub mod round;

pub use cards::{ordered_deck, Card, CardParseError, DECK_SIZE};
pub use deck::{deck_commitment, deck_json, shuffle_deck, verify_commitment, ShuffledDeck};
pub use eval::{evaluate_seven, HandScore};
pub use pot::{build_pots, should_create_side_pots, Contribution, PotLayer};
pub use round::{
    betting_is_over, first_active_after, next_active, round_complete, PlayerStatus, SeatRound,
};
