//! Card encoding: card_value = suit * 13 + rank
//! - suit: 0=clubs, 1=diamonds, 2=hearts, 3=spades
//! - rank: 0=2, 1=3, ..., 8=10, 9=J, 10=Q, 11=K, 12=A
//!
//! Cards cross the wire as two-character codes, rank then suit
//! (`"As"`, `"Td"`, `"2c"`), which is also how they are stored in
//! the hand row and in event payloads.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub const DECK_SIZE: usize = 52;
pub const NUM_RANKS: u8 = 13;

const RANK_CHARS: [char; 13] = [
    '2', '3', '4', '5', '6', '7', '8', '9', 'T', 'J', 'Q', 'K', 'A',
];
const SUIT_CHARS: [char; 4] = ['c', 'd', 'h', 's'];

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Card(u8);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid card code: {0:?}")]
pub struct CardParseError(String);

impl Card {
    pub fn new(index: u8) -> Option<Self> {
        (index < DECK_SIZE as u8).then_some(Card(index))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// 0 = deuce ... 12 = ace.
    pub fn rank(self) -> u8 {
        self.0 % NUM_RANKS
    }

    pub fn suit(self) -> u8 {
        self.0 / NUM_RANKS
    }

    pub fn code(self) -> String {
        let mut s = String::with_capacity(2);
        s.push(RANK_CHARS[self.rank() as usize]);
        s.push(SUIT_CHARS[self.suit() as usize]);
        s
    }
}

impl fmt::Display for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl fmt::Debug for Card {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Card({})", self.code())
    }
}

impl FromStr for Card {
    type Err = CardParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        let (Some(r), Some(u), None) = (chars.next(), chars.next(), chars.next()) else {
            return Err(CardParseError(s.to_string()));
        };
        let rank = RANK_CHARS
            .iter()
            .position(|&c| c == r.to_ascii_uppercase())
            .ok_or_else(|| CardParseError(s.to_string()))?;
        let suit = SUIT_CHARS
            .iter()
            .position(|&c| c == u.to_ascii_lowercase())
            .ok_or_else(|| CardParseError(s.to_string()))?;
        Ok(Card((suit * 13 + rank) as u8))
    }
}

impl Serialize for Card {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for Card {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(D::Error::custom)
    }
}

/// The unshuffled 52-card deck in index order.
pub fn ordered_deck() -> Vec<Card> {
    (0..DECK_SIZE as u8).map(Card).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_round_trip() {
        for card in ordered_deck() {
            let parsed: Card = card.code().parse().unwrap();
            assert_eq!(parsed, card);
        }
    }

    #[test]
    fn test_known_codes() {
        assert_eq!(Card(0).code(), "2c");
        assert_eq!(Card(12).code(), "Ac");
        assert_eq!(Card(13).code(), "2d");
        assert_eq!(Card(51).code(), "As");
        assert_eq!("As".parse::<Card>().unwrap(), Card(51));
        assert_eq!("td".parse::<Card>().unwrap().code(), "Td");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!("".parse::<Card>().is_err());
        assert!("A".parse::<Card>().is_err());
        assert!("Asx".parse::<Card>().is_err());
        assert!("1s".parse::<Card>().is_err());
    }
}
