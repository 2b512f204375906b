//! Turn order and the betting-round-complete predicate.
//!
//! Seats act in ascending seat-index order, wrapping modulo the seats
//! in the hand. A round is complete once every non-folded player is
//! either all-in, or has voluntarily acted this round (posting a blind
//! does not count) with their commitment matching the current bet —
//! which is what gives the big blind its pre-flop option.

use alloy_primitives::U256;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerStatus {
    Active,
    Folded,
    AllIn,
}

impl PlayerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerStatus::Active => "ACTIVE",
            PlayerStatus::Folded => "FOLDED",
            PlayerStatus::AllIn => "ALL_IN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(PlayerStatus::Active),
            "FOLDED" => Some(PlayerStatus::Folded),
            "ALL_IN" => Some(PlayerStatus::AllIn),
            _ => None,
        }
    }
}

/// Per-seat view of the current betting round.
#[derive(Clone, Debug)]
pub struct SeatRound {
    pub seat: i32,
    pub status: PlayerStatus,
    /// Chips committed in this round only.
    pub committed: U256,
    /// Has taken a non-blind action this round.
    pub acted: bool,
}

/// The next ACTIVE seat strictly after `from`, wrapping; None if no
/// ACTIVE player remains.
pub fn next_active(seats: &[SeatRound], from: i32) -> Option<i32> {
    if seats.is_empty() {
        return None;
    }
    let n = seats.len();
    let start = seats.iter().position(|s| s.seat == from).unwrap_or(0);
    for step in 1..=n {
        let s = &seats[(start + step) % n];
        if s.status == PlayerStatus::Active {
            return Some(s.seat);
        }
    }
    None
}

/// First ACTIVE seat clockwise from the dealer (used post-flop and when
/// opening a fresh street).
pub fn first_active_after(seats: &[SeatRound], dealer: i32) -> Option<i32> {
    next_active(seats, dealer)
}

/// The betting-round-complete predicate.
pub fn round_complete(seats: &[SeatRound], current_bet: U256) -> bool {
    let active = seats
        .iter()
        .filter(|s| s.status == PlayerStatus::Active)
        .count();
    let all_in = seats
        .iter()
        .filter(|s| s.status == PlayerStatus::AllIn)
        .count();

    // Everyone who can still bet has gone all-in
    if active == 0 {
        return all_in >= 1;
    }

    seats
        .iter()
        .filter(|s| s.status == PlayerStatus::Active)
        .all(|s| s.acted && s.committed >= current_bet)
}

/// True once no further betting is possible this hand: at most one
/// player can still act and at least one other is all-in.
pub fn betting_is_over(seats: &[SeatRound]) -> bool {
    let active = seats
        .iter()
        .filter(|s| s.status == PlayerStatus::Active)
        .count();
    let all_in = seats
        .iter()
        .filter(|s| s.status == PlayerStatus::AllIn)
        .count();
    let non_folded = active + all_in;

    (active == 1 && all_in >= 1) || (active == 0 && all_in >= 1 && non_folded >= 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seat(seat: i32, status: PlayerStatus, committed: u64, acted: bool) -> SeatRound {
        SeatRound {
            seat,
            status,
            committed: U256::from(committed),
            acted,
        }
    }

    #[test]
    fn test_next_active_wraps() {
        let seats = vec![
            seat(0, PlayerStatus::Active, 0, false),
            seat(1, PlayerStatus::Folded, 0, false),
            seat(2, PlayerStatus::Active, 0, false),
        ];
        assert_eq!(next_active(&seats, 0), Some(2));
        assert_eq!(next_active(&seats, 2), Some(0));
        assert_eq!(next_active(&seats, 1), Some(2));
    }

    #[test]
    fn test_next_active_none_when_all_in() {
        let seats = vec![
            seat(0, PlayerStatus::AllIn, 10, true),
            seat(1, PlayerStatus::Folded, 0, false),
        ];
        assert_eq!(next_active(&seats, 0), None);
    }

    #[test]
    fn test_blind_post_does_not_complete_round() {
        // Pre-flop: SB called and acted, BB only posted
        let seats = vec![
            seat(0, PlayerStatus::Active, 200, true),
            seat(1, PlayerStatus::Active, 200, false),
        ];
        assert!(!round_complete(&seats, U256::from(200u64)));

        // BB checks their option
        let seats = vec![
            seat(0, PlayerStatus::Active, 200, true),
            seat(1, PlayerStatus::Active, 200, true),
        ];
        assert!(round_complete(&seats, U256::from(200u64)));
    }

    #[test]
    fn test_unmatched_bet_keeps_round_open() {
        let seats = vec![
            seat(0, PlayerStatus::Active, 500, true),
            seat(1, PlayerStatus::Active, 200, true),
        ];
        assert!(!round_complete(&seats, U256::from(500u64)));
    }

    #[test]
    fn test_all_in_players_complete_round() {
        let seats = vec![
            seat(0, PlayerStatus::AllIn, 500, true),
            seat(1, PlayerStatus::AllIn, 300, true),
            seat(2, PlayerStatus::Folded, 100, true),
        ];
        assert!(round_complete(&seats, U256::from(500u64)));
    }

    #[test]
    fn test_betting_is_over() {
        let one_active_one_all_in = vec![
            seat(0, PlayerStatus::Active, 500, true),
            seat(1, PlayerStatus::AllIn, 500, true),
        ];
        assert!(betting_is_over(&one_active_one_all_in));

        let two_active = vec![
            seat(0, PlayerStatus::Active, 0, false),
            seat(1, PlayerStatus::Active, 0, false),
        ];
        assert!(!betting_is_over(&two_active));

        let all_all_in = vec![
            seat(0, PlayerStatus::AllIn, 500, true),
            seat(1, PlayerStatus::AllIn, 200, true),
        ];
        assert!(betting_is_over(&all_all_in));
    }
}
