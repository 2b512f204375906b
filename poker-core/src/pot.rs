//! Side-pot layering.
//!
//! Pots are rebuilt from the full per-seat contribution totals, never
//! incrementally: levels are the distinct totals of non-folded players,
//! and every player — folded included — pays `min(total, level)` slices
//! into each layer. Folded chips therefore settle into the lowest pot
//! they reach and Σ pot.amount always equals Σ contributions.

use alloy_primitives::U256;

/// One seat's total commitment across the whole hand.
#[derive(Clone, Debug)]
pub struct Contribution {
    pub seat: i32,
    pub total: U256,
    pub folded: bool,
}

/// One pot layer: `pot_number` is its index in the returned Vec,
/// 0 being the main pot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PotLayer {
    pub amount: U256,
    pub eligible: Vec<i32>,
}

/// Layer the pots from contribution totals.
pub fn build_pots(contributions: &[Contribution]) -> Vec<PotLayer> {
    // Distinct positive totals among non-folded players, ascending
    let mut levels: Vec<U256> = contributions
        .iter()
        .filter(|c| !c.folded && c.total > U256::ZERO)
        .map(|c| c.total)
        .collect();
    levels.sort();
    levels.dedup();

    let mut pots = Vec::with_capacity(levels.len());
    let mut prev = U256::ZERO;

    for level in levels {
        let mut amount = U256::ZERO;
        let mut eligible = Vec::new();

        for c in contributions {
            // Folded players still pay into the slice
            amount += c.total.min(level) - c.total.min(prev);
            if !c.folded && c.total >= level {
                eligible.push(c.seat);
            }
        }

        eligible.sort_unstable();
        if amount > U256::ZERO {
            pots.push(PotLayer { amount, eligible });
        }
        prev = level;
    }

    pots
}

/// True iff at least two players who have voluntarily acted have
/// different totals; a single main-pot amount update suffices otherwise.
pub fn should_create_side_pots(acted_totals: &[U256]) -> bool {
    acted_totals.len() >= 2 && acted_totals.iter().any(|t| *t != acted_totals[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(seat: i32, total: u64, folded: bool) -> Contribution {
        Contribution {
            seat,
            total: U256::from(total),
            folded,
        }
    }

    #[test]
    fn test_single_level_single_pot() {
        let pots = build_pots(&[c(0, 100, false), c(1, 100, false), c(2, 100, false)]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, U256::from(300u64));
        assert_eq!(pots[0].eligible, vec![0, 1, 2]);
    }

    #[test]
    fn test_short_all_in_creates_side_pot() {
        // Totals (100, 60, 60): main pot of 3*60, side pot of 40
        let pots = build_pots(&[c(0, 100, false), c(1, 60, false), c(2, 60, false)]);
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, U256::from(180u64));
        assert_eq!(pots[0].eligible, vec![0, 1, 2]);
        assert_eq!(pots[1].amount, U256::from(40u64));
        assert_eq!(pots[1].eligible, vec![0]);
    }

    #[test]
    fn test_folded_blind_lands_in_lowest_pot() {
        // UTG and BB all-in for 50M each, folded SB left 1M behind
        let pots = build_pots(&[
            c(0, 0, true),
            c(1, 1_000_000, true),
            c(2, 50_000_000, false),
            c(3, 50_000_000, false),
        ]);
        assert_eq!(pots.len(), 1);
        assert_eq!(pots[0].amount, U256::from(101_000_000u64));
        assert_eq!(pots[0].eligible, vec![2, 3]);
    }

    #[test]
    fn test_folded_chips_split_across_levels() {
        // Folded player committed 80: 60 goes to the main layer, 20 to the side layer
        let pots = build_pots(&[c(0, 100, false), c(1, 60, false), c(2, 80, true)]);
        assert_eq!(pots.len(), 2);
        assert_eq!(pots[0].amount, U256::from(180u64));
        assert_eq!(pots[0].eligible, vec![0, 1]);
        assert_eq!(pots[1].amount, U256::from(60u64)); // 40 from seat 0 + 20 folded
        assert_eq!(pots[1].eligible, vec![0]);
    }

    #[test]
    fn test_conservation() {
        let contributions = [
            c(0, 123, false),
            c(1, 77, true),
            c(2, 123, false),
            c(3, 41, false),
        ];
        let pots = build_pots(&contributions);
        let total: U256 = pots.iter().map(|p| p.amount).sum();
        let committed: U256 = contributions.iter().map(|x| x.total).sum();
        assert_eq!(total, committed);
    }

    #[test]
    fn test_should_create_side_pots() {
        assert!(!should_create_side_pots(&[]));
        assert!(!should_create_side_pots(&[U256::from(10u64)]));
        assert!(!should_create_side_pots(&[
            U256::from(10u64),
            U256::from(10u64)
        ]));
        assert!(should_create_side_pots(&[
            U256::from(10u64),
            U256::from(20u64)
        ]));
    }
}
