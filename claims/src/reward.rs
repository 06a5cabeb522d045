//! Reward tiers and vesting phases.
//!
//! The airdrop pays a fixed full allocation per NFT, decided by the token's
//! rarity rank, and releases it across five sequential phases. Unlock
//! fractions are expressed in basis points and applied with integer floor
//! division, so every computation is deterministic and reproducible from the
//! stored full allocation alone.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Basis points denominator (100% == 10_000 bps).
pub const BPS_DENOM: u64 = 10_000;

/// Rank assigned to tokens missing from the rarity snapshot. Large enough to
/// fall through every ranked bracket into [`Tier::Common`].
pub const UNRANKED: u32 = u32::MAX;

/// Reward bracket derived from a token's 1-based rarity rank.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    Legendary,
    Mythic,
    #[serde(rename = "Ultra Rare")]
    UltraRare,
    Rare,
    Uncommon,
    Common,
}

impl Tier {
    /// Tier for a 1-based rank. Total over all inputs; anything beyond the
    /// ranked brackets (including [`UNRANKED`]) is Common.
    pub fn for_rank(rank: u32) -> Self {
        match rank {
            1..=3 => Tier::Legendary,
            4..=33 => Tier::Mythic,
            34..=167 => Tier::UltraRare,
            168..=499 => Tier::Rare,
            500..=1166 => Tier::Uncommon,
            _ => Tier::Common,
        }
    }

    /// Full per-NFT allocation across all five phases, in whole tokens.
    pub const fn full_amount(self) -> u64 {
        match self {
            Tier::Legendary => 400_000_000,
            Tier::Mythic => 200_000_000,
            Tier::UltraRare => 85_000_000,
            Tier::Rare => 60_000_000,
            Tier::Uncommon => 30_000_000,
            Tier::Common => 20_430_000,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Tier::Legendary => "Legendary",
            Tier::Mythic => "Mythic",
            Tier::UltraRare => "Ultra Rare",
            Tier::Rare => "Rare",
            Tier::Uncommon => "Uncommon",
            Tier::Common => "Common",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One of the five sequential vesting unlock windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "TGE")]
    Tge,
    Month1,
    Month2,
    Month3,
    Month4,
}

impl Phase {
    /// All phases in unlock order.
    pub const ALL: [Phase; 5] = [
        Phase::Tge,
        Phase::Month1,
        Phase::Month2,
        Phase::Month3,
        Phase::Month4,
    ];

    /// Ordinal position in the unlock sequence (TGE == 0).
    pub const fn index(self) -> usize {
        match self {
            Phase::Tge => 0,
            Phase::Month1 => 1,
            Phase::Month2 => 2,
            Phase::Month3 => 3,
            Phase::Month4 => 4,
        }
    }

    /// Unlock fraction in basis points. Sums to [`BPS_DENOM`] over all phases.
    pub const fn fraction_bps(self) -> u64 {
        match self {
            Phase::Tge => 1_500,
            Phase::Month1 => 1_500,
            Phase::Month2 => 2_000,
            Phase::Month3 => 2_500,
            Phase::Month4 => 2_500,
        }
    }

    /// The phase that must be claimed immediately before this one.
    pub const fn prerequisite(self) -> Option<Phase> {
        match self {
            Phase::Tge => None,
            Phase::Month1 => Some(Phase::Tge),
            Phase::Month2 => Some(Phase::Month1),
            Phase::Month3 => Some(Phase::Month2),
            Phase::Month4 => Some(Phase::Month3),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Phase::Tge => "TGE",
            Phase::Month1 => "Month1",
            Phase::Month2 => "Month2",
            Phase::Month3 => "Month3",
            Phase::Month4 => "Month4",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TGE" => Ok(Phase::Tge),
            "Month1" => Ok(Phase::Month1),
            "Month2" => Ok(Phase::Month2),
            "Month3" => Ok(Phase::Month3),
            "Month4" => Ok(Phase::Month4),
            _ => Err(()),
        }
    }
}

/// floor(amount * bps / 10_000) with a widened intermediate.
pub fn mul_bps(amount: u64, bps: u64) -> u64 {
    ((amount as u128 * bps as u128) / BPS_DENOM as u128) as u64
}

/// Slice of a full allocation released by one phase.
pub fn phase_slice(full_allocation: u64, phase: Phase) -> u64 {
    mul_bps(full_allocation, phase.fraction_bps())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_boundaries_resolve_to_documented_side() {
        assert_eq!(Tier::for_rank(1), Tier::Legendary);
        assert_eq!(Tier::for_rank(3), Tier::Legendary);
        assert_eq!(Tier::for_rank(4), Tier::Mythic);
        assert_eq!(Tier::for_rank(33), Tier::Mythic);
        assert_eq!(Tier::for_rank(34), Tier::UltraRare);
        assert_eq!(Tier::for_rank(167), Tier::UltraRare);
        assert_eq!(Tier::for_rank(168), Tier::Rare);
        assert_eq!(Tier::for_rank(499), Tier::Rare);
        assert_eq!(Tier::for_rank(500), Tier::Uncommon);
        assert_eq!(Tier::for_rank(1166), Tier::Uncommon);
        assert_eq!(Tier::for_rank(1167), Tier::Common);
        assert_eq!(Tier::for_rank(0), Tier::Common);
        assert_eq!(Tier::for_rank(UNRANKED), Tier::Common);
    }

    #[test]
    fn fractions_sum_to_whole() {
        let total: u64 = Phase::ALL.iter().map(|p| p.fraction_bps()).sum();
        assert_eq!(total, BPS_DENOM);
    }

    #[test]
    fn legendary_schedule_releases_exact_total() {
        let full = Tier::Legendary.full_amount();
        assert_eq!(phase_slice(full, Phase::Tge), 60_000_000);
        assert_eq!(phase_slice(full, Phase::Month1), 60_000_000);
        assert_eq!(phase_slice(full, Phase::Month2), 80_000_000);
        assert_eq!(phase_slice(full, Phase::Month3), 100_000_000);
        assert_eq!(phase_slice(full, Phase::Month4), 100_000_000);
        let sum: u64 = Phase::ALL.iter().map(|p| phase_slice(full, *p)).sum();
        assert_eq!(sum, full);
    }

    #[test]
    fn floor_rounding_loss_is_bounded() {
        // 5 independent floors lose at most 4 units.
        for full in [1u64, 7, 999, 20_430_000, 123_456_789] {
            let sum: u64 = Phase::ALL.iter().map(|p| phase_slice(full, *p)).sum();
            assert!(sum <= full);
            assert!(full - sum <= 4, "full={full} lost {}", full - sum);
        }
    }

    #[test]
    fn phase_parse_and_order() {
        assert_eq!("TGE".parse::<Phase>(), Ok(Phase::Tge));
        assert_eq!("Month4".parse::<Phase>(), Ok(Phase::Month4));
        assert!("month1".parse::<Phase>().is_err());
        assert!("Month5".parse::<Phase>().is_err());
        assert_eq!(Phase::Tge.prerequisite(), None);
        assert_eq!(Phase::Month3.prerequisite(), Some(Phase::Month2));
        for (i, p) in Phase::ALL.iter().enumerate() {
            assert_eq!(p.index(), i);
        }
    }

    #[test]
    fn phase_serde_uses_wire_names() {
        assert_eq!(serde_json::to_string(&Phase::Tge).unwrap(), "\"TGE\"");
        assert_eq!(serde_json::to_string(&Phase::Month2).unwrap(), "\"Month2\"");
        let p: Phase = serde_json::from_str("\"TGE\"").unwrap();
        assert_eq!(p, Phase::Tge);
        assert_eq!(
            serde_json::to_string(&Tier::UltraRare).unwrap(),
            "\"Ultra Rare\""
        );
    }
}
