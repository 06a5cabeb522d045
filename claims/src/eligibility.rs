//! Eligibility resolver.
//!
//! Pure read-only compute over the static snapshots: which tokens a wallet
//! owns, the tier and full reward of each, and the total potential airdrop.
//! The reported figures are informational; nothing is reserved or locked, and
//! the vesting ledger recomputes the same values from the snapshots when a
//! record is created.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reward::{phase_slice, Phase, Tier};
use crate::snapshot::Snapshots;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EligibilityError {
    /// Blocklist hit. Takes priority over the ownership lookup.
    #[error("wallet ineligible (flagged)")]
    Blocked,
    /// The wallet owns no tokens from the collection.
    #[error("no NFTs found for this wallet")]
    NotEligible,
}

/// One owned token with its resolved tier and full (un-vested) reward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedToken {
    pub token_id: u32,
    /// 1-based rarity rank; [`crate::reward::UNRANKED`] when the rarity
    /// snapshot has no entry for the token.
    pub rank: u32,
    pub tier: Tier,
    /// Full per-NFT allocation across all phases, not a vesting slice.
    pub reward: u64,
}

/// Resolver result for one wallet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub address: String,
    pub owned_tokens: Vec<OwnedToken>,
    /// Sum of full rewards over all owned tokens.
    pub total_claimable: u64,
}

impl OwnedToken {
    /// Slice of this token's reward released by one phase.
    pub fn phase_slice(&self, phase: Phase) -> u64 {
        phase_slice(self.reward, phase)
    }
}

/// Canonical address form used for snapshot lookups and record keys.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Tokens owned by an already-normalized address, with tier and reward
/// resolved. Unranked tokens fall into the Common tier rather than erroring.
pub fn owned_tokens(snapshots: &Snapshots, address: &str) -> Vec<OwnedToken> {
    snapshots
        .tokens_owned_by(address)
        .into_iter()
        .map(|token_id| {
            let rank = snapshots.rank_of(token_id);
            let tier = Tier::for_rank(rank);
            OwnedToken {
                token_id,
                rank,
                tier,
                reward: tier.full_amount(),
            }
        })
        .collect()
}

/// Resolve a wallet's owned tokens and total potential airdrop.
///
/// Deterministic over the snapshots; no side effects. The blocklist check
/// runs before the ownership lookup, so a blocked wallet that also owns
/// tokens still reports as blocked.
pub fn resolve_eligibility(
    snapshots: &Snapshots,
    address: &str,
) -> Result<Eligibility, EligibilityError> {
    let address = normalize_address(address);

    if snapshots.is_blocked(&address) {
        return Err(EligibilityError::Blocked);
    }

    let owned = owned_tokens(snapshots, &address);
    if owned.is_empty() {
        return Err(EligibilityError::NotEligible);
    }

    let total_claimable = owned.iter().map(|t| t.reward).sum();
    Ok(Eligibility {
        address,
        owned_tokens: owned,
        total_claimable,
    })
}
