//! Vesting ledger: owns the per-wallet claim record and the phase
//! state machine.
//!
//! Per wallet the states are "no record" or "record with a set of claimed
//! phases"; the only transition is appending the next phase in unlock order,
//! and once all five phases are present no further transition exists. The
//! allocation snapshot is captured at first claim and frozen, so each phase
//! amount is recomputed from `full_allocation * fraction` and stays
//! reproducible regardless of later snapshot changes.
//!
//! The first claim never trusts client-supplied NFT or amount data; it
//! resolves ownership and tiers from the snapshots itself, which is what
//! keeps a forged claim payload from inflating an allocation.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::eligibility::{normalize_address, owned_tokens};
use crate::reward::{phase_slice, Phase};
use crate::snapshot::Snapshots;
use crate::store::{ClaimRecord, ClaimStatus, ClaimStore, ClaimedNft, PhaseEntry, StoreError};

#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("missing wallet information")]
    MissingFields,
    /// The submitted phase is not one of the five known keys. Produced by
    /// the transport layer before the ledger is reached.
    #[error("invalid phase {0:?}")]
    InvalidPhase(String),
    #[error("wallet is not eligible for claim")]
    WalletBlocked,
    #[error("no eligible NFTs found")]
    NoEligibleNfts,
    #[error("already claimed {0}")]
    PhaseAlreadyClaimed(Phase),
    #[error("claim {required} first")]
    PrerequisiteMissing { required: Phase },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Successful claim outcome: the phase and the tokens it releases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimReceipt {
    pub phase: Phase,
    pub tokens: u64,
}

/// Stateless compute over the snapshots and an injected store.
pub struct VestingLedger<S> {
    snapshots: Arc<Snapshots>,
    store: Arc<S>,
}

impl<S> Clone for VestingLedger<S> {
    fn clone(&self) -> Self {
        Self {
            snapshots: Arc::clone(&self.snapshots),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ClaimStore> VestingLedger<S> {
    pub fn new(snapshots: Arc<Snapshots>, store: Arc<S>) -> Self {
        Self { snapshots, store }
    }

    /// Validate and record one phase claim.
    ///
    /// Either the create/append fully succeeds and is visible, or nothing
    /// changes; concurrent duplicates lose on the store's conditional write
    /// and surface as [`ClaimError::PhaseAlreadyClaimed`].
    pub async fn submit_phase_claim(
        &self,
        eth_address: &str,
        sol_address: &str,
        phase: Phase,
    ) -> Result<ClaimReceipt, ClaimError> {
        let eth_wallet = normalize_address(eth_address);
        let sol_wallet = normalize_address(sol_address);
        if eth_wallet.is_empty() || sol_wallet.is_empty() {
            return Err(ClaimError::MissingFields);
        }

        if self.snapshots.is_blocked(&eth_wallet) {
            warn!(wallet = %eth_wallet, "blocked wallet attempted a claim");
            return Err(ClaimError::WalletBlocked);
        }

        match self.store.find_by_wallet(&eth_wallet).await? {
            Some(record) => self.append_claim(&record, phase).await,
            None => self.first_claim(eth_wallet, sol_wallet, phase).await,
        }
    }

    /// Fetch the stored record for display layers.
    pub async fn record_for(&self, address: &str) -> Result<Option<ClaimRecord>, ClaimError> {
        let wallet = normalize_address(address);
        if wallet.is_empty() {
            return Err(ClaimError::MissingFields);
        }
        Ok(self.store.find_by_wallet(&wallet).await?)
    }

    /// Later-phase claim against an existing record. Only appends to
    /// `claimed_phases`; the NFT snapshot, `token_amount` and `sol_wallet`
    /// stay as created.
    async fn append_claim(
        &self,
        record: &ClaimRecord,
        phase: Phase,
    ) -> Result<ClaimReceipt, ClaimError> {
        if record.has_phase(phase) {
            return Err(ClaimError::PhaseAlreadyClaimed(phase));
        }
        if let Some(required) = first_missing_prerequisite(record, phase) {
            return Err(ClaimError::PrerequisiteMissing { required });
        }

        let tokens = phase_slice(record.full_allocation_total(), phase);
        let entry = PhaseEntry {
            phase,
            claimed_at: Utc::now(),
            tx: None,
        };

        match self.store.append_phase(&record.eth_wallet, &entry).await {
            Ok(()) => {
                info!(wallet = %record.eth_wallet, %phase, tokens, "phase claim recorded");
                Ok(ClaimReceipt { phase, tokens })
            }
            // A concurrent submission for the same phase won the conditional
            // append.
            Err(StoreError::Conflict) => Err(ClaimError::PhaseAlreadyClaimed(phase)),
            Err(e) => Err(e.into()),
        }
    }

    /// First claim for a wallet: must be TGE, resolves the allocation from
    /// the snapshots and creates the record with its frozen NFT snapshot.
    async fn first_claim(
        &self,
        eth_wallet: String,
        sol_wallet: String,
        phase: Phase,
    ) -> Result<ClaimReceipt, ClaimError> {
        if phase != Phase::Tge {
            return Err(ClaimError::PrerequisiteMissing {
                required: Phase::Tge,
            });
        }

        let claimed_nfts: Vec<ClaimedNft> = owned_tokens(&self.snapshots, &eth_wallet)
            .into_iter()
            .map(|t| ClaimedNft {
                token_id: t.token_id,
                rarity: t.tier,
                allocation: t.phase_slice(Phase::Tge),
                full_allocation: t.reward,
            })
            .collect();

        let token_amount: u64 = claimed_nfts.iter().map(|n| n.full_allocation).sum();
        if claimed_nfts.is_empty() || token_amount == 0 {
            return Err(ClaimError::NoEligibleNfts);
        }

        // TGE pays the sum of the per-NFT slices recorded on the snapshot.
        let tokens: u64 = claimed_nfts.iter().map(|n| n.allocation).sum();
        let nft_count = claimed_nfts.len();

        let record = ClaimRecord {
            eth_wallet,
            sol_wallet,
            claimed_nfts,
            token_amount,
            claimed_phases: vec![PhaseEntry {
                phase: Phase::Tge,
                claimed_at: Utc::now(),
                tx: None,
            }],
            status: ClaimStatus::Pending,
        };

        match self.store.create(&record).await {
            Ok(()) => {
                info!(
                    wallet = %record.eth_wallet,
                    nfts = nft_count,
                    token_amount,
                    tokens,
                    "claim record created"
                );
                Ok(ClaimReceipt {
                    phase: Phase::Tge,
                    tokens,
                })
            }
            // A concurrent first claim created the record before us.
            Err(StoreError::Conflict) => Err(ClaimError::PhaseAlreadyClaimed(Phase::Tge)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Earliest phase before `phase` that the record has not claimed yet.
fn first_missing_prerequisite(record: &ClaimRecord, phase: Phase) -> Option<Phase> {
    Phase::ALL[..phase.index()]
        .iter()
        .copied()
        .find(|p| !record.has_phase(*p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reward::Tier;
    use crate::store::MemoryStore;

    const LEGEND: &str = "0xlegend";
    const COMMONS: &str = "0xcommons";
    const BLOCKED: &str = "0xblocked";

    fn ledger() -> VestingLedger<MemoryStore> {
        let snapshots = Snapshots::from_parts(
            [
                // One rank-2 token -> Legendary, 400M.
                (1, LEGEND.to_string()),
                // Two unranked tokens -> Common, 20.43M each.
                (2, COMMONS.to_string()),
                (3, COMMONS.to_string()),
                // Blocked wallet that nevertheless owns a token.
                (4, BLOCKED.to_string()),
            ],
            [(1, 2), (4, 1)],
            [BLOCKED.to_string()],
        );
        VestingLedger::new(Arc::new(snapshots), Arc::new(MemoryStore::default()))
    }

    async fn claim(
        ledger: &VestingLedger<MemoryStore>,
        wallet: &str,
        phase: Phase,
    ) -> Result<ClaimReceipt, ClaimError> {
        ledger.submit_phase_claim(wallet, "9wFUAbc", phase).await
    }

    #[tokio::test]
    async fn legendary_claims_all_five_phases_to_exact_total() {
        let ledger = ledger();

        let expected = [
            (Phase::Tge, 60_000_000),
            (Phase::Month1, 60_000_000),
            (Phase::Month2, 80_000_000),
            (Phase::Month3, 100_000_000),
            (Phase::Month4, 100_000_000),
        ];
        let mut released = 0u64;
        for (phase, tokens) in expected {
            let receipt = claim(&ledger, LEGEND, phase).await.unwrap();
            assert_eq!(receipt.phase, phase);
            assert_eq!(receipt.tokens, tokens);
            released += receipt.tokens;
        }
        assert_eq!(released, 400_000_000);

        let record = ledger.record_for(LEGEND).await.unwrap().unwrap();
        assert_eq!(record.token_amount, 400_000_000);
        assert_eq!(record.claimed_phases.len(), 5);

        // Terminal: every further claim is a duplicate.
        for phase in Phase::ALL {
            let err = claim(&ledger, LEGEND, phase).await.unwrap_err();
            assert!(matches!(err, ClaimError::PhaseAlreadyClaimed(p) if p == phase));
        }
    }

    #[tokio::test]
    async fn record_snapshot_is_frozen_at_creation() {
        let ledger = ledger();
        claim(&ledger, COMMONS, Phase::Tge).await.unwrap();

        let created = ledger.record_for(COMMONS).await.unwrap().unwrap();
        assert_eq!(created.sol_wallet, "9wfuabc");
        assert_eq!(created.claimed_nfts.len(), 2);
        assert_eq!(created.claimed_nfts[0].rarity, Tier::Common);
        assert_eq!(created.claimed_nfts[0].allocation, 3_064_500);
        assert_eq!(created.claimed_nfts[0].full_allocation, 20_430_000);
        assert_eq!(created.token_amount, 40_860_000);
        assert_eq!(created.status, ClaimStatus::Pending);

        // Later claims append only; a different sol wallet is ignored.
        ledger
            .submit_phase_claim(COMMONS, "SomeOtherSol", Phase::Month1)
            .await
            .unwrap();
        let after = ledger.record_for(COMMONS).await.unwrap().unwrap();
        assert_eq!(after.sol_wallet, "9wfuabc");
        assert_eq!(after.claimed_nfts, created.claimed_nfts);
        assert_eq!(after.token_amount, created.token_amount);
        assert_eq!(after.claimed_phases.len(), 2);
    }

    #[tokio::test]
    async fn multi_nft_amounts_follow_the_two_computation_rules() {
        let ledger = ledger();

        // TGE: per-NFT floors, 2 * floor(20_430_000 * 15%).
        let tge = claim(&ledger, COMMONS, Phase::Tge).await.unwrap();
        assert_eq!(tge.tokens, 6_129_000);

        // Later phases: floor over the summed full allocation.
        let m1 = claim(&ledger, COMMONS, Phase::Month1).await.unwrap();
        assert_eq!(m1.tokens, 6_129_000);
        let m2 = claim(&ledger, COMMONS, Phase::Month2).await.unwrap();
        assert_eq!(m2.tokens, 8_172_000);
    }

    #[tokio::test]
    async fn duplicate_phase_claim_succeeds_once() {
        let ledger = ledger();
        claim(&ledger, LEGEND, Phase::Tge).await.unwrap();
        let err = claim(&ledger, LEGEND, Phase::Tge).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::PhaseAlreadyClaimed(Phase::Tge)
        ));
    }

    #[tokio::test]
    async fn phases_unlock_strictly_in_order() {
        let ledger = ledger();

        // No record yet: anything but TGE points back at TGE.
        let err = claim(&ledger, LEGEND, Phase::Month2).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::PrerequisiteMissing {
                required: Phase::Tge
            }
        ));

        // After TGE, skipping Month1 is rejected and names the gap.
        claim(&ledger, LEGEND, Phase::Tge).await.unwrap();
        let err = claim(&ledger, LEGEND, Phase::Month2).await.unwrap_err();
        assert!(matches!(
            err,
            ClaimError::PrerequisiteMissing {
                required: Phase::Month1
            }
        ));
    }

    #[tokio::test]
    async fn blocked_wallet_wins_over_eligible_nfts() {
        let ledger = ledger();
        let err = claim(&ledger, BLOCKED, Phase::Tge).await.unwrap_err();
        assert!(matches!(err, ClaimError::WalletBlocked));
        assert!(ledger.record_for(BLOCKED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wallet_without_tokens_has_nothing_to_claim() {
        let ledger = ledger();
        let err = claim(&ledger, "0xnobody", Phase::Tge).await.unwrap_err();
        assert!(matches!(err, ClaimError::NoEligibleNfts));
    }

    #[tokio::test]
    async fn empty_addresses_are_rejected_before_any_lookup() {
        let ledger = ledger();
        let err = ledger
            .submit_phase_claim("  ", "9wFU", Phase::Tge)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::MissingFields));
        let err = ledger
            .submit_phase_claim(LEGEND, "", Phase::Tge)
            .await
            .unwrap_err();
        assert!(matches!(err, ClaimError::MissingFields));
    }

    #[tokio::test]
    async fn eth_wallet_is_case_insensitive() {
        let ledger = ledger();
        claim(&ledger, "0xLeGeNd", Phase::Tge).await.unwrap();
        let err = claim(&ledger, LEGEND, Phase::Tge).await.unwrap_err();
        assert!(matches!(err, ClaimError::PhaseAlreadyClaimed(Phase::Tge)));
        assert!(ledger.record_for("0XLEGEND").await.unwrap().is_some());
    }
}
