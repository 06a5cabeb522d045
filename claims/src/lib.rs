//! Claim-eligibility and vesting-ledger core for the 9LIVES NFT airdrop.
//!
//! Holders of the NFT collection claim their token allocation across five
//! time-gated vesting phases (TGE, Month1..Month4). This crate contains the
//! two logical components behind that flow:
//!
//! - [`eligibility`]: pure resolver from wallet address to owned tokens,
//!   reward tiers and total potential airdrop, computed over immutable
//!   ownership/rarity/blocklist snapshots ([`snapshot`]).
//! - [`ledger`]: the per-wallet claim record state machine — one record per
//!   wallet, blocklist enforcement, strict sequential phase unlocking and
//!   idempotent per-phase token amounts recomputed from the frozen
//!   allocation ([`reward`]).
//!
//! Persistence goes through the [`store::ClaimStore`] trait with an
//! in-memory implementation for tests and a Postgres backend behind the
//! `postgres` feature. No tokens are moved here; a successful claim only
//! records intent for off-band fulfillment.

#![forbid(unsafe_code)]

pub mod eligibility;
pub mod ledger;
pub mod reward;
pub mod snapshot;
pub mod store;

pub use eligibility::{resolve_eligibility, Eligibility, EligibilityError, OwnedToken};
pub use ledger::{ClaimError, ClaimReceipt, VestingLedger};
pub use reward::{Phase, Tier};
pub use snapshot::{SnapshotError, Snapshots};
pub use store::{
    ClaimRecord, ClaimStatus, ClaimStore, ClaimedNft, MemoryStore, Page, PhaseEntry, StoreError,
};
