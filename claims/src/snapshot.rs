//! Static snapshot tables: NFT ownership, rarity ranks and the wallet
//! blocklist.
//!
//! All three are loaded once at process start from JSON files and shared
//! read-only across requests; no mutation path exists afterwards, so no
//! synchronization is needed beyond the load barrier.
//!
//! File formats (as exported by the snapshot tooling):
//! - `nft-owners.json`      — object mapping tokenId (string) to owner address
//! - `rarity-snapshot.json` — array of `{ "tokenId": n, "rank": n }`
//! - `blocked-wallets.json` — array of addresses
//!
//! Addresses are canonicalized to lowercase at load time; every lookup takes
//! an already-lowercased address.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::reward::UNRANKED;

pub const OWNERS_FILE: &str = "nft-owners.json";
pub const RARITY_FILE: &str = "rarity-snapshot.json";
pub const BLOCKLIST_FILE: &str = "blocked-wallets.json";

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("bad token id {key:?} in {path}")]
    BadTokenId { path: PathBuf, key: String },
}

#[derive(Debug, Deserialize)]
struct RarityEntry {
    #[serde(rename = "tokenId")]
    token_id: u32,
    rank: u32,
}

/// Immutable view over the three snapshot tables.
#[derive(Debug, Default, Clone)]
pub struct Snapshots {
    /// tokenId -> owner address (lowercase).
    owners: HashMap<u32, String>,
    /// tokenId -> 1-based rarity rank. Absent tokens are unranked.
    ranks: HashMap<u32, u32>,
    /// Lowercased blocked addresses.
    blocked: HashSet<String>,
}

impl Snapshots {
    /// Load all three tables from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let dir = dir.as_ref();

        let raw_owners: HashMap<String, String> = read_json(&dir.join(OWNERS_FILE))?;
        let mut owners = HashMap::with_capacity(raw_owners.len());
        for (key, owner) in raw_owners {
            let token_id = key.parse::<u32>().map_err(|_| SnapshotError::BadTokenId {
                path: dir.join(OWNERS_FILE),
                key: key.clone(),
            })?;
            owners.insert(token_id, owner.to_lowercase());
        }

        let rarity: Vec<RarityEntry> = read_json(&dir.join(RARITY_FILE))?;
        let ranks = rarity.into_iter().map(|r| (r.token_id, r.rank)).collect();

        let raw_blocked: Vec<String> = read_json(&dir.join(BLOCKLIST_FILE))?;
        let blocked = raw_blocked.into_iter().map(|a| a.to_lowercase()).collect();

        let snapshots = Self {
            owners,
            ranks,
            blocked,
        };
        info!(
            tokens = snapshots.owners.len(),
            ranked = snapshots.ranks.len(),
            blocked = snapshots.blocked.len(),
            "snapshots loaded"
        );
        Ok(snapshots)
    }

    /// Build from in-memory parts. Addresses are lowercased here as well so
    /// callers do not have to pre-normalize.
    pub fn from_parts(
        owners: impl IntoIterator<Item = (u32, String)>,
        ranks: impl IntoIterator<Item = (u32, u32)>,
        blocked: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            owners: owners
                .into_iter()
                .map(|(id, a)| (id, a.to_lowercase()))
                .collect(),
            ranks: ranks.into_iter().collect(),
            blocked: blocked.into_iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    pub fn is_blocked(&self, address: &str) -> bool {
        self.blocked.contains(address)
    }

    /// Token ids owned by `address`, in ascending id order.
    pub fn tokens_owned_by(&self, address: &str) -> Vec<u32> {
        let mut ids: Vec<u32> = self
            .owners
            .iter()
            .filter(|(_, owner)| owner.as_str() == address)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Rarity rank for a token, or [`UNRANKED`] if the snapshot has no entry.
    pub fn rank_of(&self, token_id: u32) -> u32 {
        self.ranks.get(&token_id).copied().unwrap_or(UNRANKED)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let bytes = std::fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_normalizes_and_indexes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(OWNERS_FILE),
            r#"{ "7": "0xAbC", "12": "0xabc", "3": "0xDEF" }"#,
        )
        .unwrap();
        std::fs::write(
            dir.path().join(RARITY_FILE),
            r#"[ { "tokenId": 7, "rank": 2 }, { "tokenId": 3, "rank": 600 } ]"#,
        )
        .unwrap();
        std::fs::write(dir.path().join(BLOCKLIST_FILE), r#"[ "0xBAD" ]"#).unwrap();

        let snap = Snapshots::load(dir.path()).unwrap();
        assert_eq!(snap.tokens_owned_by("0xabc"), vec![7, 12]);
        assert_eq!(snap.tokens_owned_by("0xdef"), vec![3]);
        assert!(snap.tokens_owned_by("0xnobody").is_empty());
        assert_eq!(snap.rank_of(7), 2);
        assert_eq!(snap.rank_of(12), UNRANKED);
        assert!(snap.is_blocked("0xbad"));
        assert!(!snap.is_blocked("0xabc"));
    }

    #[test]
    fn load_rejects_non_numeric_token_id() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(OWNERS_FILE), r#"{ "seven": "0xabc" }"#).unwrap();
        std::fs::write(dir.path().join(RARITY_FILE), "[]").unwrap();
        std::fs::write(dir.path().join(BLOCKLIST_FILE), "[]").unwrap();

        let err = Snapshots::load(dir.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::BadTokenId { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Snapshots::load(dir.path()).unwrap_err();
        assert!(matches!(err, SnapshotError::Io { .. }));
    }
}
