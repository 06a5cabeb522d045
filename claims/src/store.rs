//! Claim record store: interface, in-memory implementation and Postgres
//! backend.
//!
//! The ledger treats the store as an injected collaborator, which keeps it
//! testable against [`MemoryStore`]. Both uniqueness rules live here as
//! atomic conditional operations rather than read-modify-write pairs:
//! - at most one record per wallet ([`ClaimStore::create`] fails with
//!   `Conflict` on a duplicate wallet), and
//! - at most one entry per (wallet, phase) ([`ClaimStore::append_phase`] is
//!   append-iff-absent).
//!
//! Enable the `postgres` feature for the SQLx/Postgres backend.
//!
//! Tables the Postgres implementation relies on (indicative DDL, applied by
//! `PgStore::migrate`):
//! ```sql
//! CREATE TABLE IF NOT EXISTS claims (
//!   eth_wallet   TEXT PRIMARY KEY,
//!   sol_wallet   TEXT NOT NULL,
//!   claimed_nfts JSONB NOT NULL,
//!   token_amount BIGINT NOT NULL,
//!   status       TEXT NOT NULL DEFAULT 'pending',
//!   created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
//! );
//!
//! CREATE TABLE IF NOT EXISTS claim_phases (
//!   eth_wallet TEXT NOT NULL REFERENCES claims(eth_wallet) ON DELETE CASCADE,
//!   phase      TEXT NOT NULL,
//!   claimed_at TIMESTAMPTZ NOT NULL,
//!   tx         TEXT,
//!   PRIMARY KEY (eth_wallet, phase)
//! );
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::reward::{Phase, Tier};

/* ==========================
   Persisted record model
   ========================== */

/// Fulfillment status of a record, flipped out of band once tokens are sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Pending,
    Sent,
    Failed,
}

impl ClaimStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Sent => "sent",
            ClaimStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClaimStatus::Pending),
            "sent" => Some(ClaimStatus::Sent),
            "failed" => Some(ClaimStatus::Failed),
            _ => None,
        }
    }
}

/// One NFT captured in a record at creation time. Immutable thereafter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedNft {
    pub token_id: u32,
    pub rarity: Tier,
    /// TGE slice of this NFT's allocation, recorded at first claim.
    pub allocation: u64,
    /// Full per-NFT total across all phases; the authoritative figure every
    /// later phase computation derives from.
    pub full_allocation: u64,
}

/// One successful phase claim. Append-only.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEntry {
    pub phase: Phase,
    pub claimed_at: DateTime<Utc>,
    /// Fulfillment transaction hash, filled in off band.
    #[serde(default)]
    pub tx: Option<String>,
}

/// The single persisted document per ETH wallet. Created on the wallet's
/// first successful TGE claim; afterwards only `claimed_phases` grows.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    /// Lowercased ETH wallet, the record key.
    pub eth_wallet: String,
    /// Destination Solana wallet, fixed at creation.
    pub sol_wallet: String,
    #[serde(rename = "claimedNFTs")]
    pub claimed_nfts: Vec<ClaimedNft>,
    /// Sum of all full allocations: 100% of the holder's airdrop, not a
    /// running claimed-so-far counter.
    pub token_amount: u64,
    pub claimed_phases: Vec<PhaseEntry>,
    pub status: ClaimStatus,
}

impl ClaimRecord {
    pub fn has_phase(&self, phase: Phase) -> bool {
        self.claimed_phases.iter().any(|e| e.phase == phase)
    }

    /// Sum of full allocations over the frozen NFT snapshot.
    pub fn full_allocation_total(&self) -> u64 {
        self.claimed_nfts.iter().map(|n| n.full_allocation).sum()
    }
}

/// Paged listing for the admin/reporting view.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: u64,
}

/* ==========================
   Store errors and interface
   ========================== */

#[derive(Debug, Error)]
pub enum StoreError {
    /// Backend unreachable or failed. Not retried here; the caller may retry
    /// the whole request.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// Uniqueness violation: duplicate wallet on create, or duplicate phase
    /// on append.
    #[error("conflict")]
    Conflict,
    #[error("record not found")]
    NotFound,
}

#[async_trait]
pub trait ClaimStore: Send + Sync + 'static {
    /// Cheap connectivity probe for readiness checks.
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    /// Fetch the record for an already-normalized wallet.
    async fn find_by_wallet(&self, eth_wallet: &str) -> Result<Option<ClaimRecord>, StoreError>;

    /// Create a brand-new record atomically. `Conflict` if the wallet
    /// already has one.
    async fn create(&self, record: &ClaimRecord) -> Result<(), StoreError>;

    /// Append a phase entry iff that phase is not already present.
    /// `Conflict` on a duplicate phase, `NotFound` if the wallet has no
    /// record. Nothing else on the record is touched.
    async fn append_phase(&self, eth_wallet: &str, entry: &PhaseEntry) -> Result<(), StoreError>;

    /// Page through all records (1-based page).
    async fn list(&self, page: u32, page_size: u32) -> Result<Page<ClaimRecord>, StoreError>;
}

/* ==========================
   In-memory implementation
   ========================== */

/// Mutex-guarded map keyed by wallet. Both conditional operations run under
/// a single lock acquisition, which gives the same at-most-once guarantees
/// the Postgres backend gets from its unique constraints.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<String, ClaimRecord>>,
}

#[async_trait]
impl ClaimStore for MemoryStore {
    async fn find_by_wallet(&self, eth_wallet: &str) -> Result<Option<ClaimRecord>, StoreError> {
        Ok(self.records.lock().await.get(eth_wallet).cloned())
    }

    async fn create(&self, record: &ClaimRecord) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        if records.contains_key(&record.eth_wallet) {
            return Err(StoreError::Conflict);
        }
        records.insert(record.eth_wallet.clone(), record.clone());
        Ok(())
    }

    async fn append_phase(&self, eth_wallet: &str, entry: &PhaseEntry) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        let record = records.get_mut(eth_wallet).ok_or(StoreError::NotFound)?;
        if record.has_phase(entry.phase) {
            return Err(StoreError::Conflict);
        }
        record.claimed_phases.push(entry.clone());
        Ok(())
    }

    async fn list(&self, page: u32, page_size: u32) -> Result<Page<ClaimRecord>, StoreError> {
        let records = self.records.lock().await;
        let total = records.len() as u64;
        let skip = (page.saturating_sub(1) as usize) * page_size as usize;
        let items = records
            .values()
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect();
        Ok(Page {
            items,
            page,
            page_size,
            total,
        })
    }
}

/* ==========================================
   Postgres implementation (feature = "postgres")
   ========================================== */

#[cfg(feature = "postgres")]
pub mod postgres {
    use super::*;
    use std::time::Duration;

    use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
    use sqlx::Row;

    const SCHEMA: &str = r#"
        CREATE TABLE IF NOT EXISTS claims (
          eth_wallet   TEXT PRIMARY KEY,
          sol_wallet   TEXT NOT NULL,
          claimed_nfts JSONB NOT NULL,
          token_amount BIGINT NOT NULL,
          status       TEXT NOT NULL DEFAULT 'pending',
          created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
        );
        CREATE TABLE IF NOT EXISTS claim_phases (
          eth_wallet TEXT NOT NULL REFERENCES claims(eth_wallet) ON DELETE CASCADE,
          phase      TEXT NOT NULL,
          claimed_at TIMESTAMPTZ NOT NULL,
          tx         TEXT,
          PRIMARY KEY (eth_wallet, phase)
        );
    "#;

    #[derive(Clone)]
    pub struct PgStore {
        pool: PgPool,
    }

    impl PgStore {
        pub async fn connect(dsn: &str, max_connections: u32) -> Result<Self, StoreError> {
            let pool = PgPoolOptions::new()
                .max_connections(max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(dsn)
                .await
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            Ok(Self { pool })
        }

        /// Apply the schema (idempotent). Goes through the simple query
        /// protocol, which allows the multi-statement DDL.
        pub async fn migrate(&self) -> Result<(), StoreError> {
            use sqlx::Executor;
            self.pool.execute(SCHEMA).await.map_err(db_err)?;
            Ok(())
        }

        async fn phases_for(&self, eth_wallet: &str) -> Result<Vec<PhaseEntry>, StoreError> {
            let rows = sqlx::query(
                "SELECT phase, claimed_at, tx FROM claim_phases \
                 WHERE eth_wallet = $1 ORDER BY claimed_at, phase",
            )
            .bind(eth_wallet)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            rows.iter().map(decode_phase).collect()
        }
    }

    fn db_err(e: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &e {
            match db.code().as_deref() {
                // 23505 unique_violation, 23503 foreign_key_violation
                Some("23505") => return StoreError::Conflict,
                Some("23503") => return StoreError::NotFound,
                _ => {}
            }
        }
        StoreError::Unavailable(e.to_string())
    }

    fn decode_phase(row: &PgRow) -> Result<PhaseEntry, StoreError> {
        let phase: String = row.get("phase");
        let phase = phase
            .parse::<Phase>()
            .map_err(|_| StoreError::Unavailable(format!("unknown phase {phase:?} in store")))?;
        Ok(PhaseEntry {
            phase,
            claimed_at: row.get("claimed_at"),
            tx: row.get("tx"),
        })
    }

    fn decode_record(row: &PgRow, phases: Vec<PhaseEntry>) -> Result<ClaimRecord, StoreError> {
        let status: String = row.get("status");
        let status = ClaimStatus::parse(&status)
            .ok_or_else(|| StoreError::Unavailable(format!("unknown status {status:?}")))?;
        let nfts: serde_json::Value = row.get("claimed_nfts");
        let claimed_nfts: Vec<ClaimedNft> =
            serde_json::from_value(nfts).map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let token_amount: i64 = row.get("token_amount");
        Ok(ClaimRecord {
            eth_wallet: row.get("eth_wallet"),
            sol_wallet: row.get("sol_wallet"),
            claimed_nfts,
            token_amount: token_amount as u64,
            claimed_phases: phases,
            status,
        })
    }

    #[async_trait]
    impl ClaimStore for PgStore {
        async fn ping(&self) -> Result<(), StoreError> {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
            Ok(())
        }

        async fn find_by_wallet(
            &self,
            eth_wallet: &str,
        ) -> Result<Option<ClaimRecord>, StoreError> {
            let row = sqlx::query(
                "SELECT eth_wallet, sol_wallet, claimed_nfts, token_amount, status \
                 FROM claims WHERE eth_wallet = $1",
            )
            .bind(eth_wallet)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            match row {
                None => Ok(None),
                Some(row) => {
                    let phases = self.phases_for(eth_wallet).await?;
                    Ok(Some(decode_record(&row, phases)?))
                }
            }
        }

        async fn create(&self, record: &ClaimRecord) -> Result<(), StoreError> {
            let nfts = serde_json::to_value(&record.claimed_nfts)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;

            let mut tx = self.pool.begin().await.map_err(db_err)?;
            // The primary key on eth_wallet makes a concurrent duplicate
            // create surface as Conflict instead of a second record.
            sqlx::query(
                "INSERT INTO claims (eth_wallet, sol_wallet, claimed_nfts, token_amount, status) \
                 VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(&record.eth_wallet)
            .bind(&record.sol_wallet)
            .bind(nfts)
            .bind(record.token_amount as i64)
            .bind(record.status.as_str())
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

            for entry in &record.claimed_phases {
                sqlx::query(
                    "INSERT INTO claim_phases (eth_wallet, phase, claimed_at, tx) \
                     VALUES ($1, $2, $3, $4)",
                )
                .bind(&record.eth_wallet)
                .bind(entry.phase.as_str())
                .bind(entry.claimed_at)
                .bind(&entry.tx)
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
            }

            tx.commit().await.map_err(db_err)?;
            Ok(())
        }

        async fn append_phase(
            &self,
            eth_wallet: &str,
            entry: &PhaseEntry,
        ) -> Result<(), StoreError> {
            // Append-iff-absent in one statement; the (eth_wallet, phase)
            // primary key closes the duplicate-claim race.
            let result = sqlx::query(
                "INSERT INTO claim_phases (eth_wallet, phase, claimed_at, tx) \
                 VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (eth_wallet, phase) DO NOTHING",
            )
            .bind(eth_wallet)
            .bind(entry.phase.as_str())
            .bind(entry.claimed_at)
            .bind(&entry.tx)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

            if result.rows_affected() == 0 {
                return Err(StoreError::Conflict);
            }
            Ok(())
        }

        async fn list(&self, page: u32, page_size: u32) -> Result<Page<ClaimRecord>, StoreError> {
            let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims")
                .fetch_one(&self.pool)
                .await
                .map_err(db_err)?;

            let offset = (page.saturating_sub(1) as i64) * page_size as i64;
            let rows = sqlx::query(
                "SELECT eth_wallet, sol_wallet, claimed_nfts, token_amount, status \
                 FROM claims ORDER BY created_at DESC LIMIT $1 OFFSET $2",
            )
            .bind(page_size as i64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

            let mut items = Vec::with_capacity(rows.len());
            for row in &rows {
                let wallet: String = row.get("eth_wallet");
                let phases = self.phases_for(&wallet).await?;
                items.push(decode_record(row, phases)?);
            }
            Ok(Page {
                items,
                page,
                page_size,
                total: total as u64,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(wallet: &str) -> ClaimRecord {
        ClaimRecord {
            eth_wallet: wallet.to_string(),
            sol_wallet: "9wfu".to_string(),
            claimed_nfts: vec![ClaimedNft {
                token_id: 1,
                rarity: Tier::Legendary,
                allocation: 60_000_000,
                full_allocation: 400_000_000,
            }],
            token_amount: 400_000_000,
            claimed_phases: vec![PhaseEntry {
                phase: Phase::Tge,
                claimed_at: Utc::now(),
                tx: None,
            }],
            status: ClaimStatus::Pending,
        }
    }

    #[tokio::test]
    async fn create_is_at_most_once_per_wallet() {
        let store = MemoryStore::default();
        store.create(&record("0xaaa")).await.unwrap();
        let err = store.create(&record("0xaaa")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let found = store.find_by_wallet("0xaaa").await.unwrap().unwrap();
        assert_eq!(found.claimed_phases.len(), 1);
        assert_eq!(found.token_amount, 400_000_000);
    }

    #[tokio::test]
    async fn append_phase_is_append_iff_absent() {
        let store = MemoryStore::default();
        store.create(&record("0xaaa")).await.unwrap();

        let entry = PhaseEntry {
            phase: Phase::Month1,
            claimed_at: Utc::now(),
            tx: None,
        };
        store.append_phase("0xaaa", &entry).await.unwrap();
        let err = store.append_phase("0xaaa", &entry).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));

        let found = store.find_by_wallet("0xaaa").await.unwrap().unwrap();
        assert_eq!(found.claimed_phases.len(), 2);
        // Everything outside claimed_phases stays untouched.
        assert_eq!(found.claimed_nfts, record("0xaaa").claimed_nfts);
    }

    #[tokio::test]
    async fn append_phase_without_record_is_not_found() {
        let store = MemoryStore::default();
        let entry = PhaseEntry {
            phase: Phase::Tge,
            claimed_at: Utc::now(),
            tx: None,
        };
        let err = store.append_phase("0xmissing", &entry).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn list_pages_through_records() {
        let store = MemoryStore::default();
        for i in 0..5 {
            store.create(&record(&format!("0x{i:03}"))).await.unwrap();
        }
        let page = store.list(1, 2).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        let page = store.list(3, 2).await.unwrap();
        assert_eq!(page.items.len(), 1);
        let page = store.list(4, 2).await.unwrap();
        assert!(page.items.is_empty());
    }

    #[test]
    fn record_serializes_with_wire_field_names() {
        let json = serde_json::to_value(record("0xaaa")).unwrap();
        assert_eq!(json["ethWallet"], "0xaaa");
        assert_eq!(json["tokenAmount"], 400_000_000u64);
        assert_eq!(json["claimedNFTs"][0]["fullAllocation"], 400_000_000u64);
        assert_eq!(json["claimedPhases"][0]["phase"], "TGE");
        assert_eq!(json["status"], "pending");
    }
}
