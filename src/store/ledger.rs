//! In-memory approval ledger.
//!
//! Constructed once at startup and cloned into the orchestrator and router.
//! Holds at most one record per address; listing order is the order in which
//! addresses were first reported.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::approval::ApprovalRecord;

/// One row of a ledger listing. `index` is 1-based.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub index: usize,
    pub address: String,
    pub record: ApprovalRecord,
}

/// Shared, cheaply-cloneable approval ledger.
#[derive(Clone, Default)]
pub struct ApprovalLedger(Arc<RwLock<IndexMap<String, ApprovalRecord>>>);

impl ApprovalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record for `address`.
    /// A re-report always re-opens the address for processing.
    pub async fn record(
        &self,
        address: &str,
        transaction_hash: &str,
        approved_amount: &str,
        reported_at: DateTime<Utc>,
    ) {
        let record = ApprovalRecord {
            address: address.to_string(),
            transaction_hash: transaction_hash.to_string(),
            approved_amount: approved_amount.to_string(),
            reported_at,
            processed: false,
        };

        let replaced = self.0.write().await.insert(address.to_string(), record);
        if let Some(previous) = replaced {
            tracing::info!(
                address,
                previous_tx = %previous.transaction_hash,
                was_processed = previous.processed,
                "approval re-reported, record replaced"
            );
        }
    }

    pub async fn get(&self, address: &str) -> Option<ApprovalRecord> {
        self.0.read().await.get(address).cloned()
    }

    /// Mark the approval identified by `transaction_hash` as processed.
    ///
    /// Returns `Ok(false)` without touching the record when the address has
    /// been re-reported with a different transaction since it was read.
    pub async fn mark_processed(
        &self,
        address: &str,
        transaction_hash: &str,
    ) -> Result<bool, AppError> {
        let mut records = self.0.write().await;
        match records.get_mut(address) {
            Some(record) if record.transaction_hash == transaction_hash => {
                record.processed = true;
                Ok(true)
            }
            Some(record) => {
                tracing::info!(
                    address,
                    transferred_for = transaction_hash,
                    current_tx = %record.transaction_hash,
                    "approval superseded during transfer, left open"
                );
                Ok(false)
            }
            None => Err(AppError::UnknownAddress(address.to_string())),
        }
    }

    /// Snapshot of all records in insertion order.
    pub async fn list(&self) -> Vec<LedgerEntry> {
        self.0
            .read()
            .await
            .iter()
            .enumerate()
            .map(|(i, (address, record))| LedgerEntry {
                index: i + 1,
                address: address.clone(),
                record: record.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.0.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_then_get() {
        let ledger = ApprovalLedger::new();
        let now = Utc::now();
        ledger.record("T1", "h1", "50", now).await;

        let rec = ledger.get("T1").await.unwrap();
        assert_eq!(rec.transaction_hash, "h1");
        assert_eq!(rec.approved_amount, "50");
        assert_eq!(rec.reported_at, now);
        assert!(!rec.processed);
        assert!(ledger.get("t1").await.is_none(), "addresses are case-sensitive");
    }

    #[tokio::test]
    async fn test_rereport_overwrites_and_resets_processed() {
        let ledger = ApprovalLedger::new();
        ledger.record("T1", "h1", "50", Utc::now()).await;
        assert!(ledger.mark_processed("T1", "h1").await.unwrap());
        assert!(ledger.get("T1").await.unwrap().processed);

        ledger.record("T1", "h2", "75", Utc::now()).await;
        let rec = ledger.get("T1").await.unwrap();
        assert_eq!(rec.transaction_hash, "h2");
        assert_eq!(rec.approved_amount, "75");
        assert!(!rec.processed);
        assert_eq!(ledger.len().await, 1);
    }

    #[tokio::test]
    async fn test_mark_processed_unknown_address() {
        let ledger = ApprovalLedger::new();
        let err = ledger.mark_processed("nope", "h1").await.unwrap_err();
        assert!(matches!(err, AppError::UnknownAddress(a) if a == "nope"));
    }

    #[tokio::test]
    async fn test_mark_processed_skips_superseded_record() {
        let ledger = ApprovalLedger::new();
        ledger.record("T1", "h1", "50", Utc::now()).await;
        ledger.record("T1", "h2", "75", Utc::now()).await;

        assert!(!ledger.mark_processed("T1", "h1").await.unwrap());
        let rec = ledger.get("T1").await.unwrap();
        assert_eq!(rec.transaction_hash, "h2");
        assert!(!rec.processed);
    }

    #[tokio::test]
    async fn test_list_keeps_first_report_order() {
        let ledger = ApprovalLedger::new();
        assert!(ledger.list().await.is_empty());

        ledger.record("A", "h1", "1", Utc::now()).await;
        ledger.record("B", "h2", "2", Utc::now()).await;
        ledger.record("A", "h3", "3", Utc::now()).await;

        let entries = ledger.list().await;
        let rows: Vec<(usize, &str, &str)> = entries
            .iter()
            .map(|e| (e.index, e.address.as_str(), e.record.transaction_hash.as_str()))
            .collect();
        assert_eq!(rows, vec![(1, "A", "h3"), (2, "B", "h2")]);
    }

    #[tokio::test]
    async fn test_list_is_a_snapshot() {
        let ledger = ApprovalLedger::new();
        ledger.record("A", "h1", "1", Utc::now()).await;
        let snapshot = ledger.list().await;

        ledger.record("B", "h2", "2", Utc::now()).await;
        ledger.mark_processed("A", "h1").await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(!snapshot[0].record.processed);
    }
}
