//! Transfer orchestration.
//!
//! Sizes every transfer from live chain state (never from the client-reported
//! amount), executes it at most once per approval and records the result in
//! the ledger only after the chain call succeeded.
//!
//! `execute_transfer` spans several network round-trips, so calls for the same
//! address are serialized through a per-address lock. Without it two operators
//! pressing "transfer" at once could both pass the `processed` check.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::chain::{ChainError, ChainGateway};
use crate::errors::AppError;
use crate::models::amount::{from_base_units, to_base_units};
use crate::models::approval::{StatusResult, TransferOutcome, TransferReceipt};
use crate::store::ledger::ApprovalLedger;

pub struct TransferOrchestrator {
    ledger: ApprovalLedger,
    gateway: Arc<dyn ChainGateway>,
    decimals: u32,
    /// address → lock held for the duration of a transfer
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TransferOrchestrator {
    pub fn new(ledger: ApprovalLedger, gateway: Arc<dyn ChainGateway>, decimals: u32) -> Self {
        Self {
            ledger,
            gateway,
            decimals,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, address: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(address.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    pub async fn execute_transfer(
        &self,
        user: &str,
        recipient: &str,
        fee_limit: u64,
    ) -> Result<TransferOutcome, AppError> {
        self.execute_transfer_with(user, recipient, fee_limit, || async {})
            .await
    }

    /// Like [`execute_transfer`](Self::execute_transfer), calling `on_start`
    /// once the approval has passed the lookup and processed checks and before
    /// any chain call is made.
    pub async fn execute_transfer_with<F, Fut>(
        &self,
        user: &str,
        recipient: &str,
        fee_limit: u64,
        on_start: F,
    ) -> Result<TransferOutcome, AppError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        // unknown addresses must not leave an entry in the lock table
        if self.ledger.get(user).await.is_none() {
            return Err(AppError::UnknownAddress(user.to_string()));
        }

        let lock = self.lock_for(user);
        let _guard = lock.lock().await;

        let record = self
            .ledger
            .get(user)
            .await
            .ok_or_else(|| AppError::UnknownAddress(user.to_string()))?;
        if record.processed {
            return Err(AppError::AlreadyProcessed(user.to_string()));
        }

        on_start().await;

        let status = self
            .read_status(user)
            .await
            .map_err(AppError::TransferExecution)?;
        let amount = status.allowance.min(status.balance);

        if amount <= Decimal::ZERO {
            tracing::info!(
                address = user,
                allowance = %status.allowance,
                balance = %status.balance,
                "nothing to transfer"
            );
            return Ok(TransferOutcome::NothingToTransfer {
                allowance: status.allowance,
                balance: status.balance,
            });
        }

        let base_units = to_base_units(amount, self.decimals).ok_or_else(|| {
            AppError::TransferExecution(ChainError::AmountOverflow(amount.to_string()))
        })?;
        if base_units == 0 {
            return Ok(TransferOutcome::NothingToTransfer {
                allowance: status.allowance,
                balance: status.balance,
            });
        }

        tracing::info!(
            address = user,
            recipient,
            amount = %amount,
            base_units = %base_units,
            reported_amount = %record.approved_amount,
            "executing transferFrom"
        );

        let transaction_id = self
            .gateway
            .transfer_from(user, recipient, base_units, fee_limit)
            .await
            .map_err(|e| {
                tracing::warn!(address = user, error = %e, "transferFrom failed");
                AppError::TransferExecution(e)
            })?;

        // A re-report that arrived meanwhile stays open for its own transfer.
        self.ledger
            .mark_processed(user, &record.transaction_hash)
            .await?;

        Ok(TransferOutcome::Transferred(TransferReceipt {
            amount,
            base_units,
            transaction_id,
        }))
    }

    /// Live allowance and balance. Never touches the ledger.
    pub async fn query_status(&self, user: &str) -> Result<StatusResult, AppError> {
        self.read_status(user).await.map_err(AppError::ChainQuery)
    }

    async fn read_status(&self, user: &str) -> Result<StatusResult, ChainError> {
        let (allowance, balance) = tokio::try_join!(
            self.gateway.allowance_of(user),
            self.gateway.balance_of(user)
        )?;
        Ok(StatusResult {
            allowance: from_base_units(allowance, self.decimals),
            balance: from_base_units(balance, self.decimals),
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Scripted gateway: fixed allowance/balance, records every transfer call.
    #[derive(Default)]
    pub(crate) struct MockGateway {
        pub allowance: StdMutex<u128>,
        pub balance: StdMutex<u128>,
        pub fail_transfer: StdMutex<bool>,
        pub fail_reads: StdMutex<bool>,
        pub transfer_delay: Option<Duration>,
        pub transfers: StdMutex<Vec<(String, String, u128, u64)>>,
        pub reads: AtomicUsize,
    }

    impl MockGateway {
        pub(crate) fn with(allowance: u128, balance: u128) -> Self {
            Self {
                allowance: StdMutex::new(allowance),
                balance: StdMutex::new(balance),
                ..Default::default()
            }
        }

        pub(crate) fn transfer_count(&self) -> usize {
            self.transfers.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChainGateway for MockGateway {
        async fn allowance_of(&self, _owner: &str) -> Result<u128, ChainError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if *self.fail_reads.lock().unwrap() {
                return Err(ChainError::Rejected("node unavailable".into()));
            }
            Ok(*self.allowance.lock().unwrap())
        }

        async fn balance_of(&self, _owner: &str) -> Result<u128, ChainError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if *self.fail_reads.lock().unwrap() {
                return Err(ChainError::Rejected("node unavailable".into()));
            }
            Ok(*self.balance.lock().unwrap())
        }

        async fn transfer_from(
            &self,
            from: &str,
            to: &str,
            amount: u128,
            fee_limit: u64,
        ) -> Result<String, ChainError> {
            if let Some(delay) = self.transfer_delay {
                tokio::time::sleep(delay).await;
            }
            if *self.fail_transfer.lock().unwrap() {
                return Err(ChainError::Rejected("REVERT opcode executed".into()));
            }
            let mut transfers = self.transfers.lock().unwrap();
            transfers.push((from.to_string(), to.to_string(), amount, fee_limit));
            Ok(format!("tx{}", transfers.len()))
        }
    }

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn setup(gateway: MockGateway) -> (ApprovalLedger, Arc<MockGateway>, TransferOrchestrator) {
        let ledger = ApprovalLedger::new();
        let gateway = Arc::new(gateway);
        let orchestrator = TransferOrchestrator::new(ledger.clone(), gateway.clone(), 6);
        (ledger, gateway, orchestrator)
    }

    #[tokio::test]
    async fn test_transfers_min_of_allowance_and_balance() {
        let (ledger, gateway, orch) = setup(MockGateway::with(30_000_000, 100_000_000));
        ledger.record("T1", "h1", "50", Utc::now()).await;
        assert!(!ledger.get("T1").await.unwrap().processed);

        let outcome = orch.execute_transfer("T1", "TPay", 100_000_000).await.unwrap();

        match outcome {
            TransferOutcome::Transferred(receipt) => {
                assert_eq!(receipt.amount, d("30"));
                assert_eq!(receipt.base_units, 30_000_000);
                assert_eq!(receipt.transaction_id, "tx1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(
            gateway.transfers.lock().unwrap()[0],
            ("T1".to_string(), "TPay".to_string(), 30_000_000, 100_000_000)
        );
        assert!(ledger.get("T1").await.unwrap().processed);
    }

    #[tokio::test]
    async fn test_balance_bounds_transfer_and_reported_amount_is_ignored() {
        let (ledger, gateway, orch) = setup(MockGateway::with(u128::MAX, 1_234_567));
        ledger.record("T1", "h1", "999999999", Utc::now()).await;

        orch.execute_transfer("T1", "TPay", 1).await.unwrap();

        assert_eq!(gateway.transfers.lock().unwrap()[0].2, 1_234_567);
    }

    #[tokio::test]
    async fn test_zero_allowance_is_nothing_to_transfer() {
        let (ledger, gateway, orch) = setup(MockGateway::with(0, 100_000_000));
        ledger.record("T1", "h1", "50", Utc::now()).await;

        let outcome = orch.execute_transfer("T1", "TPay", 1).await.unwrap();

        assert_eq!(
            outcome,
            TransferOutcome::NothingToTransfer {
                allowance: Decimal::ZERO,
                balance: d("100"),
            }
        );
        assert_eq!(gateway.transfer_count(), 0);
        assert!(!ledger.get("T1").await.unwrap().processed);
    }

    #[tokio::test]
    async fn test_second_transfer_is_rejected_as_already_processed() {
        let (ledger, gateway, orch) = setup(MockGateway::with(5_000_000, 5_000_000));
        ledger.record("T1", "h1", "5", Utc::now()).await;

        orch.execute_transfer("T1", "TPay", 1).await.unwrap();
        let err = orch.execute_transfer("T1", "TPay", 1).await.unwrap_err();

        assert!(matches!(err, AppError::AlreadyProcessed(a) if a == "T1"));
        assert_eq!(gateway.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_unknown_address_never_reaches_chain() {
        let (_ledger, gateway, orch) = setup(MockGateway::with(1, 1));

        let err = orch.execute_transfer("T404", "TPay", 1).await.unwrap_err();

        assert!(matches!(err, AppError::UnknownAddress(_)));
        assert_eq!(gateway.reads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rereport_reopens_processed_address() {
        let (ledger, gateway, orch) = setup(MockGateway::with(5_000_000, 5_000_000));
        ledger.record("T1", "h1", "5", Utc::now()).await;
        orch.execute_transfer("T1", "TPay", 1).await.unwrap();

        ledger.record("T1", "h2", "5", Utc::now()).await;
        assert!(!ledger.get("T1").await.unwrap().processed);

        let outcome = orch.execute_transfer("T1", "TPay", 1).await.unwrap();
        assert!(matches!(outcome, TransferOutcome::Transferred(_)));
        assert_eq!(gateway.transfer_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_ledger_unmarked() {
        let gateway = MockGateway::with(5_000_000, 5_000_000);
        *gateway.fail_transfer.lock().unwrap() = true;
        let (ledger, gateway, orch) = setup(gateway);
        ledger.record("T1", "h1", "5", Utc::now()).await;

        let err = orch.execute_transfer("T1", "TPay", 1).await.unwrap_err();
        assert!(matches!(err, AppError::TransferExecution(_)));
        assert!(!ledger.get("T1").await.unwrap().processed);

        // operator retry after the node recovers
        *gateway.fail_transfer.lock().unwrap() = false;
        let outcome = orch.execute_transfer("T1", "TPay", 1).await.unwrap();
        assert!(matches!(outcome, TransferOutcome::Transferred(_)));
    }

    #[tokio::test]
    async fn test_concurrent_transfers_execute_once() {
        let gateway = MockGateway {
            transfer_delay: Some(Duration::from_millis(50)),
            ..MockGateway::with(5_000_000, 5_000_000)
        };
        let (ledger, gateway, orch) = setup(gateway);
        let orch = Arc::new(orch);
        ledger.record("T1", "h1", "5", Utc::now()).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let orch = orch.clone();
                tokio::spawn(async move { orch.execute_transfer("T1", "TPay", 1).await })
            })
            .collect();

        let mut transferred = 0;
        let mut already = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(TransferOutcome::Transferred(_)) => transferred += 1,
                Err(AppError::AlreadyProcessed(_)) => already += 1,
                other => panic!("unexpected result: {:?}", other),
            }
        }

        assert_eq!(transferred, 1);
        assert_eq!(already, 7);
        assert_eq!(gateway.transfer_count(), 1);
    }

    #[tokio::test]
    async fn test_different_addresses_do_not_block_each_other() {
        let gateway = MockGateway {
            transfer_delay: Some(Duration::from_millis(200)),
            ..MockGateway::with(5_000_000, 5_000_000)
        };
        let (ledger, gateway, orch) = setup(gateway);
        let orch = Arc::new(orch);
        ledger.record("A", "h1", "5", Utc::now()).await;
        ledger.record("B", "h2", "5", Utc::now()).await;

        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(
            orch.execute_transfer("A", "TPay", 1),
            orch.execute_transfer("B", "TPay", 1)
        );
        assert!(a.is_ok() && b.is_ok());
        assert!(started.elapsed() < Duration::from_millis(390));
        assert_eq!(gateway.transfer_count(), 2);
    }

    #[tokio::test]
    async fn test_rereport_during_transfer_stays_open() {
        let gateway = MockGateway {
            transfer_delay: Some(Duration::from_millis(100)),
            ..MockGateway::with(5_000_000, 5_000_000)
        };
        let (ledger, gateway, orch) = setup(gateway);
        let orch = Arc::new(orch);
        ledger.record("T1", "h1", "5", Utc::now()).await;

        let in_flight = {
            let orch = orch.clone();
            tokio::spawn(async move { orch.execute_transfer("T1", "TPay", 1).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        ledger.record("T1", "h2", "5", Utc::now()).await;

        let first = in_flight.await.unwrap().unwrap();
        assert!(matches!(first, TransferOutcome::Transferred(_)));

        let rec = ledger.get("T1").await.unwrap();
        assert_eq!(rec.transaction_hash, "h2");
        assert!(!rec.processed);

        let second = orch.execute_transfer("T1", "TPay", 1).await.unwrap();
        assert!(matches!(second, TransferOutcome::Transferred(_)));
        assert!(ledger.get("T1").await.unwrap().processed);
        assert_eq!(gateway.transfer_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_addresses_do_not_grow_lock_table() {
        let (ledger, _gateway, orch) = setup(MockGateway::with(1, 1));
        ledger.record("T1", "h1", "1", Utc::now()).await;

        for i in 0..100 {
            let err = orch
                .execute_transfer(&format!("junk{}", i), "TPay", 1)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::UnknownAddress(_)));
        }
        assert!(orch.locks.is_empty());

        orch.execute_transfer("T1", "TPay", 1).await.unwrap();
        assert_eq!(orch.locks.len(), 1);
    }

    #[tokio::test]
    async fn test_on_start_runs_only_for_eligible_approvals() {
        let (ledger, gateway, orch) = setup(MockGateway::with(5_000_000, 5_000_000));
        ledger.record("T1", "h1", "5", Utc::now()).await;
        let counter = AtomicUsize::new(0);
        let started = &counter;
        let reads = &gateway.reads;

        orch.execute_transfer_with("T1", "TPay", 1, move || async move {
            // chain untouched at this point
            assert_eq!(reads.load(Ordering::SeqCst), 0);
            started.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();
        let err = orch
            .execute_transfer_with("T1", "TPay", 1, move || async move {
                started.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap_err();
        let _ = orch
            .execute_transfer_with("T404", "TPay", 1, move || async move {
                started.fetch_add(1, Ordering::SeqCst);
            })
            .await;

        assert!(matches!(err, AppError::AlreadyProcessed(_)));
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_query_status_is_read_only() {
        let (ledger, gateway, orch) = setup(MockGateway::with(30_000_000, 100_500_000));
        ledger.record("T1", "h1", "50", Utc::now()).await;
        let before = ledger.list().await;

        let status = orch.query_status("T1").await.unwrap();
        let unknown = orch.query_status("T404").await.unwrap();

        assert_eq!(status.allowance, d("30"));
        assert_eq!(status.balance, d("100.5"));
        assert_eq!(unknown, status);
        assert_eq!(ledger.list().await, before);
        assert_eq!(gateway.transfer_count(), 0);
    }

    #[tokio::test]
    async fn test_query_status_surfaces_chain_errors() {
        let gateway = MockGateway::with(1, 1);
        *gateway.fail_reads.lock().unwrap() = true;
        let (_ledger, _gateway, orch) = setup(gateway);

        let err = orch.query_status("T1").await.unwrap_err();
        assert!(matches!(err, AppError::ChainQuery(_)));
        assert!(err.to_string().contains("node unavailable"));
    }
}
