use crate::{
    error::StoreError,
    models::{NewTransaction, PaymentTransaction, TransactionState, Transition},
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

pub const CURRENCY: &str = "CNY";

/// Record store for payment transactions.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn insert(&self, tx: NewTransaction) -> Result<PaymentTransaction, StoreError>;

    /// Inserts only when no transaction carries the same reference.
    /// Returns `None` if the reference is taken.
    async fn insert_new(&self, tx: NewTransaction) -> Result<Option<PaymentTransaction>, StoreError>;

    /// Every transaction carrying `reference`. Uniqueness is checked by callers.
    async fn search(&self, reference: &str) -> Result<Vec<PaymentTransaction>, StoreError>;

    /// Atomically moves a reconcilable transaction to `done` and records the
    /// remote transaction id. A transaction already `done` is left untouched.
    async fn mark_done(&self, id: u64, acquirer_reference: &str) -> Result<Transition, StoreError>;

    async fn ping(&self) -> bool;
}

/// Thread-safe in-memory store. State transitions happen under one write lock.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<u64, PaymentTransaction>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, tx: NewTransaction) -> PaymentTransaction {
        let now = Utc::now();
        PaymentTransaction {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            reference: tx.reference,
            amount: tx.amount,
            currency: CURRENCY.to_string(),
            state: tx.state,
            acquirer_reference: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn insert(&self, tx: NewTransaction) -> Result<PaymentTransaction, StoreError> {
        let record = self.record(tx);
        self.transactions
            .write()
            .await
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn insert_new(&self, tx: NewTransaction) -> Result<Option<PaymentTransaction>, StoreError> {
        let mut transactions = self.transactions.write().await;
        if transactions.values().any(|existing| existing.reference == tx.reference) {
            return Ok(None);
        }

        let record = self.record(tx);
        transactions.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn search(&self, reference: &str) -> Result<Vec<PaymentTransaction>, StoreError> {
        let transactions = self.transactions.read().await;
        let mut found: Vec<_> = transactions
            .values()
            .filter(|tx| tx.reference == reference)
            .cloned()
            .collect();
        found.sort_by_key(|tx| tx.id);
        Ok(found)
    }

    async fn mark_done(&self, id: u64, acquirer_reference: &str) -> Result<Transition, StoreError> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions.get_mut(&id).ok_or(StoreError::NotFound(id))?;

        Ok(match tx.state {
            TransactionState::Done => Transition::AlreadyDone {
                acquirer_reference: tx.acquirer_reference.clone(),
            },
            state if state.is_reconcilable() => {
                tx.state = TransactionState::Done;
                tx.acquirer_reference = Some(acquirer_reference.to_string());
                tx.updated_at = Utc::now();
                Transition::Applied
            }
            state => Transition::Refused(state),
        })
    }

    async fn ping(&self) -> bool {
        true
    }
}
