//! Applies gateway-confirmed payments to local transactions.
//!
//! A confirmation arrives either actively (order query while the shopper's
//! page polls, or on the browser return) or passively (push notification).
//! Both paths end in the same guarded `done` transition, so a payment
//! confirmed twice is applied once.

use crate::{
    client::PaymentGateway,
    error::ReconcileError,
    models::{OrderQuery, PaymentTransaction, TransactionState, Transition},
    services::store::TransactionStore,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The transaction moved to `done` on this call.
    Confirmed { acquirer_reference: String },
    /// The transaction was already `done`; nothing changed.
    AlreadyConfirmed,
    /// The gateway does not report a completed payment (yet).
    NotConfirmed(String),
    /// The payment is confirmed remotely but the local state may not move.
    Refused(TransactionState),
}

impl ReconcileOutcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            ReconcileOutcome::Confirmed { .. } | ReconcileOutcome::AlreadyConfirmed
        )
    }
}

pub struct Reconciler {
    gateway: Arc<dyn PaymentGateway>,
    store: Arc<dyn TransactionStore>,
}

impl Reconciler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, store: Arc<dyn TransactionStore>) -> Self {
        Self { gateway, store }
    }

    /// Asks the gateway whether `reference` has been paid.
    ///
    /// Before payment there is no remote transaction id, so the order is
    /// looked up by the merchant reference. Only `trade_state == SUCCESS`
    /// counts as paid.
    pub async fn reconcile_by_query(&self, reference: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let query = self.gateway.query_order(reference).await.map_err(|e| {
            tracing::warn!(reference, error = %e, "WeChat Pay order query failed");
            ReconcileError::from(e)
        })?;

        match query.paid_transaction_id() {
            Some(transaction_id) => self.confirm(reference, transaction_id).await,
            None => Ok(ReconcileOutcome::NotConfirmed(describe(&query))),
        }
    }

    /// Applies an asynchronous payment notification.
    pub async fn reconcile_by_push(&self, raw: &[u8]) -> Result<ReconcileOutcome, ReconcileError> {
        let push = self.gateway.parse_push(raw).map_err(|e| {
            tracing::error!(error = %e, "Failed to parse WeChat Pay notification");
            ReconcileError::from(e)
        })?;
        tracing::info!(push = ?push, "WeChat Pay notification received");

        match push.confirmed_payment() {
            Some((out_trade_no, transaction_id)) => self.confirm(out_trade_no, transaction_id).await,
            None => Ok(ReconcileOutcome::NotConfirmed(format!(
                "return_code={}, result_code={}",
                push.return_code, push.result_code
            ))),
        }
    }

    /// Validates the payload of the shopper's browser return. The `order` key
    /// names the reference; a transaction not yet `done` is checked against
    /// the gateway.
    pub async fn validate_return(
        &self,
        form: &HashMap<String, String>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let reference = form
            .get("order")
            .filter(|r| !r.is_empty())
            .ok_or_else(|| ReconcileError::Validation("missing order reference".to_string()))?;

        let tx = self.find_one(reference).await?;
        if tx.state == TransactionState::Done {
            tracing::info!(reference = %reference, "Payment already validated");
            return Ok(ReconcileOutcome::AlreadyConfirmed);
        }

        self.reconcile_by_query(reference).await
    }

    /// The single transaction carrying `reference`.
    pub async fn find_one(&self, reference: &str) -> Result<PaymentTransaction, ReconcileError> {
        let mut found = self.store.search(reference).await?;
        match found.len() {
            1 => Ok(found.remove(0)),
            n => {
                let error_msg = format!(
                    "WeChat Pay: received data for reference {}; {}",
                    reference,
                    if n == 0 { "no order found" } else { "multiple orders found" }
                );
                tracing::info!("{}", error_msg);
                Err(ReconcileError::Validation(error_msg))
            }
        }
    }

    async fn confirm(
        &self,
        reference: &str,
        transaction_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let tx = self.find_one(reference).await?;

        match self.store.mark_done(tx.id, transaction_id).await? {
            Transition::Applied => {
                tracing::info!(
                    reference,
                    acquirer_reference = transaction_id,
                    "Payment confirmed"
                );
                Ok(ReconcileOutcome::Confirmed {
                    acquirer_reference: transaction_id.to_string(),
                })
            }
            Transition::AlreadyDone { acquirer_reference } => {
                if acquirer_reference.as_deref() != Some(transaction_id) {
                    tracing::warn!(
                        reference,
                        stored = ?acquirer_reference,
                        received = transaction_id,
                        "Confirmation for a done transaction carries another transaction id"
                    );
                }
                Ok(ReconcileOutcome::AlreadyConfirmed)
            }
            Transition::Refused(state) => {
                tracing::warn!(
                    reference,
                    state = %state,
                    "Paid remotely but local transaction cannot be confirmed"
                );
                Ok(ReconcileOutcome::Refused(state))
            }
        }
    }
}

fn describe(query: &OrderQuery) -> String {
    format!(
        "return_code={}, result_code={}, trade_state={:?}",
        query.return_code, query.result_code, query.trade_state
    )
}
