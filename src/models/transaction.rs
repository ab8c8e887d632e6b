use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a payment transaction.
///
/// `draft`, `pending` and `authorized` can still be confirmed; `done` is the
/// confirmed terminal state. `cancel` and `error` are terminal states owned by
/// the platform and are never moved by reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionState {
    Draft,
    Pending,
    Authorized,
    Done,
    Cancel,
    Error,
}

impl TransactionState {
    pub const RECONCILABLE: [TransactionState; 3] = [
        TransactionState::Draft,
        TransactionState::Pending,
        TransactionState::Authorized,
    ];

    pub fn is_reconcilable(self) -> bool {
        Self::RECONCILABLE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Draft => "draft",
            TransactionState::Pending => "pending",
            TransactionState::Authorized => "authorized",
            TransactionState::Done => "done",
            TransactionState::Cancel => "cancel",
            TransactionState::Error => "error",
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(TransactionState::Draft),
            "pending" => Ok(TransactionState::Pending),
            "authorized" => Ok(TransactionState::Authorized),
            "done" => Ok(TransactionState::Done),
            "cancel" => Ok(TransactionState::Cancel),
            "error" => Ok(TransactionState::Error),
            other => Err(format!("unknown transaction state: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: u64,
    pub reference: String,
    pub amount: Decimal,
    pub currency: String,
    pub state: TransactionState,
    pub acquirer_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields the platform supplies when checkout begins; the store assigns the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub reference: String,
    pub amount: Decimal,
    pub state: TransactionState,
}

impl NewTransaction {
    pub fn draft(reference: impl Into<String>, amount: Decimal) -> Self {
        Self {
            reference: reference.into(),
            amount,
            state: TransactionState::Draft,
        }
    }
}

/// Result of the guarded `done` transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Applied,
    AlreadyDone { acquirer_reference: Option<String> },
    Refused(TransactionState),
}

/// The shopping order a checkout session points at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutOrder {
    pub reference: String,
    pub amount_total: Decimal,
}

impl CheckoutOrder {
    /// Amount in fen, the unit WeChat Pay bills in.
    pub fn total_fee(&self) -> Option<u64> {
        use rust_decimal::prelude::ToPrimitive;
        self.amount_total
            .checked_mul(Decimal::ONE_HUNDRED)?
            .round()
            .to_u64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn state_round_trips_through_str() {
        for state in [
            TransactionState::Draft,
            TransactionState::Pending,
            TransactionState::Authorized,
            TransactionState::Done,
            TransactionState::Cancel,
            TransactionState::Error,
        ] {
            assert_eq!(state.as_str().parse::<TransactionState>(), Ok(state));
        }
        assert!("refunded".parse::<TransactionState>().is_err());
    }

    #[test]
    fn only_open_states_are_reconcilable() {
        assert!(TransactionState::Pending.is_reconcilable());
        assert!(!TransactionState::Done.is_reconcilable());
        assert!(!TransactionState::Cancel.is_reconcilable());
    }

    #[test]
    fn total_fee_is_in_fen() {
        let order = CheckoutOrder {
            reference: "SO1001".to_string(),
            amount_total: dec!(12.34),
        };
        assert_eq!(order.total_fee(), Some(1234));

        let negative = CheckoutOrder {
            reference: "SO1002".to_string(),
            amount_total: dec!(-1),
        };
        assert_eq!(negative.total_fee(), None);
    }

    #[test]
    fn total_fee_rejects_amounts_beyond_range() {
        let huge = CheckoutOrder {
            reference: "SO9".to_string(),
            amount_total: Decimal::MAX,
        };
        assert_eq!(huge.total_fee(), None);

        let too_many_fen = CheckoutOrder {
            reference: "SO10".to_string(),
            amount_total: Decimal::from(u64::MAX),
        };
        assert_eq!(too_many_fen.total_fee(), None);
    }
}
