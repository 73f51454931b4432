use super::account::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Purchase,
}

/// An immutable ledger entry.
///
/// `amount` is signed: positive for deposits (including refunds), negative
/// for purchases. Folding a user's log yields their balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: u64,
    pub user_id: UserId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Sums a transaction log into a balance.
pub fn fold_balance<'a>(transactions: impl IntoIterator<Item = &'a Transaction>) -> Decimal {
    transactions.into_iter().map(|tx| tx.amount).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn tx(id: u64, kind: TransactionKind, amount: Decimal) -> Transaction {
        Transaction {
            id,
            user_id: 1,
            kind,
            amount,
            description: String::new(),
            screenshot: None,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_fold_balance() {
        let log = vec![
            tx(1, TransactionKind::Deposit, dec!(1000)),
            tx(2, TransactionKind::Purchase, dec!(-450)),
            tx(3, TransactionKind::Deposit, dec!(450)),
        ];
        assert_eq!(fold_balance(&log), dec!(1000));
    }

    #[test]
    fn test_transaction_json_shape() {
        let json = serde_json::to_value(tx(7, TransactionKind::Purchase, dec!(-10))).unwrap();
        assert_eq!(json["kind"], "purchase");
        assert_eq!(json["amount"], "-10");
        assert!(json.get("screenshot").is_none());
    }
}
