use super::account::UserId;
use super::cart::CartSnapshot;
use super::transaction::TransactionKind;
use crate::error::{Result, StorefrontError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type PaymentId = String;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum PaymentKind {
    Deposit,
    Purchase,
}

impl PaymentKind {
    pub fn id_prefix(self) -> &'static str {
        match self {
            PaymentKind::Deposit => "DEP",
            PaymentKind::Purchase => "ORD",
        }
    }
}

impl From<PaymentKind> for TransactionKind {
    fn from(kind: PaymentKind) -> Self {
        match kind {
            PaymentKind::Deposit => TransactionKind::Deposit,
            PaymentKind::Purchase => TransactionKind::Purchase,
        }
    }
}

/// Builds a payment id encoding the owner and creation time.
pub fn payment_id(kind: PaymentKind, user_id: UserId, at: DateTime<Utc>) -> PaymentId {
    format!("{}_{}_{}", kind.id_prefix(), user_id, at.timestamp_millis())
}

/// How the user pays.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PaymentMethod {
    /// Paid from the internal balance at submission time.
    Balance,
    /// Paid outside the bot and proven with a screenshot.
    External { key: String, name: String },
}

impl PaymentMethod {
    pub fn is_balance(&self) -> bool {
        matches!(self, PaymentMethod::Balance)
    }

    pub fn label(&self) -> &str {
        match self {
            PaymentMethod::Balance => "Bot balance",
            PaymentMethod::External { name, .. } => name,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    AwaitingScreenshot,
    UserSubmitted,
    Approved,
    Rejected,
    Expired,
    UserCancelled,
}

impl PaymentState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PaymentState::Approved
                | PaymentState::Rejected
                | PaymentState::Expired
                | PaymentState::UserCancelled
        )
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentState::AwaitingScreenshot => "awaiting_screenshot",
            PaymentState::UserSubmitted => "user_submitted",
            PaymentState::Approved => "approved",
            PaymentState::Rejected => "rejected",
            PaymentState::Expired => "expired",
            PaymentState::UserCancelled => "user_cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Decision {
    Approve,
    Reject { reason: Option<String> },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CancelReason {
    Timeout,
    User,
}

/// Discount granted for paying from the balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Discount {
    pub percent: Decimal,
    pub amount: Decimal,
    pub original_total: Decimal,
}

/// Opaque handle to a message posted by the notification backend.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
pub struct MessageRef {
    pub chat_id: i64,
    pub message_id: i64,
}

/// A payment waiting for proof and/or an admin decision.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct PendingPayment {
    pub id: PaymentId,
    pub user_id: UserId,
    #[serde(default)]
    pub username: Option<String>,
    pub kind: PaymentKind,
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[serde(default)]
    pub cart: Option<CartSnapshot>,
    #[serde(default)]
    pub discount: Option<Discount>,
    pub state: PaymentState,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub screenshot: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub confirmed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approval_message: Option<MessageRef>,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl PendingPayment {
    pub fn deposit(
        id: PaymentId,
        user_id: UserId,
        amount: Decimal,
        method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::new(id, user_id, PaymentKind::Deposit, amount, method, created_at)
    }

    pub fn purchase(
        id: PaymentId,
        user_id: UserId,
        cart: CartSnapshot,
        method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut payment = Self::new(
            id,
            user_id,
            PaymentKind::Purchase,
            cart.total,
            method,
            created_at,
        );
        payment.cart = Some(cart);
        payment
    }

    fn new(
        id: PaymentId,
        user_id: UserId,
        kind: PaymentKind,
        amount: Decimal,
        method: PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            username: None,
            kind,
            amount,
            method,
            cart: None,
            discount: None,
            state: PaymentState::AwaitingScreenshot,
            created_at,
            screenshot: None,
            comment: None,
            confirmed_at: None,
            approval_message: None,
            rejection_reason: None,
        }
    }

    pub fn with_username(mut self, username: Option<String>) -> Self {
        self.username = username;
        self
    }

    /// Applies a percentage discount to the amount due.
    pub fn with_discount(mut self, percent: Decimal) -> Self {
        if percent > Decimal::ZERO {
            let original_total = self.amount;
            let amount = (original_total * percent / Decimal::ONE_HUNDRED).round_dp(2);
            self.amount = original_total - amount;
            self.discount = Some(Discount {
                percent,
                amount,
                original_total,
            });
        }
        self
    }

    /// Whether this payment was funded from the balance at submission.
    pub fn is_prepaid(&self) -> bool {
        self.kind == PaymentKind::Purchase && self.method.is_balance()
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn attach_screenshot(
        &mut self,
        screenshot: String,
        comment: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.expect_state(PaymentState::AwaitingScreenshot)?;
        self.state = PaymentState::UserSubmitted;
        self.screenshot = Some(screenshot);
        self.comment = comment;
        self.confirmed_at = Some(at);
        Ok(())
    }

    /// Marks a payment whose proof came with its creation (a balance debit).
    pub fn submit_prepaid(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.expect_state(PaymentState::AwaitingScreenshot)?;
        self.state = PaymentState::UserSubmitted;
        self.confirmed_at = Some(at);
        Ok(())
    }

    pub fn decide(&mut self, decision: &Decision) -> Result<()> {
        self.expect_state(PaymentState::UserSubmitted)?;
        match decision {
            Decision::Approve => self.state = PaymentState::Approved,
            Decision::Reject { reason } => {
                self.state = PaymentState::Rejected;
                self.rejection_reason = reason.clone();
            }
        }
        Ok(())
    }

    /// Expiry and user cancellation only apply before the user has
    /// submitted proof; after that the admin owns the decision.
    pub fn cancel(&mut self, reason: CancelReason) -> Result<()> {
        self.expect_state(PaymentState::AwaitingScreenshot)?;
        self.state = match reason {
            CancelReason::Timeout => PaymentState::Expired,
            CancelReason::User => PaymentState::UserCancelled,
        };
        Ok(())
    }

    fn expect_state(&self, expected: PaymentState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(StorefrontError::InvalidState {
                payment_id: self.id.clone(),
                state: self.state,
            })
        }
    }
}
