use crate::error::{Result, StorefrontError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Chat platform user identifier.
pub type UserId = i64;

/// Represents a non-negative monetary value held on an account.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balance(pub Decimal);

/// Represents a positive monetary amount for ledger operations.
///
/// Ensures that credits and debits are always strictly positive.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(StorefrontError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = StorefrontError;

    fn try_from(value: Decimal) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Add for Balance {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Balance {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Balance {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Balance {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

/// The person on the other end of a chat interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Customer {
    pub id: UserId,
    pub username: Option<String>,
}

impl Customer {
    pub fn new(id: UserId) -> Self {
        Self { id, username: None }
    }

    pub fn with_username(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: Some(username.into()),
        }
    }
}

/// A storefront user's account.
///
/// The balance is a cache of the user's transaction log and is only ever
/// changed together with an appended transaction.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserAccount {
    pub user_id: UserId,
    pub balance: Balance,
    /// Total paid for orders, from balance or externally.
    pub total_spent: Balance,
    pub total_orders: u32,
    pub registered_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserAccount {
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance: Balance::ZERO,
            total_spent: Balance::ZERO,
            total_orders: 0,
            registered_at: now,
            last_activity: now,
        }
    }

    /// Adds funds to the balance
    pub fn credit(&mut self, amount: Amount) {
        self.balance += amount.into();
    }

    /// Removes funds from the balance if sufficient and counts the order
    pub fn debit(&mut self, amount: Amount) -> Result<()> {
        let amount = Balance::from(amount);
        if self.balance >= amount {
            self.balance -= amount;
            self.record_order(amount);
            Ok(())
        } else {
            Err(StorefrontError::InsufficientFunds {
                required: amount.value(),
                available: self.balance.value(),
            })
        }
    }

    /// Undoes a `debit` whose order was never placed
    pub fn reverse_debit(&mut self, amount: Amount) {
        let amount = Balance::from(amount);
        self.balance += amount;
        self.total_spent -= amount;
        self.total_orders = self.total_orders.saturating_sub(1);
    }

    /// Counts an order without touching the balance
    pub fn record_order(&mut self, amount: Balance) {
        self.total_spent += amount;
        self.total_orders += 1;
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = now;
    }
}
