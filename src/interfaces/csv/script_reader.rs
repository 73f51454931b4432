use crate::domain::account::UserId;
use crate::error::{Result, StorefrontError};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

/// What a script row makes a user or admin do.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    AddItem,
    RemoveItem,
    ClearCart,
    Deposit,
    /// `target` is a payment method key or `balance`.
    Checkout,
    Screenshot,
    Cancel,
    Approve,
    Reject,
    Pending,
    Stats,
    /// Top accounts by balance; `amount` caps the list (10 by default).
    Users,
    /// Pauses the script for `amount` seconds.
    Wait,
}

/// One chat interaction replayed by the CLI.
///
/// For `approve`/`reject`, `user` is the admin and `target` is either the
/// customer's user id or a literal payment id.
#[derive(Debug, Deserialize, PartialEq, Clone)]
pub struct ScriptEvent {
    pub action: Action,
    pub user: UserId,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub note: Option<String>,
}

impl ScriptEvent {
    pub fn require_target(&self) -> Result<&str> {
        self.target
            .as_deref()
            .ok_or_else(|| StorefrontError::ValidationError(format!("{:?} needs a target", self.action)))
    }

    pub fn require_amount(&self) -> Result<Decimal> {
        self.amount
            .ok_or_else(|| StorefrontError::ValidationError(format!("{:?} needs an amount", self.action)))
    }
}

/// Reads script events from a CSV source with the header
/// `action,user,target,amount,note`.
pub struct ScriptReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ScriptReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes the rows.
    pub fn events(self) -> impl Iterator<Item = Result<ScriptEvent>> {
        self.reader
            .into_deserialize()
            .map(|result| result.map_err(StorefrontError::from))
    }
}
