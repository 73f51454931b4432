use super::account::{UserAccount, UserId};
use super::catalog::{Product, ProductId};
use super::payment::{MessageRef, PendingPayment};
use super::transaction::Transaction;
use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Everything the payment core persists.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub accounts: Vec<UserAccount>,
    pub transactions: Vec<Transaction>,
    pub pending_payments: Vec<PendingPayment>,
}

/// Durable checkpoint of the ledger and registry aggregates.
///
/// Saves are upserts so that a failed checkpoint can simply be written again.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn load(&self) -> Result<Snapshot>;
    async fn save_user(&self, account: &UserAccount, transactions: &[Transaction]) -> Result<()>;
    async fn save_payment(&self, payment: &PendingPayment) -> Result<()>;
    async fn remove_payment(&self, payment_id: &str) -> Result<()>;
}

pub type SnapshotStoreRef = Arc<dyn SnapshotStore>;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn product(&self, product_id: ProductId) -> Option<Product>;
}

pub trait AdminDirectory: Send + Sync {
    fn is_admin(&self, user_id: UserId) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: String,
}

impl Button {
    pub fn new(label: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: action.into(),
        }
    }
}

/// Rows of inline buttons.
pub type Keyboard = Vec<Vec<Button>>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OutgoingMessage {
    pub text: String,
    pub keyboard: Option<Keyboard>,
    /// Platform reference of a photo to send along with the text.
    pub photo: Option<String>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }

    pub fn with_photo(mut self, photo: Option<String>) -> Self {
        self.photo = photo;
        self
    }
}

/// Admin channel a payment is posted to for review.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalChannel {
    Payments,
    Orders,
}

/// Outbound side of the chat platform.
///
/// Implementations may block on network I/O. Callers never hold registry or
/// ledger locks across these calls.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_user(
        &self,
        user_id: UserId,
        message: OutgoingMessage,
    ) -> std::result::Result<MessageRef, NotifyError>;

    async fn notify_admins(&self, message: OutgoingMessage) -> std::result::Result<(), NotifyError>;

    async fn post_for_approval(
        &self,
        channel: ApprovalChannel,
        message: OutgoingMessage,
    ) -> std::result::Result<MessageRef, NotifyError>;

    async fn update_approval_message(
        &self,
        message: &MessageRef,
        appended_text: &str,
    ) -> std::result::Result<(), NotifyError>;

    async fn edit_message(
        &self,
        message: &MessageRef,
        replacement: OutgoingMessage,
    ) -> std::result::Result<(), NotifyError>;
}

pub type NotifierRef = Arc<dyn Notifier>;
pub type CatalogRef = Arc<dyn Catalog>;
pub type AdminDirectoryRef = Arc<dyn AdminDirectory>;

/// Answers the interaction that triggered a workflow step.
///
/// A text message can only be answered with a new message, while a button
/// press can also rewrite the message that carried the button.
#[async_trait]
pub trait Responder: Send + Sync {
    async fn reply(&self, text: String, keyboard: Option<Keyboard>)
    -> std::result::Result<(), NotifyError>;

    async fn edit_in_place(
        &self,
        text: String,
        keyboard: Option<Keyboard>,
    ) -> std::result::Result<(), NotifyError>;
}
