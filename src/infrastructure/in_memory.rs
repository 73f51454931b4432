use crate::domain::account::{UserAccount, UserId};
use crate::domain::catalog::{Product, ProductId};
use crate::domain::payment::{MessageRef, PaymentId, PendingPayment};
use crate::domain::ports::{
    AdminDirectory, ApprovalChannel, Catalog, Notifier, OutgoingMessage, Snapshot, SnapshotStore,
};
use crate::domain::transaction::Transaction;
use crate::error::{NotifyError, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct SnapshotState {
    accounts: BTreeMap<UserId, UserAccount>,
    transactions: BTreeMap<u64, Transaction>,
    payments: BTreeMap<PaymentId, PendingPayment>,
}

/// A thread-safe in-memory snapshot store.
///
/// Clones share the same state, so a test can keep a handle and inspect what
/// the ledger and registry checkpointed.
#[derive(Default, Clone)]
pub struct InMemorySnapshotStore {
    state: Arc<RwLock<SnapshotState>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let state = SnapshotState {
            accounts: snapshot
                .accounts
                .into_iter()
                .map(|a| (a.user_id, a))
                .collect(),
            transactions: snapshot
                .transactions
                .into_iter()
                .map(|tx| (tx.id, tx))
                .collect(),
            payments: snapshot
                .pending_payments
                .into_iter()
                .map(|p| (p.id.clone(), p))
                .collect(),
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self) -> Result<Snapshot> {
        let state = self.state.read().await;
        Ok(Snapshot {
            accounts: state.accounts.values().cloned().collect(),
            transactions: state.transactions.values().cloned().collect(),
            pending_payments: state.payments.values().cloned().collect(),
        })
    }

    async fn save_user(&self, account: &UserAccount, transactions: &[Transaction]) -> Result<()> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.user_id, account.clone());
        for tx in transactions {
            state.transactions.insert(tx.id, tx.clone());
        }
        Ok(())
    }

    async fn save_payment(&self, payment: &PendingPayment) -> Result<()> {
        let mut state = self.state.write().await;
        state.payments.insert(payment.id.clone(), payment.clone());
        Ok(())
    }

    async fn remove_payment(&self, payment_id: &str) -> Result<()> {
        self.state.write().await.payments.remove(payment_id);
        Ok(())
    }
}

/// Catalog backed by a product list fixed at startup.
#[derive(Default)]
pub struct InMemoryCatalog {
    products: HashMap<ProductId, Product>,
}

impl InMemoryCatalog {
    pub fn new(products: Vec<Product>) -> Self {
        Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
        }
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product(&self, product_id: ProductId) -> Option<Product> {
        self.products.get(&product_id).cloned()
    }
}

/// Admin directory from the configured id list.
#[derive(Debug, Default, Clone)]
pub struct StaticAdmins {
    ids: HashSet<UserId>,
}

impl StaticAdmins {
    pub fn new(ids: impl IntoIterator<Item = UserId>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }
}

impl AdminDirectory for StaticAdmins {
    fn is_admin(&self, user_id: UserId) -> bool {
        self.ids.contains(&user_id)
    }
}

/// One outbound call seen by the [`RecordingNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    User {
        user_id: UserId,
        message: OutgoingMessage,
    },
    Admins {
        message: OutgoingMessage,
    },
    Approval {
        channel: ApprovalChannel,
        message: OutgoingMessage,
        message_ref: MessageRef,
    },
    ApprovalUpdate {
        message_ref: MessageRef,
        appended_text: String,
    },
    Edit {
        message_ref: MessageRef,
        message: OutgoingMessage,
    },
}

pub const PAYMENTS_CHAT_ID: i64 = -100;
pub const ORDERS_CHAT_ID: i64 = -200;

/// Notifier that keeps every delivery in memory. Can be switched to fail
/// every call.
#[derive(Default)]
pub struct RecordingNotifier {
    deliveries: parking_lot::Mutex<Vec<Delivery>>,
    next_message_id: AtomicI64,
    failing: AtomicBool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    /// Texts the user received, either as new messages or as edits of a
    /// message in their chat.
    pub fn texts_for(&self, user_id: UserId) -> Vec<String> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::User { user_id: to, message } if *to == user_id => {
                    Some(message.text.clone())
                }
                Delivery::Edit {
                    message_ref,
                    message,
                } if message_ref.chat_id == user_id => Some(message.text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn admin_texts(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::Admins { message } => Some(message.text.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn approvals(&self) -> Vec<(ApprovalChannel, OutgoingMessage, MessageRef)> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::Approval {
                    channel,
                    message,
                    message_ref,
                } => Some((*channel, message.clone(), message_ref.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn approval_updates(&self) -> Vec<(MessageRef, String)> {
        self.deliveries
            .lock()
            .iter()
            .filter_map(|d| match d {
                Delivery::ApprovalUpdate {
                    message_ref,
                    appended_text,
                } => Some((message_ref.clone(), appended_text.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, delivery: Delivery) -> std::result::Result<(), NotifyError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotifyError("recording notifier is failing".to_string()));
        }
        self.deliveries.lock().push(delivery);
        Ok(())
    }

    fn next_ref(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1,
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_user(
        &self,
        user_id: UserId,
        message: OutgoingMessage,
    ) -> std::result::Result<MessageRef, NotifyError> {
        let message_ref = self.next_ref(user_id);
        self.record(Delivery::User { user_id, message })?;
        Ok(message_ref)
    }

    async fn notify_admins(&self, message: OutgoingMessage) -> std::result::Result<(), NotifyError> {
        self.record(Delivery::Admins { message })
    }

    async fn post_for_approval(
        &self,
        channel: ApprovalChannel,
        message: OutgoingMessage,
    ) -> std::result::Result<MessageRef, NotifyError> {
        let chat_id = match channel {
            ApprovalChannel::Payments => PAYMENTS_CHAT_ID,
            ApprovalChannel::Orders => ORDERS_CHAT_ID,
        };
        let message_ref = self.next_ref(chat_id);
        self.record(Delivery::Approval {
            channel,
            message,
            message_ref: message_ref.clone(),
        })?;
        Ok(message_ref)
    }

    async fn update_approval_message(
        &self,
        message: &MessageRef,
        appended_text: &str,
    ) -> std::result::Result<(), NotifyError> {
        self.record(Delivery::ApprovalUpdate {
            message_ref: message.clone(),
            appended_text: appended_text.to_string(),
        })
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        replacement: OutgoingMessage,
    ) -> std::result::Result<(), NotifyError> {
        self.record(Delivery::Edit {
            message_ref: message.clone(),
            message: replacement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_snapshot_store_upserts() {
        let store = InMemorySnapshotStore::new();
        let mut account = UserAccount::new(1, Utc::now());
        store.save_user(&account, &[]).await.unwrap();
        account.total_orders = 2;
        store.save_user(&account, &[]).await.unwrap();

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.accounts, vec![account]);
        assert!(snapshot.transactions.is_empty());
    }

    #[tokio::test]
    async fn test_catalog_lookup() {
        let catalog = InMemoryCatalog::new(vec![Product {
            id: 4,
            name: "Sticker pack".to_string(),
            price: dec!(99.90),
            quantity: 10,
        }]);
        assert_eq!(catalog.product(4).await.unwrap().price, dec!(99.90));
        assert!(catalog.product(5).await.is_none());
    }

    #[test]
    fn test_static_admins() {
        let admins = StaticAdmins::new([10, 20]);
        assert!(admins.is_admin(10));
        assert!(!admins.is_admin(11));
    }

    #[tokio::test]
    async fn test_recording_notifier_can_fail() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify_user(1, OutgoingMessage::text("hello"))
            .await
            .unwrap();
        notifier.set_failing(true);
        assert!(notifier.notify_admins(OutgoingMessage::text("x")).await.is_err());
        assert_eq!(notifier.texts_for(1), vec!["hello".to_string()]);
        assert!(notifier.admin_texts().is_empty());
    }
}
