#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::Semaphore;
use storefront::application::bootstrap::bootstrap;
use storefront::application::workflow::ConfirmationWorkflow;
use storefront::config::Settings;
use storefront::domain::account::{Customer, UserAccount, UserId};
use storefront::domain::catalog::Product;
use storefront::domain::payment::{MessageRef, PendingPayment};
use storefront::domain::ports::{Snapshot, SnapshotStore, SnapshotStoreRef};
use storefront::domain::transaction::Transaction;
use storefront::error::{Result, StorefrontError};
use storefront::infrastructure::in_memory::{InMemorySnapshotStore, RecordingNotifier};
use storefront::interfaces::chat::{CallbackResponder, MessageResponder};

pub const ADMIN: UserId = 900;
pub const OTHER_ADMIN: UserId = 901;
pub const ALICE: UserId = 1;
pub const BOB: UserId = 2;

pub fn settings() -> Settings {
    Settings {
        admin_ids: vec![ADMIN, OTHER_ADMIN],
        support_contact: "@store_support".to_string(),
        catalog: vec![
            Product {
                id: 1,
                name: "Gift card".to_string(),
                price: dec!(150),
                quantity: 10,
            },
            Product {
                id: 2,
                name: "Sticker pack".to_string(),
                price: dec!(100),
                quantity: 2,
            },
            Product {
                id: 3,
                name: "Retired item".to_string(),
                price: dec!(10),
                quantity: 0,
            },
        ],
        ..Settings::default()
    }
}

pub struct Harness {
    pub workflow: ConfirmationWorkflow,
    pub notifier: Arc<RecordingNotifier>,
}

impl Harness {
    /// Responder for a button press on the user's menu message.
    pub fn pressed(&self, user_id: UserId) -> CallbackResponder {
        CallbackResponder::new(
            self.notifier.clone(),
            user_id,
            MessageRef {
                chat_id: user_id,
                message_id: 0,
            },
        )
    }

    /// Responder for a message the user sent.
    pub fn sent(&self, user_id: UserId) -> MessageResponder {
        MessageResponder::new(self.notifier.clone(), user_id)
    }

    pub async fn top_up(&self, user_id: UserId, amount: rust_decimal::Decimal) {
        let customer = Customer::new(user_id);
        self.workflow
            .start_deposit(&customer, amount, "sbp", &self.pressed(user_id))
            .await
            .unwrap();
        let payment = self
            .workflow
            .submit_screenshot(&customer, "photo".to_string(), None, &self.sent(user_id))
            .await
            .unwrap();
        self.workflow.approve(ADMIN, &payment.id).await.unwrap();
    }

    pub async fn fill_cart(&self, user_id: UserId, products: &[u32]) {
        for &product in products {
            self.workflow
                .carts()
                .add_item(user_id, product)
                .await
                .unwrap();
        }
    }
}

pub async fn harness() -> Harness {
    harness_with(settings(), Arc::new(InMemorySnapshotStore::new())).await
}

pub async fn harness_with(settings: Settings, store: SnapshotStoreRef) -> Harness {
    let notifier = Arc::new(RecordingNotifier::new());
    let workflow = bootstrap(&settings, store, notifier.clone())
        .await
        .unwrap();
    Harness { workflow, notifier }
}

/// Snapshot store that can be switched to fail every write.
#[derive(Clone, Default)]
pub struct FailingSnapshotStore {
    inner: InMemorySnapshotStore,
    failing: Arc<AtomicBool>,
}

impl FailingSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StorefrontError::persistence("disk full"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SnapshotStore for FailingSnapshotStore {
    async fn load(&self) -> Result<Snapshot> {
        self.inner.load().await
    }

    async fn save_user(&self, account: &UserAccount, transactions: &[Transaction]) -> Result<()> {
        self.check()?;
        self.inner.save_user(account, transactions).await
    }

    async fn save_payment(&self, payment: &PendingPayment) -> Result<()> {
        self.check()?;
        self.inner.save_payment(payment).await
    }

    async fn remove_payment(&self, payment_id: &str) -> Result<()> {
        self.check()?;
        self.inner.remove_payment(payment_id).await
    }
}

/// Snapshot store that can hold one user's account writes until released,
/// keeping the ledger lock taken for as long as the write is held.
#[derive(Clone)]
pub struct GatedSnapshotStore {
    inner: InMemorySnapshotStore,
    gate: Arc<Semaphore>,
    gated_user: Arc<AtomicI64>,
}

impl GatedSnapshotStore {
    pub fn new() -> Self {
        Self {
            inner: InMemorySnapshotStore::new(),
            gate: Arc::new(Semaphore::new(0)),
            gated_user: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn hold(&self, user_id: UserId) {
        self.gated_user.store(user_id, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gated_user.store(0, Ordering::SeqCst);
        self.gate.add_permits(1);
    }
}

#[async_trait]
impl SnapshotStore for GatedSnapshotStore {
    async fn load(&self) -> Result<Snapshot> {
        self.inner.load().await
    }

    async fn save_user(&self, account: &UserAccount, transactions: &[Transaction]) -> Result<()> {
        if self.gated_user.load(Ordering::SeqCst) == account.user_id {
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(StorefrontError::persistence)?;
        }
        self.inner.save_user(account, transactions).await
    }

    async fn save_payment(&self, payment: &PendingPayment) -> Result<()> {
        self.inner.save_payment(payment).await
    }

    async fn remove_payment(&self, payment_id: &str) -> Result<()> {
        self.inner.remove_payment(payment_id).await
    }
}
