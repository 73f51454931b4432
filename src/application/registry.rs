use super::Applied;
use crate::domain::account::{Amount, UserId};
use crate::domain::payment::{
    CancelReason, Decision, MessageRef, PaymentId, PaymentKind, PaymentState, PendingPayment,
};
use crate::domain::ports::{SnapshotStore, SnapshotStoreRef};
use crate::error::{Result, StorefrontError};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

#[derive(Default)]
struct RegistryState {
    /// Live (non-terminal) payments only.
    payments: HashMap<PaymentId, PendingPayment>,
    active_by_user: HashMap<UserId, PaymentId>,
    /// Terminal state of every payment removed during this process's life.
    outcomes: HashMap<PaymentId, PaymentState>,
    /// Payments whose last checkpoint failed.
    dirty: HashSet<PaymentId>,
}

impl RegistryState {
    fn insert(&mut self, payment: PendingPayment) -> Result<()> {
        if let Some(existing) = self.active_by_user.get(&payment.user_id) {
            return Err(StorefrontError::DuplicateActivePayment {
                user_id: payment.user_id,
                payment_id: existing.clone(),
            });
        }
        if self.payments.contains_key(&payment.id) || self.outcomes.contains_key(&payment.id) {
            return Err(StorefrontError::DuplicateActivePayment {
                user_id: payment.user_id,
                payment_id: payment.id,
            });
        }

        self.active_by_user
            .insert(payment.user_id, payment.id.clone());
        self.payments.insert(payment.id.clone(), payment);
        Ok(())
    }

    fn live_mut(&mut self, payment_id: &str) -> Result<&mut PendingPayment> {
        self.payments
            .get_mut(payment_id)
            .ok_or_else(|| StorefrontError::NotFound(payment_id.to_string()))
    }

    fn remove(&mut self, payment_id: &str) -> Option<PendingPayment> {
        let payment = self.payments.remove(payment_id)?;
        self.active_by_user.remove(&payment.user_id);
        if payment.state.is_terminal() {
            self.outcomes.insert(payment.id.clone(), payment.state);
        }
        Some(payment)
    }
}

/// Store and state-transition authority for pending payments.
///
/// Every transition runs under one lock, so the first caller to move a
/// payment out of a state wins and later callers see `NotFound` or
/// `InvalidState` without side effects.
pub struct PaymentRegistry {
    state: Mutex<RegistryState>,
    store: SnapshotStoreRef,
}

impl PaymentRegistry {
    pub fn new(store: SnapshotStoreRef) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            store,
        }
    }

    /// Loads persisted payments. Terminal records are skipped.
    pub async fn restore(&self, payments: Vec<PendingPayment>) -> Vec<PendingPayment> {
        let mut state = self.state.lock().await;
        *state = RegistryState::default();

        let mut restored = Vec::new();
        for payment in payments.into_iter().filter(PendingPayment::is_active) {
            let copy = payment.clone();
            match state.insert(payment) {
                Ok(()) => restored.push(copy),
                Err(e) => tracing::warn!(payment_id = %copy.id, error = %e, "Skipping restored payment"),
            }
        }
        tracing::info!(payments = restored.len(), "Payment registry restored");
        restored
    }

    /// Registers a payment that waits for a screenshot.
    pub async fn create(&self, mut payment: PendingPayment) -> Result<Applied<PendingPayment>> {
        payment.state = PaymentState::AwaitingScreenshot;
        self.insert(payment).await
    }

    /// Registers a payment that was already funded from the balance and goes
    /// straight to the admin.
    pub async fn create_prepaid(&self, mut payment: PendingPayment) -> Result<Applied<PendingPayment>> {
        payment.state = PaymentState::AwaitingScreenshot;
        payment.submit_prepaid(Utc::now())?;
        self.insert(payment).await
    }

    async fn insert(&self, payment: PendingPayment) -> Result<Applied<PendingPayment>> {
        Amount::new(payment.amount)?;

        let mut state = self.state.lock().await;
        state.insert(payment.clone())?;
        tracing::info!(
            payment_id = %payment.id,
            user_id = payment.user_id,
            kind = ?payment.kind,
            state = %payment.state,
            "Pending payment created"
        );

        let checkpoint = checkpoint_payment(self.store.as_ref(), &mut state, &payment.id).await;
        Ok(Applied::new(payment, checkpoint))
    }

    pub async fn attach_screenshot(
        &self,
        payment_id: &str,
        screenshot: String,
        comment: Option<String>,
    ) -> Result<Applied<PendingPayment>> {
        let mut state = self.state.lock().await;
        let payment = state.live_mut(payment_id)?;
        payment.attach_screenshot(screenshot, comment, Utc::now())?;
        let payment = payment.clone();
        tracing::info!(payment_id, user_id = payment.user_id, "Screenshot attached");

        let checkpoint = checkpoint_payment(self.store.as_ref(), &mut state, payment_id).await;
        Ok(Applied::new(payment, checkpoint))
    }

    /// Applies an admin decision and removes the payment.
    ///
    /// The returned record is the only handle for running the decision's
    /// side effects: a repeated call finds nothing and fails with `NotFound`.
    pub async fn decide(
        &self,
        payment_id: &str,
        decision: Decision,
    ) -> Result<Applied<PendingPayment>> {
        let mut state = self.state.lock().await;
        state.live_mut(payment_id)?.decide(&decision)?;
        self.finish(&mut state, payment_id).await
    }

    /// Expires or user-cancels a payment still awaiting its screenshot.
    pub async fn cancel(
        &self,
        payment_id: &str,
        reason: CancelReason,
    ) -> Result<Applied<PendingPayment>> {
        let mut state = self.state.lock().await;
        state.live_mut(payment_id)?.cancel(reason)?;
        self.finish(&mut state, payment_id).await
    }

    /// Remembers where the admin review message was posted.
    pub async fn set_approval_message(
        &self,
        payment_id: &str,
        message: MessageRef,
    ) -> Result<Applied<()>> {
        let mut state = self.state.lock().await;
        state.live_mut(payment_id)?.approval_message = Some(message);
        let checkpoint = checkpoint_payment(self.store.as_ref(), &mut state, payment_id).await;
        Ok(Applied::new((), checkpoint))
    }

    async fn finish(
        &self,
        state: &mut RegistryState,
        payment_id: &str,
    ) -> Result<Applied<PendingPayment>> {
        let payment = state
            .remove(payment_id)
            .ok_or_else(|| StorefrontError::NotFound(payment_id.to_string()))?;
        tracing::info!(
            payment_id,
            user_id = payment.user_id,
            state = %payment.state,
            "Pending payment finished"
        );
        let checkpoint = checkpoint_payment(self.store.as_ref(), state, payment_id).await;
        Ok(Applied::new(payment, checkpoint))
    }

    pub async fn get(&self, payment_id: &str) -> Option<PendingPayment> {
        self.state.lock().await.payments.get(payment_id).cloned()
    }

    /// Current state of a live payment, or the terminal state it ended in.
    pub async fn state_of(&self, payment_id: &str) -> Option<PaymentState> {
        let state = self.state.lock().await;
        state
            .payments
            .get(payment_id)
            .map(|p| p.state)
            .or_else(|| state.outcomes.get(payment_id).copied())
    }

    pub async fn active_for(&self, user_id: UserId) -> Option<PendingPayment> {
        let state = self.state.lock().await;
        state
            .active_by_user
            .get(&user_id)
            .and_then(|id| state.payments.get(id))
            .cloned()
    }

    /// Live payments, oldest first.
    pub async fn pending(&self) -> Vec<PendingPayment> {
        let state = self.state.lock().await;
        let mut payments: Vec<PendingPayment> = state.payments.values().cloned().collect();
        payments.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        payments
    }

    pub async fn count_by_kind(&self, kind: PaymentKind) -> usize {
        let state = self.state.lock().await;
        state.payments.values().filter(|p| p.kind == kind).count()
    }

    pub async fn unsaved_payments(&self) -> usize {
        self.state.lock().await.dirty.len()
    }

    /// Writes every payment whose last checkpoint failed.
    pub async fn retry_checkpoints(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut dirty: Vec<PaymentId> = state.dirty.iter().cloned().collect();
        dirty.sort();

        let mut first_error = None;
        for payment_id in dirty {
            if let Err(e) = checkpoint_payment(self.store.as_ref(), &mut state, &payment_id).await
                && first_error.is_none()
            {
                first_error = Some(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Saves a live payment, or deletes it from the store once it is gone.
async fn checkpoint_payment(
    store: &dyn SnapshotStore,
    state: &mut RegistryState,
    payment_id: &str,
) -> Result<()> {
    let result = match state.payments.get(payment_id) {
        Some(payment) => store.save_payment(payment).await,
        None => store.remove_payment(payment_id).await,
    };

    match result {
        Ok(()) => {
            state.dirty.remove(payment_id);
            Ok(())
        }
        Err(e) => {
            tracing::error!(payment_id, error = %e, "Failed to checkpoint pending payment");
            state.dirty.insert(payment_id.to_string());
            Err(e)
        }
    }
}
