use super::cart_store::CartStore;
use super::ledger::{Ledger, LedgerStats};
use super::messages;
use super::registry::PaymentRegistry;
use super::scheduler::ExpiryScheduler;
use super::CheckpointLog;
use crate::config::{PaymentDetails, Settings};
use crate::domain::account::{Amount, Customer, UserAccount, UserId};
use crate::domain::payment::{
    CancelReason, Decision, MessageRef, PaymentKind, PaymentMethod, PaymentState, PendingPayment,
    payment_id,
};
use crate::domain::ports::{
    AdminDirectoryRef, ApprovalChannel, NotifierRef, OutgoingMessage, Responder,
};
use crate::error::{Result, StorefrontError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Limits and texts the workflow applies to every payment.
#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub window: Duration,
    pub min_deposit: Decimal,
    pub max_deposit: Decimal,
    pub balance_discount_percent: Decimal,
    pub methods: BTreeMap<String, PaymentDetails>,
    pub support_contact: String,
    pub currency: String,
}

impl PaymentPolicy {
    fn method(&self, key: &str) -> Result<(PaymentMethod, &PaymentDetails)> {
        let details = self
            .methods
            .get(key)
            .ok_or_else(|| StorefrontError::UnknownPaymentMethod(key.to_string()))?;
        let method = PaymentMethod::External {
            key: key.to_string(),
            name: details.name.clone(),
        };
        Ok((method, details))
    }

    fn window_minutes(&self) -> u64 {
        self.window.as_secs().div_ceil(60)
    }
}

impl From<&Settings> for PaymentPolicy {
    fn from(settings: &Settings) -> Self {
        Self {
            window: settings.payment_window(),
            min_deposit: settings.min_deposit,
            max_deposit: settings.max_deposit,
            balance_discount_percent: settings.balance_discount_percent,
            methods: settings.payment_methods.clone(),
            support_contact: settings.support_contact.clone(),
            currency: settings.currency.clone(),
        }
    }
}

/// Result of an admin decision.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminOutcome {
    Approved(PendingPayment),
    Rejected(PendingPayment),
    /// Someone else (another admin or the expiry timer) got there first.
    AlreadyHandled {
        payment_id: String,
        state: Option<PaymentState>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoreStats {
    pub ledger: LedgerStats,
    pub pending_deposits: usize,
    pub pending_orders: usize,
    pub armed_timers: usize,
}

/// Sequences the registry, ledger and cart store through a payment's life
/// and tells users and admins what happened.
///
/// Cheap to clone; every clone drives the same state.
#[derive(Clone)]
pub struct ConfirmationWorkflow {
    ledger: Arc<Ledger>,
    carts: Arc<CartStore>,
    registry: Arc<PaymentRegistry>,
    scheduler: Arc<ExpiryScheduler>,
    notifier: NotifierRef,
    admins: AdminDirectoryRef,
    policy: Arc<PaymentPolicy>,
    /// Millisecond stamp of the last issued payment id.
    last_stamp: Arc<AtomicI64>,
}

impl ConfirmationWorkflow {
    pub fn new(
        ledger: Arc<Ledger>,
        carts: Arc<CartStore>,
        registry: Arc<PaymentRegistry>,
        notifier: NotifierRef,
        admins: AdminDirectoryRef,
        policy: PaymentPolicy,
    ) -> Self {
        Self {
            ledger,
            carts,
            registry,
            scheduler: Arc::new(ExpiryScheduler::new()),
            notifier,
            admins,
            policy: Arc::new(policy),
            last_stamp: Arc::new(AtomicI64::new(0)),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn carts(&self) -> &CartStore {
        &self.carts
    }

    pub fn registry(&self) -> &PaymentRegistry {
        &self.registry
    }

    pub fn scheduler(&self) -> &ExpiryScheduler {
        &self.scheduler
    }

    pub fn policy(&self) -> &PaymentPolicy {
        &self.policy
    }

    /// Opens a balance top-up and sends the transfer instructions.
    pub async fn start_deposit(
        &self,
        customer: &Customer,
        amount: Decimal,
        method_key: &str,
        responder: &dyn Responder,
    ) -> Result<PendingPayment> {
        let (method, details) = self.policy.method(method_key)?;
        if amount < self.policy.min_deposit || amount > self.policy.max_deposit {
            return Err(StorefrontError::AmountOutOfRange {
                min: self.policy.min_deposit,
                max: self.policy.max_deposit,
            });
        }

        let now = self.next_stamp();
        let payment = PendingPayment::deposit(
            payment_id(PaymentKind::Deposit, customer.id, now),
            customer.id,
            amount,
            method,
            now,
        )
        .with_username(customer.username.clone());

        let mut log = CheckpointLog::default();
        let payment = log.take(self.registry.create(payment).await?);
        self.arm(&payment.id, self.policy.window);
        log.take(self.ledger.touch(customer.id).await);

        let text = messages::deposit_instructions(
            &payment,
            details,
            self.policy.window_minutes(),
            &self.policy.currency,
        );
        if let Err(e) = responder.edit_in_place(text, None).await {
            tracing::warn!(payment_id = %payment.id, error = %e, "Failed to send payment instructions");
        }
        log.finish(payment)
    }

    /// Opens an order for the current cart, paid outside the bot.
    pub async fn checkout_external(
        &self,
        customer: &Customer,
        method_key: &str,
        responder: &dyn Responder,
    ) -> Result<PendingPayment> {
        let (method, details) = self.policy.method(method_key)?;
        let cart = self.carts.snapshot(customer.id).await;
        if cart.items.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }

        let now = self.next_stamp();
        let payment = PendingPayment::purchase(
            payment_id(PaymentKind::Purchase, customer.id, now),
            customer.id,
            cart,
            method,
            now,
        )
        .with_username(customer.username.clone());

        let mut log = CheckpointLog::default();
        let payment = log.take(self.registry.create(payment).await?);
        self.arm(&payment.id, self.policy.window);
        log.take(self.ledger.touch(customer.id).await);

        let text = messages::purchase_instructions(
            &payment,
            details,
            self.policy.window_minutes(),
            &self.policy.currency,
        );
        if let Err(e) = responder.edit_in_place(text, None).await {
            tracing::warn!(payment_id = %payment.id, error = %e, "Failed to send payment instructions");
        }
        log.finish(payment)
    }

    /// Pays the current cart from the balance at the discounted price and
    /// hands the order to the admins.
    pub async fn checkout_balance(
        &self,
        customer: &Customer,
        responder: &dyn Responder,
    ) -> Result<PendingPayment> {
        let cart = self.carts.snapshot(customer.id).await;
        if cart.items.is_empty() {
            return Err(StorefrontError::EmptyCart);
        }

        let now = self.next_stamp();
        let payment = PendingPayment::purchase(
            payment_id(PaymentKind::Purchase, customer.id, now),
            customer.id,
            cart,
            PaymentMethod::Balance,
            now,
        )
        .with_username(customer.username.clone())
        .with_discount(self.policy.balance_discount_percent);
        let amount = Amount::new(payment.amount)?;
        if let Some(active) = self.registry.active_for(customer.id).await {
            return Err(StorefrontError::DuplicateActivePayment {
                user_id: customer.id,
                payment_id: active.id,
            });
        }

        // The order only becomes visible to admins once it is funded.
        let mut log = CheckpointLog::default();
        log.take(
            self.ledger
                .debit(customer.id, amount, format!("Order {}", payment.id))
                .await?,
        );
        let order_id = payment.id.clone();
        let mut payment = match self.registry.create_prepaid(payment).await {
            Ok(applied) => log.take(applied),
            Err(e) => {
                tracing::info!(payment_id = %order_id, error = %e, "Order not placed, returning the debit");
                log.take(
                    self.ledger
                        .reverse_debit(
                            customer.id,
                            amount,
                            format!("Order {order_id} not placed"),
                        )
                        .await,
                );
                return log.finish(()).and(Err(e));
            }
        };
        self.carts.clear(customer.id).await;

        let message = OutgoingMessage::text(messages::approval_request(&payment, &self.policy.currency))
            .with_keyboard(messages::approval_keyboard(&payment));
        if let Some(message_ref) = self.post_for_approval(&payment, message).await {
            match self
                .registry
                .set_approval_message(&payment.id, message_ref.clone())
                .await
            {
                Ok(applied) => log.take(applied),
                Err(e) => tracing::debug!(payment_id = %payment.id, error = %e, "Order decided before its review message was recorded"),
            }
            payment.approval_message = Some(message_ref);
        }

        let balance = self.ledger.balance(customer.id).await;
        let text = messages::balance_order_placed(&payment, balance.value(), &self.policy.currency);
        if let Err(e) = responder.edit_in_place(text, None).await {
            tracing::warn!(payment_id = %payment.id, error = %e, "Failed to confirm order");
        }
        log.finish(payment)
    }

    /// Attaches proof of payment to the user's awaiting payment and posts it
    /// for review.
    pub async fn submit_screenshot(
        &self,
        customer: &Customer,
        screenshot: String,
        comment: Option<String>,
        responder: &dyn Responder,
    ) -> Result<PendingPayment> {
        let active = self
            .registry
            .active_for(customer.id)
            .await
            .ok_or(StorefrontError::NoActivePayment(customer.id))?;

        self.scheduler.cancel(&active.id);
        let mut log = CheckpointLog::default();
        let mut payment = match self
            .registry
            .attach_screenshot(&active.id, screenshot, comment)
            .await
        {
            Ok(applied) => log.take(applied),
            Err(e) => {
                tracing::debug!(payment_id = %active.id, error = %e, "Screenshot not accepted");
                return Err(e);
            }
        };
        log.take(self.ledger.touch(customer.id).await);

        let message = OutgoingMessage::text(messages::approval_request(&payment, &self.policy.currency))
            .with_keyboard(messages::approval_keyboard(&payment))
            .with_photo(payment.screenshot.clone());
        if let Some(message_ref) = self.post_for_approval(&payment, message).await {
            match self
                .registry
                .set_approval_message(&payment.id, message_ref.clone())
                .await
            {
                Ok(applied) => log.take(applied),
                Err(e) => tracing::debug!(payment_id = %payment.id, error = %e, "Payment decided before its review message was recorded"),
            }
            payment.approval_message = Some(message_ref);
        }

        let text = messages::screenshot_received(&payment, &self.policy.currency);
        if let Err(e) = responder.reply(text, None).await {
            tracing::warn!(payment_id = %payment.id, error = %e, "Failed to acknowledge screenshot");
        }
        log.finish(payment)
    }

    pub async fn approve(&self, admin_id: UserId, payment_id: &str) -> Result<AdminOutcome> {
        self.authorize(admin_id)?;

        let mut log = CheckpointLog::default();
        let payment = match self.registry.decide(payment_id, Decision::Approve).await {
            Ok(applied) => log.take(applied),
            Err(e) if e.is_already_handled() => return Ok(self.already_handled(payment_id).await),
            Err(e) => return Err(e),
        };
        let amount = Amount::new(payment.amount)?;

        let text = match payment.kind {
            PaymentKind::Deposit => {
                log.take(
                    self.ledger
                        .credit_with_proof(
                            payment.user_id,
                            amount,
                            format!("Deposit {}", payment.id),
                            payment.screenshot.clone(),
                        )
                        .await,
                );
                let balance = self.ledger.balance(payment.user_id).await;
                messages::deposit_approved(&payment, balance.value(), &self.policy.currency)
            }
            PaymentKind::Purchase if payment.is_prepaid() => messages::order_approved(&payment),
            PaymentKind::Purchase => {
                log.take(self.ledger.record_order(payment.user_id, amount).await);
                self.carts.clear(payment.user_id).await;
                messages::order_approved(&payment)
            }
        };
        tracing::info!(payment_id, admin_id, user_id = payment.user_id, "Payment approved");

        self.notify_user(payment.user_id, text).await;
        self.append_verdict(&payment, admin_id).await;
        log.finish(AdminOutcome::Approved(payment))
    }

    pub async fn reject(
        &self,
        admin_id: UserId,
        payment_id: &str,
        reason: Option<String>,
    ) -> Result<AdminOutcome> {
        self.authorize(admin_id)?;

        let mut log = CheckpointLog::default();
        let payment = match self
            .registry
            .decide(payment_id, Decision::Reject { reason })
            .await
        {
            Ok(applied) => log.take(applied),
            Err(e) if e.is_already_handled() => return Ok(self.already_handled(payment_id).await),
            Err(e) => return Err(e),
        };

        let refunded = payment.is_prepaid();
        if refunded {
            let amount = Amount::new(payment.amount)?;
            log.take(
                self.ledger
                    .credit(
                        payment.user_id,
                        amount,
                        format!("Refund for rejected order {}", payment.id),
                    )
                    .await,
            );
        }
        tracing::info!(payment_id, admin_id, user_id = payment.user_id, refunded, "Payment rejected");

        let text = messages::payment_rejected(
            &payment,
            refunded,
            &self.policy.support_contact,
            &self.policy.currency,
        );
        self.notify_user(payment.user_id, text).await;
        self.append_verdict(&payment, admin_id).await;
        log.finish(AdminOutcome::Rejected(payment))
    }

    /// Withdraws the user's payment while it still waits for a screenshot.
    pub async fn cancel(&self, customer: &Customer, responder: &dyn Responder) -> Result<PendingPayment> {
        let active = self
            .registry
            .active_for(customer.id)
            .await
            .ok_or(StorefrontError::NoActivePayment(customer.id))?;

        let payment = self
            .registry
            .cancel(&active.id, CancelReason::User)
            .await?;
        self.scheduler.cancel(&active.id);
        let (payment, checkpoint) = payment.split();

        if let Err(e) = responder
            .edit_in_place(messages::payment_cancelled(&payment), None)
            .await
        {
            tracing::warn!(payment_id = %payment.id, error = %e, "Failed to confirm cancellation");
        }
        checkpoint.map(|()| payment)
    }

    /// Timer callback. Returns true only when this call expired the payment.
    pub async fn expire(&self, payment_id: &str) -> bool {
        let payment = match self.registry.cancel(payment_id, CancelReason::Timeout).await {
            // A failed checkpoint is already logged and stays queued for `flush`.
            Ok(applied) => applied.value,
            Err(e) => {
                tracing::debug!(payment_id, error = %e, "Expiry skipped");
                return false;
            }
        };
        tracing::info!(payment_id, user_id = payment.user_id, "Payment expired");

        self.notify_user(payment.user_id, messages::payment_expired(&payment))
            .await;
        let notice = messages::admin_expired_notice(&payment, &self.policy.currency);
        if let Err(e) = self.notifier.notify_admins(OutgoingMessage::text(notice)).await {
            tracing::warn!(payment_id, error = %e, "Failed to notify admins about expiry");
        }
        true
    }

    pub async fn pending(&self, admin_id: UserId) -> Result<Vec<PendingPayment>> {
        self.authorize(admin_id)?;
        Ok(self.registry.pending().await)
    }

    pub async fn stats(&self, admin_id: UserId) -> Result<StoreStats> {
        self.authorize(admin_id)?;
        Ok(StoreStats {
            ledger: self.ledger.stats().await,
            pending_deposits: self.registry.count_by_kind(PaymentKind::Deposit).await,
            pending_orders: self.registry.count_by_kind(PaymentKind::Purchase).await,
            armed_timers: self.scheduler.armed(),
        })
    }

    /// Accounts with the highest balances first.
    pub async fn users(&self, admin_id: UserId, limit: usize) -> Result<Vec<UserAccount>> {
        self.authorize(admin_id)?;
        let mut accounts = self.ledger.accounts().await;
        accounts.sort_by(|a, b| {
            b.balance
                .value()
                .cmp(&a.balance.value())
                .then(a.user_id.cmp(&b.user_id))
        });
        accounts.truncate(limit);
        Ok(accounts)
    }

    /// Re-arms expiry for restored payments that still wait for a
    /// screenshot, with whatever is left of their window.
    pub async fn resume(&self) -> usize {
        let now = Utc::now();
        let mut armed = 0;
        for payment in self.registry.pending().await {
            if payment.state != PaymentState::AwaitingScreenshot {
                continue;
            }
            let elapsed = (now - payment.created_at).to_std().unwrap_or_default();
            let remaining = self.policy.window.saturating_sub(elapsed);
            self.arm(&payment.id, remaining);
            armed += 1;
        }
        if armed > 0 {
            tracing::info!(armed, "Re-armed expiry timers");
        }
        armed
    }

    /// Retries every checkpoint that failed so far.
    pub async fn flush(&self) -> Result<()> {
        let ledger = self.ledger.retry_checkpoints().await;
        let registry = self.registry.retry_checkpoints().await;
        ledger.and(registry)
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Current time, nudged forward so no two payment ids share a stamp.
    fn next_stamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let wanted = now.timestamp_millis();
        let previous = self
            .last_stamp
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(wanted.max(last + 1))
            })
            .unwrap_or(wanted);
        let stamp = wanted.max(previous + 1);
        DateTime::from_timestamp_millis(stamp).unwrap_or(now)
    }

    fn arm(&self, payment_id: &str, delay: Duration) {
        let workflow = self.clone();
        let id = payment_id.to_string();
        self.scheduler.schedule(payment_id.to_string(), delay, async move {
            workflow.expire(&id).await;
        });
    }

    fn authorize(&self, user_id: UserId) -> Result<()> {
        if self.admins.is_admin(user_id) {
            Ok(())
        } else {
            tracing::warn!(user_id, "Admin action refused");
            Err(StorefrontError::Unauthorized(user_id))
        }
    }

    async fn already_handled(&self, payment_id: &str) -> AdminOutcome {
        let state = self.registry.state_of(payment_id).await;
        tracing::debug!(payment_id, ?state, "Payment already handled");
        AdminOutcome::AlreadyHandled {
            payment_id: payment_id.to_string(),
            state,
        }
    }

    async fn post_for_approval(
        &self,
        payment: &PendingPayment,
        message: OutgoingMessage,
    ) -> Option<MessageRef> {
        let channel = match payment.kind {
            PaymentKind::Deposit => ApprovalChannel::Payments,
            PaymentKind::Purchase => ApprovalChannel::Orders,
        };
        match self.notifier.post_for_approval(channel, message).await {
            Ok(message_ref) => Some(message_ref),
            Err(e) => {
                tracing::warn!(payment_id = %payment.id, error = %e, "Failed to post payment for review");
                None
            }
        }
    }

    async fn append_verdict(&self, payment: &PendingPayment, admin_id: UserId) {
        let Some(message_ref) = &payment.approval_message else {
            return;
        };
        let verdict = messages::verdict_line(payment, admin_id);
        if let Err(e) = self
            .notifier
            .update_approval_message(message_ref, &verdict)
            .await
        {
            tracing::warn!(payment_id = %payment.id, error = %e, "Failed to update review message");
        }
    }

    async fn notify_user(&self, user_id: UserId, text: String) {
        if let Err(e) = self
            .notifier
            .notify_user(user_id, OutgoingMessage::text(text))
            .await
        {
            tracing::warn!(user_id, error = %e, "Failed to notify user");
        }
    }
}
