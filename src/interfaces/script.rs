use super::chat::{CallbackResponder, MessageResponder};
use super::csv::script_reader::{Action, ScriptEvent};
use crate::application::messages;
use crate::application::workflow::{AdminOutcome, ConfirmationWorkflow};
use crate::domain::account::Customer;
use crate::domain::payment::{MessageRef, PaymentId};
use crate::domain::ports::NotifierRef;
use crate::error::{Result, StorefrontError};
use rust_decimal::prelude::ToPrimitive;
use std::time::Duration;

const DEFAULT_USERS_SHOWN: usize = 10;

/// Replays script events against the workflow, answering through the same
/// notifier the workflow uses.
pub struct ScriptRunner {
    workflow: ConfirmationWorkflow,
    notifier: NotifierRef,
}

impl ScriptRunner {
    pub fn new(workflow: ConfirmationWorkflow, notifier: NotifierRef) -> Self {
        Self { workflow, notifier }
    }

    pub fn workflow(&self) -> &ConfirmationWorkflow {
        &self.workflow
    }

    pub async fn run(&self, event: &ScriptEvent) -> Result<()> {
        let customer = Customer::new(event.user);
        let carts = self.workflow.carts();
        // Menu message the user pressed a button on.
        let pressed = CallbackResponder::new(
            self.notifier.clone(),
            event.user,
            MessageRef {
                chat_id: event.user,
                message_id: 0,
            },
        );

        match event.action {
            Action::AddItem => {
                let snapshot = carts.add_item(event.user, parse_product(event)?).await?;
                tracing::info!(user_id = event.user, total = %snapshot.total, "Cart updated");
            }
            Action::RemoveItem => {
                let snapshot = carts.remove_item(event.user, parse_product(event)?).await?;
                tracing::info!(user_id = event.user, total = %snapshot.total, "Cart updated");
            }
            Action::ClearCart => carts.clear(event.user).await,
            Action::Deposit => {
                self.workflow
                    .start_deposit(&customer, event.require_amount()?, event.require_target()?, &pressed)
                    .await?;
            }
            Action::Checkout => match event.require_target()? {
                "balance" => {
                    self.workflow.checkout_balance(&customer, &pressed).await?;
                }
                method => {
                    self.workflow
                        .checkout_external(&customer, method, &pressed)
                        .await?;
                }
            },
            Action::Screenshot => {
                let screenshot = event
                    .target
                    .clone()
                    .unwrap_or_else(|| format!("photo_{}", event.user));
                let sent = MessageResponder::new(self.notifier.clone(), event.user);
                self.workflow
                    .submit_screenshot(&customer, screenshot, event.note.clone(), &sent)
                    .await?;
            }
            Action::Cancel => {
                self.workflow.cancel(&customer, &pressed).await?;
            }
            Action::Approve => {
                let payment_id = self.resolve_payment(event).await?;
                let outcome = self.workflow.approve(event.user, &payment_id).await?;
                report(&outcome);
            }
            Action::Reject => {
                let payment_id = self.resolve_payment(event).await?;
                let outcome = self
                    .workflow
                    .reject(event.user, &payment_id, event.note.clone())
                    .await?;
                report(&outcome);
            }
            Action::Pending => {
                let pending = self.workflow.pending(event.user).await?;
                let currency = &self.workflow.policy().currency;
                tracing::info!("{}", messages::pending_list(&pending, currency));
            }
            Action::Stats => {
                let stats = self.workflow.stats(event.user).await?;
                let pending = stats.pending_deposits + stats.pending_orders;
                let currency = &self.workflow.policy().currency;
                tracing::info!("{}", messages::stats(&stats.ledger, pending, currency));
            }
            Action::Users => {
                let limit = match event.amount {
                    Some(limit) => limit.trunc().to_usize().ok_or_else(|| {
                        StorefrontError::ValidationError(format!("bad user limit: {limit}"))
                    })?,
                    None => DEFAULT_USERS_SHOWN,
                };
                let users = self.workflow.users(event.user, limit).await?;
                let currency = &self.workflow.policy().currency;
                tracing::info!("{}", messages::users_list(&users, currency));
            }
            Action::Wait => {
                let seconds = event.require_amount()?;
                let millis = (seconds * rust_decimal::Decimal::ONE_THOUSAND)
                    .trunc()
                    .try_into()
                    .map_err(|_| StorefrontError::ValidationError(format!("bad wait: {seconds}")))?;
                tokio::time::sleep(Duration::from_millis(millis)).await;
            }
        }
        Ok(())
    }

    /// A numeric target names the customer whose active payment is meant.
    async fn resolve_payment(&self, event: &ScriptEvent) -> Result<PaymentId> {
        let target = event.require_target()?;
        match target.parse() {
            Ok(user_id) => self
                .workflow
                .registry()
                .active_for(user_id)
                .await
                .map(|payment| payment.id)
                .ok_or(StorefrontError::NoActivePayment(user_id)),
            Err(_) => Ok(target.to_string()),
        }
    }
}

fn parse_product(event: &ScriptEvent) -> Result<u32> {
    let target = event.require_target()?;
    target
        .parse()
        .map_err(|_| StorefrontError::ValidationError(format!("bad product id: {target}")))
}

fn report(outcome: &AdminOutcome) {
    match outcome {
        AdminOutcome::Approved(payment) | AdminOutcome::Rejected(payment) => {
            tracing::info!(payment_id = %payment.id, state = %payment.state, "Decision applied");
        }
        AdminOutcome::AlreadyHandled { payment_id, state } => {
            tracing::info!(
                "{}",
                messages::already_handled(payment_id, state.as_ref())
            );
        }
    }
}
