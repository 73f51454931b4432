use crate::domain::account::UserId;
use crate::domain::payment::MessageRef;
use crate::domain::ports::{ApprovalChannel, Notifier, OutgoingMessage};
use crate::error::NotifyError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicI64, Ordering};

/// Notifier for running without a chat platform: every outbound message is
/// written to the log.
pub struct LogNotifier {
    payment_channel_id: i64,
    order_channel_id: i64,
    next_message_id: AtomicI64,
}

impl LogNotifier {
    pub fn new(payment_channel_id: i64, order_channel_id: i64) -> Self {
        Self {
            payment_channel_id,
            order_channel_id,
            next_message_id: AtomicI64::new(1),
        }
    }

    fn next_ref(&self, chat_id: i64) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: self.next_message_id.fetch_add(1, Ordering::Relaxed),
        }
    }
}

fn buttons(message: &OutgoingMessage) -> Vec<&str> {
    message
        .keyboard
        .iter()
        .flatten()
        .flatten()
        .map(|button| button.action.as_str())
        .collect()
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_user(
        &self,
        user_id: UserId,
        message: OutgoingMessage,
    ) -> Result<MessageRef, NotifyError> {
        let message_ref = self.next_ref(user_id);
        tracing::info!(
            target: "storefront::outbox",
            user_id,
            message_id = message_ref.message_id,
            buttons = ?buttons(&message),
            "{}",
            message.text
        );
        Ok(message_ref)
    }

    async fn notify_admins(&self, message: OutgoingMessage) -> Result<(), NotifyError> {
        tracing::info!(target: "storefront::outbox", chat = "admins", "{}", message.text);
        Ok(())
    }

    async fn post_for_approval(
        &self,
        channel: ApprovalChannel,
        message: OutgoingMessage,
    ) -> Result<MessageRef, NotifyError> {
        let chat_id = match channel {
            ApprovalChannel::Payments => self.payment_channel_id,
            ApprovalChannel::Orders => self.order_channel_id,
        };
        let message_ref = self.next_ref(chat_id);
        tracing::info!(
            target: "storefront::outbox",
            chat_id,
            message_id = message_ref.message_id,
            photo = ?message.photo,
            buttons = ?buttons(&message),
            "{}",
            message.text
        );
        Ok(message_ref)
    }

    async fn update_approval_message(
        &self,
        message: &MessageRef,
        appended_text: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            target: "storefront::outbox",
            chat_id = message.chat_id,
            message_id = message.message_id,
            "appended: {}",
            appended_text.trim()
        );
        Ok(())
    }

    async fn edit_message(
        &self,
        message: &MessageRef,
        replacement: OutgoingMessage,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            target: "storefront::outbox",
            chat_id = message.chat_id,
            message_id = message.message_id,
            "edited: {}",
            replacement.text
        );
        Ok(())
    }
}
