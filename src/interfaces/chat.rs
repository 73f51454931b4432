use crate::domain::account::UserId;
use crate::domain::payment::MessageRef;
use crate::domain::ports::{Keyboard, NotifierRef, OutgoingMessage, Responder};
use crate::error::NotifyError;
use async_trait::async_trait;

fn outgoing(text: String, keyboard: Option<Keyboard>) -> OutgoingMessage {
    OutgoingMessage {
        text,
        keyboard,
        photo: None,
    }
}

/// Answers a text or photo message. There is nothing to edit, so both
/// methods post a new message.
pub struct MessageResponder {
    notifier: NotifierRef,
    user_id: UserId,
}

impl MessageResponder {
    pub fn new(notifier: NotifierRef, user_id: UserId) -> Self {
        Self { notifier, user_id }
    }
}

#[async_trait]
impl Responder for MessageResponder {
    async fn reply(&self, text: String, keyboard: Option<Keyboard>) -> Result<(), NotifyError> {
        self.notifier
            .notify_user(self.user_id, outgoing(text, keyboard))
            .await
            .map(|_| ())
    }

    async fn edit_in_place(
        &self,
        text: String,
        keyboard: Option<Keyboard>,
    ) -> Result<(), NotifyError> {
        self.reply(text, keyboard).await
    }
}

/// Answers a button press, which may rewrite the message carrying the button.
pub struct CallbackResponder {
    notifier: NotifierRef,
    user_id: UserId,
    message: MessageRef,
}

impl CallbackResponder {
    pub fn new(notifier: NotifierRef, user_id: UserId, message: MessageRef) -> Self {
        Self {
            notifier,
            user_id,
            message,
        }
    }
}

#[async_trait]
impl Responder for CallbackResponder {
    async fn reply(&self, text: String, keyboard: Option<Keyboard>) -> Result<(), NotifyError> {
        self.notifier
            .notify_user(self.user_id, outgoing(text, keyboard))
            .await
            .map(|_| ())
    }

    async fn edit_in_place(
        &self,
        text: String,
        keyboard: Option<Keyboard>,
    ) -> Result<(), NotifyError> {
        self.notifier
            .edit_message(&self.message, outgoing(text, keyboard))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::in_memory::{Delivery, RecordingNotifier};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_message_responder_always_sends() {
        let notifier = Arc::new(RecordingNotifier::new());
        let responder = MessageResponder::new(notifier.clone(), 5);
        responder.reply("one".to_string(), None).await.unwrap();
        responder.edit_in_place("two".to_string(), None).await.unwrap();

        assert!(notifier
            .deliveries()
            .iter()
            .all(|d| matches!(d, Delivery::User { user_id: 5, .. })));
        assert_eq!(notifier.texts_for(5), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_callback_responder_edits_pressed_message() {
        let notifier = Arc::new(RecordingNotifier::new());
        let pressed = MessageRef {
            chat_id: 5,
            message_id: 77,
        };
        let responder = CallbackResponder::new(notifier.clone(), 5, pressed.clone());
        responder.edit_in_place("edited".to_string(), None).await.unwrap();
        responder.reply("new".to_string(), None).await.unwrap();

        let deliveries = notifier.deliveries();
        assert!(matches!(
            &deliveries[0],
            Delivery::Edit { message_ref, .. } if *message_ref == pressed
        ));
        assert!(matches!(&deliveries[1], Delivery::User { user_id: 5, .. }));
    }
}
