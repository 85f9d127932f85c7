use std::sync::Arc;

use log::{info, warn};
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        conversation::{repository::ConversationRepository, service::ConversationService},
        message::{
            model::{MessageDraft, MessageLimits, SendOutcome},
            repository::MessageRepository,
        },
        profile::repository::ProfileRepository,
    },
    utils::retry::{with_retry, RetryPolicy},
};

#[derive(Clone)]
pub struct MessageService<C, P, M>
where
    C: ConversationRepository + Send + Sync,
    P: ProfileRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
{
    conversations: ConversationService<C, P, M>,
    conversation_repo: Arc<C>,
    message_repo: Arc<M>,
    limits: MessageLimits,
    retry: RetryPolicy,
}

impl<C, P, M> MessageService<C, P, M>
where
    C: ConversationRepository + Send + Sync,
    P: ProfileRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
{
    pub fn with_dependencies(
        conversations: ConversationService<C, P, M>,
        conversation_repo: Arc<C>,
        message_repo: Arc<M>,
        limits: MessageLimits,
        retry: RetryPolicy,
    ) -> Self {
        info!("MessageService initialized with dependencies");
        MessageService { conversations, conversation_repo, message_repo, limits, retry }
    }

    /// Stores a message and then moves the conversation's last-message pointer.
    ///
    /// The draft is checked before any backend call. When the second step
    /// fails the message is still returned with `conversation_synced = false`.
    pub async fn send_message(
        &self,
        conversation_id: Uuid,
        sender_id: Uuid,
        draft: MessageDraft,
    ) -> Result<SendOutcome, error::SystemError> {
        let draft = draft.into_valid(self.limits)?;

        let conversation =
            self.conversations.require_participant(conversation_id, sender_id).await?;
        let receiver_id = conversation
            .other_participant(&sender_id)
            .ok_or_else(|| error::SystemError::internal("Participant without counterpart"))?;

        if draft.receiver_id.is_some_and(|explicit| explicit != receiver_id) {
            return Err(error::SystemError::bad_request(
                "Receiver is not part of this conversation",
            ));
        }

        // generated once so a retried insert lands on the same row
        let insert = draft.into_insert(Uuid::now_v7(), conversation_id, sender_id, receiver_id);
        let message =
            with_retry(&self.retry, "message.create", || self.message_repo.create(&insert)).await?;

        let conversation_synced = match with_retry(&self.retry, "conversation.touch", || {
            self.conversation_repo.touch_last_message(
                &conversation_id,
                &message.id,
                message.created_at,
            )
        })
        .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Message {} stored but conversation {conversation_id} was not updated: {e}",
                    message.id
                );
                false
            }
        };

        Ok(SendOutcome { message, conversation_synced })
    }

    /// First-contact flow: finds or opens the conversation with `receiver_id`, then sends.
    pub async fn send_to_profile(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        draft: MessageDraft,
    ) -> Result<SendOutcome, error::SystemError> {
        let draft = MessageDraft { receiver_id: Some(receiver_id), ..draft.into_valid(self.limits)? };

        let conversation =
            self.conversations.get_or_create_conversation(sender_id, receiver_id).await?;

        self.send_message(conversation.id, sender_id, draft).await
    }

    /// Sends into `conversation_id` when given, otherwise to the draft's receiver.
    pub async fn send(
        &self,
        sender_id: Uuid,
        conversation_id: Option<Uuid>,
        draft: MessageDraft,
    ) -> Result<SendOutcome, error::SystemError> {
        match (conversation_id, draft.receiver_id) {
            (Some(conversation_id), _) => self.send_message(conversation_id, sender_id, draft).await,
            (None, Some(receiver_id)) => self.send_to_profile(sender_id, receiver_id, draft).await,
            (None, None) => {
                Err(error::SystemError::bad_request("A conversation or a receiver is required"))
            }
        }
    }
}
