use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{
        model::{InsertMessage, MessageCursor},
        schema::MessageEntity,
    },
};

#[async_trait::async_trait]
pub trait MessageRepository {
    /// Inserts the message. Inserting an id that already exists returns the
    /// stored row instead of a second copy.
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError>;

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<MessageEntity>, error::SystemError>;

    /// Newest first, strictly older than `before` when given.
    async fn find_page(
        &self,
        conversation_id: &Uuid,
        before: Option<MessageCursor>,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError>;

    /// Marks every unread message addressed to `receiver_id` as read.
    async fn mark_read(
        &self,
        conversation_id: &Uuid,
        receiver_id: &Uuid,
    ) -> Result<u64, error::SystemError>;
}
