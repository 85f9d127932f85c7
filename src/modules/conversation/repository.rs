use uuid::Uuid;

use crate::{
    api::error,
    modules::conversation::{
        model::ConversationRow,
        schema::{ConversationEntity, PairKey},
    },
};

#[async_trait::async_trait]
pub trait ConversationRepository {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError>;

    async fn find_by_pair(
        &self,
        pair: &PairKey,
    ) -> Result<Option<ConversationEntity>, error::SystemError>;

    /// Inserts a conversation. Returns `None` when a conversation for the
    /// same pair (or the same id) already exists.
    async fn insert(
        &self,
        id: &Uuid,
        participant_1: &Uuid,
        participant_2: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError>;

    async fn find_rows_by_participant(
        &self,
        profile_id: &Uuid,
    ) -> Result<Vec<ConversationRow>, error::SystemError>;

    /// Points the conversation at `message_id` and moves `updated_at` forward
    /// to `at`; never moves it backwards.
    async fn touch_last_message(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), error::SystemError>;
}
