use uuid::Uuid;

use crate::{
    api::error,
    modules::conversation::{
        model::ConversationRow,
        repository::ConversationRepository,
        schema::{ConversationEntity, PairKey},
    },
};

#[derive(Clone)]
pub struct ConversationRepositoryPg {
    pool: sqlx::PgPool,
}

impl ConversationRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConversationRepository for ConversationRepositoryPg {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let conversation =
            sqlx::query_as::<_, ConversationEntity>("SELECT * FROM conversations WHERE id = $1")
                .bind(conversation_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(conversation)
    }

    async fn find_by_pair(
        &self,
        pair: &PairKey,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let conversation = sqlx::query_as::<_, ConversationEntity>(
            r#"
            SELECT * FROM conversations
            WHERE LEAST(participant_1, participant_2) = $1
              AND GREATEST(participant_1, participant_2) = $2
            "#,
        )
        .bind(pair.low)
        .bind(pair.high)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn insert(
        &self,
        id: &Uuid,
        participant_1: &Uuid,
        participant_2: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        let conversation = sqlx::query_as::<_, ConversationEntity>(
            r#"
            INSERT INTO conversations (id, participant_1, participant_2)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(participant_1)
        .bind(participant_2)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    async fn find_rows_by_participant(
        &self,
        profile_id: &Uuid,
    ) -> Result<Vec<ConversationRow>, error::SystemError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT
                c.id,
                c.participant_1,
                c.participant_2,
                c.last_message_id,
                c.created_at,
                c.updated_at,

                m.id AS latest_message_id,
                m.content AS latest_content,
                m.message_type AS latest_type,
                m.sender_id AS latest_sender_id,
                m.created_at AS latest_created_at,

                COALESCE(u.unread, 0) AS unread_count
            FROM conversations c
            LEFT JOIN LATERAL (
                SELECT id, content, message_type, sender_id, created_at
                FROM messages
                WHERE conversation_id = c.id
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            ) m ON true
            LEFT JOIN LATERAL (
                SELECT COUNT(*) AS unread
                FROM messages
                WHERE conversation_id = c.id AND receiver_id = $1 AND read_at IS NULL
            ) u ON true
            WHERE c.participant_1 = $1 OR c.participant_2 = $1
            "#,
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn touch_last_message(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        at: chrono::DateTime<chrono::Utc>,
    ) -> Result<(), error::SystemError> {
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET last_message_id = CASE WHEN updated_at <= $3 THEN $2 ELSE last_message_id END,
                updated_at = GREATEST(updated_at, $3)
            WHERE id = $1
            "#,
        )
        .bind(conversation_id)
        .bind(message_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(error::SystemError::not_found("Conversation not found"));
        }

        Ok(())
    }
}
