use uuid::Uuid;

use crate::{
    api::error,
    modules::message::{
        model::{InsertMessage, MessageCursor},
        repository::MessageRepository,
        schema::MessageEntity,
    },
};

#[derive(Clone)]
pub struct MessageRepositoryPg {
    pool: sqlx::PgPool,
}

impl MessageRepositoryPg {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for MessageRepositoryPg {
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError> {
        let inserted = sqlx::query_as::<_, MessageEntity>(
            r#"
            INSERT INTO messages
                (id, conversation_id, sender_id, receiver_id, content, message_type, product_id, image_url)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(&message.content)
        .bind(message.message_type)
        .bind(message.product_id)
        .bind(&message.image_url)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(message) = inserted {
            return Ok(message);
        }

        // an earlier attempt with the same id already landed
        self.find_by_id(&message.id)
            .await?
            .ok_or_else(|| error::SystemError::internal("Message insert conflicted but no row exists"))
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<MessageEntity>, error::SystemError> {
        let message = sqlx::query_as::<_, MessageEntity>("SELECT * FROM messages WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(message)
    }

    async fn find_page(
        &self,
        conversation_id: &Uuid,
        before: Option<MessageCursor>,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        // served by messages_conversation_created_idx
        let messages = match before {
            Some(cursor) => {
                sqlx::query_as::<_, MessageEntity>(
                    r#"
                    SELECT * FROM messages
                    WHERE conversation_id = $1 AND (created_at, id) < ($2, $3)
                    ORDER BY created_at DESC, id DESC
                    LIMIT $4
                    "#,
                )
                .bind(conversation_id)
                .bind(cursor.created_at)
                .bind(cursor.id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MessageEntity>(
                    r#"
                    SELECT * FROM messages
                    WHERE conversation_id = $1
                    ORDER BY created_at DESC, id DESC
                    LIMIT $2
                    "#,
                )
                .bind(conversation_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(messages)
    }

    async fn mark_read(
        &self,
        conversation_id: &Uuid,
        receiver_id: &Uuid,
    ) -> Result<u64, error::SystemError> {
        let result = sqlx::query(
            r#"
            UPDATE messages SET read_at = NOW()
            WHERE conversation_id = $1 AND receiver_id = $2 AND read_at IS NULL
            "#,
        )
        .bind(conversation_id)
        .bind(receiver_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
