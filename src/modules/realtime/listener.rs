use std::{sync::Arc, time::Duration};

use sqlx::{postgres::PgListener, PgPool};

use crate::{
    api::error,
    constants::MESSAGE_CHANGES_CHANNEL,
    modules::{
        message::repository::MessageRepository,
        realtime::{
            events::{ChangeNotification, ChangeOp, DeletedMessage, MessageChange},
            hub::RealtimeHub,
        },
    },
};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Feeds the hub from the `messages` change notifications. Never returns;
/// a dropped listener connection is re-established after a short delay.
pub async fn run<M>(pool: PgPool, hub: RealtimeHub, message_repo: Arc<M>)
where
    M: MessageRepository + Send + Sync,
{
    let mut resumed = false;
    loop {
        if let Err(e) = listen(&pool, &hub, message_repo.as_ref(), resumed).await {
            tracing::error!("Message change listener failed: {e}");
        }
        resumed = true;
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn listen<M>(
    pool: &PgPool,
    hub: &RealtimeHub,
    message_repo: &M,
    resumed: bool,
) -> Result<(), error::SystemError>
where
    M: MessageRepository + Send + Sync,
{
    let mut listener = PgListener::connect_with(pool).await?;
    listener.listen(MESSAGE_CHANGES_CHANNEL).await?;
    tracing::info!("Listening for message changes on {MESSAGE_CHANGES_CHANNEL}");

    if resumed {
        hub.signal_gap();
    }

    loop {
        // None: the connection dropped and will be re-established on the next call
        let Some(notification) = listener.try_recv().await? else {
            tracing::warn!("Message change listener reconnecting, changes may be missed");
            hub.signal_gap();
            continue;
        };

        let parsed = match ChangeNotification::parse(notification.payload()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Ignoring malformed change notification: {e}");
                continue;
            }
        };

        match resolve(parsed, message_repo).await {
            Ok(Some(change)) => {
                let seq = hub.publish(change);
                tracing::trace!("Published message change #{seq}");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Could not load changed message: {e}");
                hub.signal_gap();
            }
        }
    }
}

/// Turns a trigger notification into a change carrying the current row.
/// Rows that disappeared before they could be read yield `None`.
pub async fn resolve<M>(
    notification: ChangeNotification,
    message_repo: &M,
) -> Result<Option<MessageChange>, error::SystemError>
where
    M: MessageRepository + Send + Sync,
{
    let change = match notification.op {
        ChangeOp::Insert => message_repo.find_by_id(&notification.id).await?.map(MessageChange::Inserted),
        ChangeOp::Update => message_repo.find_by_id(&notification.id).await?.map(MessageChange::Updated),
        ChangeOp::Delete => Some(MessageChange::Deleted(DeletedMessage {
            id: notification.id,
            conversation_id: notification.conversation_id,
            sender_id: notification.sender_id,
            receiver_id: notification.receiver_id,
        })),
    };

    Ok(change)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::MemoryBackend;
    use uuid::Uuid;

    fn notification(op: ChangeOp, id: Uuid) -> ChangeNotification {
        ChangeNotification {
            op,
            id,
            conversation_id: Uuid::now_v7(),
            sender_id: Uuid::now_v7(),
            receiver_id: Uuid::now_v7(),
        }
    }

    #[tokio::test]
    async fn test_insert_loads_the_row() {
        let backend = MemoryBackend::default();
        let (_, message) = backend.seed_message("alice", "bob", "hello");

        let change = resolve(notification(ChangeOp::Insert, message.id), &backend).await.unwrap();
        assert_eq!(change, Some(MessageChange::Inserted(message)));
    }

    #[tokio::test]
    async fn test_vanished_row_is_skipped() {
        let backend = MemoryBackend::default();
        let change =
            resolve(notification(ChangeOp::Update, Uuid::now_v7()), &backend).await.unwrap();
        assert_eq!(change, None);
    }

    #[tokio::test]
    async fn test_delete_uses_notification_fields() {
        let backend = MemoryBackend::default();
        let deleted = notification(ChangeOp::Delete, Uuid::now_v7());

        let change = resolve(deleted.clone(), &backend).await.unwrap();
        assert_eq!(change.map(|c| c.message_id()), Some(deleted.id));
    }
}
