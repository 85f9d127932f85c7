//! In-memory stand-ins for the Postgres repositories and the Redis cache,
//! plus scenario tests that run the services end to end against them.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    api::error,
    configs::KeyValueCache,
    modules::{
        conversation::{
            model::ConversationRow,
            repository::ConversationRepository,
            schema::{ConversationEntity, PairKey},
            service::ConversationService,
        },
        message::{
            model::{InsertMessage, MessageCursor, MessageLimits},
            repository::MessageRepository,
            schema::{MessageEntity, MessageType},
            service::MessageService,
        },
        profile::{model::PublicProfile, repository::ProfileRepository, schema::ProfileEntity},
    },
    utils::retry::RetryPolicy,
};


pub type MemoryConversations = ConversationService<MemoryBackend, MemoryBackend, MemoryBackend>;
pub type MemoryMessages = MessageService<MemoryBackend, MemoryBackend, MemoryBackend>;

const EPOCH: i64 = 1_700_000_000;

pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(EPOCH + secs, 0).single().unwrap_or_default()
}

pub fn message_at(conversation_id: Uuid, sender: Uuid, receiver: Uuid, secs: i64) -> MessageEntity {
    MessageEntity {
        id: Uuid::now_v7(),
        conversation_id,
        sender_id: sender,
        receiver_id: receiver,
        content: Some(format!("message at {secs}")),
        message_type: MessageType::Text,
        product_id: None,
        image_url: None,
        read_at: None,
        created_at: at(secs),
    }
}

pub fn test_retry() -> RetryPolicy {
    RetryPolicy {
        attempts: 2,
        timeout: Duration::from_secs(1),
        base_delay: Duration::from_millis(1),
        exponential: false,
    }
}

/// Conversation and message services wired to one shared in-memory backend.
pub fn memory_services() -> (MemoryBackend, MemoryConversations, MemoryMessages) {
    let backend = MemoryBackend::default();
    let repo = Arc::new(backend.clone());
    let conversations = ConversationService::with_dependencies(
        repo.clone(),
        repo.clone(),
        repo.clone(),
        test_retry(),
    );
    let messages = MessageService::with_dependencies(
        conversations.clone(),
        repo.clone(),
        repo,
        MessageLimits { max_length: 2000 },
        test_retry(),
    );
    (backend, conversations, messages)
}

#[derive(Default)]
struct MemoryState {
    profiles: HashMap<Uuid, ProfileEntity>,
    conversations: HashMap<Uuid, ConversationEntity>,
    messages: HashMap<Uuid, MessageEntity>,
    profile_lookups: usize,
    /// Logical clock; every write advances it by one second.
    clock: i64,
    fail_touch: bool,
    fail_profile_batch: bool,
}

impl MemoryState {
    fn tick(&mut self) -> DateTime<Utc> {
        self.clock += 1;
        at(self.clock)
    }
}

/// One shared store implementing every repository trait.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryBackend {
    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_profile(&self, username: &str) -> ProfileEntity {
        self.add_profile_for_user(username, Uuid::now_v7())
    }

    pub fn add_profile_for_user(&self, username: &str, user_id: Uuid) -> ProfileEntity {
        let mut state = self.lock();
        let now = state.tick();
        let profile = ProfileEntity {
            id: Uuid::now_v7(),
            user_id,
            username: username.to_string(),
            display_name: Some(username.to_string()),
            avatar_url: None,
            is_verified: false,
            rating: None,
            review_count: 0,
            location: None,
            followers_count: 0,
            following_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.profiles.insert(profile.id, profile.clone());
        profile
    }

    pub fn remove_profile(&self, profile_id: &Uuid) {
        self.lock().profiles.remove(profile_id);
    }

    /// Two fresh profiles, a conversation between them and one message.
    pub fn seed_message(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> (ConversationEntity, MessageEntity) {
        let sender = self.add_profile(sender);
        let receiver = self.add_profile(receiver);

        let mut state = self.lock();
        let now = state.tick();
        let message = MessageEntity {
            content: Some(content.to_string()),
            created_at: now,
            ..message_at(Uuid::now_v7(), sender.id, receiver.id, 0)
        };
        let conversation = ConversationEntity {
            id: message.conversation_id,
            participant_1: sender.id,
            participant_2: receiver.id,
            last_message_id: Some(message.id),
            created_at: now,
            updated_at: now,
        };
        state.conversations.insert(conversation.id, conversation.clone());
        state.messages.insert(message.id, message.clone());
        (conversation, message)
    }

    pub fn profile_lookups(&self) -> usize {
        self.lock().profile_lookups
    }

    pub fn conversation_count(&self) -> usize {
        self.lock().conversations.len()
    }

    pub fn stored_conversation(&self, id: &Uuid) -> Option<ConversationEntity> {
        self.lock().conversations.get(id).cloned()
    }

    pub fn messages_in(&self, conversation_id: &Uuid) -> Vec<MessageEntity> {
        let mut messages: Vec<MessageEntity> = self
            .lock()
            .messages
            .values()
            .filter(|m| m.conversation_id == *conversation_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.order_key());
        messages
    }

    /// Makes the last-message pointer update fail.
    pub fn fail_touch(&self, fail: bool) {
        self.lock().fail_touch = fail;
    }

    pub fn fail_profile_batch(&self, fail: bool) {
        self.lock().fail_profile_batch = fail;
    }
}

#[async_trait::async_trait]
impl ProfileRepository for MemoryBackend {
    async fn find_by_user_id(
        &self,
        user_id: &Uuid,
    ) -> Result<Option<ProfileEntity>, error::SystemError> {
        let mut state = self.lock();
        state.profile_lookups += 1;
        Ok(state.profiles.values().find(|p| p.user_id == *user_id).cloned())
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<ProfileEntity>, error::SystemError> {
        Ok(self.lock().profiles.get(id).cloned())
    }

    async fn find_public_by_ids(
        &self,
        ids: &[Uuid],
    ) -> Result<Vec<PublicProfile>, error::SystemError> {
        let state = self.lock();
        if state.fail_profile_batch {
            return Err(error::SystemError::internal("profile batch lookup failed"));
        }
        Ok(ids.iter().filter_map(|id| state.profiles.get(id)).map(PublicProfile::from).collect())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, error::SystemError> {
        let wanted = username.to_lowercase();
        Ok(self.lock().profiles.values().any(|p| p.username.to_lowercase() == wanted))
    }
}

#[async_trait::async_trait]
impl ConversationRepository for MemoryBackend {
    async fn find_by_id(
        &self,
        conversation_id: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        Ok(self.lock().conversations.get(conversation_id).cloned())
    }

    async fn find_by_pair(
        &self,
        pair: &PairKey,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        tokio::task::yield_now().await;
        Ok(self.lock().conversations.values().find(|c| c.pair_key() == *pair).cloned())
    }

    async fn insert(
        &self,
        id: &Uuid,
        participant_1: &Uuid,
        participant_2: &Uuid,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        tokio::task::yield_now().await;

        let mut state = self.lock();
        let pair = PairKey::new(*participant_1, *participant_2);
        if state.conversations.contains_key(id)
            || state.conversations.values().any(|c| c.pair_key() == pair)
        {
            return Ok(None);
        }

        let now = state.tick();
        let conversation = ConversationEntity {
            id: *id,
            participant_1: *participant_1,
            participant_2: *participant_2,
            last_message_id: None,
            created_at: now,
            updated_at: now,
        };
        state.conversations.insert(*id, conversation.clone());
        Ok(Some(conversation))
    }

    async fn find_rows_by_participant(
        &self,
        profile_id: &Uuid,
    ) -> Result<Vec<ConversationRow>, error::SystemError> {
        let state = self.lock();
        let rows = state
            .conversations
            .values()
            .filter(|c| c.has_participant(profile_id))
            .map(|c| {
                let in_conversation = || state.messages.values().filter(|m| m.conversation_id == c.id);
                let latest = in_conversation().max_by_key(|m| m.order_key());
                let unread = in_conversation()
                    .filter(|m| m.receiver_id == *profile_id && m.read_at.is_none())
                    .count();

                ConversationRow {
                    conversation: c.clone(),
                    latest_message_id: latest.map(|m| m.id),
                    latest_content: latest.and_then(|m| m.content.clone()),
                    latest_type: latest.map(|m| m.message_type),
                    latest_sender_id: latest.map(|m| m.sender_id),
                    latest_created_at: latest.map(|m| m.created_at),
                    unread_count: unread as i64,
                }
            })
            .collect();
        Ok(rows)
    }

    async fn touch_last_message(
        &self,
        conversation_id: &Uuid,
        message_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), error::SystemError> {
        let mut state = self.lock();
        if state.fail_touch {
            return Err(error::SystemError::unavailable("connection reset"));
        }

        let conversation = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;
        if conversation.updated_at <= at {
            conversation.last_message_id = Some(*message_id);
        }
        conversation.updated_at = conversation.updated_at.max(at);
        Ok(())
    }
}

#[async_trait::async_trait]
impl MessageRepository for MemoryBackend {
    async fn create(&self, message: &InsertMessage) -> Result<MessageEntity, error::SystemError> {
        let mut state = self.lock();
        if let Some(existing) = state.messages.get(&message.id) {
            return Ok(existing.clone());
        }

        let created_at = state.tick();
        let entity = MessageEntity {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content.clone(),
            message_type: message.message_type,
            product_id: message.product_id,
            image_url: message.image_url.clone(),
            read_at: None,
            created_at,
        };
        state.messages.insert(entity.id, entity.clone());
        Ok(entity)
    }

    async fn find_by_id(&self, id: &Uuid) -> Result<Option<MessageEntity>, error::SystemError> {
        Ok(self.lock().messages.get(id).cloned())
    }

    async fn find_page(
        &self,
        conversation_id: &Uuid,
        before: Option<MessageCursor>,
        limit: i64,
    ) -> Result<Vec<MessageEntity>, error::SystemError> {
        let mut messages = self.messages_in(conversation_id);
        messages.reverse();
        Ok(messages
            .into_iter()
            .filter(|m| before.map_or(true, |c| m.order_key() < (c.created_at, c.id)))
            .take(limit.max(0) as usize)
            .collect())
    }

    async fn mark_read(
        &self,
        conversation_id: &Uuid,
        receiver_id: &Uuid,
    ) -> Result<u64, error::SystemError> {
        let mut state = self.lock();
        let now = state.tick();
        let mut updated = 0;
        for message in state.messages.values_mut() {
            if message.conversation_id == *conversation_id
                && message.receiver_id == *receiver_id
                && message.read_at.is_none()
            {
                message.read_at = Some(now);
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait::async_trait]
impl KeyValueCache for MemoryCache {
    async fn get<T>(&self, key: &str) -> Result<Option<T>, error::SystemError>
    where
        T: serde::de::DeserializeOwned + Send,
    {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match entries.get(key) {
            Some(raw) => Ok(Some(serde_json::from_slice(raw)?)),
            None => Ok(None),
        }
    }

    async fn set<T>(&self, key: &str, value: &T, _expiration: usize) -> Result<(), error::SystemError>
    where
        T: serde::Serialize + Sync,
    {
        let raw = serde_json::to_vec(value)?;
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).insert(key.to_string(), raw);
        Ok(())
    }
}
