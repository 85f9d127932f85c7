use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use log::{info, warn};
use uuid::Uuid;

use crate::{
    api::error,
    constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    modules::{
        conversation::{
            model::{sort_by_recency, ConversationView},
            repository::ConversationRepository,
            schema::{ConversationEntity, PairKey},
        },
        message::{
            model::{MessageCursor, MessagePage},
            repository::MessageRepository,
        },
        profile::{model::PublicProfile, repository::ProfileRepository},
    },
    utils::retry::{with_retry, RetryPolicy},
};

#[derive(Clone)]
pub struct ConversationService<C, P, M>
where
    C: ConversationRepository + Send + Sync,
    P: ProfileRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
{
    conversation_repo: Arc<C>,
    profile_repo: Arc<P>,
    message_repo: Arc<M>,
    retry: RetryPolicy,
}

impl<C, P, M> ConversationService<C, P, M>
where
    C: ConversationRepository + Send + Sync,
    P: ProfileRepository + Send + Sync,
    M: MessageRepository + Send + Sync,
{
    pub fn with_dependencies(
        conversation_repo: Arc<C>,
        profile_repo: Arc<P>,
        message_repo: Arc<M>,
        retry: RetryPolicy,
    ) -> Self {
        info!("ConversationService initialized with dependencies");
        ConversationService { conversation_repo, profile_repo, message_repo, retry }
    }

    /// Returns the conversation between the two profiles, creating it on first contact.
    ///
    /// Concurrent callers for the same pair meet at the unique pair constraint:
    /// the loser's insert comes back empty and it re-reads the winner's row.
    pub async fn get_or_create_conversation(
        &self,
        self_id: Uuid,
        other_id: Uuid,
    ) -> Result<ConversationEntity, error::SystemError> {
        if self_id == other_id {
            return Err(error::SystemError::bad_request("You cannot message yourself"));
        }

        let pair = PairKey::new(self_id, other_id);
        if let Some(existing) = self.find_by_pair(&pair).await? {
            return Ok(existing);
        }

        let other = with_retry(&self.retry, "profile.find_by_id", || {
            self.profile_repo.find_by_id(&other_id)
        })
        .await?;
        if other.is_none() {
            return Err(error::SystemError::not_found("Profile not found"));
        }

        let id = Uuid::now_v7();
        let inserted = match with_retry(&self.retry, "conversation.insert", || {
            self.conversation_repo.insert(&id, &self_id, &other_id)
        })
        .await
        {
            Ok(inserted) => inserted,
            Err(e) if e.is_conflict() => None,
            Err(e) => return Err(e),
        };

        match inserted {
            Some(conversation) => {
                info!("Conversation {} created between {self_id} and {other_id}", conversation.id);
                Ok(conversation)
            }
            None => self.find_by_pair(&pair).await?.ok_or_else(|| {
                error::SystemError::internal("Conversation insert conflicted but no row exists")
            }),
        }
    }

    async fn find_by_pair(
        &self,
        pair: &PairKey,
    ) -> Result<Option<ConversationEntity>, error::SystemError> {
        with_retry(&self.retry, "conversation.find_by_pair", || {
            self.conversation_repo.find_by_pair(pair)
        })
        .await
    }

    /// Loads the conversation and checks that `profile_id` takes part in it.
    pub async fn require_participant(
        &self,
        conversation_id: Uuid,
        profile_id: Uuid,
    ) -> Result<ConversationEntity, error::SystemError> {
        let conversation = with_retry(&self.retry, "conversation.find_by_id", || {
            self.conversation_repo.find_by_id(&conversation_id)
        })
        .await?
        .ok_or_else(|| error::SystemError::not_found("Conversation not found"))?;

        if !conversation.has_participant(&profile_id) {
            return Err(error::SystemError::forbidden("You are not part of this conversation"));
        }

        Ok(conversation)
    }

    /// Every conversation of `self_id`, most recently active first.
    ///
    /// Participant profiles are fetched in one batch. Profiles that are missing,
    /// or a batch lookup that fails outright, fall back to a placeholder.
    pub async fn list_conversations(
        &self,
        self_id: Uuid,
    ) -> Result<Vec<ConversationView>, error::SystemError> {
        let rows = with_retry(&self.retry, "conversation.find_rows_by_participant", || {
            self.conversation_repo.find_rows_by_participant(&self_id)
        })
        .await?;

        let mut seen = HashSet::new();
        let other_ids: Vec<Uuid> = rows
            .iter()
            .filter_map(|row| row.conversation.other_participant(&self_id))
            .filter(|id| seen.insert(*id))
            .collect();

        let profiles: HashMap<Uuid, PublicProfile> = if other_ids.is_empty() {
            HashMap::new()
        } else {
            match with_retry(&self.retry, "profile.find_public_by_ids", || {
                self.profile_repo.find_public_by_ids(&other_ids)
            })
            .await
            {
                Ok(found) => found.into_iter().map(|p| (p.id, p)).collect(),
                Err(e) => {
                    warn!("Profile batch lookup failed for {self_id}, using placeholders: {e}");
                    HashMap::new()
                }
            }
        };

        let mut views: Vec<ConversationView> = rows
            .into_iter()
            .filter_map(|row| {
                let other_id = row.conversation.other_participant(&self_id)?;
                let profile =
                    profiles.get(&other_id).cloned().unwrap_or_else(|| PublicProfile::unknown(other_id));
                Some(row.into_view(profile))
            })
            .collect();

        let placeholders = views.iter().filter(|v| v.other_participant.is_placeholder()).count();
        if placeholders > 0 {
            warn!("{placeholders} conversation(s) of {self_id} show a placeholder participant");
        }

        let stale = views.iter().filter(|v| v.stale).count();
        if stale > 0 {
            warn!("{stale} conversation(s) of {self_id} have a lagging last message pointer");
        }

        sort_by_recency(&mut views);
        Ok(views)
    }

    /// One page of history, oldest to newest, and the cursor for the page before it.
    pub async fn get_messages(
        &self,
        conversation_id: Uuid,
        self_id: Uuid,
        limit: Option<i64>,
        cursor: Option<&str>,
    ) -> Result<MessagePage, error::SystemError> {
        let before = cursor.map(MessageCursor::parse).transpose()?;
        let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        self.require_participant(conversation_id, self_id).await?;

        let mut messages = with_retry(&self.retry, "message.find_page", || {
            self.message_repo.find_page(&conversation_id, before, limit + 1)
        })
        .await?;

        let has_more = messages.len() > limit as usize;
        messages.truncate(limit as usize);
        let cursor = if has_more {
            messages.last().map(|oldest| MessageCursor::from_message(oldest).encode())
        } else {
            None
        };

        messages.reverse();
        Ok(MessagePage { messages, cursor })
    }

    pub async fn mark_read(
        &self,
        conversation_id: Uuid,
        self_id: Uuid,
    ) -> Result<u64, error::SystemError> {
        self.require_participant(conversation_id, self_id).await?;

        with_retry(&self.retry, "message.mark_read", || {
            self.message_repo.mark_read(&conversation_id, &self_id)
        })
        .await
    }
}
