use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::modules::{
    conversation::model::{sort_by_recency, ConversationView, LastMessageSnippet},
    message::schema::MessageEntity,
    realtime::events::MessageChange,
};

type OrderKey = (DateTime<Utc>, Uuid);

#[derive(Debug, Clone, PartialEq)]
pub enum InboxOutcome {
    /// The conversation moved or changed; it is now at the returned id.
    Bumped(Uuid),
    Ignored,
    /// The change cannot be merged locally; reload the list.
    NeedsRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineOutcome {
    Appended,
    Replaced,
    Removed,
    Duplicate,
    Ignored,
}

#[derive(Debug, Default)]
struct Timeline {
    messages: BTreeMap<OrderKey, MessageEntity>,
    index: HashMap<Uuid, OrderKey>,
}

impl Timeline {
    fn from_snapshot(snapshot: Vec<MessageEntity>) -> Self {
        let mut timeline = Timeline::default();
        for message in snapshot {
            timeline.upsert(message);
        }
        timeline
    }

    fn newest_key(&self) -> Option<OrderKey> {
        self.messages.keys().next_back().copied()
    }

    fn upsert(&mut self, message: MessageEntity) -> bool {
        let key = message.order_key();
        let existed = self.index.insert(message.id, key).is_some();
        self.messages.insert(key, message);
        existed
    }

    fn remove(&mut self, id: &Uuid) -> bool {
        match self.index.remove(id) {
            Some(key) => self.messages.remove(&key).is_some(),
            None => false,
        }
    }
}

/// Conversation list and open timelines of one profile.
///
/// Full-refresh snapshots are authoritative. Live changes newer than the
/// snapshot are kept on top of it; everything else is replaced.
#[derive(Debug)]
pub struct ChatState {
    profile_id: Uuid,
    conversations: Vec<ConversationView>,
    timelines: HashMap<Uuid, Timeline>,
}

fn snippet_key(snippet: &Option<LastMessageSnippet>) -> Option<OrderKey> {
    snippet.as_ref().map(|s| (s.created_at, s.id))
}

impl ChatState {
    pub fn new(profile_id: Uuid) -> Self {
        Self { profile_id, conversations: Vec::new(), timelines: HashMap::new() }
    }

    pub fn conversations(&self) -> &[ConversationView] {
        &self.conversations
    }

    pub fn conversation(&self, conversation_id: &Uuid) -> Option<&ConversationView> {
        self.conversations.iter().find(|c| c.id == *conversation_id)
    }

    pub fn messages(&self, conversation_id: &Uuid) -> Vec<MessageEntity> {
        self.timelines
            .get(conversation_id)
            .map(|t| t.messages.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_timeline(&self, conversation_id: &Uuid) -> bool {
        self.timelines.contains_key(conversation_id)
    }

    pub fn close_timeline(&mut self, conversation_id: &Uuid) {
        self.timelines.remove(conversation_id);
    }

    pub fn replace_conversations(&mut self, snapshot: Vec<ConversationView>) {
        let mut previous: HashMap<Uuid, ConversationView> =
            self.conversations.drain(..).map(|c| (c.id, c)).collect();

        self.conversations = snapshot
            .into_iter()
            .map(|mut fresh| {
                if let Some(local) = previous.remove(&fresh.id) {
                    if snippet_key(&local.last_message) > snippet_key(&fresh.last_message) {
                        fresh.updated_at = fresh.updated_at.max(local.updated_at);
                        fresh.last_message = local.last_message;
                        fresh.unread_count = fresh.unread_count.max(local.unread_count);
                    }
                }
                fresh
            })
            .collect();

        sort_by_recency(&mut self.conversations);
    }

    /// Installs a history snapshot and opens the timeline if needed.
    pub fn replace_messages(&mut self, conversation_id: Uuid, snapshot: Vec<MessageEntity>) {
        let mut fresh = Timeline::from_snapshot(snapshot);

        if let Some(local) = self.timelines.remove(&conversation_id) {
            let newest = fresh.newest_key();
            for (key, message) in local.messages {
                if newest.map_or(true, |newest| key > newest) {
                    fresh.upsert(message);
                }
            }
        }

        self.timelines.insert(conversation_id, fresh);
    }

    /// Merges one change into the conversation list.
    pub fn apply_inbox(&mut self, change: &MessageChange) -> InboxOutcome {
        if !change.involves(&self.profile_id) {
            return InboxOutcome::Ignored;
        }

        let conversation_id = change.conversation_id();
        let profile_id = self.profile_id;
        let Some(view) = self.conversations.iter_mut().find(|c| c.id == conversation_id) else {
            return InboxOutcome::NeedsRefresh;
        };

        match change {
            MessageChange::Inserted(message) => {
                if snippet_key(&view.last_message) >= Some(message.order_key()) {
                    return InboxOutcome::Ignored;
                }
                view.last_message = Some(LastMessageSnippet::from(message));
                view.updated_at = view.updated_at.max(message.created_at);
                if message.receiver_id == profile_id && message.read_at.is_none() {
                    view.unread_count += 1;
                }
            }
            MessageChange::Updated(message) => {
                let mut changed = false;
                if view.last_message.as_ref().is_some_and(|s| s.id == message.id) {
                    view.last_message = Some(LastMessageSnippet::from(message));
                    changed = true;
                }
                if message.receiver_id == profile_id && message.read_at.is_some() && view.unread_count > 0 {
                    view.unread_count -= 1;
                    changed = true;
                }
                if !changed {
                    return InboxOutcome::Ignored;
                }
            }
            MessageChange::Deleted(deleted) => {
                if view.last_message.as_ref().is_some_and(|s| s.id == deleted.id) {
                    return InboxOutcome::NeedsRefresh;
                }
                return InboxOutcome::Ignored;
            }
        }

        sort_by_recency(&mut self.conversations);
        InboxOutcome::Bumped(conversation_id)
    }

    /// Merges one change into an open timeline; closed timelines are left alone.
    pub fn apply_conversation(&mut self, change: &MessageChange) -> TimelineOutcome {
        let Some(timeline) = self.timelines.get_mut(&change.conversation_id()) else {
            return TimelineOutcome::Ignored;
        };

        match change {
            MessageChange::Inserted(message) => {
                if timeline.index.contains_key(&message.id) {
                    return TimelineOutcome::Duplicate;
                }
                timeline.upsert(message.clone());
                TimelineOutcome::Appended
            }
            MessageChange::Updated(message) => {
                if !timeline.index.contains_key(&message.id) {
                    return TimelineOutcome::Ignored;
                }
                timeline.upsert(message.clone());
                TimelineOutcome::Replaced
            }
            MessageChange::Deleted(deleted) => {
                if timeline.remove(&deleted.id) {
                    TimelineOutcome::Removed
                } else {
                    TimelineOutcome::Ignored
                }
            }
        }
    }
}
