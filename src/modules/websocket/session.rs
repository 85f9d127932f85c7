/// One actor per websocket connection.
///
/// The session owns the client's `ChatState` and its hub subscriptions.
/// Backend calls run through `ctx.spawn()` + `into_actor()`; live updates
/// come back to the actor as `Live` messages so all state changes happen
/// on the actor.
use std::collections::HashMap;

use actix::prelude::*;
use actix_web::web;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    api::error,
    modules::{
        conversation::handle::ConversationSvc,
        message::{handle::MessageSvc, model::MessageDraft},
        profile::handle::ProfileSvc,
        realtime::{
            events::MessageChange,
            hub::{LiveUpdate, RealtimeHub, Subscription, SubscriptionScope},
            store::{ChatState, InboxOutcome, TimelineOutcome},
        },
    },
    utils::Claims,
    ENV,
};

use super::{
    inflight::{PendingJoins, RefreshGate},
    message::{ClientMessage, ServerMessage},
};

/// Services shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub profiles: ProfileSvc,
    pub conversations: ConversationSvc,
    pub messages: MessageSvc,
    pub hub: RealtimeHub,
}

/// An update delivered by one of the session's subscriptions.
#[derive(Message)]
#[rtype(result = "()")]
struct Live {
    scope: SubscriptionScope,
    update: LiveUpdate,
}

/// Sent by the connection loop when the socket is gone.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect;

impl Message for ClientMessage {
    type Result = ();
}

pub struct WebSocketSession {
    pub id: Uuid,
    pub profile_id: Option<Uuid>,
    deps: web::Data<SessionDeps>,
    tx: mpsc::UnboundedSender<String>,
    authenticating: bool,
    state: Option<ChatState>,
    inbox: Option<SpawnHandle>,
    joined: HashMap<Uuid, SpawnHandle>,
    joining: PendingJoins,
    refresh: RefreshGate,
}

impl WebSocketSession {
    pub fn new(deps: web::Data<SessionDeps>, tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            profile_id: None,
            deps,
            tx,
            authenticating: false,
            state: None,
            inbox: None,
            joined: HashMap::new(),
            joining: PendingJoins::default(),
            refresh: RefreshGate::default(),
        }
    }

    fn send_to_client(&self, msg: &ServerMessage) {
        match serde_json::to_string(msg) {
            Ok(json) => {
                if let Err(e) = self.tx.send(json) {
                    tracing::error!("Could not queue frame for session {}: {}", self.id, e);
                }
            }
            Err(e) => {
                tracing::error!("Could not serialize frame for session {}: {}", self.id, e);
            }
        }
    }

    fn send_error(&self, message: impl Into<String>) {
        self.send_to_client(&ServerMessage::Error { message: message.into() });
    }

    fn send_failure(&self, action: &str, e: error::SystemError) {
        tracing::warn!("Session {} failed to {}: {}", self.id, action, e);
        self.send_error(error::Error::from(e).user_message());
    }

    fn require_auth(&self) -> Option<Uuid> {
        if self.profile_id.is_none() {
            self.send_error("Please sign in to continue");
            tracing::warn!("Session {} is not authenticated, request rejected", self.id);
        }
        self.profile_id
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut Context<Self>) {
        match msg {
            ClientMessage::Auth { token } => self.handle_auth(&token, ctx),
            ClientMessage::JoinConversation { conversation_id } => {
                self.handle_join(conversation_id, ctx)
            }
            ClientMessage::LeaveConversation { conversation_id } => {
                self.handle_leave(conversation_id, ctx)
            }
            ClientMessage::SendMessage(outgoing) => {
                let (conversation_id, draft) = outgoing.into_parts();
                self.handle_send(conversation_id, draft, ctx);
            }
            ClientMessage::MarkRead { conversation_id } => {
                self.handle_mark_read(conversation_id, ctx)
            }
            ClientMessage::RefreshConversations => {
                if self.require_auth().is_some() {
                    self.refresh_conversations(ctx);
                }
            }
            ClientMessage::Ping => self.send_to_client(&ServerMessage::Pong),
        }
    }

    fn handle_auth(&mut self, token: &str, ctx: &mut Context<Self>) {
        if self.profile_id.is_some() || self.authenticating {
            self.send_error("Session is already authenticated");
            return;
        }

        let claims = match Claims::decode(token, ENV.jwt_secret.as_ref()) {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!("Token rejected on session {}: {}", self.id, e);
                self.send_to_client(&ServerMessage::AuthFailed {
                    reason: "Your session has expired. Please sign in again".to_string(),
                });
                return;
            }
        };

        if claims.is_refresh_token() {
            self.send_to_client(&ServerMessage::AuthFailed {
                reason: "Access token required".to_string(),
            });
            return;
        }

        self.authenticating = true;
        let deps = self.deps.clone();
        let user_id = claims.sub;

        ctx.spawn(
            async move { deps.profiles.resolve_profile_id(user_id).await }.into_actor(self).map(
                move |result, act, ctx| {
                    act.authenticating = false;
                    match result {
                        Ok(profile_id) => act.on_authenticated(profile_id, ctx),
                        Err(e) => {
                            tracing::warn!(
                                "Profile for user {} unavailable on session {}: {}",
                                user_id,
                                act.id,
                                e
                            );
                            act.send_to_client(&ServerMessage::AuthFailed {
                                reason: error::Error::from(e).user_message().into_owned(),
                            });
                        }
                    }
                },
            ),
        );
    }

    fn on_authenticated(&mut self, profile_id: Uuid, ctx: &mut Context<Self>) {
        self.profile_id = Some(profile_id);
        self.state = Some(ChatState::new(profile_id));
        self.send_to_client(&ServerMessage::AuthSuccess { profile_id });
        tracing::info!("Profile {} authenticated on session {}", profile_id, self.id);

        // subscribe before the first fetch so nothing committed in between is missed
        let mut inbox = self.deps.hub.subscription(SubscriptionScope::Inbox(profile_id));
        if let Err(e) = inbox.activate() {
            self.send_failure("open the inbox feed", e);
            return;
        }
        self.inbox = Some(self.forward(inbox, ctx));
        self.refresh_conversations(ctx);
    }

    /// Pumps a subscription into the actor's mailbox until it is cancelled.
    fn forward(&self, mut subscription: Subscription, ctx: &mut Context<Self>) -> SpawnHandle {
        let addr = ctx.address().downgrade();
        let scope = subscription.scope();

        ctx.spawn(
            async move {
                while let Some(update) = subscription.recv().await {
                    let Some(addr) = addr.upgrade() else {
                        break;
                    };
                    addr.do_send(Live { scope, update });
                }
            }
            .into_actor(self),
        )
    }

    /// Refetches the conversation list. Requests made while a fetch is in
    /// flight collapse into one more fetch after it.
    fn refresh_conversations(&mut self, ctx: &mut Context<Self>) {
        let Some(profile_id) = self.profile_id else {
            return;
        };
        if !self.refresh.try_start() {
            tracing::trace!("Session {} already refreshing, queued another pass", self.id);
            return;
        }
        let deps = self.deps.clone();

        ctx.spawn(
            async move { deps.conversations.list_conversations(profile_id).await }
                .into_actor(self)
                .map(|result, act, ctx| {
                    match result {
                        Ok(views) => {
                            if let Some(state) = act.state.as_mut() {
                                state.replace_conversations(views);
                                let conversations = state.conversations().to_vec();
                                act.send_to_client(&ServerMessage::ConversationList {
                                    conversations,
                                });
                            }
                        }
                        Err(e) => act.send_failure("load conversations", e),
                    }
                    if act.refresh.finish() {
                        act.refresh_conversations(ctx);
                    }
                }),
        );
    }

    fn handle_join(&mut self, conversation_id: Uuid, ctx: &mut Context<Self>) {
        if self.require_auth().is_none() {
            return;
        }

        let mut subscription =
            self.deps.hub.subscription(SubscriptionScope::Conversation(conversation_id));
        if let Err(e) = subscription.activate() {
            self.send_failure("join the conversation", e);
            return;
        }

        let ticket = self.joining.begin(conversation_id);
        self.load_history(conversation_id, Some((ticket, subscription)), ctx);
    }

    /// Fetches the latest page and installs it as the timeline snapshot.
    ///
    /// With a join ticket and subscription this is a join: the subscription
    /// starts forwarding once the snapshot is in place, unless the join was
    /// left or superseded meanwhile, in which case it is dropped. Without one
    /// it is a resync of an already joined conversation.
    fn load_history(
        &self,
        conversation_id: Uuid,
        join: Option<(u64, Subscription)>,
        ctx: &mut Context<Self>,
    ) {
        let Some(profile_id) = self.profile_id else {
            return;
        };
        let deps = self.deps.clone();

        ctx.spawn(
            async move {
                deps.conversations.get_messages(conversation_id, profile_id, None, None).await
            }
            .into_actor(self)
            .map(move |result, act, ctx| {
                let current = match &join {
                    Some((ticket, _)) => act.joining.finish(&conversation_id, *ticket),
                    None => act.joined.contains_key(&conversation_id),
                };

                let page = match result {
                    Ok(page) => page,
                    Err(e) => {
                        act.send_failure("load the conversation", e);
                        return;
                    }
                };

                if !current {
                    tracing::debug!(
                        "Session {} discarded history for conversation {} it no longer follows",
                        act.id,
                        conversation_id
                    );
                    return;
                }

                let messages = match act.state.as_mut() {
                    Some(state) => {
                        state.replace_messages(conversation_id, page.messages);
                        state.messages(&conversation_id)
                    }
                    None => return,
                };
                act.send_to_client(&ServerMessage::ConversationHistory {
                    conversation_id,
                    messages,
                    cursor: page.cursor,
                });

                if let Some((_, subscription)) = join {
                    let handle = act.forward(subscription, ctx);
                    if let Some(previous) = act.joined.insert(conversation_id, handle) {
                        ctx.cancel_future(previous);
                    }
                    tracing::debug!("Session {} joined conversation {}", act.id, conversation_id);
                }
            }),
        );
    }

    fn handle_leave(&mut self, conversation_id: Uuid, ctx: &mut Context<Self>) {
        if self.require_auth().is_none() {
            return;
        }

        self.joining.cancel(&conversation_id);
        if let Some(handle) = self.joined.remove(&conversation_id) {
            ctx.cancel_future(handle);
        }
        if let Some(state) = self.state.as_mut() {
            state.close_timeline(&conversation_id);
        }
        tracing::debug!("Session {} left conversation {}", self.id, conversation_id);
    }

    fn handle_send(
        &self,
        conversation_id: Option<Uuid>,
        draft: MessageDraft,
        ctx: &mut Context<Self>,
    ) {
        let Some(profile_id) = self.require_auth() else {
            return;
        };
        let deps = self.deps.clone();

        ctx.spawn(
            async move { deps.messages.send(profile_id, conversation_id, draft).await }
                .into_actor(self)
                .map(|result, act, _ctx| match result {
                    Ok(outcome) => act.send_to_client(&ServerMessage::MessageSent {
                        message: outcome.message,
                        conversation_synced: outcome.conversation_synced,
                    }),
                    Err(e) => act.send_failure("send a message", e),
                }),
        );
    }

    fn handle_mark_read(&self, conversation_id: Uuid, ctx: &mut Context<Self>) {
        let Some(profile_id) = self.require_auth() else {
            return;
        };
        let deps = self.deps.clone();

        ctx.spawn(
            async move { deps.conversations.mark_read(conversation_id, profile_id).await }
                .into_actor(self)
                .map(move |result, act, _ctx| match result {
                    Ok(updated) => {
                        act.send_to_client(&ServerMessage::MarkedRead { conversation_id, updated })
                    }
                    Err(e) => act.send_failure("mark messages as read", e),
                }),
        );
    }

    fn apply_inbox(&mut self, change: &MessageChange, ctx: &mut Context<Self>) {
        let Some(state) = self.state.as_mut() else {
            return;
        };

        match state.apply_inbox(change) {
            InboxOutcome::Bumped(conversation_id) => {
                if let Some(conversation) = state.conversation(&conversation_id).cloned() {
                    self.send_to_client(&ServerMessage::ConversationUpdated { conversation });
                }
            }
            InboxOutcome::Ignored => {}
            InboxOutcome::NeedsRefresh => self.refresh_conversations(ctx),
        }
    }

    fn apply_timeline(&mut self, conversation_id: Uuid, change: &MessageChange) {
        if !self.joined.contains_key(&conversation_id) {
            return;
        }
        let Some(state) = self.state.as_mut() else {
            return;
        };

        let frame = match (state.apply_conversation(change), change) {
            (TimelineOutcome::Appended, MessageChange::Inserted(message)) => {
                ServerMessage::NewMessage { conversation_id, message: message.clone() }
            }
            (TimelineOutcome::Replaced, MessageChange::Updated(message)) => {
                ServerMessage::MessageUpdated { conversation_id, message: message.clone() }
            }
            (TimelineOutcome::Removed, MessageChange::Deleted(deleted)) => {
                ServerMessage::MessageDeleted { conversation_id, message_id: deleted.id }
            }
            _ => return,
        };
        self.send_to_client(&frame);
    }
}

impl Actor for WebSocketSession {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        tracing::debug!("WebSocket session started: {}", self.id);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        // spawned forwarders are dropped with the context, releasing their subscriptions
        tracing::debug!(
            "WebSocket session stopped: {} ({} joined conversations)",
            self.id,
            self.joined.len()
        );
    }
}

impl Handler<ClientMessage> for WebSocketSession {
    type Result = ();

    fn handle(&mut self, msg: ClientMessage, ctx: &mut Context<Self>) {
        self.handle_client_message(msg, ctx);
    }
}

impl Handler<Live> for WebSocketSession {
    type Result = ();

    fn handle(&mut self, msg: Live, ctx: &mut Context<Self>) {
        match (msg.scope, msg.update) {
            (SubscriptionScope::Inbox(_), LiveUpdate::Change(event)) => {
                self.apply_inbox(&event.change, ctx)
            }
            (SubscriptionScope::Inbox(_), LiveUpdate::Resync) => self.refresh_conversations(ctx),
            (SubscriptionScope::Conversation(id), LiveUpdate::Change(event)) => {
                self.apply_timeline(id, &event.change)
            }
            (SubscriptionScope::Conversation(id), LiveUpdate::Resync) => {
                if self.state.as_ref().is_some_and(|state| state.has_timeline(&id)) {
                    self.load_history(id, None, ctx);
                }
            }
        }
    }
}

impl Handler<Disconnect> for WebSocketSession {
    type Result = ();

    fn handle(&mut self, _msg: Disconnect, ctx: &mut Context<Self>) {
        if let Some(handle) = self.inbox.take() {
            ctx.cancel_future(handle);
        }
        for (_, handle) in self.joined.drain() {
            ctx.cancel_future(handle);
        }
        self.joining.clear();
        ctx.stop();
    }
}
