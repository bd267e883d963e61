// A realtime session: everything one execution context knows and does.
//
// The session owns the per-context state (presence map, typing map, unread ledger,
// message view) and wires user actions and inbound envelopes to the core services.
// Peers never share this state; they converge only through the event bus.

use crate::core::chat::{
    ChannelInfo, ChatError, ChatScope, Identity, Message, MessageKind, MessageRouter,
    MessageStore, SendReceipt,
};
use crate::core::clock::Clock;
use crate::core::events::{
    spawn_dispatch, Envelope, EnvelopeBody, EnvelopeHandler, EnvelopeSource, EventBus,
    Heartbeat, NotificationPayload, SystemNotice, TypingSignal,
};
use crate::core::moderation::{
    ContentFilter, ModerationService, ModerationStore, ViolationSeverity,
    RESTRICTED_WORD_CATEGORY,
};
use crate::core::notifications::{
    Notification, NotificationLedger, NotificationSeverity, NotificationSink,
};
use crate::core::presence::{PresenceChange, PresenceEntry, PresenceStatus, PresenceTracker};
use crate::core::typing::TypingCoordinator;
use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Timer settings for a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub heartbeat_interval: Duration,
    pub typing_sweep_interval: Duration,
    /// Peers silent for longer than this are dropped from the presence map.
    pub presence_stale_after: chrono::Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            typing_sweep_interval: Duration::from_millis(500),
            presence_stale_after: chrono::Duration::seconds(90),
        }
    }
}

/// Shared services a session is built from.
pub struct SessionDeps<M: MessageStore, S: ModerationStore> {
    pub bus: Arc<dyn EventBus>,
    pub messages: Arc<M>,
    pub moderation: Arc<ModerationService<S>>,
    pub sink: Arc<dyn NotificationSink>,
    pub clock: Arc<dyn Clock>,
    pub filter: ContentFilter,
    pub settings: SessionSettings,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure while applying an inbound envelope. Logged, never surfaced to the peer.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("Internal error: {0}")]
    Internal(String),
}

// ============================================================================
// SESSION
// ============================================================================

pub struct Session<M: MessageStore, S: ModerationStore> {
    identity: Identity,
    bus: Arc<dyn EventBus>,
    // Taken by `spawn_listener`; drained by `pump` until then.
    source: Mutex<Option<Box<dyn EnvelopeSource>>>,
    presence: PresenceTracker,
    typing: TypingCoordinator,
    ledger: Arc<NotificationLedger>,
    router: MessageRouter<M>,
    messages: Arc<M>,
    moderation: Arc<ModerationService<S>>,
    filter: ContentFilter,
    // Channel ID -> channel
    channels: DashMap<String, ChannelInfo>,
    clock: Arc<dyn Clock>,
    status: Mutex<PresenceStatus>,
    // Scope we last told peers we were typing in
    typing_in: Mutex<Option<ChatScope>>,
    settings: SessionSettings,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<M: MessageStore, S: ModerationStore> Session<M, S> {
    /// Build a session and subscribe it to the bus right away, so nothing published
    /// after construction is missed.
    pub fn new(identity: Identity, deps: SessionDeps<M, S>) -> Self {
        let ledger = Arc::new(NotificationLedger::new(deps.sink));
        let router = MessageRouter::new(
            deps.messages.clone(),
            deps.bus.clone(),
            ledger.clone(),
            deps.clock.clone(),
        );
        let source = deps.bus.subscribe();

        Self {
            identity,
            bus: deps.bus,
            source: Mutex::new(Some(source)),
            presence: PresenceTracker::new(),
            typing: TypingCoordinator::new(),
            ledger,
            router,
            messages: deps.messages,
            moderation: deps.moderation,
            filter: deps.filter,
            channels: DashMap::new(),
            clock: deps.clock,
            status: Mutex::new(PresenceStatus::Offline),
            typing_in: Mutex::new(None),
            settings: deps.settings,
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Announce ourselves and load channels plus public history.
    pub async fn start(&self) -> Result<(), ChatError> {
        self.set_status(PresenceStatus::Online);

        match self.messages.load_channels().await {
            Ok(channels) => {
                for channel in channels {
                    self.channels.insert(channel.id.clone(), channel);
                }
            }
            Err(e) => tracing::warn!(user_id = %self.identity.user_id, "Failed to load channels: {}", e),
        }

        self.select_chat(ChatScope::Public).await?;
        tracing::info!(
            user_id = %self.identity.user_id,
            origin = %self.bus.origin(),
            "Session started"
        );
        Ok(())
    }

    /// Hidden tab -> away, visible again -> online.
    pub fn set_visibility(&self, visible: bool) {
        let next = if visible {
            PresenceStatus::Online
        } else {
            PresenceStatus::Away
        };
        self.set_status(next);
    }

    /// Go offline: peers drop us from presence and from every typing indicator.
    pub fn end(&self) {
        self.stop_typing();
        self.set_status(PresenceStatus::Offline);
        tracing::info!(user_id = %self.identity.user_id, "Session ended");
    }

    fn set_status(&self, next: PresenceStatus) {
        {
            let mut status = lock(&self.status);
            let current = *status;
            if current == next {
                return;
            }
            if !current.can_transition_to(next) {
                tracing::debug!(from = %current, to = %next, "Ignoring presence transition");
                return;
            }
            *status = next;
        }

        let now = self.clock.now();
        let entry = PresenceEntry::for_identity(&self.identity, next, now);
        if next == PresenceStatus::Offline {
            self.presence.remove(&self.identity.user_id);
        } else {
            self.presence.add_or_update(entry.clone());
        }
        self.bus.publish(EnvelopeBody::Presence(entry), now);
    }

    // ========================================================================
    // SENDING
    // ========================================================================

    /// Send a message as this session's user.
    ///
    /// Banned users and restricted words are rejected before anything is published.
    /// Every rejection is also shown as a toast.
    pub async fn send_message(
        &self,
        scope: ChatScope,
        body: &str,
        kind: MessageKind,
    ) -> Result<SendReceipt, ChatError> {
        let result = self.try_send(scope, body, kind).await;
        if let Err(e) = &result {
            let severity = match e {
                ChatError::Banned(_) | ChatError::Restricted(_) => NotificationSeverity::Warning,
                _ => NotificationSeverity::Error,
            };
            self.ledger.toast(&e.to_string(), severity);
        }
        result
    }

    async fn try_send(
        &self,
        scope: ChatScope,
        body: &str,
        kind: MessageKind,
    ) -> Result<SendReceipt, ChatError> {
        let user_id = &self.identity.user_id;
        let scope = scope.normalized();
        if !scope.involves(user_id) {
            return Err(ChatError::Validation(
                "You are not part of this conversation".to_string(),
            ));
        }

        let now = self.clock.now();
        match self.moderation.is_banned(user_id, now).await {
            Ok(true) => return Err(ChatError::Banned(user_id.clone())),
            Ok(false) => {}
            Err(e) => tracing::warn!(user_id = %user_id, "Ban check failed, allowing send: {}", e),
        }

        if let Some(word) = self.filter.find(body) {
            let word = word.to_string();
            self.flag_restricted(&word, body).await;
            return Err(ChatError::Restricted(word));
        }

        let receipt = self
            .router
            .send(scope, user_id, &self.identity.display_name, body, kind)
            .await?;
        self.stop_typing();
        Ok(receipt)
    }

    async fn flag_restricted(&self, word: &str, body: &str) {
        let user_id = &self.identity.user_id;
        let detail = format!("Used restricted word \"{word}\": {}", body.trim());

        match self
            .moderation
            .record_violation(user_id, RESTRICTED_WORD_CATEGORY, &detail, ViolationSeverity::Medium)
            .await
        {
            Ok(outcome) => {
                if let Some(ban) = outcome.auto_ban {
                    let hours = ban.duration_hours.unwrap_or_default();
                    self.bus.publish(
                        EnvelopeBody::Notification(NotificationPayload {
                            text: format!(
                                "User {} has been automatically banned for {} hours!",
                                ban.user_id, hours
                            ),
                            severity: NotificationSeverity::Warning,
                        }),
                        self.clock.now(),
                    );
                }
            }
            Err(e) => tracing::error!(
                user_id = %user_id,
                retryable = e.is_retryable(),
                "Failed to record violation: {}",
                e
            ),
        }
    }

    // ========================================================================
    // TYPING
    // ========================================================================

    /// The composer changed. Non-blank text means typing in the active scope.
    pub fn input_changed(&self, text: &str) {
        if text.trim().is_empty() {
            self.stop_typing();
            return;
        }

        let scope = self.ledger.active_scope();
        {
            let mut typing_in = lock(&self.typing_in);
            if let Some(previous) = typing_in.as_ref() {
                if *previous != scope {
                    self.publish_typing(previous.clone(), false);
                }
            }
            *typing_in = Some(scope.clone());
        }
        self.publish_typing(scope, true);
    }

    fn stop_typing(&self) {
        let previous = lock(&self.typing_in).take();
        if let Some(scope) = previous {
            self.publish_typing(scope, false);
        }
    }

    fn publish_typing(&self, scope: ChatScope, is_typing: bool) {
        self.bus.publish(
            EnvelopeBody::Typing(TypingSignal {
                scope,
                user_id: self.identity.user_id.clone(),
                display_name: self.identity.display_name.clone(),
                is_typing,
            }),
            self.clock.now(),
        );
    }

    // ========================================================================
    // CHATS & CHANNELS
    // ========================================================================

    /// Switch the active chat: clears its unread count and loads its history.
    pub async fn select_chat(&self, scope: ChatScope) -> Result<Vec<Message>, ChatError> {
        let scope = scope.normalized();
        scope
            .validate()
            .map_err(|e| ChatError::Validation(e.to_string()))?;

        if self.ledger.active_scope() != scope {
            self.stop_typing();
        }
        self.ledger.mark_active(&scope);

        self.router.history(&scope).await.map_err(|e| {
            self.ledger.toast(&e.to_string(), NotificationSeverity::Error);
            e
        })
    }

    /// Create a group channel and tell every peer about it.
    pub async fn create_channel(&self, name: &str) -> Result<ChannelInfo, ChatError> {
        let name = name.trim();
        let id = channel_slug(name);
        if id.is_empty() {
            let e = ChatError::Validation("Channel name is required".to_string());
            self.ledger.toast(&e.to_string(), NotificationSeverity::Error);
            return Err(e);
        }
        if self.channels.contains_key(&id) {
            let e = ChatError::Validation(format!("Channel \"{name}\" already exists"));
            self.ledger.toast(&e.to_string(), NotificationSeverity::Error);
            return Err(e);
        }

        let now = self.clock.now();
        let channel = ChannelInfo {
            id: id.clone(),
            name: name.to_string(),
            created_by: self.identity.user_id.clone(),
            created_at: now,
        };
        self.channels.insert(id, channel.clone());
        self.bus
            .publish(EnvelopeBody::ChannelUpdate(channel.clone()), now);

        if let Err(e) = self.messages.save_channel(&channel).await {
            tracing::warn!(channel_id = %channel.id, "Failed to persist channel: {}", e);
            self.ledger.toast(
                "Channel created but could not be saved.",
                NotificationSeverity::Error,
            );
        }

        self.ledger.notify(
            format!("Channel \"{}\" created", channel.name),
            NotificationSeverity::Success,
            Some(channel.scope()),
            now,
        );
        Ok(channel)
    }

    /// Known channels, sorted by name.
    pub fn channels(&self) -> Vec<ChannelInfo> {
        let mut channels: Vec<ChannelInfo> =
            self.channels.iter().map(|c| c.value().clone()).collect();
        channels.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        channels
    }

    /// Broadcast a system notice to every context, this one included.
    pub fn broadcast_system(&self, text: &str, scope: Option<ChatScope>) {
        let now = self.clock.now();
        self.bus.publish(
            EnvelopeBody::System(SystemNotice {
                scope: scope.clone(),
                text: text.to_string(),
            }),
            now,
        );
        self.ledger
            .notify(text, NotificationSeverity::System, scope, now);
    }

    // ========================================================================
    // TIMERS
    // ========================================================================

    /// Tell peers we are still here.
    pub fn heartbeat(&self) {
        let status = self.status();
        if status == PresenceStatus::Offline {
            return;
        }
        let now = self.clock.now();
        self.presence.touch(&self.identity.user_id, status, now);
        self.bus.publish(
            EnvelopeBody::Heartbeat(Heartbeat {
                user_id: self.identity.user_id.clone(),
                status,
            }),
            now,
        );
    }

    /// Drop peers that stopped heartbeating.
    pub fn prune_presence(&self) -> Vec<PresenceEntry> {
        let now = self.clock.now();
        let pruned = self.presence.prune_stale(
            now,
            self.settings.presence_stale_after,
            &self.identity.user_id,
        );
        for entry in &pruned {
            tracing::debug!(user_id = %entry.user_id, "Pruned stale peer");
            self.typing.clear_user(&entry.user_id);
            self.ledger.notify(
                format!("{} left the chat", entry.display_name),
                NotificationSeverity::Info,
                None,
                now,
            );
        }
        pruned
    }

    /// Remove expired typing entries. Returns how many were removed.
    pub fn sweep_typing(&self) -> usize {
        self.typing.sweep(self.clock.now()).len()
    }

    /// Apply everything already waiting on the bus. Returns how many envelopes were handled.
    ///
    /// Does nothing once `spawn_listener` has taken the subscription.
    #[cfg(test)]
    pub fn pump(&self) -> usize {
        let mut source = lock(&self.source);
        let Some(source) = source.as_mut() else {
            return 0;
        };

        let mut handled = 0;
        while let Some(envelope) = source.try_next() {
            self.handle(envelope);
            handled += 1;
        }
        handled
    }

    // ========================================================================
    // QUERIES
    // ========================================================================

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn status(&self) -> PresenceStatus {
        *lock(&self.status)
    }

    pub fn presence_snapshot(&self) -> Vec<PresenceEntry> {
        self.presence.snapshot()
    }

    pub fn online_count(&self) -> usize {
        self.presence.online_count()
    }

    /// e.g. "Alice is typing…", or None when nobody else is.
    pub fn typing_indicator(&self, scope: &ChatScope) -> Option<String> {
        self.typing.indicator(scope, self.clock.now())
    }

    pub fn unread(&self, scope: &ChatScope) -> u32 {
        self.ledger.count(scope)
    }

    pub fn total_unread(&self) -> u32 {
        self.ledger.total_unread()
    }

    pub fn active_chat(&self) -> ChatScope {
        self.ledger.active_scope()
    }

    pub fn messages(&self, scope: &ChatScope) -> Vec<Message> {
        self.router.messages(scope)
    }

    pub fn recent_notifications(&self) -> Vec<Notification> {
        self.ledger.recent()
    }

    // ========================================================================
    // INBOUND
    // ========================================================================

    fn dispatch(&self, envelope: Envelope) -> Result<(), SessionError> {
        let own_id = self.identity.user_id.as_str();
        let now = self.clock.now();

        match envelope.body {
            EnvelopeBody::Message(message) => {
                let sender_id = message.sender_id.clone();
                let outcome = self.router.on_inbound(message)?;
                self.typing.clear_typing(&outcome.scope, &sender_id);
            }
            EnvelopeBody::Presence(entry) => {
                if entry.user_id == own_id {
                    return Ok(());
                }
                let name = entry.display_name.clone();
                let user_id = entry.user_id.clone();
                match self.presence.apply(entry) {
                    PresenceChange::Joined => {
                        self.ledger.notify(
                            format!("{name} joined the chat"),
                            NotificationSeverity::Info,
                            None,
                            now,
                        );
                        // Newcomers learn who is already here from the answer.
                        self.bus
                            .publish(EnvelopeBody::UserList(self.presence.snapshot()), now);
                    }
                    PresenceChange::Left => {
                        self.typing.clear_user(&user_id);
                        self.ledger.notify(
                            format!("{name} left the chat"),
                            NotificationSeverity::Info,
                            None,
                            now,
                        );
                    }
                    PresenceChange::Updated
                    | PresenceChange::Unchanged
                    | PresenceChange::Ignored => {}
                }
            }
            EnvelopeBody::Typing(signal) => {
                if signal.user_id == own_id {
                    return Ok(());
                }
                let scope = signal.scope.normalized();
                if signal.is_typing {
                    self.typing
                        .set_typing(&scope, &signal.user_id, &signal.display_name, now);
                } else {
                    self.typing.clear_typing(&scope, &signal.user_id);
                }
            }
            EnvelopeBody::Notification(payload) => {
                self.ledger
                    .notify(payload.text, payload.severity, None, now);
            }
            EnvelopeBody::UserList(entries) => {
                for entry in entries {
                    if entry.user_id != own_id && entry.status != PresenceStatus::Offline {
                        self.presence.add_or_update(entry);
                    }
                }
            }
            EnvelopeBody::ChannelUpdate(channel) => {
                if channel.id.trim().is_empty() {
                    return Err(ChatError::Validation("Channel id is required".to_string()).into());
                }
                self.channels.insert(channel.id.clone(), channel);
            }
            EnvelopeBody::System(notice) => {
                self.ledger
                    .notify(notice.text, NotificationSeverity::System, notice.scope, now);
            }
            EnvelopeBody::Heartbeat(beat) => {
                if beat.user_id != own_id {
                    self.presence.touch(&beat.user_id, beat.status, now);
                }
            }
        }
        Ok(())
    }
}

impl<M: MessageStore, S: ModerationStore> EnvelopeHandler for Session<M, S> {
    /// Never panics and never propagates: a bad envelope is logged and dropped.
    fn handle(&self, envelope: Envelope) {
        let kind = envelope.kind();
        let origin = envelope.origin.clone();

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(envelope)))
            .unwrap_or_else(|payload| {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                Err(SessionError::Internal(reason))
            });

        if let Err(e) = result {
            tracing::warn!(kind, origin = %origin, "Dropped envelope: {}", e);
        }
    }
}

impl<M, S> Session<M, S>
where
    M: MessageStore + 'static,
    S: ModerationStore + 'static,
{
    /// Move envelope handling onto a background task.
    ///
    /// Returns None if the listener is already running.
    pub fn spawn_listener(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let source = lock(&self.source).take()?;
        Some(spawn_dispatch(source, self.clone()))
    }

    /// Start the heartbeat and typing-sweep timers.
    ///
    /// Call after `start`. The tasks stop once the session goes offline or is dropped.
    pub fn spawn_timers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let heartbeat = spawn_ticker(
            Arc::downgrade(self),
            self.settings.heartbeat_interval,
            |session| {
                session.heartbeat();
                session.prune_presence();
            },
        );
        let sweep = spawn_ticker(
            Arc::downgrade(self),
            self.settings.typing_sweep_interval,
            |session| {
                session.sweep_typing();
            },
        );
        vec![heartbeat, sweep]
    }
}

fn spawn_ticker<M, S, F>(
    session: std::sync::Weak<Session<M, S>>,
    period: Duration,
    tick: F,
) -> JoinHandle<()>
where
    M: MessageStore + 'static,
    S: ModerationStore + 'static,
    F: Fn(&Session<M, S>) + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            if session.status() == PresenceStatus::Offline {
                break;
            }
            tick(&session);
        }
    })
}

/// "Study Hall!" -> "study-hall"
fn channel_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat::Role;
    use crate::core::clock::ManualClock;
    use crate::core::events::ContextId;
    use crate::core::moderation::AutoBanPolicy;
    use crate::core::notifications::RecordingSink;
    use crate::infra::chat::InMemoryMessageStore;
    use crate::infra::events::BroadcastHub;
    use crate::infra::moderation::InMemoryModerationStore;
    use chrono::Utc;

    type TestSession = Session<InMemoryMessageStore, InMemoryModerationStore>;

    struct World {
        hub: BroadcastHub,
        messages: Arc<InMemoryMessageStore>,
        moderation: Arc<ModerationService<InMemoryModerationStore>>,
        clock: Arc<ManualClock>,
    }

    impl World {
        fn new() -> Self {
            let clock = Arc::new(ManualClock::new(Utc::now()));
            let moderation = Arc::new(ModerationService::new(
                Arc::new(InMemoryModerationStore::new()),
                clock.clone(),
                Arc::new(RecordingSink::default()),
            ));
            Self {
                hub: BroadcastHub::new(64),
                messages: Arc::new(InMemoryMessageStore::new()),
                moderation,
                clock,
            }
        }

        fn join(&self, user_id: &str, name: &str) -> (Arc<TestSession>, Arc<RecordingSink>) {
            let sink = Arc::new(RecordingSink::default());
            let deps = SessionDeps {
                bus: Arc::new(self.hub.handle()),
                messages: self.messages.clone(),
                moderation: self.moderation.clone(),
                sink: sink.clone(),
                clock: self.clock.clone(),
                filter: ContentFilter::new(["spam", "abuse"]),
                settings: SessionSettings::default(),
            };
            let session = Session::new(Identity::new(user_id, name, Role::Student), deps);
            (Arc::new(session), sink)
        }
    }

    fn toasts_containing(sink: &RecordingSink, needle: &str) -> usize {
        sink.toasts()
            .iter()
            .filter(|(text, _)| text.contains(needle))
            .count()
    }

    #[tokio::test]
    async fn test_message_reaches_the_other_context_exactly_once() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();

        let receipt = alice
            .send_message(ChatScope::Public, "hello", MessageKind::Text)
            .await
            .unwrap();
        bob.pump();
        alice.pump();

        assert!(receipt.persisted);
        let seen = bob.messages(&ChatScope::Public);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].body, "hello");
        assert_eq!(seen[0].sender_id, "alice");
        assert_eq!(alice.messages(&ChatScope::Public).len(), 1);
        let stored = world.messages.load_messages(&ChatScope::Public).await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_and_not_published() {
        let world = World::new();
        let (alice, alice_sink) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.pump();

        let result = alice
            .send_message(ChatScope::Public, "   ", MessageKind::Text)
            .await;

        assert!(matches!(result, Err(ChatError::Validation(_))));
        assert_eq!(bob.pump(), 0);
        assert!(alice.messages(&ChatScope::Public).is_empty());
        assert_eq!(toasts_containing(&alice_sink, "empty"), 1);
    }

    #[tokio::test]
    async fn test_cannot_send_to_a_private_chat_you_are_not_in() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        alice.start().await.unwrap();

        let result = alice
            .send_message(ChatScope::private("bob", "carol"), "psst", MessageKind::Text)
            .await;

        assert!(matches!(result, Err(ChatError::Validation(_))));
    }

    #[tokio::test]
    async fn test_presence_join_and_leave_propagate() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, bob_sink) = world.join("bob", "Bob");
        bob.start().await.unwrap();
        alice.start().await.unwrap();

        // Bob sees Alice join and answers with his user list.
        bob.pump();
        alice.pump();

        assert_eq!(alice.presence_snapshot().len(), 2);
        assert_eq!(bob.presence_snapshot().len(), 2);
        assert_eq!(bob.online_count(), 2);
        assert_eq!(toasts_containing(&bob_sink, "Alice joined the chat"), 1);

        alice.set_visibility(false);
        bob.pump();
        let seen = bob.presence_snapshot();
        let alice_entry = seen.iter().find(|e| e.user_id == "alice").unwrap();
        assert_eq!(alice_entry.status, PresenceStatus::Away);
        assert_eq!(bob.online_count(), 1);

        alice.end();
        bob.pump();

        assert_eq!(bob.presence_snapshot().len(), 1);
        assert_eq!(toasts_containing(&bob_sink, "Alice left the chat"), 1);
        assert_eq!(alice.status(), PresenceStatus::Offline);
    }

    #[tokio::test]
    async fn test_typing_indicator_expires_without_a_stop_signal() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();

        alice.input_changed("hel");
        bob.pump();
        assert_eq!(
            bob.typing_indicator(&ChatScope::Public).as_deref(),
            Some("Alice is typing…")
        );
        assert_eq!(alice.typing_indicator(&ChatScope::Public), None);

        world.clock.advance(chrono::Duration::seconds(4));

        assert_eq!(bob.typing_indicator(&ChatScope::Public), None);
        assert_eq!(bob.sweep_typing(), 1);
    }

    #[tokio::test]
    async fn test_sending_clears_the_typing_indicator() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();

        alice.input_changed("hi");
        bob.pump();
        assert!(bob.typing_indicator(&ChatScope::Public).is_some());

        alice
            .send_message(ChatScope::Public, "hi", MessageKind::Text)
            .await
            .unwrap();
        bob.pump();

        assert_eq!(bob.typing_indicator(&ChatScope::Public), None);
    }

    #[tokio::test]
    async fn test_private_message_counts_unread_until_selected() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, bob_sink) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();
        let private = ChatScope::private("alice", "bob");

        alice
            .send_message(private.clone(), "psst", MessageKind::Text)
            .await
            .unwrap();
        alice
            .send_message(private.clone(), "you there?", MessageKind::Text)
            .await
            .unwrap();
        bob.pump();

        assert_eq!(bob.unread(&private), 2);
        assert_eq!(bob.total_unread(), 2);
        assert_eq!(toasts_containing(&bob_sink, "Alice: psst"), 1);
        assert_eq!(bob_sink.cue_count(), 2);

        let history = bob.select_chat(ChatScope::private("bob", "alice")).await.unwrap();

        assert_eq!(history.len(), 2);
        assert_eq!(bob.unread(&private), 0);
        assert_eq!(bob.active_chat(), private);
    }

    #[tokio::test]
    async fn test_restricted_word_blocks_the_send_and_records_a_violation() {
        let world = World::new();
        let (alice, alice_sink) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();
        bob.pump();

        let result = alice
            .send_message(ChatScope::Public, "this is SPAM", MessageKind::Text)
            .await;

        assert!(matches!(result, Err(ChatError::Restricted(ref w)) if w == "spam"));
        assert!(bob.messages(&ChatScope::Public).is_empty());
        let violations = world.moderation.violations(Some("alice")).await.unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].category, RESTRICTED_WORD_CATEGORY);
        assert_eq!(toasts_containing(&alice_sink, "restricted word"), 1);
    }

    #[tokio::test]
    async fn test_repeated_violations_trigger_an_auto_ban() {
        let world = World::new();
        world
            .moderation
            .set_policy(
                AutoBanPolicy {
                    enabled: true,
                    ..AutoBanPolicy::default()
                },
                "admin",
            )
            .await
            .unwrap();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, bob_sink) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();

        for _ in 0..3 {
            let _ = alice
                .send_message(ChatScope::Public, "spam spam", MessageKind::Text)
                .await;
        }
        bob.pump();

        assert!(world.moderation.is_banned("alice", world.clock.now()).await.unwrap());
        assert_eq!(toasts_containing(&bob_sink, "automatically banned for 24 hours"), 1);

        let result = alice
            .send_message(ChatScope::Public, "hello again", MessageKind::Text)
            .await;
        assert!(matches!(result, Err(ChatError::Banned(_))));
    }

    #[tokio::test]
    async fn test_banned_user_cannot_send() {
        let world = World::new();
        world
            .moderation
            .issue_ban("alice", "rude", crate::core::moderation::BanDuration::Hours(1), "mod")
            .await
            .unwrap();
        let (alice, _) = world.join("alice", "Alice");
        alice.start().await.unwrap();

        let result = alice
            .send_message(ChatScope::Public, "hi", MessageKind::Text)
            .await;
        assert!(matches!(result, Err(ChatError::Banned(_))));

        world.clock.advance(chrono::Duration::hours(2));
        assert!(alice
            .send_message(ChatScope::Public, "hi", MessageKind::Text)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_created_channel_propagates_and_duplicates_are_rejected() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();

        let channel = alice.create_channel("Study Hall").await.unwrap();
        bob.pump();

        assert_eq!(channel.id, "study-hall");
        assert_eq!(bob.channels(), vec![channel.clone()]);
        assert_eq!(world.messages.load_channels().await.unwrap(), vec![channel]);
        assert!(matches!(
            alice.create_channel("study hall").await,
            Err(ChatError::Validation(_))
        ));
        assert!(matches!(
            alice.create_channel("  !! ").await,
            Err(ChatError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_envelope_is_dropped_without_panicking() {
        let world = World::new();
        let (bob, _) = world.join("bob", "Bob");
        bob.start().await.unwrap();

        let broken = Message {
            id: 1,
            scope: ChatScope::group(""),
            sender_id: "mallory".to_string(),
            sender_name: "Mallory".to_string(),
            body: "hi".to_string(),
            kind: MessageKind::Text,
            sent_at: world.clock.now(),
        };
        bob.handle(Envelope::new(
            ContextId::from("ctx-elsewhere"),
            world.clock.now(),
            EnvelopeBody::Message(broken),
        ));

        assert!(bob.messages(&ChatScope::group("")).is_empty());
        assert_eq!(bob.total_unread(), 0);
    }

    #[tokio::test]
    async fn test_silent_peers_are_pruned_but_heartbeats_keep_them() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, bob_sink) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();
        bob.pump();

        world.clock.advance(chrono::Duration::seconds(60));
        alice.heartbeat();
        bob.pump();
        world.clock.advance(chrono::Duration::seconds(60));

        assert!(bob.prune_presence().is_empty());

        world.clock.advance(chrono::Duration::seconds(60));
        let pruned = bob.prune_presence();

        assert_eq!(pruned.len(), 1);
        assert_eq!(pruned[0].user_id, "alice");
        assert_eq!(bob.presence_snapshot().len(), 1);
        assert_eq!(toasts_containing(&bob_sink, "Alice left the chat"), 1);
    }

    #[tokio::test]
    async fn test_system_notice_reaches_every_context() {
        let world = World::new();
        let (alice, alice_sink) = world.join("alice", "Alice");
        let (bob, bob_sink) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();

        alice.broadcast_system("Maintenance at noon", None);
        bob.pump();

        assert_eq!(toasts_containing(&alice_sink, "Maintenance at noon"), 1);
        assert_eq!(toasts_containing(&bob_sink, "Maintenance at noon"), 1);
    }

    #[tokio::test]
    async fn test_listener_task_applies_envelopes_in_the_background() {
        let world = World::new();
        let (alice, _) = world.join("alice", "Alice");
        let (bob, _) = world.join("bob", "Bob");
        alice.start().await.unwrap();
        bob.start().await.unwrap();
        let listener = bob.spawn_listener().unwrap();
        assert!(bob.spawn_listener().is_none());

        alice
            .send_message(ChatScope::Public, "hello", MessageKind::Text)
            .await
            .unwrap();

        tokio::time::timeout(Duration::from_secs(2), async {
            while bob.messages(&ChatScope::Public).is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(bob.pump(), 0);
        listener.abort();
    }

    #[test]
    fn test_channel_slug() {
        assert_eq!(channel_slug("Study Hall!"), "study-hall");
        assert_eq!(channel_slug("  math -- 101 "), "math-101");
        assert_eq!(channel_slug("!!"), "");
    }
}
