// Entry point of the realtime community core.
//
// **Architecture Overview:**
// - `core/` = Business logic (no I/O, no transport)
// - `infra/` = Implementations of core traits (SQLite, in-memory, broadcast bus)
// - `session/` = Per-context adapter that wires user actions and envelopes to the core
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Open a couple of sessions on a shared bus and run them

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "session/session_layer.rs"]
mod session;

use crate::config::{AppConfig, StorageBackend};
use crate::core::chat::{ChatScope, Identity, MessageKind, MessageStore, Role};
use crate::core::clock::{Clock, SystemClock};
use crate::core::moderation::{BanDuration, ContentFilter, ModerationService, ModerationStore};
use crate::infra::chat::{InMemoryMessageStore, SqliteMessageStore};
use crate::infra::events::BroadcastHub;
use crate::infra::moderation::{InMemoryModerationStore, SqliteModerationStore};
use crate::session::{Session, SessionDeps, TracingSink};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AppConfig::from_env();
    tracing::info!(storage = ?config.storage, data_dir = %config.data_dir.display(), "Starting");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    match config.storage {
        StorageBackend::Sqlite => {
            let pool = infra::sqlite::open_file(&config.database_path()).await?;

            let messages = SqliteMessageStore::new(pool.clone());
            messages.migrate().await?;
            let moderation = SqliteModerationStore::new(pool);
            moderation.migrate().await?;

            run(config, Arc::new(messages), Arc::new(moderation)).await
        }
        StorageBackend::Memory => {
            run(
                config,
                Arc::new(InMemoryMessageStore::new()),
                Arc::new(InMemoryModerationStore::new()),
            )
            .await
        }
    }
}

async fn run<M, S>(config: AppConfig, messages: Arc<M>, moderation_store: Arc<S>) -> anyhow::Result<()>
where
    M: MessageStore + 'static,
    S: ModerationStore + 'static,
{
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let moderation = Arc::new(ModerationService::new(
        moderation_store,
        clock.clone(),
        Arc::new(TracingSink::new("moderation")),
    ));
    if moderation.seed_policy(&config.auto_ban).await? {
        tracing::info!(policy = ?config.auto_ban, "Seeded auto-ban policy");
    }

    let filter = ContentFilter::new(&config.restricted_words);
    tracing::info!(words = filter.words().len(), "Content filter loaded");

    let hub = BroadcastHub::new(config.bus_capacity);
    let open = |identity: Identity| {
        let label = identity.user_id.clone();
        Arc::new(Session::new(
            identity,
            SessionDeps {
                bus: Arc::new(hub.handle()),
                messages: messages.clone(),
                moderation: moderation.clone(),
                sink: Arc::new(TracingSink::new(label)),
                clock: clock.clone(),
                filter: filter.clone(),
                settings: config.session.clone(),
            },
        ))
    };

    let teacher = open(Identity::new("teacher@example.com", "Ms. Rivera", Role::Teacher));
    let student = open(Identity::new("student@example.com", "Sam", Role::Student));

    let mut tasks = Vec::new();
    for session in [&teacher, &student] {
        tasks.extend(session.spawn_listener());
        session.start().await?;
        tasks.extend(session.spawn_timers());
    }

    // ========================================================================
    // SCRIPTED ACTIVITY
    // ========================================================================

    teacher.broadcast_system("Office hours start now", None);
    // Already there on a second run against the same database.
    if let Err(e) = teacher.create_channel("Study Hall").await {
        tracing::info!("Channel not created: {}", e);
    }

    student.input_changed("Hello every");
    tokio::time::sleep(Duration::from_millis(50)).await;
    if let Some(indicator) = teacher.typing_indicator(&ChatScope::Public) {
        tracing::info!("Teacher sees: {}", indicator);
    }
    // Rejections (a ban left over from an earlier run, say) are already toasted.
    let _ = student
        .send_message(ChatScope::Public, "Hello everyone!", MessageKind::Text)
        .await;

    let private = ChatScope::private(&teacher.identity().user_id, &student.identity().user_id);
    teacher
        .send_message(private.clone(), "Welcome, Sam.", MessageKind::Text)
        .await?;

    if let Err(e) = student
        .send_message(ChatScope::Public, "buy cheap spam here", MessageKind::Text)
        .await
    {
        tracing::info!("Send rejected: {}", e);
    }

    // Switching tabs away and back.
    student.set_visibility(false);
    tokio::time::sleep(Duration::from_millis(50)).await;
    for entry in teacher.presence_snapshot() {
        tracing::info!(user_id = %entry.user_id, status = %entry.status, "Teacher sees while hidden");
    }
    student.set_visibility(true);

    // Let the listeners drain the bus.
    tokio::time::sleep(Duration::from_millis(200)).await;

    tracing::info!(
        online = student.online_count(),
        unread = student.unread(&private),
        total_unread = student.total_unread(),
        active_chat = ?student.active_chat(),
        public_messages = student.messages(&ChatScope::Public).len(),
        channels = student.channels().len(),
        notifications = student.recent_notifications().len(),
        "Student view"
    );
    for entry in teacher.presence_snapshot() {
        tracing::info!(user_id = %entry.user_id, status = %entry.status, "Teacher sees");
    }

    // ========================================================================
    // MODERATION REPORT
    // ========================================================================

    let now = clock.now();
    for summary in moderation.tracking_summary(now).await? {
        tracing::info!(
            user_id = %summary.user_id,
            total = summary.total,
            recent = summary.recent,
            next_level = %summary.next_level,
            "Violation tracking"
        );
    }
    for offender in moderation.violation_summary(5).await? {
        tracing::info!(
            user_id = %offender.user_id,
            violations = offender.violations,
            last_category = %offender.last_category,
            "Offender"
        );
    }
    for ban in moderation.active_bans(now).await? {
        tracing::info!(user_id = %ban.user_id, reason = %ban.reason, remaining = %ban.remaining(now), "Active ban");
    }
    let student_id = student.identity().user_id.as_str();
    let tracking = moderation.tracking(student_id).await?;
    tracing::info!(
        violations = moderation.violations(Some(student_id)).await?.len(),
        recent_tracked = tracking.count,
        next_level = %moderation.next_ban_level(tracking.count).await?,
        "Student record"
    );
    let stats = moderation.auto_ban_stats(now).await?;
    tracing::info!(
        total = stats.total,
        active = stats.active,
        history = moderation.auto_ban_history().await?.len(),
        "Auto-ban stats"
    );

    // ========================================================================
    // MANUAL MODERATION
    // ========================================================================

    let moderator = teacher.identity().user_id.as_str();
    let flooder = "flooder@example.com";

    // Still banned from an earlier run against the same database: edit that ban instead.
    if let Err(e) = moderation
        .issue_ban(flooder, "Flooding the public chat", BanDuration::Hours(1), moderator)
        .await
    {
        tracing::info!("Manual ban not issued: {}", e);
    }
    let edited = moderation
        .update_ban(flooder, "Flooding after a warning", BanDuration::Hours(24), moderator)
        .await?;
    tracing::info!(ban_id = edited.id, remaining = %edited.remaining(clock.now()), "Ban edited");

    let denied = moderation
        .submit_unban_request(flooder, "It won't happen again")
        .await?;
    moderation.deny_unban_request(denied.id, moderator).await?;
    let appeal = moderation
        .submit_unban_request(flooder, "I read the rules this time")
        .await?;
    tracing::info!(pending = moderation.unban_requests().await?.len(), "Unban requests");
    moderation.approve_unban_request(appeal.id, moderator).await?;

    moderation
        .issue_ban(flooder, "Back at it", BanDuration::Permanent, moderator)
        .await?;
    let lifted = moderation.lift_ban(flooder, moderator).await?;
    tracing::info!(
        lifted,
        history = moderation.ban_history(flooder).await?.len(),
        banned = moderation.is_banned(flooder, clock.now()).await?,
        "Manual moderation done"
    );

    // Pause the engine for a review, then put the stored settings back.
    let policy = moderation.policy().await?;
    moderation.set_enabled(false, moderator).await?;
    if let Err(e) = moderation.set_policy(policy, moderator).await {
        tracing::warn!("Auto-ban settings not restored: {}", e);
    }
    tracing::info!(log_entries = moderation.system_logs().await?.len(), "System log");

    student.end();
    teacher.end();
    tokio::time::sleep(Duration::from_millis(100)).await;
    for task in tasks {
        task.abort();
    }

    tracing::info!("Shut down");
    Ok(())
}
