// Notification sink that writes to the log instead of a screen.

use crate::core::chat::Message;
use crate::core::notifications::{NotificationSeverity, NotificationSink};

/// Sends toasts and message cues to `tracing`, tagged with a context label.
pub struct TracingSink {
    label: String,
}

impl TracingSink {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl NotificationSink for TracingSink {
    fn toast(&self, text: &str, severity: NotificationSeverity) {
        match severity {
            NotificationSeverity::Error => {
                tracing::error!(context = %self.label, ?severity, "{}", text)
            }
            NotificationSeverity::Warning => {
                tracing::warn!(context = %self.label, ?severity, "{}", text)
            }
            _ => tracing::info!(context = %self.label, ?severity, "{}", text),
        }
    }

    fn message_cue(&self, message: &Message) {
        tracing::debug!(
            context = %self.label,
            scope = %message.scope,
            from = %message.sender_name,
            "New message"
        );
    }
}
