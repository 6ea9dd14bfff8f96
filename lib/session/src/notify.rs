//! User-facing notifications (toasts).

use serde::{Deserialize, Serialize};

/// Visual treatment of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationVariant {
    /// Informational or success message.
    #[default]
    Default,
    /// Failure message.
    Destructive,
}

/// A notification shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Short headline.
    pub title: String,
    /// Longer explanation.
    pub description: String,
    /// How the notification is styled.
    pub variant: NotificationVariant,
}

impl Notification {
    /// A success/informational notification.
    #[must_use]
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Default,
        }
    }

    /// A failure notification.
    #[must_use]
    pub fn failure(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            variant: NotificationVariant::Destructive,
        }
    }

    /// Returns true for failure notifications.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.variant == NotificationVariant::Destructive
    }
}

/// Fire-and-forget notification sink.
pub trait Notifier: Send + Sync {
    /// Displays a notification.
    fn notify(&self, notification: Notification);
}
