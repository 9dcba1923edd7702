use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use dashdrop_types::events::PushPayload;
use dashdrop_types::models::{Notification, NotificationKind, ParseError, RequestStatus};

use crate::error::Result;
use crate::store::RequestStore;

pub const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";
pub const NOTIFICATION_BADGE: &str = "/icons/icon-72x72.png";
pub const VIBRATE_PATTERN: [u32; 3] = [200, 100, 200];
pub const DEFAULT_ALERT_VOLUME: f32 = 0.3;
pub const TOAST_DURATION: Duration = Duration::from_secs(5);

/// A request-related event to notify about.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEvent {
    /// Target user, or the broadcast sentinel.
    pub user_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub request_id: String,
    pub status: Option<RequestStatus>,
    pub urgent: bool,
}

/// Answer of the native notification permission prompt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Permission {
    /// Never asked.
    #[default]
    Default,
    Granted,
    Denied,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Default => "default",
            Self::Granted => "granted",
            Self::Denied => "denied",
        })
    }
}

impl FromStr for Permission {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Self::Default),
            "granted" => Ok(Self::Granted),
            "denied" => Ok(Self::Denied),
            other => Err(ParseError {
                kind: "notification permission",
                value: other.to_string(),
            }),
        }
    }
}

/// What the OS-level notification shows.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeNotification {
    pub title: String,
    pub body: String,
    pub icon: &'static str,
    pub badge: &'static str,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    /// Stay on screen until dismissed instead of auto-hiding.
    pub require_interaction: bool,
    pub vibrate: [u32; 3],
    pub url: String,
}

impl NativeNotification {
    pub fn from_push(payload: &PushPayload) -> Self {
        Self {
            title: payload.title.clone(),
            body: payload.body.clone(),
            icon: NOTIFICATION_ICON,
            badge: NOTIFICATION_BADGE,
            tag: payload.tag.clone(),
            require_interaction: payload.urgent,
            vibrate: VIBRATE_PATTERN,
            url: payload.url.clone(),
        }
    }
}

/// In-page toast raised when a notification arrives over realtime.
#[derive(Debug, Clone, PartialEq)]
pub struct Toast {
    pub title: String,
    pub message: String,
    pub icon: &'static str,
    pub dismiss_after: Duration,
}

impl Toast {
    pub fn from_notification(n: &Notification) -> Self {
        Self {
            title: n.kind.as_str().replacen('_', " ", 1).to_uppercase(),
            message: n.message.clone(),
            icon: if n.urgent { "alert-circle" } else { "bell" },
            dismiss_after: TOAST_DURATION,
        }
    }
}

/// Platform notification centre.
pub trait NotificationSurface: Send + Sync {
    /// Prompt the user. Called at most once per dispatcher.
    fn request_permission(&self) -> Permission;
    fn show(&self, notification: &NativeNotification) -> anyhow::Result<()>;
}

pub trait AlertPlayer: Send + Sync {
    fn play_alert(&self, volume: f32) -> anyhow::Result<()>;
}

pub trait ToastSurface: Send + Sync {
    fn show_toast(&self, toast: &Toast) -> anyhow::Result<()>;
}

/// Fans a [`NotificationEvent`] out to persistence, the native notification
/// centre and the alert sound. Each side effect is isolated from the others.
pub struct NotificationDispatcher {
    surface: Arc<dyn NotificationSurface>,
    alert: Arc<dyn AlertPlayer>,
    permission: Mutex<Permission>,
    alert_volume: f32,
}

impl NotificationDispatcher {
    pub fn new(surface: Arc<dyn NotificationSurface>, alert: Arc<dyn AlertPlayer>) -> Self {
        Self {
            surface,
            alert,
            permission: Mutex::new(Permission::Default),
            alert_volume: DEFAULT_ALERT_VOLUME,
        }
    }

    pub fn with_alert_volume(mut self, volume: f32) -> Self {
        self.alert_volume = volume.clamp(0.0, 1.0);
        self
    }

    /// Ask for native notification permission. The surface is only prompted
    /// while the answer is still `Default`; later calls return the cached answer.
    pub fn request_permission(&self) -> bool {
        let mut permission = match self.permission.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if *permission == Permission::Default {
            *permission = self.surface.request_permission();
            debug!("Notification permission: {}", *permission);
        }
        *permission == Permission::Granted
    }

    pub fn permission(&self) -> Permission {
        match self.permission.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// Dispatch `event`. The native notification and sound run first and never
    /// depend on persistence; a persistence failure is returned for logging.
    pub async fn send<S: RequestStore>(
        &self,
        store: &S,
        event: &NotificationEvent,
    ) -> Result<Option<Notification>> {
        self.show_native(event);

        if event.urgent {
            if let Err(e) = self.alert.play_alert(self.alert_volume) {
                warn!("Alert sound failed: {}", e);
            }
        }

        let persisted = store.record_notification(event).await;
        if let Err(e) = &persisted {
            warn!(
                "Failed to persist {} notification for request {}: {}",
                event.kind, event.request_id, e
            );
        }
        persisted
    }

    fn show_native(&self, event: &NotificationEvent) {
        // Denied or never granted: skip, do not queue.
        if self.permission() != Permission::Granted {
            return;
        }
        let payload = PushPayload::new(event.message.clone(), event.kind.as_str(), event.urgent);
        if let Err(e) = self.surface.show(&NativeNotification::from_push(&payload)) {
            warn!("Native notification failed: {}", e);
        }
    }
}
