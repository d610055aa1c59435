use serde::{Deserialize, Serialize};

/// What the user is up to right now, as reported by the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Online,
    Away,
    Busy,
}

/// Host-supplied presence feed.  Consulted when arming idle timers and
/// again at fire time, so a user who comes back mid-countdown is respected.
pub trait PresenceSource: Send + Sync {
    fn presence(&self) -> Presence;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Journal,
    Daydream,
    Error,
}

/// Host-facing notification sink (tray toast, banner, log line).  The
/// engine never assumes a UI exists; it only reports through this trait.
pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotificationKind);
}
