//! Alert state tracking and notification
//!
//! Rules move through inactive, pending and firing states. Entering firing
//! and leaving it produce notifications for a [`NotificationSink`].

pub mod manager;
pub mod notifier;
pub mod state;

pub use manager::AlertManager;
pub use notifier::{deliver, Notification, NotificationSink, Notifier, NotifierError, NotifyState, NotifyTarget};
pub use state::{AlertState, AlertStatus, AlertTransition};
