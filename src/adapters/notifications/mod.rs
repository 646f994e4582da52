//! Notification dispatcher adapters.

mod recording_dispatcher;
mod tracing_dispatcher;

pub use recording_dispatcher::{RecordingNotificationDispatcher, SentNotification};
pub use tracing_dispatcher::TracingNotificationDispatcher;
