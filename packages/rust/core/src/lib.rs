//! Sync orchestration: pipeline phases, task guards, and notifications.

pub mod guard;
pub mod notify;
pub mod pipeline;

pub use guard::{BacklogEntry, GuardOutcome, GuardState, evaluate, run_guard};
pub use notify::{MailGatewayNotifier, NoopNotifier, Notifier, build_notification};
pub use pipeline::{ProgressReporter, SilentProgress, SyncOutcome, run_sync};
