//! testbotd - push webhook listener for the integration pipeline
//!
//! Accepts push notifications on `POST /push`, runs the fail-fast pipeline
//! from `testbot-ci` for pushes to the mainline ref, and reports the result
//! to a chat webhook.

pub mod api;
pub mod config;
pub mod fakes;
pub mod notify;
pub mod push;
pub mod service;
pub mod telemetry;

pub use config::{BotConfig, Cli};
pub use notify::{NotificationPayload, Notifier, NotifyError, Reporter, WebhookNotifier};
pub use push::{PushEvent, PushRejection};
pub use service::{BotContext, Dispatch};
