//! Notification pipeline: rendering events to text, deciding which are worth
//! sending, and delivering them to Discord.

mod dispatcher;
mod formatter;
mod sink;

pub use dispatcher::{DispatchPolicy, DispatchReport, Dispatcher};
pub use formatter::{
    explorer_links, fish_scale_emoji, iasset_emoji, FormatContext, NotificationFormatter,
};
pub use sink::{DiscordWebhook, LogSink, NotificationSink, RecordingSink, DISCORD_WEBHOOK_PREFIX};
