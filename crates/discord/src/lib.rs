//! Discord webhooks as relay delivery endpoints.
//!
//! [`DiscordWebhookProvider`] creates one webhook per relay channel through
//! the bot REST API; [`DiscordWebhook`] executes it for every relayed message.

pub mod provider;
pub mod webhook;
pub mod wire;

pub use {provider::DiscordWebhookProvider, webhook::DiscordWebhook};
