/*!
 * Telegrify - forward JSON events to Telegram chats
 *
 * Each configured HTTP endpoint turns a JSON payload into a Telegram message,
 * either through a named formatter or a template, and delivers it to one or
 * more chats. An optional webhook answers inline-button callbacks and bot
 * commands.
 *
 * The server is normally started from the `telegrify` binary, but every piece
 * is usable as a library:
 *
 * ```no_run
 * use std::sync::Arc;
 * use telegrify::{AppConfig, AppState, JinjaRenderer, RegistryBuilder, TelegramClient};
 *
 * # async fn start() -> Result<(), telegrify::Error> {
 * let config = AppConfig::load("config.yaml")?;
 * let registry = RegistryBuilder::with_builtins().build();
 * let client = TelegramClient::from_config(&config.bot);
 * let state = AppState::new(config, registry, Arc::new(client), Arc::new(JinjaRenderer::new()));
 * telegrify::server::serve(state).await
 * # }
 * ```
 */

pub mod cli;
pub mod client;
pub mod composer;
pub mod configuration;
pub mod dispatch;
pub mod error;
pub mod escape;
pub mod fields;
pub mod formatter;
pub mod keyboard;
pub mod logger;
pub mod registry;
pub mod server;
pub mod template;
pub mod webhook;

pub use client::{MessagingClient, SentMessage, TelegramClient};
pub use configuration::AppConfig;
pub use error::Error;
pub use escape::ParseMode;
pub use formatter::{FormatContext, Formatter, PluginFormatter};
pub use registry::{FormatterRegistry, RegistryBuilder};
pub use server::{build_router, AppState};
pub use template::{JinjaRenderer, TemplateRenderer};
