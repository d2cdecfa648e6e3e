use log::warn;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::Error;
use crate::escape::ParseMode;

/// Path of the built-in health probe; endpoints may not claim it
pub const HEALTH_PATH: &str = "/health";

/// Telegram bot configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    /// Telegram Bot API token
    pub token: String,
    /// Use the Bot API test environment
    #[serde(default)]
    pub test_mode: bool,
    /// Public URL Telegram should deliver updates to
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Local route receiving webhook updates
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

/// One inline keyboard button; text, url and callback data are templates
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ButtonConfig {
    pub text: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub callback_data: Option<String>,
}

/// Configuration for a single notification endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
    /// Route the endpoint is served on
    pub path: String,
    /// Single destination chat
    #[serde(default, deserialize_with = "optional_chat_id")]
    pub chat_id: Option<String>,
    /// Additional destination chats
    #[serde(default, deserialize_with = "chat_id_list")]
    pub chat_ids: Vec<String>,
    /// Formatter to use when no template applies
    #[serde(default = "default_formatter")]
    pub formatter: String,
    /// Name of an entry in the top-level `templates` table
    #[serde(default)]
    pub template: Option<String>,
    /// Parse mode used when the payload does not override it
    #[serde(default)]
    pub parse_mode: Option<ParseMode>,
    /// Opaque settings handed to plugin formatters
    #[serde(default)]
    pub plugin_config: Map<String, Value>,
    /// Display labels for payload keys
    #[serde(default)]
    pub labels: HashMap<String, String>,
    /// Logical field name to dotted payload path
    #[serde(default)]
    pub field_map: HashMap<String, String>,
    /// Inline keyboard rows
    #[serde(default)]
    pub buttons: Vec<Vec<ButtonConfig>>,
}

impl EndpointConfig {
    /// Configured destinations, `chat_id` first, then `chat_ids`
    pub fn chat_ids(&self) -> Vec<String> {
        self.chat_id
            .iter()
            .chain(self.chat_ids.iter())
            .cloned()
            .collect()
    }
}

/// Handler for an inline button press
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackConfig {
    /// Exact callback data to match
    pub data: String,
    /// Toast text shown to the user
    #[serde(default)]
    pub response: Option<String>,
    /// URL notified with the callback details
    #[serde(default)]
    pub url: Option<String>,
}

/// Handler for a bot command
#[derive(Debug, Clone, Deserialize)]
pub struct CommandConfig {
    /// Command token including the prefix, e.g. `/start`
    pub command: String,
    /// Reply template
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub parse_mode: Option<ParseMode>,
    #[serde(default)]
    pub buttons: Vec<Vec<ButtonConfig>>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret expected in the `X-Api-Key` header
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: default_host(),
            port: default_port(),
            api_key: None,
        }
    }
}

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Timestamp, level, target and message
    #[default]
    Full,
    /// Level and message only
    Compact,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// Root configuration, loaded once at startup and never mutated afterwards
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub bot: BotConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
    #[serde(default)]
    pub templates: HashMap<String, String>,
    #[serde(default)]
    pub callbacks: Vec<CallbackConfig>,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Non-fatal problems found by [`AppConfig::validate`]
    #[serde(skip)]
    pub warnings: Vec<String>,
}

impl AppConfig {
    /// Load, resolve `${ENV}` placeholders and validate a YAML config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<AppConfig, Error> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Parse, resolve and validate a YAML document
    pub fn from_yaml_str(contents: &str) -> Result<AppConfig, Error> {
        let mut config: AppConfig = serde_yaml::from_str(contents)?;
        config.resolve_placeholders()?;
        config.validate()?;
        Ok(config)
    }

    /// Whether the webhook route should be served
    pub fn webhook_enabled(&self) -> bool {
        self.bot.webhook_url.is_some()
    }

    fn resolve_placeholders(&mut self) -> Result<(), Error> {
        self.bot.token = resolve_required(&self.bot.token, "bot.token")?;
        self.bot.webhook_url = resolve_optional(self.bot.webhook_url.take());
        self.server.api_key = resolve_optional(self.server.api_key.take());

        for endpoint in &mut self.endpoints {
            if let Some(chat_id) = endpoint.chat_id.take() {
                endpoint.chat_id = Some(resolve_required(&chat_id, "chat_id")?);
            }
            for chat_id in &mut endpoint.chat_ids {
                *chat_id = resolve_required(chat_id, "chat_ids")?;
            }
        }
        Ok(())
    }

    /// Normalise paths and reject configurations the server cannot honour
    pub fn validate(&mut self) -> Result<(), Error> {
        if self.bot.token.trim().is_empty() {
            return Err(Error::configuration("Bot token not configured"));
        }

        self.bot.webhook_path = normalize_path(&self.bot.webhook_path);
        if self.webhook_enabled() {
            check_literal_path("Webhook", &self.bot.webhook_path)?;
        }
        self.warnings.clear();

        let mut seen = HashSet::new();
        for endpoint in &mut self.endpoints {
            endpoint.path = normalize_path(&endpoint.path);

            check_literal_path("Endpoint", &endpoint.path)?;

            if endpoint.path == HEALTH_PATH {
                return Err(Error::configuration(format!(
                    "Endpoint path '{}' is reserved",
                    endpoint.path
                )));
            }
            if self.bot.webhook_url.is_some() && endpoint.path == self.bot.webhook_path {
                return Err(Error::configuration(format!(
                    "Endpoint path '{}' collides with the webhook path",
                    endpoint.path
                )));
            }
            if !seen.insert(endpoint.path.clone()) {
                return Err(Error::configuration(format!(
                    "Duplicate endpoint path '{}'",
                    endpoint.path
                )));
            }

            self.warnings
                .extend(endpoint.chat_ids().iter().filter_map(|id| check_chat_id(id)));

            if let Some(template) = &endpoint.template {
                if !self.templates.contains_key(template) {
                    self.warnings.push(format!(
                        "Endpoint {} references unknown template '{}', formatter '{}' will be used",
                        endpoint.path, template, endpoint.formatter
                    ));
                }
            }
        }

        for command in &self.commands {
            if !command.command.starts_with('/') {
                self.warnings.push(format!(
                    "Command '{}' does not start with '/' and will never match",
                    command.command
                ));
            }
        }

        if crate::logger::parse_level(&self.logging.level).is_none() {
            return Err(Error::configuration(format!(
                "Invalid log level: '{}'",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Emit collected validation warnings; call once logging is installed
    pub fn log_warnings(&self) {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
    }
}

fn default_webhook_path() -> String {
    "/webhook".to_string()
}

fn default_formatter() -> String {
    "plain".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "INFO".to_string()
}

fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn env_placeholder(value: &str) -> Option<&str> {
    value.strip_prefix("${")?.strip_suffix('}')
}

fn resolve_required(value: &str, field: &str) -> Result<String, Error> {
    match env_placeholder(value) {
        Some(var) => std::env::var(var)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                Error::configuration(format!(
                    "Environment variable {} not set (required by {})",
                    var, field
                ))
            }),
        None => Ok(value.to_string()),
    }
}

fn resolve_optional(value: Option<String>) -> Option<String> {
    let value = value?;
    match env_placeholder(&value) {
        Some(var) => std::env::var(var).ok().filter(|v| !v.is_empty()),
        None => Some(value),
    }
}

/// axum treats `{`, `}`, `*` and `:` as route syntax
fn check_literal_path(kind: &str, path: &str) -> Result<(), Error> {
    if path.contains(['{', '}', '*', ':']) {
        return Err(Error::configuration(format!(
            "{} path '{}' must be a literal path",
            kind, path
        )));
    }
    Ok(())
}

fn check_chat_id(chat_id: &str) -> Option<String> {
    if chat_id.starts_with('@') {
        return None;
    }
    match chat_id.parse::<i64>() {
        Ok(id) if id > 0 && chat_id.len() > 10 => Some(format!(
            "chat_id '{}' looks like a channel ID but is positive. Did you mean '-100{}'?",
            chat_id, chat_id
        )),
        Ok(_) => None,
        Err(_) => Some(format!(
            "chat_id '{}' is not a valid numeric ID or @username",
            chat_id
        )),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawChatId {
    Text(String),
    Number(i64),
}

impl From<RawChatId> for String {
    fn from(raw: RawChatId) -> Self {
        match raw {
            RawChatId::Text(s) => s,
            RawChatId::Number(n) => n.to_string(),
        }
    }
}

fn optional_chat_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawChatId>::deserialize(deserializer)?.map(String::from))
}

fn chat_id_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<RawChatId>::deserialize(deserializer)?
        .into_iter()
        .map(String::from)
        .collect())
}
