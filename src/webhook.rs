//! Inbound Telegram webhook updates.
//!
//! Button presses are matched against configured callbacks and bot commands
//! against configured commands; in both cases the first exact match in
//! declaration order wins. Processing errors never escape as transport
//! errors: Telegram disables webhooks that keep failing, so every update is
//! acknowledged and failures are reported inside the [`WebhookAck`] body.

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::client::{self, MessagingClient, REQUEST_TIMEOUT};
use crate::configuration::{AppConfig, CallbackConfig, CommandConfig};
use crate::error::Error;
use crate::keyboard;
use crate::template::TemplateRenderer;

/// Subset of a Bot API `Update` the router understands
#[derive(Debug, Deserialize)]
pub struct Update {
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: String,
    #[serde(default = "empty_object")]
    pub from: Value,
    #[serde(default = "empty_object")]
    pub message: Value,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default = "empty_object")]
    pub from: Value,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

fn empty_object() -> Value {
    Value::Object(Default::default())
}

/// Body returned for every webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WebhookAck {
    pub fn ok() -> Self {
        WebhookAck {
            ok: true,
            error: None,
        }
    }

    pub fn failed<S: Into<String>>(error: S) -> Self {
        WebhookAck {
            ok: false,
            error: Some(error.into()),
        }
    }
}

/// What the router did with an update
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Neither a callback query nor a message
    Ignored,
    /// Callback answered; `handler` is the index of the matching callback
    Callback { data: String, handler: Option<usize> },
    /// Message that is not a command
    Text,
    /// Command seen; `replied` tells whether a reply was sent
    Command { command: String, replied: bool },
}

/// Leading command token of `text` with any `@botname` suffix removed
pub fn extract_command(text: &str) -> Option<&str> {
    if !text.starts_with('/') {
        return None;
    }
    text.split_whitespace().next()?.split('@').next()
}

fn find_callback<'a>(callbacks: &'a [CallbackConfig], data: &str) -> Option<(usize, &'a CallbackConfig)> {
    callbacks.iter().enumerate().find(|(_, cb)| cb.data == data)
}

fn find_command<'a>(commands: &'a [CommandConfig], command: &str) -> Option<&'a CommandConfig> {
    commands.iter().find(|c| c.command == command)
}

async fn post_forward(
    http: &reqwest::Client,
    url: &str,
    body: &Value,
) -> Result<reqwest::StatusCode, reqwest::Error> {
    let response = http.post(url).json(body).send().await?;
    Ok(response.status())
}

pub struct WebhookRouter {
    config: Arc<AppConfig>,
    client: Arc<dyn MessagingClient>,
    renderer: Arc<dyn TemplateRenderer>,
    http: reqwest::Client,
}

impl WebhookRouter {
    pub fn new(
        config: Arc<AppConfig>,
        client: Arc<dyn MessagingClient>,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Self {
        WebhookRouter {
            config,
            client,
            renderer,
            http: client::http_client(REQUEST_TIMEOUT),
        }
    }

    /// Process a raw update body; never fails
    pub async fn handle(&self, body: &[u8]) -> WebhookAck {
        match self.route(body).await {
            Ok(route) => {
                debug!("Webhook update routed: {:?}", route);
                WebhookAck::ok()
            }
            Err(e) => {
                error!("Webhook error: {}", e);
                WebhookAck::failed(e.to_string())
            }
        }
    }

    /// Classify and process an update
    pub async fn route(&self, body: &[u8]) -> Result<Route, Error> {
        let update: Update = serde_json::from_slice(body)?;

        if let Some(callback) = update.callback_query {
            return self.handle_callback(callback).await;
        }
        if let Some(message) = update.message {
            return self.handle_message(message).await;
        }
        Ok(Route::Ignored)
    }

    async fn handle_callback(&self, callback: CallbackQuery) -> Result<Route, Error> {
        info!(
            "Callback query: {} from user {}",
            callback.data,
            callback.from.get("id").unwrap_or(&Value::Null)
        );

        let matched = find_callback(&self.config.callbacks, &callback.data);
        match matched {
            Some((_, handler)) => {
                self.client
                    .answer_callback_query(&callback.id, handler.response.as_deref())
                    .await?;
                if let Some(url) = &handler.url {
                    self.forward_callback(url.clone(), &callback);
                }
            }
            None => {
                self.client.answer_callback_query(&callback.id, None).await?;
            }
        }

        Ok(Route::Callback {
            data: callback.data,
            handler: matched.map(|(index, _)| index),
        })
    }

    /// Fire-and-forget POST of the callback details; failures are only logged
    fn forward_callback(&self, url: String, callback: &CallbackQuery) {
        let body = json!({
            "callback_data": callback.data,
            "user": callback.from,
            "message": callback.message,
        });
        let http = self.http.clone();

        tokio::spawn(async move {
            match post_forward(&http, &url, &body).await {
                Ok(status) if status.is_success() => {
                    debug!("Forwarded callback to {}", url);
                }
                Ok(status) => warn!("Callback forward to {} returned {}", url, status),
                Err(e) => warn!("Callback forward to {} failed: {}", url, e),
            }
        });
    }

    async fn handle_message(&self, message: Message) -> Result<Route, Error> {
        let text = message.text.as_deref().unwrap_or("");
        let command = match extract_command(text) {
            Some(command) => command,
            None => return Ok(Route::Text),
        };
        let user = &message.from;
        info!(
            "Command: {} from user {}",
            command,
            user.get("id").unwrap_or(&Value::Null)
        );

        let handler = match find_command(&self.config.commands, command) {
            Some(handler) => handler,
            None => {
                return Ok(Route::Command {
                    command: command.to_string(),
                    replied: false,
                })
            }
        };

        let chat_id = message.chat.id.to_string();
        let context = json!({
            "user": user,
            "chat_id": chat_id,
            "first_name": user.get("first_name").and_then(Value::as_str).unwrap_or(""),
            "username": user.get("username").and_then(Value::as_str).unwrap_or(""),
            "command": command,
        });

        let reply = match &handler.response {
            Some(template) => self.renderer.render(template, &context)?,
            None => String::new(),
        };
        if reply.is_empty() {
            return Ok(Route::Command {
                command: command.to_string(),
                replied: false,
            });
        }

        let markup = keyboard::build(&handler.buttons, &context, self.renderer.as_ref())?;
        self.client
            .send_message(&chat_id, &reply, handler.parse_mode, markup.as_ref())
            .await?;

        Ok(Route::Command {
            command: command.to_string(),
            replied: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_command_tokens() {
        assert_eq!(extract_command("/start@mybot hello"), Some("/start"));
        assert_eq!(extract_command("/help"), Some("/help"));
        assert_eq!(extract_command("/echo   a b"), Some("/echo"));
        assert_eq!(extract_command("hello /start"), None);
        assert_eq!(extract_command(""), None);
    }

    #[test]
    fn first_declared_callback_wins() {
        let callbacks: Vec<CallbackConfig> = serde_yaml::from_str(
            "- {data: ack, response: first}\n- {data: ack, response: second}\n- {data: ackx}\n",
        )
        .unwrap();
        for _ in 0..10 {
            let (index, handler) = find_callback(&callbacks, "ack").unwrap();
            assert_eq!(index, 0);
            assert_eq!(handler.response.as_deref(), Some("first"));
        }
        assert!(find_callback(&callbacks, "ac").is_none());
    }

    #[test]
    fn first_declared_command_wins() {
        let commands: Vec<CommandConfig> = serde_yaml::from_str(
            "- {command: /start, response: one}\n- {command: /start, response: two}\n",
        )
        .unwrap();
        assert_eq!(
            find_command(&commands, "/start").unwrap().response.as_deref(),
            Some("one")
        );
        assert!(find_command(&commands, "/star").is_none());
    }

    #[tokio::test]
    async fn forward_gives_up_on_a_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/cb", listener.local_addr().unwrap());
        // Accept and hold connections without ever answering
        let _held = tokio::spawn(async move {
            let mut sockets = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                sockets.push(socket);
            }
        });

        let http = client::http_client(std::time::Duration::from_millis(200));
        let started = std::time::Instant::now();
        let err = post_forward(&http, &url, &json!({"callback_data": "x"}))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < std::time::Duration::from_secs(5));
    }

    #[test]
    fn ack_serialization() {
        assert_eq!(serde_json::to_value(WebhookAck::ok()).unwrap(), json!({"ok": true}));
        assert_eq!(
            serde_json::to_value(WebhookAck::failed("boom")).unwrap(),
            json!({"ok": false, "error": "boom"})
        );
    }
}
