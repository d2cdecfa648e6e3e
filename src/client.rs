use async_trait::async_trait;
use log::{error, info, trace};
use reqwest::{Client as ReqwestClient, Response as ReqwestResponse};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::configuration::BotConfig;
use crate::error::Error;
use crate::escape::ParseMode;
use crate::keyboard::InlineKeyboardMarkup;

/// Default Bot API host
pub const TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Upper bound for any outbound HTTP request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client with `timeout` applied to every request
pub(crate) fn http_client(timeout: Duration) -> ReqwestClient {
    ReqwestClient::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| ReqwestClient::new())
}

/// Identifier of a delivered message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SentMessage {
    pub message_id: Option<i64>,
}

/// Outbound side of the messaging platform
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<SentMessage, Error>;

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, Error>;

    /// Send an album; the caption is attached to the first photo
    async fn send_media_group(
        &self,
        chat_id: &str,
        photo_urls: &[String],
        caption: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, Error>;

    /// Stop the client's loading indicator, optionally showing a toast
    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), Error>;
}

/// Response from the Telegram API
#[derive(Debug, Deserialize)]
pub struct Response {
    /// Whether the request was successful
    pub ok: bool,
    /// Response description
    pub description: Option<String>,
    /// Response result
    pub result: Option<serde_json::Value>,
}

impl Response {
    /// `message_id` of a single message result, or of the first message of an album
    pub fn message_id(&self) -> Option<i64> {
        let result = self.result.as_ref()?;
        let message = match result {
            serde_json::Value::Array(items) => items.first()?,
            other => other,
        };
        message.get("message_id")?.as_i64()
    }
}

#[derive(Debug, Serialize)]
struct SendMessageParams<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct SendPhotoParams<'a> {
    chat_id: &'a str,
    photo: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
}

#[derive(Debug, Serialize)]
struct InputMediaPhoto<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    media: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<ParseMode>,
}

#[derive(Debug, Serialize)]
struct SendMediaGroupParams<'a> {
    chat_id: &'a str,
    media: Vec<InputMediaPhoto<'a>>,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQueryParams<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct SetWebhookParams<'a> {
    url: &'a str,
}

/// Bot API client over HTTP
pub struct TelegramClient {
    client: ReqwestClient,
    token: String,
    test_mode: bool,
    base_url: String,
}

impl TelegramClient {
    /// Create a new Telegram client
    pub fn new<S: Into<String>>(token: S, test_mode: bool) -> Self {
        TelegramClient {
            client: http_client(REQUEST_TIMEOUT),
            token: token.into(),
            test_mode,
            base_url: TELEGRAM_API_URL.to_string(),
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(config.token.clone(), config.test_mode)
    }

    /// Point the client at another API host (a local Bot API server, or a mock)
    pub fn with_base_url<S: Into<String>>(mut self, base_url: S) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        if self.test_mode {
            format!("{}/bot{}/test/{}", self.base_url, self.token, method)
        } else {
            format!("{}/bot{}/{}", self.base_url, self.token, method)
        }
    }

    /// Ask Telegram to deliver updates to `url`
    pub async fn set_webhook(&self, url: &str) -> Result<(), Error> {
        self.call("setWebhook", &SetWebhookParams { url }).await?;
        info!("Webhook set to {}", url);
        Ok(())
    }

    async fn call<P: Serialize + ?Sized>(&self, method: &str, params: &P) -> Result<Response, Error> {
        let url = self.method_url(method);
        trace!("Calling {}", method);

        let response = match self.client.post(&url).json(params).send().await {
            Ok(resp) => resp,
            Err(e) => {
                // The request URL embeds the bot token
                let e = e.without_url();
                error!("HTTP request to {} failed: {}", method, e);
                return Err(Error::Http(e));
            }
        };

        self.handle_response(response).await
    }

    /// Handle the API response
    async fn handle_response(&self, response: ReqwestResponse) -> Result<Response, Error> {
        let status = response.status();
        let body = response.text().await.map_err(|e| Error::Http(e.without_url()))?;

        let telegram_response: Option<Response> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let description = telegram_response
                .and_then(|r| r.description)
                .unwrap_or(body);
            error!("HTTP error status {}: {}", status.as_u16(), description);
            return Err(Error::api(format!(
                "HTTP error (status {}): {}",
                status.as_u16(),
                description
            )));
        }

        let telegram_response = match telegram_response {
            Some(res) => res,
            None => {
                error!("Failed to parse API response: {}", body);
                return Err(Error::api("Failed to parse API response"));
            }
        };

        // Check if the API returned an error
        if !telegram_response.ok {
            let description = telegram_response
                .description
                .unwrap_or_else(|| "Unknown API error".to_string());

            error!("Telegram API returned error: {}", description);
            return Err(Error::api(description));
        }

        Ok(telegram_response)
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<SentMessage, Error> {
        if text.is_empty() {
            error!("Refusing to send an empty message to {}", chat_id);
            return Err(Error::formatting("Message is empty after formatting"));
        }

        let params = SendMessageParams {
            chat_id,
            text,
            parse_mode,
            reply_markup,
        };
        let response = self.call("sendMessage", &params).await?;
        Ok(SentMessage {
            message_id: response.message_id(),
        })
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, Error> {
        let params = SendPhotoParams {
            chat_id,
            photo: photo_url,
            caption: Some(caption).filter(|c| !c.is_empty()),
            parse_mode,
        };
        let response = self.call("sendPhoto", &params).await?;
        Ok(SentMessage {
            message_id: response.message_id(),
        })
    }

    async fn send_media_group(
        &self,
        chat_id: &str,
        photo_urls: &[String],
        caption: &str,
        parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, Error> {
        let media = photo_urls
            .iter()
            .enumerate()
            .map(|(i, url)| InputMediaPhoto {
                kind: "photo",
                media: url,
                caption: Some(caption).filter(|c| i == 0 && !c.is_empty()),
                parse_mode: if i == 0 { parse_mode } else { None },
            })
            .collect();

        let response = self
            .call("sendMediaGroup", &SendMediaGroupParams { chat_id, media })
            .await?;
        Ok(SentMessage {
            message_id: response.message_id(),
        })
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), Error> {
        let params = AnswerCallbackQueryParams {
            callback_query_id,
            text,
        };
        self.call("answerCallbackQuery", &params).await?;
        Ok(())
    }
}
