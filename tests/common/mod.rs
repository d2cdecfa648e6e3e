#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use telegrify::keyboard::InlineKeyboardMarkup;
use telegrify::{
    AppConfig, AppState, Error, JinjaRenderer, MessagingClient, ParseMode, RegistryBuilder,
    SentMessage,
};

/// One call made against the mock client
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Message {
        chat_id: String,
        text: String,
        parse_mode: Option<ParseMode>,
        markup: Option<InlineKeyboardMarkup>,
    },
    Photo {
        chat_id: String,
        url: String,
        caption: String,
    },
    MediaGroup {
        chat_id: String,
        urls: Vec<String>,
        caption: String,
    },
    Answer {
        id: String,
        text: Option<String>,
    },
}

/// Records every call; deliveries to chats in `failing` return an API error,
/// as do callback answers when `fail_answers` is set
#[derive(Default)]
pub struct RecordingClient {
    pub calls: Mutex<Vec<Call>>,
    pub failing: Vec<String>,
    pub fail_answers: bool,
}

impl RecordingClient {
    pub fn failing_for(chats: &[&str]) -> Self {
        RecordingClient {
            failing: chats.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn failing_answers() -> Self {
        RecordingClient {
            fail_answers: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn deliver(&self, chat_id: &str, call: Call) -> Result<SentMessage, Error> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        if self.failing.iter().any(|c| c == chat_id) {
            return Err(Error::api("Bad Request: chat not found"));
        }
        Ok(SentMessage {
            message_id: Some(100 + calls.len() as i64),
        })
    }
}

#[async_trait]
impl MessagingClient for RecordingClient {
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: Option<ParseMode>,
        reply_markup: Option<&InlineKeyboardMarkup>,
    ) -> Result<SentMessage, Error> {
        self.deliver(
            chat_id,
            Call::Message {
                chat_id: chat_id.to_string(),
                text: text.to_string(),
                parse_mode,
                markup: reply_markup.cloned(),
            },
        )
    }

    async fn send_photo(
        &self,
        chat_id: &str,
        photo_url: &str,
        caption: &str,
        _parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, Error> {
        self.deliver(
            chat_id,
            Call::Photo {
                chat_id: chat_id.to_string(),
                url: photo_url.to_string(),
                caption: caption.to_string(),
            },
        )
    }

    async fn send_media_group(
        &self,
        chat_id: &str,
        photo_urls: &[String],
        caption: &str,
        _parse_mode: Option<ParseMode>,
    ) -> Result<SentMessage, Error> {
        self.deliver(
            chat_id,
            Call::MediaGroup {
                chat_id: chat_id.to_string(),
                urls: photo_urls.to_vec(),
                caption: caption.to_string(),
            },
        )
    }

    async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<(), Error> {
        self.calls.lock().unwrap().push(Call::Answer {
            id: callback_query_id.to_string(),
            text: text.map(str::to_string),
        });
        if self.fail_answers {
            return Err(Error::api("Bad Request: query is too old"));
        }
        Ok(())
    }
}

/// Application state over `yaml` with built-in formatters and a recording client
pub fn state(yaml: &str, client: Arc<RecordingClient>) -> AppState {
    let config = AppConfig::from_yaml_str(yaml).expect("valid test config");
    let registry = RegistryBuilder::with_builtins().build();
    AppState::new(config, registry, client, Arc::new(JinjaRenderer::new()))
}
