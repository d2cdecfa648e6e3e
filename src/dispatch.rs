//! Fan-out of one composed message to its destinations.
//!
//! Destinations are attempted one at a time in declaration order. A failed
//! delivery does not stop the fan-out: every destination gets an outcome, and
//! the report's status says whether all, some or none were delivered.

use log::{error, info};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::client::MessagingClient;
use crate::composer::Notification;
use crate::fields;

/// Media attached to a notification
#[derive(Debug, Clone, PartialEq)]
pub enum Attachments {
    None,
    Photo(String),
    PhotoGroup(Vec<String>),
}

impl Attachments {
    /// `image_urls` wins over `image_url`; a one-element list is a single photo
    pub fn from_payload(payload: &Value, field_map: &HashMap<String, String>) -> Self {
        let mut urls = fields::resolve_strings(payload, "image_urls", field_map);
        match urls.len() {
            0 => match fields::resolve_string(payload, "image_url", field_map) {
                Some(url) => Attachments::Photo(url),
                None => Attachments::None,
            },
            1 => Attachments::Photo(urls.remove(0)),
            _ => Attachments::PhotoGroup(urls),
        }
    }
}

/// Result of delivering to one destination
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DeliveryOutcome {
    Sent { message_id: Option<i64> },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub chat_id: String,
    #[serde(flatten)]
    pub outcome: DeliveryOutcome,
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Sent { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchStatus {
    Sent,
    Partial,
    Failed,
}

/// Per-destination outcomes, in destination order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub results: Vec<DispatchResult>,
}

impl DispatchReport {
    pub fn status(&self) -> DispatchStatus {
        let sent = self.results.iter().filter(|r| r.is_sent()).count();
        if sent == self.results.len() {
            DispatchStatus::Sent
        } else if sent == 0 {
            DispatchStatus::Failed
        } else {
            DispatchStatus::Partial
        }
    }

    /// First failure message, if any
    pub fn first_error(&self) -> Option<&str> {
        self.results.iter().find_map(|r| match &r.outcome {
            DeliveryOutcome::Failed { error } => Some(error.as_str()),
            DeliveryOutcome::Sent { .. } => None,
        })
    }
}

/// Deliver `notification` to each destination sequentially
pub async fn dispatch(client: &dyn MessagingClient, notification: &Notification) -> DispatchReport {
    let text = notification.message.text.as_str();
    let parse_mode = notification.message.parse_mode;
    let mut results = Vec::with_capacity(notification.destinations.len());

    for chat_id in &notification.destinations {
        let sent = match &notification.attachments {
            Attachments::PhotoGroup(urls) => {
                client.send_media_group(chat_id, urls, text, parse_mode).await
            }
            Attachments::Photo(url) => client.send_photo(chat_id, url, text, parse_mode).await,
            Attachments::None => {
                client
                    .send_message(chat_id, text, parse_mode, notification.keyboard.as_ref())
                    .await
            }
        };

        let outcome = match sent {
            Ok(message) => {
                info!("Notification sent to {}", chat_id);
                DeliveryOutcome::Sent {
                    message_id: message.message_id,
                }
            }
            Err(e) => {
                error!("Failed to send notification to {}: {}", chat_id, e);
                DeliveryOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };
        results.push(DispatchResult {
            chat_id: chat_id.clone(),
            outcome,
        });
    }

    DispatchReport { results }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SentMessage;
    use crate::composer::ComposedMessage;
    use crate::error::Error;
    use crate::escape::ParseMode;
    use crate::keyboard::InlineKeyboardMarkup;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records calls; fails for chat ids listed in `failing`
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
        failing: Vec<&'static str>,
    }

    impl Recorder {
        fn record(&self, call: String, chat_id: &str) -> Result<SentMessage, Error> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(call);
            if self.failing.iter().any(|f| *f == chat_id) {
                return Err(Error::api("Bad Request: chat not found"));
            }
            Ok(SentMessage {
                message_id: Some(calls.len() as i64),
            })
        }
    }

    #[async_trait]
    impl MessagingClient for Recorder {
        async fn send_message(
            &self,
            chat_id: &str,
            text: &str,
            _: Option<ParseMode>,
            markup: Option<&InlineKeyboardMarkup>,
        ) -> Result<SentMessage, Error> {
            self.record(format!("message:{}:{}:{}", chat_id, text, markup.is_some()), chat_id)
        }

        async fn send_photo(
            &self,
            chat_id: &str,
            url: &str,
            _: &str,
            _: Option<ParseMode>,
        ) -> Result<SentMessage, Error> {
            self.record(format!("photo:{}:{}", chat_id, url), chat_id)
        }

        async fn send_media_group(
            &self,
            chat_id: &str,
            urls: &[String],
            _: &str,
            _: Option<ParseMode>,
        ) -> Result<SentMessage, Error> {
            self.record(format!("group:{}:{}", chat_id, urls.len()), chat_id)
        }

        async fn answer_callback_query(&self, _: &str, _: Option<&str>) -> Result<(), Error> {
            Ok(())
        }
    }

    fn notification(destinations: &[&str], attachments: Attachments) -> Notification {
        Notification {
            destinations: destinations.iter().map(|d| d.to_string()).collect(),
            message: ComposedMessage {
                text: "hello".to_string(),
                parse_mode: None,
            },
            attachments,
            keyboard: None,
        }
    }

    #[test]
    fn attachments_from_payload() {
        let fields = HashMap::new();
        assert_eq!(Attachments::from_payload(&json!({}), &fields), Attachments::None);
        assert_eq!(
            Attachments::from_payload(&json!({"image_url": "u"}), &fields),
            Attachments::Photo("u".to_string())
        );
        assert_eq!(
            Attachments::from_payload(&json!({"image_url": "u", "image_urls": ["a", "b"]}), &fields),
            Attachments::PhotoGroup(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(
            Attachments::from_payload(&json!({"image_urls": ["only"]}), &fields),
            Attachments::Photo("only".to_string())
        );
    }

    #[tokio::test]
    async fn delivers_to_every_destination_in_order() {
        let client = Recorder::default();
        let report = dispatch(&client, &notification(&["a", "b", "c"], Attachments::None)).await;

        assert_eq!(report.status(), DispatchStatus::Sent);
        let chats: Vec<_> = report.results.iter().map(|r| r.chat_id.as_str()).collect();
        assert_eq!(chats, vec!["a", "b", "c"]);
        assert_eq!(
            *client.calls.lock().unwrap(),
            vec!["message:a:hello:false", "message:b:hello:false", "message:c:hello:false"]
        );
    }

    #[tokio::test]
    async fn failure_does_not_stop_later_destinations() {
        let client = Recorder {
            failing: vec!["b"],
            ..Default::default()
        };
        let report = dispatch(&client, &notification(&["a", "b", "c"], Attachments::None)).await;

        assert_eq!(report.status(), DispatchStatus::Partial);
        assert_eq!(report.results.len(), 3);
        assert!(report.results[0].is_sent());
        assert!(!report.results[1].is_sent());
        assert!(report.results[2].is_sent());
        assert!(report.first_error().unwrap().contains("chat not found"));
    }

    #[tokio::test]
    async fn all_failures_mean_failed_status() {
        let client = Recorder {
            failing: vec!["a"],
            ..Default::default()
        };
        let report = dispatch(&client, &notification(&["a"], Attachments::None)).await;
        assert_eq!(report.status(), DispatchStatus::Failed);
    }

    #[tokio::test]
    async fn photo_shapes_are_mutually_exclusive() {
        let client = Recorder::default();
        dispatch(
            &client,
            &notification(&["a"], Attachments::PhotoGroup(vec!["x".into(), "y".into()])),
        )
        .await;
        dispatch(&client, &notification(&["b"], Attachments::Photo("p".into()))).await;

        assert_eq!(*client.calls.lock().unwrap(), vec!["group:a:2", "photo:b:p"]);
    }

    #[test]
    fn results_serialize_flat() {
        let report = DispatchReport {
            results: vec![
                DispatchResult {
                    chat_id: "1".to_string(),
                    outcome: DeliveryOutcome::Sent { message_id: Some(9) },
                },
                DispatchResult {
                    chat_id: "2".to_string(),
                    outcome: DeliveryOutcome::Failed {
                        error: "boom".to_string(),
                    },
                },
            ],
        };
        assert_eq!(
            serde_json::to_value(&report.results).unwrap(),
            json!([{"chat_id": "1", "message_id": 9}, {"chat_id": "2", "error": "boom"}])
        );
    }
}
