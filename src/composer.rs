//! Message composition for notification endpoints.
//!
//! A configured template that exists wins; otherwise the endpoint's formatter
//! is looked up in the registry. Template output is sent as written, since
//! template authors escape their own markup. Formatter output is sanitized
//! for the resolved parse mode unless the formatter escapes its own output.

use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;

use crate::configuration::EndpointConfig;
use crate::dispatch::Attachments;
use crate::error::Error;
use crate::escape::{sanitize, ParseMode};
use crate::fields;
use crate::formatter::FormatContext;
use crate::keyboard::{self, InlineKeyboardMarkup};
use crate::registry::FormatterRegistry;
use crate::template::TemplateRenderer;

/// Final text plus the parse mode it is meant for
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedMessage {
    pub text: String,
    pub parse_mode: Option<ParseMode>,
}

/// Everything needed to fan one inbound event out to its destinations
#[derive(Debug, Clone)]
pub struct Notification {
    pub destinations: Vec<String>,
    pub message: ComposedMessage,
    pub attachments: Attachments,
    pub keyboard: Option<InlineKeyboardMarkup>,
}

/// Payload `parse_mode` beats the endpoint's; unknown payload values are ignored
pub fn resolve_parse_mode(endpoint: &EndpointConfig, payload: &Value) -> Option<ParseMode> {
    if let Some(requested) = fields::resolve_string(payload, "parse_mode", &endpoint.field_map) {
        match requested.parse::<ParseMode>() {
            Ok(mode) => return Some(mode),
            Err(_) => warn!(
                "Ignoring unknown parse_mode '{}' in payload for {}",
                requested, endpoint.path
            ),
        }
    }
    endpoint.parse_mode
}

/// Shared, read-only inputs of composition
pub struct Composer<'a> {
    pub templates: &'a HashMap<String, String>,
    pub registry: &'a FormatterRegistry,
    pub renderer: &'a dyn TemplateRenderer,
}

impl<'a> Composer<'a> {
    /// Produce the message body for `payload` on `endpoint`
    pub fn compose(
        &self,
        endpoint: &EndpointConfig,
        payload: &Value,
    ) -> Result<ComposedMessage, Error> {
        let parse_mode = resolve_parse_mode(endpoint, payload);

        if let Some(template) = endpoint
            .template
            .as_ref()
            .and_then(|name| self.templates.get(name))
        {
            debug!("Rendering template for {}", endpoint.path);
            let text = self.renderer.render(template, payload)?;
            return Ok(ComposedMessage { text, parse_mode });
        }

        let formatter = self
            .registry
            .get(&endpoint.formatter)
            .ok_or_else(|| Error::FormatterNotFound(endpoint.formatter.clone()))?;
        let ctx = FormatContext::new(&endpoint.labels, parse_mode);

        let text = match formatter.as_plugin() {
            Some(plugin) => plugin.format_with_config(payload, &endpoint.plugin_config, &ctx)?,
            None => formatter.format(payload, &ctx)?,
        };
        let text = if formatter.escapes_output() {
            text
        } else {
            sanitize(&text, parse_mode)
        };

        Ok(ComposedMessage { text, parse_mode })
    }

    /// Resolve destinations, compose the body, and collect attachments and
    /// keyboard for one request.
    pub fn prepare(&self, endpoint: &EndpointConfig, payload: &Value) -> Result<Notification, Error> {
        let destinations =
            fields::resolve_destinations(payload, &endpoint.field_map, endpoint.chat_ids())?;
        let message = self.compose(endpoint, payload)?;
        let attachments = Attachments::from_payload(payload, &endpoint.field_map);
        let keyboard = keyboard::build(&endpoint.buttons, payload, self.renderer)?;

        Ok(Notification {
            destinations,
            message,
            attachments,
            keyboard,
        })
    }
}
