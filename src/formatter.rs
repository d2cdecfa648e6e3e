use log::trace;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Error;
use crate::escape::{sanitize, ParseMode};
use crate::template::TemplateRenderer;

/// Per-request inputs a formatter may use besides the payload
#[derive(Debug, Clone, Copy)]
pub struct FormatContext<'a> {
    /// Display labels for payload keys, from the endpoint config
    pub labels: &'a HashMap<String, String>,
    /// Parse mode the message will be sent with
    pub parse_mode: Option<ParseMode>,
}

impl<'a> FormatContext<'a> {
    pub fn new(labels: &'a HashMap<String, String>, parse_mode: Option<ParseMode>) -> Self {
        FormatContext { labels, parse_mode }
    }

    fn label<'k>(&'k self, key: &'k str) -> &'k str {
        self.labels.get(key).map(String::as_str).unwrap_or(key)
    }
}

/// Turns a payload into message text
pub trait Formatter: Send + Sync {
    fn format(&self, payload: &Value, ctx: &FormatContext<'_>) -> Result<String, Error>;

    /// Plugin capability: formatters that accept endpoint `plugin_config`
    /// return themselves here.
    fn as_plugin(&self) -> Option<&dyn PluginFormatter> {
        None
    }

    /// True when the output is already escaped for `ctx.parse_mode`, so the
    /// composer must not sanitize it again.
    fn escapes_output(&self) -> bool {
        false
    }
}

/// Formatter that also takes the endpoint's opaque `plugin_config`
pub trait PluginFormatter: Formatter {
    fn format_with_config(
        &self,
        payload: &Value,
        config: &Map<String, Value>,
        ctx: &FormatContext<'_>,
    ) -> Result<String, Error>;
}

/// Text form of a payload value; strings are not quoted
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `message` alone, otherwise one `label: value` line per key
pub struct PlainFormatter;

impl Formatter for PlainFormatter {
    fn format(&self, payload: &Value, ctx: &FormatContext<'_>) -> Result<String, Error> {
        let object = match payload.as_object() {
            Some(object) => object,
            None => return Ok(value_text(payload)),
        };

        if object.len() == 1 {
            if let Some(message) = object.get("message") {
                return Ok(value_text(message));
            }
        }

        let lines: Vec<String> = object
            .iter()
            .map(|(key, value)| format!("{}: {}", ctx.label(key), value_text(value)))
            .collect();
        Ok(lines.join("\n"))
    }
}

/// Bold title, message body, then labelled fields
pub struct MarkdownFormatter;

impl MarkdownFormatter {
    fn bold(text: &str, parse_mode: Option<ParseMode>) -> String {
        match parse_mode {
            Some(ParseMode::Html) => format!("<b>{}</b>", sanitize(text, parse_mode)),
            _ => format!("*{}*", sanitize(text, parse_mode)),
        }
    }
}

impl Formatter for MarkdownFormatter {
    fn format(&self, payload: &Value, ctx: &FormatContext<'_>) -> Result<String, Error> {
        let object = match payload.as_object() {
            Some(object) => object,
            None => return Ok(sanitize(&value_text(payload), ctx.parse_mode)),
        };

        let mut lines = Vec::new();
        if let Some(title) = object.get("title") {
            lines.push(Self::bold(&value_text(title), ctx.parse_mode));
        }
        if let Some(message) = object.get("message") {
            lines.push(sanitize(&value_text(message), ctx.parse_mode));
        }
        for (key, value) in object {
            if key == "title" || key == "message" {
                continue;
            }
            lines.push(format!(
                "{}: {}",
                Self::bold(ctx.label(key), ctx.parse_mode),
                sanitize(&value_text(value), ctx.parse_mode)
            ));
        }

        let text = lines.join("\n");
        trace!("Markdown formatter output: {}", text);
        Ok(text)
    }

    fn escapes_output(&self) -> bool {
        true
    }
}

/// Plugin formatter backed by a template.
///
/// The template sees the payload's top-level keys, plus `payload`, `config`
/// (the endpoint's `plugin_config`) and `labels`.
pub struct TemplateFormatter {
    template: String,
    escaped: bool,
    renderer: Arc<dyn TemplateRenderer>,
}

impl TemplateFormatter {
    pub fn new(template: String, escaped: bool, renderer: Arc<dyn TemplateRenderer>) -> Self {
        TemplateFormatter {
            template,
            escaped,
            renderer,
        }
    }
}

impl Formatter for TemplateFormatter {
    fn format(&self, payload: &Value, ctx: &FormatContext<'_>) -> Result<String, Error> {
        self.format_with_config(payload, &Map::new(), ctx)
    }

    fn as_plugin(&self) -> Option<&dyn PluginFormatter> {
        Some(self)
    }

    fn escapes_output(&self) -> bool {
        self.escaped
    }
}

impl PluginFormatter for TemplateFormatter {
    fn format_with_config(
        &self,
        payload: &Value,
        config: &Map<String, Value>,
        ctx: &FormatContext<'_>,
    ) -> Result<String, Error> {
        let mut context = payload.as_object().cloned().unwrap_or_default();
        context.insert("payload".to_string(), payload.clone());
        context.insert("config".to_string(), Value::Object(config.clone()));
        context.insert("labels".to_string(), serde_json::to_value(ctx.labels)?);
        self.renderer.render(&self.template, &Value::Object(context))
    }
}
