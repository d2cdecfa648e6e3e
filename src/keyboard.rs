use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::configuration::ButtonConfig;
use crate::error::Error;
use crate::template::TemplateRenderer;

/// A single inline keyboard button as sent to the Bot API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_data: Option<String>,
}

/// `reply_markup` payload carrying an inline keyboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

/// Render configured button rows against `context`.
///
/// Returns `None` when there are no rows. Row and column order is kept as
/// configured. A button with both a URL and callback data becomes a URL
/// button.
pub fn build(
    rows: &[Vec<ButtonConfig>],
    context: &Value,
    renderer: &dyn TemplateRenderer,
) -> Result<Option<InlineKeyboardMarkup>, Error> {
    if rows.is_empty() {
        return Ok(None);
    }

    let mut keyboard = Vec::with_capacity(rows.len());
    for row in rows {
        let mut buttons = Vec::with_capacity(row.len());
        for button in row {
            let text = renderer.render(&button.text, context)?;
            let (url, callback_data) = match (&button.url, &button.callback_data) {
                (Some(url), _) => (Some(renderer.render(url, context)?), None),
                (None, Some(data)) => (None, Some(renderer.render(data, context)?)),
                (None, None) => (None, None),
            };
            buttons.push(InlineKeyboardButton {
                text,
                url,
                callback_data,
            });
        }
        keyboard.push(buttons);
    }

    Ok(Some(InlineKeyboardMarkup {
        inline_keyboard: keyboard,
    }))
}
