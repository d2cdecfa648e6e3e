//! Message templates.
//!
//! Rendering sits behind [`TemplateRenderer`] so the composer, keyboard
//! builder and webhook router only depend on `render(text, context)`.
//! [`JinjaRenderer`] is the production implementation.

use minijinja::{Environment, UndefinedBehavior};
use serde_json::Value;

use crate::error::Error;

/// Renders a template source against a JSON context
pub trait TemplateRenderer: Send + Sync {
    /// Fails with [`Error::Template`] on malformed syntax or, for strict
    /// renderers, on an undefined variable.
    fn render(&self, template: &str, context: &Value) -> Result<String, Error>;
}

/// Jinja-syntax renderer; top-level keys of an object context become variables
pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl JinjaRenderer {
    /// Undefined variables render as empty strings
    pub fn new() -> Self {
        Self::with_undefined(UndefinedBehavior::Lenient)
    }

    /// Undefined variables are errors
    pub fn strict() -> Self {
        Self::with_undefined(UndefinedBehavior::Strict)
    }

    fn with_undefined(behavior: UndefinedBehavior) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(behavior);
        env.set_keep_trailing_newline(true);
        JinjaRenderer { env }
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String, Error> {
        Ok(self.env.render_str(template, context)?)
    }
}
