//! Formatter registry.
//!
//! Built in two phases: a [`RegistryBuilder`] is filled at startup (built-ins,
//! then plugins discovered on disk) and consumed by [`RegistryBuilder::build`]
//! into a [`FormatterRegistry`] that only offers lookups. The frozen registry
//! is shared across request handlers behind an `Arc`.

use log::{error, info, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::Error;
use crate::formatter::{Formatter, MarkdownFormatter, PlainFormatter, TemplateFormatter};
use crate::template::TemplateRenderer;

/// On-disk description of a template-backed formatter plugin
#[derive(Debug, Deserialize)]
struct PluginManifest {
    #[serde(default)]
    name: Option<String>,
    template: String,
    #[serde(default)]
    escaped: bool,
}

/// Lowercase, with `-` and spaces folded to `_`
pub fn canonical_name(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect()
}

/// Mutable startup phase of the registry
#[derive(Default)]
pub struct RegistryBuilder {
    formatters: HashMap<String, Arc<dyn Formatter>>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pre-populated with `plain` and `markdown`
    pub fn with_builtins() -> Self {
        let mut builder = Self::new();
        builder.register("plain", Arc::new(PlainFormatter));
        builder.register("markdown", Arc::new(MarkdownFormatter));
        builder
    }

    /// Register `formatter` under the canonical form of `name`. An existing
    /// entry is replaced.
    pub fn register(&mut self, name: &str, formatter: Arc<dyn Formatter>) -> &mut Self {
        let name = canonical_name(name);
        if self.formatters.insert(name.clone(), formatter).is_some() {
            warn!("Formatter '{}' was registered again; the later one wins", name);
        }
        self
    }

    /// Register every `*.yaml`/`*.yml` plugin manifest in `dir`.
    ///
    /// Manifests that fail to load are logged and skipped. Returns the number
    /// of plugins registered.
    pub fn discover<P: AsRef<Path>>(
        &mut self,
        dir: P,
        renderer: Arc<dyn TemplateRenderer>,
    ) -> Result<usize, Error> {
        let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                matches!(
                    path.extension().and_then(|ext| ext.to_str()),
                    Some("yaml") | Some("yml")
                )
            })
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let manifest: PluginManifest = match fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|text| serde_yaml::from_str(&text).map_err(Error::from))
            {
                Ok(manifest) => manifest,
                Err(e) => {
                    error!("Skipping plugin {}: {}", path.display(), e);
                    continue;
                }
            };

            let raw_name = manifest.name.clone().or_else(|| {
                path.file_stem()
                    .and_then(|stem| stem.to_str())
                    .map(str::to_string)
            });
            let name = match raw_name {
                Some(name) if !canonical_name(&name).is_empty() => canonical_name(&name),
                _ => {
                    error!("Skipping plugin {}: no usable name", path.display());
                    continue;
                }
            };

            let formatter =
                TemplateFormatter::new(manifest.template, manifest.escaped, renderer.clone());
            self.register(&name, Arc::new(formatter));
            info!("Loaded formatter plugin '{}' from {}", name, path.display());
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Freeze the registry for the serving phase
    pub fn build(self) -> FormatterRegistry {
        FormatterRegistry {
            formatters: self.formatters,
        }
    }
}

/// Read-only formatter lookup
pub struct FormatterRegistry {
    formatters: HashMap<String, Arc<dyn Formatter>>,
}

impl FormatterRegistry {
    /// Look up a formatter; `Order-Formatter` finds `order_formatter`
    pub fn get(&self, name: &str) -> Option<&dyn Formatter> {
        self.formatters.get(&canonical_name(name)).map(|f| f.as_ref())
    }

    /// Registered names, sorted
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.formatters.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}
