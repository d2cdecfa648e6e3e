//! Command-line entry points: `run`, `validate` and `init`.

use clap::{Parser, Subcommand};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::client::TelegramClient;
use crate::configuration::AppConfig;
use crate::error::Error;
use crate::logger;
use crate::registry::RegistryBuilder;
use crate::server::{self, AppState};
use crate::template::{JinjaRenderer, TemplateRenderer};

#[derive(Debug, Parser)]
#[command(name = "telegrify", version, about = "Simple Telegram notification framework")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the notification server
    Run {
        /// Path to config file
        #[arg(long, default_value = "config.yaml", env = "TELEGRIFY_CONFIG")]
        config: PathBuf,
        /// Override server.host
        #[arg(long)]
        host: Option<String>,
        /// Override server.port
        #[arg(long)]
        port: Option<u16>,
        /// Directory scanned for formatter plugins
        #[arg(long, default_value = "plugins")]
        plugins: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(long, default_value = "config.yaml", env = "TELEGRIFY_CONFIG")]
        config: PathBuf,
    },
    /// Create a new project skeleton
    Init {
        /// Directory to create
        project: PathBuf,
    },
}

pub async fn run(cli: Cli) -> Result<(), Error> {
    match cli.command {
        Command::Run {
            config,
            host,
            port,
            plugins,
        } => run_server(&config, host, port, &plugins).await,
        Command::Validate { config } => {
            let _ = dotenvy::dotenv();
            let config = AppConfig::load(&config)?;
            println!("{}", summarize(&config));
            Ok(())
        }
        Command::Init { project } => {
            init_project(&project)?;
            println!("Project created at {}", project.display());
            println!("\nNext steps:");
            println!("  cd {}", project.display());
            println!("  # Edit config.yaml with your settings");
            println!("  export TELEGRAM_BOT_TOKEN='your-token'");
            println!("  telegrify run");
            Ok(())
        }
    }
}

async fn run_server(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    plugins: &Path,
) -> Result<(), Error> {
    let _ = dotenvy::dotenv();
    let mut config = AppConfig::load(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    logger::init(&config.logging);
    config.log_warnings();

    let renderer: Arc<dyn TemplateRenderer> = Arc::new(JinjaRenderer::new());
    let mut builder = RegistryBuilder::with_builtins();
    if plugins.is_dir() {
        info!("Discovering plugins in {}", plugins.display());
        if let Err(e) = builder.discover(plugins, renderer.clone()) {
            warn!("Plugin discovery failed: {}", e);
        }
    }
    let registry = builder.build();
    info!("Loaded formatters: {}", registry.list().join(", "));

    let client = TelegramClient::from_config(&config.bot);
    if let Some(url) = &config.bot.webhook_url {
        if let Err(e) = client.set_webhook(url).await {
            warn!("Could not register webhook {}: {}", url, e);
        }
    }

    info!(
        "Telegrify initialized with {} endpoints",
        config.endpoints.len()
    );
    let state = AppState::new(config, registry, Arc::new(client), renderer);
    server::serve(state).await
}

/// Last four characters of the token, the rest starred
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let visible = chars.len().min(4);
    let tail: String = chars[chars.len() - visible..].iter().collect();
    format!("{}{}", "*".repeat(20), tail)
}

/// Human-readable report printed by `validate`
pub fn summarize(config: &AppConfig) -> String {
    let mut lines = vec![
        "Configuration is valid!".to_string(),
        String::new(),
        format!("Bot token: {}", mask_token(&config.bot.token)),
        format!("Endpoints: {}", config.endpoints.len()),
    ];
    for endpoint in &config.endpoints {
        lines.push(format!(
            "  - {} -> {} ({})",
            endpoint.path,
            endpoint.chat_ids().join(", "),
            endpoint.template.as_deref().unwrap_or(&endpoint.formatter)
        ));
    }
    if config.webhook_enabled() {
        lines.push(format!(
            "Webhook: {} ({} callbacks, {} commands)",
            config.bot.webhook_path,
            config.callbacks.len(),
            config.commands.len()
        ));
    }
    if !config.warnings.is_empty() {
        lines.push(String::new());
        lines.push(format!("Warnings: {}", config.warnings.len()));
        lines.extend(config.warnings.iter().map(|w| format!("  - {}", w)));
    }
    lines.join("\n")
}

const CONFIG_TEMPLATE: &str = r#"# Telegrify configuration

bot:
  token: "${TELEGRAM_BOT_TOKEN}"
  test_mode: false

endpoints:
  - path: "/notify/orders"
    chat_id: "-1001234567890"
    formatter: "order"
    plugin_config:
      prefix: "New Order"

  - path: "/notify/alerts"
    chat_id: "123456789"
    formatter: "markdown"
    parse_mode: "MarkdownV2"

server:
  host: "0.0.0.0"
  port: 8000
  api_key: "${API_KEY}"

logging:
  level: "INFO"
"#;

const PLUGIN_TEMPLATE: &str = r#"# Formatter plugin: rendered with the payload keys, `payload` and `config`
name: order
template: |-
  {{ config.prefix | default("New Order") }}

  {% if order_id %}Order ID: #{{ order_id }}
  {% endif %}{% if user %}Customer: {{ user }}
  {% endif %}{% if total %}Total: ${{ total }}
  {% endif %}{% if message %}
  {{ message }}{% endif %}
"#;

const ENV_TEMPLATE: &str = "TELEGRAM_BOT_TOKEN=your_bot_token_here\nAPI_KEY=your_api_key_here\n";

/// Write a starter config, an example plugin and `.env.example` into `project`
pub fn init_project(project: &Path) -> Result<(), Error> {
    if project.exists() {
        return Err(Error::configuration(format!(
            "Directory '{}' already exists",
            project.display()
        )));
    }

    fs::create_dir_all(project.join("plugins"))?;
    fs::write(project.join("config.yaml"), CONFIG_TEMPLATE)?;
    fs::write(project.join("plugins").join("order.yaml"), PLUGIN_TEMPLATE)?;
    fs::write(project.join(".env.example"), ENV_TEMPLATE)?;
    Ok(())
}
