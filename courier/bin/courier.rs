//! Send one message through the configured relay.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;
use courier::Mailer;
use courier_common::{config::MailConfig, logging};
use courier_smtp::{Address, Message};

/// Send a message through an authenticated SMTP relay
#[derive(Parser, Debug)]
#[command(name = "courier")]
#[command(about = "Send a message through an authenticated SMTP relay", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the relay configuration (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Primary recipient, as `address` or `Name <address>`
    #[arg(long, required = true)]
    to: Vec<Address>,

    /// Carbon-copy recipient
    #[arg(long)]
    cc: Vec<Address>,

    /// Blind-copy recipient; never shown in the header
    #[arg(long)]
    bcc: Vec<String>,

    /// Address replies should go to
    #[arg(long)]
    reply_to: Vec<Address>,

    /// Sender address; defaults to `from` in the configuration
    #[arg(long, default_value = "")]
    from: String,

    /// Sender display name
    #[arg(long, default_value = "")]
    from_name: String,

    #[arg(short, long, default_value = "")]
    subject: String,

    /// Plain-text body
    #[arg(long, default_value = "")]
    text: String,

    /// HTML body
    #[arg(long, default_value = "")]
    html: String,
}

impl Cli {
    fn message(&self) -> Message {
        let message = Message::new()
            .from(Address::with_name(self.from.clone(), self.from_name.clone()))
            .extend_to(self.to.iter().cloned())
            .extend_cc(self.cc.iter().cloned())
            .subject(self.subject.clone())
            .text(self.text.clone())
            .html(self.html.clone());

        let message = self
            .bcc
            .iter()
            .fold(message, |message, bcc| message.bcc(bcc.clone()));
        self.reply_to
            .iter()
            .fold(message, |message, reply_to| message.reply_to(reply_to.clone()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config_path = find_config_file(cli.config.as_deref())?;
    let config = MailConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let mailer = Mailer::new(&config)?;
    mailer.send(&cli.message()).await?;

    tracing::info!(recipients = cli.to.len() + cli.cc.len() + cli.bcc.len(), "Message sent");
    Ok(())
}

/// Find the configuration file using the following precedence:
/// 1. `--config`
/// 2. `COURIER_CONFIG` environment variable
/// 3. ./courier.toml (current working directory)
/// 4. /etc/courier/courier.toml (system-wide config)
fn find_config_file(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        anyhow::bail!("--config points to non-existent file: {}", path.display());
    }

    if let Ok(env_path) = std::env::var("COURIER_CONFIG") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "COURIER_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        PathBuf::from("./courier.toml"),
        PathBuf::from("/etc/courier/courier.toml"),
    ];

    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - --config\n  - COURIER_CONFIG environment variable\n{paths_tried}"
    )
}
