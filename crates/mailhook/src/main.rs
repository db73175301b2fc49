//! mailhook command line.
//!
//! Polls a mailbox and logs every new email, or prints it as a JSON line
//! with `--json`.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mailhook::{ImapConnector, Listener, ListenerConfig, Security};

/// Poll an IMAP mailbox and report new emails.
#[derive(Debug, Parser)]
#[command(name = "mailhook", version, about)]
struct Cli {
    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Login address.
    #[arg(long, env = "MAILHOOK_ADDRESS")]
    address: Option<String>,

    /// Password or app password.
    #[arg(long, env = "MAILHOOK_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// IMAP server hostname.
    #[arg(long)]
    server: Option<String>,

    /// IMAP server port.
    #[arg(long)]
    port: Option<u16>,

    /// Connection security: tls, starttls or none.
    #[arg(long)]
    security: Option<Security>,

    /// Mailbox to poll.
    #[arg(long)]
    mailbox: Option<String>,

    /// Raw IMAP SEARCH criteria.
    #[arg(long)]
    criterion: Option<String>,

    /// Directory for saved attachments.
    #[arg(long)]
    download_dir: Option<PathBuf>,

    /// Accepted attachment extension (repeatable).
    #[arg(long = "ext")]
    extensions: Vec<String>,

    /// Seconds between poll cycles.
    #[arg(long, default_value_t = 5)]
    interval: u64,

    /// Print each email as a JSON line on stdout.
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Builds the listener configuration: file first, then flags.
    async fn listener_config(&self) -> anyhow::Result<ListenerConfig> {
        let mut config = match &self.config {
            Some(path) => ListenerConfig::load(path).await?,
            None => ListenerConfig::default(),
        };

        if let Some(address) = &self.address {
            config.address.clone_from(address);
        }
        if let Some(secret) = &self.secret {
            config.secret.clone_from(secret);
        }
        if let Some(server) = &self.server {
            config.server.clone_from(server);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(security) = self.security {
            config.security = security;
        }
        if let Some(mailbox) = &self.mailbox {
            config.mailbox.clone_from(mailbox);
        }
        if let Some(criterion) = &self.criterion {
            config.search_criterion.clone_from(criterion);
        }
        if let Some(dir) = &self.download_dir {
            config.download_dir.clone_from(dir);
        }
        if !self.extensions.is_empty() {
            config.accepted_extensions = mailhook::config::normalize_extensions(&self.extensions);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailhook=info,mailhook_imap=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = cli.listener_config().await?;

    info!(
        address = %config.address,
        server = %config.server,
        mailbox = %config.mailbox,
        "Starting mailhook"
    );

    let connector = ImapConnector::from_config(&config);
    let mut listener = Listener::new(config, connector)
        .await
        .context("cannot set up listener")?;

    if cli.json {
        listener.on_new_email(|email| {
            println!("{}", serde_json::to_string(email)?);
            Ok(())
        });
    } else {
        listener.on_new_email(|email| {
            info!(
                title = %email.title,
                sender = %email.sender,
                attachments = ?email.attachment_paths,
                "{}",
                email.body.lines().next().unwrap_or_default()
            );
            Ok(())
        });
    }

    let handle = listener.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, closing session");
            handle.interrupt();
        }
    });

    // An interrupt surfaces as `Error::UserStopped` and a non-zero exit.
    listener.start(Duration::from_secs(cli.interval)).await?;
    info!("Stopped");
    Ok(())
}
