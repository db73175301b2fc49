//! Listener configuration.
//!
//! A [`ListenerConfig`] is either built in code with
//! [`ListenerConfig::builder`] or read from a JSON file:
//!
//! ```json
//! {
//!   "address": "ivan@mail.ru",
//!   "secret": "app password",
//!   "accepted_extensions": ["pdf", ".ZIP", ".xlsx"],
//!   "failure_policy": { "kind": "retry", "attempts": 2, "backoff_ms": 500 }
//! }
//! ```
//!
//! Every field except the credentials has a default.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Default IMAP server.
pub const DEFAULT_SERVER: &str = "imap.mail.ru";

/// Default IMAP port (implicit TLS).
pub const DEFAULT_PORT: u16 = 993;

/// Extensions accepted when none are configured.
pub const DEFAULT_EXTENSIONS: [&str; 2] = [".pdf", ".zip"];

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Security/encryption mode for the server connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Security {
    /// No encryption (not recommended).
    None,
    /// Implicit TLS (connect directly with TLS).
    #[default]
    Tls,
    /// STARTTLS upgrade after plaintext connect.
    StartTls,
}

impl From<Security> for mailhook_imap::Security {
    fn from(security: Security) -> Self {
        match security {
            Security::None => Self::None,
            Security::Tls => Self::Implicit,
            Security::StartTls => Self::StartTls,
        }
    }
}

impl FromStr for Security {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "plain" => Ok(Self::None),
            "tls" | "ssl" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            other => Err(format!("unknown security mode: {other}")),
        }
    }
}

/// What to do when a select, search or fetch fails mid-cycle.
///
/// Connecting and authenticating are never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// End the run with the step's error.
    #[default]
    Abort,
    /// Retry the step before giving up.
    Retry {
        /// Retries after the first failure.
        attempts: u32,
        /// Pause between tries.
        #[serde(rename = "backoff_ms", deserialize_with = "millis::deserialize")]
        backoff: Duration,
    },
}

/// How handler errors affect the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerFailure {
    /// The first failing handler ends the run.
    #[default]
    Propagate,
    /// Failures are logged and the remaining handlers still run.
    Isolate,
}

/// Immutable settings for one [`crate::Listener`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Login name, usually the full email address.
    pub address: String,
    /// Password or app password.
    pub secret: String,
    /// IMAP server hostname.
    pub server: String,
    /// IMAP server port.
    pub port: u16,
    /// Connection security.
    pub security: Security,
    /// Mailbox to poll.
    pub mailbox: String,
    /// Raw IMAP SEARCH criteria.
    pub search_criterion: String,
    /// Where accepted attachments are written.
    pub download_dir: PathBuf,
    /// Lowercase extensions with a leading dot.
    #[serde(deserialize_with = "extensions::deserialize")]
    pub accepted_extensions: Vec<String>,
    /// Handling of failed protocol steps.
    pub failure_policy: FailurePolicy,
    /// Handling of failed handlers.
    pub handler_failure: HandlerFailure,
    /// Limit for connecting and reading the greeting.
    #[serde(rename = "connect_timeout_secs", deserialize_with = "secs::deserialize")]
    pub connect_timeout: Duration,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            secret: String::new(),
            server: DEFAULT_SERVER.to_string(),
            port: DEFAULT_PORT,
            security: Security::default(),
            mailbox: "INBOX".to_string(),
            search_criterion: "UNSEEN".to_string(),
            download_dir: default_download_dir(),
            accepted_extensions: normalize_extensions(Vec::<String>::new()),
            failure_policy: FailurePolicy::default(),
            handler_failure: HandlerFailure::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl fmt::Debug for ListenerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerConfig")
            .field("address", &self.address)
            .field("secret", &"[REDACTED]")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("security", &self.security)
            .field("mailbox", &self.mailbox)
            .field("search_criterion", &self.search_criterion)
            .field("download_dir", &self.download_dir)
            .field("accepted_extensions", &self.accepted_extensions)
            .field("failure_policy", &self.failure_policy)
            .field("handler_failure", &self.handler_failure)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

impl ListenerConfig {
    /// Starts a builder with the given credentials and defaults elsewhere.
    #[must_use]
    pub fn builder(address: impl Into<String>, secret: impl Into<String>) -> ListenerConfigBuilder {
        ListenerConfigBuilder::new(address, secret)
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the JSON is malformed.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reads a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;

        let config = Self::from_json_str(&contents)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Checks the fields a listener cannot run without.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(Error::Config("address is required".to_string()));
        }
        if self.server.trim().is_empty() {
            return Err(Error::Config("server is required".to_string()));
        }
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if !is_command_safe(&self.mailbox) {
            return Err(Error::Config(format!(
                "invalid mailbox name: {:?}",
                self.mailbox
            )));
        }
        if !is_command_safe(&self.search_criterion) {
            return Err(Error::Config(format!(
                "invalid search criterion: {:?}",
                self.search_criterion
            )));
        }
        if let FailurePolicy::Retry { attempts: 0, .. } = self.failure_policy {
            return Err(Error::Config(
                "retry policy needs at least one attempt".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`ListenerConfig`].
#[derive(Debug, Clone)]
pub struct ListenerConfigBuilder {
    config: ListenerConfig,
}

impl ListenerConfigBuilder {
    /// Creates a builder with the given credentials.
    #[must_use]
    pub fn new(address: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            config: ListenerConfig {
                address: address.into(),
                secret: secret.into(),
                ..ListenerConfig::default()
            },
        }
    }

    /// Sets the server hostname.
    #[must_use]
    pub fn server(mut self, server: impl Into<String>) -> Self {
        self.config.server = server.into();
        self
    }

    /// Sets the server port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets the connection security.
    #[must_use]
    pub const fn security(mut self, security: Security) -> Self {
        self.config.security = security;
        self
    }

    /// Sets the mailbox to poll.
    #[must_use]
    pub fn mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.config.mailbox = mailbox.into();
        self
    }

    /// Sets the raw SEARCH criteria.
    #[must_use]
    pub fn search_criterion(mut self, criterion: impl Into<String>) -> Self {
        self.config.search_criterion = criterion.into();
        self
    }

    /// Sets the attachment directory.
    #[must_use]
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.download_dir = dir.into();
        self
    }

    /// Sets the accepted attachment extensions.
    ///
    /// An empty list restores the defaults.
    #[must_use]
    pub fn accepted_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: AsRef<str>,
    {
        self.config.accepted_extensions = normalize_extensions(extensions);
        self
    }

    /// Sets the failure policy for protocol steps.
    #[must_use]
    pub const fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Sets the handler failure mode.
    #[must_use]
    pub const fn handler_failure(mut self, mode: HandlerFailure) -> Self {
        self.config.handler_failure = mode;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ListenerConfig {
        self.config
    }
}

/// Lowercases extensions and prefixes a dot where missing.
///
/// Blank entries are dropped; an empty result falls back to
/// [`DEFAULT_EXTENSIONS`].
pub fn normalize_extensions<I, E>(extensions: I) -> Vec<String>
where
    I: IntoIterator<Item = E>,
    E: AsRef<str>,
{
    let mut normalized: Vec<String> = Vec::new();
    for ext in extensions {
        let ext = ext.as_ref().trim().to_lowercase();
        if ext.is_empty() || ext == "." {
            continue;
        }
        let ext = if ext.starts_with('.') {
            ext
        } else {
            format!(".{ext}")
        };
        if !normalized.contains(&ext) {
            normalized.push(ext);
        }
    }

    if normalized.is_empty() {
        DEFAULT_EXTENSIONS.iter().map(|e| (*e).to_string()).collect()
    } else {
        normalized
    }
}

/// Non-blank and free of line breaks, so it can be sent as one command line.
fn is_command_safe(value: &str) -> bool {
    !value.trim().is_empty() && !value.contains(['\r', '\n'])
}

fn default_download_dir() -> PathBuf {
    dirs::data_dir().map_or_else(
        || PathBuf::from("downloads"),
        |dir| dir.join("mailhook").join("downloads"),
    )
}

mod extensions {
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Vec<String>>::deserialize(deserializer)?;
        Ok(super::normalize_extensions(raw.unwrap_or_default()))
    }
}

mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ListenerConfig::builder("ivan@mail.ru", "pw").build();
        assert_eq!(config.server, "imap.mail.ru");
        assert_eq!(config.port, 993);
        assert_eq!(config.security, Security::Tls);
        assert_eq!(config.mailbox, "INBOX");
        assert_eq!(config.search_criterion, "UNSEEN");
        assert_eq!(config.accepted_extensions, vec![".pdf", ".zip"]);
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.handler_failure, HandlerFailure::Propagate);
        assert!(config.download_dir.ends_with("downloads"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_normalize_extensions() {
        assert_eq!(
            normalize_extensions(["PDF", ".Zip", " xlsx ", "", "pdf"]),
            vec![".pdf", ".zip", ".xlsx"]
        );
        assert_eq!(normalize_extensions(["  ", "."]), vec![".pdf", ".zip"]);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = ListenerConfig::builder("ivan@mail.ru", "hunter2").build();
        let debug = format!("{config:?}");
        assert!(debug.contains("ivan@mail.ru"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_from_json() {
        let config = ListenerConfig::from_json_str(
            r#"{
                "address": "ivan@mail.ru",
                "secret": "pw",
                "security": "starttls",
                "port": 143,
                "accepted_extensions": ["DOCX"],
                "failure_policy": { "kind": "retry", "attempts": 2, "backoff_ms": 250 },
                "handler_failure": "isolate",
                "connect_timeout_secs": 5
            }"#,
        )
        .unwrap();

        assert_eq!(config.security, Security::StartTls);
        assert_eq!(config.port, 143);
        assert_eq!(config.server, DEFAULT_SERVER);
        assert_eq!(config.accepted_extensions, vec![".docx"]);
        assert_eq!(
            config.failure_policy,
            FailurePolicy::Retry {
                attempts: 2,
                backoff: Duration::from_millis(250),
            }
        );
        assert_eq!(config.handler_failure, HandlerFailure::Isolate);
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = ListenerConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate() {
        let base = ListenerConfig::builder("ivan@mail.ru", "pw");

        assert!(ListenerConfig::builder("", "pw").build().validate().is_err());
        assert!(base.clone().port(0).build().validate().is_err());
        assert!(base.clone().mailbox("").build().validate().is_err());
        assert!(
            base.clone()
                .search_criterion("UNSEEN\r\nA1 LOGOUT")
                .build()
                .validate()
                .is_err()
        );
        assert!(
            base.clone()
                .failure_policy(FailurePolicy::Retry {
                    attempts: 0,
                    backoff: Duration::ZERO,
                })
                .build()
                .validate()
                .is_err()
        );
        assert!(base.search_criterion("FROM \"bank\" UNSEEN").build().validate().is_ok());
    }

    #[test]
    fn test_security_from_str() {
        assert_eq!("TLS".parse::<Security>().unwrap(), Security::Tls);
        assert_eq!("starttls".parse::<Security>().unwrap(), Security::StartTls);
        assert_eq!("none".parse::<Security>().unwrap(), Security::None);
        assert!("smoke".parse::<Security>().is_err());
        assert_eq!(
            mailhook_imap::Security::from(Security::Tls),
            mailhook_imap::Security::Implicit
        );
    }
}
