//! Command-line configuration.

use std::{path::PathBuf, time::Duration};

use clap::{ArgGroup, Parser};
use rendezvous_app::RuntimeConfig;
use rendezvous_client::{ReconcilerConfig, SessionConfig};
use rendezvous_core::{AuthToken, ConnectionConfig};
use rendezvous_proto::ConversationId;
use thiserror::Error;
use url::Url;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A URL argument did not parse
    #[error("invalid {field}: {reason}")]
    InvalidUrl {
        /// Argument name
        field: &'static str,
        /// Parse failure
        reason: String,
    },

    /// Chat path must be absolute
    #[error("chat path must start with '/': {0}")]
    InvalidPath(String),

    /// Neither a conversation nor a user was given
    #[error("one of --conversation or --with-user is required")]
    MissingTarget,
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "rendezvous")]
#[command(about = "Terminal chat client for a Rendezvous messaging server")]
#[command(version)]
#[command(group(ArgGroup::new("target").required(true).args(["conversation", "with_user"])))]
pub struct Args {
    /// REST API base URL
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub api_url: String,

    /// WebSocket base URL
    #[arg(long, default_value = "ws://127.0.0.1:8000")]
    pub ws_url: String,

    /// Chat endpoint path on the WebSocket host
    #[arg(long, default_value = rendezvous_client::DEFAULT_CHAT_PATH)]
    pub chat_path: String,

    /// REST request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,

    /// JSON file holding the bearer token
    #[arg(long, default_value = "rendezvous-token.json")]
    pub token_file: PathBuf,

    /// Store this token before connecting
    #[arg(long, env = "RENDEZVOUS_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Conversation to open
    #[arg(long)]
    pub conversation: Option<u64>,

    /// Open the one-to-one conversation with this user
    #[arg(long)]
    pub with_user: Option<u64>,

    /// Local user id, used to recognise own messages when the server omits
    /// `is_sender`
    #[arg(long)]
    pub self_id: Option<u64>,

    /// Reconnect attempts before giving up
    #[arg(long, default_value_t = rendezvous_core::MAX_RECONNECT_ATTEMPTS)]
    pub max_reconnect_attempts: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Which conversation to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// A known conversation id
    Conversation(ConversationId),
    /// Look up the conversation with a user
    User(u64),
}

/// Validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST API base
    pub api_url: String,
    /// REST request timeout
    pub api_timeout: Duration,
    /// Token file
    pub token_file: PathBuf,
    /// Token to store before connecting
    pub seed_token: Option<AuthToken>,
    /// Conversation to open
    pub target: Target,
    /// Runtime tunables
    pub runtime: RuntimeConfig,
}

impl ClientConfig {
    /// Validate parsed arguments.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        check_url("api-url", &args.api_url, &["http", "https"])?;
        check_url("ws-url", &args.ws_url, &["ws", "wss"])?;
        if !args.chat_path.starts_with('/') {
            return Err(ConfigError::InvalidPath(args.chat_path));
        }

        let target = match (args.conversation, args.with_user) {
            (Some(id), _) => Target::Conversation(ConversationId(id)),
            (None, Some(user)) => Target::User(user),
            (None, None) => return Err(ConfigError::MissingTarget),
        };

        let runtime = RuntimeConfig {
            connection: ConnectionConfig {
                base_url: args.ws_url,
                max_reconnect_attempts: args.max_reconnect_attempts,
                ..ConnectionConfig::default()
            },
            session: SessionConfig { path: args.chat_path, ..SessionConfig::default() },
            reconciler: ReconcilerConfig { self_id: args.self_id, ..ReconcilerConfig::default() },
        };

        Ok(Self {
            api_url: args.api_url,
            api_timeout: Duration::from_secs(args.timeout_secs),
            token_file: args.token_file,
            seed_token: args.token.filter(|t| !t.is_empty()).map(AuthToken::new),
            target,
            runtime,
        })
    }
}

fn check_url(field: &'static str, value: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl { field, reason: e.to_string() })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::InvalidUrl {
            field,
            reason: format!("scheme must be one of {schemes:?}, got {:?}", url.scheme()),
        });
    }
    Ok(())
}
