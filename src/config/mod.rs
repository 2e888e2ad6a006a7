//! Configuration module.
//!
//! Every recognized option lives on an explicit [`Config`] struct with a
//! default; options can also be loaded from environment variables.

use std::env;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::utils::parse_duration;

/// Bot running mode.
///
/// Fixed when the bot is constructed: either an unbounded long-polling
/// loop or a webhook server handling one update per inbound request.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    Polling,
    Webhook,
}

impl Default for BotMode {
    fn default() -> Self {
        Self::Polling
    }
}

/// Transport backend selection.
///
/// `Pooled` keeps one connection-pooled HTTP client for the lifetime of
/// the API client and is required for deferred calls. `Simple` builds a
/// fresh client per call and holds no state between calls.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Pooled,
    Simple,
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Pooled
    }
}

/// Delay policy between failed attempts of the same call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffStrategy {
    /// Constant delay between attempts.
    Fixed(Duration),
    /// `base * 2^(attempt - 1)`, capped.
    Exponential { base: Duration, cap: Duration },
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(1))
    }
}

impl BackoffStrategy {
    /// Delay before retrying after `attempt` failed attempts (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match *self {
            Self::Fixed(delay) => delay,
            Self::Exponential { base, cap } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}

/// Client configuration.
///
/// Immutable after construction; consulted on every call. All fields are
/// optional with defaults; `Config::default()` yields a working setup
/// for the public Bot API.
#[derive(Debug, Clone)]
pub struct Config {
    /// Transport backend for outbound calls.
    pub transport: TransportKind,

    /// Timeout applied to each individual transport attempt, not to the
    /// overall retry sequence.
    pub timeout: Duration,

    /// Extra attempts after the first failed one. A budget of N makes a
    /// permanently failing call attempt exactly N+1 times.
    pub max_retries: u32,

    /// Delay policy between failed attempts.
    pub retry_backoff: BackoffStrategy,

    /// Reuse pooled connections between calls (ignored by `Simple`).
    pub keep_alive: bool,

    /// HTTP proxy, consulted before the SOCKS5 proxy. Credentials may be
    /// embedded as `user:pass@host:port`. A lexically invalid proxy is
    /// skipped with a warning rather than failing the call.
    pub http_proxy: Option<String>,

    /// SOCKS5 proxy, used only when no HTTP proxy applies.
    pub socks5_proxy: Option<String>,

    /// Verify upstream TLS certificates.
    pub verify_tls: bool,

    /// Process RSS ceiling in bytes. When exceeded, new outbound calls
    /// are refused; calls already in flight are unaffected.
    pub memory_limit: Option<u64>,

    /// Minimum wall-clock gap between two handler dispatches.
    pub min_update_spacing: Duration,

    /// Advisory upper bound on concurrently processed updates.
    pub max_concurrent_updates: usize,

    /// Log outgoing payloads at debug level.
    pub debug: bool,

    /// Webhook running mode vs. polling.
    pub bot_mode: BotMode,

    /// Port the webhook server binds to.
    pub webhook_port: u16,

    /// Secret compared against the `X-Telegram-Bot-Api-Secret-Token`
    /// header of inbound webhook requests.
    pub webhook_secret: Option<String>,

    /// Reject webhook requests originating outside the known upstream
    /// IP ranges.
    pub restrict_webhook_ips: bool,

    /// Time-to-live for processed update ids in the dedup store.
    pub dedup_ttl: Duration,

    /// API host, overridable for local Bot API servers.
    pub api_host: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            timeout: Duration::from_secs(30),
            max_retries: 0,
            retry_backoff: BackoffStrategy::default(),
            keep_alive: true,
            http_proxy: None,
            socks5_proxy: None,
            verify_tls: true,
            memory_limit: None,
            min_update_spacing: Duration::ZERO,
            max_concurrent_updates: 1,
            debug: false,
            bot_mode: BotMode::default(),
            webhook_port: 8443,
            webhook_secret: None,
            restrict_webhook_ips: true,
            dedup_ttl: Duration::from_secs(300),
            api_host: "api.telegram.org".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset variables keep their defaults. Malformed values fail with
    /// [`Error::Validation`] rather than being silently ignored.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Some(mode) = read_env("BOT_MODE") {
            config.bot_mode = match mode.to_lowercase().as_str() {
                "polling" => BotMode::Polling,
                "webhook" => BotMode::Webhook,
                other => {
                    return Err(Error::Validation(format!(
                        "BOT_MODE must be 'polling' or 'webhook', got '{other}'"
                    )));
                }
            };
        }

        if let Some(transport) = read_env("TRANSPORT") {
            config.transport = match transport.to_lowercase().as_str() {
                "pooled" => TransportKind::Pooled,
                "simple" => TransportKind::Simple,
                other => {
                    return Err(Error::Validation(format!(
                        "TRANSPORT must be 'pooled' or 'simple', got '{other}'"
                    )));
                }
            };
        }

        if let Some(timeout) = read_env("REQUEST_TIMEOUT") {
            config.timeout = parse_duration(&timeout).ok_or_else(|| {
                Error::Validation(format!("REQUEST_TIMEOUT is not a duration: '{timeout}'"))
            })?;
        }

        if let Some(retries) = read_env("MAX_RETRIES") {
            config.max_retries = retries.parse().map_err(|_| {
                Error::Validation(format!("MAX_RETRIES is not a number: '{retries}'"))
            })?;
        }

        if let Some(spacing) = read_env("MIN_UPDATE_SPACING") {
            config.min_update_spacing = parse_duration(&spacing).ok_or_else(|| {
                Error::Validation(format!("MIN_UPDATE_SPACING is not a duration: '{spacing}'"))
            })?;
        }

        if let Some(ttl) = read_env("DEDUP_TTL") {
            config.dedup_ttl = parse_duration(&ttl)
                .ok_or_else(|| Error::Validation(format!("DEDUP_TTL is not a duration: '{ttl}'")))?;
        }

        if let Some(limit) = read_env("MEMORY_LIMIT") {
            let bytes = limit.parse().map_err(|_| {
                Error::Validation(format!("MEMORY_LIMIT is not a byte count: '{limit}'"))
            })?;
            config.memory_limit = Some(bytes);
        }

        if let Some(port) = read_env("WEBHOOK_PORT") {
            config.webhook_port = port.parse().map_err(|_| {
                Error::Validation(format!("WEBHOOK_PORT is not a port number: '{port}'"))
            })?;
        }

        config.keep_alive = read_flag("KEEP_ALIVE", config.keep_alive)?;
        config.verify_tls = read_flag("VERIFY_TLS", config.verify_tls)?;
        config.debug = read_flag("DEBUG", config.debug)?;
        config.restrict_webhook_ips =
            read_flag("RESTRICT_WEBHOOK_IPS", config.restrict_webhook_ips)?;

        config.http_proxy = read_env("HTTP_PROXY");
        config.socks5_proxy = read_env("SOCKS5_PROXY");
        config.webhook_secret = read_env("WEBHOOK_SECRET");

        if let Some(host) = read_env("API_HOST") {
            config.api_host = host;
        }

        Ok(config)
    }
}

/// Read an environment variable, treating empty values as unset.
fn read_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a boolean flag, accepting true/false/1/0/yes/no.
fn read_flag(name: &str, default: bool) -> Result<bool> {
    match read_env(name) {
        None => Ok(default),
        Some(value) => match value.to_lowercase().as_str() {
            "true" | "1" | "yes" => Ok(true),
            "false" | "0" | "no" => Ok(false),
            other => Err(Error::Validation(format!(
                "{name} must be a boolean, got '{other}'"
            ))),
        },
    }
}
