//! Server configuration read from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use availability_core::channel::DEFAULT_SPAN_CONTEXT_HEADER;
use availability_core::retry::RetryPolicy;
use availability_outbox::DispatcherConfig;

use crate::error::AppError;

/// Runtime configuration of the API server and its outbox dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Bind address.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Connection pool size.
    pub db_max_connections: u32,
    /// Interval between background outbox sweeps.
    pub outbox_poll_interval: Duration,
    /// Maximum entries claimed per sweep.
    pub outbox_batch_size: usize,
    /// Upper bound on one channel send.
    pub outbox_send_timeout: Duration,
    /// Claim lease.
    pub outbox_lease: Duration,
    /// Retention of dispatched entries.
    pub outbox_retention: Duration,
    /// Header and metadata slot carrying the span context.
    pub span_context_header: String,
    /// Reload-and-retry budget for concurrent command conflicts.
    pub command_max_retries: u32,
    /// OTLP collector endpoint; spans are exported only when set.
    pub otlp_endpoint: Option<String>,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a value
    /// cannot be parsed.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `DATABASE_URL` is missing or a value
    /// cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database_url = lookup("DATABASE_URL").ok_or_else(|| {
            AppError::Config("DATABASE_URL environment variable must be set".into())
        })?;

        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            database_url,
            host: text("HOST", "0.0.0.0"),
            port: parsed(&lookup, "PORT", 3000)?,
            db_max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            outbox_poll_interval: Duration::from_millis(parsed(
                &lookup,
                "OUTBOX_POLL_INTERVAL_MS",
                1000,
            )?),
            outbox_batch_size: parsed(&lookup, "OUTBOX_BATCH_SIZE", 100)?,
            outbox_send_timeout: Duration::from_millis(parsed(
                &lookup,
                "OUTBOX_SEND_TIMEOUT_MS",
                5000,
            )?),
            outbox_lease: Duration::from_secs(parsed(&lookup, "OUTBOX_LEASE_SECS", 30)?),
            outbox_retention: Duration::from_secs(
                parsed::<u64>(&lookup, "OUTBOX_RETENTION_HOURS", 168)?.saturating_mul(60 * 60),
            ),
            span_context_header: text("SPAN_CONTEXT_HEADER", DEFAULT_SPAN_CONTEXT_HEADER),
            command_max_retries: parsed(&lookup, "COMMAND_MAX_RETRIES", 3)?,
            otlp_endpoint: lookup("OTEL_EXPORTER_OTLP_ENDPOINT").filter(|v| !v.trim().is_empty()),
        })
    }

    /// Address the server binds to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `HOST:PORT` is not a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr, AppError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))
    }

    /// Retry policy for command handlers.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_retries(self.command_max_retries)
    }

    /// Dispatcher settings.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            batch_size: self.outbox_batch_size,
            send_timeout: self.outbox_send_timeout,
            lease: self.outbox_lease,
            retention: self.outbox_retention,
            poll_interval: self.outbox_poll_interval,
            span_context_header: self.span_context_header.clone(),
            ..DispatcherConfig::default()
        }
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("{key} is invalid: {e}"))),
    }
}
