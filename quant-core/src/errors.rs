//! Domain error taxonomy. Everything that can fail inside the core returns
//! one of these typed variants; `anyhow` is reserved for the process
//! boundary (`quant-bin`), never used inside the core itself.

use thiserror::Error;

/// Errors surfaced by a [`crate::venue::VenuePort`] call. Adapters are
/// responsible for mapping whatever the venue actually returns (HTTP
/// status, WS close frame, JSON error body) onto one of these variants at
/// a single `map_error` site — no string matching on messages anywhere
/// else in the core.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum VenueError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited, retry after {retry_after_ms:?}ms")]
    RateLimit { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    Auth,

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("post-only order would have crossed the book")]
    PostOnlyRejected,

    #[error("exchange error{}", code.map(|c| format!(" (code {c})")).unwrap_or_default())]
    ExchangeError { code: Option<i64> },

    #[error("unknown venue error: {0}")]
    Unknown(String),
}

impl VenueError {
    /// `true` for errors the tick loop should simply log and retry on the
    /// next tick without mutating tracker state (§7).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            VenueError::Network(_) | VenueError::ExchangeError { .. } | VenueError::PostOnlyRejected
        )
    }

    /// `true` for errors that count toward the persistent-auth-failure
    /// health threshold (§7, §4.9).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, VenueError::Auth)
    }
}

/// Fatal startup failures: config load, venue client construction. These
/// terminate the process via the shutdown path with exit code 1 (§6.5).
#[derive(Debug, Error)]
pub enum InitError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {name}: {value}")]
    InvalidEnvVar { name: String, value: String },

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to construct venue client: {0}")]
    VenueClient(String),
}

/// Internal invariant violations the reconciler guards against (§4.8,
/// §7). Never propagated to a caller as a `Result` — the tick loop reacts
/// to these inline by issuing an emergency cancel-all.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("{count} live orders exceeds the maximum of 2")]
    TooManyLiveOrders { count: usize },

    #[error("{count} live orders on {side:?} side exceeds the maximum of 1")]
    TooManyLiveOrdersOnSide { side: quant_strategy::Side, count: usize },
}
