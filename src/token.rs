//! Bearer-token lifecycle
//!
//! A [`Token`] is a plain value. [`ensure_fresh`] takes the current token and
//! returns the one to use, logging in again only when the current one is
//! missing or inside the refresh margin. Callers thread the returned token
//! into their requests instead of mutating a shared field.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{debug, info};

/// Expiry format used by the brokerage login endpoint, e.g. `Tue, 20 Dec 2022 15:04:05 GMT`
pub const EXPIRY_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Bearer token plus its expiration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    pub expires: DateTime<Utc>,
}

impl Token {
    pub fn new(access_token: impl Into<String>, expires: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires,
        }
    }

    /// Parse an expiry string in [`EXPIRY_FORMAT`]
    pub fn parse_expiry(raw: &str) -> Result<DateTime<Utc>> {
        NaiveDateTime::parse_from_str(raw.trim(), EXPIRY_FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(|e| anyhow!("Invalid token expiry '{}': {}", raw, e))
    }

    /// Expiry rendered back in [`EXPIRY_FORMAT`]
    pub fn format_expiry(&self) -> String {
        self.expires.format(EXPIRY_FORMAT).to_string()
    }

    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        self.expires - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

/// When to replace a token ahead of its expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    pub margin: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            margin: Duration::days(1),
        }
    }
}

impl RefreshPolicy {
    pub fn with_margin(margin: Duration) -> Self {
        Self { margin }
    }

    /// True once less than `margin` remains before expiry
    pub fn needs_refresh(&self, token: &Token, now: DateTime<Utc>) -> bool {
        token.remaining(now) < self.margin
    }
}

/// Something that can obtain a brand-new token
pub trait Login {
    fn login(&self) -> impl Future<Output = Result<Token>> + Send;
}

/// Return a token that is valid at `now` under `policy`
///
/// Calls `login` at most once.
pub async fn ensure_fresh<L: Login>(
    login: &L,
    current: Option<Token>,
    now: DateTime<Utc>,
    policy: RefreshPolicy,
) -> Result<Token> {
    match current {
        Some(token) if !policy.needs_refresh(&token, now) => {
            debug!(
                "Token still fresh, {} hours left",
                token.remaining(now).num_hours()
            );
            Ok(token)
        }
        Some(token) => {
            info!("Token expires at {}, refreshing", token.format_expiry());
            login.login().await
        }
        None => {
            info!("No cached token, logging in");
            login.login().await
        }
    }
}
