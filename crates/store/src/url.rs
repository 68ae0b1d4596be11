//! Connection string normalization.
//!
//! Connection strings written for other toolkits often name a specific driver
//! in the scheme (`postgresql+asyncpg://`, `sqlite+aiosqlite://`). sqlx picks
//! its async driver from the base scheme alone, so the driver suffix is
//! stripped and the base scheme canonicalized.

use crate::error::{ErrorKind, Result};
use derive_more::Display;
use std::str::FromStr;

/// Used when no connection string is configured.
pub const DEFAULT_URL: &str = "sqlite://manga.db";

/// Backing store family, as determined by the connection string scheme.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum Backend {
    #[display("postgres")]
    Postgres,
    #[display("sqlite")]
    Sqlite,
    /// Unrecognized scheme, handed to sqlx untouched.
    #[display("other")]
    Other,
}

/// A normalized connection string, ready to hand to the sqlx `Any` driver.
#[derive(Clone, Debug, Display, Eq, PartialEq)]
#[display("{url}")]
pub struct DatabaseUrl {
    backend: Backend,
    url: String,
}

impl DatabaseUrl {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Whether this points at a SQLite database that only lives in memory.
    pub fn is_in_memory(&self) -> bool {
        self.backend == Backend::Sqlite && (self.url.contains(":memory:") || self.url.contains("mode=memory"))
    }

    pub(crate) fn in_memory() -> Self {
        Self {
            backend: Backend::Sqlite,
            url: "sqlite::memory:".to_string(),
        }
    }
}

impl Default for DatabaseUrl {
    fn default() -> Self {
        // The default is a well-formed sqlite URL; normalization cannot fail.
        DEFAULT_URL.parse().unwrap_or_else(|_| Self {
            backend: Backend::Sqlite,
            url: format!("{DEFAULT_URL}?mode=rwc"),
        })
    }
}

impl FromStr for DatabaseUrl {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            exn::bail!(ErrorKind::InvalidUrl(s.to_string()));
        }
        let Some((scheme, rest)) = s.split_once(':') else {
            exn::bail!(ErrorKind::InvalidUrl(s.to_string()));
        };
        // "postgresql+asyncpg" -> "postgresql"
        let base = scheme.split_once('+').map_or(scheme, |(base, _driver)| base).to_ascii_lowercase();
        let normalized = match base.as_str() {
            "postgres" | "postgresql" => Self {
                backend: Backend::Postgres,
                url: format!("postgres:{rest}"),
            },
            "sqlite" => Self {
                backend: Backend::Sqlite,
                url: with_create_mode(sqlite_path(rest)),
            },
            _ => Self {
                backend: Backend::Other,
                url: s.to_string(),
            },
        };
        Ok(normalized)
    }
}

/// `sqlite:///rel.db` names a file relative to the working directory and
/// `sqlite:////abs.db` an absolute one. sqlx treats everything after
/// `sqlite://` as the path, so one slash is dropped from the triple-slash form.
fn sqlite_path(rest: &str) -> String {
    match rest.strip_prefix("///") {
        Some(path) => format!("sqlite://{path}"),
        None => format!("sqlite:{rest}"),
    }
}

/// File-backed SQLite databases are created on first use unless the caller
/// asked for a specific open mode.
fn with_create_mode(url: String) -> String {
    if url.contains(":memory:") || url.contains("mode=") {
        return url;
    }
    match url.contains('?') {
        true => format!("{url}&mode=rwc"),
        false => format!("{url}?mode=rwc"),
    }
}
