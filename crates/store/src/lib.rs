//! Persistence for the manga chapter tracker.
//!
//! Stores uploaded chapter files, per-user delivery preferences, per-user
//! subscriptions, the last chapter seen for each manga, and manga names. The
//! backing store is SQLite (file or in-memory) or PostgreSQL, selected by the
//! connection string at startup.
//!
//! # Usage
//! ```no_run
//! use manga_store::Database;
//! use manga_store::models::{MangaName, Subscription, UserId};
//!
//! # async fn run() -> manga_store::error::Result<()> {
//! let db = Database::configure("sqlite://manga.db")?;
//! db.connect().await?;
//! let repo = db.repo();
//! let user = UserId::new("42")?;
//! repo.add(&Subscription { url: "https://example.com/m/1".into(), user_id: user.clone() }).await?;
//! repo.add(&MangaName { url: "https://example.com/m/1".into(), name: "Title".into() }).await?;
//! let names = repo.get_subs(&user).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//! - [`Database`] owns the connection pool and the schema. There is no global
//!   instance: build one at startup and clone it where needed.
//! - [`Repository`] runs the queries. Each call is one unit of work; writes
//!   are transactional and either fully apply or not at all.
//! - [`models`] holds the five row types. They share the sealed
//!   [`Record`](models::Record) trait, which the generic operations are
//!   written against.

mod db;
pub mod error;
pub mod models;
mod repo;
mod url;

pub use crate::db::Database;
pub use crate::repo::Repository;
pub use crate::url::{Backend, DEFAULT_URL, DatabaseUrl};
