//! Data access for every table in the store.
//!
//! Writes each run in their own transaction: the transaction guard rolls back
//! when dropped, so an early return through `?` never leaves a partial write
//! behind. Reads go straight to a pooled connection.

use crate::Database;
use crate::error::{Result, SqlxResultExt};
use crate::models::{ChapterFile, MangaName, Record, Table, UserId};
use sqlx::AnyPool;
use sqlx::any::Any;
use tracing::instrument;

/// Repository for every entity in the store.
///
/// Generic operations work over any [`Record`] type, e.g.
/// `repo.get::<MangaName>("https://example.com/manga/1")`. The remaining
/// methods are the lookups that need a join or a multi-column filter.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: AnyPool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone() }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Generic
    // =========================================================================

    /// Insert a new row.
    ///
    /// Returns [`ErrorKind::Conflict`](crate::error::ErrorKind::Conflict) if a
    /// row with the same primary key already exists; the existing row is left
    /// untouched.
    #[instrument(level = "debug", skip_all, fields(table = %R::TABLE))]
    pub async fn add<R: Record>(&self, record: &R) -> Result<()> {
        let mut tx = self.pool.begin().await.or_classify(None)?;
        record
            .bind_values(sqlx::query::<Any>(R::INSERT))
            .execute(&mut *tx)
            .await
            .or_classify(Some(R::TABLE))?;
        tx.commit().await.or_classify(Some(R::TABLE))?;
        tracing::debug!("record added");
        Ok(())
    }

    /// Fetch one row by primary key.
    ///
    /// The key is a single value for most tables, and `(url, user_id)` for
    /// [`Subscription`](crate::models::Subscription).
    #[instrument(level = "debug", skip_all, fields(table = %R::TABLE))]
    pub async fn get<R: Record>(&self, key: impl Into<R::Key>) -> Result<Option<R>> {
        R::bind_key(key.into(), sqlx::query_as::<Any, R>(R::SELECT))
            .fetch_optional(&self.pool)
            .await
            .or_classify(Some(R::TABLE))
    }

    /// Fetch every row of a table, ordered by primary key.
    ///
    /// There is no pagination: only use this on tables that stay small.
    #[instrument(level = "debug", skip_all, fields(table = %R::TABLE))]
    pub async fn get_all<R: Record>(&self) -> Result<Vec<R>> {
        sqlx::query_as::<Any, R>(R::SELECT_ALL)
            .fetch_all(&self.pool)
            .await
            .or_classify(Some(R::TABLE))
    }

    /// Delete the row with the same primary key as `record`.
    ///
    /// Returns `true` if a row was deleted, `false` if there was nothing to
    /// delete (which is not an error).
    #[instrument(level = "debug", skip_all, fields(table = %R::TABLE))]
    pub async fn erase<R: Record>(&self, record: &R) -> Result<bool> {
        let mut tx = self.pool.begin().await.or_classify(None)?;
        let result = R::bind_key(record.key(), sqlx::query::<Any>(R::DELETE))
            .execute(&mut *tx)
            .await
            .or_classify(Some(R::TABLE))?;
        tx.commit().await.or_classify(Some(R::TABLE))?;
        tracing::debug!(deleted = result.rows_affected(), "record erased");
        Ok(result.rows_affected() > 0)
    }

    /// Delete any row with the same primary key as `record`, then insert it,
    /// in a single transaction.
    ///
    /// Readers see either the old row or the new one, never neither.
    #[instrument(level = "debug", skip_all, fields(table = %R::TABLE))]
    pub async fn replace<R: Record>(&self, record: &R) -> Result<()> {
        let mut tx = self.pool.begin().await.or_classify(None)?;
        R::bind_key(record.key(), sqlx::query::<Any>(R::DELETE))
            .execute(&mut *tx)
            .await
            .or_classify(Some(R::TABLE))?;
        record
            .bind_values(sqlx::query::<Any>(R::INSERT))
            .execute(&mut *tx)
            .await
            .or_classify(Some(R::TABLE))?;
        tx.commit().await.or_classify(Some(R::TABLE))?;
        tracing::debug!("record replaced");
        Ok(())
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Find a chapter file by any identifier an upload target handed out for
    /// it: the document's unique id, the CBZ's unique id, or the telegraph url.
    ///
    /// If several rows match, the one with the lowest `url` wins.
    #[instrument(level = "debug", skip_all)]
    pub async fn get_chapter_file_by_id(&self, id: impl AsRef<str>) -> Result<Option<ChapterFile>> {
        sqlx::query_as::<Any, ChapterFile>(include_str!("../queries/get_chapter_file_by_id.sql"))
            .bind(id.as_ref())
            .fetch_optional(&self.pool)
            .await
            .or_classify(Some(Table::ChapterFile))
    }

    /// Names of every manga the user is subscribed to, ordered by url.
    ///
    /// Subscriptions to a url with no [`MangaName`] row are left out.
    #[instrument(level = "debug", skip_all, fields(user_id = %user_id))]
    pub async fn get_subs(&self, user_id: &UserId) -> Result<Vec<MangaName>> {
        sqlx::query_as::<Any, MangaName>(include_str!("../queries/get_subs.sql"))
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .or_classify(Some(Table::Subscription))
    }

    /// Remove every subscription the user has.
    ///
    /// Manga names and last chapters are not touched. Returns the number of
    /// subscriptions removed.
    #[instrument(level = "debug", skip_all, fields(user_id = %user_id))]
    pub async fn erase_subs(&self, user_id: &UserId) -> Result<u64> {
        let mut tx = self.pool.begin().await.or_classify(None)?;
        let result = sqlx::query::<Any>(include_str!("../queries/erase_subs.sql"))
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .or_classify(Some(Table::Subscription))?;
        tx.commit().await.or_classify(Some(Table::Subscription))?;
        tracing::debug!(deleted = result.rows_affected(), "subscriptions erased");
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{LastChapter, MangaOutput, Subscription};
    use std::collections::HashSet;

    async fn repo() -> (Database, Repository) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = db.repo();
        (db, repo)
    }

    fn chapter(url: &str, suffix: &str) -> ChapterFile {
        ChapterFile {
            url: url.to_string(),
            file_id: format!("f{suffix}"),
            file_unique_id: format!("fu{suffix}"),
            cbz_id: format!("c{suffix}"),
            cbz_unique_id: format!("cu{suffix}"),
            telegraph_url: format!("t{suffix}"),
        }
    }

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn subscription(url: &str, user_id: &str) -> Subscription {
        Subscription {
            url: url.to_string(),
            user_id: user(user_id),
        }
    }

    fn name(url: &str, name: &str) -> MangaName {
        MangaName {
            url: url.to_string(),
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_add_and_get_every_table() {
        let (db, repo) = repo().await;

        let file = chapter("u1", "1");
        repo.add(&file).await.unwrap();
        assert_eq!(repo.get::<ChapterFile>("u1").await.unwrap(), Some(file));

        let output = MangaOutput {
            user_id: user("42"),
            output: 4,
        };
        repo.add(&output).await.unwrap();
        assert_eq!(repo.get::<MangaOutput>(user("42")).await.unwrap(), Some(output));

        let sub = subscription("m1", "42");
        repo.add(&sub).await.unwrap();
        assert_eq!(
            repo.get::<Subscription>(("m1".to_string(), user("42"))).await.unwrap(),
            Some(sub)
        );

        let last = LastChapter {
            url: "m1".to_string(),
            chapter_url: "m1/c10".to_string(),
        };
        repo.add(&last).await.unwrap();
        assert_eq!(repo.get::<LastChapter>("m1").await.unwrap(), Some(last));

        let title = name("m1", "Title");
        repo.add(&title).await.unwrap();
        assert_eq!(repo.get::<MangaName>("m1").await.unwrap(), Some(title));

        db.close().await;
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (db, repo) = repo().await;
        assert_eq!(repo.get::<ChapterFile>("missing").await.unwrap(), None);
        assert_eq!(repo.get::<MangaOutput>(user("1")).await.unwrap(), None);
        assert_eq!(
            repo.get::<Subscription>(("m1".to_string(), user("1"))).await.unwrap(),
            None
        );
        db.close().await;
    }

    #[tokio::test]
    async fn test_add_duplicate_is_conflict() {
        let (db, repo) = repo().await;
        let original = name("m1", "Original");
        repo.add(&original).await.unwrap();

        let err = repo.add(&name("m1", "Impostor")).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Conflict(Table::MangaName)));
        assert!(!err.is_retryable());
        assert_eq!(repo.get::<MangaName>("m1").await.unwrap(), Some(original));

        // Composite keys only collide when every column matches.
        repo.add(&subscription("m1", "1")).await.unwrap();
        repo.add(&subscription("m1", "2")).await.unwrap();
        repo.add(&subscription("m2", "1")).await.unwrap();
        let err = repo.add(&subscription("m1", "1")).await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Conflict(Table::Subscription)));
        assert_eq!(repo.get_all::<Subscription>().await.unwrap().len(), 3);

        db.close().await;
    }

    #[tokio::test]
    async fn test_erase() {
        let (db, repo) = repo().await;
        repo.add(&name("m1", "One")).await.unwrap();
        repo.add(&name("m2", "Two")).await.unwrap();

        assert!(repo.erase(&name("m1", "ignored, only the key matters")).await.unwrap());
        assert_eq!(repo.get::<MangaName>("m1").await.unwrap(), None);
        // Erasing again is a no-op.
        assert!(!repo.erase(&name("m1", "One")).await.unwrap());
        assert!(!repo.erase(&name("nope", "Nope")).await.unwrap());
        assert_eq!(repo.get_all::<MangaName>().await.unwrap(), vec![name("m2", "Two")]);

        db.close().await;
    }

    #[tokio::test]
    async fn test_get_all() {
        let (db, repo) = repo().await;
        assert!(repo.get_all::<ChapterFile>().await.unwrap().is_empty());

        let files = ["u3", "u1", "u2"].map(|url| chapter(url, url));
        for file in &files {
            repo.add(file).await.unwrap();
        }
        let stored = repo.get_all::<ChapterFile>().await.unwrap();
        assert_eq!(stored.len(), files.len());
        assert_eq!(
            stored.into_iter().collect::<HashSet<_>>(),
            files.into_iter().collect::<HashSet<_>>()
        );

        db.close().await;
    }

    #[tokio::test]
    async fn test_replace() {
        let (db, repo) = repo().await;
        let first = LastChapter {
            url: "m1".to_string(),
            chapter_url: "m1/c1".to_string(),
        };
        // Works when there is nothing to replace yet.
        repo.replace(&first).await.unwrap();
        assert_eq!(repo.get::<LastChapter>("m1").await.unwrap(), Some(first));

        let second = LastChapter {
            url: "m1".to_string(),
            chapter_url: "m1/c2".to_string(),
        };
        repo.replace(&second).await.unwrap();
        assert_eq!(repo.get_all::<LastChapter>().await.unwrap(), vec![second]);

        db.close().await;
    }

    #[tokio::test]
    async fn test_get_chapter_file_by_id() {
        let (db, repo) = repo().await;
        let file = ChapterFile {
            url: "u1".to_string(),
            file_id: "f1".to_string(),
            file_unique_id: "fu1".to_string(),
            cbz_id: "c1".to_string(),
            cbz_unique_id: "cu1".to_string(),
            telegraph_url: "t1".to_string(),
        };
        repo.add(&file).await.unwrap();

        for id in ["fu1", "cu1", "t1"] {
            assert_eq!(repo.get_chapter_file_by_id(id).await.unwrap().as_ref(), Some(&file));
        }
        // Only the three unique identifiers are searched.
        assert_eq!(repo.get_chapter_file_by_id("f1").await.unwrap(), None);
        assert_eq!(repo.get_chapter_file_by_id("c1").await.unwrap(), None);
        assert_eq!(repo.get_chapter_file_by_id("u1").await.unwrap(), None);
        assert_eq!(repo.get_chapter_file_by_id("nope").await.unwrap(), None);

        db.close().await;
    }

    #[tokio::test]
    async fn test_get_chapter_file_by_id_prefers_lowest_url() {
        let (db, repo) = repo().await;
        let mut later = chapter("u2", "x");
        later.telegraph_url = "shared".to_string();
        let mut earlier = chapter("u1", "y");
        earlier.cbz_unique_id = "shared".to_string();
        repo.add(&later).await.unwrap();
        repo.add(&earlier).await.unwrap();

        assert_eq!(repo.get_chapter_file_by_id("shared").await.unwrap(), Some(earlier));

        db.close().await;
    }

    #[tokio::test]
    async fn test_subscriptions() {
        let (db, repo) = repo().await;
        repo.add(&subscription("m1", "42")).await.unwrap();
        repo.add(&name("m1", "Title")).await.unwrap();

        assert_eq!(repo.get_subs(&user("42")).await.unwrap(), vec![name("m1", "Title")]);

        assert_eq!(repo.erase_subs(&user("42")).await.unwrap(), 1);
        assert!(repo.get_subs(&user("42")).await.unwrap().is_empty());
        // No cascade.
        assert_eq!(repo.get::<MangaName>("m1").await.unwrap(), Some(name("m1", "Title")));

        db.close().await;
    }

    #[tokio::test]
    async fn test_subscriptions_are_per_user() {
        let (db, repo) = repo().await;
        for (url, title) in [("m1", "One"), ("m2", "Two"), ("m3", "Three")] {
            repo.add(&name(url, title)).await.unwrap();
        }
        repo.add(&subscription("m2", "1")).await.unwrap();
        repo.add(&subscription("m1", "1")).await.unwrap();
        repo.add(&subscription("m3", "2")).await.unwrap();
        // Subscribed, but the name was never stored.
        repo.add(&subscription("m4", "1")).await.unwrap();
        let last = LastChapter {
            url: "m1".to_string(),
            chapter_url: "m1/c1".to_string(),
        };
        repo.add(&last).await.unwrap();

        assert_eq!(
            repo.get_subs(&user("1")).await.unwrap(),
            vec![name("m1", "One"), name("m2", "Two")]
        );
        assert!(repo.get_subs(&user("3")).await.unwrap().is_empty());

        assert_eq!(repo.erase_subs(&user("1")).await.unwrap(), 3);
        assert_eq!(repo.erase_subs(&user("1")).await.unwrap(), 0);
        assert_eq!(repo.get_subs(&user("2")).await.unwrap(), vec![name("m3", "Three")]);
        assert_eq!(repo.get_all::<MangaName>().await.unwrap().len(), 3);
        assert_eq!(repo.get::<LastChapter>("m1").await.unwrap(), Some(last));

        db.close().await;
    }

    #[tokio::test]
    async fn test_invalid_user_id_in_table_is_rejected_on_read() {
        let (db, repo) = repo().await;
        // Bypass the typed API to simulate a row written by something else.
        sqlx::query("INSERT INTO mangaoutput (user_id, output) VALUES ('abc', 1)")
            .execute(db.pool())
            .await
            .unwrap();
        let err = repo.get_all::<MangaOutput>().await.unwrap_err();
        assert!(matches!(*err, ErrorKind::Database));

        db.close().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_writes_on_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:///{}", dir.path().join("manga.db").display());
        let db = Database::configure(url).unwrap();
        db.connect().await.unwrap();
        let repo = db.repo();

        let writes = (0..32u64).map(|i| {
            let repo = repo.clone();
            async move { repo.add(&subscription(&format!("m{}", i % 4), &i.to_string())).await }
        });
        for result in futures::future::join_all(writes).await {
            result.unwrap();
        }
        assert_eq!(repo.get_all::<Subscription>().await.unwrap().len(), 32);

        db.close().await;
    }

    #[tokio::test]
    async fn test_data_survives_reconnect() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:///{}", dir.path().join("manga.db").display());
        let db = Database::configure(&url).unwrap();
        db.connect().await.unwrap();
        db.repo().add(&name("m1", "Title")).await.unwrap();
        db.close().await;

        let db = Database::configure(&url).unwrap();
        db.connect().await.unwrap();
        assert_eq!(db.repo().get::<MangaName>("m1").await.unwrap(), Some(name("m1", "Title")));
        db.close().await;
    }

    /// Runs against a real server when `MANGA_TEST_POSTGRES_URL` is set.
    #[tokio::test]
    async fn test_postgres_roundtrip() {
        let Ok(url) = std::env::var("MANGA_TEST_POSTGRES_URL") else {
            return;
        };
        let db = Database::configure(url).unwrap();
        db.connect().await.unwrap();
        let repo = db.repo();
        let user_id = user("900000000000001");
        let sub = subscription("pg-test-m1", user_id.as_str());
        let title = name("pg-test-m1", "Postgres Title");
        let output = MangaOutput {
            user_id: user_id.clone(),
            output: 1,
        };
        repo.erase(&sub).await.unwrap();
        repo.erase(&title).await.unwrap();
        repo.erase(&output).await.unwrap();

        repo.add(&sub).await.unwrap();
        repo.add(&title).await.unwrap();
        repo.add(&output).await.unwrap();
        assert!(matches!(*repo.add(&title).await.unwrap_err(), ErrorKind::Conflict(Table::MangaName)));
        assert_eq!(repo.get::<MangaOutput>(user_id.clone()).await.unwrap(), Some(output.clone()));
        assert_eq!(repo.get_subs(&user_id).await.unwrap(), vec![title.clone()]);
        assert_eq!(repo.erase_subs(&user_id).await.unwrap(), 1);

        repo.erase(&title).await.unwrap();
        repo.erase(&output).await.unwrap();
        db.close().await;
    }
}
