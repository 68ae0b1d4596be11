use super::{Bind, Record, Table, private};
use serde::{Deserialize, Serialize};

/// An uploaded rendering of one chapter.
///
/// Created once when a chapter is first processed and looked up again either
/// by chapter `url` or by any of the identifiers handed out by the upload
/// targets (see `Repository::get_chapter_file_by_id`).
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ChapterFile {
    pub url: String,
    pub file_id: String,
    pub file_unique_id: String,
    pub cbz_id: String,
    pub cbz_unique_id: String,
    pub telegraph_url: String,
}

impl private::Sealed for ChapterFile {}
impl Record for ChapterFile {
    type Key = String;

    const TABLE: Table = Table::ChapterFile;
    const INSERT: &'static str = "INSERT INTO chapterfile (url, file_id, file_unique_id, cbz_id, cbz_unique_id, telegraph_url) VALUES ($1, $2, $3, $4, $5, $6)";
    const SELECT: &'static str = "SELECT url, file_id, file_unique_id, cbz_id, cbz_unique_id, telegraph_url FROM chapterfile WHERE url = $1";
    const SELECT_ALL: &'static str = "SELECT url, file_id, file_unique_id, cbz_id, cbz_unique_id, telegraph_url FROM chapterfile ORDER BY url";
    const DELETE: &'static str = "DELETE FROM chapterfile WHERE url = $1";

    fn key(&self) -> Self::Key {
        self.url.clone()
    }

    fn bind_key<'q, B: Bind<'q>>(key: Self::Key, query: B) -> B {
        query.bind_value(key)
    }

    fn bind_values<'q, B: Bind<'q>>(&'q self, query: B) -> B {
        query
            .bind_value(&self.url)
            .bind_value(&self.file_id)
            .bind_value(&self.file_unique_id)
            .bind_value(&self.cbz_id)
            .bind_value(&self.cbz_unique_id)
            .bind_value(&self.telegraph_url)
    }
}

/// Most recently seen chapter of a manga.
///
/// One row per manga. Use `Repository::replace` to move it forward so the
/// old row is never observed missing.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LastChapter {
    pub url: String,
    pub chapter_url: String,
}

impl private::Sealed for LastChapter {}
impl Record for LastChapter {
    type Key = String;

    const TABLE: Table = Table::LastChapter;
    const INSERT: &'static str = "INSERT INTO lastchapter (url, chapter_url) VALUES ($1, $2)";
    const SELECT: &'static str = "SELECT url, chapter_url FROM lastchapter WHERE url = $1";
    const SELECT_ALL: &'static str = "SELECT url, chapter_url FROM lastchapter ORDER BY url";
    const DELETE: &'static str = "DELETE FROM lastchapter WHERE url = $1";

    fn key(&self) -> Self::Key {
        self.url.clone()
    }

    fn bind_key<'q, B: Bind<'q>>(key: Self::Key, query: B) -> B {
        query.bind_value(key)
    }

    fn bind_values<'q, B: Bind<'q>>(&'q self, query: B) -> B {
        query.bind_value(&self.url).bind_value(&self.chapter_url)
    }
}
