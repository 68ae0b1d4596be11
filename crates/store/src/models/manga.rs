use super::{Bind, Record, Table, private};
use serde::{Deserialize, Serialize};

/// Human-readable title of a manga, keyed by the manga's url.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MangaName {
    pub url: String,
    pub name: String,
}

impl private::Sealed for MangaName {}
impl Record for MangaName {
    type Key = String;

    const TABLE: Table = Table::MangaName;
    const INSERT: &'static str = "INSERT INTO manganame (url, name) VALUES ($1, $2)";
    const SELECT: &'static str = "SELECT url, name FROM manganame WHERE url = $1";
    const SELECT_ALL: &'static str = "SELECT url, name FROM manganame ORDER BY url";
    const DELETE: &'static str = "DELETE FROM manganame WHERE url = $1";

    fn key(&self) -> Self::Key {
        self.url.clone()
    }

    fn bind_key<'q, B: Bind<'q>>(key: Self::Key, query: B) -> B {
        query.bind_value(key)
    }

    fn bind_values<'q, B: Bind<'q>>(&'q self, query: B) -> B {
        query.bind_value(&self.url).bind_value(&self.name)
    }
}
