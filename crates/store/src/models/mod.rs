//! Table definitions and the entity types stored in them.
//!
//! Every entity implements [`Record`], which is what lets the generic
//! repository operations (`add`, `get`, `get_all`, `erase`, `replace`) work
//! over any of the five tables without runtime type dispatch. The set of
//! tables is closed: [`Record`] is sealed.

mod chapter;
mod manga;
mod user;

pub use self::chapter::{ChapterFile, LastChapter};
pub use self::manga::MangaName;
pub use self::user::{MangaOutput, Subscription, UserId};
use derive_more::Display;
use sqlx::any::{Any, AnyArguments, AnyRow};
use sqlx::query::{Query, QueryAs};
use sqlx::{Encode, FromRow, Type};

/// The tables making up the schema.
///
/// Table and column names are part of the external contract: anything
/// reading the database directly (backups, ad-hoc reports) relies on them.
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum Table {
    #[display("chapterfile")]
    ChapterFile,
    #[display("mangaoutput")]
    MangaOutput,
    #[display("subscription")]
    Subscription,
    #[display("lastchapter")]
    LastChapter,
    #[display("manganame")]
    MangaName,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Self::ChapterFile,
        Self::MangaOutput,
        Self::Subscription,
        Self::LastChapter,
        Self::MangaName,
    ];

    /// `CREATE TABLE IF NOT EXISTS` statement for this table.
    pub(crate) fn schema(self) -> &'static str {
        match self {
            Self::ChapterFile => include_str!("../../schema/chapterfile.sql"),
            Self::MangaOutput => include_str!("../../schema/mangaoutput.sql"),
            Self::Subscription => include_str!("../../schema/subscription.sql"),
            Self::LastChapter => include_str!("../../schema/lastchapter.sql"),
            Self::MangaName => include_str!("../../schema/manganame.sql"),
        }
    }
}

/// Anything positional parameters can be bound to.
///
/// Implemented for both plain queries and row-mapping queries so that a
/// [`Record`] only has to describe its binding order once.
pub trait Bind<'q>: Sized {
    fn bind_value<T>(self, value: T) -> Self
    where
        T: 'q + Encode<'q, Any> + Type<Any>;
}
impl<'q> Bind<'q> for Query<'q, Any, AnyArguments<'q>> {
    fn bind_value<T>(self, value: T) -> Self
    where
        T: 'q + Encode<'q, Any> + Type<Any>,
    {
        self.bind(value)
    }
}
impl<'q, O> Bind<'q> for QueryAs<'q, Any, O, AnyArguments<'q>> {
    fn bind_value<T>(self, value: T) -> Self
    where
        T: 'q + Encode<'q, Any> + Type<Any>,
    {
        self.bind(value)
    }
}

mod private {
    pub trait Sealed {}
}

/// A row type keyed by its table's primary key.
///
/// SQL statements use `$n` positional parameters, which both the SQLite and
/// PostgreSQL drivers accept. Key columns are bound in `bind_key` order,
/// all columns in `bind_values` order.
pub trait Record: for<'r> FromRow<'r, AnyRow> + private::Sealed + Send + Sync + Unpin + 'static {
    /// Primary key: a scalar for single-column keys, a tuple for composite keys.
    type Key: Send + 'static;

    const TABLE: Table;
    const INSERT: &'static str;
    const SELECT: &'static str;
    const SELECT_ALL: &'static str;
    const DELETE: &'static str;

    fn key(&self) -> Self::Key;
    fn bind_key<'q, B: Bind<'q>>(key: Self::Key, query: B) -> B;
    fn bind_values<'q, B: Bind<'q>>(&'q self, query: B) -> B;
}
