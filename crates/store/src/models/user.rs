use super::{Bind, Record, Table, private};
use crate::error::{ErrorKind, Result};
use derive_more::Display;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::any::{Any, AnyTypeInfo};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::{Database, Decode, Encode, Type};
use std::str::FromStr;
use std::sync::LazyLock;

static USER_ID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("user id pattern is valid"));

/// Numeric chat/user identifier, stored as text.
///
/// Only ASCII digits are accepted. Every way of obtaining a `UserId`
/// (construction, parsing, deserialization, decoding a database row) runs the
/// same check, so an invalid id can never reach a write.
#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if !USER_ID.is_match(&id) {
            exn::bail!(ErrorKind::Validation("user id"));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}
impl TryFrom<String> for UserId {
    type Error = ErrorKind;
    fn try_from(id: String) -> std::result::Result<Self, Self::Error> {
        match USER_ID.is_match(&id) {
            true => Ok(Self(id)),
            false => Err(ErrorKind::Validation("user id")),
        }
    }
}
impl FromStr for UserId {
    type Err = crate::error::Error;
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}
impl From<UserId> for String {
    fn from(id: UserId) -> Self {
        id.0
    }
}
impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Type<Any> for UserId {
    fn type_info() -> AnyTypeInfo {
        <String as Type<Any>>::type_info()
    }

    fn compatible(ty: &AnyTypeInfo) -> bool {
        <String as Type<Any>>::compatible(ty)
    }
}
impl<'q> Encode<'q, Any> for UserId {
    fn encode_by_ref(
        &self,
        buf: &mut <Any as Database>::ArgumentBuffer<'q>,
    ) -> std::result::Result<IsNull, BoxDynError> {
        <String as Encode<'q, Any>>::encode_by_ref(&self.0, buf)
    }
}
impl<'r> Decode<'r, Any> for UserId {
    fn decode(value: <Any as Database>::ValueRef<'r>) -> std::result::Result<Self, BoxDynError> {
        let raw = <String as Decode<'r, Any>>::decode(value)?;
        Ok(Self::try_from(raw)?)
    }
}

/// A user's preferred delivery format.
///
/// `output` is an opaque selector owned by the delivery layer; the store
/// only persists it.
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MangaOutput {
    pub user_id: UserId,
    pub output: i64,
}

impl private::Sealed for MangaOutput {}
impl Record for MangaOutput {
    type Key = UserId;

    const TABLE: Table = Table::MangaOutput;
    const INSERT: &'static str = "INSERT INTO mangaoutput (user_id, output) VALUES ($1, $2)";
    const SELECT: &'static str = "SELECT user_id, output FROM mangaoutput WHERE user_id = $1";
    const SELECT_ALL: &'static str = "SELECT user_id, output FROM mangaoutput ORDER BY user_id";
    const DELETE: &'static str = "DELETE FROM mangaoutput WHERE user_id = $1";

    fn key(&self) -> Self::Key {
        self.user_id.clone()
    }

    fn bind_key<'q, B: Bind<'q>>(key: Self::Key, query: B) -> B {
        query.bind_value(key)
    }

    fn bind_values<'q, B: Bind<'q>>(&'q self, query: B) -> B {
        query.bind_value(&self.user_id).bind_value(self.output)
    }
}

/// "User follows the manga at `url`."
#[derive(Clone, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Subscription {
    pub url: String,
    pub user_id: UserId,
}

impl private::Sealed for Subscription {}
impl Record for Subscription {
    type Key = (String, UserId);

    const TABLE: Table = Table::Subscription;
    const INSERT: &'static str = "INSERT INTO subscription (url, user_id) VALUES ($1, $2)";
    const SELECT: &'static str = "SELECT url, user_id FROM subscription WHERE url = $1 AND user_id = $2";
    const SELECT_ALL: &'static str = "SELECT url, user_id FROM subscription ORDER BY url, user_id";
    const DELETE: &'static str = "DELETE FROM subscription WHERE url = $1 AND user_id = $2";

    fn key(&self) -> Self::Key {
        (self.url.clone(), self.user_id.clone())
    }

    fn bind_key<'q, B: Bind<'q>>(key: Self::Key, query: B) -> B {
        let (url, user_id) = key;
        query.bind_value(url).bind_value(user_id)
    }

    fn bind_values<'q, B: Bind<'q>>(&'q self, query: B) -> B {
        query.bind_value(&self.url).bind_value(&self.user_id)
    }
}
