//! Database row types for tables that hold secrets. Everything else is read
//! straight into the shared `keyhub-types` models.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

use keyhub_types::models::{Admin, KeyStatus, User};

pub struct UserRow {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub password_hash: String,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            nickname: row.get(1)?,
            email: row.get(2)?,
            password_hash: row.get(3)?,
            is_banned: row.get(4)?,
            created_at: timestamp(row, 5)?,
        })
    }

    /// Public view of the user, paired with their claimed key.
    pub fn into_user(self, key: Option<String>) -> User {
        User {
            id: self.id,
            nickname: self.nickname,
            email: self.email,
            is_banned: self.is_banned,
            created_at: self.created_at,
            key,
        }
    }
}

pub struct AdminRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Bumped on every password change; tokens carrying an older value are void.
    pub token_version: i64,
}

impl AdminRow {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            created_at: timestamp(row, 3)?,
            token_version: row.get(4)?,
        })
    }
}

impl From<AdminRow> for Admin {
    fn from(row: AdminRow) -> Self {
        Admin {
            id: row.id,
            username: row.username,
            created_at: row.created_at,
        }
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone; they are UTC.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .or_else(|_| raw.parse::<DateTime<Utc>>())
}

pub(crate) fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_timestamp(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn opt_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        parse_timestamp(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

pub(crate) fn key_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<KeyStatus> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
