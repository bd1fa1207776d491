use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, Row, params};

use keyhub_types::models::Contributor;

use crate::Database;
use crate::models::timestamp;

const CONTRIBUTOR_COLUMNS: &str = "id, nickname, avatar_url, points, likes_count, created_at";

#[derive(Debug, Clone)]
pub enum ContributorUpdate {
    Updated {
        previous_nickname: String,
        contributor: Contributor,
    },
    NotFound,
    NicknameTaken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointsAdjustment {
    pub nickname: String,
    pub old_points: i64,
    pub new_points: i64,
}

fn contributor_from_row(row: &Row<'_>) -> rusqlite::Result<Contributor> {
    Ok(Contributor {
        id: row.get(0)?,
        nickname: row.get(1)?,
        avatar_url: row.get(2)?,
        points: row.get(3)?,
        likes_count: row.get(4)?,
        created_at: timestamp(row, 5)?,
    })
}

pub(crate) fn query_contributor(conn: &Connection, id: i64) -> rusqlite::Result<Option<Contributor>> {
    conn.query_row(
        &format!("SELECT {CONTRIBUTOR_COLUMNS} FROM contributors WHERE id = ?1"),
        [id],
        contributor_from_row,
    )
    .optional()
}

fn nickname_in_use(conn: &Connection, nickname: &str, except: Option<i64>) -> rusqlite::Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM contributors WHERE nickname = ?1 AND id != COALESCE(?2, -1)",
            params![nickname, except],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

impl Database {
    /// Leaderboard order: points, then likes, then oldest first.
    pub fn list_contributors(&self) -> Result<Vec<Contributor>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CONTRIBUTOR_COLUMNS} FROM contributors
                 ORDER BY points DESC, likes_count DESC, id ASC"
            ))?;
            let rows = stmt
                .query_map([], contributor_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_contributor(&self, id: i64) -> Result<Option<Contributor>> {
        self.with_conn(|conn| Ok(query_contributor(conn, id)?))
    }

    /// Returns `None` if the nickname is already taken.
    pub fn create_contributor(&self, nickname: &str, avatar_url: &str, points: i64) -> Result<Option<Contributor>> {
        self.with_conn(|conn| {
            if nickname_in_use(conn, nickname, None)? {
                return Ok(None);
            }
            conn.execute(
                "INSERT INTO contributors (nickname, avatar_url, points) VALUES (?1, ?2, ?3)",
                params![nickname, avatar_url, points.max(0)],
            )?;
            Ok(query_contributor(conn, conn.last_insert_rowid())?)
        })
    }

    pub fn update_contributor(
        &self,
        id: i64,
        nickname: &str,
        avatar_url: &str,
        points: i64,
    ) -> Result<ContributorUpdate> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(previous) = query_contributor(&tx, id)? else {
                return Ok(ContributorUpdate::NotFound);
            };
            if nickname_in_use(&tx, nickname, Some(id))? {
                return Ok(ContributorUpdate::NicknameTaken);
            }
            tx.execute(
                "UPDATE contributors SET nickname = ?2, avatar_url = ?3, points = ?4 WHERE id = ?1",
                params![id, nickname, avatar_url, points.max(0)],
            )?;
            let contributor = query_contributor(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("contributor {} vanished during update", id))?;
            tx.commit()?;
            Ok(ContributorUpdate::Updated {
                previous_nickname: previous.nickname,
                contributor,
            })
        })
    }

    /// Removes the contributor and, by cascade, every like it received.
    pub fn delete_contributor(&self, id: i64) -> Result<Option<Contributor>> {
        self.with_conn(|conn| {
            let Some(existing) = query_contributor(conn, id)? else {
                return Ok(None);
            };
            conn.execute("DELETE FROM contributors WHERE id = ?1", [id])?;
            Ok(Some(existing))
        })
    }

    /// Add `delta` to a contributor's points, flooring the result at zero.
    pub fn adjust_points(&self, id: i64, delta: i64) -> Result<Option<PointsAdjustment>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(existing) = query_contributor(&tx, id)? else {
                return Ok(None);
            };
            let new_points = existing.points.saturating_add(delta).max(0);
            tx.execute(
                "UPDATE contributors SET points = ?2 WHERE id = ?1",
                params![id, new_points],
            )?;
            tx.commit()?;
            Ok(Some(PointsAdjustment {
                nickname: existing.nickname,
                old_points: existing.points,
                new_points,
            }))
        })
    }
}
