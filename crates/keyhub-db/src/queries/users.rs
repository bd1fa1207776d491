use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use keyhub_types::models::{UserLike, UserSummary};

use super::void_claimed_keys;
use crate::Database;
use crate::models::{UserRow, timestamp};

impl Database {
    pub fn create_user(&self, id: i64, nickname: &str, email: &str, password_hash: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, nickname, email, password_hash) VALUES (?1, ?2, ?3, ?4)",
                params![id, nickname, email, password_hash],
            )?;
            Ok(())
        })
    }

    pub fn get_user(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, id))
    }

    pub fn email_taken(&self, email: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found = conn
                .query_row("SELECT 1 FROM users WHERE email = ?1", [email], |_| Ok(()))
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// The user's live key, if they hold one.
    pub fn claimed_key_for(&self, user_id: i64) -> Result<Option<String>> {
        self.with_conn(|conn| Ok(query_claimed_key(conn, user_id)?))
    }

    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT u.id, u.nickname, u.email, u.is_banned, u.created_at, k.key_value
                 FROM users u
                 LEFT JOIN keys k ON k.claimed_by_user_id = u.id AND k.status = 'claimed'
                 ORDER BY u.created_at DESC, u.id DESC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(UserSummary {
                        id: row.get(0)?,
                        nickname: row.get(1)?,
                        email: row.get(2)?,
                        is_banned: row.get(3)?,
                        created_at: timestamp(row, 4)?,
                        claimed_key: row.get(5)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Ban or unban a user. Banning voids their live key.
    /// Returns `None` if the user does not exist, otherwise the number of voided keys.
    pub fn set_user_banned(&self, id: i64, banned: bool) -> Result<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE users SET is_banned = ?2 WHERE id = ?1",
                params![id, banned],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let voided = if banned { void_claimed_keys(&tx, id, false)? } else { 0 };
            tx.commit()?;
            Ok(Some(voided))
        })
    }

    /// Delete a user: their live key is voided and released, their likes are removed
    /// and the liked contributors' counts drop accordingly.
    /// Returns `None` if the user does not exist, otherwise the number of voided keys.
    pub fn delete_user(&self, id: i64) -> Result<Option<usize>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if query_user(&tx, id)?.is_none() {
                return Ok(None);
            }

            let voided = void_claimed_keys(&tx, id, true)?;
            tx.execute(
                "UPDATE contributors SET likes_count = MAX(likes_count - 1, 0)
                 WHERE id IN (SELECT contributor_id FROM likes WHERE user_id = ?1)",
                [id],
            )?;
            // likes cascade, voided keys keep no claimer
            tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(Some(voided))
        })
    }

    /// `(id, password_hash)` for every user, ordered by id. Feeds the CSV export.
    pub fn user_credentials(&self) -> Result<Vec<(i64, String)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, password_hash FROM users ORDER BY id ASC")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn user_likes(&self, user_id: i64) -> Result<Vec<UserLike>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT contributor_id, fan_badge_number FROM likes
                 WHERE user_id = ?1 ORDER BY created_at ASC, contributor_id ASC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(UserLike {
                        contributor_id: row.get(0)?,
                        fan_badge_number: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

pub(crate) fn query_user(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, nickname, email, password_hash, is_banned, created_at FROM users WHERE id = ?1",
            [id],
            UserRow::from_row,
        )
        .optional()?;
    Ok(row)
}

pub(crate) fn query_claimed_key(conn: &Connection, user_id: i64) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT key_value FROM keys WHERE claimed_by_user_id = ?1 AND status = 'claimed'",
        [user_id],
        |row| row.get(0),
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, seed_user};

    #[test]
    fn create_and_fetch_user() {
        let db = db();
        seed_user(&db, 10001);

        let user = db.get_user(10001).unwrap().unwrap();
        assert_eq!(user.nickname, "user10001");
        assert_eq!(user.email, "10001@qq.com");
        assert!(!user.is_banned);
        assert!(db.email_taken("10001@qq.com").unwrap());
        assert!(!db.email_taken("10002@qq.com").unwrap());
        assert!(db.get_user(10002).unwrap().is_none());
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let db = db();
        seed_user(&db, 10001);
        assert!(db.create_user(10001, "again", "other@qq.com", "hash").is_err());
    }

    #[test]
    fn ban_voids_claimed_key_but_unban_does_not_restore_it() {
        let db = db();
        seed_user(&db, 10001);
        db.add_to_whitelist(10001).unwrap();
        db.add_keys(&["K1".to_string()]).unwrap();
        db.claim_key(10001).unwrap();

        assert_eq!(db.set_user_banned(10001, true).unwrap(), Some(1));
        assert!(db.claimed_key_for(10001).unwrap().is_none());
        assert!(db.get_user(10001).unwrap().unwrap().is_banned);

        assert_eq!(db.set_user_banned(10001, false).unwrap(), Some(0));
        assert!(db.claimed_key_for(10001).unwrap().is_none());
        assert_eq!(db.set_user_banned(99999, true).unwrap(), None);
    }

    #[test]
    fn delete_user_releases_key_and_decrements_likes() {
        let db = db();
        seed_user(&db, 10001);
        seed_user(&db, 10002);
        db.add_to_whitelist(10001).unwrap();
        db.add_keys(&["K1".to_string()]).unwrap();
        db.claim_key(10001).unwrap();

        let c = db.create_contributor("alice", "https://a/1.png", 0).unwrap().unwrap();
        db.like_contributor(10001, c.id).unwrap();
        db.like_contributor(10002, c.id).unwrap();

        assert_eq!(db.delete_user(10001).unwrap(), Some(1));
        assert!(db.get_user(10001).unwrap().is_none());
        assert!(db.user_likes(10001).unwrap().is_empty());
        assert_eq!(db.get_contributor(c.id).unwrap().unwrap().likes_count, 1);

        let keys = db.list_keys().unwrap();
        assert_eq!(keys[0].claimed_by_user_id, None);
        assert_eq!(keys[0].status, keyhub_types::models::KeyStatus::Void);

        assert_eq!(db.delete_user(10001).unwrap(), None);
    }

    #[test]
    fn list_users_includes_claimed_key() {
        let db = db();
        seed_user(&db, 10001);
        seed_user(&db, 10002);
        db.add_to_whitelist(10002).unwrap();
        db.add_keys(&["K1".to_string()]).unwrap();
        db.claim_key(10002).unwrap();

        let users = db.list_users().unwrap();
        assert_eq!(users.len(), 2);
        let holder = users.iter().find(|u| u.id == 10002).unwrap();
        assert_eq!(holder.claimed_key.as_deref(), Some("K1"));
        let other = users.iter().find(|u| u.id == 10001).unwrap();
        assert!(other.claimed_key.is_none());
    }

    #[test]
    fn credentials_are_ordered_by_id() {
        let db = db();
        seed_user(&db, 20002);
        seed_user(&db, 10001);
        let ids: Vec<i64> = db.user_credentials().unwrap().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![10001, 20002]);
    }
}
