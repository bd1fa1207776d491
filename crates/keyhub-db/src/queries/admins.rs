use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::info;

use keyhub_types::models::Admin;

use crate::Database;
use crate::models::AdminRow;

const ADMIN_COLUMNS: &str = "id, username, password_hash, created_at, token_version";

#[derive(Debug, Clone)]
pub enum AdminDeletion {
    Deleted(Admin),
    NotFound,
    /// Refused: the store must always keep one admin.
    LastAdmin,
}

fn query_admin(conn: &Connection, id: i64) -> rusqlite::Result<Option<AdminRow>> {
    conn.query_row(
        &format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = ?1"),
        [id],
        AdminRow::from_row,
    )
    .optional()
}

fn admin_count(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM admins", [], |row| row.get(0))
}

impl Database {
    pub fn get_admin_by_username(&self, username: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE username = ?1"),
                    [username],
                    AdminRow::from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn get_admin(&self, id: i64) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| Ok(query_admin(conn, id)?))
    }

    pub fn list_admins(&self) -> Result<Vec<Admin>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ADMIN_COLUMNS} FROM admins ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map([], AdminRow::from_row)?
                .map(|r| r.map(Admin::from))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns `None` if the username is taken.
    pub fn create_admin(&self, username: &str, password_hash: &str) -> Result<Option<Admin>> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO admins (username, password_hash) VALUES (?1, ?2)",
                params![username, password_hash],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            Ok(query_admin(conn, conn.last_insert_rowid())?.map(Admin::from))
        })
    }

    pub fn delete_admin(&self, id: i64) -> Result<AdminDeletion> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let Some(admin) = query_admin(&tx, id)? else {
                return Ok(AdminDeletion::NotFound);
            };
            if admin_count(&tx)? <= 1 {
                return Ok(AdminDeletion::LastAdmin);
            }
            tx.execute("DELETE FROM admins WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(AdminDeletion::Deleted(admin.into()))
        })
    }

    /// Replace the hash and void earlier tokens. Returns the new token version,
    /// or `None` for an unknown admin.
    pub fn update_admin_password(&self, id: i64, password_hash: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let version = conn
                .query_row(
                    "UPDATE admins SET password_hash = ?2, token_version = token_version + 1
                     WHERE id = ?1 RETURNING token_version",
                    params![id, password_hash],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(version)
        })
    }

    /// Create the first admin. Does nothing once any admin exists.
    pub fn bootstrap_admin(&self, username: &str, password_hash: &str) -> Result<Option<Admin>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if admin_count(&tx)? > 0 {
                return Ok(None);
            }
            tx.execute(
                "INSERT INTO admins (username, password_hash) VALUES (?1, ?2)",
                params![username, password_hash],
            )?;
            let admin = query_admin(&tx, tx.last_insert_rowid())?.map(Admin::from);
            tx.commit()?;
            info!("Bootstrap admin '{}' created", username);
            Ok(admin)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::testutil::db;

    #[test]
    fn bootstrap_only_runs_once() {
        let db = db();
        let first = db.bootstrap_admin("admin", "h1").unwrap();
        assert_eq!(first.unwrap().username, "admin");
        assert!(db.bootstrap_admin("other", "h2").unwrap().is_none());
        assert_eq!(db.list_admins().unwrap().len(), 1);
    }

    #[test]
    fn usernames_are_unique() {
        let db = db();
        assert!(db.create_admin("root", "h").unwrap().is_some());
        assert!(db.create_admin("root", "h").unwrap().is_none());
        assert_eq!(db.get_admin_by_username("root").unwrap().unwrap().password_hash, "h");
    }

    #[test]
    fn last_admin_cannot_be_deleted() {
        let db = db();
        let a = db.create_admin("a", "h").unwrap().unwrap();
        let b = db.create_admin("b", "h").unwrap().unwrap();

        assert!(matches!(db.delete_admin(a.id).unwrap(), AdminDeletion::Deleted(_)));
        assert!(matches!(db.delete_admin(b.id).unwrap(), AdminDeletion::LastAdmin));
        assert!(matches!(db.delete_admin(a.id).unwrap(), AdminDeletion::NotFound));
        assert!(db.get_admin(b.id).unwrap().is_some());
    }

    #[test]
    fn password_update() {
        let db = db();
        let a = db.create_admin("a", "old").unwrap().unwrap();
        assert_eq!(db.get_admin(a.id).unwrap().unwrap().token_version, 0);

        assert_eq!(db.update_admin_password(a.id, "new").unwrap(), Some(1));
        let row = db.get_admin(a.id).unwrap().unwrap();
        assert_eq!(row.password_hash, "new");
        assert_eq!(row.token_version, 1);
        assert_eq!(db.update_admin_password(a.id, "newer").unwrap(), Some(2));
        assert_eq!(db.update_admin_password(999, "x").unwrap(), None);
    }
}
