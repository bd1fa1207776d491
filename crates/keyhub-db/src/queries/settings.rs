use anyhow::Result;
use rusqlite::{OptionalExtension, params};

use keyhub_types::models::DashboardStats;

use crate::Database;

impl Database {
    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row("SELECT value FROM system_config WHERE key = ?1", [key], |row| row.get(0))
                .optional()?;
            Ok(value)
        })
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO system_config (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )?;
            Ok(())
        })
    }

    pub fn dashboard_stats(&self) -> Result<DashboardStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM users),
                    (SELECT COUNT(*) FROM users WHERE is_banned = 1),
                    (SELECT COUNT(*) FROM keys),
                    (SELECT COUNT(*) FROM keys WHERE status = 'unclaimed'),
                    (SELECT COUNT(*) FROM keys WHERE status = 'claimed'),
                    (SELECT COUNT(*) FROM keys WHERE status = 'void'),
                    (SELECT COUNT(*) FROM contributors),
                    (SELECT COUNT(*) FROM likes)",
                [],
                |row| {
                    Ok(DashboardStats {
                        total_users: row.get(0)?,
                        banned_users: row.get(1)?,
                        total_keys: row.get(2)?,
                        unclaimed_keys: row.get(3)?,
                        claimed_keys: row.get(4)?,
                        void_keys: row.get(5)?,
                        total_contributors: row.get(6)?,
                        total_likes: row.get(7)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::testutil::{db, seed_user};
    use keyhub_types::models::DashboardStats;

    #[test]
    fn settings_upsert() {
        let db = db();
        assert!(db.get_setting("api_base_url").unwrap().is_none());
        db.set_setting("api_base_url", "https://a.example/v1").unwrap();
        db.set_setting("api_base_url", "https://b.example/v1").unwrap();
        assert_eq!(
            db.get_setting("api_base_url").unwrap().as_deref(),
            Some("https://b.example/v1")
        );
    }

    #[test]
    fn dashboard_counts() {
        let db = db();
        assert_eq!(db.dashboard_stats().unwrap(), DashboardStats::default());

        seed_user(&db, 10001);
        seed_user(&db, 10002);
        db.add_to_whitelist(10001).unwrap();
        db.add_keys(&["A".to_string(), "B".to_string(), "C".to_string()]).unwrap();
        db.claim_key(10001).unwrap();
        db.set_user_banned(10002, true).unwrap();
        let c = db.create_contributor("alice", "a.png", 0).unwrap().unwrap();
        db.like_contributor(10001, c.id).unwrap();

        let stats = db.dashboard_stats().unwrap();
        assert_eq!(
            stats,
            DashboardStats {
                total_users: 2,
                banned_users: 1,
                total_keys: 3,
                unclaimed_keys: 2,
                claimed_keys: 1,
                void_keys: 0,
                total_contributors: 1,
                total_likes: 1,
            }
        );
    }
}
