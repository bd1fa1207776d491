use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id              INTEGER PRIMARY KEY,
                nickname        TEXT NOT NULL,
                email           TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                is_banned       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE keys (
                id                  INTEGER PRIMARY KEY AUTOINCREMENT,
                key_value           TEXT NOT NULL UNIQUE,
                status              TEXT NOT NULL DEFAULT 'unclaimed'
                                    CHECK (status IN ('unclaimed', 'claimed', 'void')),
                claimed_by_user_id  INTEGER REFERENCES users(id) ON DELETE SET NULL,
                claimed_at          TEXT,
                created_at          TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- A user holds at most one live key.
            CREATE UNIQUE INDEX idx_keys_one_claim_per_user
                ON keys(claimed_by_user_id) WHERE status = 'claimed';

            CREATE INDEX idx_keys_status ON keys(status, id);

            CREATE TABLE contributors (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                nickname        TEXT NOT NULL UNIQUE,
                avatar_url      TEXT NOT NULL,
                points          INTEGER NOT NULL DEFAULT 0 CHECK (points >= 0),
                likes_count     INTEGER NOT NULL DEFAULT 0 CHECK (likes_count >= 0),
                badges_issued   INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE likes (
                user_id             INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                contributor_id      INTEGER NOT NULL REFERENCES contributors(id) ON DELETE CASCADE,
                fan_badge_number    INTEGER CHECK (fan_badge_number BETWEEN 1 AND 999),
                created_at          TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (user_id, contributor_id)
            );

            CREATE INDEX idx_likes_contributor ON likes(contributor_id);

            CREATE TABLE whitelist (
                qq_number   INTEGER PRIMARY KEY,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE admins (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                username        TEXT NOT NULL UNIQUE,
                password_hash   TEXT NOT NULL,
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- No foreign key: entries outlive the admin that wrote them.
            CREATE TABLE audit_logs (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_id    INTEGER NOT NULL,
                action      TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_audit_logs_created ON audit_logs(created_at);

            CREATE TABLE verification_codes (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                email       TEXT NOT NULL,
                code        TEXT NOT NULL,
                expires_at  TEXT NOT NULL,
                used        INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_verification_codes_email
                ON verification_codes(email, created_at);

            CREATE TABLE system_config (
                key         TEXT PRIMARY KEY,
                value       TEXT NOT NULL,
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (admin token versions)");
        conn.execute_batch(
            "
            ALTER TABLE admins ADD COLUMN token_version INTEGER NOT NULL DEFAULT 0;

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
