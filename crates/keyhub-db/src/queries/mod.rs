mod admins;
mod audit;
mod contributors;
mod keys;
mod likes;
mod settings;
mod users;
mod verification;
mod whitelist;

pub use admins::AdminDeletion;
pub use audit::{AuditLogFilter, AuditLogPage};
pub use contributors::{ContributorUpdate, PointsAdjustment};
pub use keys::{ClaimOutcome, KeyImport};
pub use likes::{LikeOutcome, MAX_FAN_BADGE};
pub use verification::VerificationStats;
pub use whitelist::{WhitelistImport, WhitelistRemoval};

use rusqlite::Connection;

/// Void every live key held by `user_id`. Banning and whitelist removal keep the
/// claimer on the voided row for the admin view; deletion clears it.
pub(crate) fn void_claimed_keys(conn: &Connection, user_id: i64, release: bool) -> rusqlite::Result<usize> {
    let sql = if release {
        "UPDATE keys SET status = 'void', claimed_by_user_id = NULL, claimed_at = NULL
         WHERE claimed_by_user_id = ?1 AND status = 'claimed'"
    } else {
        "UPDATE keys SET status = 'void'
         WHERE claimed_by_user_id = ?1 AND status = 'claimed'"
    };
    conn.execute(sql, [user_id])
}
