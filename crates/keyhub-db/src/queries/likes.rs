use anyhow::Result;
use rusqlite::{OptionalExtension, params};
use tracing::{debug, warn};

use super::contributors::query_contributor;
use super::users::query_user;
use crate::Database;

/// Highest fan badge a contributor can hand out.
pub const MAX_FAN_BADGE: i64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeOutcome {
    Liked { fan_badge_number: i64 },
    AlreadyLiked,
    BadgesExhausted,
    UserNotFound,
    Banned,
    ContributorNotFound,
}

impl Database {
    /// Record a user's one-time like of a contributor and issue the next fan badge.
    pub fn like_contributor(&self, user_id: i64, contributor_id: i64) -> Result<LikeOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(user) = query_user(&tx, user_id)? else {
                return Ok(LikeOutcome::UserNotFound);
            };
            if user.is_banned {
                return Ok(LikeOutcome::Banned);
            }
            if query_contributor(&tx, contributor_id)?.is_none() {
                return Ok(LikeOutcome::ContributorNotFound);
            }

            let existing = tx
                .query_row(
                    "SELECT 1 FROM likes WHERE user_id = ?1 AND contributor_id = ?2",
                    params![user_id, contributor_id],
                    |_| Ok(()),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(LikeOutcome::AlreadyLiked);
            }

            let issued: i64 = tx.query_row(
                "SELECT badges_issued FROM contributors WHERE id = ?1",
                [contributor_id],
                |row| row.get(0),
            )?;
            let badge = issued + 1;
            if badge > MAX_FAN_BADGE {
                warn!("Contributor {} has no fan badges left", contributor_id);
                return Ok(LikeOutcome::BadgesExhausted);
            }

            tx.execute(
                "INSERT INTO likes (user_id, contributor_id, fan_badge_number) VALUES (?1, ?2, ?3)",
                params![user_id, contributor_id, badge],
            )?;
            tx.execute(
                "UPDATE contributors SET likes_count = likes_count + 1, badges_issued = ?2 WHERE id = ?1",
                params![contributor_id, badge],
            )?;
            tx.commit()?;

            debug!("User {} liked contributor {} (badge #{})", user_id, contributor_id, badge);
            Ok(LikeOutcome::Liked { fan_badge_number: badge })
        })
    }

    /// Drop every like and restart badge numbering. Returns the number of likes removed.
    pub fn reset_likes(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute("DELETE FROM likes", [])?;
            tx.execute("UPDATE contributors SET likes_count = 0, badges_issued = 0", [])?;
            tx.commit()?;
            Ok(removed)
        })
    }
}
