use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a license key. `Void` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Unclaimed,
    Claimed,
    Void,
}

impl KeyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unclaimed => "unclaimed",
            Self::Claimed => "claimed",
            Self::Void => "void",
        }
    }
}

impl fmt::Display for KeyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown key status: {0}")]
pub struct ParseKeyStatusError(pub String);

impl FromStr for KeyStatus {
    type Err = ParseKeyStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unclaimed" => Ok(Self::Unclaimed),
            "claimed" => Ok(Self::Claimed),
            "void" => Ok(Self::Void),
            other => Err(ParseKeyStatusError(other.to_string())),
        }
    }
}

/// A portal user as seen by the user themself. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    /// The key currently claimed by this user, if any.
    pub key: Option<String>,
}

/// Admin view of a user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: i64,
    pub nickname: String,
    pub email: String,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub claimed_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyClaimer {
    pub nickname: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Key {
    pub id: i64,
    pub key_value: String,
    pub status: KeyStatus,
    pub claimed_by_user_id: Option<i64>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub user: Option<KeyClaimer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub id: i64,
    pub nickname: String,
    pub avatar_url: String,
    pub points: i64,
    pub likes_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLike {
    pub contributor_id: i64,
    pub fan_badge_number: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub qq_number: i64,
    pub created_at: DateTime<Utc>,
}

/// Admin account without its password hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: i64,
    pub admin_id: i64,
    /// `None` once the acting admin has been deleted.
    pub admin_username: Option<String>,
    pub action: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_users: i64,
    pub banned_users: i64,
    pub total_keys: i64,
    pub unclaimed_keys: i64,
    pub claimed_keys: i64,
    pub void_keys: i64,
    pub total_contributors: i64,
    pub total_likes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_status_parses_its_own_labels() {
        for status in [KeyStatus::Unclaimed, KeyStatus::Claimed, KeyStatus::Void] {
            assert_eq!(status.as_str().parse::<KeyStatus>().unwrap(), status);
        }
        assert!("lost".parse::<KeyStatus>().is_err());
    }

    #[test]
    fn key_status_serializes_lowercase() {
        let json = serde_json::to_string(&KeyStatus::Unclaimed).unwrap();
        assert_eq!(json, "\"unclaimed\"");
    }
}
