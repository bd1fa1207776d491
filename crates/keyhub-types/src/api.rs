use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{Admin, User};

// -- JWT Claims --

/// Who a token was issued to. Users and admins live in separate tables, so the
/// role disambiguates `sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// JWT claims shared by the user and admin middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i64,
    pub name: String,
    pub role: Role,
    pub exp: usize,
    /// Admin credential generation the token was issued against. Zero for users.
    #[serde(default)]
    pub ver: i64,
}

/// A QQ id as submitted by a client: forms send strings, pasted lists sometimes
/// arrive as JSON numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum QqInput {
    Number(i64),
    Text(String),
}

impl fmt::Display for QqInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s.trim()),
        }
    }
}

// -- Registration / login --

#[derive(Debug, Deserialize)]
pub struct SendVerificationRequest {
    pub qq: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub qq: String,
    pub nickname: String,
    pub password: String,
    pub verification_code: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub qq: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateUserResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub user_deleted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// -- Keys / likes --

#[derive(Debug, Serialize)]
pub struct ClaimKeyResponse {
    pub success: bool,
    pub message: String,
    pub key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleLikeRequest {
    pub contributor_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub success: bool,
    pub message: String,
    pub liked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_badge_number: Option<i64>,
}

// -- Admin --

#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AdminLoginResponse {
    pub success: bool,
    pub message: String,
    pub admin: Admin,
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct SetupAdminRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddKeysRequest {
    pub keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateKeysRequest {
    pub count: usize,
    pub length: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteKeysRequest {
    pub key_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ContributorRequest {
    pub nickname: String,
    pub avatar_url: String,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct EditContributorRequest {
    pub id: i64,
    pub nickname: String,
    pub avatar_url: String,
    #[serde(default)]
    pub points: i64,
}

#[derive(Debug, Deserialize)]
pub struct AdjustPointsRequest {
    pub adjustment: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddAdminRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteAdminRequest {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiUrlRequest {
    pub api_base_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanUserRequest {
    pub user_id: i64,
    pub ban: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteUserRequest {
    pub user_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistAddRequest {
    pub qq: QqInput,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistBatchRequest {
    pub qq_list: Vec<QqInput>,
}

#[derive(Debug, Deserialize)]
pub struct WhitelistDeleteRequest {
    pub qq_number: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: Option<String>,
    /// Substring of the acting admin's username.
    pub admin: Option<String>,
}
