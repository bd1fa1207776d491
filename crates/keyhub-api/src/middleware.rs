use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};

use keyhub_types::api::{Claims, Role};

use crate::error::ApiError;
use crate::state::{AppState, run_db};

pub fn create_token(
    secret: &str,
    sub: i64,
    name: &str,
    role: Role,
    ver: i64,
    ttl: chrono::Duration,
) -> anyhow::Result<String> {
    let claims = Claims {
        sub,
        name: name.to_string(),
        role,
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        ver,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

/// Decode the Bearer token and check it was issued for `role`.
fn authorize(headers: &HeaderMap, secret: &str, role: Role) -> Result<Claims, ApiError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .ok_or_else(|| ApiError::Unauthorized("Please sign in first".into()))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| ApiError::Unauthorized("Session expired, please sign in again".into()))?;

    if token_data.claims.role != role {
        return Err(ApiError::forbidden("You do not have access to this resource"));
    }
    Ok(token_data.claims)
}

pub async fn require_user(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = authorize(req.headers(), &state.jwt_secret, Role::User)?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

pub async fn require_admin(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = authorize(req.headers(), &state.jwt_secret, Role::Admin)?;
    // Tokens outlive their admin row and its password; both must still match.
    let admin_id = claims.sub;
    let current = run_db(&state, move |db| Ok(db.get_admin(admin_id)?.map(|a| a.token_version))).await?;
    match current {
        None => {
            return Err(ApiError::Unauthorized(
                "This administrator account no longer exists".into(),
            ));
        }
        Some(version) if version != claims.ver => {
            return Err(ApiError::Unauthorized(
                "Password was changed, please sign in again".into(),
            ));
        }
        Some(_) => {}
    }
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
