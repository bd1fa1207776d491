use std::collections::BTreeSet;

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;

use keyhub_types::api::{Claims, QqInput, WhitelistAddRequest, WhitelistBatchRequest, WhitelistDeleteRequest};

use crate::error::ApiError;
use crate::state::{AppState, run_db};
use crate::validate::parse_qq;

use super::audit;

/// Valid ids in first-seen order, plus the raw inputs that failed validation.
fn split_valid(inputs: &[QqInput]) -> (Vec<i64>, Vec<String>) {
    let mut seen = BTreeSet::new();
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for input in inputs {
        let raw = input.to_string();
        if raw.is_empty() {
            continue;
        }
        match parse_qq(&raw) {
            Some(qq) => {
                if seen.insert(qq) {
                    valid.push(qq);
                }
            }
            None => invalid.push(raw),
        }
    }
    (valid, invalid)
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct Comparison {
    in_whitelist: Vec<i64>,
    not_in_whitelist: Vec<i64>,
    in_whitelist_but_not_in_list: Vec<i64>,
    invalid: Vec<String>,
}

fn compare_lists(provided: &[i64], invalid: Vec<String>, whitelist: &BTreeSet<i64>) -> Comparison {
    let provided_set: BTreeSet<i64> = provided.iter().copied().collect();
    let (in_whitelist, not_in_whitelist): (Vec<i64>, Vec<i64>) = provided.iter().copied().partition(|qq| whitelist.contains(qq));
    Comparison {
        in_whitelist,
        not_in_whitelist,
        in_whitelist_but_not_in_list: whitelist.difference(&provided_set).copied().collect(),
        invalid,
    }
}

pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let whitelist = run_db(&state, |db| db.list_whitelist()).await?;
    Ok(Json(json!({ "success": true, "whitelist": whitelist })))
}

pub async fn add(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WhitelistAddRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let qq = parse_qq(&req.qq.to_string()).ok_or_else(|| ApiError::bad_request("Please enter a valid QQ number"))?;

    let entry = run_db(&state, move |db| db.add_to_whitelist(qq))
        .await?
        .ok_or_else(|| ApiError::conflict("This QQ number is already on the whitelist"))?;
    audit(&state, &claims, format!("Added {qq} to the whitelist")).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Added to the whitelist",
            "entry": entry,
        })),
    ))
}

pub async fn batch_add(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WhitelistBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (valid, invalid) = split_valid(&req.qq_list);
    if valid.is_empty() {
        return Err(ApiError::bad_request("No valid QQ numbers were provided"));
    }

    let (existing, to_add): (Vec<i64>, Vec<i64>) = {
        let known = run_db(&state, |db| db.whitelist_numbers()).await?;
        valid.into_iter().partition(|qq| known.contains(qq))
    };
    if to_add.is_empty() {
        return Err(ApiError::bad_request("Every QQ number is already on the whitelist"));
    }

    let numbers = to_add.clone();
    let import = run_db(&state, move |db| db.add_many_to_whitelist(&numbers)).await?;
    audit(&state, &claims, format!("Batch added {} QQ numbers to the whitelist", import.added)).await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Added {} QQ numbers", import.added),
        "added": import.added,
        "duplicates": existing,
        "invalidQQs": invalid,
    })))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WhitelistDeleteRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let qq = req.qq_number;
    let removal = run_db(&state, move |db| db.remove_from_whitelist(&[qq])).await?;
    if removal.removed == 0 {
        return Err(ApiError::not_found("This QQ number is not on the whitelist"));
    }
    audit(
        &state,
        &claims,
        format!("Removed {qq} from the whitelist ({} keys voided)", removal.voided_keys),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Removed from the whitelist",
        "voidedKeys": removal.voided_keys,
    })))
}

pub async fn batch_delete(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<WhitelistBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (valid, invalid) = split_valid(&req.qq_list);
    if valid.is_empty() {
        return Err(ApiError::bad_request("No valid QQ numbers were provided"));
    }

    let removal = run_db(&state, move |db| db.remove_from_whitelist(&valid)).await?;
    audit(
        &state,
        &claims,
        format!(
            "Batch removed {} QQ numbers from the whitelist ({} keys voided)",
            removal.removed, removal.voided_keys
        ),
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": format!("Removed {} QQ numbers", removal.removed),
        "removed": removal.removed,
        "voidedKeys": removal.voided_keys,
        "invalidQQs": invalid,
    })))
}

/// Diff a pasted list against the whitelist. Read-only.
pub async fn compare(
    State(state): State<AppState>,
    Json(req): Json<WhitelistBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let (valid, invalid) = split_valid(&req.qq_list);
    if valid.is_empty() && invalid.is_empty() {
        return Err(ApiError::bad_request("Please provide a list of QQ numbers"));
    }

    let whitelist = run_db(&state, |db| db.whitelist_numbers()).await?;
    let comparison = compare_lists(&valid, invalid, &whitelist);

    Ok(Json(json!({
        "success": true,
        "summary": {
            "totalProvided": valid.len(),
            "totalInWhitelist": whitelist.len(),
            "matchCount": comparison.in_whitelist.len(),
            "missingFromWhitelist": comparison.not_in_whitelist.len(),
            "extraInWhitelist": comparison.in_whitelist_but_not_in_list.len(),
        },
        "comparison": comparison,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inputs(raw: &[&str]) -> Vec<QqInput> {
        raw.iter().map(|s| QqInput::Text(s.to_string())).collect()
    }

    #[test]
    fn split_dedupes_and_collects_invalid() {
        let (valid, invalid) = split_valid(&inputs(&["10001", " 10002 ", "10001", "abc", "", "0123"]));
        assert_eq!(valid, vec![10001, 10002]);
        assert_eq!(invalid, vec!["abc".to_string(), "0123".to_string()]);
    }

    #[test]
    fn comparison_buckets() {
        let whitelist: BTreeSet<i64> = [10001, 10003, 10004].into_iter().collect();
        let result = compare_lists(&[10001, 10002, 10003], vec!["x".into()], &whitelist);
        assert_eq!(
            result,
            Comparison {
                in_whitelist: vec![10001, 10003],
                not_in_whitelist: vec![10002],
                in_whitelist_but_not_in_list: vec![10004],
                invalid: vec!["x".into()],
            }
        );
    }
}
