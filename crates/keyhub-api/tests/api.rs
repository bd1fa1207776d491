use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use keyhub_api::middleware::create_token;
use keyhub_api::{AppState, AppStateInner, PortalSettings, router};
use keyhub_db::Database;
use keyhub_mail::{MailError, MailService, Mailer, OutgoingMail, QueueConfig, RetryQueue};
use keyhub_types::api::Role;

const SECRET: &str = "integration-test-secret";

/// Records every message; fails every send when `fail_with` is set.
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingMail>>,
    fail_with: Option<MailError>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> Result<(), MailError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }

    async fn verify(&self) -> Result<(), MailError> {
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn kind(&self) -> &'static str {
        "recording"
    }
}

struct TestApp {
    router: Router,
    state: AppState,
    mailer: Arc<RecordingMailer>,
}

impl TestApp {
    fn new() -> Self {
        Self::with(RecordingMailer::default(), PortalSettings::default())
    }

    fn with(mailer: RecordingMailer, settings: PortalSettings) -> Self {
        let mailer = Arc::new(mailer);
        let queue = RetryQueue::new(QueueConfig {
            concurrency_limit: 2,
            max_retries: 2,
            base_retry_delay: Duration::from_millis(1),
        });
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: SECRET.to_string(),
            mail: MailService::new(mailer.clone(), queue, "Keyhub"),
            settings,
        });
        Self {
            router: router(state.clone()),
            state,
            mailer,
        }
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let resp = self.router.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Create the bootstrap admin through the API and return its token.
    async fn admin_token(&self) -> String {
        let (status, _) = self
            .send(
                Method::POST,
                "/api/admin/setup",
                None,
                Some(json!({ "username": "root", "password": "rootpass" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = self
            .send(
                Method::POST,
                "/api/admin/auth/login",
                None,
                Some(json!({ "username": "root", "password": "rootpass" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    /// Insert a user directly and mint a token for them.
    fn user_token(&self, qq: i64) -> String {
        self.state
            .db
            .create_user(qq, &format!("user{qq}"), &format!("{qq}@qq.com"), "unused-hash")
            .unwrap();
        create_token(SECRET, qq, &format!("user{qq}"), Role::User, 0, chrono::Duration::hours(1)).unwrap()
    }

    fn last_code(&self) -> String {
        let sent = self.mailer.sent.lock().unwrap();
        let text = &sent.last().unwrap().text;
        let start = text.find("code is ").unwrap() + "code is ".len();
        text[start..start + 6].to_string()
    }
}

#[tokio::test]
async fn health_is_public_and_not_cached() {
    let app = TestApp::new();
    let resp = app
        .router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CACHE_CONTROL).unwrap(), "no-store");
}

#[tokio::test]
async fn register_then_login() {
    let app = TestApp::new();

    let (status, _) = app
        .send(Method::POST, "/api/send-verification", None, Some(json!({ "qq": "10001" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let code = app.last_code();
    assert_eq!(app.mailer.sent.lock().unwrap()[0].to, "10001@qq.com");

    let register = json!({
        "qq": "10001",
        "nickname": "alice",
        "password": "secret1",
        "verificationCode": code,
    });
    let (status, body) = app.send(Method::POST, "/api/auth/register", None, Some(register.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["id"], 10001);
    assert!(body["token"].as_str().is_some());

    // already registered
    let (status, _) = app.send(Method::POST, "/api/auth/register", None, Some(register)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = app
        .send(Method::POST, "/api/send-verification", None, Some(json!({ "qq": "10001" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = app
        .send(Method::POST, "/api/auth/login", None, Some(json!({ "qq": "10001", "password": "secret1" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["nickname"], "alice");

    let (status, body) = app
        .send(Method::POST, "/api/auth/login", None, Some(json!({ "qq": "10001", "password": "wrong!" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn register_rejects_a_wrong_code() {
    let app = TestApp::new();
    app.send(Method::POST, "/api/send-verification", None, Some(json!({ "qq": "10002" })))
        .await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(json!({
                "qq": "10002",
                "nickname": "bob",
                "password": "secret1",
                "verificationCode": "not-it",
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verification_codes_are_rate_limited() {
    let settings = PortalSettings {
        max_codes_per_hour: 1,
        ..PortalSettings::default()
    };
    let app = TestApp::with(RecordingMailer::default(), settings);

    let (status, _) = app
        .send(Method::POST, "/api/send-verification", None, Some(json!({ "qq": "10003" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .send(Method::POST, "/api/send-verification", None, Some(json!({ "qq": "10003" })))
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn mail_failures_surface_as_503() {
    let mailer = RecordingMailer {
        fail_with: Some(MailError::AuthFailed),
        ..Default::default()
    };
    let app = TestApp::with(mailer, PortalSettings::default());

    let (status, body) = app
        .send(Method::POST, "/api/send-verification", None, Some(json!({ "qq": "10004" })))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["message"], MailError::AuthFailed.user_message());
}

#[tokio::test]
async fn user_routes_require_a_user_token() {
    let app = TestApp::new();

    let (status, _) = app.send(Method::POST, "/api/keys/claim", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let admin = app.admin_token().await;
    let (status, _) = app.send(Method::POST, "/api/keys/claim", Some(&admin), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let user = app.user_token(10010);
    let (status, _) = app.send(Method::GET, "/api/admin/users", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn claim_flow() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let user = app.user_token(10020);

    let (status, _) = app.send(Method::POST, "/api/keys/claim", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "not whitelisted yet");

    let (status, _) = app
        .send(Method::POST, "/api/admin/whitelist/add", Some(&admin), Some(json!({ "qq": "10020" })))
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app.send(Method::POST, "/api/keys/claim", Some(&user), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND, "no keys in stock");

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/keys/add",
            Some(&admin),
            Some(json!({ "keys": ["KEY-A", " KEY-B ", "KEY-A", ""] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["added"], 2);

    let (status, body) = app.send(Method::POST, "/api/keys/claim", Some(&user), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["key"], "KEY-A");

    let (status, _) = app.send(Method::POST, "/api/keys/claim", Some(&user), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = app.send(Method::POST, "/api/users/validate", Some(&user), None).await;
    assert_eq!(body["user"]["key"], "KEY-A");

    // banning voids the key
    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/users/ban",
            Some(&admin),
            Some(json!({ "userId": 10020, "ban": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["voidedKeys"], 1);

    let (_, body) = app.send(Method::GET, "/api/admin/keys", Some(&admin), None).await;
    let statuses: Vec<&str> = body["keys"]
        .as_array()
        .unwrap()
        .iter()
        .map(|k| k["status"].as_str().unwrap())
        .collect();
    assert!(statuses.contains(&"void"));
    assert!(statuses.contains(&"unclaimed"));

    let (status, _) = app.send(Method::POST, "/api/keys/claim", Some(&user), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN, "banned");
}

#[tokio::test]
async fn likes_hand_out_sequential_badges() {
    let app = TestApp::new();
    let admin = app.admin_token().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/contributors",
            Some(&admin),
            Some(json!({ "nickname": "Ann", "avatar_url": "https://img.example.com/ann.png", "points": 5 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let contributor_id = body["contributor"]["id"].as_i64().unwrap();

    for (qq, badge) in [(10030, 1), (10031, 2)] {
        let token = app.user_token(qq);
        let (status, body) = app
            .send(
                Method::POST,
                "/api/likes/toggle",
                Some(&token),
                Some(json!({ "contributorId": contributor_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["fanBadgeNumber"], badge);
    }

    let token = create_token(SECRET, 10030, "user10030", Role::User, 0, chrono::Duration::hours(1)).unwrap();
    let (status, body) = app
        .send(
            Method::POST,
            "/api/likes/toggle",
            Some(&token),
            Some(json!({ "contributorId": contributor_id })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["liked"], true);

    let (_, body) = app.send(Method::GET, "/api/users/10031/likes", None, None).await;
    assert_eq!(body[0]["fan_badge_number"], 2);

    let (_, body) = app.send(Method::GET, "/api/contributors", None, None).await;
    assert_eq!(body["contributors"][0]["likes_count"], 2);
}

#[tokio::test]
async fn points_never_go_negative() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    let (_, body) = app
        .send(
            Method::POST,
            "/api/admin/contributors",
            Some(&admin),
            Some(json!({ "nickname": "Ben", "avatar_url": "https://img.example.com/ben.png", "points": 3 })),
        )
        .await;
    let id = body["contributor"]["id"].as_i64().unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            &format!("/api/admin/contributors/{id}/points"),
            Some(&admin),
            Some(json!({ "adjustment": -10 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["oldPoints"], 3);
    assert_eq!(body["newPoints"], 0);
}

#[tokio::test]
async fn setup_runs_once_and_last_admin_is_kept() {
    let app = TestApp::new();
    let admin = app.admin_token().await;

    let (status, _) = app.send(Method::POST, "/api/admin/setup", None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, body) = app.send(Method::GET, "/api/admin/settings/admins", Some(&admin), None).await;
    let id = body["admins"][0]["id"].as_i64().unwrap();

    let (status, _) = app
        .send(Method::DELETE, "/api/admin/settings/admins/delete", Some(&admin), Some(json!({ "id": id })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleted_admin_loses_access() {
    let app = TestApp::new();
    let root = app.admin_token().await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/settings/admins/add",
            Some(&root),
            Some(json!({ "username": "second", "password": "secondpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let second_id = body["admin"]["id"].as_i64().unwrap();

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/auth/login",
            None,
            Some(json!({ "username": "second", "password": "secondpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let second = body["token"].as_str().unwrap().to_string();

    let (status, _) = app.send(Method::GET, "/api/admin/users/export", Some(&second), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .send(
            Method::DELETE,
            "/api/admin/settings/admins/delete",
            Some(&root),
            Some(json!({ "id": second_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send(Method::GET, "/api/admin/users/export", Some(&second), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app
        .send(
            Method::POST,
            "/api/admin/settings/admins/add",
            Some(&second),
            Some(json!({ "username": "third", "password": "thirdpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.send(Method::GET, "/api/admin/users/export", Some(&root), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn password_change_voids_older_admin_tokens() {
    let app = TestApp::new();
    let old = app.admin_token().await;

    let (status, _) = app
        .send(
            Method::POST,
            "/api/admin/auth/login",
            None,
            Some(json!({ "username": "root", "password": "rootpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/settings/change-password",
            Some(&old),
            Some(json!({ "currentPassword": "rootpass", "newPassword": "freshpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let fresh = body["token"].as_str().unwrap().to_string();

    let (status, _) = app.send(Method::GET, "/api/admin/settings/admins", Some(&old), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = app.send(Method::GET, "/api/admin/settings/admins", Some(&fresh), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/auth/login",
            None,
            Some(json!({ "username": "root", "password": "freshpass" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let relogged = body["token"].as_str().unwrap().to_string();
    let (status, _) = app.send(Method::GET, "/api/admin/settings/admins", Some(&relogged), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn api_url_round_trip() {
    let app = TestApp::new();
    let admin = app.admin_token().await;

    let (_, body) = app.send(Method::GET, "/api/settings/api-url", None, None).await;
    assert_eq!(body["apiBaseUrl"], PortalSettings::default().default_api_base_url);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/admin/settings/api-url",
            Some(&admin),
            Some(json!({ "apiBaseUrl": "ftp://nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app
        .send(
            Method::PUT,
            "/api/admin/settings/api-url",
            Some(&admin),
            Some(json!({ "apiBaseUrl": "https://api.example.com/v1" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = app.send(Method::GET, "/api/settings/api-url", None, None).await;
    assert_eq!(body["apiBaseUrl"], "https://api.example.com/v1");
}

#[tokio::test]
async fn mutations_are_audited() {
    let app = TestApp::new();
    let admin = app.admin_token().await;

    app.send(
        Method::POST,
        "/api/admin/whitelist/batch-add",
        Some(&admin),
        Some(json!({ "qqList": ["10040", 10041, "bogus"] })),
    )
    .await;

    let (status, body) = app
        .send(Method::GET, "/api/admin/logs?search=batch&limit=5", Some(&admin), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["total"], 1);
    assert_eq!(body["logs"][0]["admin_username"], "root");

    let (status, _) = app.send(Method::GET, "/api/admin/logs?date=yesterday", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = app.send(Method::DELETE, "/api/admin/logs/clear", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = app.send(Method::GET, "/api/admin/logs", Some(&admin), None).await;
    assert_eq!(body["pagination"]["total"], 1, "only the purge entry remains");
}

#[tokio::test]
async fn whitelist_compare_reports_both_sides() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.send(
        Method::POST,
        "/api/admin/whitelist/batch-add",
        Some(&admin),
        Some(json!({ "qqList": ["10050", "10051"] })),
    )
    .await;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/admin/whitelist/compare",
            Some(&admin),
            Some(json!({ "qqList": ["10051", "10052", "x"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["summary"]["matchCount"], 1);
    assert_eq!(body["comparison"]["notInWhitelist"], json!([10052]));
    assert_eq!(body["comparison"]["inWhitelistButNotInList"], json!([10050]));
    assert_eq!(body["comparison"]["invalid"], json!(["x"]));
}

#[tokio::test]
async fn export_is_csv() {
    let app = TestApp::new();
    let admin = app.admin_token().await;
    app.user_token(10060);

    let resp = app
        .router
        .clone()
        .oneshot(
            Request::get("/api/admin/users/export")
                .header(header::AUTHORIZATION, format!("Bearer {admin}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get(header::CONTENT_TYPE).unwrap(), "text/csv; charset=utf-8");
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert_eq!(csv, "qq_number,password\n10060,unused-hash\n");
}
