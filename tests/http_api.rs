use std::sync::Arc;
use std::time::Duration;

use argon2::Params;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
    response::Response,
};
use http_body_util::BodyExt;
use quaderno::application::audit::AuditService;
use quaderno::application::auth::password::Argon2Verifier;
use quaderno::application::auth::{SessionManager, TokenIssuer, TokenStore};
use quaderno::application::posts::PostService;
use quaderno::application::uploads::UploadService;
use quaderno::cache::{CacheConfig, CachedPostsRepo, PostCache};
use quaderno::infra::http::{self, AppState, HealthProbe};
use quaderno::infra::memory::MemoryRepositories;
use quaderno::infra::uploads::UploadStorage;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

const UPLOAD_LIMIT: usize = 1024 * 1024;
const BOUNDARY: &str = "quaderno-test-boundary";

struct TestApp {
    router: Router,
    uploads_dir: TempDir,
}

fn test_app() -> TestApp {
    let repos = Arc::new(MemoryRepositories::new());
    let audit = AuditService::new(repos.clone());
    let store = TokenStore::new(repos.clone());
    let issuer = TokenIssuer::new(
        "http-test-secret",
        Duration::from_secs(900),
        Duration::from_secs(3600),
        store.clone(),
    );
    let params = Params::new(1024, 1, 1, None).expect("argon2 params");
    let sessions = Arc::new(SessionManager::new(
        repos.clone(),
        Arc::new(Argon2Verifier::with_params("pepper", params)),
        issuer,
        store,
        audit.clone(),
    ));

    let cache_config = CacheConfig::default();
    let posts_repo = Arc::new(CachedPostsRepo::new(
        repos.clone(),
        Arc::new(PostCache::for_posts(&cache_config)),
        cache_config.post_ttl(),
    ));

    let uploads_dir = tempfile::tempdir().expect("tempdir");
    let storage =
        Arc::new(UploadStorage::new(uploads_dir.path().to_path_buf()).expect("upload storage"));

    let state = AppState {
        sessions,
        posts: Arc::new(PostService::new(posts_repo, audit.clone())),
        uploads: Arc::new(UploadService::new(
            repos.clone(),
            storage,
            audit,
            UPLOAD_LIMIT as u64,
        )),
        health: HealthProbe::Memory(repos),
    };

    TestApp {
        router: http::build_router(state, UPLOAD_LIMIT),
        uploads_dir,
    }
}

async fn send(app: &TestApp, request: Request<Body>) -> Response {
    app.router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request should build")
}

async fn body_json(response: Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body readable")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

fn refresh_cookie(response: &Response) -> String {
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie header")
        .to_str()
        .expect("ascii cookie");
    assert!(set_cookie.contains("HttpOnly"), "{set_cookie}");
    assert!(set_cookie.contains("Path=/"), "{set_cookie}");
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

/// Register `a@x.com` and sign in, returning the access token and cookie pair.
async fn signed_in(app: &TestApp) -> (String, String) {
    let response = send(
        app,
        json_request(
            Method::POST,
            "/auth/sign-up",
            json!({"name": "A", "email": "a@x.com", "password": "pw"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = send(
        app,
        json_request(
            Method::POST,
            "/auth/sign-in",
            json!({"email": "a@x.com", "password": "pw"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = refresh_cookie(&response);
    let body = body_json(response).await;
    let token = body["token"].as_str().expect("token").to_string();
    (token, cookie)
}

#[tokio::test]
async fn sign_up_returns_account_without_digest() {
    let app = test_app();
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/auth/sign-up",
            json!({"name": "A", "email": "a@x.com", "password": "pw"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["email"], "a@x.com");
    assert!(body.get("password_digest").is_none());
}

#[tokio::test]
async fn invalid_sign_up_is_rejected_with_error_body() {
    let app = test_app();
    let response = send(
        &app,
        json_request(
            Method::POST,
            "/auth/sign-up",
            json!({"name": "A", "email": "not-an-email", "password": "pw"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_input");
}

#[tokio::test]
async fn wrong_password_is_unauthorized() {
    let app = test_app();
    signed_in(&app).await;

    let response = send(
        &app,
        json_request(
            Method::POST,
            "/auth/sign-in",
            json!({"email": "a@x.com", "password": "wrong"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_credentials");
}

#[tokio::test]
async fn refresh_rotates_cookie_and_rejects_replay() {
    let app = test_app();
    let (_, cookie) = signed_in(&app).await;

    let refresh = |cookie: String| {
        Request::builder()
            .method(Method::POST)
            .uri("/auth/refresh")
            .header(header::COOKIE, cookie)
            .body(Body::empty())
            .expect("request should build")
    };

    let response = send(&app, refresh(cookie.clone())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let rotated = refresh_cookie(&response);
    assert_ne!(rotated, cookie);

    let replay = send(&app, refresh(cookie)).await;
    assert_eq!(replay.status(), StatusCode::NOT_FOUND);

    let missing = send(
        &app,
        Request::builder()
            .method(Method::POST)
            .uri("/auth/refresh")
            .body(Body::empty())
            .expect("request should build"),
    )
    .await;
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn posts_require_bearer_token() {
    let app = test_app();

    let anonymous = send(
        &app,
        Request::builder()
            .uri("/posts")
            .body(Body::empty())
            .expect("request should build"),
    )
    .await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let forged = send(
        &app,
        Request::builder()
            .uri("/posts")
            .header(header::AUTHORIZATION, "Bearer not.a.jwt")
            .body(Body::empty())
            .expect("request should build"),
    )
    .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(forged).await;
    assert_eq!(body["error"]["code"], "invalid_token");
}

#[tokio::test]
async fn post_crud_round_trip() {
    let app = test_app();
    let (token, _) = signed_in(&app).await;
    let bearer = format!("Bearer {token}");

    let mut create = json_request(Method::POST, "/posts", json!({"title": "T", "body": "B"}));
    create
        .headers_mut()
        .insert(header::AUTHORIZATION, bearer.parse().expect("header"));
    let response = send(&app, create).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let id = created["id"].as_i64().expect("id");

    let mut update = json_request(
        Method::PATCH,
        &format!("/posts/{id}"),
        json!({"body": "B2"}),
    );
    update
        .headers_mut()
        .insert(header::AUTHORIZATION, bearer.parse().expect("header"));
    let response = send(&app, update).await;
    assert_eq!(response.status(), StatusCode::OK);
    let updated = body_json(response).await;
    assert_eq!(updated["title"], "T");
    assert_eq!(updated["body"], "B2");

    let authorized = |method: Method, uri: String| {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, bearer.clone())
            .body(Body::empty())
            .expect("request should build")
    };

    let response = send(&app, authorized(Method::GET, "/posts".to_string())).await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = body_json(response).await;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));

    let response = send(&app, authorized(Method::DELETE, format!("/posts/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, authorized(Method::GET, format!("/posts/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = send(&app, authorized(Method::DELETE, format!("/posts/{id}"))).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

fn multipart_upload(cookie: &str, file_name: &str, contents: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"comment\"\r\n\r\n\
         draft notes\r\n\
         --{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\n\
         Content-Type: text/plain\r\n\r\n\
         {contents}\r\n\
         --{BOUNDARY}--\r\n"
    );
    Request::builder()
        .method(Method::POST)
        .uri("/files")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .header(header::COOKIE, cookie)
        .body(Body::from(body))
        .expect("request should build")
}

#[tokio::test]
async fn upload_stores_file_for_cookie_owner() {
    let app = test_app();
    let (_, cookie) = signed_in(&app).await;

    let response = send(&app, multipart_upload(&cookie, "notes.txt", "hello")).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let record = body_json(response).await;
    assert_eq!(record["file_name"], "notes.txt");
    assert_eq!(record["comment"], "draft notes");

    let author_id = record["author_id"].as_i64().expect("author id");
    let stored = app
        .uploads_dir
        .path()
        .join(author_id.to_string())
        .join("notes.txt");
    assert_eq!(std::fs::read_to_string(stored).expect("stored file"), "hello");

    let duplicate = send(&app, multipart_upload(&cookie, "notes.txt", "again")).await;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    // The lookup does not rotate the cookie, so it still refreshes.
    let refresh = Request::builder()
        .method(Method::POST)
        .uri("/auth/refresh")
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("request should build");
    assert_eq!(send(&app, refresh).await.status(), StatusCode::OK);
}

#[tokio::test]
async fn upload_without_cookie_is_unauthorized() {
    let app = test_app();
    let response = send(&app, multipart_upload("other=1", "notes.txt", "hello")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn healthz_reports_backend() {
    let app = test_app();
    let response = send(
        &app,
        Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .expect("request should build"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["backend"], "memory");
}
