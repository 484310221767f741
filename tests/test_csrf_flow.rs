//! End-to-end CSRF protection through the HTTP adapter.
//!
//! Each test drives real hyper requests through `Application::handle`, so
//! the session cookie, form parsing and `_method` override are all in play.

mod common;

use hyper::StatusCode;
use soli_controller::helpers::sign;
use soli_controller::session::CSRF_SEED_KEY;
use soli_controller::{
    create_controller_type, Application, ControllerType, InMemorySessionStore, ServeConfig,
    SessionStore,
};
use std::collections::HashMap;
use std::sync::Arc;

use common::{body_text, form_request, session_cookie, test_config};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn posts_controller(config: &ServeConfig) -> Arc<ControllerType> {
    create_controller_type("posts")
        .protect_from_forgery_with(config)
        .action("new", |c| {
            let token = c.request()?.scratch.csrf_token.clone().unwrap_or_default();
            c.send(token)
        })
        .action("create", |c| c.send("created"))
        .action("destroy", |c| c.send("destroyed"))
        .build()
}

fn app_with(config: ServeConfig) -> Application {
    let posts = posts_controller(&config);
    Application::new(config)
        .get("/posts/new", posts.route("new").unwrap())
        .post("/posts", posts.route("create").unwrap())
        .delete("/posts/1", posts.route("destroy").unwrap())
}

fn app() -> Application {
    app_with(test_config())
}

/// GET the form page and return `(cookie, token)`.
async fn issue_token(app: &Application) -> (String, String) {
    let res = app
        .handle(form_request("GET", "/posts/new", None, ""))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let cookie = session_cookie(&res);
    let token = body_text(res).await;
    assert_eq!(token.len(), 40, "token should be hex SHA-1");
    (cookie, token)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_post_with_issued_token_is_accepted() {
    let app = app();
    let (cookie, token) = issue_token(&app).await;

    let res = app
        .handle(form_request(
            "POST",
            "/posts",
            Some(&cookie),
            &format!("title=Hello&authenticity_token={}", token),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "created");
}

#[tokio::test]
async fn test_post_with_wrong_token_is_forbidden() {
    let app = app();
    let (cookie, _) = issue_token(&app).await;

    let res = app
        .handle(form_request(
            "POST",
            "/posts",
            Some(&cookie),
            "authenticity_token=0000",
        ))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_text(res).await, "Forbidden");

    let res = app
        .handle(form_request("POST", "/posts", Some(&cookie), "title=x"))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_token_is_stable_for_a_session() {
    let app = app();
    let (cookie, first) = issue_token(&app).await;

    let res = app
        .handle(form_request("GET", "/posts/new", Some(&cookie), ""))
        .await;
    assert!(res.headers().get("set-cookie").is_none());
    assert_eq!(body_text(res).await, first);
}

#[tokio::test]
async fn test_first_contact_post_is_seeded_not_checked() {
    let app = app();
    let res = app
        .handle(form_request("POST", "/posts", None, "title=x"))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "created");
}

#[tokio::test]
async fn test_method_override_still_requires_token() {
    let app = app();
    let (cookie, token) = issue_token(&app).await;

    let res = app
        .handle(form_request("POST", "/posts/1", Some(&cookie), "_method=DELETE"))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .handle(form_request(
            "POST",
            "/posts/1",
            Some(&cookie),
            &format!("_method=DELETE&authenticity_token={}", token),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "destroyed");
}

#[tokio::test]
async fn test_custom_param_name() {
    let app = app_with(ServeConfig {
        csrf_param: "_csrf".to_string(),
        ..test_config()
    });
    let (cookie, token) = issue_token(&app).await;

    let res = app
        .handle(form_request(
            "POST",
            "/posts",
            Some(&cookie),
            &format!("authenticity_token={}", token),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = app
        .handle(form_request(
            "POST",
            "/posts",
            Some(&cookie),
            &format!("_csrf={}", token),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_environment_secret_and_param_drive_tokens() {
    let env: HashMap<&str, &str> = [
        ("SOLI_CSRF_SECRET", "k"),
        ("SOLI_CSRF_PARAM", "_csrf"),
        ("SOLI_LOG_REQUESTS", "false"),
    ]
    .into_iter()
    .collect();
    let config = ServeConfig::from_lookup(|key| env.get(key).map(|v| v.to_string())).unwrap();
    let sessions = Arc::new(InMemorySessionStore::default());
    let app = app_with(config).with_session_store(sessions.clone());

    let (cookie, token) = issue_token(&app).await;
    let id = cookie.trim_start_matches("session_id=");
    let session = sessions.load(id).expect("session saved");
    let seed = session
        .get(CSRF_SEED_KEY)
        .and_then(|v| v.as_str())
        .expect("seed issued");
    assert_eq!(token, sign(seed, "k"));

    let res = app
        .handle(form_request(
            "POST",
            "/posts",
            Some(&cookie),
            &format!("_csrf={}", token),
        ))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(body_text(res).await, "created");
}
