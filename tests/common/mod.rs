//! Shared helpers for integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use soli_controller::ServeConfig;

pub const SECRET: &str = "integration-secret";

/// Quiet config with a fixed CSRF secret.
pub fn test_config() -> ServeConfig {
    ServeConfig {
        csrf_secret: SECRET.to_string(),
        log_requests: false,
        ..ServeConfig::default()
    }
}

pub fn form_request(
    method: &str,
    uri: &str,
    cookie: Option<&str>,
    form: &str,
) -> hyper::Request<Full<Bytes>> {
    let mut builder = hyper::Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/x-www-form-urlencoded");
    if let Some(cookie) = cookie {
        builder = builder.header("cookie", cookie);
    }
    builder
        .body(Full::new(Bytes::from(form.to_string())))
        .expect("valid request")
}

/// `session_id=...` from a `Set-Cookie` header.
pub fn session_cookie(res: &hyper::Response<Full<Bytes>>) -> String {
    res.headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .expect("response should set a session cookie")
        .to_string()
}

pub async fn body_text(res: hyper::Response<Full<Bytes>>) -> String {
    let bytes = res
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}
