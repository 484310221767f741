//! Request and response handles handed to controllers by the HTTP transport.
//!
//! These types are the boundary between the controller runtime and whatever
//! server drives it. The bundled hyper adapter in [`crate::serve`] builds
//! them from real HTTP traffic; tests build them directly.

use hyper::StatusCode;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::session::Session;

/// Request parameters, body fields and session data all share this shape.
pub type Params = serde_json::Map<String, JsonValue>;

/// Per-request flags that live only for the current dispatch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scratch {
    /// True while the action itself (not a filter) is running.
    pub in_action: bool,
    /// Parameter name forms must use to submit the CSRF token.
    pub csrf_param: Option<String>,
    /// CSRF token to embed in forms rendered for this request.
    pub csrf_token: Option<String>,
}

/// A transient user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashMessage {
    pub kind: String,
    pub message: String,
}

/// Flash messages read from the previous request and queued for the next one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Flash {
    pub incoming: Vec<FlashMessage>,
    pub outgoing: Vec<FlashMessage>,
}

/// An inbound HTTP request as seen by a controller.
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Effective method (after any `_method` override).
    pub method: String,
    /// Method the client actually sent.
    pub original_method: String,
    pub path: String,
    /// Lower-cased header names.
    pub headers: IndexMap<String, String>,
    pub query: Params,
    /// Route, query and body parameters merged by the transport.
    pub params: Params,
    pub body: Params,
    pub session: Option<Session>,
    pub flash: Flash,
    pub scratch: Scratch,
}

impl Request {
    pub fn new(method: &str, path: impl Into<String>) -> Self {
        let method = method.to_ascii_uppercase();
        Self {
            original_method: method.clone(),
            method,
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_body_field(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.body.insert(key.into(), value.into());
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_session(mut self, session: Session) -> Self {
        self.session = Some(session);
        self
    }

    /// Override the effective method while keeping the original one.
    pub fn with_method_override(mut self, method: &str) -> Self {
        self.method = method.to_ascii_uppercase();
        self
    }

    /// Look a parameter up in route params, then the body, then the query.
    pub fn param(&self, name: &str) -> Option<&JsonValue> {
        self.params
            .get(name)
            .or_else(|| self.body.get(name))
            .or_else(|| self.query.get(name))
            .filter(|value| !value.is_null())
    }

    /// Like [`Request::param`] but only for string values.
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.param(name).and_then(JsonValue::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Queue a flash message for the next request.
    pub fn flash(&mut self, kind: impl Into<String>, message: impl Into<String>) {
        self.flash.outgoing.push(FlashMessage {
            kind: kind.into(),
            message: message.into(),
        });
    }

    /// Messages of `kind` carried over from the previous request.
    pub fn flash_messages(&self, kind: &str) -> Vec<&str> {
        self.flash
            .incoming
            .iter()
            .filter(|m| m.kind == kind)
            .map(|m| m.message.as_str())
            .collect()
    }
}

/// What `send` accepts, mirroring the shapes a response body can take.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// No body; 204.
    Empty,
    /// Status only; the reason phrase becomes the body.
    Status(u16),
    /// HTML or plain text.
    Text(String),
    Json(JsonValue),
    Bytes(Vec<u8>),
    /// Any payload with an explicit status.
    WithStatus(Box<Payload>, u16),
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Empty
    }
}

impl From<u16> for Payload {
    fn from(status: u16) -> Self {
        Payload::Status(status)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<JsonValue> for Payload {
    fn from(value: JsonValue) -> Self {
        Payload::Json(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(bytes)
    }
}

impl<P: Into<Payload>> From<(P, u16)> for Payload {
    fn from((payload, status): (P, u16)) -> Self {
        Payload::WithStatus(Box::new(payload.into()), status)
    }
}

/// An outbound response being assembled by a controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: u16,
    /// Lower-cased header names, in insertion order.
    pub headers: IndexMap<String, String>,
    pub body: Vec<u8>,
    /// Set once `send` or `redirect` has produced a complete response.
    pub finished: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: IndexMap::new(),
            body: Vec::new(),
            finished: false,
        }
    }
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `payload` as the response.
    pub fn send(&mut self, payload: Payload) {
        match payload {
            Payload::Empty => {
                self.status = 204;
                self.body.clear();
            }
            Payload::Status(status) => {
                self.status = status;
                self.set_default_header("content-type", "text/plain; charset=utf-8");
                self.body = reason_phrase(status).into_bytes();
            }
            Payload::Text(text) => {
                self.set_default_header("content-type", "text/html; charset=utf-8");
                self.body = text.into_bytes();
            }
            Payload::Json(value) => {
                self.set_default_header("content-type", "application/json");
                self.body = value.to_string().into_bytes();
            }
            Payload::Bytes(bytes) => {
                self.set_default_header("content-type", "application/octet-stream");
                self.body = bytes;
            }
            Payload::WithStatus(inner, status) => {
                self.send(*inner);
                self.status = status;
            }
        }
        self.finished = true;
    }

    /// Get (`value == None`) or set a header. Returns the header's value afterwards.
    pub fn header(&mut self, key: &str, value: Option<&str>) -> Option<String> {
        let key = key.to_ascii_lowercase();
        if let Some(value) = value {
            self.headers.insert(key.clone(), value.to_string());
        }
        self.headers.get(&key).cloned()
    }

    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Redirect with 302 Found.
    pub fn redirect(&mut self, target: &str) {
        self.status = 302;
        self.headers
            .insert("location".to_string(), target.to_string());
        self.set_default_header("content-type", "text/plain; charset=utf-8");
        self.body = format!("Found. Redirecting to {}", target).into_bytes();
        self.finished = true;
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    fn set_default_header(&mut self, key: &str, value: &str) {
        self.headers
            .entry(key.to_string())
            .or_insert_with(|| value.to_string());
    }
}

fn reason_phrase(status: u16) -> String {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .map(str::to_string)
        .unwrap_or_else(|| status.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_param_lookup_order() {
        let req = Request::new("post", "/posts")
            .with_query("id", "from-query")
            .with_body_field("id", "from-body")
            .with_body_field("title", "hello")
            .with_query("page", 2);

        assert_eq!(req.method, "POST");
        assert_eq!(req.param_str("id"), Some("from-body"));
        assert_eq!(req.param_str("title"), Some("hello"));
        assert_eq!(req.param("page"), Some(&json!(2)));
        assert_eq!(req.param("missing"), None);

        let req = req.with_param("id", "from-route");
        assert_eq!(req.param_str("id"), Some("from-route"));
    }

    #[test]
    fn test_method_override_keeps_original() {
        let req = Request::new("POST", "/posts/1").with_method_override("delete");
        assert_eq!(req.method, "DELETE");
        assert_eq!(req.original_method, "POST");
    }

    #[test]
    fn test_flash_outgoing_and_incoming() {
        let mut req = Request::new("GET", "/");
        req.flash("info", "Saved");
        assert_eq!(
            req.flash.outgoing,
            vec![FlashMessage {
                kind: "info".into(),
                message: "Saved".into()
            }]
        );

        req.flash.incoming.push(FlashMessage {
            kind: "error".into(),
            message: "Nope".into(),
        });
        assert_eq!(req.flash_messages("error"), vec!["Nope"]);
        assert!(req.flash_messages("info").is_empty());
    }

    #[test]
    fn test_send_shapes() {
        let mut res = Response::new();
        res.send(Payload::Status(403));
        assert_eq!(res.status, 403);
        assert_eq!(res.body_text(), "Forbidden");
        assert!(res.finished);

        let mut res = Response::new();
        res.send(Payload::from("<p>hi</p>"));
        assert_eq!(res.status, 200);
        assert_eq!(
            res.get_header("Content-Type"),
            Some("text/html; charset=utf-8")
        );

        let mut res = Response::new();
        res.send(Payload::from(json!({"ok": true})));
        assert_eq!(res.get_header("content-type"), Some("application/json"));
        assert_eq!(res.body_text(), r#"{"ok":true}"#);

        let mut res = Response::new();
        res.send(Payload::from(("Sorry, cant find that", 404u16)));
        assert_eq!(res.status, 404);
        assert_eq!(res.body_text(), "Sorry, cant find that");

        let mut res = Response::new();
        res.send(Payload::from(()));
        assert_eq!(res.status, 204);
        assert!(res.body.is_empty());
    }

    #[test]
    fn test_header_get_and_set() {
        let mut res = Response::new();
        assert_eq!(res.header("Content-Length", None), None);
        assert_eq!(
            res.header("Content-Length", Some("123")),
            Some("123".to_string())
        );
        assert_eq!(res.header("content-length", None), Some("123".to_string()));
    }

    #[test]
    fn test_explicit_content_type_wins() {
        let mut res = Response::new();
        res.header("Content-Type", Some("text/plain"));
        res.send(Payload::from("plain"));
        assert_eq!(res.get_header("content-type"), Some("text/plain"));
    }

    #[test]
    fn test_redirect() {
        let mut res = Response::new();
        res.redirect("/posts");
        assert_eq!(res.status, 302);
        assert_eq!(res.get_header("Location"), Some("/posts"));
        assert!(res.finished);
    }
}
