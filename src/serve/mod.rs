//! HTTP adapter for controller routes.
//!
//! [`Application`] holds an exact `(method, path)` route table and does the
//! transport work around each dispatch:
//! - Converting a hyper request into a [`Request`] (query, JSON or form body, `_method` override)
//! - Loading the session from its cookie, or creating one for a matched route
//! - Carrying flash messages across requests through the session
//! - Logging each request with the route's filtered parameters redacted
//!
//! [`serve`] runs the accept loop on a tokio `TcpListener` with hyper's http1
//! connection driver, and periodically sweeps expired sessions from the store.

pub mod config;
pub mod constants;
pub mod env_loader;

pub use config::ServeConfig;

use std::collections::BTreeSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use colored::Colorize;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Incoming};
use hyper::header::{HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::controller::{route_to, Route, RouteHandler};
use crate::error::{ControllerError, ServeError};
use crate::session::{
    create_session_cookie, extract_session_id_from_cookie, InMemorySessionStore, SessionStore,
};
use crate::transport::{FlashMessage, Params, Payload, Request, Response};
use constants::*;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Routes plus the session store and settings they are served with.
pub struct Application {
    routes: IndexMap<(String, String), Arc<dyn RouteHandler>>,
    sessions: Arc<dyn SessionStore>,
    config: ServeConfig,
}

impl Application {
    pub fn new(config: ServeConfig) -> Self {
        let sessions = Arc::new(InMemorySessionStore::new(config.session_max_age));
        Self {
            routes: IndexMap::new(),
            sessions,
            config,
        }
    }

    pub fn with_session_store(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn config(&self) -> &ServeConfig {
        &self.config
    }

    /// Mount `handler` at an exact method and path.
    pub fn route<H>(mut self, method: &str, path: &str, handler: H) -> Self
    where
        H: RouteHandler + 'static,
    {
        let key = (method.to_ascii_uppercase(), path.to_string());
        if self.routes.insert(key, Arc::new(handler)).is_some() {
            warn!(method, path, "route replaced");
        }
        self
    }

    pub fn get(self, path: &str, route: Route) -> Self {
        self.route("GET", path, route)
    }

    pub fn post(self, path: &str, route: Route) -> Self {
        self.route("POST", path, route)
    }

    pub fn put(self, path: &str, route: Route) -> Self {
        self.route("PUT", path, route)
    }

    pub fn patch(self, path: &str, route: Route) -> Self {
        self.route("PATCH", path, route)
    }

    pub fn delete(self, path: &str, route: Route) -> Self {
        self.route("DELETE", path, route)
    }

    /// Mount a `"controller#action"` spec resolved against the global registry.
    pub fn route_to(self, method: &str, path: &str, spec: &str) -> Result<Self, ControllerError> {
        let route = route_to(spec)?;
        Ok(self.route(method, path, route))
    }

    /// `(method, path)` pairs in registration order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes
            .keys()
            .map(|(method, path)| (method.as_str(), path.as_str()))
    }

    /// Serve one hyper request.
    pub async fn handle<B>(&self, req: hyper::Request<B>) -> hyper::Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = req.into_parts();
        let bytes = match Limited::new(body, MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                warn!(path = parts.uri.path(), %err, "could not read request body");
                return into_hyper(status_response(400));
            }
        };

        match build_request(&parts, &bytes) {
            Ok(request) => into_hyper(self.dispatch(request)),
            Err(err) => {
                warn!(path = parts.uri.path(), %err, "rejected request");
                into_hyper(status_response(400))
            }
        }
    }

    /// Run a transport-independent request through session handling and its route.
    ///
    /// Unmatched requests get a 404 without touching the session store.
    pub fn dispatch(&self, mut request: Request) -> Response {
        let started = Instant::now();

        let key = (request.method.clone(), request.path.clone());
        let Some(handler) = self.routes.get(&key).cloned() else {
            let response = status_response(404);
            self.log_request(&request, &response, None, started);
            return response;
        };

        let mut response = Response::new();
        let (mut session, is_new) = match extract_session_id_from_cookie(request.header("cookie"))
            .and_then(|id| self.sessions.load(&id))
        {
            Some(session) => (session, false),
            None => (self.sessions.create(), true),
        };
        if let Some(stored) = session.remove(FLASH_SESSION_KEY) {
            request.flash.incoming =
                serde_json::from_value::<Vec<FlashMessage>>(stored).unwrap_or_default();
        }
        request.session = Some(session);

        let mut failure = None;
        let outcome = handler.handle(&mut request, &mut response, &mut |err: ControllerError| {
            failure = Some(err)
        });

        if let Some(err) = failure {
            error!(
                method = %request.method,
                path = %request.path,
                ?outcome,
                %err,
                "request failed"
            );
            response = status_response(500);
        }

        if let Some(mut session) = request.session.take() {
            if !request.flash.outgoing.is_empty() {
                if let Ok(flash) = serde_json::to_value(&request.flash.outgoing) {
                    session.set(FLASH_SESSION_KEY, flash);
                }
            }
            self.sessions.save(&session);
            if is_new {
                response.headers.insert(
                    "set-cookie".to_string(),
                    create_session_cookie(session.id(), self.config.session_max_age),
                );
            }
        }

        self.log_request(&request, &response, handler.filter_params(), started);
        response
    }

    fn log_request(
        &self,
        request: &Request,
        response: &Response,
        filter: Option<&BTreeSet<String>>,
        started: Instant,
    ) {
        if !self.config.log_requests {
            return;
        }
        let empty = BTreeSet::new();
        info!(
            method = %request.method,
            path = %request.path,
            status = response.status,
            params = %JsonValue::Object(redact_params(&request.params, filter.unwrap_or(&empty))),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "request"
        );
    }

    /// Drop expired sessions from the store, returning how many went.
    pub fn sweep_sessions(&self) -> usize {
        let removed = self.sessions.cleanup();
        if removed > 0 {
            debug!(removed, "expired sessions dropped");
        }
        removed
    }
}

fn status_response(status: u16) -> Response {
    let mut response = Response::new();
    response.send(Payload::Status(status));
    response
}

fn build_request(parts: &hyper::http::request::Parts, body: &[u8]) -> Result<Request, ServeError> {
    let mut request = Request::new(parts.method.as_str(), parts.uri.path());

    for (name, value) in parts.headers.iter() {
        let Ok(value) = value.to_str() else {
            continue;
        };
        request
            .headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                let sep = if *name == hyper::header::COOKIE { "; " } else { ", " };
                existing.push_str(sep);
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }

    for (key, value) in parse_query_string(parts.uri.query().unwrap_or("")) {
        request.query.insert(key, JsonValue::String(value));
    }
    request.body = parse_body(request.header("content-type"), body)?;

    request.params = request.query.clone();
    for (key, value) in &request.body {
        request.params.insert(key.clone(), value.clone());
    }

    apply_method_override(&mut request);
    Ok(request)
}

/// HTML forms can only POST; `_method` selects PUT, PATCH or DELETE instead.
fn apply_method_override(request: &mut Request) {
    if request.original_method != "POST" {
        return;
    }
    let Some(method) = request.param_str(METHOD_OVERRIDE_PARAM) else {
        return;
    };
    let method = method.to_ascii_uppercase();
    if OVERRIDABLE_METHODS.contains(&method.as_str()) {
        debug!(from = %request.original_method, to = %method, "method override");
        request.method = method;
    }
}

/// Decode `a=1&b=two+words` into ordered pairs.
pub fn parse_query_string(query: &str) -> Vec<(String, String)> {
    let decode = |s: &str| {
        let s = s.replace('+', " ");
        urlencoding::decode(&s)
            .map(|decoded| decoded.into_owned())
            .unwrap_or(s)
    };

    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (decode(key), decode(value)),
            None => (decode(pair), String::new()),
        })
        .collect()
}

/// Parse a JSON object or URL-encoded form body. Other content types yield no fields.
pub fn parse_body(content_type: Option<&str>, body: &[u8]) -> Result<Params, ServeError> {
    if body.is_empty() {
        return Ok(Params::new());
    }
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();

    if content_type.starts_with("application/json") {
        return match serde_json::from_slice::<JsonValue>(body) {
            Ok(JsonValue::Object(fields)) => Ok(fields),
            Ok(_) => Err(ServeError::InvalidBody(
                "JSON body must be an object".to_string(),
            )),
            Err(err) => Err(ServeError::InvalidBody(err.to_string())),
        };
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let text = std::str::from_utf8(body).map_err(|e| ServeError::InvalidBody(e.to_string()))?;
        return Ok(parse_query_string(text)
            .into_iter()
            .map(|(key, value)| (key, JsonValue::String(value)))
            .collect());
    }

    Ok(Params::new())
}

/// Copy of `params` with the values of `filter` keys replaced, at any depth.
pub fn redact_params(params: &Params, filter: &BTreeSet<String>) -> Params {
    params
        .iter()
        .map(|(key, value)| {
            let value = if filter.contains(key) {
                JsonValue::String(FILTERED_PLACEHOLDER.to_string())
            } else {
                redact_value(value, filter)
            };
            (key.clone(), value)
        })
        .collect()
}

fn redact_value(value: &JsonValue, filter: &BTreeSet<String>) -> JsonValue {
    match value {
        JsonValue::Object(map) => JsonValue::Object(redact_params(map, filter)),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|v| redact_value(v, filter)).collect())
        }
        other => other.clone(),
    }
}

fn into_hyper(response: Response) -> hyper::Response<Full<Bytes>> {
    let mut out = hyper::Response::new(Full::new(Bytes::from(response.body)));
    *out.status_mut() = StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    for (name, value) in &response.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                out.headers_mut().insert(name, value);
            }
            _ => warn!(header = %name, "dropping invalid response header"),
        }
    }
    out
}

/// Install the fmt subscriber, honouring `RUST_LOG`. Safe to call twice.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn print_banner(app: &Application, addr: SocketAddr) {
    println!(
        "\n{} {}",
        "Server listening on".bold(),
        format!("http://{}", addr).cyan().bold()
    );
    for (method, path) in app.routes() {
        println!("  {:<7} {}", method.green(), path);
    }
    println!(
        "CSRF parameter: {}  Session max-age: {}s\n",
        app.config.csrf_param.yellow(),
        app.config.session_max_age.as_secs()
    );
}

/// Bind `app.config().addr()` and serve until the process exits.
pub async fn serve(app: Application) -> Result<(), ServeError> {
    let addr = app.config.addr();
    let listener = TcpListener::bind(addr).await?;
    print_banner(&app, addr);
    info!(%addr, routes = app.routes.len(), "server started");

    let app = Arc::new(app);

    let sweeper = Arc::clone(&app);
    tokio::spawn(async move {
        let mut ticker =
            tokio::time::interval(Duration::from_secs(SESSION_CLEANUP_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            sweeper.sweep_sessions();
        }
    });

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };
        let io = TokioIo::new(stream);
        let app = Arc::clone(&app);

        tokio::spawn(async move {
            let service = service_fn(move |req: hyper::Request<Incoming>| {
                let app = Arc::clone(&app);
                async move { Ok::<_, Infallible>(app.handle(req).await) }
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                debug!(%peer, %err, "connection closed with error");
            }
        });
    }
}
