//! Integration tests for controller dispatch, negotiation and action scripts
//! driven through the public API.

mod common;

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use soli_controller::controller::{lookup_controller, Filter};
use soli_controller::{
    create_controller_type, register_controller, register_extension, Application, Controller,
    ControllerError, Outcome, Params, Phase, Renderer, Request, Response,
};

use common::test_config;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, template: &str, locals: &Params) -> Result<String, String> {
        Ok(format!("<{}>{}", template, Value::Object(locals.clone())))
    }
}

fn require_user(c: &mut Controller<'_>) -> Result<(), ControllerError> {
    let signed_in = c.session()?.map_or(false, |s| s.contains("user_id"));
    if signed_in {
        c.next();
        Ok(())
    } else {
        c.redirect("/login")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
fn test_respond_to_through_application() {
    let articles = create_controller_type("articles")
        .action("index", |c| {
            c.respond_to(|format| {
                format.html(|c| c.send("<ul></ul>"))?;
                format.json(|c| c.send(json!([])))
            })
        })
        .build();
    let app = Application::new(test_config()).get("/articles", articles.route("index").unwrap());

    let res = app.dispatch(Request::new("GET", "/articles"));
    assert_eq!(res.body_text(), "<ul></ul>");

    let res = app.dispatch(Request::new("GET", "/articles").with_param("format", "json"));
    assert_eq!(res.body_text(), "[]");
    assert_eq!(res.get_header("content-type"), Some("application/json"));

    // Nothing fires for an unknown format, so the response is left untouched.
    let res = app.dispatch(Request::new("GET", "/articles").with_param("format", "csv"));
    assert_eq!(res.status, 200);
    assert!(!res.finished);
    assert!(res.body.is_empty());
}

#[test]
fn test_auth_filter_scoped_to_actions() {
    let account = create_controller_type("account")
        .before_only("require user", &["edit"], require_user)
        .action("show", |c| c.send("public"))
        .action("edit", |c| c.send("private"))
        .build();
    let labels: Vec<&str> = account.before_filters().iter().map(Filter::label).collect();
    assert_eq!(labels, vec!["require user"]);

    let mut req = Request::new("GET", "/account");
    let mut res = Response::new();
    let outcome = account
        .route("show")
        .unwrap()
        .call(&mut req, &mut res, |err| panic!("{}", err));
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(res.body_text(), "public");

    let mut req = Request::new("GET", "/account/edit").with_session(soli_controller::Session::new("s"));
    let mut res = Response::new();
    let outcome = account
        .route("edit")
        .unwrap()
        .call(&mut req, &mut res, |err| panic!("{}", err));
    assert_eq!(outcome, Outcome::Halted(Phase::Before(0)));
    assert_eq!(res.status, 302);
    assert_eq!(res.get_header("location"), Some("/login"));
}

#[test]
fn test_after_filter_sees_action_response() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&seen);
    let pages = create_controller_type("pages")
        .action("home", |c| c.send("home"))
        .after("audit", move |c| {
            let status = c.response()?.status;
            log.lock().unwrap().push(status);
            c.next();
            Ok(())
        })
        .build();

    let mut req = Request::new("GET", "/");
    let mut res = Response::new();
    let outcome = pages
        .route("home")
        .unwrap()
        .call(&mut req, &mut res, |err| panic!("{}", err));
    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(*seen.lock().unwrap(), vec![200]);
}

#[test]
fn test_script_action_renders_with_locals() {
    register_extension("flow_greeting", |c, args| {
        let name = args.first().and_then(Value::as_str).unwrap_or("there");
        Ok(json!(format!("Hello {} from {}", name, c.controller_name())))
    });

    let greeter = create_controller_type("greeter")
        .renderer(Arc::new(JsonRenderer))
        .script_action(
            "show",
            r#"
            # greet whoever is named in the query
            greeting = flow_greeting(params.name);
            render('greeter/show');
            "#,
        )
        .unwrap()
        .build();
    let app = Application::new(test_config()).get("/hello", greeter.route("show").unwrap());

    let res = app.dispatch(Request::new("GET", "/hello").with_param("name", "Ann"));
    assert_eq!(res.status, 200);
    assert_eq!(
        res.body_text(),
        r#"<greeter/show>{"greeting":"Hello Ann from greeter"}"#
    );
}

#[test]
fn test_script_runtime_error_becomes_500() {
    let broken = create_controller_type("broken")
        .script_action("index", "render();")
        .unwrap()
        .build();
    let app = Application::new(test_config()).get("/", broken.route("index").unwrap());

    let res = app.dispatch(Request::new("GET", "/"));
    assert_eq!(res.status, 500);
}

#[test]
fn test_route_to_registered_controller() {
    register_controller(
        create_controller_type("flow_status")
            .action("ping", |c| c.send("pong"))
            .build(),
    );
    assert!(lookup_controller("flow_status").is_some());

    let app = Application::new(test_config())
        .route_to("GET", "/ping", "flow_status#ping")
        .unwrap();
    assert_eq!(app.dispatch(Request::new("GET", "/ping")).body_text(), "pong");

    let err = Application::new(test_config())
        .route_to("GET", "/x", "flow_missing#ping")
        .err()
        .unwrap();
    assert!(matches!(err, ControllerError::UnknownController(ref name) if name == "flow_missing"));
}
