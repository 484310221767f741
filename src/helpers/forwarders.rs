//! Thin forwarders to the response transport.
//!
//! `send` and `redirect` also advance the dispatch chain, but only while the
//! action itself is running. Called from a filter they just write the
//! response and the filter decides whether to continue.

use tracing::debug;

use crate::controller::Controller;
use crate::error::ControllerError;
use crate::transport::{Params, Payload};

impl<'a> Controller<'a> {
    fn advance_if_in_action(&mut self) -> Result<(), ControllerError> {
        if self.request()?.scratch.in_action {
            self.next();
        }
        Ok(())
    }

    /// Send a response, as the transport accepts it.
    ///
    /// ```text
    /// send(())                       // 204
    /// send(json!({"some": "json"}))
    /// send("<p>some html</p>")
    /// send(("Sorry, cant find that", 404))
    /// send(Payload::Status(404))
    /// ```
    pub fn send(&mut self, payload: impl Into<Payload>) -> Result<(), ControllerError> {
        self.response_mut()?.send(payload.into());
        self.advance_if_in_action()
    }

    /// Get (`value == None`) or set a response header. Never advances.
    pub fn header(
        &mut self,
        key: &str,
        value: Option<&str>,
    ) -> Result<Option<String>, ControllerError> {
        Ok(self.response_mut()?.header(key, value))
    }

    pub fn redirect(&mut self, target: &str) -> Result<(), ControllerError> {
        debug!(controller = %self.controller_name(), target, "redirect");
        self.response_mut()?.redirect(target);
        self.advance_if_in_action()
    }

    /// Queue a flash message for the next request.
    pub fn flash(&mut self, kind: &str, message: &str) -> Result<(), ControllerError> {
        self.request_mut()?.flash(kind, message);
        Ok(())
    }

    /// Render `template` (default `<controller>/<action>`) with this
    /// instance's locals and send it as HTML.
    pub fn render(&mut self, template: Option<&str>) -> Result<(), ControllerError> {
        let renderer = self
            .controller_type()
            .renderer()
            .cloned()
            .ok_or_else(|| ControllerError::NoRenderer(self.controller_name().to_string()))?;

        let template = match template {
            Some(template) => template.to_string(),
            None => {
                let action = self.action_name()?.unwrap_or("index");
                format!("{}/{}", self.controller_name(), action)
            }
        };

        let locals = self.render_locals()?;
        let html = renderer
            .render(&template, &locals)
            .map_err(|message| ControllerError::Render {
                template: template.clone(),
                message,
            })?;
        self.send(html)
    }

    /// Locals handed to templates: the instance's locals, plus the
    /// published CSRF field when a filter issued one.
    fn render_locals(&self) -> Result<Params, ControllerError> {
        let mut locals = self.locals.clone();
        let scratch = &self.request()?.scratch;
        if let (Some(param), Some(token)) = (&scratch.csrf_param, &scratch.csrf_token) {
            locals
                .entry("csrf_param")
                .or_insert_with(|| param.clone().into());
            locals
                .entry("csrf_token")
                .or_insert_with(|| token.clone().into());
        }
        Ok(locals)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::{create_controller_type, Outcome, Phase, Renderer};
    use crate::transport::{Request, Response};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;

    struct EchoRenderer;

    impl Renderer for EchoRenderer {
        fn render(&self, template: &str, locals: &Params) -> Result<String, String> {
            if template == "broken" {
                return Err("syntax error".to_string());
            }
            Ok(format!("{} {}", template, serde_json::Value::Object(locals.clone())))
        }
    }

    #[test]
    fn test_send_in_action_advances_to_after_filters() {
        let ty = create_controller_type("posts")
            .action("index", |c| c.send("list"))
            .after("stamp", |c| {
                c.header("x-after", Some("yes"))?;
                c.next();
                Ok(())
            })
            .build();

        let mut req = Request::new("GET", "/posts");
        let mut res = Response::new();
        let outcome = ty.route("index").unwrap().call(&mut req, &mut res, |_| {});
        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(res.get_header("x-after"), Some("yes"));
    }

    #[test]
    fn test_send_in_filter_does_not_advance() {
        let ty = create_controller_type("posts")
            .before("gate", |c| c.redirect("/login"))
            .action("index", |c| c.send("list"))
            .build();

        let mut req = Request::new("GET", "/posts");
        let mut res = Response::new();
        let outcome = ty.route("index").unwrap().call(&mut req, &mut res, |_| {});
        assert_eq!(outcome, Outcome::Halted(Phase::Before(0)));
        assert_eq!(res.status, 302);
        assert_eq!(res.get_header("location"), Some("/login"));
    }

    #[test]
    fn test_header_getter_never_advances() {
        let ty = create_controller_type("posts")
            .action("index", |c| {
                c.header("content-length", Some("123"))?;
                let value = c.header("content-length", None)?;
                c.locals.insert("len".into(), json!(value));
                Ok(())
            })
            .build();

        let mut req = Request::new("GET", "/posts");
        let mut res = Response::new();
        let outcome = ty.route("index").unwrap().call(&mut req, &mut res, |_| {});
        assert_eq!(outcome, Outcome::Halted(Phase::Action));
        assert_eq!(res.get_header("content-length"), Some("123"));
    }

    #[test]
    fn test_flash_reaches_request() {
        let ty = create_controller_type("posts")
            .action("create", |c| {
                c.flash("info", "Post created")?;
                c.redirect("/posts")
            })
            .build();

        let mut req = Request::new("POST", "/posts");
        let mut res = Response::new();
        ty.route("create").unwrap().call(&mut req, &mut res, |_| {});
        assert_eq!(req.flash.outgoing.len(), 1);
        assert_eq!(req.flash.outgoing[0].message, "Post created");
    }

    #[test]
    fn test_render_uses_default_template_and_locals() {
        let ty = create_controller_type("posts")
            .renderer(Arc::new(EchoRenderer))
            .action("index", |c| {
                c.locals.insert("items".into(), json!([]));
                c.render(None)
            })
            .build();

        let mut req = Request::new("GET", "/posts");
        req.scratch.csrf_param = Some("authenticity_token".into());
        req.scratch.csrf_token = Some("t".into());
        let mut res = Response::new();
        let outcome = ty.route("index").unwrap().call(&mut req, &mut res, |_| {});

        assert_eq!(outcome, Outcome::Completed);
        assert_eq!(
            res.body_text(),
            r#"posts/index {"csrf_param":"authenticity_token","csrf_token":"t","items":[]}"#
        );
    }

    #[test]
    fn test_render_errors() {
        let plain = create_controller_type("plain")
            .action("index", |c| c.render(None))
            .build();
        let mut seen = None;
        let mut req = Request::new("GET", "/");
        let mut res = Response::new();
        plain
            .route("index")
            .unwrap()
            .call(&mut req, &mut res, |err| seen = Some(err));
        assert!(matches!(seen, Some(ControllerError::NoRenderer(_))));

        let broken = create_controller_type("broken")
            .renderer(Arc::new(EchoRenderer))
            .action("index", |c| c.render(Some("broken")))
            .build();
        let mut seen = None;
        let mut req = Request::new("GET", "/");
        let mut res = Response::new();
        broken
            .route("index")
            .unwrap()
            .call(&mut req, &mut res, |err| seen = Some(err));
        assert!(matches!(
            seen,
            Some(ControllerError::Render { template, .. }) if template == "broken"
        ));
    }
}
