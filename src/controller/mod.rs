//! Per-request controllers.
//!
//! A controller type is registered once at start-up with
//! [`create_controller_type`] and frozen with [`ControllerBuilder::build`].
//! Each inbound request then gets a brand-new [`Controller`] instance from the
//! type's [`Route`] adapter: the instance is bound to the request/response
//! pair, runs the before-filters, the action and the after-filters, and is
//! dropped. Nothing on an instance outlives its request.
//!
//! # Example
//!
//! ```
//! use soli_controller::controller::{create_controller_type, Outcome};
//! use soli_controller::transport::{Request, Response};
//!
//! let posts = create_controller_type("posts")
//!     .action("index", |c| c.send("<ul></ul>"))
//!     .build();
//!
//! let route = posts.route("index").unwrap();
//! let mut req = Request::new("GET", "/posts");
//! let mut res = Response::new();
//! let outcome = route.call(&mut req, &mut res, |err| panic!("{}", err));
//! assert_eq!(outcome, Outcome::Completed);
//! assert_eq!(res.body_text(), "<ul></ul>");
//! ```

pub mod context;
pub mod dispatch;
pub mod extensions;
pub mod registry;

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use tracing::warn;

pub use context::Context;
pub use dispatch::{Outcome, Phase};
pub use extensions::{extensions_snapshot, register_extension, ExtensionFn, ExtensionTable};
pub use registry::{
    create_controller_type, lookup_controller, register_controller, route_to, ActionBody,
    ActionFn, ControllerBuilder, ControllerRegistry, ControllerType, Filter, Route, RouteHandler,
    CONTROLLER_REGISTRY,
};

use crate::error::{ContextError, ControllerError};
use crate::session::Session;
use crate::transport::{Params, Request, Response};
use dispatch::Signal;

/// Template rendering collaborator used by `render`.
pub trait Renderer: Send + Sync {
    fn render(&self, template: &str, locals: &Params) -> Result<String, String>;
}

/// One controller instance, living for exactly one request.
pub struct Controller<'a> {
    controller_type: Arc<ControllerType>,
    context: Context<'a>,
    extensions: Arc<ExtensionTable>,
    /// Values assigned by the action, handed to the renderer.
    pub locals: Params,
    signal: Option<Signal>,
}

impl<'a> Controller<'a> {
    /// Allocate an unbound instance of `controller_type`.
    pub fn new(controller_type: Arc<ControllerType>) -> Self {
        Self {
            controller_type,
            context: Context::new(),
            extensions: extensions_snapshot(),
            locals: Params::new(),
            signal: None,
        }
    }

    pub fn bind(
        &mut self,
        request: &'a mut Request,
        response: &'a mut Response,
        action_name: Option<&str>,
    ) {
        self.context.bind(request, response, action_name);
    }

    pub fn controller_name(&self) -> &str {
        self.controller_type.name()
    }

    pub fn controller_type(&self) -> &Arc<ControllerType> {
        &self.controller_type
    }

    pub fn context(&self) -> &Context<'a> {
        &self.context
    }

    pub fn request(&self) -> Result<&Request, ContextError> {
        self.context.request()
    }

    pub fn request_mut(&mut self) -> Result<&mut Request, ContextError> {
        self.context.request_mut()
    }

    pub fn response(&self) -> Result<&Response, ContextError> {
        self.context.response()
    }

    pub fn response_mut(&mut self) -> Result<&mut Response, ContextError> {
        self.context.response_mut()
    }

    pub fn action_name(&self) -> Result<Option<&str>, ContextError> {
        self.context.action_name()
    }

    pub fn params(&self) -> Result<&Params, ContextError> {
        self.context.params()
    }

    pub fn body(&self) -> Result<&Params, ContextError> {
        self.context.body()
    }

    pub fn session(&self) -> Result<Option<&Session>, ContextError> {
        self.context.session()
    }

    pub fn session_mut(&mut self) -> Result<Option<&mut Session>, ContextError> {
        self.context.session_mut()
    }

    /// The extension snapshot taken when this instance was allocated.
    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub fn call_extension(
        &mut self,
        name: &str,
        args: &[JsonValue],
    ) -> Result<JsonValue, ControllerError> {
        let extension = self
            .extensions
            .get(name)
            .cloned()
            .ok_or_else(|| ControllerError::UnknownExtension(name.to_string()))?;
        extension(self, args)
    }

    /// Advance the dispatch chain to its next step.
    pub fn next(&mut self) {
        self.proceed(None);
    }

    /// Abandon the chain and hand `err` to the outer failure continuation.
    pub fn fail(&mut self, err: ControllerError) {
        self.proceed(Some(err));
    }

    /// The single advancement primitive.
    ///
    /// Each dispatch step may advance at most once. A second call within the
    /// same step is a bug in the caller; it is logged and ignored.
    pub fn proceed(&mut self, err: Option<ControllerError>) {
        if let Some(previous) = &self.signal {
            warn!(
                controller = %self.controller_type.name(),
                previous = ?previous,
                "dispatch step advanced more than once; ignoring"
            );
            return;
        }
        self.signal = Some(match err {
            Some(err) => Signal::Fail(err),
            None => Signal::Proceed,
        });
    }

    pub(crate) fn set_in_action(&mut self, in_action: bool) {
        if let Ok(req) = self.context.request_mut() {
            req.scratch.in_action = in_action;
        }
    }
}

impl fmt::Display for Controller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.controller_type)
    }
}

impl fmt::Debug for Controller<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("controller", &self.controller_type.name())
            .field("bound", &self.context.is_bound())
            .field("locals", &self.locals)
            .finish()
    }
}
