//! Controller types, their registration builder and route adapters.
//!
//! This module handles:
//! - Building a controller type's actions and filters once, at start-up
//! - Freezing that configuration behind an `Arc` shared by every instance
//! - Producing route adapters that instantiate a controller per request
//! - A process-wide registry so transports can resolve `"posts#index"` specs

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use tracing::debug;

use super::dispatch::{self, Outcome};
use super::{Controller, Renderer};
use crate::error::{ControllerError, ScriptError};
use crate::helpers::csrf;
use crate::sandbox::{self, Program};
use crate::serve::ServeConfig;
use crate::transport::{Request, Response};

/// Native action or filter body.
pub type ActionFn = Arc<dyn Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync>;

/// What runs when an action is dispatched.
#[derive(Clone)]
pub enum ActionBody {
    Native(ActionFn),
    /// An action script, parsed once at registration.
    Script(Arc<Program>),
}

impl ActionBody {
    pub(crate) fn invoke(&self, controller: &mut Controller<'_>) -> Result<(), ControllerError> {
        match self {
            ActionBody::Native(action) => action(controller),
            ActionBody::Script(program) => controller
                .run_program(program)
                .map(|_| ())
                .map_err(ControllerError::from),
        }
    }
}

impl fmt::Debug for ActionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionBody::Native(_) => f.write_str("Native"),
            ActionBody::Script(program) => write!(f, "Script({} statements)", program.statements.len()),
        }
    }
}

/// A before- or after-filter.
#[derive(Clone)]
pub struct Filter {
    label: String,
    /// Empty = all actions.
    actions: Vec<String>,
    handler: ActionFn,
}

impl Filter {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    /// Whether this filter runs for `action`.
    pub fn applies_to(&self, action: &str) -> bool {
        self.actions.is_empty() || self.actions.iter().any(|a| a == action)
    }

    pub(crate) fn run(&self, controller: &mut Controller<'_>) -> Result<(), ControllerError> {
        (self.handler)(controller)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("label", &self.label)
            .field("actions", &self.actions)
            .finish()
    }
}

/// The frozen registry of one named controller: its actions, filters and
/// filtered parameter names. Shared read-only by every instance.
pub struct ControllerType {
    name: String,
    actions: IndexMap<String, ActionBody>,
    before: Vec<Filter>,
    after: Vec<Filter>,
    filter_params: BTreeSet<String>,
    renderer: Option<Arc<dyn Renderer>>,
}

impl ControllerType {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn action(&self, name: &str) -> Option<&ActionBody> {
        self.actions.get(name)
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Action names in registration order.
    pub fn action_names(&self) -> Vec<&str> {
        self.actions.keys().map(String::as_str).collect()
    }

    pub fn before_filters(&self) -> &[Filter] {
        &self.before
    }

    pub fn after_filters(&self) -> &[Filter] {
        &self.after
    }

    /// Parameter names an external logger should redact.
    pub fn filter_params(&self) -> &BTreeSet<String> {
        &self.filter_params
    }

    pub fn renderer(&self) -> Option<&Arc<dyn Renderer>> {
        self.renderer.as_ref()
    }

    /// Build the transport-facing adapter for `action`.
    pub fn route(self: &Arc<Self>, action: &str) -> Result<Route, ControllerError> {
        if !self.has_action(action) {
            return Err(ControllerError::unknown_action(&self.name, action));
        }
        Ok(Route {
            controller: Arc::clone(self),
            action: action.to_string(),
        })
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Controller {}", self.name)
    }
}

impl fmt::Debug for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerType")
            .field("name", &self.name)
            .field("actions", &self.actions)
            .field("before", &self.before)
            .field("after", &self.after)
            .field("filter_params", &self.filter_params)
            .field("renderer", &self.renderer.is_some())
            .finish()
    }
}

/// Start registering a controller type. Every registry starts empty.
pub fn create_controller_type(name: impl Into<String>) -> ControllerBuilder {
    let name = name.into();
    ControllerBuilder {
        controller: ControllerType {
            name: if name.is_empty() {
                "Controller".to_string()
            } else {
                name
            },
            actions: IndexMap::new(),
            before: Vec::new(),
            after: Vec::new(),
            filter_params: BTreeSet::new(),
            renderer: None,
        },
    }
}

/// Registration-time builder for a [`ControllerType`].
pub struct ControllerBuilder {
    controller: ControllerType,
}

impl ControllerBuilder {
    /// Register a native action. Re-registering a name replaces it.
    pub fn action<F>(mut self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync + 'static,
    {
        self.controller
            .actions
            .insert(name.into(), ActionBody::Native(Arc::new(action)));
        self
    }

    /// Register an action written as an action script.
    ///
    /// The script is parsed here so syntax errors surface at start-up.
    pub fn script_action(
        mut self,
        name: impl Into<String>,
        source: &str,
    ) -> Result<Self, ScriptError> {
        let program = sandbox::parse(source)?;
        self.controller
            .actions
            .insert(name.into(), ActionBody::Script(Arc::new(program)));
        Ok(self)
    }

    pub fn before<F>(self, label: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync + 'static,
    {
        self.before_only(label, &[], filter)
    }

    /// A before-filter limited to `actions` (empty = all).
    pub fn before_only<F>(mut self, label: impl Into<String>, actions: &[&str], filter: F) -> Self
    where
        F: Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync + 'static,
    {
        self.controller.before.push(Filter {
            label: label.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            handler: Arc::new(filter),
        });
        self
    }

    pub fn after<F>(self, label: impl Into<String>, filter: F) -> Self
    where
        F: Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync + 'static,
    {
        self.after_only(label, &[], filter)
    }

    /// An after-filter limited to `actions` (empty = all).
    pub fn after_only<F>(mut self, label: impl Into<String>, actions: &[&str], filter: F) -> Self
    where
        F: Fn(&mut Controller<'_>) -> Result<(), ControllerError> + Send + Sync + 'static,
    {
        self.controller.after.push(Filter {
            label: label.into(),
            actions: actions.iter().map(|a| a.to_string()).collect(),
            handler: Arc::new(filter),
        });
        self
    }

    /// Install CSRF protection as a before-filter for every action.
    pub fn protect_from_forgery(self, secret: impl Into<String>, param_name: Option<&str>) -> Self {
        self.before("protect from forgery", csrf::filter(secret, param_name))
    }

    /// [`protect_from_forgery`](Self::protect_from_forgery) with the secret
    /// and parameter name from a server configuration.
    pub fn protect_from_forgery_with(self, config: &ServeConfig) -> Self {
        let secret = config.csrf_secret.clone();
        self.protect_from_forgery(secret, Some(config.csrf_param.as_str()))
    }

    /// Append parameter names to redact from request logs.
    pub fn filter_parameter_logging<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.controller
            .filter_params
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.controller.renderer = Some(renderer);
        self
    }

    /// Freeze the configuration.
    pub fn build(self) -> Arc<ControllerType> {
        debug!(
            controller = %self.controller.name,
            actions = ?self.controller.action_names(),
            before = self.controller.before.len(),
            after = self.controller.after.len(),
            "controller type built"
        );
        Arc::new(self.controller)
    }
}

/// Transport-facing handler for one action of one controller type.
#[derive(Clone)]
pub struct Route {
    controller: Arc<ControllerType>,
    action: String,
}

impl Route {
    pub fn controller(&self) -> &Arc<ControllerType> {
        &self.controller
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Handle one request with a brand-new controller instance.
    ///
    /// `next` is the outer failure continuation: it is invoked only when the
    /// chain fails, with the error that stopped it.
    pub fn call<N>(&self, request: &mut Request, response: &mut Response, next: N) -> Outcome
    where
        N: FnOnce(ControllerError),
    {
        let mut controller = Controller::new(Arc::clone(&self.controller));
        controller.bind(request, response, Some(&self.action));
        dispatch::run(&mut controller, &self.action, next)
    }
}

/// Anything a transport can hand a request/response pair to.
pub trait RouteHandler: Send + Sync {
    fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: &mut dyn FnMut(ControllerError),
    ) -> Outcome;

    /// Parameter names to redact when the transport logs this request.
    fn filter_params(&self) -> Option<&BTreeSet<String>> {
        None
    }
}

impl RouteHandler for Route {
    fn handle(
        &self,
        request: &mut Request,
        response: &mut Response,
        next: &mut dyn FnMut(ControllerError),
    ) -> Outcome {
        self.call(request, response, |err| next(err))
    }

    fn filter_params(&self) -> Option<&BTreeSet<String>> {
        Some(self.controller.filter_params())
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Route({}#{})", self.controller.name, self.action)
    }
}

/// Controllers registered by name.
#[derive(Debug, Default)]
pub struct ControllerRegistry {
    controllers: HashMap<String, Arc<ControllerType>>,
}

impl ControllerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, controller: Arc<ControllerType>) {
        self.controllers
            .insert(controller.name().to_string(), controller);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ControllerType>> {
        self.controllers.get(name)
    }

    pub fn all(&self) -> Vec<&Arc<ControllerType>> {
        self.controllers.values().collect()
    }
}

// Global registry of all controllers.
// Uses RwLock to allow concurrent reads (most operations) while only blocking for writes.
lazy_static! {
    pub static ref CONTROLLER_REGISTRY: RwLock<ControllerRegistry> =
        RwLock::new(ControllerRegistry::new());
}

pub fn register_controller(controller: Arc<ControllerType>) {
    CONTROLLER_REGISTRY
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(controller);
}

pub fn lookup_controller(name: &str) -> Option<Arc<ControllerType>> {
    CONTROLLER_REGISTRY
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .cloned()
}

/// Resolve a `"controller#action"` spec against the global registry.
pub fn route_to(spec: &str) -> Result<Route, ControllerError> {
    let (controller, action) = spec
        .split_once('#')
        .ok_or_else(|| ControllerError::msg(format!("Invalid route spec '{}', expected 'controller#action'", spec)))?;
    lookup_controller(controller)
        .ok_or_else(|| ControllerError::UnknownController(controller.to_string()))?
        .route(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_new_types_start_empty_and_isolated() {
        let a = create_controller_type("A")
            .action("index", |c| c.send("a"))
            .before("auth", |c| {
                c.next();
                Ok(())
            })
            .build();
        let b = create_controller_type("B").build();

        assert_eq!(a.action_names(), vec!["index"]);
        assert_eq!(a.before_filters().len(), 1);
        assert!(b.action_names().is_empty());
        assert!(b.before_filters().is_empty());
        assert!(b.after_filters().is_empty());
        assert!(b.filter_params().is_empty());
    }

    #[test]
    fn test_default_name() {
        let ty = create_controller_type("").build();
        assert_eq!(ty.name(), "Controller");
        assert_eq!(ty.to_string(), "Controller Controller");
    }

    #[test]
    fn test_filter_scoping() {
        let ty = create_controller_type("posts")
            .before_only("load post", &["show", "edit"], |c| {
                c.next();
                Ok(())
            })
            .build();
        let filter = &ty.before_filters()[0];
        assert_eq!(filter.label(), "load post");
        assert!(filter.applies_to("show"));
        assert!(!filter.applies_to("index"));
    }

    #[test]
    fn test_filter_parameter_logging_accumulates() {
        let ty = create_controller_type("users")
            .filter_parameter_logging(["password"])
            .filter_parameter_logging(vec!["token".to_string(), "password".to_string()])
            .build();
        assert_eq!(
            ty.filter_params().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["password", "token"]
        );
    }

    #[test]
    fn test_route_rejects_unknown_action() {
        let ty = create_controller_type("posts").build();
        let err = ty.route("missing").unwrap_err();
        assert_eq!(err.to_string(), "Action 'missing' not found in controller 'posts'");
    }

    #[test]
    fn test_script_action_syntax_error_surfaces_at_registration() {
        let result = create_controller_type("posts").script_action("index", "send(");
        assert!(matches!(result, Err(ScriptError::Parser(_))));
    }

    #[test]
    fn test_route_to_global_registry() {
        register_controller(
            create_controller_type("registry_widgets")
                .action("index", |c| c.send("widgets"))
                .build(),
        );

        let route = route_to("registry_widgets#index").unwrap();
        assert_eq!(route.action(), "index");
        assert_eq!(route.controller().name(), "registry_widgets");

        assert!(matches!(
            route_to("registry_nothing#index"),
            Err(ControllerError::UnknownController(_))
        ));
        assert!(matches!(route_to("no-hash"), Err(ControllerError::Message(_))));
    }
}
