//! soli-controller: per-request controllers for the Soli MVC stack.
//!
//! This is the library root that exports all modules.
//!
//! # Layers
//!
//! - **Controllers**: types registered once, instantiated per request, with
//!   before/after filter chains driven by explicit `next` continuations
//! - **Helpers**: content negotiation, CSRF protection and response forwarders
//! - **Action scripts**: a small interpreted language for actions that call
//!   an enumerated set of host functions
//! - **Serve**: a hyper adapter with sessions, flash and request logging

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::result_large_err)]
#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]

pub mod controller;
pub mod error;
pub mod helpers;
pub mod sandbox;
pub mod serve;
pub mod session;
pub mod span;
pub mod transport;

pub use controller::{
    create_controller_type, register_controller, register_extension, route_to, Controller,
    ControllerType, Outcome, Phase, Renderer, Route, RouteHandler,
};
pub use error::{ContextError, ControllerError, ScriptError, ServeError};
pub use helpers::Format;
pub use serve::{serve, Application, ServeConfig};
pub use session::{InMemorySessionStore, Session, SessionStore};
pub use transport::{Params, Payload, Request, Response};
