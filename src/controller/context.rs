//! Per-instance request context and the accessors that read through it.
//!
//! A [`Context`] starts empty and is bound exactly once, by the route adapter,
//! before any action or filter runs. Every accessor reads through to the
//! bound request on each call, so `params()`/`session()`/`body()` are views of
//! the request rather than copies taken at bind time.

use crate::error::ContextError;
use crate::session::Session;
use crate::transport::{Params, Request, Response};

/// The request, response and action name a controller instance works on.
#[derive(Debug, Default)]
pub struct Context<'a> {
    request: Option<&'a mut Request>,
    response: Option<&'a mut Response>,
    action_name: Option<String>,
    bound: bool,
}

impl<'a> Context<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the context. `action_name` may be absent when a controller
    /// is driven outside an action dispatch.
    pub fn bind(
        &mut self,
        request: &'a mut Request,
        response: &'a mut Response,
        action_name: Option<&str>,
    ) {
        self.request = Some(request);
        self.response = Some(response);
        self.action_name = action_name.map(str::to_string);
        self.bound = true;
    }

    pub fn is_bound(&self) -> bool {
        self.bound
    }

    pub fn request(&self) -> Result<&Request, ContextError> {
        self.request
            .as_deref()
            .ok_or(ContextError::Unbound("request"))
    }

    pub fn request_mut(&mut self) -> Result<&mut Request, ContextError> {
        self.request
            .as_deref_mut()
            .ok_or(ContextError::Unbound("request"))
    }

    pub fn response(&self) -> Result<&Response, ContextError> {
        self.response
            .as_deref()
            .ok_or(ContextError::Unbound("response"))
    }

    pub fn response_mut(&mut self) -> Result<&mut Response, ContextError> {
        self.response
            .as_deref_mut()
            .ok_or(ContextError::Unbound("response"))
    }

    /// `Ok(None)` means bound without an action, not unbound.
    pub fn action_name(&self) -> Result<Option<&str>, ContextError> {
        if !self.bound {
            return Err(ContextError::Unbound("action_name"));
        }
        Ok(self.action_name.as_deref())
    }

    pub fn params(&self) -> Result<&Params, ContextError> {
        self.request
            .as_deref()
            .map(|req| &req.params)
            .ok_or(ContextError::Unbound("params"))
    }

    pub fn body(&self) -> Result<&Params, ContextError> {
        self.request
            .as_deref()
            .map(|req| &req.body)
            .ok_or(ContextError::Unbound("body"))
    }

    /// `Ok(None)` when the request carries no session.
    pub fn session(&self) -> Result<Option<&Session>, ContextError> {
        self.request
            .as_deref()
            .map(|req| req.session.as_ref())
            .ok_or(ContextError::Unbound("session"))
    }

    pub fn session_mut(&mut self) -> Result<Option<&mut Session>, ContextError> {
        self.request
            .as_deref_mut()
            .map(|req| req.session.as_mut())
            .ok_or(ContextError::Unbound("session"))
    }
}
