//! Content negotiation.

use std::fmt;
use std::str::FromStr;

use serde_json::Value as JsonValue;

use crate::controller::Controller;
use crate::error::{ContextError, ControllerError};

/// Formats `respond_to` knows how to guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Json,
    Html,
    Xml,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Json, Format::Html, Format::Xml];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::Html => "html",
            Format::Xml => "xml",
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .into_iter()
            .find(|format| format.as_str() == s)
            .ok_or_else(|| format!("Unknown format '{}'", s))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The guard table handed to a `respond_to` block.
pub struct Variants<'c, 'a> {
    controller: &'c mut Controller<'a>,
    negotiated: Option<Format>,
}

impl<'c, 'a> Variants<'c, 'a> {
    /// `None` when the request asked for a format nobody can serve.
    pub fn negotiated(&self) -> Option<Format> {
        self.negotiated
    }

    /// Run `body` iff `format` is the negotiated format.
    pub fn on<F>(&mut self, format: Format, body: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Controller<'a>) -> Result<(), ControllerError>,
    {
        if self.negotiated == Some(format) {
            body(&mut *self.controller)
        } else {
            Ok(())
        }
    }

    pub fn json<F>(&mut self, body: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Controller<'a>) -> Result<(), ControllerError>,
    {
        self.on(Format::Json, body)
    }

    pub fn html<F>(&mut self, body: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Controller<'a>) -> Result<(), ControllerError>,
    {
        self.on(Format::Html, body)
    }

    pub fn xml<F>(&mut self, body: F) -> Result<(), ControllerError>
    where
        F: FnOnce(&mut Controller<'a>) -> Result<(), ControllerError>,
    {
        self.on(Format::Xml, body)
    }
}

impl<'a> Controller<'a> {
    /// The format requested through `params.format`.
    ///
    /// Missing or empty means html. Any other value that is not a known
    /// format yields `None`, and no variant will fire for it.
    pub fn negotiated_format(&self) -> Result<Option<Format>, ContextError> {
        let requested = match self.params()?.get("format") {
            None | Some(JsonValue::Null) => return Ok(Some(Format::Html)),
            Some(JsonValue::String(s)) if s.is_empty() => return Ok(Some(Format::Html)),
            Some(JsonValue::String(s)) => s.as_str(),
            Some(_) => return Ok(None),
        };
        Ok(requested.parse().ok())
    }

    /// Run `block` with a guard per format; only the negotiated one fires.
    pub fn respond_to<F>(&mut self, block: F) -> Result<(), ControllerError>
    where
        F: for<'c> FnOnce(&mut Variants<'c, 'a>) -> Result<(), ControllerError>,
    {
        let negotiated = self.negotiated_format()?;
        let mut variants = Variants {
            controller: self,
            negotiated,
        };
        block(&mut variants)
    }
}
