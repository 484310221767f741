//! Action scripts.
//!
//! An action can be registered as a short script instead of a Rust closure:
//!
//! ```text
//! items = [];
//! flash("info", "Loaded");
//! render();
//! ```
//!
//! Scripts call a fixed set of host functions without a receiver
//! ([`HOST_FUNCTIONS`]); any other call resolves against the controller's
//! extension snapshot. Bare identifiers read script locals first, then the
//! bound `params`, `session`, `body`, `action_name` and `controller_name`.
//! Assignments write `Controller::locals`, which `render` hands to the
//! template.
//!
//! Host functions act on the real controller, so this is a convenience
//! layer, not an isolation boundary for untrusted code.

pub mod ast;
mod eval;
pub mod parser;
pub mod scanner;
pub mod token;

use serde_json::Value as JsonValue;

pub use ast::Program;
pub use eval::HOST_FUNCTIONS;

use crate::controller::Controller;
use crate::error::ScriptError;
use eval::Evaluator;
use parser::Parser;
use scanner::Scanner;

/// Scan and parse `source`.
pub fn parse(source: &str) -> Result<Program, ScriptError> {
    let tokens = Scanner::new(source).scan_tokens()?;
    Ok(Parser::new(tokens).parse()?)
}

impl<'a> Controller<'a> {
    /// Parse and run `source` against this instance.
    ///
    /// Lexer, parser and runtime errors are returned as-is; attributing them
    /// to an action is up to the caller.
    pub fn evaluate(&mut self, source: &str) -> Result<JsonValue, ScriptError> {
        let program = parse(source)?;
        self.run_program(&program)
    }

    /// Run an already parsed script. Returns the last statement's value.
    pub fn run_program(&mut self, program: &Program) -> Result<JsonValue, ScriptError> {
        Ok(Evaluator::new(self).run(program)?)
    }
}
