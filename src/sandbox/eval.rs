//! Tree-walking evaluator for action scripts.

use serde_json::{Number, Value as JsonValue};

use crate::controller::Controller;
use crate::error::{ContextError, ControllerError, RuntimeError};
use crate::sandbox::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::span::Span;
use crate::transport::Payload;

type EvalResult<T> = Result<T, RuntimeError>;

/// Host functions scripts may call without a receiver.
pub const HOST_FUNCTIONS: [&str; 8] = [
    "send", "redirect", "header", "flash", "next", "render", "param", "format",
];

pub(crate) struct Evaluator<'c, 'a> {
    controller: &'c mut Controller<'a>,
}

impl<'c, 'a> Evaluator<'c, 'a> {
    pub(crate) fn new(controller: &'c mut Controller<'a>) -> Self {
        Self { controller }
    }

    /// Run every statement; the value of the last one is returned.
    pub(crate) fn run(&mut self, program: &Program) -> EvalResult<JsonValue> {
        let mut last = JsonValue::Null;
        for stmt in &program.statements {
            last = self.execute(stmt)?;
        }
        Ok(last)
    }

    fn execute(&mut self, stmt: &Stmt) -> EvalResult<JsonValue> {
        match &stmt.kind {
            StmtKind::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.controller.locals.insert(name.clone(), value.clone());
                Ok(value)
            }
            StmtKind::Expression(expr) => self.evaluate(expr),
        }
    }

    fn evaluate(&mut self, expr: &Expr) -> EvalResult<JsonValue> {
        match &expr.kind {
            ExprKind::IntLiteral(n) => Ok(JsonValue::from(*n)),
            ExprKind::FloatLiteral(n) => Ok(Number::from_f64(*n)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null)),
            ExprKind::StringLiteral(s) => Ok(JsonValue::String(s.clone())),
            ExprKind::BoolLiteral(b) => Ok(JsonValue::Bool(*b)),
            ExprKind::Null => Ok(JsonValue::Null),
            ExprKind::Variable(name) => self.lookup(name, expr.span),
            ExprKind::Array(items) => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<EvalResult<Vec<_>>>()
                .map(JsonValue::Array),
            ExprKind::Hash(pairs) => {
                let mut map = serde_json::Map::new();
                for (key, value) in pairs {
                    map.insert(key.clone(), self.evaluate(value)?);
                }
                Ok(JsonValue::Object(map))
            }
            ExprKind::Member { object, name } => match self.evaluate(object)? {
                JsonValue::Object(map) => Ok(map.get(name).cloned().unwrap_or(JsonValue::Null)),
                other => Err(RuntimeError::type_error(
                    format!("cannot read '{}' of {}", name, type_name(&other)),
                    expr.span,
                )),
            },
            ExprKind::Index { object, index } => {
                let object = self.evaluate(object)?;
                let index = self.evaluate(index)?;
                match (&object, &index) {
                    (JsonValue::Object(map), JsonValue::String(key)) => {
                        Ok(map.get(key).cloned().unwrap_or(JsonValue::Null))
                    }
                    (JsonValue::Array(items), JsonValue::Number(n)) => Ok(n
                        .as_u64()
                        .and_then(|i| items.get(i as usize))
                        .cloned()
                        .unwrap_or(JsonValue::Null)),
                    _ => Err(RuntimeError::type_error(
                        format!("cannot index {} with {}", type_name(&object), type_name(&index)),
                        expr.span,
                    )),
                }
            }
            ExprKind::Call { callee, arguments } => {
                let args = arguments
                    .iter()
                    .map(|arg| self.evaluate(arg))
                    .collect::<EvalResult<Vec<_>>>()?;
                self.call(callee, &args, expr.span)
            }
        }
    }

    /// Locals shadow the request views.
    fn lookup(&self, name: &str, span: Span) -> EvalResult<JsonValue> {
        if let Some(value) = self.controller.locals.get(name) {
            return Ok(value.clone());
        }

        let host = |err: ContextError| RuntimeError::host(name, span, err.into());
        match name {
            "params" => Ok(JsonValue::Object(self.controller.params().map_err(host)?.clone())),
            "body" => Ok(JsonValue::Object(self.controller.body().map_err(host)?.clone())),
            "session" => Ok(self
                .controller
                .session()
                .map_err(host)?
                .map(|session| JsonValue::Object(session.data().clone()))
                .unwrap_or(JsonValue::Null)),
            "action_name" => Ok(self
                .controller
                .action_name()
                .map_err(host)?
                .map(JsonValue::from)
                .unwrap_or(JsonValue::Null)),
            "controller_name" => Ok(JsonValue::from(self.controller.controller_name())),
            _ => Err(RuntimeError::undefined_variable(name, span)),
        }
    }

    fn call(&mut self, name: &str, args: &[JsonValue], span: Span) -> EvalResult<JsonValue> {
        let host = |err: ControllerError| RuntimeError::host(name, span, err);
        let c = &mut *self.controller;

        match name {
            "send" => {
                let payload = match args {
                    [] => Payload::Empty,
                    [value] => payload_from(value),
                    [value, status] => {
                        let status = status_arg(name, status, span)?;
                        Payload::WithStatus(Box::new(payload_from(value)), status)
                    }
                    _ => return Err(RuntimeError::wrong_arity(name, "0 to 2", args.len(), span)),
                };
                c.send(payload).map_err(host)?;
                Ok(JsonValue::Null)
            }
            "redirect" => {
                let [target] = args else {
                    return Err(RuntimeError::wrong_arity(name, "1", args.len(), span));
                };
                c.redirect(&string_arg(target)).map_err(host)?;
                Ok(JsonValue::Null)
            }
            "header" => {
                let value = match args {
                    [key] | [key, JsonValue::Null] => c.header(&string_arg(key), None),
                    [key, value] => {
                        let value = string_arg(value);
                        c.header(&string_arg(key), Some(value.as_str()))
                    }
                    _ => return Err(RuntimeError::wrong_arity(name, "1 or 2", args.len(), span)),
                }
                .map_err(host)?;
                Ok(value.map(JsonValue::String).unwrap_or(JsonValue::Null))
            }
            "flash" => {
                let [kind, message] = args else {
                    return Err(RuntimeError::wrong_arity(name, "2", args.len(), span));
                };
                c.flash(&string_arg(kind), &string_arg(message))
                    .map_err(host)?;
                Ok(JsonValue::Null)
            }
            "next" => {
                match args {
                    [] | [JsonValue::Null] => c.next(),
                    [err] => c.fail(ControllerError::msg(string_arg(err))),
                    _ => return Err(RuntimeError::wrong_arity(name, "0 or 1", args.len(), span)),
                }
                Ok(JsonValue::Null)
            }
            "render" => {
                let template = match args {
                    [] => None,
                    [template] => Some(string_arg(template)),
                    _ => return Err(RuntimeError::wrong_arity(name, "0 or 1", args.len(), span)),
                };
                c.render(template.as_deref()).map_err(host)?;
                Ok(JsonValue::Null)
            }
            "param" => {
                let [key] = args else {
                    return Err(RuntimeError::wrong_arity(name, "1", args.len(), span));
                };
                let request = c.request().map_err(|err| host(err.into()))?;
                Ok(request
                    .param(&string_arg(key))
                    .cloned()
                    .unwrap_or(JsonValue::Null))
            }
            "format" => {
                if !args.is_empty() {
                    return Err(RuntimeError::wrong_arity(name, "0", args.len(), span));
                }
                let format = c.negotiated_format().map_err(|err| host(err.into()))?;
                Ok(format
                    .map(|f| JsonValue::from(f.as_str()))
                    .unwrap_or(JsonValue::Null))
            }
            _ if c.extensions().contains(name) => c.call_extension(name, args).map_err(host),
            _ => Err(RuntimeError::undefined_function(name, span)),
        }
    }
}

/// Integers in the HTTP status range are bare statuses, like `send(404)`.
fn payload_from(value: &JsonValue) -> Payload {
    match value {
        JsonValue::Null => Payload::Empty,
        JsonValue::String(s) => Payload::Text(s.clone()),
        JsonValue::Number(n) => match n.as_u64() {
            Some(status @ 100..=599) => Payload::Status(status as u16),
            _ => Payload::Json(value.clone()),
        },
        other => Payload::Json(other.clone()),
    }
}

fn status_arg(function: &str, value: &JsonValue, span: Span) -> EvalResult<u16> {
    value
        .as_u64()
        .filter(|status| (100..=599).contains(status))
        .map(|status| status as u16)
        .ok_or_else(|| {
            RuntimeError::type_error(
                format!("{}() status must be an HTTP status code, got {}", function, value),
                span,
            )
        })
}

fn string_arg(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "bool",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "hash",
    }
}
