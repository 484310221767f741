//! Error types for the controller runtime.

use crate::span::Span;
use thiserror::Error;

/// Accessor reads against a controller whose context has not been bound yet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Context not bound: '{0}' was read before the controller received a request")]
    Unbound(&'static str),
}

impl ContextError {
    pub fn unbound(field: &'static str) -> Self {
        Self::Unbound(field)
    }
}

/// Action-script lexer errors.
#[derive(Debug, Error)]
pub enum LexerError {
    #[error("Unexpected character '{0}' at {1}")]
    UnexpectedChar(char, Span),

    #[error("Unterminated string at {0}")]
    UnterminatedString(Span),

    #[error("Invalid escape sequence '\\{0}' at {1}")]
    InvalidEscape(char, Span),

    #[error("Invalid number '{0}' at {1}")]
    InvalidNumber(String, Span),
}

impl LexerError {
    pub fn unexpected_char(c: char, span: Span) -> Self {
        Self::UnexpectedChar(c, span)
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::UnterminatedString(span)
    }

    pub fn invalid_escape(c: char, span: Span) -> Self {
        Self::InvalidEscape(c, span)
    }

    pub fn invalid_number(s: String, span: Span) -> Self {
        Self::InvalidNumber(s, span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedChar(_, span) => *span,
            Self::UnterminatedString(span) => *span,
            Self::InvalidEscape(_, span) => *span,
            Self::InvalidNumber(_, span) => *span,
        }
    }
}

/// Action-script parser errors.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error("Unexpected token '{found}', expected {expected} at {span}")]
    UnexpectedToken {
        expected: String,
        found: String,
        span: Span,
    },

    #[error("Unexpected end of script at {0}")]
    UnexpectedEof(Span),

    #[error("Invalid assignment target at {0}")]
    InvalidAssignmentTarget(Span),
}

impl ParserError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        span: Span,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            span,
        }
    }

    pub fn unexpected_eof(span: Span) -> Self {
        Self::UnexpectedEof(span)
    }

    pub fn invalid_assignment_target(span: Span) -> Self {
        Self::InvalidAssignmentTarget(span)
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::UnexpectedEof(span) => *span,
            Self::InvalidAssignmentTarget(span) => *span,
        }
    }
}

/// Errors raised while an action script runs.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Undefined variable '{0}' at {1}")]
    UndefinedVariable(String, Span),

    #[error("Undefined function '{0}' at {1}")]
    UndefinedFunction(String, Span),

    #[error("Wrong number of arguments to {function}(): expected {expected}, got {got} at {span}")]
    WrongArity {
        function: String,
        expected: String,
        got: usize,
        span: Span,
    },

    #[error("Type error: {message} at {span}")]
    TypeError { message: String, span: Span },

    #[error("{function}() failed at {span}: {source}")]
    Host {
        function: String,
        span: Span,
        #[source]
        source: Box<ControllerError>,
    },
}

impl RuntimeError {
    pub fn undefined_variable(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedVariable(name.into(), span)
    }

    pub fn undefined_function(name: impl Into<String>, span: Span) -> Self {
        Self::UndefinedFunction(name.into(), span)
    }

    pub fn wrong_arity(
        function: impl Into<String>,
        expected: impl Into<String>,
        got: usize,
        span: Span,
    ) -> Self {
        Self::WrongArity {
            function: function.into(),
            expected: expected.into(),
            got,
            span,
        }
    }

    pub fn type_error(message: impl Into<String>, span: Span) -> Self {
        Self::TypeError {
            message: message.into(),
            span,
        }
    }

    pub fn host(function: impl Into<String>, span: Span, source: ControllerError) -> Self {
        Self::Host {
            function: function.into(),
            span,
            source: Box::new(source),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Self::UndefinedVariable(_, span) => *span,
            Self::UndefinedFunction(_, span) => *span,
            Self::WrongArity { span, .. } => *span,
            Self::TypeError { span, .. } => *span,
            Self::Host { span, .. } => *span,
        }
    }
}

/// A unified error type for every action-script phase.
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParserError),

    #[error("Runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

impl ScriptError {
    pub fn span(&self) -> Span {
        match self {
            Self::Lexer(e) => e.span(),
            Self::Parser(e) => e.span(),
            Self::Runtime(e) => e.span(),
        }
    }
}

/// Errors surfaced by controllers, filters and helpers.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Action '{action}' not found in controller '{controller}'")]
    UnknownAction { controller: String, action: String },

    #[error("Controller '{0}' is not registered")]
    UnknownController(String),

    #[error("Extension '{0}' is not registered")]
    UnknownExtension(String),

    #[error("Controller '{0}' has no renderer configured")]
    NoRenderer(String),

    #[error("Failed to render '{template}': {message}")]
    Render { template: String, message: String },

    #[error("{0}")]
    Message(String),
}

impl ControllerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn unknown_action(controller: impl Into<String>, action: impl Into<String>) -> Self {
        Self::UnknownAction {
            controller: controller.into(),
            action: action.into(),
        }
    }
}

/// Errors from the HTTP adapter and its configuration.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Invalid configuration value for {key}: {message}")]
    Config { key: String, message: String },
}

impl ServeError {
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            key: key.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_message_names_field() {
        let err = ContextError::unbound("params");
        assert!(err.to_string().contains("'params'"));
    }

    #[test]
    fn test_host_error_keeps_source() {
        let err = RuntimeError::host(
            "render",
            Span::new(0, 6, 1, 1),
            ControllerError::NoRenderer("posts".into()),
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(
            source.as_deref(),
            Some("Controller 'posts' has no renderer configured")
        );
        assert_eq!(err.span().line, 1);
    }

    #[test]
    fn test_script_error_span_passthrough() {
        let err: ScriptError = LexerError::unexpected_char('@', Span::new(3, 4, 2, 5)).into();
        assert_eq!(err.span(), Span::new(3, 4, 2, 5));
    }
}
