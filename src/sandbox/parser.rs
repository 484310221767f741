//! Recursive-descent parser for action scripts.
//!
//! ```text
//! program    := stmt*
//! stmt       := IDENT '=' expr ';' | expr ';'
//! expr       := primary ( '[' expr ']' | '.' IDENT )*
//! primary    := literal | IDENT | IDENT '(' args? ')' | '[' list? ']'
//!             | '{' pairs? '}' | '(' expr ')'
//! ```
//!
//! The final statement may omit its semicolon.

use crate::error::ParserError;
use crate::sandbox::ast::{Expr, ExprKind, Program, Stmt, StmtKind};
use crate::sandbox::token::{Token, TokenKind};
use crate::span::Span;

pub type ParseResult<T> = Result<T, ParserError>;

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
}

impl Parser {
    /// A missing trailing `Eof` is appended.
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|t| &t.kind) != Some(&TokenKind::Eof) {
            let end = tokens.last().map(|t| t.span).unwrap_or_default();
            tokens.push(Token::eof(end.end, end.line.max(1), end.column.max(1)));
        }
        Self { tokens, current: 0 }
    }

    pub fn parse(&mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            statements.push(self.statement()?);
        }

        Ok(Program::new(statements))
    }

    fn statement(&mut self) -> ParseResult<Stmt> {
        let start = self.current_span();
        let expr = self.expression()?;

        let kind = if self.match_token(&TokenKind::Equal) {
            let ExprKind::Variable(name) = expr.kind else {
                return Err(ParserError::invalid_assignment_target(expr.span));
            };
            let value = self.expression()?;
            StmtKind::Assign { name, value }
        } else {
            StmtKind::Expression(expr)
        };

        if !self.is_at_end() {
            self.expect(&TokenKind::Semicolon)?;
        } else {
            self.match_token(&TokenKind::Semicolon);
        }

        Ok(Stmt::new(kind, start.merge(self.previous_span())))
    }

    fn expression(&mut self) -> ParseResult<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_token(&TokenKind::LeftBracket) {
                let index = self.expression()?;
                self.expect(&TokenKind::RightBracket)?;
                let span = expr.span.merge(self.previous_span());
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    span,
                );
            } else if self.match_token(&TokenKind::Dot) {
                let name = self.expect_identifier()?;
                let span = expr.span.merge(self.previous_span());
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        name,
                    },
                    span,
                );
            } else {
                break;
            }
        }

        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expr> {
        let token = self.peek().clone();
        let span = token.span;

        let kind = match token.kind {
            TokenKind::Eof => return Err(ParserError::unexpected_eof(span)),
            TokenKind::IntLiteral(n) => ExprKind::IntLiteral(n),
            TokenKind::FloatLiteral(n) => ExprKind::FloatLiteral(n),
            TokenKind::StringLiteral(s) => ExprKind::StringLiteral(s),
            TokenKind::BoolLiteral(b) => ExprKind::BoolLiteral(b),
            TokenKind::Null => ExprKind::Null,
            TokenKind::Identifier(name) => {
                self.advance();
                if self.match_token(&TokenKind::LeftParen) {
                    let arguments = self.list(&TokenKind::RightParen)?;
                    return Ok(Expr::new(
                        ExprKind::Call {
                            callee: name,
                            arguments,
                        },
                        span.merge(self.previous_span()),
                    ));
                }
                return Ok(Expr::new(ExprKind::Variable(name), span));
            }
            TokenKind::LeftBracket => {
                self.advance();
                let items = self.list(&TokenKind::RightBracket)?;
                return Ok(Expr::new(
                    ExprKind::Array(items),
                    span.merge(self.previous_span()),
                ));
            }
            TokenKind::LeftBrace => {
                self.advance();
                return self.hash(span);
            }
            TokenKind::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RightParen)?;
                return Ok(expr);
            }
            other => {
                return Err(ParserError::unexpected_token(
                    "expression",
                    other.to_string(),
                    span,
                ))
            }
        };

        self.advance();
        Ok(Expr::new(kind, span))
    }

    /// Comma-separated expressions up to and including `close`.
    fn list(&mut self, close: &TokenKind) -> ParseResult<Vec<Expr>> {
        let mut items = Vec::new();
        if !self.check(close) {
            loop {
                items.push(self.expression()?);
                if !self.match_token(&TokenKind::Comma) || self.check(close) {
                    break;
                }
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn hash(&mut self, start: Span) -> ParseResult<Expr> {
        let mut pairs = Vec::new();
        if !self.check(&TokenKind::RightBrace) {
            loop {
                let key = match self.peek().kind.clone() {
                    TokenKind::Identifier(name) => name,
                    TokenKind::StringLiteral(s) => s,
                    TokenKind::Eof => return Err(ParserError::unexpected_eof(self.current_span())),
                    other => {
                        return Err(ParserError::unexpected_token(
                            "hash key",
                            other.to_string(),
                            self.current_span(),
                        ))
                    }
                };
                self.advance();
                self.expect(&TokenKind::Colon)?;
                pairs.push((key, self.expression()?));
                if !self.match_token(&TokenKind::Comma) || self.check(&TokenKind::RightBrace) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RightBrace)?;
        Ok(Expr::new(
            ExprKind::Hash(pairs),
            start.merge(self.previous_span()),
        ))
    }

    // ===== Token manipulation =====

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous().clone()
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current.min(self.tokens.len() - 1)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn check(&self, kind: &TokenKind) -> bool {
        !self.is_at_end()
            && std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_token(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> ParseResult<Token> {
        if self.check(kind) {
            return Ok(self.advance());
        }
        if self.is_at_end() {
            return Err(ParserError::unexpected_eof(self.current_span()));
        }
        Err(ParserError::unexpected_token(
            kind.to_string(),
            self.peek().kind.to_string(),
            self.current_span(),
        ))
    }

    fn expect_identifier(&mut self) -> ParseResult<String> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            TokenKind::Eof => Err(ParserError::unexpected_eof(self.current_span())),
            other => Err(ParserError::unexpected_token(
                "identifier",
                other.to_string(),
                self.current_span(),
            )),
        }
    }

    fn current_span(&self) -> Span {
        self.peek().span
    }

    fn previous_span(&self) -> Span {
        self.previous().span
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::scanner::Scanner;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> ParseResult<Program> {
        let tokens = Scanner::new(source).scan_tokens().unwrap();
        Parser::new(tokens).parse()
    }

    fn kinds(source: &str) -> Vec<StmtKind> {
        parse(source)
            .unwrap()
            .statements
            .into_iter()
            .map(|s| s.kind)
            .collect()
    }

    fn strip(e: &Expr) -> ExprKind {
        match &e.kind {
            ExprKind::Call { callee, arguments } => ExprKind::Call {
                callee: callee.clone(),
                arguments: arguments
                    .iter()
                    .map(|a| Expr::new(strip(a), Span::default()))
                    .collect(),
            },
            ExprKind::Array(items) => ExprKind::Array(
                items
                    .iter()
                    .map(|a| Expr::new(strip(a), Span::default()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    #[test]
    fn test_assignment_then_call() {
        let stmts = kinds("items = []; render();");
        assert_eq!(stmts.len(), 2);
        match &stmts[0] {
            StmtKind::Assign { name, value } => {
                assert_eq!(name, "items");
                assert_eq!(strip(value), ExprKind::Array(vec![]));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
        match &stmts[1] {
            StmtKind::Expression(call) => assert_eq!(
                strip(call),
                ExprKind::Call {
                    callee: "render".into(),
                    arguments: vec![]
                }
            ),
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_postfix_chain() {
        let stmts = kinds("params.user['name']");
        let StmtKind::Expression(e) = &stmts[0] else {
            panic!("expected expression");
        };
        let ExprKind::Index { object, index } = &e.kind else {
            panic!("expected index, got {:?}", e.kind);
        };
        assert_eq!(index.kind, ExprKind::StringLiteral("name".into()));
        assert!(matches!(
            &object.kind,
            ExprKind::Member { name, .. } if name == "user"
        ));
    }

    #[test]
    fn test_hash_and_trailing_commas() {
        let stmts = kinds(r#"send({ ok: true, "count": 2, }, 201);"#);
        let StmtKind::Expression(e) = &stmts[0] else {
            panic!("expected expression");
        };
        let ExprKind::Call { arguments, .. } = &e.kind else {
            panic!("expected call");
        };
        assert_eq!(arguments.len(), 2);
        let ExprKind::Hash(pairs) = &arguments[0].kind else {
            panic!("expected hash");
        };
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["ok", "count"]);
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(matches!(
            parse("params.id = 1;"),
            Err(ParserError::InvalidAssignmentTarget(_))
        ));
    }

    #[test]
    fn test_missing_semicolon_between_statements() {
        assert!(matches!(
            parse("a = 1 b = 2"),
            Err(ParserError::UnexpectedToken { .. })
        ));
        assert!(parse("a = 1").is_ok());
    }

    #[test]
    fn test_unexpected_eof() {
        assert!(matches!(parse("send("), Err(ParserError::UnexpectedEof(_))));
        assert!(matches!(parse("x = "), Err(ParserError::UnexpectedEof(_))));
    }

    #[test]
    fn test_token_stream_without_eof() {
        let program = Parser::new(Vec::new()).parse().unwrap();
        assert!(program.statements.is_empty());

        let mut tokens = Scanner::new("render()").scan_tokens().unwrap();
        tokens.pop();
        let program = Parser::new(tokens).parse().unwrap();
        assert_eq!(program.statements.len(), 1);
    }
}
