//! Parser state, cursor helpers, and error recovery.

use crate::ast::{Program, Stmt};
use crate::error::ParseError;
use crate::lexer::{Token, TokenKind};

/// Recursive-descent parser over a token stream.
///
/// Parse functions return `None` after recording an error; the top-level
/// loop then calls [`Parser::synchronize`] to skip to the next statement
/// boundary so one mistake does not cascade.
pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParseError>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            current: 0,
            errors: Vec::new(),
        }
    }

    /// Parse the whole token stream into a program.
    pub fn parse(&mut self) -> Program {
        let mut statements = Vec::new();

        while !self.is_at_end() {
            match self.declaration() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }

        Program::new(statements)
    }

    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<ParseError> {
        self.errors
    }

    // --- Cursor helpers ---

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    pub(super) fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    pub(super) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    pub(super) fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    pub(super) fn advance(&mut self) -> &Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }

    /// Consume the next token if it matches.
    pub(super) fn match_kind(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        false
    }

    /// Consume a token of the given kind or record an error.
    pub(super) fn expect(&mut self, kind: TokenKind, expected: &str) -> Option<Token> {
        if self.check(kind) {
            return Some(self.advance().clone());
        }

        let found = self.describe_current();
        let line = self.peek().line;
        self.errors
            .push(ParseError::unexpected_token(expected, found, line));
        None
    }

    pub(super) fn describe_current(&self) -> String {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            token.kind.to_string()
        } else {
            token.lexeme.clone()
        }
    }

    pub(super) fn error(&mut self, error: ParseError) {
        self.errors.push(error);
    }

    /// Discard tokens until a statement boundary: just past a `;`, or just
    /// before a keyword that starts a statement.
    pub(super) fn synchronize(&mut self) {
        self.advance();

        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }

            match self.peek().kind {
                TokenKind::Class
                | TokenKind::Function
                | TokenKind::Var
                | TokenKind::For
                | TokenKind::If
                | TokenKind::While
                | TokenKind::Return => return,
                _ => {}
            }

            self.advance();
        }
    }

    pub(super) fn declaration(&mut self) -> Option<Stmt> {
        match self.peek().kind {
            TokenKind::Function => self.function_declaration(),
            TokenKind::Var => self.var_declaration(),
            TokenKind::Class => self.class_declaration(),
            _ => self.statement(),
        }
    }
}
