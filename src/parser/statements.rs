//! Statement parsing.

use crate::ast::{Stmt, StmtKind};
use crate::lexer::TokenKind;

use super::Parser;

impl Parser {
    pub(super) fn statement(&mut self) -> Option<Stmt> {
        match self.peek().kind {
            TokenKind::Break => self.break_statement(),
            TokenKind::Continue => self.continue_statement(),
            TokenKind::For => self.for_statement(),
            TokenKind::While => self.while_statement(),
            TokenKind::LeftBrace => self.block(),
            TokenKind::If => self.if_statement(),
            TokenKind::Return => self.return_statement(),
            _ => self.expression_statement(),
        }
    }

    pub(super) fn block(&mut self) -> Option<Stmt> {
        let line = self.peek().line;
        self.expect(TokenKind::LeftBrace, "'{'")?;

        let statements = self.block_body()?;
        Some(Stmt::new(StmtKind::Block(statements), line))
    }

    /// The statements between `{` and `}`; the opening brace is already
    /// consumed.
    pub(super) fn block_body(&mut self) -> Option<Vec<Stmt>> {
        let mut statements = Vec::new();

        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.declaration() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }

        self.expect(TokenKind::RightBrace, "'}' after block")?;
        Some(statements)
    }

    fn expression_statement(&mut self) -> Option<Stmt> {
        let line = self.peek().line;
        let expr = self.expression()?;
        self.expect(TokenKind::Semicolon, "';' after expression")?;
        Some(Stmt::new(StmtKind::Expression(expr), line))
    }

    fn if_statement(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        self.expect(TokenKind::LeftParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RightParen, "')' after condition")?;

        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.match_kind(TokenKind::Else) {
            Some(Box::new(self.statement()?))
        } else {
            None
        };

        Some(Stmt::new(
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            },
            line,
        ))
    }

    fn while_statement(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        self.expect(TokenKind::LeftParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(TokenKind::RightParen, "')' after condition")?;
        let body = Box::new(self.block()?);

        Some(Stmt::new(StmtKind::While { condition, body }, line))
    }

    fn for_statement(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        self.expect(TokenKind::LeftParen, "'(' after 'for'")?;

        let initializer = if self.match_kind(TokenKind::Semicolon) {
            None
        } else if self.check(TokenKind::Var) {
            Some(Box::new(self.var_declaration()?))
        } else {
            Some(Box::new(self.expression_statement()?))
        };

        let condition = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::Semicolon, "';' after loop condition")?;

        let increment = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect(TokenKind::RightParen, "')' after for clauses")?;

        let body = Box::new(self.block()?);

        Some(Stmt::new(
            StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            },
            line,
        ))
    }

    fn return_statement(&mut self) -> Option<Stmt> {
        let line = self.advance().line;

        if self.match_kind(TokenKind::Semicolon) {
            return Some(Stmt::new(StmtKind::Return(None), line));
        }

        let value = self.expression()?;
        self.expect(TokenKind::Semicolon, "';' after return value")?;
        Some(Stmt::new(StmtKind::Return(Some(value)), line))
    }

    fn break_statement(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        self.expect(TokenKind::Semicolon, "';' after 'break'")?;
        Some(Stmt::new(StmtKind::Break, line))
    }

    fn continue_statement(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        self.expect(TokenKind::Semicolon, "';' after 'continue'")?;
        Some(Stmt::new(StmtKind::Continue, line))
    }
}
