//! Declaration parsing: variables, functions, and classes.

use crate::ast::{ClassDecl, FunctionDecl, MethodDecl, MethodKind, Stmt, StmtKind};
use crate::error::ParseError;
use crate::lexer::TokenKind;

use super::Parser;

const MAX_PARAMETERS: usize = 255;

impl Parser {
    pub(super) fn var_declaration(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        let name = self
            .expect(TokenKind::Identifier, "variable name")?
            .lexeme;

        let initializer = if self.match_kind(TokenKind::Equal) {
            Some(self.expression()?)
        } else {
            None
        };

        self.expect(TokenKind::Semicolon, "';' after variable declaration")?;
        Some(Stmt::new(StmtKind::Var { name, initializer }, line))
    }

    pub(super) fn function_declaration(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        let name = self
            .expect(TokenKind::Identifier, "function name")?
            .lexeme;

        self.expect(TokenKind::LeftParen, "'(' after function name")?;
        let params = self.function_params()?;

        self.expect(TokenKind::LeftBrace, "'{' before function body")?;
        let body = self.block_body()?;

        Some(Stmt::new(
            StmtKind::Function(FunctionDecl { name, params, body }),
            line,
        ))
    }

    pub(super) fn class_declaration(&mut self) -> Option<Stmt> {
        let line = self.advance().line;
        let name = self.expect(TokenKind::Identifier, "class name")?.lexeme;

        let superclass = if self.match_kind(TokenKind::Extends) {
            let superclass_line = self.peek().line;
            let super_name = self
                .expect(TokenKind::Identifier, "superclass name")?
                .lexeme;
            if super_name == name {
                self.error(ParseError::SelfInheritance {
                    line: superclass_line,
                });
                return None;
            }
            Some(super_name)
        } else {
            None
        };

        self.expect(TokenKind::LeftBrace, "'{' before class body")?;

        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            methods.push(self.method_declaration()?);
        }

        self.expect(TokenKind::RightBrace, "'}' after class body")?;

        Some(Stmt::new(
            StmtKind::Class(ClassDecl {
                name,
                superclass,
                methods,
            }),
            line,
        ))
    }

    /// One class member: `name(params) {..}`, `static name(params) {..}`,
    /// or the parameterless getter form `name {..}`.
    fn method_declaration(&mut self) -> Option<MethodDecl> {
        let is_static = self.match_kind(TokenKind::Static);
        let name_token = self.expect(TokenKind::Identifier, "method name")?;
        let name = name_token.lexeme;
        let line = name_token.line;

        if self.match_kind(TokenKind::LeftParen) {
            let params = self.function_params()?;
            self.expect(TokenKind::LeftBrace, "'{' before method body")?;
            let body = self.block_body()?;

            let kind = if is_static {
                MethodKind::Static
            } else {
                MethodKind::Instance
            };
            return Some(MethodDecl {
                kind,
                name,
                params,
                body,
                line,
            });
        }

        if is_static || !self.check(TokenKind::LeftBrace) {
            self.error(ParseError::InvalidMethodDeclaration { line });
            return None;
        }

        self.advance();
        let body = self.block_body()?;
        Some(MethodDecl {
            kind: MethodKind::Getter,
            name,
            params: Vec::new(),
            body,
            line,
        })
    }

    /// The parameter list of a function or method; the opening paren is
    /// already consumed.
    pub(super) fn function_params(&mut self) -> Option<Vec<String>> {
        let mut params = Vec::new();

        if self.match_kind(TokenKind::RightParen) {
            return Some(params);
        }

        let param = self.expect(TokenKind::Identifier, "parameter name")?;
        params.push(param.lexeme);

        while self.match_kind(TokenKind::Comma) {
            if params.len() >= MAX_PARAMETERS {
                let line = self.peek().line;
                self.error(ParseError::TooManyParameters { line });
                return None;
            }
            let param = self.expect(TokenKind::Identifier, "parameter name")?;
            params.push(param.lexeme);
        }

        self.expect(TokenKind::RightParen, "')' after parameters")?;
        Some(params)
    }
}
