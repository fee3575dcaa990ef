//! Expression parsing — precedence climbing from assignment down to primary.

use crate::ast::{BinaryOp, Expr, ExprKind, FunctionLiteral, LogicalOp, UnaryOp};
use crate::error::ParseError;
use crate::lexer::TokenKind;

use super::Parser;

const MAX_ARGUMENTS: usize = 255;

impl Parser {
    pub(super) fn expression(&mut self) -> Option<Expr> {
        self.assignment()
    }

    /// assignment → ( identifier | get ) "=" assignment | or
    fn assignment(&mut self) -> Option<Expr> {
        let expr = self.or()?;

        if self.match_kind(TokenKind::Equal) {
            let line = self.previous().line;
            let value = Box::new(self.assignment()?);

            return match expr.kind {
                ExprKind::Identifier(name) => {
                    Some(Expr::new(ExprKind::Assign { name, value }, line))
                }
                ExprKind::Get { object, name } => Some(Expr::new(
                    ExprKind::Set {
                        object,
                        name,
                        value,
                    },
                    line,
                )),
                _ => {
                    self.error(ParseError::invalid_assignment_target(line));
                    None
                }
            };
        }

        Some(expr)
    }

    fn or(&mut self) -> Option<Expr> {
        let mut expr = self.and()?;

        while self.match_kind(TokenKind::Or) {
            let line = self.previous().line;
            let right = self.and()?;
            expr = Expr::new(
                ExprKind::Logical {
                    left: Box::new(expr),
                    operator: LogicalOp::Or,
                    right: Box::new(right),
                },
                line,
            );
        }

        Some(expr)
    }

    fn and(&mut self) -> Option<Expr> {
        let mut expr = self.ternary()?;

        while self.match_kind(TokenKind::And) {
            let line = self.previous().line;
            let right = self.ternary()?;
            expr = Expr::new(
                ExprKind::Logical {
                    left: Box::new(expr),
                    operator: LogicalOp::And,
                    right: Box::new(right),
                },
                line,
            );
        }

        Some(expr)
    }

    /// ternary → equality ( "?" expression ":" ternary )?
    fn ternary(&mut self) -> Option<Expr> {
        let expr = self.equality()?;

        if self.match_kind(TokenKind::Question) {
            let line = self.previous().line;
            let then_branch = self.expression()?;
            self.expect(TokenKind::Colon, "':' in ternary expression")?;
            let else_branch = self.ternary()?;
            return Some(Expr::new(
                ExprKind::Ternary {
                    condition: Box::new(expr),
                    then_branch: Box::new(then_branch),
                    else_branch: Box::new(else_branch),
                },
                line,
            ));
        }

        Some(expr)
    }

    fn equality(&mut self) -> Option<Expr> {
        let mut expr = self.comparison()?;

        loop {
            let operator = if self.match_kind(TokenKind::EqualEqual) {
                BinaryOp::Equal
            } else if self.match_kind(TokenKind::BangEqual) {
                BinaryOp::NotEqual
            } else {
                break;
            };
            let line = self.previous().line;
            let right = self.comparison()?;
            expr = Expr::new(
                ExprKind::Binary {
                    left: Box::new(expr),
                    operator,
                    right: Box::new(right),
                },
                line,
            );
        }

        Some(expr)
    }

    fn comparison(&mut self) -> Option<Expr> {
        let mut expr = self.term()?;

        loop {
            let operator = if self.match_kind(TokenKind::Less) {
                BinaryOp::Less
            } else if self.match_kind(TokenKind::LessEqual) {
                BinaryOp::LessEqual
            } else if self.match_kind(TokenKind::Greater) {
                BinaryOp::Greater
            } else if self.match_kind(TokenKind::GreaterEqual) {
                BinaryOp::GreaterEqual
            } else {
                break;
            };
            let line = self.previous().line;
            let right = self.term()?;
            expr = Expr::new(
                ExprKind::Binary {
                    left: Box::new(expr),
                    operator,
                    right: Box::new(right),
                },
                line,
            );
        }

        Some(expr)
    }

    fn term(&mut self) -> Option<Expr> {
        let mut expr = self.factor()?;

        loop {
            let operator = if self.match_kind(TokenKind::Plus) {
                BinaryOp::Add
            } else if self.match_kind(TokenKind::Minus) {
                BinaryOp::Subtract
            } else {
                break;
            };
            let line = self.previous().line;
            let right = self.factor()?;
            expr = Expr::new(
                ExprKind::Binary {
                    left: Box::new(expr),
                    operator,
                    right: Box::new(right),
                },
                line,
            );
        }

        Some(expr)
    }

    fn factor(&mut self) -> Option<Expr> {
        let mut expr = self.unary()?;

        loop {
            let operator = if self.match_kind(TokenKind::Star) {
                BinaryOp::Multiply
            } else if self.match_kind(TokenKind::Slash) {
                BinaryOp::Divide
            } else {
                break;
            };
            let line = self.previous().line;
            let right = self.unary()?;
            expr = Expr::new(
                ExprKind::Binary {
                    left: Box::new(expr),
                    operator,
                    right: Box::new(right),
                },
                line,
            );
        }

        Some(expr)
    }

    fn unary(&mut self) -> Option<Expr> {
        let operator = if self.match_kind(TokenKind::Bang) {
            UnaryOp::Not
        } else if self.match_kind(TokenKind::Minus) {
            UnaryOp::Negate
        } else {
            return self.call();
        };

        let line = self.previous().line;
        let operand = self.unary()?;
        Some(Expr::new(
            ExprKind::Unary {
                operator,
                operand: Box::new(operand),
            },
            line,
        ))
    }

    /// call → primary ( "(" args ")" | "." identifier | "[" expr "]" )*
    fn call(&mut self) -> Option<Expr> {
        let mut expr = self.primary()?;

        loop {
            if self.match_kind(TokenKind::LeftParen) {
                let line = self.previous().line;
                let arguments = self.argument_list()?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        arguments,
                    },
                    line,
                );
            } else if self.match_kind(TokenKind::Dot) {
                let line = self.previous().line;
                let name = self
                    .expect(TokenKind::Identifier, "property name after '.'")?
                    .lexeme;
                expr = Expr::new(
                    ExprKind::Get {
                        object: Box::new(expr),
                        name,
                    },
                    line,
                );
            } else if self.match_kind(TokenKind::LeftBracket) {
                let line = self.previous().line;
                let index = self.expression()?;
                self.expect(TokenKind::RightBracket, "']' after index")?;
                expr = Expr::new(
                    ExprKind::Index {
                        object: Box::new(expr),
                        index: Box::new(index),
                    },
                    line,
                );
            } else {
                break;
            }
        }

        Some(expr)
    }

    fn argument_list(&mut self) -> Option<Vec<Expr>> {
        let mut arguments = Vec::new();

        if self.match_kind(TokenKind::RightParen) {
            return Some(arguments);
        }

        arguments.push(self.expression()?);
        while self.match_kind(TokenKind::Comma) {
            if arguments.len() >= MAX_ARGUMENTS {
                let line = self.peek().line;
                self.error(ParseError::TooManyArguments { line });
                return None;
            }
            arguments.push(self.expression()?);
        }

        self.expect(TokenKind::RightParen, "')' after arguments")?;
        Some(arguments)
    }

    fn primary(&mut self) -> Option<Expr> {
        let line = self.peek().line;

        if self.match_kind(TokenKind::False) {
            return Some(Expr::new(ExprKind::BoolLiteral(false), line));
        }
        if self.match_kind(TokenKind::True) {
            return Some(Expr::new(ExprKind::BoolLiteral(true), line));
        }
        if self.match_kind(TokenKind::Nil) {
            return Some(Expr::new(ExprKind::NilLiteral, line));
        }
        if self.match_kind(TokenKind::Number) {
            let lexeme = self.previous().lexeme.clone();
            return match lexeme.parse::<f64>() {
                Ok(value) => Some(Expr::new(ExprKind::NumberLiteral(value), line)),
                Err(_) => {
                    self.error(ParseError::InvalidNumber { lexeme, line });
                    None
                }
            };
        }
        if self.match_kind(TokenKind::String) {
            let value = self.previous().lexeme.clone();
            return Some(Expr::new(ExprKind::StringLiteral(value), line));
        }
        if self.match_kind(TokenKind::LeftParen) {
            let expr = self.expression()?;
            self.expect(TokenKind::RightParen, "')' after expression")?;
            return Some(Expr::new(ExprKind::Grouping(Box::new(expr)), line));
        }
        if self.match_kind(TokenKind::Identifier) {
            let name = self.previous().lexeme.clone();
            return Some(Expr::new(ExprKind::Identifier(name), line));
        }
        if self.match_kind(TokenKind::This) {
            return Some(Expr::new(ExprKind::This, line));
        }
        if self.match_kind(TokenKind::Super) {
            self.expect(TokenKind::Dot, "'.' after 'super'")?;
            let method = self
                .expect(TokenKind::Identifier, "superclass method name")?
                .lexeme;
            return Some(Expr::new(ExprKind::Super { method }, line));
        }
        if self.match_kind(TokenKind::Function) {
            return self.function_literal(line);
        }
        if self.match_kind(TokenKind::LeftBrace) {
            return self.array_literal(line);
        }
        if self.match_kind(TokenKind::LeftBracket) {
            return self.hash_literal(line);
        }

        self.error(ParseError::expected_expression(line));
        None
    }

    /// function [name](params) { body }
    fn function_literal(&mut self, line: usize) -> Option<Expr> {
        let name = if self.check(TokenKind::Identifier) {
            Some(self.advance().lexeme.clone())
        } else {
            None
        };

        self.expect(TokenKind::LeftParen, "'(' after 'function'")?;
        let params = self.function_params()?;
        self.expect(TokenKind::LeftBrace, "'{' before function body")?;
        let body = self.block_body()?;

        Some(Expr::new(
            ExprKind::Function(FunctionLiteral { name, params, body }),
            line,
        ))
    }

    /// {e1, e2, ...} — the expression-position brace form.
    fn array_literal(&mut self, line: usize) -> Option<Expr> {
        let mut elements = Vec::new();

        if self.match_kind(TokenKind::RightBrace) {
            return Some(Expr::new(ExprKind::Array(elements), line));
        }

        elements.push(self.expression()?);
        while self.match_kind(TokenKind::Comma) {
            elements.push(self.expression()?);
        }

        self.expect(TokenKind::RightBrace, "'}' after array elements")?;
        Some(Expr::new(ExprKind::Array(elements), line))
    }

    /// [k1: v1, k2: v2, ...]; [] is the empty hash.
    fn hash_literal(&mut self, line: usize) -> Option<Expr> {
        let mut pairs = Vec::new();

        if self.match_kind(TokenKind::RightBracket) {
            return Some(Expr::new(ExprKind::Hash(pairs), line));
        }

        loop {
            let key = self.expression()?;
            self.expect(TokenKind::Colon, "':' after hash key")?;
            let value = self.expression()?;
            pairs.push((key, value));

            if !self.match_kind(TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RightBracket, "']' after hash entries")?;
        Some(Expr::new(ExprKind::Hash(pairs), line))
    }
}
