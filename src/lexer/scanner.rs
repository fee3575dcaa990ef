//! Scanner for Lume source code.
//!
//! Scans one byte at a time, tracking the start of the current lexeme and a
//! 1-based line counter. Errors are accumulated and scanning continues, so a
//! single pass reports every bad character in the input.

use crate::error::LexError;
use crate::lexer::token::{Token, TokenKind};

pub struct Scanner<'a> {
    source: &'a str,
    bytes: &'a [u8],
    start: usize,
    current: usize,
    line: usize,
    tokens: Vec<Token>,
    errors: Vec<LexError>,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            bytes: source.as_bytes(),
            start: 0,
            current: 0,
            line: 1,
            tokens: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Scan the whole input. Always produces a token stream ending in EOF;
    /// any errors encountered along the way are returned beside it.
    pub fn scan_tokens(mut self) -> (Vec<Token>, Vec<LexError>) {
        while !self.is_at_end() {
            self.start = self.current;
            self.scan_token();
        }

        self.tokens.push(Token::eof(self.line));
        (self.tokens, self.errors)
    }

    fn scan_token(&mut self) {
        let c = self.advance();
        match c {
            b'(' => self.add_token(TokenKind::LeftParen),
            b')' => self.add_token(TokenKind::RightParen),
            b'[' => self.add_token(TokenKind::LeftBracket),
            b']' => self.add_token(TokenKind::RightBracket),
            b'{' => self.add_token(TokenKind::LeftBrace),
            b'}' => self.add_token(TokenKind::RightBrace),
            b',' => self.add_token(TokenKind::Comma),
            b'.' => self.add_token(TokenKind::Dot),
            b'-' => self.add_token(TokenKind::Minus),
            b'+' => self.add_token(TokenKind::Plus),
            b';' => self.add_token(TokenKind::Semicolon),
            b'*' => self.add_token(TokenKind::Star),
            b'?' => self.add_token(TokenKind::Question),
            b':' => self.add_token(TokenKind::Colon),
            b'!' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::BangEqual);
                } else {
                    self.add_token(TokenKind::Bang);
                }
            }
            b'=' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::EqualEqual);
                } else {
                    self.add_token(TokenKind::Equal);
                }
            }
            b'<' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::LessEqual);
                } else {
                    self.add_token(TokenKind::Less);
                }
            }
            b'>' => {
                if self.match_byte(b'=') {
                    self.add_token(TokenKind::GreaterEqual);
                } else {
                    self.add_token(TokenKind::Greater);
                }
            }
            b'/' => {
                if self.match_byte(b'/') {
                    // Line comment, consumed up to (not including) the newline
                    while self.peek() != b'\n' && !self.is_at_end() {
                        self.advance();
                    }
                } else {
                    self.add_token(TokenKind::Slash);
                }
            }
            b' ' | b'\r' | b'\t' => {}
            b'\n' => self.line += 1,
            b'"' => self.string(),
            _ => {
                if is_digit(c) {
                    self.number();
                } else if is_alpha(c) {
                    self.identifier();
                } else {
                    self.errors
                        .push(LexError::unexpected_character(c as char, self.line));
                }
            }
        }
    }

    fn string(&mut self) {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
            }
            self.advance();
        }

        if self.is_at_end() {
            self.errors.push(LexError::unterminated_string(self.line));
            return;
        }

        // The closing quote
        self.advance();

        let value = &self.source[self.start + 1..self.current - 1];
        self.tokens
            .push(Token::new(TokenKind::String, value, self.line));
    }

    fn number(&mut self) {
        while is_digit(self.peek()) {
            self.advance();
        }

        // A fractional part needs at least one digit; a lone trailing dot
        // is left for the next lexeme.
        if self.peek() == b'.' && is_digit(self.peek_next()) {
            self.advance();
            while is_digit(self.peek()) {
                self.advance();
            }
        }

        self.add_token(TokenKind::Number);
    }

    fn identifier(&mut self) {
        while is_alphanumeric(self.peek()) {
            self.advance();
        }

        let text = &self.source[self.start..self.current];
        let kind = TokenKind::keyword(text).unwrap_or(TokenKind::Identifier);
        self.add_token(kind);
    }

    fn add_token(&mut self, kind: TokenKind) {
        let lexeme = &self.source[self.start..self.current];
        self.tokens.push(Token::new(kind, lexeme, self.line));
    }

    fn advance(&mut self) -> u8 {
        self.current += 1;
        self.bytes[self.current - 1]
    }

    fn match_byte(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.bytes[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            b'\0'
        } else {
            self.bytes[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.bytes.len() {
            b'\0'
        } else {
            self.bytes[self.current + 1]
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.bytes.len()
    }
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_alphanumeric(c: u8) -> bool {
    is_digit(c) || is_alpha(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan(source: &str) -> Vec<Token> {
        let (tokens, errors) = Scanner::new(source).scan_tokens();
        assert!(errors.is_empty(), "unexpected lex errors: {:?}", errors);
        tokens
    }

    fn kinds(source: &str) -> Vec<TokenKind> {
        scan(source).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn single_and_double_char_tokens() {
        assert_eq!(
            kinds("(){}[],.-+;/*?:"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::LeftBracket,
                TokenKind::RightBracket,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Semicolon,
                TokenKind::Slash,
                TokenKind::Star,
                TokenKind::Question,
                TokenKind::Colon,
                TokenKind::Eof,
            ]
        );
        assert_eq!(
            kinds("! != = == < <= > >="),
            vec![
                TokenKind::Bang,
                TokenKind::BangEqual,
                TokenKind::Equal,
                TokenKind::EqualEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn keywords_and_identifiers() {
        let tokens = scan("var forx function returned");
        assert_eq!(tokens[0].kind, TokenKind::Var);
        assert_eq!(tokens[1].kind, TokenKind::Identifier);
        assert_eq!(tokens[1].lexeme, "forx");
        assert_eq!(tokens[2].kind, TokenKind::Function);
        assert_eq!(tokens[3].kind, TokenKind::Identifier);
        assert_eq!(tokens[3].lexeme, "returned");
    }

    #[test]
    fn numbers() {
        let tokens = scan("12 3.75 4.");
        assert_eq!(tokens[0].lexeme, "12");
        assert_eq!(tokens[1].lexeme, "3.75");
        // A trailing dot is not part of the number
        assert_eq!(tokens[2].kind, TokenKind::Number);
        assert_eq!(tokens[2].lexeme, "4");
        assert_eq!(tokens[3].kind, TokenKind::Dot);
    }

    #[test]
    fn string_lexeme_is_contents() {
        let tokens = scan("\"hello\"");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "hello");
    }

    #[test]
    fn string_spanning_lines_counts_them() {
        let tokens = scan("\"a\nb\" x");
        assert_eq!(tokens[0].kind, TokenKind::String);
        assert_eq!(tokens[0].lexeme, "a\nb");
        assert_eq!(tokens[1].line, 2);
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(
            kinds("1 // this is ignored\n2"),
            vec![TokenKind::Number, TokenKind::Number, TokenKind::Eof]
        );
    }

    #[test]
    fn line_numbers() {
        let tokens = scan("1\n2\n\n3");
        assert_eq!(tokens[0].line, 1);
        assert_eq!(tokens[1].line, 2);
        assert_eq!(tokens[2].line, 4);
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let (tokens, errors) = Scanner::new("\"oops").scan_tokens();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], LexError::UnterminatedString { .. }));
        // EOF is still appended
        assert_eq!(tokens.last().unwrap().kind, TokenKind::Eof);
    }

    #[test]
    fn illegal_character_does_not_stop_scanning() {
        let (tokens, errors) = Scanner::new("1 @ 2 # 3").scan_tokens();
        assert_eq!(errors.len(), 2);
        let numbers: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Number)
            .collect();
        assert_eq!(numbers.len(), 3);
    }

    #[test]
    fn lexemes_round_trip_without_whitespace() {
        // For whitespace- and comment-free source, concatenating every
        // non-EOF lexeme reproduces the input (strings excepted, since
        // their lexemes drop the quotes).
        let source = "print(1+2*3);";
        let rebuilt: String = scan(source)
            .iter()
            .filter(|t| t.kind != TokenKind::Eof)
            .map(|t| t.lexeme.as_str())
            .collect();
        assert_eq!(rebuilt, source);
    }
}
