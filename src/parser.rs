use strum::IntoDiscriminant;

use crate::scanner::{Token, TokenType, TokenTypeVariant};

/// Cursor over a scanned token stream shared by the extraction routines.
///
/// The extraction routines never fail on unexpected input: they look for the
/// constructs they understand and step over everything else, so the cursor
/// only offers lookahead and consumption, never hard errors.
pub(crate) struct Parser<'a> {
    source_tokens: &'a [Token],
    curr: usize,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(tokens: &'a [Token]) -> Parser<'a> {
        Self {
            source_tokens: tokens,
            curr: 0,
        }
    }

    pub(crate) fn tokens(&self) -> &'a [Token] {
        self.source_tokens
    }

    pub(crate) fn position(&self) -> usize {
        self.curr
    }

    pub(crate) fn peek(&self) -> &'a Token {
        &self.source_tokens[self.curr]
    }

    pub(crate) fn peek_prev(&self) -> Option<&'a Token> {
        self.curr
            .checked_sub(1)
            .and_then(|idx| self.source_tokens.get(idx))
    }

    pub(crate) fn peek_next_i(&self, i: usize) -> &'a Token {
        if self.curr + i >= self.source_tokens.len() {
            // Eof
            &self.source_tokens[self.source_tokens.len() - 1]
        } else {
            &self.source_tokens[self.curr + i]
        }
    }

    pub(crate) fn advance(&mut self) -> &'a Token {
        let token = self.peek();
        if !self.is_at_end() {
            // Do not advance past Eof
            self.curr += 1;
        }
        token
    }

    pub(crate) fn is_at_end(&self) -> bool {
        self.peek().kind == TokenType::Eof
    }

    pub(crate) fn check_token_type(&self, token_type: TokenTypeVariant) -> bool {
        self.peek().kind.discriminant() == token_type
    }

    pub(crate) fn match_token_type(&mut self, token_type: TokenTypeVariant) -> bool {
        if self.check_token_type(token_type) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(crate) fn match_identifier(&mut self) -> Option<&'a str> {
        let token = self.peek();
        let name = token.ident_name()?;
        self.advance();
        Some(name)
    }

    pub(crate) fn check_non_reserved_keyword(&self, value: &str) -> bool {
        self.peek().is_word(value)
    }

    pub(crate) fn match_non_reserved_keyword(&mut self, value: &str) -> bool {
        if self.check_non_reserved_keyword(value) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// With the cursor on a `(`, skips to the token after its matching `)`.
    /// Returns the index of the matching `)`, or `None` when the parenthesis is
    /// never closed (the cursor is then left on `Eof`).
    pub(crate) fn skip_parenthesized(&mut self) -> Option<usize> {
        if !self.match_token_type(TokenTypeVariant::LeftParen) {
            return None;
        }
        let mut depth = 1usize;
        while !self.is_at_end() {
            let token = self.advance();
            match token.kind {
                TokenType::LeftParen => depth += 1,
                TokenType::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(self.curr - 1);
                    }
                }
                _ => {}
            }
        }
        None
    }
}

/// Text covered by the tokens `tokens[from..to]` in the scanned `sql`.
pub(crate) fn token_span_text<'s>(sql: &'s str, tokens: &[Token], from: usize, to: usize) -> &'s str {
    if from >= to {
        return "";
    }
    &sql[tokens[from].start..tokens[to - 1].end]
}

/// Copies a token slice into a stream of its own, terminated by `Eof`.
pub(crate) fn with_eof(tokens: &[Token]) -> Vec<Token> {
    let mut owned = tokens.to_vec();
    let end = tokens.last().map_or(0, |tok| tok.end);
    owned.push(Token {
        kind: TokenType::Eof,
        lexeme: String::from("eof"),
        line: 0,
        col: 0,
        start: end,
        end,
    });
    owned
}

/// Parenthesis depth of every token, where a `(` or `)` is counted at the
/// depth outside of it.
pub(crate) fn token_depths(tokens: &[Token]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|token| match token.kind {
            TokenType::LeftParen => {
                depth += 1;
                depth - 1
            }
            TokenType::RightParen => {
                depth = depth.saturating_sub(1);
                depth
            }
            _ => depth,
        })
        .collect()
}
