use serde::{Deserialize, Serialize};
use strum_macros::EnumDiscriminants;

#[derive(PartialEq, Clone, Debug, EnumDiscriminants, Serialize, Deserialize)]
#[strum_discriminants(name(TokenTypeVariant))]
pub enum TokenType {
    LeftParen,
    RightParen,
    Comma,
    Dot,
    Semicolon,
    Star,
    Operator(String),
    QuotedIdentifier(String),
    Identifier(String),
    String(String),
    Number(String),
    Eof,

    // Keywords
    All,
    As,
    Cross,
    Delete,
    Distinct,
    Except,
    From,
    Full,
    Group,
    Having,
    Inner,
    Insert,
    Intersect,
    Into,
    Join,
    Lateral,
    Left,
    Limit,
    Merge,
    Natural,
    Offset,
    On,
    Order,
    Outer,
    Qualify,
    Recursive,
    Right,
    Select,
    Set,
    Union,
    Update,
    Using,
    Values,
    Where,
    Window,
    With,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenType,
    pub lexeme: String,
    pub line: u32,
    pub col: u32,
    /// Byte offset of the first character of the token in the scanned text.
    pub start: usize,
    /// Byte offset one past the last character of the token.
    pub end: usize,
}

impl Token {
    /// Name carried by an identifier token, with quotes removed.
    pub fn ident_name(&self) -> Option<&str> {
        match &self.kind {
            TokenType::Identifier(name) | TokenType::QuotedIdentifier(name) => Some(name),
            _ => None,
        }
    }

    pub fn is_identifier(&self) -> bool {
        self.ident_name().is_some()
    }

    /// Whether this is an unquoted identifier spelled `word` (case-insensitive).
    pub fn is_word(&self, word: &str) -> bool {
        matches!(&self.kind, TokenType::Identifier(ident) if ident.eq_ignore_ascii_case(word))
    }
}

const OPERATOR_CHARS: &str = "<>=!|&^~%+-/:?@#$";

pub struct Scanner {
    source_chars: Vec<char>,
    byte_offsets: Vec<usize>,
    tokens: Vec<Token>,
    start: usize,
    current: usize,
    line: u32,
    col: u32,
    start_line: u32,
    start_col: u32,
}

impl Scanner {
    pub fn new(source: &str) -> Self {
        let mut source_chars = vec![];
        let mut byte_offsets = vec![];
        for (offset, c) in source.char_indices() {
            source_chars.push(c);
            byte_offsets.push(offset);
        }
        byte_offsets.push(source.len());
        Self {
            source_chars,
            byte_offsets,
            tokens: vec![],
            start: 0,
            current: 0,
            line: 1,
            col: 1,
            start_line: 1,
            start_col: 1,
        }
    }

    pub fn tokens(&self) -> &Vec<Token> {
        &self.tokens
    }

    pub fn into_tokens(self) -> Vec<Token> {
        self.tokens
    }

    fn advance(&mut self) -> char {
        let c = self.source_chars[self.current];
        self.current += 1;
        if c == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        c
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.source_chars.len()
    }

    fn peek(&self) -> char {
        self.peek_next_i(0)
    }

    fn peek_next_i(&self, i: usize) -> char {
        self.source_chars
            .get(self.current + i)
            .copied()
            .unwrap_or('\0')
    }

    fn add_token(&mut self, token_type: TokenType) {
        self.tokens.push(Token {
            kind: token_type,
            lexeme: self.current_source_str(),
            line: self.start_line,
            col: self.start_col,
            start: self.byte_offsets[self.start],
            end: self.byte_offsets[self.current],
        });
    }

    fn current_source_str(&self) -> String {
        self.source_chars[self.start..self.current].iter().collect()
    }

    fn reset(&mut self) {
        self.tokens.clear();
        self.start = 0;
        self.current = 0;
        self.line = 1;
        self.col = 1;
    }

    pub fn scan(&mut self) {
        self.reset();
        while !self.is_at_end() {
            self.start = self.current;
            self.start_line = self.line;
            self.start_col = self.col;
            self.scan_token();
        }
        self.start = self.current;
        self.tokens.push(Token {
            kind: TokenType::Eof,
            lexeme: String::from("eof"),
            line: self.line,
            col: self.col,
            start: self.byte_offsets[self.current],
            end: self.byte_offsets[self.current],
        });
    }

    /// Consumes a quoted run up to `delimiter`, where a doubled delimiter is an escaped one.
    /// Returns the unescaped content.
    fn scan_quoted(&mut self, delimiter: char) -> String {
        let mut content = String::new();
        loop {
            if self.is_at_end() {
                log::warn!(
                    "{}",
                    self.error_str(&format!("Found unterminated literal quoted with {delimiter}"))
                );
                break;
            }
            let c = self.advance();
            if c == delimiter {
                if self.peek() == delimiter {
                    self.advance();
                    content.push(delimiter);
                    continue;
                }
                break;
            }
            content.push(c);
        }
        content
    }

    fn match_number(&mut self) {
        let mut found_dot = self.source_chars[self.start] == '.';
        loop {
            let peek_char = self.peek();
            if peek_char.is_ascii_digit() {
                self.advance();
            } else if peek_char == '.' && !found_dot {
                found_dot = true;
                self.advance();
            } else if (peek_char == 'e' || peek_char == 'E')
                && (self.peek_next_i(1).is_ascii_digit()
                    || (matches!(self.peek_next_i(1), '+' | '-')
                        && self.peek_next_i(2).is_ascii_digit()))
            {
                self.advance();
                self.advance();
                while self.peek().is_ascii_digit() {
                    self.advance();
                }
                break;
            } else {
                break;
            }
        }
        self.add_token(TokenType::Number(self.current_source_str()));
    }

    fn match_keyword_or_identifier(&mut self) {
        loop {
            let peek_char = self.peek();
            if !(peek_char.is_alphanumeric() || peek_char == '_' || peek_char == '$') {
                break;
            }
            self.advance();
        }
        let identifier = self.current_source_str();

        match identifier.to_lowercase().as_str() {
            "all" => self.add_token(TokenType::All),
            "as" => self.add_token(TokenType::As),
            "cross" => self.add_token(TokenType::Cross),
            "delete" => self.add_token(TokenType::Delete),
            "distinct" => self.add_token(TokenType::Distinct),
            "except" => self.add_token(TokenType::Except),
            "from" => self.add_token(TokenType::From),
            "full" => self.add_token(TokenType::Full),
            "group" => self.add_token(TokenType::Group),
            "having" => self.add_token(TokenType::Having),
            "inner" => self.add_token(TokenType::Inner),
            "insert" => self.add_token(TokenType::Insert),
            "intersect" => self.add_token(TokenType::Intersect),
            "into" => self.add_token(TokenType::Into),
            "join" => self.add_token(TokenType::Join),
            "lateral" => self.add_token(TokenType::Lateral),
            "left" => self.add_token(TokenType::Left),
            "limit" => self.add_token(TokenType::Limit),
            "merge" => self.add_token(TokenType::Merge),
            "natural" => self.add_token(TokenType::Natural),
            "offset" => self.add_token(TokenType::Offset),
            "on" => self.add_token(TokenType::On),
            "order" => self.add_token(TokenType::Order),
            "outer" => self.add_token(TokenType::Outer),
            "qualify" => self.add_token(TokenType::Qualify),
            "recursive" => self.add_token(TokenType::Recursive),
            "right" => self.add_token(TokenType::Right),
            "select" => self.add_token(TokenType::Select),
            "set" => self.add_token(TokenType::Set),
            "union" => self.add_token(TokenType::Union),
            "update" => self.add_token(TokenType::Update),
            "using" => self.add_token(TokenType::Using),
            "values" => self.add_token(TokenType::Values),
            "where" => self.add_token(TokenType::Where),
            "window" => self.add_token(TokenType::Window),
            "with" => self.add_token(TokenType::With),
            _ => self.add_token(TokenType::Identifier(identifier)),
        }
    }

    fn match_operator(&mut self) {
        loop {
            let peek_char = self.peek();
            let starts_comment = (peek_char == '-' && self.peek_next_i(1) == '-')
                || (peek_char == '/' && self.peek_next_i(1) == '*');
            if starts_comment || !OPERATOR_CHARS.contains(peek_char) || self.is_at_end() {
                break;
            }
            self.advance();
        }
        self.add_token(TokenType::Operator(self.current_source_str()));
    }

    fn skip_line_comment(&mut self) {
        while !self.is_at_end() && self.peek() != '\n' {
            self.advance();
        }
    }

    fn skip_block_comment(&mut self) {
        loop {
            if self.is_at_end() {
                log::warn!("{}", self.error_str("Found unterminated comment"));
                break;
            }
            if self.peek() == '*' && self.peek_next_i(1) == '/' {
                self.advance();
                self.advance();
                break;
            }
            self.advance();
        }
    }

    fn scan_token(&mut self) {
        let curr_char = self.advance();
        match curr_char {
            '(' => self.add_token(TokenType::LeftParen),
            ')' => self.add_token(TokenType::RightParen),
            ',' => self.add_token(TokenType::Comma),
            ';' => self.add_token(TokenType::Semicolon),
            '*' => self.add_token(TokenType::Star),
            '.' => {
                if self.peek().is_ascii_digit() {
                    self.match_number();
                } else {
                    self.add_token(TokenType::Dot);
                }
            }
            '-' if self.peek() == '-' => self.skip_line_comment(),
            '/' if self.peek() == '*' => {
                self.advance();
                self.skip_block_comment();
            }
            '\n' | '\r' | ' ' | '\t' => {}
            c if c.is_whitespace() => {}

            '\'' => {
                let content = self.scan_quoted('\'');
                self.add_token(TokenType::String(content));
            }
            '"' | '`' => {
                let content = self.scan_quoted(curr_char);
                self.add_token(TokenType::QuotedIdentifier(content));
            }

            c if c.is_ascii_digit() => self.match_number(),

            c if c.is_alphabetic() || c == '_' => self.match_keyword_or_identifier(),

            c if OPERATOR_CHARS.contains(c) => self.match_operator(),

            _ => {
                log::debug!(
                    "{}",
                    self.error_str(&format!("Found unexpected character: {curr_char}"))
                );
                self.add_token(TokenType::Operator(self.current_source_str()));
            }
        }
    }

    fn error_str(&self, error: &str) -> String {
        format!(
            "[line: {}, col: {}] Scanner: {}",
            self.start_line, self.start_col, error
        )
    }
}

/// Scans `sql` into tokens. The returned vector always ends with an `Eof` token.
pub fn tokenize(sql: &str) -> Vec<Token> {
    let mut scanner = Scanner::new(sql);
    scanner.scan();
    scanner.into_tokens()
}
