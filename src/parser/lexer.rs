// src/parser/lexer.rs
//! Lexical analyzer (tokenizer) for guest script source

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Keywords
    And,
    Or,
    Not,
    Nil,
    True,
    False,
    Function,
    End,
    If,
    Then,
    Elseif,
    Else,
    While,
    Do,
    Local,
    Return,

    // Identifiers and literals
    Identifier(String),
    Number(f64),
    Str(String),

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Concat,

    EqEq,
    NotEq,
    Gt,
    Gte,
    Lt,
    Lte,

    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,

    Comma,
    Semicolon,
    Dot,
    Assign,

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Identifier(s) => write!(f, "identifier '{}'", s),
            Token::Number(n) => write!(f, "number {}", n),
            Token::Str(s) => write!(f, "string \"{}\"", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
}

#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lexer error at {}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for LexError {}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();

        if self.is_at_end() {
            return Ok(Token::Eof);
        }

        let ch = self.current_char();

        match ch {
            '(' => {
                self.advance();
                return Ok(Token::LeftParen);
            }
            ')' => {
                self.advance();
                return Ok(Token::RightParen);
            }
            '{' => {
                self.advance();
                return Ok(Token::LeftBrace);
            }
            '}' => {
                self.advance();
                return Ok(Token::RightBrace);
            }
            '[' => {
                self.advance();
                return Ok(Token::LeftBracket);
            }
            ']' => {
                self.advance();
                return Ok(Token::RightBracket);
            }
            ',' => {
                self.advance();
                return Ok(Token::Comma);
            }
            ';' => {
                self.advance();
                return Ok(Token::Semicolon);
            }
            '+' => {
                self.advance();
                return Ok(Token::Plus);
            }
            '-' => {
                self.advance();
                return Ok(Token::Minus);
            }
            '*' => {
                self.advance();
                return Ok(Token::Star);
            }
            '/' => {
                self.advance();
                return Ok(Token::Slash);
            }
            '%' => {
                self.advance();
                return Ok(Token::Percent);
            }
            '.' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '.' {
                    self.advance();
                    return Ok(Token::Concat);
                }
                return Ok(Token::Dot);
            }
            '=' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::EqEq);
                }
                return Ok(Token::Assign);
            }
            '~' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::NotEq);
                }
                return Err(self.error("Expected '~='"));
            }
            '>' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::Gte);
                }
                return Ok(Token::Gt);
            }
            '<' => {
                self.advance();
                if !self.is_at_end() && self.current_char() == '=' {
                    self.advance();
                    return Ok(Token::Lte);
                }
                return Ok(Token::Lt);
            }
            '"' | '\'' => return self.read_string(ch),
            _ => {}
        }

        if ch.is_ascii_digit() {
            return self.read_number();
        }

        if ch.is_ascii_alphabetic() || ch == '_' {
            return self.read_identifier();
        }

        Err(self.error(&format!("Unexpected character: '{}'", ch)))
    }

    fn read_identifier(&mut self) -> Result<Token, LexError> {
        let start = self.position;

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }

        let identifier: String = self.input[start..self.position].iter().collect();

        let token = match identifier.as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "nil" => Token::Nil,
            "true" => Token::True,
            "false" => Token::False,
            "function" => Token::Function,
            "end" => Token::End,
            "if" => Token::If,
            "then" => Token::Then,
            "elseif" => Token::Elseif,
            "else" => Token::Else,
            "while" => Token::While,
            "do" => Token::Do,
            "local" => Token::Local,
            "return" => Token::Return,
            _ => Token::Identifier(identifier),
        };

        Ok(token)
    }

    fn read_number(&mut self) -> Result<Token, LexError> {
        let start = self.position;
        let mut has_dot = false;

        while !self.is_at_end() {
            let ch = self.current_char();
            if ch.is_ascii_digit() {
                self.advance();
            } else if ch == '.' && !has_dot && self.peek() != Some('.') {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        let num_str: String = self.input[start..self.position].iter().collect();

        let num = num_str
            .parse::<f64>()
            .map_err(|_| self.error(&format!("Invalid number: {}", num_str)))?;
        Ok(Token::Number(num))
    }

    fn read_string(&mut self, quote: char) -> Result<Token, LexError> {
        self.advance(); // consume opening quote

        let mut result = String::new();

        while !self.is_at_end() && self.current_char() != quote {
            let ch = self.current_char();

            if ch == '\\' {
                self.advance();
                if self.is_at_end() {
                    return Err(self.error("Unterminated string"));
                }

                let escaped = match self.current_char() {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '\\' => '\\',
                    c => c,
                };

                result.push(escaped);
                self.advance();
            } else {
                result.push(ch);
                self.advance();
            }
        }

        if self.is_at_end() {
            return Err(self.error("Unterminated string"));
        }

        self.advance(); // consume closing quote

        Ok(Token::Str(result))
    }

    fn skip_whitespace_and_comments(&mut self) {
        while !self.is_at_end() {
            let ch = self.current_char();

            if ch.is_whitespace() {
                self.advance();
            } else if ch == '-' && self.peek() == Some('-') {
                // Line comment
                while !self.is_at_end() && self.current_char() != '\n' {
                    self.advance();
                }
            } else {
                break;
            }
        }
    }

    fn current_char(&self) -> char {
        self.input[self.position]
    }

    fn peek(&self) -> Option<char> {
        if self.position + 1 < self.input.len() {
            Some(self.input[self.position + 1])
        } else {
            None
        }
    }

    fn advance(&mut self) {
        if !self.is_at_end() {
            if self.current_char() == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
            self.position += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn error(&self, message: &str) -> LexError {
        LexError {
            message: message.to_string(),
            line: self.line,
            column: self.column,
        }
    }
}
