//! Splits the graph text into tokens.

use flowgraph::{Block, Local};

use crate::error::Location;


/// Tokens borrow identifiers and numbers from the source text, the parser converts them.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Token<'a> {
    /// `;` up to the end of the line.
    Comment(&'a str),
    LBracket,
    RBracket,
    Comma,
    Colon,
    Equal,
    DotDot,
    Integer(&'a str),
    Float(&'a str),
    Identifier(&'a str),
    Block(Block),
    Local(Local),
    Eh(u32),
    Loop(u32),
    Func(u32),
}

#[derive(Debug, PartialEq, Eq)]
pub struct LocatedToken<'a> {
    pub token: Token<'a>,
    pub location: Location,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexError {
    InvalidChar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocatedError {
    pub error: LexError,
    pub location: Location,
}

type LexResult<'a> = Result<LocatedToken<'a>, LocatedError>;

/// Entity names are a lowercase prefix and a canonical decimal number: `bb12`, `l3`, `eh0`.
fn entity_token<'a>(word: &str) -> Option<Token<'a>> {
    let split = word.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = word.split_at(split);
    if !digits.bytes().all(|b| b.is_ascii_digit()) || (digits.len() > 1 && digits.starts_with('0'))
    {
        return None;
    }
    let number: u32 = digits.parse().ok()?;
    let token = match prefix {
        "bb" => Token::Block(Block::with_number(number)?),
        "l" if number != u32::MAX => Token::Local(Local::from(number)),
        "eh" => Token::Eh(number),
        "loop" => Token::Loop(number),
        "f" => Token::Func(number),
        _ => return None,
    };
    Some(token)
}

pub struct Lexer<'a> {
    source: &'a str,
    /// Byte offset of the next unread character.
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { source, pos: 0, line: 1 }
    }

    fn rest(&self) -> &'a str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        self.rest().chars().nth(1)
    }

    fn bump(&mut self) {
        if let Some(c) = self.peek() {
            self.pos += c.len_utf8();
            if c == '\n' {
                self.line += 1;
            }
        }
    }

    /// Consumes characters while `accept` holds and returns them.
    fn eat_while(&mut self, mut accept: impl FnMut(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().map_or(false, &mut accept) {
            self.bump();
        }
        &self.source[start..self.pos]
    }

    fn located(&self, token: Token<'a>, line: usize) -> LexResult<'a> {
        Ok(LocatedToken { token, location: Location { line_number: line } })
    }

    /// `12`, `-3`, `2_000` or `0.55`. A dot only continues the number if a digit follows, so
    /// `1..2` is two integers.
    fn number(&mut self, line: usize) -> LexResult<'a> {
        let start = self.pos;
        if matches!(self.peek(), Some('-' | '+')) {
            self.bump();
        }
        self.eat_while(|c| c.is_ascii_digit() || c == '_');
        let is_float = self.peek() == Some('.')
            && self.peek_second().map_or(false, |c| c.is_ascii_digit());
        if is_float {
            self.bump();
            self.eat_while(|c| c.is_ascii_digit() || c == '_');
        }
        let text = &self.source[start..self.pos];
        let token = if is_float { Token::Float(text) } else { Token::Integer(text) };
        self.located(token, line)
    }

    fn word(&mut self, line: usize) -> LexResult<'a> {
        let word = self.eat_while(|c| c.is_ascii_alphanumeric() || c == '_');
        let token = entity_token(word).unwrap_or(Token::Identifier(word));
        self.located(token, line)
    }

    fn punct(&mut self, token: Token<'a>, len: usize, line: usize) -> LexResult<'a> {
        for _ in 0..len {
            self.bump();
        }
        self.located(token, line)
    }

    /// The next token, `None` at the end of the text. An invalid character is reported once and
    /// skipped, lexing can continue afterwards.
    pub fn next(&mut self) -> Option<LexResult<'a>> {
        self.eat_while(char::is_whitespace);
        let line = self.line;
        let c = self.peek()?;
        let res = match c {
            ';' => {
                let text = self.eat_while(|c| c != '\n');
                self.located(Token::Comment(text), line)
            }
            '[' => self.punct(Token::LBracket, 1, line),
            ']' => self.punct(Token::RBracket, 1, line),
            ',' => self.punct(Token::Comma, 1, line),
            ':' => self.punct(Token::Colon, 1, line),
            '=' => self.punct(Token::Equal, 1, line),
            '.' if self.rest().starts_with("..") => self.punct(Token::DotDot, 2, line),
            '-' | '+' if self.peek_second().map_or(false, |c| c.is_ascii_digit()) => {
                self.number(line)
            }
            '0'..='9' => self.number(line),
            c if c.is_ascii_alphabetic() || c == '_' => self.word(line),
            _ => {
                self.bump();
                Err(LocatedError {
                    error: LexError::InvalidChar,
                    location: Location { line_number: line },
                })
            }
        };
        Some(res)
    }
}
