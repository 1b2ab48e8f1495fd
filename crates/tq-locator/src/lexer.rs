//! Go lexer, reduced to what declaration scanning needs.
//!
//! Produces identifiers, the three keywords that matter for declaration
//! structure (`func`, `struct`, `interface`), bracket tokens, literals and
//! semicolons, including the semicolons Go inserts at line ends. Everything
//! else collapses into `Op`.

use memchr::{memchr, memchr_iter};

/// Kind of a scanned token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Func,
    Struct,
    Interface,
    Literal,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
    /// Explicit `;` or one inserted at a line end / before EOF.
    Semicolon,
    /// `++` or `--`; both trigger semicolon insertion.
    IncDec,
    Op,
    Eof,
}

/// A token with its text and the 1-based line it starts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    pub text: &'a str,
    pub line: u32,
}

/// Scanning failure: unterminated literal or comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LexError {
    pub line: u32,
    pub detail: String,
}

/// Keywords after which Go does *not* insert a semicolon at line end.
/// `break`, `continue`, `fallthrough` and `return` are absent on purpose:
/// they behave like identifiers for insertion.
const NON_TERMINATING_KEYWORDS: [&str; 21] = [
    "case", "chan", "const", "default", "defer", "else", "for", "func", "go", "goto", "if",
    "import", "interface", "map", "package", "range", "select", "struct", "switch", "type", "var",
];

pub struct Lexer<'a> {
    text: &'a str,
    src: &'a [u8],
    pos: usize,
    line: u32,
    /// Whether a newline at this point would produce a semicolon.
    insert_semicolon: bool,
}

impl<'a> Lexer<'a> {
    #[must_use]
    pub fn new(source: &'a str) -> Self {
        Self {
            text: source,
            src: source.as_bytes(),
            pos: 0,
            line: 1,
            insert_semicolon: false,
        }
    }

    /// Tokenize the whole input. The last token is always `Eof`.
    pub fn tokenize(source: &'a str) -> Result<Vec<Token<'a>>, LexError> {
        let mut lexer = Self::new(source);
        let mut tokens = Vec::new();
        loop {
            let token = lexer.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token<'a>, LexError> {
        loop {
            while let Some(b' ' | b'\t' | b'\r') = self.peek() {
                self.pos += 1;
            }

            let Some(ch) = self.peek() else {
                let kind = if self.insert_semicolon {
                    TokenKind::Semicolon
                } else {
                    TokenKind::Eof
                };
                self.insert_semicolon = false;
                return Ok(self.token(kind, self.pos, self.pos, self.line));
            };

            match ch {
                b'\n' => {
                    let line = self.line;
                    let start = self.pos;
                    self.pos += 1;
                    self.line += 1;
                    if self.insert_semicolon {
                        self.insert_semicolon = false;
                        return Ok(self.token(TokenKind::Semicolon, start, start + 1, line));
                    }
                }
                b'/' if self.peek_at(1) == Some(b'/') => {
                    // Stops before the newline so insertion still happens.
                    self.pos = memchr(b'\n', &self.src[self.pos..])
                        .map_or(self.src.len(), |offset| self.pos + offset);
                }
                b'/' if self.peek_at(1) == Some(b'*') => {
                    let line = self.line;
                    let start = self.pos;
                    let newlines = self.skip_block_comment()?;
                    if newlines > 0 && self.insert_semicolon {
                        self.insert_semicolon = false;
                        return Ok(self.token(TokenKind::Semicolon, start, start, line));
                    }
                }
                _ => return self.lex_token(ch),
            }
        }
    }

    fn lex_token(&mut self, ch: u8) -> Result<Token<'a>, LexError> {
        let start = self.pos;
        let line = self.line;
        let kind = match ch {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' | 0x80..=0xff => return Ok(self.lex_identifier()),
            b'0'..=b'9' => return Ok(self.lex_number()),
            b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                return Ok(self.lex_number());
            }
            b'"' | b'\'' | b'`' => return self.lex_quoted(ch),
            b'(' => TokenKind::LeftParen,
            b')' => TokenKind::RightParen,
            b'[' => TokenKind::LeftBracket,
            b']' => TokenKind::RightBracket,
            b'{' => TokenKind::LeftBrace,
            b'}' => TokenKind::RightBrace,
            b';' => TokenKind::Semicolon,
            b'+' | b'-' if self.peek_at(1) == Some(ch) => {
                self.pos += 1;
                TokenKind::IncDec
            }
            _ => TokenKind::Op,
        };
        self.pos += 1;
        self.insert_semicolon = matches!(
            kind,
            TokenKind::RightParen
                | TokenKind::RightBracket
                | TokenKind::RightBrace
                | TokenKind::IncDec
        );
        Ok(self.token(kind, start, self.pos, line))
    }

    fn lex_identifier(&mut self) -> Token<'a> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = &self.text[start..self.pos];
        let kind = match word {
            "func" => TokenKind::Func,
            "struct" => TokenKind::Struct,
            "interface" => TokenKind::Interface,
            _ => TokenKind::Ident,
        };
        self.insert_semicolon = !NON_TERMINATING_KEYWORDS.contains(&word);
        self.token(kind, start, self.pos, self.line)
    }

    fn lex_number(&mut self) -> Token<'a> {
        let start = self.pos;
        let hex = self.src[start..].starts_with(b"0x") || self.src[start..].starts_with(b"0X");
        while let Some(b) = self.peek() {
            let exponent_sign = matches!(b, b'+' | b'-')
                && match self.src[self.pos - 1] {
                    b'p' | b'P' => true,
                    b'e' | b'E' => !hex,
                    _ => false,
                };
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' || exponent_sign {
                self.pos += 1;
            } else {
                break;
            }
        }
        self.insert_semicolon = true;
        self.token(TokenKind::Literal, start, self.pos, self.line)
    }

    /// Interpreted strings, runes and raw strings. Only raw strings may
    /// span lines.
    fn lex_quoted(&mut self, quote: u8) -> Result<Token<'a>, LexError> {
        let start = self.pos;
        let line = self.line;
        let unterminated = || LexError {
            line,
            detail: match quote {
                b'`' => "raw string literal not terminated",
                b'\'' => "rune literal not terminated",
                _ => "string literal not terminated",
            }
            .to_owned(),
        };
        self.pos += 1;
        if quote == b'`' {
            let offset = memchr(b'`', &self.src[self.pos..]).ok_or_else(unterminated)?;
            let body = &self.src[self.pos..self.pos + offset];
            self.line += memchr_iter(b'\n', body).count() as u32;
            self.pos += offset + 1;
        } else {
            loop {
                match self.peek() {
                    Some(b'\\') if self.peek_at(1).is_some_and(|b| b != b'\n') => self.pos += 2,
                    Some(b'\n') | None => return Err(unterminated()),
                    Some(b) if b == quote => {
                        self.pos += 1;
                        break;
                    }
                    Some(_) => self.pos += 1,
                }
            }
        }
        self.insert_semicolon = true;
        Ok(self.token(TokenKind::Literal, start, self.pos, line))
    }

    /// Returns the number of newlines inside the comment.
    fn skip_block_comment(&mut self) -> Result<usize, LexError> {
        let line = self.line;
        let body_start = self.pos + 2;
        let mut search = body_start;
        loop {
            let Some(offset) = memchr(b'*', &self.src[search..]) else {
                return Err(LexError {
                    line,
                    detail: "comment not terminated".to_owned(),
                });
            };
            let star = search + offset;
            if self.src.get(star + 1) == Some(&b'/') {
                let newlines = memchr_iter(b'\n', &self.src[body_start..star]).count();
                self.line += newlines as u32;
                self.pos = star + 2;
                return Ok(newlines);
            }
            search = star + 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn token(&self, kind: TokenKind, start: usize, end: usize, line: u32) -> Token<'a> {
        Token {
            kind,
            text: self.text.get(start..end).unwrap_or(""),
            line,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn inserts_semicolons_after_line_final_tokens() {
        use TokenKind::*;
        assert_eq!(
            kinds("package main\nx++\n"),
            [Ident, Ident, Semicolon, Ident, IncDec, Semicolon, Eof]
        );
        assert_eq!(kinds("func f() {\n}\n"), [
            Func, Ident, LeftParen, RightParen, LeftBrace, RightBrace, Semicolon, Eof
        ]);
    }

    #[test]
    fn no_semicolon_after_operators_or_keywords() {
        use TokenKind::*;
        assert_eq!(kinds("a +\nb"), [Ident, Op, Ident, Semicolon, Eof]);
        assert_eq!(kinds("import\n"), [Ident, Eof]);
        assert_eq!(kinds("return\n"), [Ident, Semicolon, Eof]);
    }

    #[test]
    fn braces_inside_literals_and_comments_are_ignored() {
        let src = "s := \"{\"\nr := '}'\nraw := `{\n}`\n// }\n/* { */\n";
        let tokens = Lexer::tokenize(src).unwrap();
        assert!(
            tokens
                .iter()
                .all(|t| !matches!(t.kind, TokenKind::LeftBrace | TokenKind::RightBrace)),
            "{tokens:?}"
        );
    }

    #[test]
    fn raw_strings_and_block_comments_advance_lines() {
        let src = "a := `x\ny\nz`\n/* one\ntwo */ b\n";
        let tokens = Lexer::tokenize(src).unwrap();
        let b = tokens.iter().find(|t| t.text == "b").unwrap();
        assert_eq!(b.line, 5);
    }

    #[test]
    fn multi_line_block_comment_acts_as_newline() {
        use TokenKind::*;
        assert_eq!(kinds("x /*\n*/ y"), [Ident, Semicolon, Ident, Semicolon, Eof]);
        assert_eq!(kinds("x /* */ y"), [Ident, Ident, Semicolon, Eof]);
    }

    #[test]
    fn escaped_quotes_stay_inside_strings() {
        let tokens = Lexer::tokenize(r#"s := "a\"}" + '\''"#).unwrap();
        let literals: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Literal)
            .map(|t| t.text)
            .collect();
        assert_eq!(literals, [r#""a\"}""#, r"'\''"]);
    }

    #[test]
    fn numbers_with_exponents_are_single_literals() {
        let tokens = Lexer::tokenize("x := 1.5e+3 + 0x1p-2").unwrap();
        let literals: Vec<_> = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Literal)
            .map(|t| t.text)
            .collect();
        assert_eq!(literals, ["1.5e+3", "0x1p-2"]);
    }

    #[test]
    fn unterminated_comment_is_an_error() {
        let err = Lexer::tokenize("x\n/* never closed").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn unterminated_literals_are_errors() {
        let err = Lexer::tokenize("a := 1\nb := \"open\nc := 2\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.detail, "string literal not terminated");

        let err = Lexer::tokenize("x := `raw\n").unwrap_err();
        assert_eq!(err.detail, "raw string literal not terminated");
    }
}
