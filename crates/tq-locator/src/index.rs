//! Top-level function ranges of one Go source file.
//!
//! Only declarations at brace depth zero are recorded, so a line inside a
//! closure resolves to the function that encloses the closure.

use std::path::Path;

use tq_error::{Result, TqError};
use tq_types::FunctionRange;

use crate::lexer::{Lexer, Token, TokenKind};

/// Top-level function declarations of one Go source file, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionIndex {
    functions: Vec<FunctionRange>,
}

impl FunctionIndex {
    /// Read and scan a Go source file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path).map_err(|source| TqError::SourceRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(path, &source)
    }

    /// Scan Go source text. `path` is only used in error messages.
    pub fn parse(path: &Path, source: &str) -> Result<Self> {
        let tokens = Lexer::tokenize(source)
            .map_err(|err| TqError::source_parse(path, err.line, err.detail))?;
        let functions = DeclScanner { tokens: &tokens }
            .scan()
            .map_err(|(line, detail)| TqError::source_parse(path, line, detail))?;
        Ok(Self { functions })
    }

    /// Name of the first top-level function whose declaration spans `line`.
    ///
    /// The span runs from the line of the `func` keyword to the line of the
    /// body's closing brace, inclusive. Closures and methods declared inside
    /// a body are not separate entries.
    pub fn function_at(&self, line: u32) -> Option<&str> {
        self.functions
            .iter()
            .find(|f| f.contains(line))
            .map(|f| f.name.as_str())
    }

    pub fn functions(&self) -> &[FunctionRange] {
        &self.functions
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

type ScanResult<T> = std::result::Result<T, (u32, String)>;

struct DeclScanner<'t, 'a> {
    tokens: &'t [Token<'a>],
}

impl DeclScanner<'_, '_> {
    fn scan(&self) -> ScanResult<Vec<FunctionRange>> {
        let mut functions = Vec::new();
        let mut depth = 0usize;
        let mut at_decl_start = true;
        let mut i = 0;

        while let Some(tok) = self.tokens.get(i) {
            match tok.kind {
                TokenKind::Eof => break,
                TokenKind::Func if depth == 0 && at_decl_start => {
                    let (range, next) = self.func_decl(i)?;
                    functions.push(range);
                    i = next;
                    at_decl_start = false;
                    continue;
                }
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                    depth += 1;
                }
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    depth = depth
                        .checked_sub(1)
                        .ok_or_else(|| (tok.line, format!("unexpected '{}'", tok.text)))?;
                }
                _ => {}
            }
            at_decl_start = tok.kind == TokenKind::Semicolon;
            i += 1;
        }

        if depth != 0 {
            let line = self.tokens.last().map_or(1, |t| t.line);
            return Err((line, "unbalanced brackets at end of file".to_owned()));
        }
        Ok(functions)
    }

    /// Scan `func [receiver] Name [typeparams] (params) [results] [body]`
    /// starting at the `func` token. Returns the range and the index of the
    /// first token after the declaration.
    fn func_decl(&self, func_idx: usize) -> ScanResult<(FunctionRange, usize)> {
        let start_line = self.tokens[func_idx].line;
        let mut i = func_idx + 1;

        if self.kind(i) == TokenKind::LeftParen {
            i = self.matching(i)? + 1;
        }

        let name_tok = self.tokens.get(i).filter(|t| t.kind == TokenKind::Ident);
        let Some(name_tok) = name_tok else {
            let line = self.tokens.get(i).map_or(start_line, |t| t.line);
            return Err((line, "expected function name".to_owned()));
        };
        let name = name_tok.text.to_owned();
        i += 1;

        if self.kind(i) == TokenKind::LeftBracket {
            i = self.matching(i)? + 1;
        }
        if self.kind(i) != TokenKind::LeftParen {
            return Err((self.line(i), format!("expected parameter list for {name}")));
        }
        i = self.matching(i)? + 1;

        loop {
            match self.kind(i) {
                TokenKind::LeftBrace => {
                    let close = self.matching(i)?;
                    // `func f() struct{ x int }` / `interface{ ... }` result types.
                    if matches!(
                        self.kind(i - 1),
                        TokenKind::Struct | TokenKind::Interface
                    ) {
                        i = close + 1;
                        continue;
                    }
                    let end_line = self.tokens[close].line;
                    return Ok((FunctionRange::new(name, start_line, end_line), close + 1));
                }
                TokenKind::LeftParen | TokenKind::LeftBracket => {
                    i = self.matching(i)? + 1;
                }
                TokenKind::Semicolon | TokenKind::Eof => {
                    // Declaration without a body (assembly-backed or linkname).
                    let end_line = self.tokens[i - 1].line;
                    return Ok((FunctionRange::new(name, start_line, end_line), i));
                }
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    let tok = &self.tokens[i];
                    return Err((tok.line, format!("unexpected '{}'", tok.text)));
                }
                _ => i += 1,
            }
        }
    }

    /// Index of the bracket closing the one at `open_idx`.
    fn matching(&self, open_idx: usize) -> ScanResult<usize> {
        let open = self.tokens[open_idx];
        let mut stack = vec![open.kind];
        for (offset, tok) in self.tokens[open_idx + 1..].iter().enumerate() {
            match tok.kind {
                TokenKind::LeftParen | TokenKind::LeftBracket | TokenKind::LeftBrace => {
                    stack.push(tok.kind);
                }
                TokenKind::RightParen | TokenKind::RightBracket | TokenKind::RightBrace => {
                    let expected = match stack.pop() {
                        Some(TokenKind::LeftParen) => TokenKind::RightParen,
                        Some(TokenKind::LeftBracket) => TokenKind::RightBracket,
                        _ => TokenKind::RightBrace,
                    };
                    if tok.kind != expected {
                        return Err((tok.line, format!("mismatched '{}'", tok.text)));
                    }
                    if stack.is_empty() {
                        return Ok(open_idx + 1 + offset);
                    }
                }
                TokenKind::Eof => break,
                _ => {}
            }
        }
        Err((open.line, format!("'{}' is never closed", open.text)))
    }

    fn kind(&self, i: usize) -> TokenKind {
        self.tokens.get(i).map_or(TokenKind::Eof, |t| t.kind)
    }

    fn line(&self, i: usize) -> u32 {
        self.tokens
            .get(i)
            .or_else(|| self.tokens.last())
            .map_or(1, |t| t.line)
    }
}
