// Go declaration scanner and function locator.
//
// The scanner tokenizes Go source (strings, raw strings, runes, comments and
// automatic semicolon insertion) just far enough to find every top-level
// `func` declaration and the line span of its body. Resolution walks the
// top-level declarations only, so a line inside a closure resolves to the
// named function that contains the closure.

pub mod cache;
pub mod index;
pub mod lexer;

pub use cache::{FunctionLocator, LocatorStats};
pub use index::FunctionIndex;
pub use lexer::{LexError, Lexer, Token, TokenKind};
