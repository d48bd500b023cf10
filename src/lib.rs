//! A small backtracking regular expression engine.
//!
//! Patterns are parsed into an expression tree, compiled into a linear
//! bytecode program, and executed by a stack-machine interpreter that
//! backtracks through explicit position, call and counter stacks rather
//! than host recursion. The supported dialect: literals, `.`, bracket
//! classes with ranges and negation, `^`/`$`, greedy and lazy `*`/`+`/`?`,
//! `(...)`/`(?:...)` groups and `|` alternation, plus the `\d`/`\w`/`\s`
//! escapes and their complements.
//!
//! ```
//! let program = tinyregex::compile("(a|b)c+").unwrap();
//! let found = program.match_from("xxacc", 0).unwrap().unwrap();
//! assert_eq!((found.start(), found.len()), (2, 3));
//! assert_eq!(found.region().text_in("xxacc"), "acc");
//! ```

pub mod ast;
pub mod compiler;
pub mod matcher;
pub mod parser;

pub use matcher::{Match, Matches, Program, Region};

use thiserror::Error as ThisError;

/// Everything that can go wrong at the public boundary: a malformed
/// pattern handed to [`compile`], or a bad start offset handed to
/// [`Program::match_from`]. Defects in compiled bytecode are not errors —
/// they panic.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum Error {
    #[error("pattern is empty")]
    EmptyPattern,
    #[error("unmatched ')' in pattern")]
    UnmatchedParen,
    #[error("unclosed group in pattern")]
    UnclosedGroup,
    #[error("quantifier has nothing to repeat")]
    DanglingQuantifier,
    #[error("stray ']' in pattern")]
    StrayClassEnd,
    #[error("'[' may not appear inside a character class")]
    NestedClass,
    #[error("unterminated character class")]
    UnterminatedClass,
    #[error("dangling escape at end of pattern")]
    DanglingEscape,
    #[error("unrecognized group flag after '(?'")]
    InvalidGroup,
    #[error("start offset {start} is out of range for text of {len} characters")]
    StartOutOfRange { start: usize, len: usize },
}

/// Parse and compile `pattern` into an immutable, reusable [`Program`].
pub fn compile(pattern: &str) -> Result<Program, Error> {
    let root = parser::parse(pattern)?;
    Ok(compiler::Compiler::new().compile(&root))
}
