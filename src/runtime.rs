//! runtimes are responsible for executing translations against a [`crate::world::World`]

use core::fmt;

pub mod builtins;
pub mod interpreter;

pub use interpreter::{BlockOptions, Interpreter};

/// How an execution primitive finished. Anything but [`Flow::Done`] is a
/// non-local exit that some enclosing boundary has to absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Done,
    /// absorbed at the function boundary
    Return,
    /// absorbed by the innermost loop
    Break,
    /// absorbed by the innermost loop, which moves on to its next iteration
    Continue,
}

/// Category tag of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Compiler,
    Syntax,
    Assertion,
    Runtime,
    Program,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Compiler => "compiler",
            Self::Syntax => "syntax",
            Self::Assertion => "assertion",
            Self::Runtime => "runtime",
            Self::Program => "program",
        })
    }
}

/// The one failure type raised by the pipeline
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("compiler error: {0}")]
    Compiler(Box<str>),
    #[error("syntax error: {0}")]
    Syntax(Box<str>),
    #[error("assertion failed: {0}")]
    Assertion(Box<str>),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("program error: {0}")]
    Program(Box<str>),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Compiler(_) => ErrorKind::Compiler,
            Self::Syntax(_) => ErrorKind::Syntax,
            Self::Assertion(_) => ErrorKind::Assertion,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Program(_) => ErrorKind::Program,
        }
    }

    pub(crate) fn syntax(message: impl AsRef<str>) -> Self {
        Self::Syntax(Box::from(message.as_ref()))
    }

    pub(crate) fn compiler(message: impl AsRef<str>) -> Self {
        Self::Compiler(Box::from(message.as_ref()))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("symbol not found: {name}{}", Suggestions(.suggestions))]
    UndefinedSymbol {
        name: Box<str>,
        suggestions: Vec<Box<str>>,
    },
    #[error("key not found: {key}{}", Suggestions(.suggestions))]
    MissingKey {
        key: Box<str>,
        suggestions: Vec<Box<str>>,
    },
    #[error("{function}: expected {expected}, found {found}")]
    WrongType {
        function: Box<str>,
        expected: &'static str,
        found: &'static str,
    },
    #[error("{function}: needs {expected} argument(s), {found} available")]
    WrongArity {
        function: Box<str>,
        expected: usize,
        found: usize,
    },
    #[error("{0}: numeric overflow")]
    Overflow(Box<str>),
    #[error("division by zero")]
    DivisionByZero,
    #[error("value is not callable: {0}")]
    NotCallable(Box<str>),
    #[error("invalid bytecode at offset {0}")]
    InvalidBytecode(usize),
    #[error("stack underflow")]
    StackUnderflow,
    #[error("maximum call depth ({0}) exceeded")]
    StackOverflow(usize),
    #[error("{0}")]
    Other(Box<str>),
}

struct Suggestions<'a>(&'a [Box<str>]);

impl fmt::Display for Suggestions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return Ok(());
        }
        write!(f, " (did you mean: ")?;
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
        }
        write!(f, "?)")
    }
}

/// Compute Levenshtein edit distance between two strings.
pub(crate) fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];
    for (i, ac) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, bc) in b.chars().enumerate() {
            let cost = usize::from(ac != bc);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Picks the candidates closest to `name`, best first
pub(crate) fn suggest<'a>(
    name: &str,
    candidates: impl IntoIterator<Item = &'a str>,
) -> Vec<Box<str>> {
    let max_dist = (name.chars().count() / 2 + 1).min(3);
    let mut found = candidates
        .into_iter()
        .filter_map(|candidate| {
            let dist = levenshtein_distance(name, candidate);
            (dist > 0 && dist <= max_dist).then_some((dist, candidate))
        })
        .collect::<Vec<_>>();
    found.sort();
    found.dedup();
    found
        .into_iter()
        .take(3)
        .map(|(_, candidate)| Box::from(candidate))
        .collect()
}

#[cfg(test)]
mod tests {
    use assert2::check;

    use super::{levenshtein_distance, suggest, Error, ErrorKind, RuntimeError};

    #[test]
    fn edit_distance() {
        check!(levenshtein_distance("print", "prnt") == 1);
        check!(levenshtein_distance("", "abc") == 3);
        check!(levenshtein_distance("same", "same") == 0);
    }

    #[test]
    fn suggestions_rank_closest_first() {
        let names = ["print", "prints", "paint", "loop"];
        let found = suggest("prin", names);
        check!(found.first().map(|s| s.as_ref()) == Some("print"));
        check!(!found.iter().any(|s| s.as_ref() == "loop"));
    }

    #[test]
    fn errors_carry_their_category() {
        let err = Error::from(RuntimeError::UndefinedSymbol {
            name: "pritn".into(),
            suggestions: vec!["print".into()],
        });
        check!(err.kind() == ErrorKind::Runtime);
        check!(err.to_string() == "runtime error: symbol not found: pritn (did you mean: print?)");
        check!(Error::Program("boom".into()).kind() == ErrorKind::Program);
    }
}
