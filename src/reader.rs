//! Source text to blocks of values
//!
//! The reader only knows about tokens and brackets; deciding what a word
//! means is left to [`crate::ast`].
use std::rc::Rc;

pub use logos::Span;
use logos::{Lexer, Logos};

use crate::{
    runtime::Error,
    value::{Block, SymbolKind, Value},
    world::World,
};

#[derive(thiserror::Error, Debug, PartialEq, Clone, Default)]
pub enum ReaderError {
    #[default]
    #[error("invalid token encountered")]
    Invalid,
    #[error("malformed string")]
    MalformedString,
    #[error("unknown escape sequence: \\{0}")]
    UnknownEscape(char),
    #[error("malformed number")]
    MalformedNumber,
    #[error("number literal too big")]
    NumberTooBig,
}

fn process_string(lexer: &mut Lexer<Token>) -> Result<Box<str>, ReaderError> {
    let slice = lexer.slice();
    // strip the quotes
    let body = slice
        .get(1..slice.len() - 1)
        .ok_or(ReaderError::MalformedString)?;

    let mut string = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => string.push(match chars.next() {
                Some('n') => '\n',
                Some('t') => '\t',
                Some('r') => '\r',
                Some('"') => '"',
                Some('\\') => '\\',
                Some(other) => Err(ReaderError::UnknownEscape(other))?,
                None => Err(ReaderError::MalformedString)?,
            }),
            c => string.push(c),
        }
    }
    Ok(Box::from(string.as_str()))
}

/// The slice without its first `front` and last `back` bytes
fn trimmed(lexer: &mut Lexer<Token>, front: usize, back: usize) -> Box<str> {
    let slice = lexer.slice();
    Box::from(&slice[front..slice.len() - back])
}

#[derive(Debug, Clone, PartialEq, Logos)]
#[logos(error = ReaderError)]
pub enum Token {
    #[regex("[ \t\r]+")]
    Whitespace,
    #[token("\n")]
    LineEnding,
    #[regex(r";[^\n]*")]
    Comment,

    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,

    #[regex("[0-9]+", |l| l.slice().parse::<i64>().map_err(|_| ReaderError::NumberTooBig))]
    Integer(i64),
    #[regex(r"[0-9]+\.[0-9]+", |l| l.slice().parse::<f64>().map_err(|_| ReaderError::MalformedNumber))]
    Floating(f64),
    #[regex(r#""([^"\\]|\\.)*""#, process_string)]
    String(Box<str>),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*\??", |l| Box::from(l.slice()))]
    Word(Box<str>),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*\??:", |l| trimmed(l, 0, 1))]
    Label(Box<str>),
    #[regex(r"'[a-zA-Z_][a-zA-Z0-9_]*\??", |l| trimmed(l, 1, 0))]
    Literal(Box<str>),
    #[regex(r"\.[a-zA-Z_][a-zA-Z0-9_]*\??", |l| trimmed(l, 1, 0))]
    Attribute(Box<str>),
    #[regex(r"\.[a-zA-Z_][a-zA-Z0-9_]*\??:", |l| trimmed(l, 1, 1))]
    AttributeLabel(Box<str>),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*\??(\\([a-zA-Z_][a-zA-Z0-9_]*\??|[0-9]+))+", |l| Box::from(l.slice()))]
    Path(Box<str>),
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*\??(\\([a-zA-Z_][a-zA-Z0-9_]*\??|[0-9]+))+:", |l| trimmed(l, 0, 1))]
    PathLabel(Box<str>),

    #[token("+", |_| SymbolKind::Plus)]
    #[token("-", |_| SymbolKind::Minus)]
    #[token("*", |_| SymbolKind::Asterisk)]
    #[token("/", |_| SymbolKind::Slash)]
    #[token("//", |_| SymbolKind::DoubleSlash)]
    #[token("%", |_| SymbolKind::Percent)]
    #[token("^", |_| SymbolKind::Caret)]
    #[token("=", |_| SymbolKind::Equal)]
    #[token("<>", |_| SymbolKind::LessGreater)]
    #[token("<", |_| SymbolKind::Less)]
    #[token(">", |_| SymbolKind::Greater)]
    #[token("<=", |_| SymbolKind::LessEqual)]
    #[token(">=", |_| SymbolKind::GreaterEqual)]
    #[token("..", |_| SymbolKind::DotDot)]
    #[token("++", |_| SymbolKind::DoublePlus)]
    #[token("->", |_| SymbolKind::Arrow)]
    #[token("=>", |_| SymbolKind::ThickArrow)]
    #[token("::", |_| SymbolKind::DoubleColon)]
    #[token("|", |_| SymbolKind::Pipe)]
    #[token("&", |_| SymbolKind::Ampersand)]
    #[token("@", |_| SymbolKind::At)]
    #[token("#", |_| SymbolKind::Sharp)]
    #[token("$", |_| SymbolKind::Dollar)]
    #[token("ø", |_| SymbolKind::EmptySet)]
    Symbol(SymbolKind),
}

impl Token {
    pub fn lexer(source: &str) -> Lexer<Self> {
        <Self as Logos>::lexer(source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bracket {
    Block,
    Inline,
}

impl Bracket {
    fn close(self) -> char {
        match self {
            Self::Block => ']',
            Self::Inline => ')',
        }
    }
}

/// `a\b\1` as its segments: the head word, then words or indices
fn segments(world: &mut World, path: &str) -> Rc<[Value]> {
    path.split('\\')
        .map(|segment| match segment.parse::<i64>() {
            Ok(index) => Value::Integer(index),
            Err(_) => Value::Word(world.intern(segment)),
        })
        .collect()
}

type OpenBracket = (Bracket, Span, Vec<Value>);

/// Ends the innermost bracket, handing back the finished block and
/// restoring the items around it
fn close(
    open: &mut Vec<OpenBracket>,
    items: &mut Vec<Value>,
    closing: Bracket,
    span: &Span,
) -> Result<Value, Error> {
    let Some((bracket, opened, outer)) = open.pop() else {
        return Err(Error::syntax(format!(
            "unexpected `{}` at {}",
            closing.close(),
            span.start
        )));
    };
    if bracket != closing {
        return Err(Error::syntax(format!(
            "expected `{}` at {} to close the bracket at {}, found `{}`",
            bracket.close(),
            span.start,
            opened.start,
            closing.close()
        )));
    }
    let inner = Block::new(core::mem::replace(items, outer));
    Ok(match bracket {
        Bracket::Block => Value::Block(inner),
        Bracket::Inline => Value::Inline(inner),
    })
}

/// Reads `source` into a (static) block
pub fn read(world: &mut World, source: &str) -> Result<Block, Error> {
    let mut lexer = Token::lexer(source);
    let mut open: Vec<OpenBracket> = vec![];
    let mut items = vec![];
    let mut line = 1;

    while let Some(token) = lexer.next() {
        let span = lexer.span();
        let token = token.map_err(|err| {
            Error::syntax(format!("{err} at {}..{}: {:?}", span.start, span.end, lexer.slice()))
        })?;
        let value = match token {
            Token::Whitespace | Token::Comment => continue,
            Token::LineEnding => {
                line += 1;
                Value::Newline(line)
            }
            Token::LBracket => {
                open.push((Bracket::Block, span, core::mem::take(&mut items)));
                continue;
            }
            Token::LParen => {
                open.push((Bracket::Inline, span, core::mem::take(&mut items)));
                continue;
            }
            Token::RBracket => close(&mut open, &mut items, Bracket::Block, &span)?,
            Token::RParen => close(&mut open, &mut items, Bracket::Inline, &span)?,
            Token::Integer(i) => Value::Integer(i),
            Token::Floating(f) => Value::Floating(f),
            Token::String(s) => Value::string(s),
            Token::Word(name) => Value::Word(world.intern(name)),
            Token::Label(name) => Value::Label(world.intern(name)),
            Token::Literal(name) => Value::Literal(world.intern(name)),
            Token::Attribute(name) => Value::Attribute(world.intern(name)),
            Token::AttributeLabel(name) => Value::AttributeLabel(world.intern(name)),
            Token::Path(path) => Value::Path(segments(world, &path)),
            Token::PathLabel(path) => Value::PathLabel(segments(world, &path)),
            Token::Symbol(symbol) => Value::Symbol(symbol),
        };
        items.push(value);
    }

    if let Some((bracket, opened, _)) = open.last() {
        return Err(Error::syntax(format!(
            "unclosed bracket at {}, expected `{}`",
            opened.start,
            bracket.close()
        )));
    }
    Ok(Block::new(items))
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::{read, ReaderError, Token};
    use crate::{
        runtime::ErrorKind,
        value::{SymbolKind, Value},
        world::World,
    };

    fn tokens(source: &str) -> Vec<Result<Token, ReaderError>> {
        Token::lexer(source)
            .filter(|token| *token != Ok(Token::Whitespace))
            .collect()
    }

    #[test]
    fn names_and_their_sigils() {
        check!(
            tokens("x x: 'x .x .x: empty?")
                == vec![
                    Ok(Token::Word("x".into())),
                    Ok(Token::Label("x".into())),
                    Ok(Token::Literal("x".into())),
                    Ok(Token::Attribute("x".into())),
                    Ok(Token::AttributeLabel("x".into())),
                    Ok(Token::Word("empty?".into())),
                ]
        );
    }

    #[test]
    fn numbers_and_ranges() {
        check!(
            tokens("1..3 2.5 10")
                == vec![
                    Ok(Token::Integer(1)),
                    Ok(Token::Symbol(SymbolKind::DotDot)),
                    Ok(Token::Integer(3)),
                    Ok(Token::Floating(2.5)),
                    Ok(Token::Integer(10)),
                ]
        );
        check!(tokens("99999999999999999999") == vec![Err(ReaderError::NumberTooBig)]);
    }

    #[test]
    fn every_symbol_is_recognized() {
        let symbols = [
            SymbolKind::Plus,
            SymbolKind::Minus,
            SymbolKind::Asterisk,
            SymbolKind::Slash,
            SymbolKind::DoubleSlash,
            SymbolKind::Percent,
            SymbolKind::Caret,
            SymbolKind::Equal,
            SymbolKind::LessGreater,
            SymbolKind::Less,
            SymbolKind::Greater,
            SymbolKind::LessEqual,
            SymbolKind::GreaterEqual,
            SymbolKind::DotDot,
            SymbolKind::DoublePlus,
            SymbolKind::Arrow,
            SymbolKind::ThickArrow,
            SymbolKind::DoubleColon,
            SymbolKind::Pipe,
            SymbolKind::Ampersand,
            SymbolKind::At,
            SymbolKind::Sharp,
            SymbolKind::Dollar,
            SymbolKind::EmptySet,
        ];
        for symbol in symbols {
            let mut lexer = Token::lexer(symbol.as_str());
            check!(lexer.next() == Some(Ok(Token::Symbol(symbol))), "{}", symbol.as_str());
            check!(lexer.next().is_none());
        }
    }

    #[test]
    fn string_escapes() {
        check!(tokens(r#""a\tb\n\"c\"\\""#) == vec![Ok(Token::String("a\tb\n\"c\"\\".into()))]);
        check!(tokens(r#""\q""#) == vec![Err(ReaderError::UnknownEscape('q'))]);
    }

    #[test]
    fn paths_split_into_segments() {
        let mut world = World::default();
        let block = read(&mut world, "a\\b\\1 d\\k: 5").unwrap();
        let a = world.lookup("a").unwrap();
        let b = world.lookup("b").unwrap();
        let_assert!([Value::Path(path), Value::PathLabel(label), Value::Integer(5)] = block.items());
        check!(path.as_ref() == [Value::Word(a), Value::Word(b), Value::Integer(1)]);
        check!(label.len() == 2);
    }

    #[test]
    fn brackets_nest() {
        let mut world = World::default();
        let block = read(&mut world, "print [1 (2 3) [ ]] ; trailing comment\nx").unwrap();
        let_assert!([Value::Word(_), Value::Block(outer), Value::Newline(2), Value::Word(_)] = block.items());
        let_assert!([Value::Integer(1), Value::Inline(inline), Value::Block(empty)] = outer.items());
        check!(inline.len() == 2);
        check!(empty.is_empty());
        check!(!block.is_dynamic());
    }

    #[test]
    fn unbalanced_brackets_are_syntax_errors() {
        for source in ["[1 2", "1 ]", "[1)", "(]"] {
            let mut world = World::default();
            let_assert!(Err(err) = read(&mut world, source));
            check!(err.kind() == ErrorKind::Syntax, "{source}");
        }
    }

    #[test]
    fn stray_characters_are_syntax_errors() {
        let mut world = World::default();
        let_assert!(Err(err) = read(&mut world, "x : 3"));
        check!(err.kind() == ErrorKind::Syntax);
        check!(err.to_string().contains("2..3"));
    }
}
