//! Representation of block-language values
use core::fmt;
use std::{
    cell::{OnceCell, RefCell},
    hash::{Hash, Hasher},
    rc::Rc,
    sync::atomic::{AtomicUsize, Ordering},
};

use indexmap::IndexMap;
use lasso::{Rodeo, Spur};
use rustc_hash::FxHasher;

use crate::{compiler::bytecode::Translation, num::Rational, runtime::builtins::Builtin};

pub type Integer = i64;

/// Dictionaries are shared and mutated in place
pub type Dictionary = Rc<RefCell<IndexMap<Rc<str>, Value>>>;

/// Operator-like symbols the reader recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymbolKind {
    Plus,
    Minus,
    Asterisk,
    Slash,
    DoubleSlash,
    Percent,
    Caret,
    Equal,
    LessGreater,
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    DotDot,
    DoublePlus,
    Arrow,
    ThickArrow,
    DoubleColon,
    Pipe,
    Ampersand,
    At,
    Sharp,
    Dollar,
    EmptySet,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Asterisk => "*",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Percent => "%",
            Self::Caret => "^",
            Self::Equal => "=",
            Self::LessGreater => "<>",
            Self::Less => "<",
            Self::Greater => ">",
            Self::LessEqual => "<=",
            Self::GreaterEqual => ">=",
            Self::DotDot => "..",
            Self::DoublePlus => "++",
            Self::Arrow => "->",
            Self::ThickArrow => "=>",
            Self::DoubleColon => "::",
            Self::Pipe => "|",
            Self::Ampersand => "&",
            Self::At => "@",
            Self::Sharp => "#",
            Self::Dollar => "$",
            Self::EmptySet => "ø",
        }
    }
}

/// A sequence of values. Blocks built while running a program are marked
/// dynamic and never enter the translation cache.
#[derive(Debug, Clone)]
pub struct Block {
    items: Rc<[Value]>,
    dynamic: bool,
}

impl Block {
    pub fn new(items: impl Into<Rc<[Value]>>) -> Self {
        Self {
            items: items.into(),
            dynamic: false,
        }
    }

    pub fn dynamic(items: impl Into<Rc<[Value]>>) -> Self {
        Self {
            items: items.into(),
            dynamic: true,
        }
    }

    pub fn items(&self) -> &[Value] {
        &self.items
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl Eq for Block {}

impl Hash for Block {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.items.hash(state)
    }
}

// Type that stores all possible values!
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Logical(bool),
    Integer(Integer),
    Floating(f64),
    Rational(Rational),
    String(Rc<str>),
    Word(Spur),
    /// `'name`
    Literal(Spur),
    /// `name:`
    Label(Spur),
    /// `.name`
    Attribute(Spur),
    /// `.name:`
    AttributeLabel(Spur),
    Symbol(SymbolKind),
    /// `a\b\1`
    Path(Rc<[Value]>),
    /// `a\b\1:`
    PathLabel(Rc<[Value]>),
    Block(Block),
    /// `( ... )`
    Inline(Block),
    Dictionary(Dictionary),
    Function(Rc<Function>),
    /// A block that has already been compiled
    Bytecode(Rc<Translation>),
    /// Line marker left by the reader
    Newline(u32),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Self::String(Rc::from(s.as_ref()))
    }

    pub fn block(items: impl Into<Rc<[Value]>>) -> Self {
        Self::Block(Block::new(items))
    }

    pub fn dictionary(entries: IndexMap<Rc<str>, Value>) -> Self {
        Self::Dictionary(Rc::new(RefCell::new(entries)))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Logical(_) => "logical",
            Self::Integer(_) => "integer",
            Self::Floating(_) => "floating",
            Self::Rational(_) => "rational",
            Self::String(_) => "string",
            Self::Word(_) => "word",
            Self::Literal(_) => "literal",
            Self::Label(_) => "label",
            Self::Attribute(_) => "attribute",
            Self::AttributeLabel(_) => "attributeLabel",
            Self::Symbol(_) => "symbol",
            Self::Path(_) => "path",
            Self::PathLabel(_) => "pathLabel",
            Self::Block(_) => "block",
            Self::Inline(_) => "inline",
            Self::Dictionary(_) => "dictionary",
            Self::Function(_) => "function",
            Self::Bytecode(_) => "bytecode",
            Self::Newline(_) => "newline",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer(_) | Self::Floating(_) | Self::Rational(_)
        )
    }

    pub fn as_integer(&self) -> Option<Integer> {
        match self {
            Self::Integer(int) => Some(*int),
            _ => None,
        }
    }

    pub fn as_logical(&self) -> Option<bool> {
        match self {
            Self::Logical(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Self::Block(block) | Self::Inline(block) => Some(block),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&Rc<Function>> {
        match self {
            Self::Function(func) => Some(func),
            _ => None,
        }
    }

    /// The interned name behind words, literals, labels and attributes
    pub fn as_name(&self) -> Option<Spur> {
        match self {
            Self::Word(s)
            | Self::Literal(s)
            | Self::Label(s)
            | Self::Attribute(s)
            | Self::AttributeLabel(s) => Some(*s),
            _ => None,
        }
    }

    pub fn display<'a>(&'a self, rodeo: &'a Rodeo) -> ValueDisplay<'a> {
        ValueDisplay {
            value: self,
            rodeo,
            quoted: false,
        }
    }
}

// Constant-pool equality: kinds never mix, floats compare by bits and
// reference kinds compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Logical(a), Self::Logical(b)) => a == b,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Floating(a), Self::Floating(b)) => a.to_bits() == b.to_bits(),
            (Self::Rational(a), Self::Rational(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Word(a), Self::Word(b))
            | (Self::Literal(a), Self::Literal(b))
            | (Self::Label(a), Self::Label(b))
            | (Self::Attribute(a), Self::Attribute(b))
            | (Self::AttributeLabel(a), Self::AttributeLabel(b)) => a == b,
            (Self::Symbol(a), Self::Symbol(b)) => a == b,
            (Self::Path(a), Self::Path(b)) | (Self::PathLabel(a), Self::PathLabel(b)) => a == b,
            (Self::Block(a), Self::Block(b)) | (Self::Inline(a), Self::Inline(b)) => a == b,
            (Self::Dictionary(a), Self::Dictionary(b)) => Rc::ptr_eq(a, b),
            (Self::Function(a), Self::Function(b)) => a.id == b.id,
            (Self::Bytecode(a), Self::Bytecode(b)) => Rc::ptr_eq(a, b),
            (Self::Newline(a), Self::Newline(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        core::mem::discriminant(self).hash(state);
        match self {
            Self::Null => {}
            Self::Logical(b) => b.hash(state),
            Self::Integer(i) => i.hash(state),
            Self::Floating(f) => f.to_bits().hash(state),
            Self::Rational(r) => r.hash(state),
            Self::String(s) => s.hash(state),
            Self::Word(s)
            | Self::Literal(s)
            | Self::Label(s)
            | Self::Attribute(s)
            | Self::AttributeLabel(s) => s.hash(state),
            Self::Symbol(k) => k.hash(state),
            Self::Path(p) | Self::PathLabel(p) => p.hash(state),
            Self::Block(b) | Self::Inline(b) => b.hash(state),
            Self::Dictionary(d) => Rc::as_ptr(d).hash(state),
            Self::Function(f) => f.id.hash(state),
            Self::Bytecode(t) => Rc::as_ptr(t).hash(state),
            Self::Newline(l) => l.hash(state),
        }
    }
}

/// Hash of a sequence of values, used to key the translation cache.
/// Dictionaries count by identity, as they do in the constant pool.
pub fn fingerprint<'a>(values: impl IntoIterator<Item = &'a Value>) -> u64 {
    let mut hasher = FxHasher::default();
    let mut count = 0usize;
    for value in values {
        value.hash(&mut hasher);
        count += 1;
    }
    count.hash(&mut hasher);
    hasher.finish()
}

/// Nesting past which dictionaries fall back to identity, so that a
/// dictionary holding itself still hashes
const CONTENT_DEPTH: usize = 16;

fn hash_contents<H: Hasher>(value: &Value, state: &mut H, depth: usize) {
    if depth > CONTENT_DEPTH {
        return value.hash(state);
    }
    match value {
        Value::Dictionary(d) => {
            core::mem::discriminant(value).hash(state);
            let entries = d.borrow();
            entries.len().hash(state);
            for (key, entry) in entries.iter() {
                key.hash(state);
                hash_contents(entry, state, depth + 1);
            }
        }
        Value::Block(b) | Value::Inline(b) => {
            core::mem::discriminant(value).hash(state);
            b.items().len().hash(state);
            for item in b.items() {
                hash_contents(item, state, depth + 1);
            }
        }
        Value::Path(p) | Value::PathLabel(p) => {
            core::mem::discriminant(value).hash(state);
            p.len().hash(state);
            for segment in p.iter() {
                hash_contents(segment, state, depth + 1);
            }
        }
        other => other.hash(state),
    }
}

/// Hash of a call's arguments for the memo table. Unlike [`fingerprint`],
/// dictionaries are hashed by their current entries, so mutating one
/// changes the key.
pub fn argument_fingerprint(values: &[Value]) -> u64 {
    let mut hasher = FxHasher::default();
    for value in values {
        hash_contents(value, &mut hasher, 0);
    }
    values.len().hash(&mut hasher);
    hasher.finish()
}

pub struct ValueDisplay<'a> {
    value: &'a Value,
    rodeo: &'a Rodeo,
    quoted: bool,
}

impl<'a> ValueDisplay<'a> {
    fn nested(&self, value: &'a Value) -> Self {
        Self {
            value,
            rodeo: self.rodeo,
            quoted: true,
        }
    }

    fn sequence(&self, f: &mut fmt::Formatter<'_>, items: &'a [Value]) -> fmt::Result {
        let mut first = true;
        for item in items.iter().filter(|v| !matches!(v, Value::Newline(_))) {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}", self.nested(item))?;
        }
        Ok(())
    }

    fn path(&self, f: &mut fmt::Formatter<'_>, segments: &'a [Value]) -> fmt::Result {
        for (i, segment) in segments.iter().enumerate() {
            if i > 0 {
                write!(f, "\\")?;
            }
            write!(f, "{}", self.nested(segment))?;
        }
        Ok(())
    }
}

impl fmt::Display for ValueDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |s: &Spur| self.rodeo.resolve(s);
        match self.value {
            Value::Null => write!(f, "null"),
            Value::Logical(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Floating(x) if x.is_finite() && x.fract() == 0.0 => write!(f, "{x:.1}"),
            Value::Floating(x) => write!(f, "{x}"),
            Value::Rational(r) => write!(f, "{r}"),
            Value::String(s) if self.quoted => write!(f, "{s:?}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Word(s) => write!(f, "{}", name(s)),
            Value::Literal(s) => write!(f, "'{}", name(s)),
            Value::Label(s) => write!(f, "{}:", name(s)),
            Value::Attribute(s) => write!(f, ".{}", name(s)),
            Value::AttributeLabel(s) => write!(f, ".{}:", name(s)),
            Value::Symbol(k) => write!(f, "{}", k.as_str()),
            Value::Path(p) => self.path(f, p),
            Value::PathLabel(p) => {
                self.path(f, p)?;
                write!(f, ":")
            }
            Value::Block(b) => {
                write!(f, "[")?;
                self.sequence(f, b.items())?;
                write!(f, "]")
            }
            Value::Inline(b) => {
                write!(f, "(")?;
                self.sequence(f, b.items())?;
                write!(f, ")")
            }
            Value::Dictionary(d) => {
                write!(f, "#[")?;
                for (i, (key, value)) in d.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{key}: {}", self.nested(value))?;
                }
                write!(f, "]")
            }
            Value::Function(func) => match &func.kind {
                FunctionKind::Builtin(builtin) => write!(f, "<builtin {}>", builtin.name),
                FunctionKind::User(_) => write!(f, "<function/{}>", func.arity),
            },
            Value::Bytecode(_) => write!(f, "<bytecode>"),
            Value::Newline(_) => Ok(()),
        }
    }
}

static NEXT_FUNCTION_ID: AtomicUsize = AtomicUsize::new(0);

/// Something callable, either a builtin or a user-defined function
#[derive(Debug)]
pub struct Function {
    id: usize,
    pub arity: usize,
    pub kind: FunctionKind,
}

#[derive(Debug)]
pub enum FunctionKind {
    Builtin(&'static Builtin),
    User(UserFunction),
}

impl Function {
    pub fn builtin(builtin: &'static Builtin) -> Self {
        Self {
            id: NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed),
            arity: builtin.arity,
            kind: FunctionKind::Builtin(builtin),
        }
    }

    pub fn user(user: UserFunction) -> Self {
        Self {
            id: NEXT_FUNCTION_ID.fetch_add(1, Ordering::Relaxed),
            arity: user.params.len(),
            kind: FunctionKind::User(user),
        }
    }

    /// Process-unique identity, used by the memoizer
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn as_builtin(&self) -> Option<&'static Builtin> {
        match self.kind {
            FunctionKind::Builtin(builtin) => Some(builtin),
            FunctionKind::User(_) => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct UserFunction {
    pub params: Vec<Spur>,
    /// Body, either a [`Value::Block`] or a [`Value::Bytecode`]
    pub main: Value,
    /// Bindings captured when the function was created
    pub imports: Vec<(Spur, Value)>,
    pub exports: Vec<Spur>,
    pub exportable: bool,
    pub memoize: bool,
    compiled: OnceCell<Rc<Translation>>,
}

impl UserFunction {
    pub fn new(params: Vec<Spur>, main: Value) -> Self {
        let compiled = OnceCell::new();
        if let Value::Bytecode(translation) = &main {
            _ = compiled.set(translation.clone());
        }
        Self {
            params,
            main,
            compiled,
            ..Default::default()
        }
    }

    pub(crate) fn compiled(&self) -> Option<&Rc<Translation>> {
        self.compiled.get()
    }

    pub(crate) fn set_compiled(&self, translation: Rc<Translation>) -> Rc<Translation> {
        self.compiled.get_or_init(|| translation).clone()
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use lasso::Rodeo;

    use indexmap::IndexMap;

    use super::{argument_fingerprint, fingerprint, Block, Value};

    #[test]
    fn pool_equality_is_kind_exact() {
        check!(Value::Integer(1) != Value::Floating(1.0));
        check!(Value::Floating(0.5) == Value::Floating(0.5));
        check!(Value::string("a") == Value::string("a"));
        check!(Value::Block(Block::default()) == Value::Block(Block::dynamic(Vec::new())));
    }

    #[test]
    fn fingerprint_depends_on_order_and_length() {
        let a = [Value::Integer(1), Value::Integer(2)];
        let b = [Value::Integer(2), Value::Integer(1)];
        check!(fingerprint(&a) == fingerprint(&a.clone()));
        check!(fingerprint(&a) != fingerprint(&b));
        check!(fingerprint(&a[..1]) != fingerprint(&a));
    }

    #[test]
    fn argument_fingerprint_follows_dictionary_contents() {
        let dict = Value::dictionary(IndexMap::from([("a".into(), Value::Integer(1))]));
        let args = [dict.clone()];
        let before = argument_fingerprint(&args);
        let pooled = fingerprint(&args);

        let Value::Dictionary(entries) = &dict else {
            unreachable!()
        };
        entries.borrow_mut().insert("b".into(), Value::Integer(2));
        check!(argument_fingerprint(&args) != before);
        check!(fingerprint(&args) == pooled);

        // a dictionary holding itself still hashes
        entries.borrow_mut().insert("me".into(), dict.clone());
        check!(argument_fingerprint(&args) == argument_fingerprint(&args));
    }

    #[test]
    fn display_nested_values() {
        let mut rodeo = Rodeo::default();
        let x = rodeo.get_or_intern("x");
        let block = Value::block(vec![
            Value::Word(x),
            Value::string("hi"),
            Value::Floating(2.0),
            Value::block(vec![Value::Label(x), Value::Null]),
        ]);
        check!(block.display(&rodeo).to_string() == r#"[x "hi" 2.0 [x: null]]"#);
        check!(Value::string("hi").display(&rodeo).to_string() == "hi");
    }
}
