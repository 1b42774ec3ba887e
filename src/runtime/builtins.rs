//! The builtin operations known to every [`World`](crate::world::World)
//!
//! Builtins with an opcode are compiled straight into that opcode; the rest
//! are reached through a name lookup at run time. Arguments arrive on the
//! stack in source order (the first argument is the deepest).
use core::{cmp::Ordering, fmt};
use std::{collections::HashMap, io::Write as _, rc::Rc, sync::LazyLock};

use indexmap::IndexMap;
use lasso::Spur;
use tracing::debug;

use super::{
    interpreter::{Interpreter, Iteration},
    suggest, Error, Flow, RuntimeError,
};
use crate::{
    compiler::bytecode::OpCode,
    num::{self, Arith},
    reader,
    value::{Block, Function, SymbolKind, UserFunction, Value},
};

pub type Action = fn(&mut Interpreter) -> Result<Flow, Error>;

/// A named operation with a fixed arity
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize,
    pub op: Option<OpCode>,
    pub action: Action,
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    Prefix,
    /// also usable between its first and second operand
    Infix,
}

/// A symbol standing in for a named function
#[derive(Debug)]
pub struct Alias {
    pub name: &'static str,
    pub precedence: Precedence,
}

macro_rules! builtins {
    (@op) => { None };
    (@op $op:ident) => { Some(OpCode::$op) };
    ($($name:literal / $arity:literal $(=> $op:ident)? : $action:expr),* $(,)?) => {
        pub static BUILTINS: &[Builtin] = &[
            $(Builtin {
                name: $name,
                arity: $arity,
                op: builtins!(@op $($op)?),
                action: $action,
            }),*
        ];
    };
}

builtins! {
    // arithmetic
    "add" / 2 => Add: |i| arithmetic(i, Arith::Add),
    "sub" / 2 => Sub: |i| arithmetic(i, Arith::Sub),
    "mul" / 2 => Mul: |i| arithmetic(i, Arith::Mul),
    "div" / 2 => Div: |i| arithmetic(i, Arith::Div),
    "fdiv" / 2 => FDiv: |i| arithmetic(i, Arith::FDiv),
    "mod" / 2 => Mod: |i| arithmetic(i, Arith::Mod),
    "pow" / 2 => Pow: |i| arithmetic(i, Arith::Pow),
    "neg" / 1 => Neg: neg,
    // bitwise
    "band" / 2 => BAnd: |i| bitwise(i, "band", |a, b| Some(a & b)),
    "bor" / 2 => BOr: |i| bitwise(i, "bor", |a, b| Some(a | b)),
    "bxor" / 2 => BXor: |i| bitwise(i, "bxor", |a, b| Some(a ^ b)),
    "shl" / 2 => Shl: |i| bitwise(i, "shl", |a, b| a.checked_shl(u32::try_from(b).ok()?)),
    "shr" / 2 => Shr: |i| bitwise(i, "shr", |a, b| a.checked_shr(u32::try_from(b).ok()?)),
    "bnot" / 1 => BNot: bnot,
    // logic
    "not?" / 1 => Not: not,
    "and?" / 2 => And: |i| logic(i, "and?", |a, b| a && b),
    "or?" / 2 => Or: |i| logic(i, "or?", |a, b| a || b),
    // comparison
    "equal?" / 2 => Eq: |i| equality(i, true),
    "notEqual?" / 2 => Ne: |i| equality(i, false),
    "greater?" / 2 => Gt: |i| ordering(i, "greater?", Ordering::is_gt),
    "greaterOrEqual?" / 2 => Ge: |i| ordering(i, "greaterOrEqual?", Ordering::is_ge),
    "less?" / 2 => Lt: |i| ordering(i, "less?", Ordering::is_lt),
    "lessOrEqual?" / 2 => Le: |i| ordering(i, "lessOrEqual?", Ordering::is_le),
    // branching
    "if" / 2 => If: if_,
    "if?" / 2 => IfE: if_else,
    "else" / 1 => Else: else_,
    "unless" / 2 => Unless: unless,
    "switch" / 3 => Switch: switch,
    "while" / 2 => While: while_,
    "return" / 1 => Return: |_| Ok(Flow::Return),
    "break" / 0 => Break: |_| Ok(Flow::Break),
    "continue" / 0 => Continue: |_| Ok(Flow::Continue),
    "do" / 1: do_,
    "try" / 1: |i| attempt(i, false),
    "try?" / 1: |i| attempt(i, true),
    "ensure" / 1: ensure,
    "panic" / 1: panic,
    // getters/setters & converters
    "get" / 2 => Get: get,
    "set" / 3 => Set: set,
    "to" / 2 => To: to,
    "string" / 1 => ToS: to_string,
    "integer" / 1 => ToI: to_integer,
    // generators
    "array" / 1 => Array: array,
    "dictionary" / 1 => Dict: dictionary,
    "function" / 2 => Func: function,
    // ranges & iterators
    "range" / 2 => Range: range,
    "loop" / 3 => Loop: |i| each(i, Each::Loop),
    "map" / 3 => Map: |i| each(i, Each::Map),
    "select" / 3 => Select: |i| each(i, Each::Select),
    // collections
    "size" / 1 => Size: size,
    "replace" / 3 => Replace: replace,
    "split" / 1 => Split: split,
    "join" / 1 => Join: join,
    "reverse" / 1 => Reverse: reverse,
    "append" / 2: append,
    "inc" / 1 => Inc: |i| step(i, Arith::Add),
    "dec" / 1 => Dec: |i| step(i, Arith::Sub),
    // I/O
    "print" / 1 => Print: print,
}

pub static ALIASES: &[(SymbolKind, Alias)] = &[
    (SymbolKind::Plus, infix("add")),
    (SymbolKind::Minus, infix("sub")),
    (SymbolKind::Asterisk, infix("mul")),
    (SymbolKind::Slash, infix("div")),
    (SymbolKind::DoubleSlash, infix("fdiv")),
    (SymbolKind::Percent, infix("mod")),
    (SymbolKind::Caret, infix("pow")),
    (SymbolKind::Equal, infix("equal?")),
    (SymbolKind::LessGreater, infix("notEqual?")),
    (SymbolKind::Less, infix("less?")),
    (SymbolKind::Greater, infix("greater?")),
    (SymbolKind::LessEqual, infix("lessOrEqual?")),
    (SymbolKind::GreaterEqual, infix("greaterOrEqual?")),
    (SymbolKind::DotDot, infix("range")),
    (SymbolKind::DoublePlus, infix("append")),
    (SymbolKind::At, prefix("array")),
    (SymbolKind::Sharp, prefix("dictionary")),
    (SymbolKind::Dollar, prefix("function")),
    (SymbolKind::EmptySet, prefix("null")),
];

const fn infix(name: &'static str) -> Alias {
    Alias {
        name,
        precedence: Precedence::Infix,
    }
}

const fn prefix(name: &'static str) -> Alias {
    Alias {
        name,
        precedence: Precedence::Prefix,
    }
}

static BY_OP: LazyLock<HashMap<OpCode, &'static Builtin>> = LazyLock::new(|| {
    BUILTINS
        .iter()
        .filter_map(|builtin| Some((builtin.op?, builtin)))
        .collect()
});

static BY_NAME: LazyLock<HashMap<&'static str, &'static Builtin>> =
    LazyLock::new(|| BUILTINS.iter().map(|builtin| (builtin.name, builtin)).collect());

/// The builtin an opcode delegates to
pub fn for_op(op: OpCode) -> Option<&'static Builtin> {
    BY_OP.get(&op).copied()
}

pub fn by_name(name: &str) -> Option<&'static Builtin> {
    BY_NAME.get(name).copied()
}

fn wrong_type(function: &str, expected: &'static str, found: &Value) -> Error {
    RuntimeError::WrongType {
        function: function.into(),
        expected,
        found: found.kind_name(),
    }
    .into()
}

fn other(message: impl AsRef<str>) -> Error {
    RuntimeError::Other(Box::from(message.as_ref())).into()
}

fn push(interp: &mut Interpreter, value: Value) -> Result<Flow, Error> {
    interp.push(value);
    Ok(Flow::Done)
}

fn logical(function: &str, value: &Value) -> Result<bool, Error> {
    value
        .as_logical()
        .ok_or_else(|| wrong_type(function, "a logical", value))
}

fn integer(function: &str, value: &Value) -> Result<i64, Error> {
    value
        .as_integer()
        .ok_or_else(|| wrong_type(function, "an integer", value))
}

fn arithmetic(interp: &mut Interpreter, op: Arith) -> Result<Flow, Error> {
    let [a, b] = interp.args()?;
    let value = num::arith(op, &a, &b)?;
    push(interp, value)
}

fn step(interp: &mut Interpreter, op: Arith) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let value = num::arith(op, &value, &Value::Integer(1))?;
    push(interp, value)
}

fn neg(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let value = num::negate(&value)?;
    push(interp, value)
}

fn bitwise(
    interp: &mut Interpreter,
    name: &str,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<Flow, Error> {
    let [a, b] = interp.args()?;
    let value = op(integer(name, &a)?, integer(name, &b)?)
        .ok_or_else(|| RuntimeError::Overflow(name.into()))?;
    push(interp, Value::Integer(value))
}

fn bnot(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let value = integer("bnot", &value)?;
    push(interp, Value::Integer(!value))
}

fn not(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let value = logical("not?", &value)?;
    push(interp, Value::Logical(!value))
}

fn logic(interp: &mut Interpreter, name: &str, op: fn(bool, bool) -> bool) -> Result<Flow, Error> {
    let [a, b] = interp.args()?;
    let value = op(logical(name, &a)?, logical(name, &b)?);
    push(interp, Value::Logical(value))
}

fn equality(interp: &mut Interpreter, expected: bool) -> Result<Flow, Error> {
    let [a, b] = interp.args()?;
    push(interp, Value::Logical(num::equals(&a, &b) == expected))
}

fn ordering(
    interp: &mut Interpreter,
    name: &str,
    accept: fn(Ordering) -> bool,
) -> Result<Flow, Error> {
    let [a, b] = interp.args()?;
    let ordering =
        num::compare(&a, &b).ok_or_else(|| wrong_type(name, "comparable values", &b))?;
    push(interp, Value::Logical(accept(ordering)))
}

fn if_(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition, body] = interp.args()?;
    if logical("if", &condition)? {
        return interp.exec_unscoped(&body);
    }
    Ok(Flow::Done)
}

// leaves the condition behind for a following `else`
fn if_else(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition, body] = interp.args()?;
    let condition = logical("if?", &condition)?;
    if condition {
        let flow = interp.exec_unscoped(&body)?;
        if flow != Flow::Done {
            return Ok(flow);
        }
    }
    push(interp, Value::Logical(condition))
}

fn else_(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition, body] = interp.args()?;
    if !logical("else", &condition)? {
        return interp.exec_unscoped(&body);
    }
    Ok(Flow::Done)
}

fn unless(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition, body] = interp.args()?;
    if !logical("unless", &condition)? {
        return interp.exec_unscoped(&body);
    }
    Ok(Flow::Done)
}

fn switch(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition, yes, no] = interp.args()?;
    let chosen = if logical("switch", &condition)? { yes } else { no };
    match chosen {
        Value::Block(_) => interp.exec_unscoped(&chosen),
        value => push(interp, value),
    }
}

fn while_(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition, body] = interp.args()?;
    loop {
        if !condition.is_null() {
            let flow = interp.exec_unscoped(&condition)?;
            if flow != Flow::Done {
                return Ok(flow);
            }
            let result = interp.pop()?;
            if !logical("while", &result)? {
                return Ok(Flow::Done);
            }
        }
        match interp.iteration(&body)? {
            Iteration::Value(_) | Iteration::Skipped => {}
            Iteration::Stop(flow) => return Ok(flow),
        }
    }
}

fn do_(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [body] = interp.args()?;
    match body {
        Value::String(source) => {
            let block = reader::read(interp.world_mut(), &source)?;
            interp.exec_unscoped(&Value::Block(block))
        }
        body => interp.exec_unscoped(&body),
    }
}

fn attempt(interp: &mut Interpreter, report: bool) -> Result<Flow, Error> {
    let [body] = interp.args()?;
    let base = interp.stack().len();
    interp.try_depth += 1;
    let result = interp.exec_unscoped(&body);
    interp.try_depth -= 1;
    let (succeeded, flow) = match result {
        Ok(flow) => (true, flow),
        Err(err) => {
            debug!(%err, "error recovered by try");
            interp.truncate(base);
            (false, Flow::Done)
        }
    };
    if report && flow == Flow::Done {
        interp.push(Value::Logical(succeeded));
    }
    Ok(flow)
}

fn ensure(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [condition] = interp.args()?;
    let holds = match &condition {
        Value::Block(_) => {
            let flow = interp.exec_unscoped(&condition)?;
            if flow != Flow::Done {
                return Ok(flow);
            }
            interp.pop()?
        }
        value => value.clone(),
    };
    if logical("ensure", &holds)? {
        Ok(Flow::Done)
    } else {
        let shown = condition.display(interp.world().rodeo()).to_string();
        Err(Error::Assertion(shown.into()))
    }
}

fn panic(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [message] = interp.args()?;
    let message = message.display(interp.world().rodeo()).to_string();
    Err(Error::Program(message.into()))
}

/// Dictionary key for a word, literal, label, string or integer
fn key_name(interp: &Interpreter, function: &str, key: &Value) -> Result<Rc<str>, Error> {
    match key {
        Value::String(s) => Ok(s.clone()),
        Value::Integer(i) => Ok(Rc::from(i.to_string())),
        key => match key.as_name() {
            Some(name) => Ok(Rc::from(interp.world().resolve(name))),
            None => Err(wrong_type(function, "a key", key)),
        },
    }
}

fn out_of_range(index: i64, size: usize) -> Error {
    other(format!("index {index} out of range for size {size}"))
}

fn get(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [collection, key] = interp.args()?;
    let value = match (&collection, &key) {
        (Value::Block(block), Value::Integer(index)) => usize::try_from(*index)
            .ok()
            .and_then(|at| block.items().get(at))
            .cloned()
            .ok_or_else(|| out_of_range(*index, block.len()))?,
        (Value::String(s), Value::Integer(index)) => usize::try_from(*index)
            .ok()
            .and_then(|at| s.chars().nth(at))
            .map(|c| Value::string(c.to_string()))
            .ok_or_else(|| out_of_range(*index, s.chars().count()))?,
        (Value::Dictionary(dict), key) => {
            let name = key_name(interp, "get", key)?;
            let entries = dict.borrow();
            match entries.get(&name) {
                Some(value) => value.clone(),
                None => Err(RuntimeError::MissingKey {
                    key: name.as_ref().into(),
                    suggestions: suggest(&name, entries.keys().map(|key| key.as_ref())),
                })?,
            }
        }
        (collection, _) => {
            return Err(wrong_type(
                "get",
                "a block, dictionary or string",
                collection,
            ))
        }
    };
    push(interp, value)
}

fn set(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [collection, key, value] = interp.args()?;
    let Value::Dictionary(dict) = &collection else {
        return Err(wrong_type("set", "a dictionary", &collection));
    };
    let name = key_name(interp, "set", &key)?;
    dict.borrow_mut().insert(name, value);
    Ok(Flow::Done)
}

fn to(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [target, value] = interp.args()?;
    let target = match &target {
        Value::String(s) => s.to_string(),
        target => match target.as_name() {
            Some(name) => interp.world().resolve(name).to_owned(),
            None => return Err(wrong_type("to", "a type name", target)),
        },
    };
    let converted = match target.as_str() {
        "string" => stringify(interp, &value),
        "integer" => integral(&value)?,
        "floating" => match &value {
            Value::Integer(i) => Value::Floating(*i as f64),
            Value::Rational(r) => Value::Floating(r.inexact()),
            Value::Floating(_) => value,
            Value::String(s) => s
                .trim()
                .parse()
                .map(Value::Floating)
                .map_err(|_| other(format!("cannot convert {s:?} to floating")))?,
            value => return Err(wrong_type("to", "a number or string", value)),
        },
        "logical" => match &value {
            Value::Logical(_) => value,
            Value::Integer(i) => Value::Logical(*i != 0),
            Value::String(s) if s.as_ref() == "true" => Value::Logical(true),
            Value::String(s) if s.as_ref() == "false" => Value::Logical(false),
            value => return Err(wrong_type("to", "a logical, integer or string", value)),
        },
        "block" => match value {
            Value::Block(_) => value,
            Value::String(s) => Value::Block(reader::read(interp.world_mut(), &s)?),
            value => Value::Block(Block::dynamic(vec![value])),
        },
        other_type => return Err(other(format!("cannot convert to {other_type}"))),
    };
    push(interp, converted)
}

fn stringify(interp: &Interpreter, value: &Value) -> Value {
    match value {
        Value::String(_) => value.clone(),
        value => Value::string(value.display(interp.world().rodeo()).to_string()),
    }
}

fn integral(value: &Value) -> Result<Value, Error> {
    Ok(Value::Integer(match value {
        Value::Integer(i) => *i,
        Value::Floating(f) if f.is_finite() => *f as i64,
        Value::Rational(r) => r.numer() / r.denom(),
        Value::Logical(b) => i64::from(*b),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| other(format!("cannot convert {s:?} to integer")))?,
        value => return Err(wrong_type("integer", "a number, logical or string", value)),
    }))
}

fn to_string(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let value = stringify(interp, &value);
    push(interp, value)
}

fn to_integer(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let value = integral(&value)?;
    push(interp, value)
}

fn array(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [body] = interp.args()?;
    let items = match body {
        Value::Block(_) | Value::Inline(_) => {
            let base = interp.stack().len();
            let flow = interp.exec_unscoped(&body)?;
            if flow != Flow::Done {
                return Ok(flow);
            }
            interp.split_off(base)
        }
        value => vec![value],
    };
    push(interp, Value::Block(Block::dynamic(items)))
}

// Runs the block and collects its labels, in order, without letting them leak
fn dictionary(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [body] = interp.args()?;
    let Some(block) = body.as_block() else {
        return Err(wrong_type("dictionary", "a block", &body));
    };
    let mut labels = vec![];
    for item in block.items() {
        if let Value::Label(name) = item {
            if !labels.contains(name) {
                labels.push(*name);
            }
        }
    }

    let base = interp.stack().len();
    let flow = interp.exec_leak_protected(&labels, |interp| {
        let flow = interp.exec_unscoped(&body)?;
        let entries = labels
            .iter()
            .filter_map(|name| {
                let value = interp.world().get(*name)?.clone();
                Some((Rc::from(interp.world().resolve(*name)), value))
            })
            .collect::<IndexMap<_, _>>();
        Ok((flow, entries))
    })?;
    interp.truncate(base);
    match flow {
        (Flow::Done, entries) => push(interp, Value::dictionary(entries)),
        (flow, _) => Ok(flow),
    }
}

/// Parameter names given as a block of words, or a single word
fn names(function: &str, params: &Value) -> Result<Vec<Spur>, Error> {
    match params {
        Value::Block(block) => block
            .items()
            .iter()
            .filter(|item| !matches!(item, Value::Newline(_)))
            .map(|item| match item {
                Value::Word(name) | Value::Literal(name) => Ok(*name),
                item => Err(wrong_type(function, "a word", item)),
            })
            .collect(),
        Value::Word(name) | Value::Literal(name) => Ok(vec![*name]),
        Value::Null => Ok(vec![]),
        params => Err(wrong_type(function, "a block of words", params)),
    }
}

fn flag(interp: &Interpreter, name: &str) -> bool {
    interp
        .attr(name)
        .is_some_and(|value| value.as_logical().unwrap_or(true))
}

fn function(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [params, body] = interp.args()?;
    let params = names("function", &params)?;
    if !matches!(body, Value::Block(_) | Value::Bytecode(_)) {
        return Err(wrong_type("function", "a block", &body));
    }

    let mut user = UserFunction::new(params, body);
    user.memoize = flag(interp, "memoize");
    user.exportable = flag(interp, "exportable");
    if let Some(exports) = interp.attr("export") {
        user.exports = names("function", exports)?;
    }
    if let Some(imports) = interp.attr("import") {
        for name in names("function", imports)? {
            if let Some(value) = interp.world().get(name) {
                user.imports.push((name, value.clone()));
            }
        }
    }
    push(interp, Value::Function(Rc::new(Function::user(user))))
}

fn range(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [from, to] = interp.args()?;
    let (from, to) = (integer("range", &from)?, integer("range", &to)?);
    let items: Vec<_> = if from <= to {
        (from..=to).map(Value::Integer).collect()
    } else {
        (to..=from).rev().map(Value::Integer).collect()
    };
    push(interp, Value::Block(Block::dynamic(items)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Each {
    Loop,
    Map,
    Select,
}

fn iterable(function: &str, collection: &Value) -> Result<Vec<Value>, Error> {
    Ok(match collection {
        Value::Block(block) => block
            .items()
            .iter()
            .filter(|item| !matches!(item, Value::Newline(_)))
            .cloned()
            .collect(),
        Value::Integer(n) => (1..=*n).map(Value::Integer).collect(),
        Value::String(s) => s.chars().map(|c| Value::string(c.to_string())).collect(),
        Value::Dictionary(dict) => dict
            .borrow()
            .iter()
            .flat_map(|(key, value)| [Value::String(key.clone()), value.clone()])
            .collect(),
        collection => return Err(wrong_type(function, "an iterable", collection)),
    })
}

fn each(interp: &mut Interpreter, kind: Each) -> Result<Flow, Error> {
    let name = match kind {
        Each::Loop => "loop",
        Each::Map => "map",
        Each::Select => "select",
    };
    let [collection, params, body] = interp.args()?;
    let params = names(name, &params)?;
    let items = iterable(name, &collection)?;

    let mut collected = vec![];
    let flow = interp.exec_leak_protected(&params, |interp| {
        for chunk in items.chunks(params.len().max(1)) {
            for (param, item) in params.iter().zip(chunk) {
                interp.world_mut().set(*param, item.clone());
            }
            match (interp.iteration(&body)?, kind) {
                (Iteration::Stop(flow), _) => return Ok(flow),
                (Iteration::Skipped, _) | (Iteration::Value(_), Each::Loop) => {}
                (Iteration::Value(value), Each::Map) => collected.extend(value),
                (Iteration::Value(value), Each::Select) => {
                    let keep = value.unwrap_or_default();
                    if logical(name, &keep)? {
                        collected.extend_from_slice(chunk);
                    }
                }
            }
        }
        Ok(Flow::Done)
    })?;

    if flow == Flow::Return || kind == Each::Loop {
        return Ok(flow);
    }
    push(interp, Value::Block(Block::dynamic(collected)))
}

fn size(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [collection] = interp.args()?;
    let size = match &collection {
        Value::Block(block) => block.len(),
        Value::String(s) => s.chars().count(),
        Value::Dictionary(dict) => dict.borrow().len(),
        collection => return Err(wrong_type("size", "a collection", collection)),
    };
    push(interp, Value::Integer(size as i64))
}

fn replace(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [haystack, from, to] = interp.args()?;
    let value = match (&haystack, &from, &to) {
        (Value::String(s), Value::String(from), Value::String(to)) => {
            Value::string(s.replace(from.as_ref(), to))
        }
        (Value::Block(block), from, to) => Value::Block(Block::dynamic(
            block
                .items()
                .iter()
                .map(|item| if num::equals(item, from) { to.clone() } else { item.clone() })
                .collect::<Vec<_>>(),
        )),
        (haystack, _, _) => return Err(wrong_type("replace", "a string or block", haystack)),
    };
    push(interp, value)
}

fn split(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let Value::String(s) = &value else {
        return Err(wrong_type("split", "a string", &value));
    };
    let chars = s.chars().map(|c| Value::string(c.to_string())).collect::<Vec<_>>();
    push(interp, Value::Block(Block::dynamic(chars)))
}

fn join(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let Value::Block(block) = &value else {
        return Err(wrong_type("join", "a block", &value));
    };
    let mut joined = String::new();
    for item in block.items() {
        joined.push_str(&item.display(interp.world().rodeo()).to_string());
    }
    push(interp, Value::string(joined))
}

fn reverse(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let reversed = match &value {
        Value::Block(block) => {
            Value::Block(Block::dynamic(block.items().iter().rev().cloned().collect::<Vec<_>>()))
        }
        Value::String(s) => Value::string(s.chars().rev().collect::<String>()),
        value => return Err(wrong_type("reverse", "a block or string", value)),
    };
    push(interp, reversed)
}

fn append(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [a, b] = interp.args()?;
    let value = match (&a, &b) {
        (Value::String(x), Value::String(y)) => Value::string(format!("{x}{y}")),
        (Value::String(x), y) => {
            Value::string(format!("{x}{}", y.display(interp.world().rodeo())))
        }
        (Value::Block(x), Value::Block(y)) => Value::Block(Block::dynamic(
            x.items().iter().chain(y.items()).cloned().collect::<Vec<_>>(),
        )),
        (Value::Block(x), y) => Value::Block(Block::dynamic(
            x.items().iter().cloned().chain([y.clone()]).collect::<Vec<_>>(),
        )),
        (a, _) => return Err(wrong_type("append", "a string or block", a)),
    };
    push(interp, value)
}

fn print(interp: &mut Interpreter) -> Result<Flow, Error> {
    let [value] = interp.args()?;
    let (world, out) = interp.world_and_output();
    writeln!(out, "{}", value.display(world.rodeo()))
        .map_err(|err| RuntimeError::Other(err.to_string().into()))?;
    Ok(Flow::Done)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use assert2::{check, let_assert};

    use super::{by_name, for_op, ALIASES, BUILTINS};
    use crate::compiler::bytecode::OpCode;

    #[test]
    fn names_and_opcodes_are_unique() {
        let names = BUILTINS.iter().map(|b| b.name).collect::<HashSet<_>>();
        check!(names.len() == BUILTINS.len());
        let ops = BUILTINS.iter().filter_map(|b| b.op).collect::<HashSet<_>>();
        check!(ops.len() == BUILTINS.iter().filter(|b| b.op.is_some()).count());
    }

    #[test]
    fn every_operator_opcode_has_a_builtin() {
        for byte in OpCode::Add as u8..=OpCode::Print as u8 {
            let_assert!(Some(op) = OpCode::from_u8(byte));
            check!(for_op(op).is_some(), "{op:?}");
        }
        check!(for_op(OpCode::Dup).is_none());
    }

    #[test]
    fn aliases_point_at_builtins() {
        for (symbol, alias) in ALIASES {
            check!(alias.name == "null" || by_name(alias.name).is_some(), "{symbol:?}");
        }
        let_assert!(Some(add) = by_name("add"));
        check!(add.arity == 2);
        check!(add.op == Some(OpCode::Add));
    }
}
