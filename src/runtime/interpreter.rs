//! The bytecode executor
//!
//! Every block runs under one of four disciplines, picked through
//! [`BlockOptions`]:
//!
//! - unscoped: bindings made by the block stay visible afterwards
//!   (top-level code, `if` bodies, loop bodies)
//! - leak-protected: a chosen set of names is put back the way it was,
//!   everything else stays (loop parameters, dictionary labels)
//! - function-scoped: the whole symbol table is restored, except for
//!   exported names, or except for the parameters of an exportable function
//! - memoized: function-scoped, with results cached by argument fingerprint
use std::{
    collections::HashMap,
    io::{self, Write},
    rc::Rc,
};

use lasso::Spur;
use tracing::{debug, instrument, trace};

use super::{builtins, Error, Flow, RuntimeError};
use crate::{
    compiler::{
        self,
        bytecode::{decode, Condition, Family, Instruction, OpCode, Translation},
    },
    reader,
    value::{argument_fingerprint, Block, Function, FunctionKind, UserFunction, Value},
    world::{Scope, World},
};

/// How a block runs relative to the bindings around it
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockOptions<'a> {
    /// parameters, bound from the top of the stack (last parameter on top)
    pub args: &'a [Spur],
    /// bindings installed before the parameters
    pub imports: &'a [(Spur, Value)],
    /// names that survive the restore of an isolated scope
    pub exports: &'a [Spur],
    /// run directly against the current bindings
    pub inplace: bool,
    /// a failing block still exports the way a returning one does
    pub in_try: bool,
    /// keep every binding except the parameters
    pub exportable: bool,
    /// absorb control signals and keep only the topmost result
    pub function_boundary: bool,
    /// memoize results under this function id
    pub memoize: Option<usize>,
}

/// Outcome of one pass through a loop body
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Iteration {
    /// the value the body left on top, if any
    Value(Option<Value>),
    Skipped,
    /// the loop has to end, handing this signal outwards
    Stop(Flow),
}

pub struct Interpreter {
    world: World,
    stack: Vec<Value>,
    /// attributes collected for the next call
    attrs: HashMap<Spur, Value>,
    out: Box<dyn Write>,
    depth: usize,
    pub(crate) try_depth: usize,
}

impl Interpreter {
    pub fn new(world: World) -> Self {
        Self::with_output(world, Box::new(io::stdout()))
    }

    /// An interpreter whose `print` goes to `out`
    pub fn with_output(world: World, out: Box<dyn Write>) -> Self {
        Self {
            world,
            stack: vec![],
            attrs: HashMap::new(),
            out,
            depth: 0,
            try_depth: 0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn into_world(self) -> World {
        self.world
    }

    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    pub fn clear_stack(&mut self) {
        self.stack.clear();
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<Value, Error> {
        self.stack
            .pop()
            .ok_or_else(|| RuntimeError::StackUnderflow.into())
    }

    fn peek(&self, depth: usize) -> Result<&Value, Error> {
        self.stack
            .len()
            .checked_sub(depth + 1)
            .and_then(|at| self.stack.get(at))
            .ok_or_else(|| RuntimeError::StackUnderflow.into())
    }

    /// Takes the top `N` values, first argument first
    pub fn args<const N: usize>(&mut self) -> Result<[Value; N], Error> {
        let base = self
            .stack
            .len()
            .checked_sub(N)
            .ok_or(RuntimeError::StackUnderflow)?;
        let mut drained = self.stack.drain(base..);
        Ok(std::array::from_fn(|_| drained.next().unwrap_or_default()))
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.stack.truncate(len);
    }

    pub(crate) fn split_off(&mut self, base: usize) -> Vec<Value> {
        self.stack.split_off(base.min(self.stack.len()))
    }

    pub(crate) fn world_and_output(&mut self) -> (&World, &mut dyn Write) {
        (&self.world, self.out.as_mut())
    }

    /// An attribute passed to the call being executed
    pub(crate) fn attr(&self, name: &str) -> Option<&Value> {
        self.attrs.get(&self.world.lookup(name)?)
    }

    /// Reads and runs `source` at the top level
    pub fn run_source(&mut self, source: &str) -> Result<(), Error> {
        let block = reader::read(&mut self.world, source)?;
        self.run(&block)
    }

    /// Runs `block` at the top level. Bindings persist; on failure the
    /// stack is cut back to where it was.
    pub fn run(&mut self, block: &Block) -> Result<(), Error> {
        let base = self.stack.len();
        let result = compiler::translate(&mut self.world, block)
            .and_then(|translation| self.execute(&translation));
        if result.is_err() {
            self.stack.truncate(base);
            self.attrs.clear();
        }
        result.map(drop)
    }

    /// Runs a block (or an already compiled body) against the current
    /// bindings
    pub fn exec_unscoped(&mut self, body: &Value) -> Result<Flow, Error> {
        self.exec_block(
            body,
            BlockOptions {
                inplace: true,
                ..Default::default()
            },
        )
    }

    /// Runs `run`, then puts `names` back the way they were, whether or not
    /// it succeeded
    pub fn exec_leak_protected<T>(
        &mut self,
        names: &[Spur],
        run: impl FnOnce(&mut Self) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let saved = self.world.snapshot(names);
        let result = run(self);
        self.world.restore_names(&saved, names);
        result
    }

    pub fn exec_block(&mut self, body: &Value, options: BlockOptions<'_>) -> Result<Flow, Error> {
        self.run_scoped(options, |this| this.translation(body))
    }

    /// One pass through a loop body: `break` and `continue` end here,
    /// `return` is handed back to the loop
    pub(crate) fn iteration(&mut self, body: &Value) -> Result<Iteration, Error> {
        let base = self.stack.len();
        Ok(match self.exec_unscoped(body)? {
            Flow::Return => Iteration::Stop(Flow::Return),
            Flow::Break => {
                self.stack.truncate(base);
                Iteration::Stop(Flow::Done)
            }
            Flow::Continue => {
                self.stack.truncate(base);
                Iteration::Skipped
            }
            Flow::Done => {
                let value = if self.stack.len() > base {
                    self.stack.pop()
                } else {
                    None
                };
                self.stack.truncate(base);
                Iteration::Value(value)
            }
        })
    }

    fn translation(&mut self, body: &Value) -> Result<Rc<Translation>, Error> {
        match body {
            Value::Block(block) | Value::Inline(block) => {
                compiler::translate(&mut self.world, block)
            }
            Value::Bytecode(translation) => Ok(translation.clone()),
            body => Err(RuntimeError::WrongType {
                function: "execute".into(),
                expected: "a block",
                found: body.kind_name(),
            }
            .into()),
        }
    }

    fn run_scoped(
        &mut self,
        options: BlockOptions<'_>,
        compile: impl FnOnce(&mut Self) -> Result<Rc<Translation>, Error>,
    ) -> Result<Flow, Error> {
        let Some(args_at) = self.stack.len().checked_sub(options.args.len()) else {
            return Err(RuntimeError::StackUnderflow.into());
        };

        let memo_key = options
            .memoize
            .map(|function| (function, argument_fingerprint(&self.stack[args_at..])));
        if let Some(key) = memo_key {
            if let Some(value) = self.world.memoizer.get(&key) {
                trace!(function = key.0, "memo hit");
                self.stack.truncate(args_at);
                self.stack.push(value);
                return Ok(Flow::Done);
            }
            trace!(function = key.0, "memo miss");
        }

        let max_depth = self.world.config().max_call_depth;
        if self.depth >= max_depth {
            return Err(RuntimeError::StackOverflow(max_depth).into());
        }

        let saved = (!options.inplace).then(|| self.world.save_scope());
        for (name, value) in options.imports {
            self.world.set(*name, value.clone());
        }
        for name in options.args.iter().rev() {
            let value = self.pop()?;
            self.world.set(*name, value);
        }

        let base = self.stack.len();
        self.depth += 1;
        let result = compile(self).and_then(|translation| self.execute(&translation));
        self.depth -= 1;

        let mut flow = match result {
            Ok(flow) => flow,
            Err(err) => {
                // a recovered call leaves its scope as a returning one would,
                // anything else drops every binding the call made
                if let Some(saved) = saved {
                    if options.in_try {
                        self.leave_scope(saved, &options);
                    } else {
                        self.world.restore_scope(saved);
                    }
                }
                return Err(err);
            }
        };

        if options.function_boundary {
            if self.stack.len() > base {
                let top = self.pop()?;
                self.stack.truncate(base);
                self.stack.push(top);
            }
            flow = Flow::Done;
        }

        if let Some(saved) = saved {
            self.leave_scope(saved, &options);
        }

        if let Some(key) = memo_key {
            if self.stack.len() > base {
                if let Some(result) = self.stack.last() {
                    self.world.memoizer.insert(key, result.clone());
                }
            }
        }
        Ok(flow)
    }

    fn leave_scope(&mut self, mut saved: Scope, options: &BlockOptions<'_>) {
        if options.exportable {
            self.world.restore_names(&saved, options.args);
        } else {
            self.world.export_into(&mut saved, options.exports);
            self.world.restore_scope(saved);
        }
    }

    /// Runs a user function whose arguments are on the stack
    pub fn exec_function(&mut self, func: &Function, user: &UserFunction) -> Result<Flow, Error> {
        let options = BlockOptions {
            args: &user.params,
            imports: &user.imports,
            exports: &user.exports,
            inplace: false,
            in_try: self.try_depth > 0,
            exportable: user.exportable,
            function_boundary: true,
            memoize: user.memoize.then(|| func.id()),
        };
        // the body is compiled with the parameters bound, so parameters
        // holding functions are built as calls
        self.run_scoped(options, |this| {
            if let Some(translation) = user.compiled() {
                return Ok(translation.clone());
            }
            let Value::Block(block) = &user.main else {
                return Err(RuntimeError::WrongType {
                    function: "function".into(),
                    expected: "a block",
                    found: user.main.kind_name(),
                }
                .into());
            };
            debug!(function = func.id(), arity = func.arity, "compiling function body");
            let translation = compiler::translate(&mut this.world, block)?;
            Ok(user.set_compiled(translation))
        })
    }

    pub fn call_function(&mut self, func: &Rc<Function>) -> Result<Flow, Error> {
        if self.stack.len() < func.arity {
            return Err(RuntimeError::WrongArity {
                function: describe(func),
                expected: func.arity,
                found: self.stack.len(),
            }
            .into());
        }
        match &func.kind {
            FunctionKind::Builtin(builtin) => {
                let flow = (builtin.action)(self);
                self.attrs.clear();
                flow
            }
            FunctionKind::User(user) => {
                self.attrs.clear();
                self.exec_function(func, user)
            }
        }
    }

    fn call_value(&mut self, target: &Value) -> Result<Flow, Error> {
        let func = match target {
            Value::Function(func) => func.clone(),
            Value::Word(name) => match self.world.get(*name) {
                Some(Value::Function(func)) => func.clone(),
                Some(_) => {
                    return Err(RuntimeError::NotCallable(self.world.resolve(*name).into()).into())
                }
                None => return Err(self.world.undefined(*name).into()),
            },
            target => return Err(RuntimeError::NotCallable(target.kind_name().into()).into()),
        };
        self.call_function(&func)
    }

    fn pop_logical(&mut self) -> Result<bool, Error> {
        let value = self.pop()?;
        value.as_logical().ok_or_else(|| {
            RuntimeError::WrongType {
                function: "jump".into(),
                expected: "a logical",
                found: value.kind_name(),
            }
            .into()
        })
    }

    #[instrument(level = "trace", skip_all, fields(depth = self.depth))]
    fn execute(&mut self, translation: &Translation) -> Result<Flow, Error> {
        let code = translation.instructions.as_slice();
        let mut ip = 0;
        loop {
            let at = ip;
            let flow = match decode(code, &mut ip)? {
                Instruction::Indexed(family, index) => {
                    let constant = translation
                        .constants
                        .get(usize::from(index))
                        .ok_or(RuntimeError::InvalidBytecode(at))?;
                    self.indexed(family, constant, at)?
                }
                Instruction::Jump(condition, target) => {
                    let taken = match condition {
                        Condition::Always => true,
                        Condition::IfTrue => self.pop_logical()?,
                        Condition::IfFalse => !self.pop_logical()?,
                    };
                    if taken {
                        ip = usize::from(target);
                    }
                    Flow::Done
                }
                Instruction::Op(OpCode::End) => return Ok(Flow::Done),
                Instruction::Op(op) => self.op(op, at)?,
            };
            if flow != Flow::Done {
                return Ok(flow);
            }
        }
    }

    fn indexed(&mut self, family: Family, constant: &Value, at: usize) -> Result<Flow, Error> {
        let name = || constant.as_name().ok_or(RuntimeError::InvalidBytecode(at));
        match family {
            Family::Push => self.stack.push(constant.clone()),
            Family::Store => {
                let value = self.pop()?;
                self.world.set(name()?, value);
            }
            Family::Storl => {
                let value = self.peek(0)?.clone();
                self.world.set(name()?, value);
            }
            Family::Load => {
                let name = name()?;
                let value = match self.world.get(name) {
                    Some(value) => value.clone(),
                    None => return Err(self.world.undefined(name).into()),
                };
                self.stack.push(value);
            }
            Family::Call => return self.call_value(constant),
            Family::Attr => {
                let value = self.pop()?;
                self.attrs.insert(name()?, value);
            }
        }
        Ok(Flow::Done)
    }

    fn op(&mut self, op: OpCode, at: usize) -> Result<Flow, Error> {
        if let Some(value) = op.immediate() {
            self.stack.push(value);
            return Ok(Flow::Done);
        }
        match op {
            OpCode::Nop => {}
            OpCode::Pop => _ = self.pop()?,
            OpCode::Dup => {
                let top = self.peek(0)?.clone();
                self.stack.push(top);
            }
            OpCode::Over => {
                let second = self.peek(1)?.clone();
                self.stack.push(second);
            }
            OpCode::Swap => {
                let len = self.stack.len();
                if len < 2 {
                    return Err(RuntimeError::StackUnderflow.into());
                }
                self.stack.swap(len - 1, len - 2);
            }
            op => {
                let builtin = builtins::for_op(op).ok_or(RuntimeError::InvalidBytecode(at))?;
                let flow = (builtin.action)(self);
                self.attrs.clear();
                return flow;
            }
        }
        Ok(Flow::Done)
    }
}

fn describe(func: &Function) -> Box<str> {
    match &func.kind {
        FunctionKind::Builtin(builtin) => builtin.name.into(),
        FunctionKind::User(_) => format!("function/{}", func.arity).into(),
    }
}
