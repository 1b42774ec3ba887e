//! Turns a block of values into a tree of calls
//!
//! Words known to the arity table open call frames; every other item is a
//! terminal that fills the innermost open frame. A frame closes as soon as it
//! has as many operands as its arity, and closing a frame reached through a
//! terminal runs the [`optimize`] pass over it.
use core::fmt::Write as _;

use lasso::Spur;

use crate::{
    compiler::bytecode::OpCode,
    runtime::{
        builtins::{self, Precedence},
        Error,
    },
    value::{Block, SymbolKind, Value},
    world::World,
};

pub mod optimize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Root,
    ConstantValue,
    VariableLoad,
    /// named side-channel argument; never counts towards its parent's arity
    AttributeNode,
    VariableStore,
    /// call of a function resolved at run time (or eagerly, when the value is a function)
    OtherCall,
    BuiltinCall,
    /// control forms: if, while, return ...
    SpecialCall,
}

impl NodeKind {
    pub fn is_call(self) -> bool {
        matches!(
            self,
            Self::AttributeNode
                | Self::VariableStore
                | Self::OtherCall
                | Self::BuiltinCall
                | Self::SpecialCall
        )
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub value: Option<Value>,
    pub op: Option<OpCode>,
    pub arity: usize,
    /// operands attached so far
    pub params: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    fn new(kind: NodeKind, value: Option<Value>, op: Option<OpCode>, arity: usize) -> Self {
        Self {
            kind,
            value,
            op,
            arity,
            params: 0,
            parent: None,
            children: vec![],
        }
    }

    fn root() -> Self {
        Self::new(NodeKind::Root, None, None, 0)
    }

    pub fn constant(value: Value) -> Self {
        Self::new(NodeKind::ConstantValue, Some(value), None, 0)
    }

    fn load(name: Spur) -> Self {
        Self::new(NodeKind::VariableLoad, Some(Value::Word(name)), None, 0)
    }

    fn builtin(op: OpCode, arity: usize) -> Self {
        let kind = if op.is_control() {
            NodeKind::SpecialCall
        } else {
            NodeKind::BuiltinCall
        };
        Self::new(kind, None, Some(op), arity)
    }

    pub fn is_complete(&self) -> bool {
        self.params == self.arity
    }
}

/// An arena of nodes; index 0 is the root
#[derive(Debug, Clone)]
pub struct Ast {
    nodes: Vec<Node>,
}

impl Ast {
    const ROOT: NodeId = NodeId(0);

    fn new() -> Self {
        Self {
            nodes: vec![Node::root()],
        }
    }

    pub fn root(&self) -> NodeId {
        Self::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    /// Appends `child` to `parent`, counting it as an operand unless it is
    /// an attribute
    pub(crate) fn adopt(&mut self, parent: NodeId, child: NodeId) {
        let counts = self.node(child).kind != NodeKind::AttributeNode;
        self.node_mut(child).parent = Some(parent);
        let parent = self.node_mut(parent);
        parent.children.push(child);
        if counts {
            parent.params += 1;
        }
    }

    /// Removes the last operand of `parent`
    fn detach_last(&mut self, parent: NodeId) -> Option<NodeId> {
        let at = self
            .children(parent)
            .iter()
            .rposition(|child| self.node(*child).kind != NodeKind::AttributeNode)?;
        let child = self.node_mut(parent).children.remove(at);
        self.node_mut(parent).params -= 1;
        self.node_mut(child).parent = None;
        Some(child)
    }

    /// Children before parents, siblings left to right, materialised by
    /// walking right-to-left pre-order and reversing
    pub fn traverse_reverse_post(&self, start: NodeId) -> Vec<NodeId> {
        let mut stack = vec![start];
        let mut order = vec![];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend_from_slice(self.children(id));
        }
        order.reverse();
        order
    }

    /// Plain left-to-right post-order
    pub fn traverse_post(&self, start: NodeId) -> Vec<NodeId> {
        fn walk(ast: &Ast, id: NodeId, order: &mut Vec<NodeId>) {
            for child in ast.children(id) {
                walk(ast, *child, order);
            }
            order.push(id);
        }
        let mut order = vec![];
        walk(self, start, &mut order);
        order
    }

    /// Indented listing of the tree under the root
    pub fn dump(&self, world: &World) -> String {
        fn walk(ast: &Ast, world: &World, id: NodeId, depth: usize, out: &mut String) {
            let node = ast.node(id);
            _ = write!(out, "{:indent$}{:?}", "", node.kind, indent = depth * 2);
            if let Some(op) = node.op {
                _ = write!(out, " {}", op.mnemonic());
            }
            if let Some(value) = &node.value {
                _ = write!(out, " {}", value.display(world.rodeo()));
            }
            if node.kind.is_call() {
                _ = write!(out, " ({}/{})", node.params, node.arity);
            }
            out.push('\n');
            for child in &node.children {
                walk(ast, world, *child, depth + 1, out);
            }
        }
        let mut out = String::new();
        for child in self.children(self.root()) {
            walk(self, world, *child, 0, &mut out);
        }
        out
    }
}

/// Builds the call tree for `items`
pub fn build(world: &mut World, items: &[Value]) -> Result<Ast, Error> {
    let mut builder = Builder {
        world,
        ast: Ast::new(),
        current: Ast::ROOT,
    };
    builder.block(Ast::ROOT, items, 0, false)?;
    Ok(builder.ast)
}

struct Builder<'w> {
    world: &'w mut World,
    ast: Ast,
    current: NodeId,
}

impl Builder<'_> {
    /// Builds `items[start..]` under `root`, returning the index of the last
    /// item consumed. In arrow mode the build stops after the first complete
    /// expression.
    fn block(
        &mut self,
        root: NodeId,
        items: &[Value],
        start: usize,
        arrow: bool,
    ) -> Result<usize, Error> {
        let outer = self.current;
        self.current = root;

        let mut last = start.saturating_sub(1);
        let mut i = start;
        while i < items.len() {
            last = self.item(items, i)?;
            i = last + 1;
            if arrow && self.current == root && !self.ast.children(root).is_empty() {
                break;
            }
        }

        if self.current != root {
            return Err(Error::syntax(self.incomplete(self.current)));
        }
        self.current = outer;
        Ok(last)
    }

    fn incomplete(&self, id: NodeId) -> String {
        let node = self.ast.node(id);
        let name = match (&node.value, node.op) {
            (Some(value), _) => value.display(self.world.rodeo()).to_string(),
            (None, Some(op)) => builtins::for_op(op)
                .map_or_else(|| op.mnemonic().to_owned(), |builtin| builtin.name.to_owned()),
            (None, None) => format!("{:?}", node.kind),
        };
        format!(
            "incomplete call: {name} needs {} argument(s), got {}",
            node.arity, node.params
        )
    }

    /// Closes every complete frame from the cursor upwards
    fn rollback(&mut self, optimize: bool) {
        loop {
            let node = self.ast.node(self.current);
            if node.kind == NodeKind::Root || !node.is_complete() {
                break;
            }
            let Some(parent) = node.parent else {
                break;
            };
            let closed = self.current;
            self.current = parent;
            if optimize {
                optimize::optimize(&mut self.ast, closed);
            }
        }
    }

    /// Attaches a finished subtree, wrapping it in an infix call when the
    /// next item is an infix alias
    fn attach(&mut self, id: NodeId, items: &[Value], last: usize) -> Result<usize, Error> {
        if let Some(Value::Symbol(symbol)) = items.get(last + 1) {
            if let Some(call) = self.infix(*symbol) {
                let call = self.open(call);
                self.ast.adopt(call, id);
                self.rollback(true);
                return Ok(last + 1);
            }
        }
        self.ast.adopt(self.current, id);
        self.rollback(true);
        Ok(last)
    }

    fn terminal(&mut self, node: Node, items: &[Value], i: usize) -> Result<usize, Error> {
        let id = self.ast.alloc(node);
        self.attach(id, items, i)
    }

    /// Adds a call node under the cursor and moves the cursor into it
    fn open(&mut self, node: Node) -> NodeId {
        let id = self.ast.alloc(node);
        self.ast.adopt(self.current, id);
        self.current = id;
        id
    }

    fn call(&mut self, node: Node, items: &[Value], i: usize) -> Result<usize, Error> {
        if node.arity == 0 {
            return self.terminal(node, items, i);
        }
        self.open(node);
        Ok(i)
    }

    /// Call node for the function bound to `name`. Bindings still holding
    /// their builtin compile to its opcode. With `eager`, other functions
    /// are embedded as values instead of being looked up by name.
    fn call_node(&self, name: Spur, arity: usize, eager: bool) -> Node {
        let bound = self.world.get(name).and_then(Value::as_function);
        if let Some(builtin) = builtins::by_name(self.world.resolve(name)) {
            let still_builtin = bound
                .and_then(|func| func.as_builtin())
                .is_some_and(|current| core::ptr::eq(current, builtin));
            if let (Some(op), true) = (builtin.op, still_builtin) {
                return Node::builtin(op, arity);
            }
        }
        let value = match bound {
            Some(func) if eager => Value::Function(func.clone()),
            _ => Value::Word(name),
        };
        Node::new(NodeKind::OtherCall, Some(value), None, arity)
    }

    fn infix(&self, symbol: SymbolKind) -> Option<Node> {
        let alias = self.world.alias(symbol)?;
        if alias.precedence != Precedence::Infix {
            return None;
        }
        let name = self.world.lookup(alias.name)?;
        let arity = self.world.arity(name)?;
        (arity > 0).then(|| self.call_node(name, arity, true))
    }

    fn item(&mut self, items: &[Value], i: usize) -> Result<usize, Error> {
        match &items[i] {
            Value::Word(name) => self.word(*name, items, i),
            Value::Label(name) => self.label(*name, items, i),
            Value::Attribute(name) => {
                let attr = self.ast.alloc(Node::new(
                    NodeKind::AttributeNode,
                    Some(Value::Word(*name)),
                    None,
                    1,
                ));
                let flag = self.ast.alloc(Node::constant(Value::Logical(true)));
                self.ast.adopt(attr, flag);
                self.ast.adopt(self.current, attr);
                Ok(i)
            }
            Value::AttributeLabel(name) => {
                self.open(Node::new(
                    NodeKind::AttributeNode,
                    Some(Value::Word(*name)),
                    None,
                    1,
                ));
                Ok(i)
            }
            Value::Path(segments) => self.path(segments, items, i),
            Value::PathLabel(segments) => self.path_label(segments, i),
            Value::Inline(block) => self.inline(block, items, i),
            Value::Symbol(symbol) => self.symbol(*symbol, items, i),
            Value::Newline(_) => Ok(i),
            value => self.terminal(Node::constant(value.clone()), items, i),
        }
    }

    fn word(&mut self, name: Spur, items: &[Value], i: usize) -> Result<usize, Error> {
        let constant = match self.world.resolve(name) {
            "true" => Some(Value::Logical(true)),
            "false" => Some(Value::Logical(false)),
            "null" => Some(Value::Null),
            _ => None,
        };
        if let Some(value) = constant {
            return self.terminal(Node::constant(value), items, i);
        }
        match self.world.arity(name) {
            Some(arity) => {
                let node = self.call_node(name, arity, false);
                self.call(node, items, i)
            }
            None => self.terminal(Node::load(name), items, i),
        }
    }

    fn label(&mut self, name: Spur, items: &[Value], i: usize) -> Result<usize, Error> {
        if let Some(arity) = self.declared_arity(items, i + 1) {
            self.world.set_arity(name, arity);
        } else if self.stores_plain_value(items, i + 1) {
            self.world.unset_arity(name);
        }
        self.open(Node::new(
            NodeKind::VariableStore,
            Some(Value::Word(name)),
            None,
            1,
        ));
        Ok(i)
    }

    /// Whether the expression at `at` can only produce a non-function
    fn stores_plain_value(&self, items: &[Value], at: usize) -> bool {
        match items.get(at) {
            Some(
                Value::Null
                | Value::Logical(_)
                | Value::Integer(_)
                | Value::Floating(_)
                | Value::Rational(_)
                | Value::String(_)
                | Value::Literal(_)
                | Value::Block(_)
                | Value::Dictionary(_),
            ) => true,
            Some(Value::Word(word)) => {
                matches!(self.world.resolve(*word), "true" | "false" | "null")
            }
            _ => false,
        }
    }

    /// Parameter count of a `function [params] [body]` starting at `at`
    fn declared_arity(&self, items: &[Value], at: usize) -> Option<usize> {
        let is_function = match items.get(at)? {
            Value::Word(word) => self.world.resolve(*word) == "function",
            Value::Symbol(SymbolKind::Dollar) => true,
            _ => false,
        };
        if !is_function {
            return None;
        }
        let mut at = at + 1;
        loop {
            match items.get(at)? {
                Value::Attribute(_) => at += 1,
                Value::AttributeLabel(_) => at += 2,
                Value::Block(params) => {
                    let words = params.items().iter().filter(|item| {
                        matches!(item, Value::Word(_) | Value::Literal(_))
                    });
                    return Some(words.count());
                }
                _ => return None,
            }
        }
    }

    fn key(&self, segment: &Value) -> Value {
        match segment {
            Value::Word(name) => Value::string(self.world.resolve(*name)),
            segment => segment.clone(),
        }
    }

    /// `a\b\c` as `get (get a "b") "c"`
    fn chain(&mut self, segments: &[Value]) -> NodeId {
        let head = match segments.first() {
            Some(Value::Word(name)) => Node::load(*name),
            Some(head) => Node::constant(head.clone()),
            None => Node::constant(Value::Null),
        };
        let mut chain = self.ast.alloc(head);
        for segment in segments.iter().skip(1) {
            let key = self.ast.alloc(Node::constant(self.key(segment)));
            let get = self.ast.alloc(Node::builtin(OpCode::Get, 2));
            self.ast.adopt(get, chain);
            self.ast.adopt(get, key);
            chain = get;
        }
        chain
    }

    fn path(&mut self, segments: &[Value], items: &[Value], i: usize) -> Result<usize, Error> {
        // a function stored in a dictionary is called directly
        if let [Value::Word(head), key] = segments {
            if let Some(Value::Dictionary(dict)) = self.world.get(*head) {
                let key = self.key(key);
                let entry = match &key {
                    Value::String(key) => dict.borrow().get(key).cloned(),
                    _ => None,
                };
                if let Some(Value::Function(func)) = entry {
                    let arity = func.arity;
                    let node = Node::new(
                        NodeKind::OtherCall,
                        Some(Value::Function(func)),
                        None,
                        arity,
                    );
                    return self.call(node, items, i);
                }
            }
        }
        let chain = self.chain(segments);
        self.attach(chain, items, i)
    }

    /// `a\b\c: value` as `set (get a "b") "c" value`
    fn path_label(&mut self, segments: &[Value], i: usize) -> Result<usize, Error> {
        let (last, init) = segments
            .split_last()
            .ok_or_else(|| Error::syntax("empty path label"))?;
        let target = self.chain(init);
        let key = self.ast.alloc(Node::constant(self.key(last)));
        let set = self.open(Node::builtin(OpCode::Set, 3));
        self.ast.adopt(set, target);
        self.ast.adopt(set, key);
        Ok(i)
    }

    fn inline(&mut self, block: &Block, items: &[Value], i: usize) -> Result<usize, Error> {
        let sub = self.ast.alloc(Node::root());
        self.block(sub, block.items(), 0, false)?;
        let children = core::mem::take(&mut self.ast.node_mut(sub).children);
        let Some((last, rest)) = children.split_last() else {
            return Ok(i);
        };
        for child in rest {
            self.ast.adopt(self.current, *child);
            self.rollback(false);
        }
        self.attach(*last, items, i)
    }

    fn symbol(&mut self, symbol: SymbolKind, items: &[Value], i: usize) -> Result<usize, Error> {
        match symbol {
            SymbolKind::DoubleColon => {
                let rest = Block::new(items.get(i + 1..).unwrap_or_default().to_vec());
                let end = items.len().saturating_sub(1).max(i);
                self.terminal(Node::constant(Value::Block(rest)), items, end)
            }
            SymbolKind::Arrow => {
                let sub = self.ast.alloc(Node::root());
                let end = if i + 1 < items.len() {
                    self.block(sub, items, i + 1, true)?
                } else {
                    i
                };
                let body = Block::new(items[i + 1..=end.max(i)].to_vec());
                self.terminal(Node::constant(Value::Block(body)), items, end.max(i))
            }
            SymbolKind::ThickArrow => match self.placeholders(items.get(i + 1)) {
                Some((args, body)) => {
                    let args = self.ast.alloc(Node::constant(Value::Block(args)));
                    self.ast.adopt(self.current, args);
                    self.rollback(true);
                    self.terminal(Node::constant(Value::Block(body)), items, i + 1)
                }
                None => self.terminal(Node::constant(Value::Symbol(symbol)), items, i),
            },
            SymbolKind::Pipe => self.pipe(items, i),
            symbol => {
                let Some(alias) = self.world.alias(symbol) else {
                    return self.terminal(Node::constant(Value::Symbol(symbol)), items, i);
                };
                if alias.name == "null" {
                    return self.terminal(Node::constant(Value::Null), items, i);
                }
                let target = self.world.lookup(alias.name);
                match target.and_then(|name| Some((name, self.world.arity(name)?))) {
                    Some((name, arity)) => {
                        let node = self.call_node(name, arity, true);
                        self.call(node, items, i)
                    }
                    None => self.terminal(Node::constant(Value::Symbol(symbol)), items, i),
                }
            }
        }
    }

    /// The argument and body blocks behind `=>`
    fn placeholders(&mut self, next: Option<&Value>) -> Option<(Block, Block)> {
        match next? {
            Value::Word(name) => {
                let arity = self.world.arity(*name)?;
                let args = (0..arity)
                    .map(|k| Value::Word(self.world.intern(format!("_{k}"))))
                    .collect::<Vec<_>>();
                let body = [Value::Word(*name)]
                    .into_iter()
                    .chain(args.iter().cloned())
                    .collect::<Vec<_>>();
                Some((Block::new(args), Block::new(body)))
            }
            Value::Block(block) => {
                let mut count = 0;
                let body = self.replace_ampersands(block.items(), &mut count);
                let args = (0..count)
                    .map(|k| Value::Word(self.world.intern(format!("_{k}"))))
                    .collect::<Vec<_>>();
                Some((Block::new(args), Block::new(body)))
            }
            _ => None,
        }
    }

    fn replace_ampersands(&mut self, items: &[Value], count: &mut usize) -> Vec<Value> {
        items
            .iter()
            .map(|item| match item {
                Value::Symbol(SymbolKind::Ampersand) => {
                    let name = self.world.intern(format!("_{count}"));
                    *count += 1;
                    Value::Word(name)
                }
                Value::Inline(inline) => {
                    let inner = self.replace_ampersands(inline.items(), count);
                    Value::Inline(Block::new(inner))
                }
                item => item.clone(),
            })
            .collect()
    }

    /// `value | f` calls `f` with `value` as its first argument
    fn pipe(&mut self, items: &[Value], i: usize) -> Result<usize, Error> {
        let target = match items.get(i + 1) {
            Some(Value::Word(name)) => self
                .world
                .arity(*name)
                .filter(|arity| *arity > 0)
                .map(|arity| (*name, arity)),
            _ => None,
        };
        let Some((name, arity)) = target else {
            return self.terminal(Node::constant(Value::Symbol(SymbolKind::Pipe)), items, i);
        };
        let Some(previous) = self.ast.detach_last(self.current) else {
            return self.terminal(Node::constant(Value::Symbol(SymbolKind::Pipe)), items, i);
        };

        let argument = if self.ast.node(previous).kind == NodeKind::VariableStore {
            // pipe the stored expression, then store the call's result
            self.ast.adopt(self.current, previous);
            self.current = previous;
            self.ast.detach_last(previous)
        } else {
            Some(previous)
        };

        let node = self.call_node(name, arity, false);
        let call = self.open(node);
        if let Some(argument) = argument {
            self.ast.adopt(call, argument);
        }
        self.rollback(true);
        Ok(i + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use assert2::{check, let_assert};
    use indexmap::IndexMap;

    use super::{build, Ast, NodeId, NodeKind};
    use crate::{
        compiler::bytecode::OpCode,
        reader,
        runtime::ErrorKind,
        value::{Function, UserFunction, Value},
        world::World,
    };

    fn parse(world: &mut World, source: &str) -> Ast {
        let block = reader::read(world, source).unwrap();
        build(world, block.items()).unwrap()
    }

    fn reachable(ast: &Ast) -> Vec<NodeId> {
        ast.traverse_post(ast.root())
    }

    #[test]
    fn calls_close_at_their_arity() {
        let mut world = World::default();
        let ast = parse(
            &mut world,
            "x: 2\nprint add x mul x 3\nif x > 1 [print x]\nloop 1..3 'i [print i]",
        );
        for id in reachable(&ast) {
            let node = ast.node(id);
            if node.kind.is_call() {
                check!(node.params == node.arity, "{:?}", node);
                check!(
                    node.children
                        .iter()
                        .filter(|child| ast.node(**child).kind != NodeKind::AttributeNode)
                        .count()
                        == node.arity
                );
            }
        }
    }

    #[test]
    fn store_of_folded_sum() {
        let mut world = World::default();
        let ast = parse(&mut world, "x: 3 + 1");
        let_assert!([store] = ast.children(ast.root()));
        let store = ast.node(*store);
        check!(store.kind == NodeKind::VariableStore);
        let_assert!([value] = store.children.as_slice());
        check!(ast.node(*value).kind == NodeKind::ConstantValue);
        check!(ast.node(*value).value == Some(Value::Integer(4)));
    }

    #[test]
    fn infix_binds_to_the_previous_terminal() {
        let mut world = World::default();
        let ast = parse(&mut world, "y: 1\nprint y * 2");
        let_assert!([_, print] = ast.children(ast.root()));
        check!(ast.node(*print).op == Some(OpCode::Print));
        let_assert!([mul] = ast.children(*print));
        check!(ast.node(*mul).op == Some(OpCode::Mul));
        check!(ast.node(*mul).kind == NodeKind::BuiltinCall);
    }

    #[test]
    fn control_forms_are_special_calls() {
        let mut world = World::default();
        let ast = parse(&mut world, "if true [print 1]");
        let_assert!([call] = ast.children(ast.root()));
        check!(ast.node(*call).kind == NodeKind::SpecialCall);
        check!(ast.node(*call).op == Some(OpCode::If));
    }

    #[test]
    fn labels_declare_function_arity() {
        let mut world = World::default();
        let ast = parse(&mut world, "f: function [a b] [a + b]\nprint f 1 2");
        let_assert!([_, print] = ast.children(ast.root()));
        let_assert!([call] = ast.children(*print));
        let call = ast.node(*call);
        check!(call.kind == NodeKind::OtherCall);
        check!(call.arity == 2);
    }

    #[test]
    fn relabeling_a_function_as_a_value_forgets_its_arity() {
        let mut world = World::default();
        let ast = parse(&mut world, "f: function [a] [a]\nf: 5\nprint f");
        let_assert!([_, _, print] = ast.children(ast.root()));
        let_assert!([load] = ast.children(*print));
        check!(ast.node(*load).kind == NodeKind::VariableLoad);
        let f = world.intern("f");
        check!(world.arity(f).is_none());
    }

    #[test]
    fn unknown_words_are_loads() {
        let mut world = World::default();
        let ast = parse(&mut world, "something");
        let_assert!([load] = ast.children(ast.root()));
        check!(ast.node(*load).kind == NodeKind::VariableLoad);
    }

    #[test]
    fn incomplete_call_is_a_syntax_error() {
        let mut world = World::default();
        let block = reader::read(&mut world, "print add 1").unwrap();
        let_assert!(Err(err) = build(&mut world, block.items()));
        check!(err.kind() == ErrorKind::Syntax);
        check!(err.to_string().contains("add"));
    }

    #[test]
    fn attributes_do_not_count_as_operands() {
        let mut world = World::default();
        let ast = parse(&mut world, "f: function .memoize .export:[n] [x] [x]");
        let_assert!([store] = ast.children(ast.root()));
        let_assert!([func] = ast.children(*store));
        let func = ast.node(*func);
        check!(func.op == Some(OpCode::Func));
        check!(func.children.len() == 4);
        check!(func.params == 2);
    }

    #[test]
    fn pipe_feeds_the_previous_value() {
        let mut world = World::default();
        let ast = parse(&mut world, "x: 3 | neg");
        let_assert!([store] = ast.children(ast.root()));
        check!(ast.node(*store).kind == NodeKind::VariableStore);
        let_assert!([neg] = ast.children(*store));
        check!(ast.node(*neg).op == Some(OpCode::Neg));
        let_assert!([three] = ast.children(*neg));
        check!(ast.node(*three).value == Some(Value::Integer(3)));
    }

    #[test]
    fn thick_arrow_names_placeholders() {
        let mut world = World::default();
        let ast = parse(&mut world, "map [1 2] => [& * 2]");
        let_assert!([map] = ast.children(ast.root()));
        let_assert!([_, args, body] = ast.children(*map));
        let_assert!(Some(Value::Block(args)) = &ast.node(*args).value);
        let_assert!(Some(Value::Block(body)) = &ast.node(*body).value);
        check!(args.len() == 1);
        let_assert!(Value::Word(arg) = &args.items()[0]);
        check!(world.resolve(*arg) == "_0");
        check!(body.items()[0] == args.items()[0]);
    }

    #[test]
    fn thick_arrow_before_a_word_calls_it_with_placeholders() {
        let mut world = World::default();
        let ast = parse(&mut world, "map [1 2] => sub");
        let_assert!([map] = ast.children(ast.root()));
        check!(ast.node(*map).op == Some(OpCode::Map));
        let_assert!([_, args, body] = ast.children(*map));
        let_assert!(Some(Value::Block(args)) = &ast.node(*args).value);
        let_assert!(Some(Value::Block(body)) = &ast.node(*body).value);
        let names = args
            .items()
            .iter()
            .map(|arg| match arg {
                Value::Word(name) => world.resolve(*name),
                _ => "",
            })
            .collect::<Vec<_>>();
        check!(names == ["_0", "_1"]);
        let_assert!([Value::Word(head), rest @ ..] = body.items());
        check!(world.resolve(*head) == "sub");
        check!(rest == args.items());
    }

    #[test]
    fn arrow_wraps_one_expression() {
        let mut world = World::default();
        let ast = parse(&mut world, "if true -> print 1 + 2\nprint 3");
        let_assert!([when, _] = ast.children(ast.root()));
        let_assert!([_, body] = ast.children(*when));
        let_assert!(Some(Value::Block(body)) = &ast.node(*body).value);
        check!(body.len() == 4);
    }

    #[test]
    fn double_colon_quotes_the_rest() {
        let mut world = World::default();
        let ast = parse(&mut world, "print :: a b c");
        let_assert!([print] = ast.children(ast.root()));
        let_assert!([rest] = ast.children(*print));
        let_assert!(Some(Value::Block(rest)) = &ast.node(*rest).value);
        check!(rest.len() == 3);
    }

    #[test]
    fn inline_children_are_spliced() {
        let mut world = World::default();
        let ast = parse(&mut world, "print (1 + x)");
        let_assert!([print] = ast.children(ast.root()));
        let_assert!([inc] = ast.children(*print));
        check!(ast.node(*inc).op == Some(OpCode::Inc));
    }

    #[test]
    fn paths_build_get_chains() {
        let mut world = World::default();
        let ast = parse(&mut world, "print a\\b\\1");
        let_assert!([print] = ast.children(ast.root()));
        let_assert!([outer] = ast.children(*print));
        check!(ast.node(*outer).op == Some(OpCode::Get));
        let_assert!([inner, index] = ast.children(*outer));
        check!(ast.node(*inner).op == Some(OpCode::Get));
        check!(ast.node(*index).value == Some(Value::Integer(1)));
        let_assert!([_, key] = ast.children(*inner));
        check!(ast.node(*key).value == Some(Value::string("b")));
    }

    #[test]
    fn path_to_a_stored_function_is_a_direct_call() {
        let mut world = World::default();
        let x = world.intern("x");
        let double = UserFunction::new(vec![x], Value::block(vec![Value::Word(x)]));
        let entries = IndexMap::from([(
            Rc::from("f"),
            Value::Function(Rc::new(Function::user(double))),
        )]);
        let d = world.intern("d");
        world.set(d, Value::dictionary(entries));

        let ast = parse(&mut world, "print d\\f 4");
        let_assert!([print] = ast.children(ast.root()));
        let_assert!([call] = ast.children(*print));
        let call = ast.node(*call);
        check!(call.kind == NodeKind::OtherCall);
        check!(call.arity == 1);
        check!(call.params == 1);
        let_assert!(Some(Value::Function(func)) = &call.value);
        check!(func.arity == 1);
        let_assert!([four] = call.children.as_slice());
        check!(ast.node(*four).value == Some(Value::Integer(4)));
    }

    #[test]
    fn path_label_is_a_set() {
        let mut world = World::default();
        let ast = parse(&mut world, "d\\k: 5");
        let_assert!([set] = ast.children(ast.root()));
        check!(ast.node(*set).op == Some(OpCode::Set));
        check!(ast.node(*set).params == 3);
    }

    #[test]
    fn traversals_agree() {
        let mut world = World::default();
        let ast = parse(&mut world, "print add 1 mul x neg y\nz: [a b]");
        for child in ast.children(ast.root()) {
            check!(ast.traverse_reverse_post(*child) == ast.traverse_post(*child));
        }
    }
}
