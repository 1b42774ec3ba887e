//! Peephole rewrites applied to a call as it closes
use super::{Ast, Node, NodeId, NodeKind};
use crate::{
    compiler::bytecode::OpCode,
    num::{self, Arith},
    value::Value,
};

/// Rewrites the node at `id` in place
pub fn optimize(ast: &mut Ast, id: NodeId) {
    let node = ast.node(id);
    if !matches!(node.kind, NodeKind::BuiltinCall | NodeKind::SpecialCall) {
        return;
    }
    let Some(op) = node.op else {
        return;
    };
    match (op, operands(ast, id).as_slice()) {
        (OpCode::Unless, [condition, _]) => negate_unless(ast, id, *condition),
        (op, [left, right]) => {
            if let Some(arith) = Arith::from_op(op) {
                if fold(ast, id, arith, *left, *right) {
                    return;
                }
            }
            match op {
                OpCode::Add => simplify_add(ast, id, *left, *right),
                OpCode::Sub if is_one(ast, *right) => unary(ast, id, OpCode::Dec, *left),
                _ => {}
            }
        }
        _ => {}
    }
}

fn operands(ast: &Ast, id: NodeId) -> Vec<NodeId> {
    ast.children(id)
        .iter()
        .copied()
        .filter(|child| ast.node(*child).kind != NodeKind::AttributeNode)
        .collect()
}

fn constant(ast: &Ast, id: NodeId) -> Option<&Value> {
    let node = ast.node(id);
    match node.kind {
        NodeKind::ConstantValue => node.value.as_ref(),
        _ => None,
    }
}

fn is_one(ast: &Ast, id: NodeId) -> bool {
    matches!(constant(ast, id), Some(Value::Integer(1)))
}

fn variable(ast: &Ast, id: NodeId) -> Option<&Value> {
    let node = ast.node(id);
    match node.kind {
        NodeKind::VariableLoad => node.value.as_ref(),
        _ => None,
    }
}

fn same_variable(ast: &Ast, a: NodeId, b: NodeId) -> bool {
    matches!((variable(ast, a), variable(ast, b)), (Some(x), Some(y)) if x == y)
}

/// Replaces `id` with a constant when both operands are numbers
fn fold(ast: &mut Ast, id: NodeId, op: Arith, left: NodeId, right: NodeId) -> bool {
    let (Some(a), Some(b)) = (constant(ast, left), constant(ast, right)) else {
        return false;
    };
    if !a.is_numeric() || !b.is_numeric() {
        return false;
    }
    // failures (overflow, division by zero) are left for run time
    let Ok(value) = num::arith(op, a, b) else {
        return false;
    };
    let parent = ast.node(id).parent;
    *ast.node_mut(id) = Node {
        parent,
        ..Node::constant(value)
    };
    true
}

fn unary(ast: &mut Ast, id: NodeId, op: OpCode, operand: NodeId) {
    let node = ast.node_mut(id);
    node.op = Some(op);
    node.arity = 1;
    node.params = 1;
    node.children.retain(|child| *child == operand);
}

fn binary_op(ast: &Ast, id: NodeId) -> Option<(OpCode, NodeId, NodeId)> {
    let node = ast.node(id);
    if node.kind != NodeKind::BuiltinCall {
        return None;
    }
    match operands(ast, id).as_slice() {
        [left, right] => Some((node.op?, *left, *right)),
        _ => None,
    }
}

fn simplify_add(ast: &mut Ast, id: NodeId, left: NodeId, right: NodeId) {
    if is_one(ast, right) {
        return unary(ast, id, OpCode::Inc, left);
    }
    if is_one(ast, left) {
        return unary(ast, id, OpCode::Inc, right);
    }

    // x + x * y  ->  x * (y + 1)
    let (x, product) = match (binary_op(ast, right), binary_op(ast, left)) {
        (Some((OpCode::Mul, ..)), _) => (left, right),
        (_, Some((OpCode::Mul, ..))) => (right, left),
        _ => return,
    };
    let Some((_, a, b)) = binary_op(ast, product) else {
        return;
    };
    let y = if same_variable(ast, x, a) {
        b
    } else if same_variable(ast, x, b) {
        a
    } else {
        return;
    };

    let one = ast.alloc(Node::constant(Value::Integer(1)));
    let sum = ast.node_mut(product);
    sum.op = Some(OpCode::Add);
    sum.children = vec![];
    sum.params = 0;
    ast.adopt(product, y);
    ast.adopt(product, one);
    optimize(ast, product);

    let node = ast.node_mut(id);
    node.op = Some(OpCode::Mul);
    node.children = vec![x, product];
}

/// `unless c` as `if not c`, flipping comparisons instead of negating them
fn negate_unless(ast: &mut Ast, id: NodeId, condition: NodeId) {
    ast.node_mut(id).op = Some(OpCode::If);
    let cond = ast.node(condition);
    let cond_op = match cond.kind {
        NodeKind::BuiltinCall => cond.op,
        _ => None,
    };

    if let Some(flipped) = cond_op.and_then(OpCode::negated_comparison) {
        ast.node_mut(condition).op = Some(flipped);
        return;
    }

    let replacement = match (cond_op, operands(ast, condition).as_slice()) {
        (Some(OpCode::Not), [inner]) => *inner,
        _ => {
            let not = ast.alloc(Node::builtin(OpCode::Not, 1));
            ast.adopt(not, condition);
            not
        }
    };
    ast.node_mut(replacement).parent = Some(id);
    for child in &mut ast.node_mut(id).children {
        if *child == condition {
            *child = replacement;
        }
    }
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use assert2::{check, let_assert};

    use crate::{
        ast::{build, Ast, NodeKind},
        compiler::bytecode::OpCode,
        num::{self, Arith},
        reader,
        value::Value,
        world::World,
    };

    fn parse(world: &mut World, source: &str) -> Ast {
        let block = reader::read(world, source).unwrap();
        build(world, block.items()).unwrap()
    }

    fn only(ast: &Ast) -> &super::Node {
        let_assert!([id] = ast.children(ast.root()));
        ast.node(*id)
    }

    #[test]
    fn folding_matches_direct_evaluation() {
        arbtest(|u| {
            let op = u.arbitrary::<Arith>()?;
            let a = u.int_in_range(-1000..=1000)?;
            let b = u.int_in_range(-20..=20)?;
            let mut world = World::default();
            let name = world.intern(op.name());
            let items = [Value::Word(name), Value::Integer(a), Value::Integer(b)];
            let ast = build(&mut world, &items).unwrap();
            let node = only(&ast);

            match num::arith(op, &Value::Integer(a), &Value::Integer(b)) {
                Ok(expected) => {
                    assert_eq!(node.kind, NodeKind::ConstantValue);
                    assert_eq!(node.value, Some(expected));
                }
                Err(_) => assert_eq!(node.op, Some(op.op())),
            }
            Ok(())
        });
    }

    #[test]
    fn increments_and_decrements() {
        for (source, op) in [("x + 1", OpCode::Inc), ("1 + x", OpCode::Inc), ("x - 1", OpCode::Dec)] {
            let mut world = World::default();
            let ast = parse(&mut world, source);
            let node = only(&ast);
            check!(node.op == Some(op), "{source}");
            check!(node.arity == 1);
            let_assert!([operand] = node.children.as_slice());
            check!(ast.node(*operand).kind == NodeKind::VariableLoad);
        }
    }

    #[test]
    fn one_minus_x_stays_binary() {
        let mut world = World::default();
        let ast = parse(&mut world, "1 - x");
        check!(only(&ast).op == Some(OpCode::Sub));
    }

    #[test]
    fn shared_factor_is_pulled_out() {
        for source in ["x + x * y", "x + (y * x)", "(x * y) + x"] {
            let mut world = World::default();
            let ast = parse(&mut world, source);
            let node = only(&ast);
            check!(node.op == Some(OpCode::Mul), "{source}");
            let_assert!([x, sum] = node.children.as_slice());
            check!(ast.node(*x).kind == NodeKind::VariableLoad);
            // y + 1 became an increment
            check!(ast.node(*sum).op == Some(OpCode::Inc), "{source}");
            check!(ast.node(*sum).parent == Some(ast.children(ast.root())[0]));
        }
    }

    #[test]
    fn unless_flips_comparisons() {
        let mut world = World::default();
        let ast = parse(&mut world, "unless x < 3 [print x]");
        let node = only(&ast);
        check!(node.op == Some(OpCode::If));
        check!(ast.node(node.children[0]).op == Some(OpCode::Ge));
    }

    #[test]
    fn unless_unwraps_not() {
        let mut world = World::default();
        let ast = parse(&mut world, "unless not? x [print x]");
        let node = only(&ast);
        check!(node.op == Some(OpCode::If));
        check!(ast.node(node.children[0]).kind == NodeKind::VariableLoad);
    }

    #[test]
    fn unless_wraps_other_conditions() {
        let mut world = World::default();
        let ast = parse(&mut world, "unless x [print x]");
        let node = only(&ast);
        check!(node.op == Some(OpCode::If));
        let not = ast.node(node.children[0]);
        check!(not.op == Some(OpCode::Not));
        check!(not.params == 1);
    }
}
