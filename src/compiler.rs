//! Compile call trees into bytecode
//! to execute!
//!
//! For example:
//!
//! x: 3 + 1
//! print x * y
//!
//! compiles to
//!
//! == constants ==
//! 0: x
//! 1: y
//! == code ==
//! ConstI4          ; 3 + 1 is folded while building
//! Store0           ; x
//! Load0            ; x
//! Load1            ; y
//! Mul
//! Print
//! End
//!
//! Operands are emitted before the call that consumes them, siblings left
//! to right, so the first argument of a call sits deepest on the stack.

use std::{collections::HashMap, rc::Rc};

use indexmap::IndexSet;
use tracing::{instrument, trace};

use crate::{
    ast::{self, Ast, NodeId, NodeKind},
    runtime::Error,
    value::{fingerprint, Block, Value},
    world::World,
};

pub mod bytecode;

use bytecode::{encode_indexed, immediate_for, Family, OpCode, Translation};

/// Translations of static blocks, keyed by a fingerprint of the block and
/// checked against the block itself on lookup
#[derive(Debug, Default)]
pub struct TranslationCache {
    entries: HashMap<u64, (Block, Rc<Translation>)>,
}

impl TranslationCache {
    fn get(&self, hash: u64, block: &Block) -> Option<Rc<Translation>> {
        self.entries
            .get(&hash)
            .filter(|(source, _)| source == block)
            .map(|(_, translation)| translation.clone())
    }

    fn insert(&mut self, hash: u64, block: Block, translation: Rc<Translation>) {
        self.entries.insert(hash, (block, translation));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Builds and compiles `block`, reusing an earlier translation of the same
/// static block when caching is enabled
#[instrument(level = "trace", skip_all, fields(items = block.len()))]
pub fn translate(world: &mut World, block: &Block) -> Result<Rc<Translation>, Error> {
    let hash = (world.config().cache_translations && !block.is_dynamic())
        .then(|| fingerprint(block.items()));
    if let Some(hash) = hash {
        if let Some(translation) = world.cache.get(hash, block) {
            trace!(hash, "translation cache hit");
            return Ok(translation);
        }
        trace!(hash, "translation cache miss");
    }

    let ast = ast::build(world, block.items())?;
    let translation = Rc::new(compile(&ast)?);
    if let Some(hash) = hash {
        world.cache.insert(hash, block.clone(), translation.clone());
    }
    Ok(translation)
}

/// Lowers a call tree into a translation terminated by `End`
pub fn compile(ast: &Ast) -> Result<Translation, Error> {
    let mut emitter = Emitter::default();
    for child in ast.children(ast.root()) {
        for id in ast.traverse_reverse_post(*child) {
            emitter.node(ast, id)?;
        }
    }
    emitter.code.push(OpCode::End as u8);
    Ok(Translation {
        constants: emitter.pool.into_iter().collect(),
        instructions: emitter.code,
    })
}

#[derive(Default)]
struct Emitter {
    pool: IndexSet<Value>,
    code: Vec<u8>,
}

impl Emitter {
    fn indexed(&mut self, family: Family, value: &Value) -> Result<(), Error> {
        let index = match self.pool.get_index_of(value) {
            Some(index) => index,
            None => self.pool.insert_full(value.clone()).0,
        };
        encode_indexed(&mut self.code, family, index)
    }

    fn node(&mut self, ast: &Ast, id: NodeId) -> Result<(), Error> {
        let node = ast.node(id);
        let payload = || {
            node.value
                .as_ref()
                .ok_or_else(|| Error::compiler(format!("{:?} node without a value", node.kind)))
        };
        match node.kind {
            NodeKind::Root => Ok(()),
            NodeKind::ConstantValue => {
                let value = payload()?;
                match immediate_for(value) {
                    Some(op) => {
                        self.code.push(op as u8);
                        Ok(())
                    }
                    None => self.indexed(Family::Push, value),
                }
            }
            NodeKind::VariableLoad => self.indexed(Family::Load, payload()?),
            NodeKind::VariableStore => {
                let top_level = node
                    .parent
                    .is_some_and(|parent| ast.node(parent).kind == NodeKind::Root);
                let family = if top_level { Family::Store } else { Family::Storl };
                self.indexed(family, payload()?)
            }
            NodeKind::AttributeNode => self.indexed(Family::Attr, payload()?),
            NodeKind::OtherCall => self.indexed(Family::Call, payload()?),
            NodeKind::BuiltinCall | NodeKind::SpecialCall => {
                let op = node
                    .op
                    .ok_or_else(|| Error::compiler(format!("{:?} node without an opcode", node.kind)))?;
                self.code.push(op as u8);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use assert2::{check, let_assert};

    use super::{compile, translate};
    use crate::{
        ast::build,
        compiler::bytecode::{decode, Family, Instruction, OpCode},
        reader,
        value::{Block, Value},
        world::{Config, World},
    };

    fn instructions(code: &[u8]) -> Vec<Instruction> {
        let mut ip = 0;
        let mut out = vec![];
        while ip < code.len() {
            out.push(decode(code, &mut ip).unwrap());
        }
        out
    }

    #[test]
    fn store_of_folded_constant() {
        let mut world = World::default();
        let block = reader::read(&mut world, "x: 3 + 1").unwrap();
        let translation = translate(&mut world, &block).unwrap();
        let x = world.lookup("x").unwrap();
        check!(translation.constants == vec![Value::Word(x)]);
        check!(
            instructions(&translation.instructions)
                == vec![
                    Instruction::Op(OpCode::ConstI4),
                    Instruction::Indexed(Family::Store, 0),
                    Instruction::Op(OpCode::End),
                ]
        );
    }

    #[test]
    fn nested_stores_keep_their_value() {
        let mut world = World::default();
        let block = reader::read(&mut world, "a: b: 20").unwrap();
        let translation = translate(&mut world, &block).unwrap();
        check!(
            instructions(&translation.instructions)
                == vec![
                    Instruction::Indexed(Family::Push, 0),
                    Instruction::Indexed(Family::Storl, 1),
                    Instruction::Indexed(Family::Store, 2),
                    Instruction::Op(OpCode::End),
                ]
        );
    }

    #[test]
    fn increments_replace_additions() {
        let mut world = World::default();
        let block = reader::read(&mut world, "print x + 1\nprint 1 + x\nprint x - 1").unwrap();
        let translation = translate(&mut world, &block).unwrap();
        let ops = instructions(&translation.instructions);
        check!(!ops.contains(&Instruction::Op(OpCode::Add)));
        check!(!ops.contains(&Instruction::Op(OpCode::Sub)));
        let incs = ops.iter().filter(|i| **i == Instruction::Op(OpCode::Inc)).count();
        check!(incs == 2);
        check!(ops.contains(&Instruction::Op(OpCode::Dec)));
    }

    #[test]
    fn pool_is_deduplicated_in_first_use_order() {
        let mut world = World::default();
        let block = reader::read(&mut world, r#"print "a" print "b" print "a" print y"#).unwrap();
        let translation = translate(&mut world, &block).unwrap();
        let y = world.lookup("y").unwrap();
        check!(
            translation.constants == vec![Value::string("a"), Value::string("b"), Value::Word(y)]
        );
    }

    #[test]
    fn compilation_is_deterministic() {
        let mut world = World::new(Config {
            cache_translations: false,
            ..Config::default()
        });
        let block = reader::read(&mut world, "f: function [a] [a * 2]\nprint f 21 + z").unwrap();
        let first = translate(&mut world, &block).unwrap();
        let second = translate(&mut world, &block).unwrap();
        check!(!Rc::ptr_eq(&first, &second));
        check!(*first == *second);
        check!(world.cache().is_empty());
    }

    #[test]
    fn cache_returns_the_same_translation() {
        let mut world = World::default();
        let block = reader::read(&mut world, "print 1 + 2 * 3").unwrap();
        let first = translate(&mut world, &block).unwrap();
        let copy = Block::new(block.items().to_vec());
        let second = translate(&mut world, &copy).unwrap();
        check!(Rc::ptr_eq(&first, &second));
        check!(world.cache().len() == 1);
    }

    #[test]
    fn dynamic_blocks_skip_the_cache() {
        let mut world = World::default();
        let block = Block::dynamic(vec![Value::Integer(42)]);
        let first = translate(&mut world, &block).unwrap();
        let second = translate(&mut world, &block).unwrap();
        check!(!Rc::ptr_eq(&first, &second));
        check!(world.cache().is_empty());
    }

    #[test]
    fn pool_addressing_widens_with_size() {
        // one distinct string per entry; each is printed, so the last print
        // addresses the highest slot
        for (size, width) in [(1usize, 1usize), (13, 1), (14, 1), (15, 2), (256, 2), (257, 3), (300, 3)] {
            let mut world = World::default();
            let print = world.intern("print");
            let items = (0..size)
                .flat_map(|k| [Value::Word(print), Value::string(format!("s{k}"))])
                .collect::<Vec<_>>();
            let ast = build(&mut world, &items).unwrap();
            let translation = compile(&ast).unwrap();
            check!(translation.constants.len() == size);

            let last = size - 1;
            let mut ip = 0;
            let mut found = None;
            while ip < translation.instructions.len() {
                let at = ip;
                let_assert!(Ok(instruction) = decode(&translation.instructions, &mut ip));
                if instruction == Instruction::Indexed(Family::Push, last as u16) {
                    found = Some(ip - at);
                }
            }
            check!(found == Some(width), "pool of {size}");
        }
    }
}
