//! The instruction set
//!
//! ```text
//! 0x00-0x5F  indexed families: Push Store Load Storl Call Attr
//!            (16 opcodes each: slots 0-13 inline, then X = 1 operand
//!            byte, then Y = 2 operand bytes, big-endian)
//! 0x60-0x77  immediate constants
//! 0x78-      operators, control forms, stack ops, jumps, Nop, End
//! ```
use core::fmt::Write as _;
use std::rc::Rc;

use arbitrary::Arbitrary;
use lasso::Rodeo;

use crate::{
    runtime::{Error, RuntimeError},
    value::{Block, Value},
};

/// Constant-pool slots that get their own opcode in every family
pub const SHORT_SLOTS: usize = 14;
const FAMILY_WIDTH: u8 = 16;
const X_VARIANT: u8 = 14;
const Y_VARIANT: u8 = 15;

/// Instruction families addressing the constant pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Arbitrary)]
pub enum Family {
    Push,
    Store,
    Load,
    /// store, leaving the value on the stack
    Storl,
    Call,
    Attr,
}

impl Family {
    pub const ALL: [Family; 6] = [
        Self::Push,
        Self::Store,
        Self::Load,
        Self::Storl,
        Self::Call,
        Self::Attr,
    ];

    fn base(self) -> u8 {
        self as u8 * FAMILY_WIDTH
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            Self::Push => "Push",
            Self::Store => "Store",
            Self::Load => "Load",
            Self::Storl => "Storl",
            Self::Call => "Call",
            Self::Attr => "Attr",
        }
    }
}

macro_rules! opcodes {
    ($first:ident = $start:literal $(, $name:ident)* $(,)?) => {
        /// Single-byte operations
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Arbitrary)]
        #[repr(u8)]
        pub enum OpCode {
            $first = $start,
            $($name),*
        }

        impl OpCode {
            const ALL: &'static [OpCode] = &[OpCode::$first, $(OpCode::$name),*];

            pub fn from_u8(byte: u8) -> Option<Self> {
                Self::ALL.get(usize::from(byte.checked_sub($start)?)).copied()
            }

            pub fn mnemonic(self) -> &'static str {
                match self {
                    Self::$first => stringify!($first),
                    $(Self::$name => stringify!($name)),*
                }
            }
        }
    };
}

opcodes! {
    // immediates
    ConstI0 = 0x60, ConstI1, ConstI2, ConstI3, ConstI4, ConstI5, ConstI6, ConstI7,
    ConstI8, ConstI9, ConstI10, ConstI11, ConstI12, ConstI13, ConstI14, ConstI15,
    ConstF0, ConstF1, ConstF2, ConstS, ConstBT, ConstBF, ConstN, ConstBl,
    // arithmetic, bitwise, logic, comparison
    Add, Sub, Mul, Div, FDiv, Mod, Pow, Neg,
    BNot, BAnd, BOr, BXor, Shl, Shr,
    Not, And, Or,
    Eq, Ne, Gt, Ge, Lt, Le,
    // branching
    If, IfE, Else, Unless, Switch, While, Return, Break, Continue,
    // getters/setters & converters
    Get, Set, To, ToS, ToI,
    // generators
    Array, Dict, Func,
    // ranges & iterators
    Range, Loop, Map, Select,
    // collections
    Size, Replace, Split, Join, Reverse, Inc, Dec,
    // I/O
    Print,
    // stack
    Pop, Dup, Over, Swap,
    // jumps
    Jmp, JmpX, JmpIf, JmpIfX, JmpIfN, JmpIfNX,
    Nop, End,
}

impl OpCode {
    /// The value pushed by an immediate-constant opcode
    pub fn immediate(self) -> Option<Value> {
        let byte = self as u8;
        if (OpCode::ConstI0 as u8..=OpCode::ConstI15 as u8).contains(&byte) {
            return Some(Value::Integer(i64::from(byte - OpCode::ConstI0 as u8)));
        }
        Some(match self {
            Self::ConstF0 => Value::Floating(0.0),
            Self::ConstF1 => Value::Floating(1.0),
            Self::ConstF2 => Value::Floating(2.0),
            Self::ConstS => Value::string(""),
            Self::ConstBT => Value::Logical(true),
            Self::ConstBF => Value::Logical(false),
            Self::ConstN => Value::Null,
            Self::ConstBl => Value::Block(Block::default()),
            _ => return None,
        })
    }

    /// Control forms, built as special calls
    pub fn is_control(self) -> bool {
        matches!(
            self,
            Self::If
                | Self::IfE
                | Self::Else
                | Self::Unless
                | Self::Switch
                | Self::While
                | Self::Return
                | Self::Break
                | Self::Continue
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Gt | Self::Ge | Self::Lt | Self::Le
        )
    }

    /// The comparison that holds exactly when `self` does not
    pub fn negated_comparison(self) -> Option<Self> {
        Some(match self {
            Self::Eq => Self::Ne,
            Self::Ne => Self::Eq,
            Self::Lt => Self::Ge,
            Self::Le => Self::Gt,
            Self::Gt => Self::Le,
            Self::Ge => Self::Lt,
            _ => return None,
        })
    }
}

/// Opcode for constants that need no pool slot
pub fn immediate_for(value: &Value) -> Option<OpCode> {
    match value {
        Value::Integer(i @ 0..=15) => {
            OpCode::from_u8(OpCode::ConstI0 as u8 + u8::try_from(*i).ok()?)
        }
        Value::Floating(f) if f.to_bits() == 0f64.to_bits() => Some(OpCode::ConstF0),
        Value::Floating(f) if *f == 1.0 => Some(OpCode::ConstF1),
        Value::Floating(f) if *f == 2.0 => Some(OpCode::ConstF2),
        Value::String(s) if s.is_empty() => Some(OpCode::ConstS),
        Value::Block(b) if b.is_empty() => Some(OpCode::ConstBl),
        Value::Logical(true) => Some(OpCode::ConstBT),
        Value::Logical(false) => Some(OpCode::ConstBF),
        Value::Null => Some(OpCode::ConstN),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    Always,
    IfTrue,
    IfFalse,
}

/// A decoded instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Indexed(Family, u16),
    Jump(Condition, u16),
    Op(OpCode),
}

fn operand(code: &[u8], ip: &mut usize, wide: bool, at: usize) -> Result<u16, RuntimeError> {
    let width = if wide { 2 } else { 1 };
    let bytes = code
        .get(*ip..*ip + width)
        .ok_or(RuntimeError::InvalidBytecode(at))?;
    *ip += width;
    Ok(if wide {
        u16::from_be_bytes([bytes[0], bytes[1]])
    } else {
        u16::from(bytes[0])
    })
}

/// Decodes the instruction at `ip`, advancing it past any operand bytes
pub fn decode(code: &[u8], ip: &mut usize) -> Result<Instruction, RuntimeError> {
    let at = *ip;
    let byte = *code.get(at).ok_or(RuntimeError::InvalidBytecode(at))?;
    *ip += 1;

    if let Some(family) = Family::ALL.get(usize::from(byte / FAMILY_WIDTH)) {
        let slot = byte % FAMILY_WIDTH;
        let index = match slot {
            X_VARIANT => operand(code, ip, false, at)?,
            Y_VARIANT => operand(code, ip, true, at)?,
            short => u16::from(short),
        };
        return Ok(Instruction::Indexed(*family, index));
    }

    let op = OpCode::from_u8(byte).ok_or(RuntimeError::InvalidBytecode(at))?;
    let jump = |condition, wide, ip: &mut usize| {
        operand(code, ip, wide, at).map(|target| Instruction::Jump(condition, target))
    };
    match op {
        OpCode::Jmp => jump(Condition::Always, false, ip),
        OpCode::JmpX => jump(Condition::Always, true, ip),
        OpCode::JmpIf => jump(Condition::IfTrue, false, ip),
        OpCode::JmpIfX => jump(Condition::IfTrue, true, ip),
        OpCode::JmpIfN => jump(Condition::IfFalse, false, ip),
        OpCode::JmpIfNX => jump(Condition::IfFalse, true, ip),
        op => Ok(Instruction::Op(op)),
    }
}

/// Appends a family instruction addressing pool slot `index`
pub fn encode_indexed(code: &mut Vec<u8>, family: Family, index: usize) -> Result<(), Error> {
    match index {
        index if index < SHORT_SLOTS => code.push(family.base() + index as u8),
        0..=0xFF => code.extend([family.base() + X_VARIANT, index as u8]),
        _ => {
            let wide = u16::try_from(index)
                .map_err(|_| Error::compiler("constant pool exceeds 65536 entries"))?;
            code.push(family.base() + Y_VARIANT);
            code.extend(wide.to_be_bytes());
        }
    }
    Ok(())
}

/// Appends a jump, picking the short form when the target fits in a byte
pub fn encode_jump(code: &mut Vec<u8>, condition: Condition, target: u16) {
    let (short, wide) = match condition {
        Condition::Always => (OpCode::Jmp, OpCode::JmpX),
        Condition::IfTrue => (OpCode::JmpIf, OpCode::JmpIfX),
        Condition::IfFalse => (OpCode::JmpIfN, OpCode::JmpIfNX),
    };
    match u8::try_from(target) {
        Ok(target) => code.extend([short as u8, target]),
        Err(_) => {
            code.push(wide as u8);
            code.extend(target.to_be_bytes());
        }
    }
}

/// A compiled unit: a deduplicated constant pool and its instruction bytes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Translation {
    pub constants: Vec<Value>,
    pub instructions: Vec<u8>,
}

impl Translation {
    pub fn into_value(self) -> Value {
        Value::Bytecode(Rc::new(self))
    }

    /// Human-readable listing of the pool and the instructions
    pub fn disassemble(&self, rodeo: &Rodeo) -> String {
        let mut out = String::from("constants:\n");
        for (i, constant) in self.constants.iter().enumerate() {
            _ = writeln!(out, "{i}: {}", constant.display(rodeo));
        }
        out.push_str("code:\n");

        let mut ip = 0;
        while ip < self.instructions.len() {
            let at = ip;
            let Ok(instruction) = decode(&self.instructions, &mut ip) else {
                _ = writeln!(out, "{at:04} ??? {:#04x}", self.instructions[at]);
                ip = at + 1;
                continue;
            };
            _ = write!(out, "{at:04} ");
            match instruction {
                Instruction::Indexed(family, index) => {
                    match self.instructions[at] % FAMILY_WIDTH {
                        X_VARIANT => _ = write!(out, "{}X {index}", family.mnemonic()),
                        Y_VARIANT => _ = write!(out, "{}Y {index}", family.mnemonic()),
                        _ => _ = write!(out, "{}{index}", family.mnemonic()),
                    }
                    if let Some(constant) = self.constants.get(usize::from(index)) {
                        _ = write!(out, " ; {}", constant.display(rodeo));
                    }
                }
                Instruction::Jump(_, target) => {
                    let op = OpCode::from_u8(self.instructions[at]).unwrap_or(OpCode::Nop);
                    _ = write!(out, "{} {target}", op.mnemonic());
                }
                Instruction::Op(op) => _ = write!(out, "{}", op.mnemonic()),
            }
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use arbtest::arbtest;
    use assert2::{check, let_assert};

    use super::{
        decode, encode_indexed, encode_jump, immediate_for, Condition, Family, Instruction,
        OpCode,
    };
    use crate::value::Value;

    #[test]
    fn opcodes_are_dense() {
        for op in OpCode::ALL {
            check!(OpCode::from_u8(*op as u8) == Some(*op));
        }
        check!(OpCode::from_u8(0x5F).is_none());
        check!(OpCode::from_u8(OpCode::End as u8 + 1).is_none());
    }

    #[test]
    fn families_pick_short_indexed_and_extended_forms() {
        let cases = [(0usize, 1usize), (13, 1), (14, 2), (255, 2), (256, 3), (4000, 3)];
        for (index, width) in cases {
            let mut code = vec![];
            encode_indexed(&mut code, Family::Load, index).unwrap();
            check!(code.len() == width, "index {index}");
            let mut ip = 0;
            let_assert!(Ok(Instruction::Indexed(Family::Load, decoded)) = decode(&code, &mut ip));
            check!(usize::from(decoded) == index);
            check!(ip == code.len());
        }
    }

    #[test]
    fn any_slot_decodes_back() {
        arbtest(|u| {
            let family = u.arbitrary::<Family>()?;
            let index = u.int_in_range(0..=u16::MAX as usize)?;
            let mut code = vec![];
            encode_indexed(&mut code, family, index).unwrap();
            let mut ip = 0;
            let decoded = decode(&code, &mut ip);
            assert_eq!(decoded, Ok(Instruction::Indexed(family, index as u16)));
            Ok(())
        });
    }

    #[test]
    fn jumps_widen_past_one_byte() {
        let mut code = vec![];
        encode_jump(&mut code, Condition::IfFalse, 42);
        encode_jump(&mut code, Condition::Always, 300);
        check!(code.len() == 5);
        let mut ip = 0;
        check!(decode(&code, &mut ip) == Ok(Instruction::Jump(Condition::IfFalse, 42)));
        check!(decode(&code, &mut ip) == Ok(Instruction::Jump(Condition::Always, 300)));
    }

    #[test]
    fn immediates_round_trip_through_values() {
        for value in [
            Value::Integer(0),
            Value::Integer(15),
            Value::Floating(2.0),
            Value::string(""),
            Value::Logical(false),
            Value::Null,
        ] {
            let_assert!(Some(op) = immediate_for(&value));
            check!(op.immediate() == Some(value));
        }
        check!(immediate_for(&Value::Integer(16)).is_none());
        check!(immediate_for(&Value::Integer(-1)).is_none());
        check!(immediate_for(&Value::Floating(-0.0)).is_none());
    }
}
