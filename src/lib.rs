pub mod ast;
pub mod compiler;
pub mod num;
pub mod reader;
pub mod runtime;
pub mod world;

pub use compiler::bytecode::Translation;
pub use runtime::{BlockOptions, Error, ErrorKind, Flow, Interpreter, RuntimeError};
pub use world::{value, Config, World};
