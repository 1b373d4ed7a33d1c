pub mod compiler;
pub mod freeze;
pub mod lexer;
pub mod marshal;
pub mod parser;
pub mod runtime;
pub mod utils;
