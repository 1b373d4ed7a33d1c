//! The compiled form of a script: a tree of [`CodeUnit`]s for a small
//! stack machine.

use serde::{Deserialize, Serialize};

use crate::compiler::ast::{BinOp, CompOp, UnaryOp};

/// Name given to the top-level unit of every module.
pub const MODULE_UNIT_NAME: &str = "<module>";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub name: String,
    /// Diagnostic label of the source, e.g. `<frozen greet>`.
    pub filename: String,
    pub params: Vec<String>,
    pub consts: Vec<Constant>,
    pub names: Vec<String>,
    pub code: Vec<Instr>,
    /// Source line of every instruction, same length as `code`.
    pub lines: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    None,
    Bool(bool),
    Int(i64),
    Str(String),
    Code(Box<CodeUnit>),
}

/// Jump operands are absolute instruction indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instr {
    LoadConst(u32),
    LoadName(u32),
    StoreName(u32),
    LoadAttr(u32),
    ImportName(u32),
    BinaryOp(BinOp),
    UnaryOp(UnaryOp),
    Compare(CompOp),
    Jump(u32),
    PopJumpIfFalse(u32),
    PopJumpIfTrue(u32),
    JumpIfFalseOrPop(u32),
    JumpIfTrueOrPop(u32),
    Call(u32),
    /// Operand indexes a `Constant::Code`.
    MakeFunction(u32),
    Pop,
    Return,
    RaiseAssert { with_message: bool },
}

impl CodeUnit {
    pub fn new(name: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: filename.into(),
            params: Vec::new(),
            consts: Vec::new(),
            names: Vec::new(),
            code: Vec::new(),
            lines: Vec::new(),
        }
    }

    pub fn line_at(&self, pc: usize) -> u32 {
        self.lines.get(pc).copied().unwrap_or(0)
    }

    /// Every unit in this tree, depth first, starting with `self`.
    pub fn units(&self) -> Vec<&CodeUnit> {
        let mut out = vec![self];
        for c in &self.consts {
            if let Constant::Code(inner) = c {
                out.extend(inner.units());
            }
        }
        out
    }
}
