//! The two seams between the freeze pipeline and a concrete language
//! toolchain, and the implementations backed by this crate's compiler and
//! marshal format.

use crate::{
    compiler::{
        code::CodeUnit,
        core::{CompileOptions, compile_bytes},
    },
    freeze::loader::SourceText,
    marshal::{core::dumps, error::MarshalError},
};

/// Turns source text into a compiled unit.
pub trait Compiler {
    type Unit;

    /// `label` is only used to attribute diagnostics.
    fn compile(&self, source: &SourceText, label: &str) -> miette::Result<Self::Unit>;
}

/// Turns a compiled unit into bytes. Must be deterministic.
pub trait Serializer<U> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn encode(&self, unit: U, version: u32) -> Result<Vec<u8>, Self::Error>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptCompiler {
    pub options: CompileOptions,
}

impl ScriptCompiler {
    pub fn new(options: CompileOptions) -> Self {
        Self { options }
    }
}

impl Compiler for ScriptCompiler {
    type Unit = CodeUnit;

    fn compile(&self, source: &SourceText, label: &str) -> miette::Result<CodeUnit> {
        compile_bytes(source.as_bytes(), label, self.options)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptMarshaller;

impl Serializer<CodeUnit> for ScriptMarshaller {
    type Error = MarshalError;

    fn encode(&self, unit: CodeUnit, version: u32) -> Result<Vec<u8>, MarshalError> {
        dumps(&unit, version)
    }
}
