use tracing::{debug, trace};

use crate::{
    compiler::{
        code::CodeUnit, codegen::CodeBuilder, error::EncodingError, semantics::check_semantics,
    },
    lexer::core::lex,
    parser::core::parse,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileOptions {
    pub optimize: u8,
}

/// Compile raw source bytes. Fails on invalid UTF-8 before lexing.
pub fn compile_bytes(
    src: &[u8],
    label: &str,
    options: CompileOptions,
) -> miette::Result<CodeUnit> {
    let src = std::str::from_utf8(src).map_err(|e| EncodingError {
        filename: label.to_string(),
        offset: e.valid_up_to(),
    })?;
    compile(src, label, options)
}

/// Compile a whole program. `label` names the source in every diagnostic
/// and becomes the `filename` of each produced unit.
pub fn compile(src: &str, label: &str, options: CompileOptions) -> miette::Result<CodeUnit> {
    let tokens = lex(label, src)?;
    trace!(count = tokens.len(), "lexed");
    let ast = parse(label, src, &tokens)?;
    check_semantics(label, src, &ast)?;

    let unit = CodeBuilder::new(label)
        .with_optimize(options.optimize)
        .build(&ast);
    debug!(
        label,
        statements = ast.body.len(),
        units = unit.units().len(),
        "compiled"
    );
    Ok(unit)
}
