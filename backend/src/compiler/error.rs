use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// A construct that parses but has no meaning where it appears.
#[derive(Error, Debug, Diagnostic)]
#[error("{message}")]
#[diagnostic(code(freezec::compiler::semantics))]
pub struct SemanticError {
    #[source_code]
    pub source_code: NamedSource<String>,
    #[label("{label}")]
    pub span: SourceSpan,
    pub message: String,
    pub label: String,
}

impl SemanticError {
    pub fn new(
        filename: &str,
        full_src: &str,
        span: SourceSpan,
        label: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source_code: NamedSource::new(filename, full_src.to_owned()),
            span,
            label: label.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Diagnostic)]
#[error("{filename}: source is not valid UTF-8 (first bad byte at offset {offset})")]
#[diagnostic(
    code(freezec::compiler::encoding),
    help("bootstrap scripts must be UTF-8 encoded")
)]
pub struct EncodingError {
    pub filename: String,
    pub offset: usize,
}
