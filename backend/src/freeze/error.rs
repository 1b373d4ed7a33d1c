use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::freeze::label::MAX_LABEL_LEN;

/// Failures of the freeze pipeline that are not compiler diagnostics.
/// Compiler errors are passed through untouched so their source snippet
/// reaches the operator.
#[derive(Error, Debug, Diagnostic)]
pub enum FreezeError {
    #[error("cannot open '{}' for reading", path.display())]
    #[diagnostic(code(freezec::load::open))]
    OpenInput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot stat '{}'", path.display())]
    #[diagnostic(code(freezec::load::stat))]
    Stat {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read '{}'", path.display())]
    #[diagnostic(code(freezec::load::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read too short: got {got} instead of {expected} bytes")]
    #[diagnostic(code(freezec::load::short_read))]
    ShortRead {
        path: PathBuf,
        got: usize,
        expected: usize,
    },

    #[error("could not allocate {size} bytes")]
    #[diagnostic(code(freezec::load::alloc))]
    Alloc { size: usize },

    #[error("label for module '{module}' is {len} bytes long (at most {} allowed)", MAX_LABEL_LEN)]
    #[diagnostic(
        code(freezec::args::label_too_long),
        help("choose a shorter module name")
    )]
    LabelTooLong { module: String, len: usize },

    #[error("invalid module name '{module}'")]
    #[diagnostic(
        code(freezec::args::module_name),
        help("the name becomes part of the C identifier `M_<name>`; use only ASCII letters, digits and '_'")
    )]
    InvalidModuleName { module: String },

    #[error("invalid value '{value}' for {var}")]
    #[diagnostic(code(freezec::config), help("expected an integer between 0 and 255"))]
    Config { var: &'static str, value: String },

    #[error("failed to marshal code for '{module}'")]
    #[diagnostic(code(freezec::marshal))]
    Marshal {
        module: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("cannot open '{}' for writing", path.display())]
    #[diagnostic(code(freezec::emit::open))]
    OpenOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("error when writing to '{}'", path.display())]
    #[diagnostic(code(freezec::emit::write))]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
