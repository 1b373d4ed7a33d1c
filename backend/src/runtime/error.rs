use miette::Diagnostic;
use thiserror::Error;

use crate::marshal::error::MarshalError;

/// Failure raised while executing a code unit, attributed to the source
/// line of the failing instruction.
#[derive(Error, Debug, Diagnostic)]
#[error("{filename}, line {line}: {kind}")]
#[diagnostic(code(freezec::runtime::error))]
pub struct RuntimeError {
    pub filename: String,
    pub line: u32,
    #[source]
    pub kind: ErrorKind,
}

#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    #[error("TypeError: {0}")]
    Type(String),

    #[error("ZeroDivisionError: integer division or modulo by zero")]
    ZeroDivision,

    #[error("OverflowError: integer result out of range")]
    Overflow,

    #[error("AttributeError: {0}")]
    Attribute(String),

    #[error("AssertionError{}", .0.as_ref().map(|m| format!(": {m}")).unwrap_or_default())]
    Assertion(Option<String>),

    #[error("ImportError: {0}")]
    Import(String),

    #[error("ValueError: {0}")]
    Value(String),

    #[error("RecursionError: maximum recursion depth exceeded")]
    Recursion,

    #[error("malformed code unit: {0}")]
    BadCode(String),

    #[error("cannot load frozen module '{module}'")]
    BadImage {
        module: String,
        #[source]
        source: MarshalError,
    },

    #[error("cannot write output")]
    Output(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_location() {
        let err = RuntimeError {
            filename: "<frozen m>".into(),
            line: 3,
            kind: ErrorKind::Name("x".into()),
        };
        assert_eq!(
            err.to_string(),
            "<frozen m>, line 3: NameError: name 'x' is not defined"
        );
    }

    #[test]
    fn assertion_message_is_optional() {
        assert_eq!(ErrorKind::Assertion(None).to_string(), "AssertionError");
        assert_eq!(
            ErrorKind::Assertion(Some("bad".into())).to_string(),
            "AssertionError: bad"
        );
    }
}
