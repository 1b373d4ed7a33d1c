use miette::Diagnostic;
use thiserror::Error;

/// What can go wrong while converting code units to and from bytes.
#[derive(Error, Debug, Diagnostic)]
pub enum MarshalError {
    #[error("unsupported marshal format version {found} (supported: {supported})")]
    #[diagnostic(code(freezec::marshal::version))]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("data is not a frozen code image (bad magic number)")]
    #[diagnostic(code(freezec::marshal::magic))]
    BadMagic,

    #[error("frozen code image is truncated ({len} bytes)")]
    #[diagnostic(code(freezec::marshal::truncated))]
    Truncated { len: usize },

    #[error("could not encode code unit")]
    #[diagnostic(code(freezec::marshal::encode))]
    Encode(#[source] bincode::Error),

    #[error("could not decode code unit")]
    #[diagnostic(code(freezec::marshal::decode))]
    Decode(#[source] bincode::Error),
}
