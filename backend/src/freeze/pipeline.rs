use std::path::PathBuf;

use tracing::{info, instrument};

use crate::freeze::{
    emitter,
    label::Label,
    loader,
    session::{Session, SessionConfig},
    toolchain::{Compiler, Serializer},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreezeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub module: String,
}

/// Freeze `request.input` into `request.output` with the script toolchain.
pub fn freeze(request: &FreezeRequest, config: SessionConfig) -> miette::Result<()> {
    let session = Session::script(config);
    freeze_with(&session, request)
}

/// Load, compile, marshal and emit one module.
///
/// The module name is validated before anything is read. The output file is
/// only touched once marshalling has succeeded.
#[instrument(skip_all, fields(module = %request.module))]
pub fn freeze_with<C, S>(session: &Session<C, S>, request: &FreezeRequest) -> miette::Result<()>
where
    C: Compiler,
    S: Serializer<C::Unit>,
{
    let label = Label::for_module(&request.module)?;

    let source = loader::load(&request.input)?;
    let unit = session.compile(&source, &label);
    drop(source);
    let marshalled = session.marshal(unit?, &request.module)?;

    emitter::emit(&request.output, &request.module, marshalled.as_bytes())?;
    info!(
        bytes = marshalled.len(),
        output = %request.output.display(),
        "frozen"
    );
    Ok(())
}
