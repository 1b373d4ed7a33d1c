use std::marker::PhantomData;

use tracing::{debug, debug_span};

use crate::{
    compiler::core::CompileOptions,
    freeze::{
        error::FreezeError,
        label::Label,
        loader::SourceText,
        toolchain::{Compiler, ScriptCompiler, ScriptMarshaller, Serializer},
    },
    marshal::core::FORMAT_VERSION,
};

/// Environment variable read by [`SessionConfig::apply_env`].
pub const OPTIMIZE_VAR: &str = "FREEZE_OPTIMIZE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub optimize: u8,
    /// Whether the process environment may influence the session at all.
    pub use_environment: bool,
    pub format_version: u32,
}

impl SessionConfig {
    /// The configuration used for freezing: nothing outside the input file
    /// affects the result.
    pub fn isolated() -> Self {
        Self {
            optimize: 0,
            use_environment: false,
            format_version: FORMAT_VERSION,
        }
    }

    /// An environment-aware configuration with `FREEZE_OPTIMIZE` applied.
    pub fn from_env() -> Result<Self, FreezeError> {
        Self {
            use_environment: true,
            ..Self::isolated()
        }
        .apply_env()
    }

    pub fn apply_env(self) -> Result<Self, FreezeError> {
        self.apply_env_with(|var| std::env::var(var).ok())
    }

    /// Like [`SessionConfig::apply_env`] with a custom variable lookup. Does
    /// nothing unless `use_environment` is set.
    pub fn apply_env_with(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, FreezeError> {
        if !self.use_environment {
            return Ok(self);
        }
        if let Some(value) = lookup(OPTIMIZE_VAR) {
            self.optimize = value.trim().parse().map_err(|_| FreezeError::Config {
                var: OPTIMIZE_VAR,
                value,
            })?;
        }
        Ok(self)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::isolated()
    }
}

/// The embedding environment a freeze runs in. Torn down when dropped.
///
/// Everything the session produces borrows it, so it cannot be torn down
/// while a compiled unit or marshalled buffer is still alive:
///
/// ```compile_fail
/// use freezec::freeze::{label::Label, loader::SourceText, session::{Session, SessionConfig}};
///
/// let session = Session::script(SessionConfig::isolated());
/// let label = Label::for_module("m").unwrap();
/// let unit = session.compile(&SourceText::from("x = 1\n"), &label).unwrap();
/// drop(session);
/// drop(unit);
/// ```
pub struct Session<C, S> {
    config: SessionConfig,
    compiler: C,
    serializer: S,
}

pub type ScriptSession = Session<ScriptCompiler, ScriptMarshaller>;

/// A compiled unit owned by the pipeline until it is marshalled.
#[derive(Debug)]
pub struct CompiledUnit<'s, U> {
    unit: U,
    _session: PhantomData<&'s ()>,
}

/// Marshalled bytes, alive until they have been emitted.
#[derive(Debug)]
pub struct Marshalled<'s> {
    bytes: Vec<u8>,
    _session: PhantomData<&'s ()>,
}

impl ScriptSession {
    pub fn script(config: SessionConfig) -> Self {
        let compiler = ScriptCompiler::new(CompileOptions {
            optimize: config.optimize,
        });
        Session::new(config, compiler, ScriptMarshaller)
    }
}

impl<C, S> Session<C, S>
where
    C: Compiler,
    S: Serializer<C::Unit>,
{
    pub fn new(config: SessionConfig, compiler: C, serializer: S) -> Self {
        debug!(
            optimize = config.optimize,
            use_environment = config.use_environment,
            version = config.format_version,
            "session initialized"
        );
        Self {
            config,
            compiler,
            serializer,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn compile(
        &self,
        source: &SourceText,
        label: &Label,
    ) -> miette::Result<CompiledUnit<'_, C::Unit>> {
        let _span = debug_span!("compile", %label).entered();
        let unit = self.compiler.compile(source, label.as_str())?;
        Ok(CompiledUnit {
            unit,
            _session: PhantomData,
        })
    }

    /// Consumes `unit` whether or not encoding succeeds.
    pub fn marshal(
        &self,
        unit: CompiledUnit<'_, C::Unit>,
        module: &str,
    ) -> Result<Marshalled<'_>, FreezeError> {
        let _span = debug_span!("marshal", module).entered();
        let bytes = self
            .serializer
            .encode(unit.unit, self.config.format_version)
            .map_err(|source| FreezeError::Marshal {
                module: module.to_string(),
                source: Box::new(source),
            })?;
        debug!(
            bytes = bytes.len(),
            prefix = %hex::encode(&bytes[..bytes.len().min(16)]),
            "marshalled"
        );
        Ok(Marshalled {
            bytes,
            _session: PhantomData,
        })
    }
}

impl<U> CompiledUnit<'_, U> {
    pub fn get(&self) -> &U {
        &self.unit
    }
}

impl Marshalled<'_> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl<C, S> Drop for Session<C, S> {
    fn drop(&mut self) {
        debug!("session finalized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::core::MAGIC;

    #[test]
    fn isolated_config_ignores_environment() {
        let config = SessionConfig::isolated()
            .apply_env_with(|_| Some("2".to_string()))
            .unwrap();
        assert_eq!(config.optimize, 0);
    }

    #[test]
    fn environment_sets_optimize_level() {
        let config = SessionConfig {
            use_environment: true,
            ..SessionConfig::isolated()
        }
        .apply_env_with(|var| (var == OPTIMIZE_VAR).then(|| " 1 ".to_string()))
        .unwrap();
        assert_eq!(config.optimize, 1);
    }

    #[test]
    fn bad_environment_value_is_reported() {
        let err = SessionConfig {
            use_environment: true,
            ..SessionConfig::isolated()
        }
        .apply_env_with(|_| Some("high".to_string()))
        .unwrap_err();
        assert_eq!(err.to_string(), "invalid value 'high' for FREEZE_OPTIMIZE");
    }

    #[test]
    fn compiles_and_marshals() {
        let session = Session::script(SessionConfig::isolated());
        let label = Label::for_module("m").unwrap();
        let unit = session
            .compile(&SourceText::from("print(1)\n"), &label)
            .unwrap();
        assert_eq!(unit.get().filename, "<frozen m>");
        let bytes = session.marshal(unit, "m").unwrap();
        assert_eq!(&bytes.as_bytes()[..4], MAGIC);
    }

    #[test]
    fn optimize_level_reaches_the_compiler() {
        let session = Session::script(SessionConfig {
            optimize: 1,
            ..SessionConfig::isolated()
        });
        let label = Label::for_module("m").unwrap();
        let unit = session
            .compile(&SourceText::from("assert False\n"), &label)
            .unwrap();
        assert_eq!(unit.get().code.len(), 2);
    }

    #[test]
    fn unsupported_version_is_a_marshal_error() {
        let session = Session::script(SessionConfig {
            format_version: 99,
            ..SessionConfig::isolated()
        });
        let label = Label::for_module("m").unwrap();
        let unit = session.compile(&SourceText::from(""), &label).unwrap();
        let err = session.marshal(unit, "m").unwrap_err();
        assert_eq!(err.to_string(), "failed to marshal code for 'm'");
    }
}
