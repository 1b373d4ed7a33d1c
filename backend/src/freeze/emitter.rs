use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, instrument, warn};

use crate::freeze::error::FreezeError;

pub const HEADER: &str = "/* Auto-generated by freeze_module */";
pub const BYTES_PER_ROW: usize = 16;

/// Render `data` as the C array `M_<module>`.
pub fn write_array<W: Write>(out: &mut W, module: &str, data: &[u8]) -> io::Result<()> {
    writeln!(out, "{HEADER}")?;
    writeln!(out, "const unsigned char M_{module}[] = {{")?;
    for row in data.chunks(BYTES_PER_ROW) {
        out.write_all(b"    ")?;
        for byte in row {
            write!(out, "{byte},")?;
        }
        out.write_all(b"\n")?;
    }
    writeln!(out, "}};")?;
    Ok(())
}

/// Removes a partially written output file unless committed.
pub struct OutputGuard {
    path: PathBuf,
    committed: bool,
}

impl OutputGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            committed: false,
        }
    }

    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        if self.committed || !self.path.is_file() {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed partial output"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not remove partial output"),
        }
    }
}

/// Write the array for `module` to `path`, creating or truncating it.
/// On failure the file is removed again.
#[instrument(skip_all, fields(path = %path.display(), bytes = data.len()))]
pub fn emit(path: &Path, module: &str, data: &[u8]) -> Result<(), FreezeError> {
    let file = File::create(path).map_err(|source| FreezeError::OpenOutput {
        path: path.to_path_buf(),
        source,
    })?;
    emit_into(path, file, module, data)
}

/// Write through `sink`, which has just been opened at `path`. The output
/// may be a pipe or a device, so it is flushed but never synced.
fn emit_into<W: Write>(
    path: &Path,
    sink: W,
    module: &str,
    data: &[u8],
) -> Result<(), FreezeError> {
    let guard = OutputGuard::new(path);

    let write_err = |source: io::Error| FreezeError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut out = BufWriter::new(sink);
    write_array(&mut out, module, data).map_err(write_err)?;
    let mut sink = out.into_inner().map_err(|e| write_err(e.into_error()))?;
    sink.flush().map_err(write_err)?;
    drop(sink);

    guard.commit();
    debug!("emitted");
    Ok(())
}
