use std::{fs::File, io::Read, path::Path};

use tracing::{debug, instrument};

use crate::freeze::error::FreezeError;

/// Whole contents of an input file followed by a zero byte.
#[derive(Debug)]
pub struct SourceText {
    buf: Vec<u8>,
}

impl From<&[u8]> for SourceText {
    fn from(bytes: &[u8]) -> Self {
        let mut buf = Vec::with_capacity(bytes.len() + 1);
        buf.extend_from_slice(bytes);
        buf.push(0);
        SourceText { buf }
    }
}

impl From<&str> for SourceText {
    fn from(text: &str) -> Self {
        SourceText::from(text.as_bytes())
    }
}

impl SourceText {
    /// The file contents, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.buf.len() - 1]
    }

    /// The file contents including the trailing zero byte.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read `path` in one go. The size comes from the file metadata, and reading
/// fewer bytes than that is an error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load(path: &Path) -> Result<SourceText, FreezeError> {
    let mut file = File::open(path).map_err(|source| FreezeError::OpenInput {
        path: path.to_path_buf(),
        source,
    })?;
    let expected = file
        .metadata()
        .map_err(|source| FreezeError::Stat {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    let expected = usize::try_from(expected).map_err(|_| FreezeError::Alloc {
        size: usize::MAX,
    })?;
    let size = expected.checked_add(1).ok_or(FreezeError::Alloc { size: expected })?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(size)
        .map_err(|_| FreezeError::Alloc { size })?;

    let got = (&mut file)
        .take(expected as u64)
        .read_to_end(&mut buf)
        .map_err(|source| FreezeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    drop(file);
    if got != expected {
        return Err(FreezeError::ShortRead {
            path: path.to_path_buf(),
            got,
            expected,
        });
    }

    buf.push(0);
    debug!(bytes = expected, "loaded");
    Ok(SourceText { buf })
}
