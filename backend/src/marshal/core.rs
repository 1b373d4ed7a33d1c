//! Binary image of a compiled [`CodeUnit`].
//!
//! Layout: [`MAGIC`], the format version as a little-endian `u32`, then the
//! `bincode` encoding of the unit tree. The encoding has no maps and no
//! padding, so equal units always produce equal bytes.

use tracing::trace;

use crate::{compiler::code::CodeUnit, marshal::error::MarshalError};

pub const MAGIC: &[u8; 4] = b"FRZN";
pub const FORMAT_VERSION: u32 = 1;
pub const HEADER_LEN: usize = MAGIC.len() + 4;

/// Serialize `unit` using format `version`.
pub fn dumps(unit: &CodeUnit, version: u32) -> Result<Vec<u8>, MarshalError> {
    if version != FORMAT_VERSION {
        return Err(MarshalError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    let payload = bincode::serialize(unit).map_err(MarshalError::Encode)?;
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&payload);

    trace!(bytes = out.len(), "marshalled {}", unit.name);
    Ok(out)
}

/// Inverse of [`dumps`].
pub fn loads(data: &[u8]) -> Result<CodeUnit, MarshalError> {
    if data.len() < HEADER_LEN {
        return Err(MarshalError::Truncated { len: data.len() });
    }
    let (magic, rest) = data.split_at(MAGIC.len());
    if magic != MAGIC {
        return Err(MarshalError::BadMagic);
    }
    let (version, payload) = rest.split_at(4);
    let version = u32::from_le_bytes([version[0], version[1], version[2], version[3]]);
    if version != FORMAT_VERSION {
        return Err(MarshalError::UnsupportedVersion {
            found: version,
            supported: FORMAT_VERSION,
        });
    }

    bincode::deserialize(payload).map_err(MarshalError::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::core::{CompileOptions, compile};

    fn unit(src: &str) -> CodeUnit {
        compile(src, "<frozen m>", CompileOptions::default()).unwrap()
    }

    #[test]
    fn image_starts_with_header() {
        let data = dumps(&unit("print(1)\n"), FORMAT_VERSION).unwrap();
        assert_eq!(&data[..4], MAGIC);
        assert_eq!(&data[4..8], &FORMAT_VERSION.to_le_bytes());
    }

    #[test]
    fn loads_restores_nested_units() {
        let original = unit("def f(x):\n    def g():\n        return 'inner'\n    return g\n");
        let restored = loads(&dumps(&original, FORMAT_VERSION).unwrap()).unwrap();
        assert_eq!(restored, original);
        assert_eq!(restored.units().len(), 3);
    }

    #[test]
    fn encoding_is_deterministic() {
        let src = "a = 'x'\nb = 2\nprint(a, b)\n";
        let first = dumps(&unit(src), FORMAT_VERSION).unwrap();
        let second = dumps(&unit(src), FORMAT_VERSION).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_program_image_is_small() {
        let data = dumps(&unit(""), FORMAT_VERSION).unwrap();
        assert!(data.len() < 128, "got {} bytes", data.len());
    }

    #[test]
    fn unknown_version_is_rejected_both_ways() {
        let err = dumps(&unit(""), 7).unwrap_err();
        assert!(matches!(
            err,
            MarshalError::UnsupportedVersion { found: 7, .. }
        ));

        let mut data = dumps(&unit(""), FORMAT_VERSION).unwrap();
        data[4] = 9;
        assert!(matches!(
            loads(&data),
            Err(MarshalError::UnsupportedVersion { found: 9, .. })
        ));
    }

    #[test]
    fn corrupt_images_are_rejected() {
        assert!(matches!(loads(b"FRZ"), Err(MarshalError::Truncated { len: 3 })));
        assert!(matches!(
            loads(b"NOPE\x01\x00\x00\x00"),
            Err(MarshalError::BadMagic)
        ));

        let data = dumps(&unit("x = 1\n"), FORMAT_VERSION).unwrap();
        assert!(matches!(
            loads(&data[..data.len() - 3]),
            Err(MarshalError::Decode(_))
        ));
    }
}
