//! Gzip helpers for archiving record files
//!
//! Neither function is used by the duplicate detector; they back the
//! `dupcode compress` subcommand.

use crate::error::{CommonError, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

/// Gzip-compress a buffer with the default compression level
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Replace the extension of `name` with `ext`
///
/// Only the final path component is inspected, so `data.v1/codes` becomes
/// `data.v1/codes.gz` rather than `data.gz`. A leading dot (`.codes`) is part of
/// the name, not an extension. Names without an extension get `ext` appended.
pub fn derive_output_name(name: &str, ext: &str) -> Result<String> {
    if name.is_empty() {
        return Err(CommonError::invalid_argument("file name not specified"));
    }
    let ext = ext.trim_start_matches('.');
    if ext.is_empty() {
        return Err(CommonError::invalid_argument("extension not specified"));
    }

    let file_start = name.rfind(['/', '\\']).map_or(0, |idx| idx + 1);
    let stem = match name[file_start..].rfind('.') {
        Some(idx) if idx > 0 => &name[..file_start + idx],
        _ => name,
    };

    Ok(format!("{stem}.{ext}"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn test_compress_produces_gzip_stream() {
        let input = b"barcode,code\nx,100\ny,200\n".repeat(64);
        let compressed = compress(&input).unwrap();

        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);
        assert!(compressed.len() < input.len());

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_compress_empty_input() {
        let compressed = compress(&[]).unwrap();
        assert!(!compressed.is_empty());
    }

    #[test]
    fn test_derive_output_name_replaces_extension() {
        assert_eq!(derive_output_name("test.csv", "gz").unwrap(), "test.gz");
        assert_eq!(derive_output_name("test.tony.file", "gz").unwrap(), "test.tony.gz");
        assert_eq!(derive_output_name("test.csv", ".gz").unwrap(), "test.gz");
    }

    #[test]
    fn test_derive_output_name_without_extension() {
        assert_eq!(derive_output_name("codes", "gz").unwrap(), "codes.gz");
        assert_eq!(derive_output_name(".codes", "gz").unwrap(), ".codes.gz");
        assert_eq!(
            derive_output_name("data.v1/codes", "gz").unwrap(),
            "data.v1/codes.gz"
        );
    }

    #[test]
    fn test_derive_output_name_rejects_empty_arguments() {
        assert!(matches!(
            derive_output_name("", "gz"),
            Err(CommonError::InvalidArgument(_))
        ));
        assert!(matches!(
            derive_output_name("test.csv", ""),
            Err(CommonError::InvalidArgument(_))
        ));
        assert!(matches!(
            derive_output_name("test.csv", "."),
            Err(CommonError::InvalidArgument(_))
        ));
    }
}
