//! ZIP serialization of the assembled file list.

use crate::epub::EPUB_MIME_TYPE;
use crate::epub::book::FileEntry;
use crate::error::{AppError, Result};
use base64::{Engine, engine::general_purpose::STANDARD};
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// A finished package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    /// Archive bytes.
    pub bytes: Vec<u8>,
    /// Media type of `bytes`.
    pub mime_type: &'static str,
}

impl Blob {
    /// Size of the archive in bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the archive is empty.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Write the file list into an EPUB archive.
///
/// `mimetype` always goes first and uncompressed, since readers sniff it at a
/// fixed offset. Everything else is deflated in list order.
pub fn serialize(files: &[FileEntry]) -> Result<Blob> {
    let bytes = write_archive(files).map_err(|e| match e {
        AppError::Io(e) => AppError::Serialization(e.to_string()),
        AppError::Zip(e) => AppError::Serialization(e.to_string()),
        other => other,
    })?;
    tracing::debug!(entries = files.len(), bytes = bytes.len(), "Serialized archive");

    Ok(Blob {
        bytes,
        mime_type: EPUB_MIME_TYPE,
    })
}

fn write_archive(files: &[FileEntry]) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    let options_stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let options_deflate =
        SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mimetype = files
        .iter()
        .find(|f| f.path == "mimetype")
        .map(|f| f.content.as_str())
        .unwrap_or(EPUB_MIME_TYPE);
    zip.start_file("mimetype", options_stored)?;
    zip.write_all(mimetype.as_bytes())?;

    for file in files.iter().filter(|f| f.path != "mimetype") {
        zip.start_file(file.path.as_str(), options_deflate)?;
        if file.is_binary {
            let bytes = STANDARD.decode(file.content.trim()).map_err(|e| {
                AppError::Serialization(format!("invalid base64 in {}: {}", file.path, e))
            })?;
            zip.write_all(&bytes)?;
        } else {
            zip.write_all(file.content.as_bytes())?;
        }
    }

    Ok(zip.finish()?.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::ZipArchive;

    fn entry(path: &str, content: &str, is_binary: bool) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            content: content.to_string(),
            is_binary,
        }
    }

    fn read_entry(archive: &mut ZipArchive<Cursor<Vec<u8>>>, name: &str) -> Vec<u8> {
        let mut data = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut data).unwrap();
        data
    }

    #[test]
    fn mimetype_is_first_and_stored() {
        let files = vec![
            entry("META-INF/container.xml", "<container/>", false),
            entry("mimetype", EPUB_MIME_TYPE, false),
        ];
        let blob = serialize(&files).unwrap();
        assert_eq!(blob.mime_type, "application/epub+zip");

        let mut archive = ZipArchive::new(Cursor::new(blob.bytes)).unwrap();
        {
            let first = archive.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), CompressionMethod::Stored);
        }
        assert_eq!(read_entry(&mut archive, "mimetype"), b"application/epub+zip");
        assert_eq!(archive.len(), 2);
    }

    #[test]
    fn mimetype_is_added_when_missing() {
        let blob = serialize(&[entry("OEBPS/a.xhtml", "<html/>", false)]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(blob.bytes)).unwrap();
        assert_eq!(archive.by_index(0).unwrap().name(), "mimetype");
        assert_eq!(
            archive.by_index(1).unwrap().compression(),
            CompressionMethod::Deflated
        );
    }

    #[test]
    fn binary_entries_are_decoded() {
        let blob = serialize(&[entry("OEBPS/a.bin", "AAEC/w==", true)]).unwrap();
        let mut archive = ZipArchive::new(Cursor::new(blob.bytes)).unwrap();
        assert_eq!(read_entry(&mut archive, "OEBPS/a.bin"), [0u8, 1, 2, 255]);
    }

    #[test]
    fn invalid_base64_is_a_serialization_error() {
        let err = serialize(&[entry("OEBPS/a.bin", "not base64!", true)]).unwrap_err();
        assert!(matches!(err, AppError::Serialization(_)));
    }
}
