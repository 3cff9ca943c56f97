//! Output zip archives.

use std::io::{Cursor, Write};

use crate::spec::{SpecArchiveEntry, XlsxError};

/// Pack `entries` into one deflated zip, preserving entry order.
pub fn write_zip_archive(entries: &[SpecArchiveEntry]) -> Result<Vec<u8>, XlsxError> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::<()>::default()
        .compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        writer.start_file(entry.name.as_str(), options)?;
        writer.write_all(&entry.bytes)?;
    }
    Ok(writer.finish()?.into_inner())
}

/// Entry names of a zip archive in central-directory order.
pub fn read_zip_entry_names(bytes: &[u8]) -> Result<Vec<String>, XlsxError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut l_names = Vec::with_capacity(archive.len());
    for idx in 0..archive.len() {
        l_names.push(archive.by_index(idx)?.name().to_string());
    }
    Ok(l_names)
}
