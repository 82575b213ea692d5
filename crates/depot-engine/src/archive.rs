//! Zip archives holding a single tabular file.
//!
//! The entry timestamp is pinned, so archiving the same bytes twice produces
//! the same archive.

use std::io::{Cursor, Read as _, Write as _};

use depot_core::{Checksum, Error, Result};
use tracing::debug;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

fn zip_error(context: &str) -> impl FnOnce(zip::result::ZipError) -> Error + '_ {
  move |e| Error::storage(context, std::io::Error::other(e))
}

/// Compress `tabular` into an archive with one entry named
/// `<checksum>.csv`.
pub fn compress(checksum: &Checksum, tabular: &[u8]) -> Result<Vec<u8>> {
  let options = SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(zip::DateTime::default());

  let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
  writer
    .start_file(format!("{checksum}.csv"), options)
    .map_err(zip_error("starting archive entry"))?;
  writer
    .write_all(tabular)
    .map_err(|e| Error::storage("writing archive entry", e))?;
  let archive = writer
    .finish()
    .map_err(zip_error("finishing archive"))?
    .into_inner();

  debug!(%checksum, raw = tabular.len(), compressed = archive.len(), "archived");
  Ok(archive)
}

/// Return the contents of the first `.csv` entry of `archive`.
pub fn extract(archive: &[u8]) -> Result<Vec<u8>> {
  let mut zip =
    ZipArchive::new(Cursor::new(archive)).map_err(zip_error("reading archive"))?;

  for index in 0..zip.len() {
    let mut file = zip
      .by_index(index)
      .map_err(zip_error("reading archive entry"))?;
    if file.is_dir() || !file.name().ends_with(".csv") {
      continue;
    }
    let mut contents = Vec::with_capacity(file.size() as usize);
    file
      .read_to_end(&mut contents)
      .map_err(|e| Error::storage("decompressing archive entry", e))?;
    return Ok(contents);
  }

  Err(Error::NotFound("archive contains no csv entry".into()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn extract_returns_what_was_compressed() {
    let raw = b"id,name\n1,alpha\n2,beta\n".repeat(50);
    let sum = Checksum::of(&raw);
    let archive = compress(&sum, &raw).unwrap();
    assert!(archive.len() < raw.len());
    assert_eq!(extract(&archive).unwrap(), raw);
  }

  #[test]
  fn archiving_is_deterministic() {
    let raw = b"a,b\n1,2\n";
    let sum = Checksum::of(raw);
    assert_eq!(compress(&sum, raw).unwrap(), compress(&sum, raw).unwrap());
  }

  #[test]
  fn garbage_is_a_storage_error() {
    let err = extract(b"definitely not a zip").unwrap_err();
    assert_eq!(err.kind(), depot_core::ErrorKind::Storage);
  }
}
