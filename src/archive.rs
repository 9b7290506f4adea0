use std::fs::File;
use std::io::{Seek, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::error::BundleError;

/* ============================= ZIP ============================= */

pub struct ZipArchiveWriter<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
}

impl<W: Write + Seek> ZipArchiveWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            zip: ZipWriter::new(inner),
            options: SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated),
        }
    }

    pub fn add_entry(&mut self, path: &str, bytes: &[u8]) -> Result<(), BundleError> {
        self.zip.start_file(path, self.options)?;
        self.zip.write_all(bytes)?;
        Ok(())
    }

    pub fn finish(self) -> Result<W, BundleError> {
        Ok(self.zip.finish()?)
    }
}

/// Write `entries` to `dir/file_name` through a temporary file in the same directory,
/// so the final path only ever holds a complete archive.
pub fn write_zip_atomically<'a, I>(dir: &Path, file_name: &str, entries: I) -> Result<PathBuf, BundleError>
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let file: &File = tmp.as_file();
        let mut writer = ZipArchiveWriter::new(file);
        for (path, bytes) in entries {
            writer.add_entry(path, bytes)?;
        }
        writer.finish()?.sync_all()?;
    }
    let final_path = dir.join(file_name);
    tmp.persist(&final_path)?;
    Ok(final_path)
}

/* ============================= TESTS ============================= */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_zip_round_trip_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let entries: Vec<(&str, &[u8])> = vec![
            ("ns1/pod.p1.yaml", &b"kind: Pod\n"[..]),
            ("nodes.yaml", &b"- name: n1\n"[..]),
        ];
        let path = write_zip_atomically(dir.path(), "bundle.zip", entries).unwrap();
        assert_eq!(path, dir.path().join("bundle.zip"));

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.by_index(0).unwrap().name(), "ns1/pod.p1.yaml");
        let mut body = String::new();
        archive.by_name("nodes.yaml").unwrap().read_to_string(&mut body).unwrap();
        assert_eq!(body, "- name: n1\n");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        write_zip_atomically(dir.path(), "b.zip", Vec::<(&str, &[u8])>::new()).unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("b.zip")]);
    }

    #[test]
    fn test_writer_over_in_memory_cursor() {
        let mut writer = ZipArchiveWriter::new(std::io::Cursor::new(Vec::new()));
        writer.add_entry("a.txt", b"1").unwrap();
        let bytes = writer.finish().unwrap().into_inner();
        let archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
        assert_eq!(archive.file_names().collect::<Vec<_>>(), vec!["a.txt"]);
    }
}
