//! Output files written through a tmp file and renamed into place

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Buffered file writer with atomic tmp→rename.
///
/// Dropping without [`commit`](AtomicFile::commit) leaves only the `.tmp` file;
/// the final path is never half-written.
pub struct AtomicFile {
    writer: BufWriter<File>,
    tmp_path: PathBuf,
    final_path: PathBuf,
}

impl std::fmt::Debug for AtomicFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomicFile")
            .field("final_path", &self.final_path)
            .finish_non_exhaustive()
    }
}

impl AtomicFile {
    /// Create `<path>.tmp`, creating parent directories as needed
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let final_path = path.as_ref().to_path_buf();
        if let Some(parent) = final_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp_name = final_path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = final_path.with_file_name(tmp_name);

        // Clean up stale tmp file
        if tmp_path.exists() {
            fs::remove_file(&tmp_path)?;
        }

        let file = File::create(&tmp_path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(256 * 1024, file),
            tmp_path,
            final_path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.final_path
    }

    /// Flush and atomically rename tmp → final. Returns bytes written.
    pub fn commit(self) -> io::Result<u64> {
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        let size = file.metadata()?.len();
        drop(file);
        fs::rename(&self.tmp_path, &self.final_path)?;
        Ok(size)
    }

    /// Drop the tmp file without touching the final path
    pub fn discard(self) -> io::Result<()> {
        drop(self.writer);
        fs::remove_file(&self.tmp_path)
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Remove stale .tmp files in the output directory
pub fn cleanup_tmp_files(output_dir: &Path) -> io::Result<()> {
    if !output_dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(output_dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == "tmp") {
            log::warn!("Removing stale tmp file: {}", path.display());
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_renames_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out.csv");
        let mut file = AtomicFile::create(&path).unwrap();
        file.write_all(b"_id\na\n").unwrap();
        assert!(!path.exists());
        assert!(dir.path().join("nested/out.csv.tmp").exists());

        let size = file.commit().unwrap();
        assert_eq!(size, 6);
        assert_eq!(fs::read_to_string(&path).unwrap(), "_id\na\n");
        assert!(!dir.path().join("nested/out.csv.tmp").exists());
    }

    #[test]
    fn dropped_file_leaves_final_path_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "previous").unwrap();
        {
            let mut file = AtomicFile::create(&path).unwrap();
            file.write_all(b"partial").unwrap();
        }
        assert_eq!(fs::read_to_string(&path).unwrap(), "previous");
    }

    #[test]
    fn discard_removes_tmp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let file = AtomicFile::create(&path).unwrap();
        file.discard().unwrap();
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn cleanup_tmp_files_removes_only_tmp() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.tmp"), b"stale").unwrap();
        fs::write(dir.path().join("b.csv"), b"keep").unwrap();
        cleanup_tmp_files(dir.path()).unwrap();
        assert!(!dir.path().join("a.tmp").exists());
        assert!(dir.path().join("b.csv").exists());
    }

    #[test]
    fn cleanup_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        cleanup_tmp_files(&dir.path().join("nope")).unwrap();
    }
}
