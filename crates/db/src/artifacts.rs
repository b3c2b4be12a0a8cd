use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use freightq_core::ports::{ArtifactError, ArtifactStore};

/// Writes generated documents to a scratch directory, then copies them into
/// the archive directory.
#[derive(Clone, Debug)]
pub struct FsArtifactStore {
    transient_dir: PathBuf,
    archive_dir: PathBuf,
}

impl FsArtifactStore {
    pub fn new(transient_dir: impl Into<PathBuf>, archive_dir: impl Into<PathBuf>) -> Self {
        Self { transient_dir: transient_dir.into(), archive_dir: archive_dir.into() }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }
}

fn artifact_error(path: &Path, error: io::Error) -> ArtifactError {
    ArtifactError { path: path.display().to_string(), message: error.to_string() }
}

/// Creates `target`, failing if it already exists. A write that fails after
/// the file was created removes it again.
fn write_new(target: &Path, mut source: impl Read) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(target)?;
    let written = io::copy(&mut source, &mut file)
        .and_then(|_| file.flush())
        .and_then(|()| file.sync_all());
    if let Err(error) = written {
        drop(file);
        if let Err(cleanup) = fs::remove_file(target) {
            debug!(
                event_name = "artifacts.cleanup_failed",
                path = %target.display(),
                error = %cleanup,
                "partial artifact left behind"
            );
        }
        return Err(error);
    }
    Ok(())
}

impl ArtifactStore for FsArtifactStore {
    fn write_transient(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, ArtifactError> {
        fs::create_dir_all(&self.transient_dir)
            .map_err(|error| artifact_error(&self.transient_dir, error))?;
        let path = self.transient_dir.join(file_name);
        write_new(&path, bytes).map_err(|error| artifact_error(&path, error))?;
        Ok(path)
    }

    fn archive(&self, transient: &Path) -> Result<PathBuf, ArtifactError> {
        let file_name = transient.file_name().ok_or_else(|| ArtifactError {
            path: transient.display().to_string(),
            message: "path has no file name".to_owned(),
        })?;
        fs::create_dir_all(&self.archive_dir)
            .map_err(|error| artifact_error(&self.archive_dir, error))?;
        let target = self.archive_dir.join(file_name);
        let source = File::open(transient).map_err(|error| artifact_error(transient, error))?;
        write_new(&target, source).map_err(|error| artifact_error(&target, error))?;
        Ok(target)
    }

    fn discard(&self, path: &Path) {
        if let Err(error) = fs::remove_file(path) {
            debug!(
                event_name = "artifacts.discard_failed",
                path = %path.display(),
                error = %error,
                "artifact cleanup skipped"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use freightq_core::ports::ArtifactStore;

    use super::FsArtifactStore;

    #[test]
    fn archive_copies_transient_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path().join("tmp"), dir.path().join("contracts"));

        let transient = store.write_transient("contract_1.html", b"<p>ok</p>").expect("written");
        let archived = store.archive(&transient).expect("archived");

        assert_eq!(archived, dir.path().join("contracts").join("contract_1.html"));
        assert_eq!(fs::read(&archived).expect("read"), b"<p>ok</p>");
        assert!(transient.is_file());

        store.discard(&transient);
        store.discard(&transient);
        assert!(!transient.exists());
    }

    #[test]
    fn archive_never_overwrites_an_existing_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path().join("tmp"), dir.path().join("contracts"));
        fs::create_dir_all(dir.path().join("contracts")).expect("archive dir");
        let existing = dir.path().join("contracts").join("contract_1.html");
        fs::write(&existing, b"signed").expect("existing contract");

        let transient = store.write_transient("contract_1.html", b"draft").expect("written");
        let error = store.archive(&transient).expect_err("target exists");

        assert!(error.path.ends_with("contract_1.html"));
        assert_eq!(fs::read(&existing).expect("read"), b"signed");
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        struct BrokenReader;

        impl std::io::Read for BrokenReader {
            fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
                Err(std::io::Error::other("disk went away"))
            }
        }

        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("contract_2.html");

        let error = super::write_new(&target, BrokenReader).expect_err("reader fails");
        assert_eq!(error.to_string(), "disk went away");
        assert!(!target.exists());
    }

    #[test]
    fn archive_of_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FsArtifactStore::new(dir.path().join("tmp"), dir.path().join("contracts"));

        let error = store.archive(Path::new("/nonexistent/contract.html")).expect_err("missing");
        assert!(error.path.ends_with("contract.html"));
    }
}
