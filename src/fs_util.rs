use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::{Builder, TempDir};

use crate::error::JobError;

/// Scratch directory shared by all dataset pipelines of one run.
pub fn create_work_dir() -> Result<(TempDir, Utf8PathBuf), JobError> {
    let dir = Builder::new()
        .prefix("relief-jobs-")
        .tempdir()
        .map_err(|err| JobError::Filesystem(err.to_string()))?;
    let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf())
        .map_err(|_| JobError::Filesystem("non UTF-8 temporary directory".to_string()))?;
    Ok((dir, path))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), JobError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| JobError::Filesystem(err.to_string()))?;
    }
    let tmp_path = match path.extension() {
        Some(ext) => path.with_extension(format!("{ext}.tmp")),
        None => path.with_extension("tmp"),
    };
    fs::write(tmp_path.as_std_path(), content)
        .map_err(|err| JobError::Filesystem(err.to_string()))?;
    fs::rename(tmp_path.as_std_path(), path.as_std_path())
        .map_err(|err| JobError::Filesystem(err.to_string()))?;
    Ok(())
}

pub fn open_file(path: &Utf8Path) -> Result<fs::File, JobError> {
    fs::File::open(path.as_std_path())
        .map_err(|err| JobError::Filesystem(format!("open {path}: {err}")))
}
