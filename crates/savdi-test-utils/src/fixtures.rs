//! Sample files for scan tests.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::daemon::EICAR;

/// A temp directory holding one clean file and one EICAR file.
///
/// Everything is removed when this value is dropped.
pub struct SampleFiles {
    pub clean: PathBuf,
    pub eicar: PathBuf,
    dir: TempDir,
}

impl SampleFiles {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let clean = dir.path().join("clean.txt");
        let eicar = dir.path().join("eicar.txt");
        std::fs::write(&clean, b"Subject: hello\r\n\r\nnothing to see here\r\n")
            .expect("failed to write clean sample");
        std::fs::write(&eicar, EICAR).expect("failed to write eicar sample");
        Self { clean, eicar, dir }
    }

    /// The directory containing both samples.
    pub fn dir(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }
}

impl Default for SampleFiles {
    fn default() -> Self {
        Self::new()
    }
}
