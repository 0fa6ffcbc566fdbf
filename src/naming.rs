//! Sequential capture file names.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Names captures `<prefix><n>.<extension>`, where `n` is the number of
/// files with that extension already in the directory.
///
/// Not safe against other processes writing into the same directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNamer {
    prefix: String,
    extension: String,
}

impl Default for FileNamer {
    fn default() -> Self {
        Self::new("picam_", "jpg")
    }
}

impl FileNamer {
    /// Create a namer for `prefix` and `extension` (without the dot).
    pub fn new(prefix: &str, extension: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            extension: extension.trim_start_matches('.').to_owned(),
        }
    }

    /// Number of existing artifacts in `directory`.
    pub fn count(&self, directory: &Path) -> io::Result<usize> {
        let suffix = format!(".{}", self.extension);
        let mut count = 0;
        for entry in fs::read_dir(directory)? {
            if entry?.file_name().to_string_lossy().ends_with(&suffix) {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Next free file name in `directory`.
    pub fn next_name(&self, directory: &Path) -> io::Result<String> {
        let n = self.count(directory)?;
        Ok(format!("{}{n}.{}", self.prefix, self.extension))
    }

    /// Full path for the next capture in `directory`.
    pub fn next_path(&self, directory: &Path) -> io::Result<PathBuf> {
        Ok(directory.join(self.next_name(directory)?))
    }
}
