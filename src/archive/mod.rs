pub mod remote;
pub mod temp_manager;

pub use remote::{populate_if_empty, HttpIndexSource, RemoteSource};
pub use temp_manager::TempFileManager;

use std::path::{Path, PathBuf};

use crate::error::Result;

/// Archive files directly inside `dir` with the given extension, sorted by name.
pub fn discover_archives(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut archives = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file()
            && path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
        {
            archives.push(path);
        }
    }

    archives.sort();
    Ok(archives)
}
