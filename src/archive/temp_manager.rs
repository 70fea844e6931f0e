use crate::error::{ProcessingError, Result};
use crate::utils::constants::MEASUREMENT_ENTRY_PREFIX;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

/// Owns a temporary directory holding entries extracted from an archive.
///
/// Everything extracted is removed when the manager is dropped.
pub struct TempFileManager {
    temp_dir: TempDir,
}

impl TempFileManager {
    pub fn new() -> Result<Self> {
        let temp_dir = TempDir::new().map_err(|e| {
            ProcessingError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to create temporary directory: {}", e),
            ))
        })?;

        Ok(Self { temp_dir })
    }

    pub fn temp_dir_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Extract the archive's data entry and return its path inside the temp dir.
    pub fn extract_single_entry(&self, zip_path: &Path) -> Result<PathBuf> {
        let file = File::open(zip_path)?;
        let mut archive = ZipArchive::new(file)?;

        let entry_name = locate_data_entry(&mut archive).ok_or_else(|| {
            ProcessingError::InvalidFormat(format!(
                "Archive '{}' does not contain exactly one data entry",
                zip_path.display()
            ))
        })?;

        let mut zip_file = archive.by_name(&entry_name)?;

        // Flatten any directory component so the entry lands directly in the temp dir
        let file_name = Path::new(&entry_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("entry.txt"));
        let dest_path = self.temp_dir.path().join(file_name);

        let mut dest_file = File::create(&dest_path)?;
        let mut writer = BufWriter::new(&mut dest_file);
        std::io::copy(&mut zip_file, &mut writer)?;
        writer.flush()?;

        Ok(dest_path)
    }
}

/// The single file entry of the archive, or the single `produkt_*` entry when the
/// archive also ships metadata files next to it.
fn locate_data_entry<R: std::io::Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Option<String> {
    let files: Vec<String> = archive
        .file_names()
        .filter(|name| !name.ends_with('/'))
        .map(str::to_string)
        .collect();

    if files.len() == 1 {
        return files.into_iter().next();
    }

    let mut products = files.into_iter().filter(|name| {
        Path::new(name)
            .file_name()
            .and_then(|f| f.to_str())
            .is_some_and(|f| f.starts_with(MEASUREMENT_ENTRY_PREFIX))
    });

    match (products.next(), products.next()) {
        (Some(entry), None) => Some(entry),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::write::FileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut zip = ZipWriter::new(file);
        for (name, content) in entries {
            zip.start_file(*name, FileOptions::default()).unwrap();
            zip.write_all(content.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extract_single_entry() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("10minutenwerte_TU_01048_akt.zip");
        write_zip(&zip_path, &[("produkt_zehn_min_tu_01048.txt", "header\nline\n")]);

        let manager = TempFileManager::new()?;
        let extracted = manager.extract_single_entry(&zip_path)?;
        assert!(extracted.starts_with(manager.temp_dir_path()));

        let mut content = String::new();
        File::open(&extracted)?.read_to_string(&mut content)?;
        assert_eq!(content, "header\nline\n");
        Ok(())
    }

    #[test]
    fn test_extract_prefers_product_entry_next_to_metadata() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("archive.zip");
        write_zip(
            &zip_path,
            &[
                ("Metadaten_Geographie_01048.txt", "meta"),
                ("produkt_zehn_min_tu_01048.txt", "data"),
            ],
        );

        let manager = TempFileManager::new()?;
        let extracted = manager.extract_single_entry(&zip_path)?;
        assert!(extracted.ends_with("produkt_zehn_min_tu_01048.txt"));
        Ok(())
    }

    #[test]
    fn test_extract_rejects_ambiguous_archive() -> Result<()> {
        let dir = TempDir::new()?;
        let zip_path = dir.path().join("archive.zip");
        write_zip(&zip_path, &[("a.txt", "a"), ("b.txt", "b")]);

        let manager = TempFileManager::new()?;
        assert!(matches!(
            manager.extract_single_entry(&zip_path),
            Err(ProcessingError::InvalidFormat(_))
        ));
        Ok(())
    }

    #[test]
    fn test_temp_dir_removed_on_drop() -> Result<()> {
        let manager = TempFileManager::new()?;
        let path = manager.temp_dir_path().to_path_buf();
        assert!(path.exists());
        drop(manager);
        assert!(!path.exists());
        Ok(())
    }
}
