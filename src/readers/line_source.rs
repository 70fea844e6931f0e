use crate::archive::TempFileManager;
use crate::error::Result;
use crate::models::RecordKind;
use crate::utils::constants::DEFAULT_BUFFER_SIZE;
use encoding_rs::{UTF_8, WINDOWS_1252};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One non-empty data line and its 1-based position in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceLine {
    pub number: usize,
    pub text: String,
}

/// Lazy, single-pass sequence of the data lines of a source file.
///
/// Header lines and blank lines are never yielded. For archives the data entry is
/// extracted into a temp dir owned by the source, so the file handle and the
/// extracted copy are released together when the source is exhausted or dropped.
pub struct LineSource {
    reader: Option<BufReader<File>>,
    path: PathBuf,
    header_lines: usize,
    line_number: usize,
    buf: Vec<u8>,
    _extracted: Option<TempFileManager>,
}

impl LineSource {
    /// Open a plain station description file, skipping its two header lines.
    pub fn open_station_file(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::from_file(file, path, RecordKind::Station, None))
    }

    /// Open the single data entry of an archive, skipping its one header line.
    ///
    /// The whole entry is extracted up front, before the first line is read.
    pub fn open_archive(path: &Path) -> Result<Self> {
        let manager = TempFileManager::new()?;
        let entry_path = manager.extract_single_entry(path)?;
        let file = File::open(&entry_path)?;
        Ok(Self::from_file(
            file,
            path,
            RecordKind::Measurement,
            Some(manager),
        ))
    }

    pub fn open(path: &Path, kind: RecordKind) -> Result<Self> {
        match kind {
            RecordKind::Station => Self::open_station_file(path),
            RecordKind::Measurement => Self::open_archive(path),
        }
    }

    fn from_file(
        file: File,
        path: &Path,
        kind: RecordKind,
        extracted: Option<TempFileManager>,
    ) -> Self {
        Self {
            reader: Some(BufReader::with_capacity(DEFAULT_BUFFER_SIZE, file)),
            path: path.to_path_buf(),
            header_lines: kind.header_lines(),
            line_number: 0,
            buf: Vec::new(),
            _extracted: extracted,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn release(&mut self) {
        self.reader = None;
        self._extracted = None;
    }
}

impl Iterator for LineSource {
    type Item = Result<SourceLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let reader = self.reader.as_mut()?;
            self.buf.clear();

            match reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.release();
                    return None;
                }
                Ok(_) => {
                    self.line_number += 1;

                    if self.line_number <= self.header_lines {
                        continue;
                    }

                    let text = decode_text(&self.buf);
                    if text.trim().is_empty() {
                        continue;
                    }

                    return Some(Ok(SourceLine {
                        number: self.line_number,
                        text,
                    }));
                }
                Err(e) => {
                    self.release();
                    return Some(Err(e.into()));
                }
            }
        }
    }
}

/// Decode one raw line as UTF-8, falling back to Windows-1252 for legacy Latin-1 files.
pub fn decode_text(bytes: &[u8]) -> String {
    let mut end = bytes.len();
    while end > 0 && matches!(bytes[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    let bytes = &bytes[..end];

    match UTF_8.decode_without_bom_handling_and_without_replacement(bytes) {
        Some(text) => text.into_owned(),
        None => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            text.into_owned()
        }
    }
}
