//! Line-delimited JSON files shared between processes.
//!
//! [`JsonlWriter`] appends one JSON record per line; [`JsonlReader`] tails
//! the same file from a byte offset so a consumer only sees records written
//! since its last poll. Appends of a single line are small enough to land
//! atomically, so a reader never observes a torn record.

use color_eyre::eyre::{Result, WrapErr};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// Appends typed records to a JSONL file.
pub struct JsonlWriter<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Serialize> JsonlWriter<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// Append one record as a single line. Creates the file and parent
    /// directories on first use.
    pub fn append(&self, item: &T) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
        }

        let mut line = serde_json::to_string(item).wrap_err("failed to serialize record")?;
        line.push('\n');

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .wrap_err_with(|| format!("failed to open {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .wrap_err_with(|| format!("failed to append to {}", self.path.display()))?;

        Ok(())
    }
}

/// Tails a JSONL file, tracking a byte offset between polls.
pub struct JsonlReader<T> {
    path: PathBuf,
    offset: u64,
    _marker: PhantomData<T>,
}

impl<T: DeserializeOwned> JsonlReader<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            offset: 0,
            _marker: PhantomData,
        }
    }

    /// Current byte offset into the file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Restore a previously persisted offset.
    pub fn set_offset(&mut self, offset: u64) {
        self.offset = offset;
    }

    /// Move the offset to the current end of the file without reading,
    /// so only records appended afterwards are returned by [`poll`].
    /// Returns the new offset.
    ///
    /// [`poll`]: JsonlReader::poll
    pub fn skip_to_end(&mut self) -> Result<u64> {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to stat {}", self.path.display()));
            }
        };
        self.offset = len;
        Ok(len)
    }

    /// Read all records appended since the last poll and advance the
    /// offset. A missing file yields no records.
    pub fn poll(&mut self) -> Result<Vec<T>> {
        let file = match std::fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e)
                    .wrap_err_with(|| format!("failed to open {}", self.path.display()));
            }
        };

        let mut reader = BufReader::new(file);
        reader
            .seek(SeekFrom::Start(self.offset))
            .wrap_err_with(|| format!("failed to seek in {}", self.path.display()))?;

        let mut records = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            let read = reader
                .read_line(&mut line)
                .wrap_err_with(|| format!("failed to read {}", self.path.display()))?;
            if read == 0 {
                break;
            }
            // Stop before a line still being written; re-read it next poll.
            if !line.ends_with('\n') {
                break;
            }
            self.offset += read as u64;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: T = serde_json::from_str(trimmed)
                .wrap_err_with(|| format!("malformed record in {}", self.path.display()))?;
            records.push(record);
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Record {
        seq: u32,
        note: String,
    }

    fn record(seq: u32) -> Record {
        Record {
            seq,
            note: format!("note {seq}"),
        }
    }

    #[test]
    fn append_then_poll_returns_records_in_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.jsonl");

        let writer = JsonlWriter::new(&path);
        writer.append(&record(1)).unwrap();
        writer.append(&record(2)).unwrap();

        let mut reader = JsonlReader::<Record>::new(&path);
        let records = reader.poll().unwrap();
        assert_eq!(records, vec![record(1), record(2)]);
    }

    #[test]
    fn poll_only_returns_new_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.jsonl");

        let writer = JsonlWriter::new(&path);
        let mut reader = JsonlReader::<Record>::new(&path);

        writer.append(&record(1)).unwrap();
        assert_eq!(reader.poll().unwrap().len(), 1);

        writer.append(&record(2)).unwrap();
        writer.append(&record(3)).unwrap();
        let records = reader.poll().unwrap();
        assert_eq!(records, vec![record(2), record(3)]);

        assert!(reader.poll().unwrap().is_empty());
    }

    #[test]
    fn skip_to_end_ignores_existing_records() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.jsonl");

        let writer = JsonlWriter::new(&path);
        writer.append(&record(1)).unwrap();

        let mut reader = JsonlReader::<Record>::new(&path);
        let offset = reader.skip_to_end().unwrap();
        assert!(offset > 0);
        assert!(reader.poll().unwrap().is_empty());

        writer.append(&record(2)).unwrap();
        let records = reader.poll().unwrap();
        assert_eq!(records, vec![record(2)]);
    }

    #[test]
    fn missing_file_polls_empty() {
        let dir = TempDir::new().unwrap();
        let mut reader = JsonlReader::<Record>::new(dir.path().join("absent.jsonl"));
        assert!(reader.poll().unwrap().is_empty());
        assert_eq!(reader.skip_to_end().unwrap(), 0);
    }

    #[test]
    fn offset_survives_reader_recreation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.jsonl");

        let writer = JsonlWriter::new(&path);
        writer.append(&record(1)).unwrap();

        let mut reader = JsonlReader::<Record>::new(&path);
        reader.poll().unwrap();
        let offset = reader.offset();

        writer.append(&record(2)).unwrap();

        let mut resumed = JsonlReader::<Record>::new(&path);
        resumed.set_offset(offset);
        let records = resumed.poll().unwrap();
        assert_eq!(records, vec![record(2)]);
    }
}
