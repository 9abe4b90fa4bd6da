//! Append-only per-region record files.
//!
//! Each region gets one CSV file. The file is the source of truth for
//! deduplication: the id set is rebuilt from it at the start of every region
//! visit, so whatever made it to disk before a crash is never fetched again.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::AppError;
use crate::models::{Record, Region};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Only the key column is needed to rebuild the dedup index.
#[derive(Debug, Deserialize)]
struct IdRow {
    id: String,
}

/// Directory of per-region CSV ledgers.
///
/// The ledger itself does not deduplicate; callers consult
/// [`Ledger::load_ids`] (and their own live set) before appending.
#[derive(Debug, Clone)]
pub struct Ledger {
    dir: PathBuf,
}

impl Ledger {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<dir>/<code>_<name>_records.csv`
    pub fn path_for(&self, region: &Region) -> PathBuf {
        self.dir
            .join(format!("{}_{}_records.csv", region.code, region.name))
    }

    pub fn exists(&self, region: &Region) -> bool {
        self.path_for(region).exists()
    }

    /// Ids already persisted for `region`.
    ///
    /// Empty when the file is absent or holds only a header row.
    pub fn load_ids(&self, region: &Region) -> Result<HashSet<String>, AppError> {
        let ids = self
            .read_rows::<IdRow>(region)?
            .into_iter()
            .map(|row| row.id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        Ok(ids)
    }

    /// Number of data rows (the header is not counted).
    pub fn count_rows(&self, region: &Region) -> Result<usize, AppError> {
        Ok(self.read_rows::<IdRow>(region)?.len())
    }

    /// Whether the ledger holds at least one data row.
    ///
    /// A completion mark is only trusted when this is true.
    pub fn has_data(&self, region: &Region) -> Result<bool, AppError> {
        Ok(self.count_rows(region)? > 0)
    }

    /// All persisted records for `region`, in append order.
    pub fn load_records(&self, region: &Region) -> Result<Vec<Record>, AppError> {
        self.read_rows::<Record>(region)
    }

    /// Append one record, creating the file (BOM + header) on first write.
    ///
    /// A torn tail left by an earlier crash is cut back to the last complete
    /// row first; a file without a complete header line is started over.
    /// The new bytes go out in one write, synced before returning.
    pub fn append(&self, region: &Region, record: &Record) -> Result<(), AppError> {
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(region);

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;
        let mut existing = Vec::new();
        file.read_to_end(&mut existing)?;

        let intact = intact_len(&existing);
        if intact < existing.len() {
            tracing::warn!(
                path = %path.display(),
                dropped_bytes = existing.len() - intact,
                "Discarding torn ledger tail"
            );
            file.set_len(intact as u64)?;
        }
        let is_new = intact == 0;

        let mut buf = Vec::new();
        if is_new {
            buf.extend_from_slice(UTF8_BOM);
        }
        let mut writer = csv::WriterBuilder::new()
            .has_headers(is_new)
            .from_writer(buf);
        writer.serialize(record)?;
        let buf = writer.into_inner().map_err(|e| e.into_error())?;

        file.seek(SeekFrom::Start(intact as u64))?;
        file.write_all(&buf)?;
        file.sync_data()?;

        tracing::debug!(region = %region.code, id = %record.id, path = %path.display(), "Record appended");
        Ok(())
    }

    fn read_rows<T>(&self, region: &Region) -> Result<Vec<T>, AppError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let path = self.path_for(region);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let bytes = &bytes[..intact_len(&bytes)];
        let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new().from_reader(body);

        let mut rows = Vec::new();
        for (index, row) in reader.deserialize::<T>().enumerate() {
            match row {
                Ok(row) => rows.push(row),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    row = index + 1,
                    error = %e,
                    "Skipping unreadable ledger row"
                ),
            }
        }
        Ok(rows)
    }
}

/// Length of the longest prefix of `bytes` ending on a row boundary: a
/// newline outside any quoted field.
///
/// Anything past it is the remains of an interrupted append. Doubled quotes
/// toggle twice, so escaped quotes need no special case.
fn intact_len(bytes: &[u8]) -> usize {
    let mut in_quotes = false;
    let mut end = 0;
    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            b'"' => in_quotes = !in_quotes,
            b'\n' if !in_quotes => end = i + 1,
            _ => {}
        }
    }
    end
}
