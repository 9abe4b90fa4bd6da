//! Durable region completion marks.

use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Completion status of a region. Absence from the store means "not done".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionStatus {
    #[serde(rename = "DONE")]
    Done,
}

/// Completed / total / percentage, as reported after every region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletionRatio {
    pub completed: usize,
    pub total: usize,
    pub percentage: f64,
}

impl std::fmt::Display for CompletionRatio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} regions done ({:.1}%)",
            self.completed, self.total, self.percentage
        )
    }
}

/// JSON-file-backed map of region code to [`RegionStatus`].
///
/// Every mark rewrites the whole file (temp file + rename), so the file on
/// disk is always a complete, parseable snapshot.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    entries: BTreeMap<String, RegionStatus>,
}

impl ProgressStore {
    /// Load the store at `path`.
    ///
    /// A missing file starts an empty store. A file that cannot be parsed is
    /// logged and ignored: at worst completed regions are revisited, and the
    /// ledgers keep that from duplicating records.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AppError> {
        let path = path.into();
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<BTreeMap<String, RegionStatus>>(&content) {
                Ok(entries) => {
                    tracing::info!(
                        path = %path.display(),
                        done = entries.len(),
                        "Loaded progress file"
                    );
                    entries
                }
                Err(e) => {
                    tracing::error!(
                        path = %path.display(),
                        error = %e,
                        "Failed to parse progress file, starting fresh"
                    );
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "No progress file found, starting fresh");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_done(&self, region_code: &str) -> bool {
        self.entries.get(region_code) == Some(&RegionStatus::Done)
    }

    /// Mark `region_code` as done and persist the whole map before returning.
    pub fn mark_done(&mut self, region_code: &str) -> Result<(), AppError> {
        self.entries
            .insert(region_code.to_string(), RegionStatus::Done);
        self.save()
    }

    /// Count of DONE marks against `total_regions`.
    pub fn completion_ratio(&self, total_regions: usize) -> CompletionRatio {
        let completed = self
            .entries
            .values()
            .filter(|s| **s == RegionStatus::Done)
            .count();
        let percentage = if total_regions > 0 {
            completed as f64 / total_regions as f64 * 100.0
        } else {
            0.0
        };
        CompletionRatio {
            completed,
            total: total_regions,
            percentage,
        }
    }

    fn save(&self) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        let mut file = fs::File::create(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
