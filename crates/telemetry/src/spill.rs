use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::TelemetryError;
use crate::record::TelemetryRecord;

/// Append-only local store for telemetry records the sink could not accept.
///
/// Format is newline-delimited JSON, one record per line, so a partial write
/// at crash time loses at most the final line. The active file rotates when
/// it exceeds `max_bytes`; rotated files are replayed oldest-first and
/// deleted once their contents have been handed back to the worker.
///
/// Only the single telemetry worker touches the spill, so plain blocking
/// file I/O is fine here.
#[derive(Debug)]
pub struct SpillStore {
    path: PathBuf,
    max_bytes: u64,
}

impl SpillStore {
    /// Create a spill store writing to `path`.
    pub fn new(path: impl Into<PathBuf>, max_bytes: u64) -> Self {
        Self {
            path: path.into(),
            max_bytes,
        }
    }

    /// Append records to the active spill file, rotating first if the file
    /// has grown past the size bound.
    pub fn append(&self, records: &[TelemetryRecord]) -> Result<(), TelemetryError> {
        if records.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.rotate_if_needed()?;

        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        debug!(records = records.len(), path = %self.path.display(), "spilled telemetry records");
        Ok(())
    }

    /// Drain every spilled record (rotated files first, then the active
    /// file), removing the files as they are consumed. Unparseable lines are
    /// skipped with a warning.
    pub fn drain(&self) -> Result<Vec<TelemetryRecord>, TelemetryError> {
        let mut records = Vec::new();
        for path in self.rotated_files()? {
            records.extend(read_records(&path)?);
            std::fs::remove_file(&path)?;
        }
        if self.path.is_file() {
            records.extend(read_records(&self.path)?);
            std::fs::remove_file(&self.path)?;
        }
        Ok(records)
    }

    /// Whether any spilled data is waiting for replay.
    pub fn has_spilled(&self) -> bool {
        self.path.is_file() || self.rotated_files().map(|f| !f.is_empty()).unwrap_or(false)
    }

    fn rotate_if_needed(&self) -> Result<(), TelemetryError> {
        let Ok(metadata) = std::fs::metadata(&self.path) else {
            return Ok(());
        };
        if metadata.len() < self.max_bytes {
            return Ok(());
        }

        let rotated = self.rotation_path();
        std::fs::rename(&self.path, &rotated)?;
        debug!(from = %self.path.display(), to = %rotated.display(), "rotated telemetry spill");
        Ok(())
    }

    fn rotation_path(&self) -> PathBuf {
        let ts = chrono::Utc::now().timestamp_micros();
        self.path.with_extension(format!("{ts}.rotated"))
    }

    /// Rotated siblings of the active file, oldest first.
    fn rotated_files(&self) -> Result<Vec<PathBuf>, TelemetryError> {
        let Some(parent) = self.path.parent() else {
            return Ok(Vec::new());
        };
        if !parent.is_dir() {
            return Ok(Vec::new());
        }
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut rotated: Vec<PathBuf> = std::fs::read_dir(parent)?
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().is_some_and(|ext| ext == "rotated")
                    && path
                        .file_name()
                        .is_some_and(|name| name.to_string_lossy().starts_with(&stem))
            })
            .collect();
        rotated.sort();
        Ok(rotated)
    }
}

fn read_records(path: &Path) -> Result<Vec<TelemetryRecord>, TelemetryError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping corrupt spill line");
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RequestRecord;
    use chrono::Utc;

    fn record(trace: &str) -> TelemetryRecord {
        TelemetryRecord::Request(RequestRecord {
            tenant: "t".into(),
            trace_id: trace.into(),
            contract_id: "c".into(),
            method: "POST".into(),
            path: "/api/proxy".into(),
            status: 200,
            decision: "allowed".into(),
            latency_ms: 1,
            request_bytes: 0,
            response_bytes: 0,
            post_check_skipped: false,
            timestamp: Utc::now(),
        })
    }

    fn temp_spill(max_bytes: u64) -> SpillStore {
        let dir = std::env::temp_dir().join(format!(
            "warden-spill-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        SpillStore::new(dir.join("telemetry.ndjson"), max_bytes)
    }

    #[test]
    fn append_then_drain_roundtrips() {
        let spill = temp_spill(1 << 20);
        spill.append(&[record("a"), record("b")]).unwrap();
        assert!(spill.has_spilled());

        let drained = spill.drain().unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].trace_id(), "a");
        assert!(!spill.has_spilled());
    }

    #[test]
    fn drain_of_empty_store_is_empty() {
        let spill = temp_spill(1 << 20);
        assert!(!spill.has_spilled());
        assert!(spill.drain().unwrap().is_empty());
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let spill = temp_spill(1 << 20);
        spill.append(&[record("good")]).unwrap();
        {
            let mut file = OpenOptions::new().append(true).open(&spill.path).unwrap();
            file.write_all(b"{corrupt\n").unwrap();
        }
        spill.append(&[record("also_good")]).unwrap();

        let drained = spill.drain().unwrap();
        assert_eq!(drained.len(), 2);
    }

    #[test]
    fn rotation_by_size_preserves_all_records() {
        // Tiny bound: every append rotates the previous file out.
        let spill = temp_spill(64);
        spill.append(&[record("one")]).unwrap();
        spill.append(&[record("two")]).unwrap();
        spill.append(&[record("three")]).unwrap();

        let drained = spill.drain().unwrap();
        assert_eq!(drained.len(), 3);
        assert!(!spill.has_spilled());
    }
}
