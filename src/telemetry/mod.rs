//! # Telemetry Module
//!
//! Link statistics logging to JSONL files with rotation.
//!
//! This module handles:
//! - Stamping `LinkStatistics` snapshots with wall clock and link time
//! - Formatting as JSONL (JSON Lines), one record per line
//! - Rotating to a new file after `max_records_per_file` records
//! - Retaining only the last `max_files_to_keep` files

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{Local, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::out::LinkStatistics;

/// Prefix of the log file names
const FILE_PREFIX: &str = "link_stats_";

/// Extension of the log file names
const FILE_EXTENSION: &str = "jsonl";

/// One JSONL line
#[derive(Debug, Clone, Serialize)]
pub struct StatsRecord {
    /// Wall clock time of the snapshot, RFC 3339
    pub timestamp: String,
    /// Link time in ms since start
    pub time_ms: u64,
    #[serde(flatten)]
    pub stats: LinkStatistics,
}

/// Rotating JSONL writer of link statistics
pub struct StatsLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,

    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    files: VecDeque<PathBuf>,
    file_seq: u32,
    records_total: u64,
}

impl StatsLogger {
    /// Open the log directory
    ///
    /// Log files left by earlier runs count towards `max_files_to_keep`.
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created or listed
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        let mut existing: Vec<PathBuf> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_log_file(path))
            .collect();
        existing.sort();
        debug!("{} existing stats files in {}", existing.len(), dir.display());

        Ok(Self {
            dir,
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            files: existing.into(),
            file_seq: 0,
            records_total: 0,
        })
    }

    /// Append one snapshot
    ///
    /// # Arguments
    ///
    /// * `time_ms` - Link time of the snapshot
    /// * `stats` - Statistics to record
    ///
    /// # Errors
    ///
    /// Returns error if the record cannot be serialized or written
    pub fn log(&mut self, time_ms: u64, stats: &LinkStatistics) -> Result<()> {
        let record = StatsRecord {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            time_ms,
            stats: *stats,
        };
        let line = serde_json::to_string(&record)?;

        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
        }
        self.records_in_file += 1;
        self.records_total += 1;
        Ok(())
    }

    /// Flush buffered records to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    /// Records written since creation
    pub fn records_total(&self) -> u64 {
        self.records_total
    }

    /// Log files currently kept, oldest first
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(PathBuf::as_path)
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        self.file_seq += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Local::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);
        let file = File::create(&path)?;
        info!("Stats log file {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;
        self.files.push_back(path);

        while self.files.len() > self.max_files_to_keep {
            if let Some(old) = self.files.pop_front() {
                match fs::remove_file(&old) {
                    Ok(()) => debug!("Removed old stats file {}", old.display()),
                    Err(e) => warn!("Failed to remove {}: {}", old.display(), e),
                }
            }
        }
        Ok(())
    }
}

impl Drop for StatsLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush stats log: {}", e);
        }
    }
}

fn is_log_file(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(FILE_PREFIX));
    name_ok && path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION)
}
