// Copyright 2025 ToonDB Authors
//
// Licensed under the Apache License, Version 2.0

//! Append-only JSON-lines sink, one file per run, and its reader.

use crate::record::ExecutionRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LogError {
    #[error("cannot open log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write log {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Appends one record per line and flushes after each append, so a crash
/// loses at most the record being written.
pub struct JsonlLogger {
    path: PathBuf,
    file: File,
    written: u64,
}

impl JsonlLogger {
    /// Open `path` for appending, creating it and its parent directories.
    /// A torn trailing line left by an earlier crash is terminated first so
    /// the next record starts on its own line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;
        let torn = ends_mid_line(&mut file).map_err(|source| LogError::Open {
            path: path.clone(),
            source,
        })?;
        if torn {
            warn!(path = %path.display(), "log ends without newline, terminating torn line");
            file.write_all(b"\n")
                .and_then(|_| file.flush())
                .map_err(|source| LogError::Write {
                    path: path.clone(),
                    source,
                })?;
        }
        debug!(path = %path.display(), "opened log");
        Ok(Self {
            path,
            file,
            written: 0,
        })
    }

    pub fn append(&mut self, record: &ExecutionRecord) -> Result<(), LogError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        self.file
            .write_all(&line)
            .and_then(|_| self.file.flush())
            .map_err(|source| LogError::Write {
                path: self.path.clone(),
                source,
            })?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records appended through this handle.
    pub fn written(&self) -> u64 {
        self.written
    }
}

fn ends_mid_line(file: &mut File) -> std::io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Records parsed from a log plus the number of lines that were not.
#[derive(Debug, Default)]
pub struct LogContents {
    pub records: Vec<ExecutionRecord>,
    pub skipped_lines: usize,
}

/// Read every record in a log. Blank lines are ignored; malformed or
/// truncated lines are skipped with a warning and counted.
pub fn read_records(path: impl AsRef<Path>) -> Result<LogContents, LogError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| LogError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut contents = LogContents::default();
    for (lineno, line) in BufReader::new(file).lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e, "unreadable log line");
                contents.skipped_lines += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ExecutionRecord>(&line) {
            Ok(r) => contents.records.push(r),
            Err(e) => {
                warn!(path = %path.display(), line = lineno + 1, error = %e, "skipping malformed log line");
                contents.skipped_lines += 1;
            }
        }
    }
    Ok(contents)
}
