//! Fixed-size sequential batches read from a CSV file.

use super::{open_csv, read_header, read_rows, UnitSource};
use crate::schema::INFERENCE_SAMPLE_ROWS;
use crate::{BenchError, BenchResult, Row, WorkUnit};
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BULK_TAG: &str = "ingest_chunk";

pub struct BulkCsvSource {
    path: PathBuf,
    delimiter: u8,
    batch_size: usize,
    reader: csv::Reader<File>,
    header: Vec<String>,
    /// Rows read ahead for type inference and not yet emitted.
    pending: VecDeque<Row>,
    sample: Vec<Row>,
    next_index: u64,
    exhausted: bool,
}

impl BulkCsvSource {
    /// Open the file and read ahead enough rows to infer a schema. A file
    /// with a header but no data rows is rejected.
    pub fn open(path: &Path, delimiter: u8, batch_size: usize) -> BenchResult<Self> {
        if batch_size == 0 {
            return Err(BenchError::Config("batch size must be at least 1".into()));
        }
        let mut reader = open_csv(path, delimiter)?;
        let header = read_header(&mut reader, path)?;
        let sample = read_rows(&mut reader, INFERENCE_SAMPLE_ROWS, path)?;
        if sample.is_empty() {
            return Err(BenchError::Source(format!("{}: no data rows", path.display())));
        }
        debug!(path = %path.display(), columns = header.len(), "bulk source opened");
        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
            batch_size,
            reader,
            header,
            pending: sample.iter().cloned().collect(),
            sample,
            next_index: 1,
            exhausted: false,
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn sample(&self) -> &[Row] {
        &self.sample
    }

    /// Start again from the first data row.
    pub fn rewind(&mut self) -> BenchResult<()> {
        let mut reader = open_csv(&self.path, self.delimiter)?;
        read_header(&mut reader, &self.path)?;
        // Skip past the rows already held in `sample`.
        read_rows(&mut reader, self.sample.len(), &self.path)?;
        self.reader = reader;
        self.pending = self.sample.iter().cloned().collect();
        self.next_index = 1;
        self.exhausted = false;
        Ok(())
    }
}

impl UnitSource for BulkCsvSource {
    fn next_unit(&mut self) -> BenchResult<Option<WorkUnit>> {
        if self.exhausted && self.pending.is_empty() {
            return Ok(None);
        }

        let mut rows = Vec::with_capacity(self.batch_size);
        while rows.len() < self.batch_size {
            match self.pending.pop_front() {
                Some(row) => rows.push(row),
                None => break,
            }
        }
        if rows.len() < self.batch_size && !self.exhausted {
            let want = self.batch_size - rows.len();
            let more = read_rows(&mut self.reader, want, &self.path)?;
            if more.len() < want {
                self.exhausted = true;
            }
            rows.extend(more);
        }

        if rows.is_empty() {
            return Ok(None);
        }
        let unit = WorkUnit::rows(self.next_index, BULK_TAG, rows);
        self.next_index += 1;
        Ok(Some(unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_csv(dir: &TempDir, rows: usize) -> PathBuf {
        let path = dir.path().join("data.csv");
        let mut text = String::from("id,value\n");
        for i in 0..rows {
            text.push_str(&format!("{},{}.5\n", i, i));
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    fn drain(source: &mut BulkCsvSource) -> Vec<WorkUnit> {
        let mut units = Vec::new();
        while let Some(u) = source.next_unit().unwrap() {
            units.push(u);
        }
        units
    }

    #[test]
    fn test_batches_in_order() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 2_500);
        let mut source = BulkCsvSource::open(&path, b',', 1_000).unwrap();
        let units = drain(&mut source);
        let sizes: Vec<usize> = units.iter().map(|u| u.len()).collect();
        assert_eq!(sizes, vec![1_000, 1_000, 500]);
        assert_eq!(units.iter().map(|u| u.index).collect::<Vec<_>>(), vec![1, 2, 3]);
        assert!(units.iter().all(|u| u.tag == BULK_TAG));
        match &units[1].payload {
            crate::UnitPayload::Rows(rows) => assert_eq!(rows[0][0], "1000"),
            _ => panic!("expected rows"),
        }
        assert!(source.next_unit().unwrap().is_none());
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 20);
        let mut source = BulkCsvSource::open(&path, b',', 10).unwrap();
        assert_eq!(drain(&mut source).len(), 2);
    }

    #[test]
    fn test_rewind() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 15);
        let mut source = BulkCsvSource::open(&path, b',', 10).unwrap();
        assert_eq!(drain(&mut source).len(), 2);
        source.rewind().unwrap();
        let again = drain(&mut source);
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].index, 1);
        assert_eq!(again.iter().map(|u| u.len()).sum::<usize>(), 15);
    }

    #[test]
    fn test_header_only_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_csv(&dir, 0);
        assert!(matches!(
            BulkCsvSource::open(&path, b',', 10),
            Err(BenchError::Source(_))
        ));
    }

    #[test]
    fn test_malformed_record_is_source_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.csv");
        let mut text = String::from("a,b\n");
        for i in 0..1_200 {
            text.push_str(&format!("{},{}\n", i, i));
        }
        text.push_str("1,2,3\n");
        std::fs::write(&path, text).unwrap();

        let mut source = BulkCsvSource::open(&path, b',', 1_000).unwrap();
        assert!(source.next_unit().unwrap().is_some());
        assert!(matches!(source.next_unit(), Err(BenchError::Source(_))));
    }
}
