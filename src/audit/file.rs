use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

use super::record::AuditRecord;
use super::sink::AuditSink;

/// Errors that can occur during audit file operations.
#[derive(Error, Debug)]
pub enum FileSinkError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Append-only JSON-lines audit sink.
///
/// One record per line. Unparseable lines are skipped on read (and
/// surface as a sequence gap during verification).
pub struct FileSink {
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
    sync_each: bool,
    records_written: AtomicU64,
    lines_skipped: AtomicU64,
}

impl FileSink {
    /// Open or create an audit file for appending.
    ///
    /// A final line left without a newline by an interrupted write is
    /// terminated so the next record starts on its own line.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FileSinkError> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        if terminate_torn_line(&path, &mut file)? {
            tracing::warn!(
                path = %path.display(),
                "Audit file ended mid-record, sealing last line"
            );
        }

        Ok(FileSink {
            writer: Mutex::new(BufWriter::new(file)),
            path,
            sync_each: false,
            records_written: AtomicU64::new(0),
            lines_skipped: AtomicU64::new(0),
        })
    }

    /// fsync after every record instead of only flushing.
    pub fn with_sync(mut self, sync_each: bool) -> Self {
        self.sync_each = sync_each;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records written by this handle.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Lines skipped by the most recent read.
    pub fn lines_skipped(&self) -> u64 {
        self.lines_skipped.load(Ordering::Relaxed)
    }

    fn write_record(&self, record: &AuditRecord) -> Result<(), FileSinkError> {
        let json = serde_json::to_string(record)?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()?;
        if self.sync_each {
            writer.get_ref().sync_data()?;
        }
        drop(writer);

        self.records_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read_records(&self) -> Result<Vec<AuditRecord>, FileSinkError> {
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        let mut skipped = 0;

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    tracing::warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %e,
                        "Invalid audit line, skipping"
                    );
                }
            }
        }

        self.lines_skipped.store(skipped, Ordering::Relaxed);
        Ok(records)
    }
}

fn terminate_torn_line(path: &Path, file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut reader = File::open(path)?;
    reader.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    reader.read_exact(&mut last)?;
    if last[0] == b'\n' {
        return Ok(false);
    }

    file.write_all(b"\n")?;
    file.sync_data()?;
    Ok(true)
}

impl std::fmt::Debug for FileSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSink")
            .field("path", &self.path)
            .field("sync_each", &self.sync_each)
            .finish()
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn append(&self, record: &AuditRecord) -> anyhow::Result<()> {
        self.write_record(record)?;
        Ok(())
    }

    async fn list(&self) -> anyhow::Result<Vec<AuditRecord>> {
        Ok(self.read_records()?)
    }
}
