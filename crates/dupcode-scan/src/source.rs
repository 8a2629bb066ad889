//! Work unit sources
//!
//! A work unit is one independent stream of records. [`FileUnit`] reads a
//! delimited file from disk, [`InMemoryUnit`] serves rows held in memory.

use async_trait::async_trait;
use csv_async::{AsyncReader, AsyncReaderBuilder, ByteRecord};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, ScanError};
use crate::types::UnitId;

/// Lazy, finite, non-restartable sequence of records
#[async_trait]
pub trait RecordStream: Send {
    /// Next record's fields, or `None` at end of stream
    async fn next_record(&mut self) -> Result<Option<Vec<String>>>;
}

#[async_trait]
pub trait WorkUnit: Send + Sync + 'static {
    fn id(&self) -> &UnitId;

    /// Open a fresh record stream owned by the caller
    async fn open(&self) -> Result<Box<dyn RecordStream>>;

    fn boxed(self) -> Box<dyn WorkUnit>
    where
        Self: Sized,
    {
        Box::new(self)
    }
}

/// A delimited text file on disk
#[derive(Debug, Clone)]
pub struct FileUnit {
    id: UnitId,
    path: PathBuf,
    delimiter: u8,
}

impl FileUnit {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8) -> Self {
        let path = path.into();
        Self {
            id: UnitId::new(path.display().to_string()),
            path,
            delimiter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl WorkUnit for FileUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    async fn open(&self) -> Result<Box<dyn RecordStream>> {
        let file = tokio::fs::File::open(&self.path)
            .await
            .map_err(|source| ScanError::Open {
                unit: self.id.clone(),
                source,
            })?;

        let reader = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .create_reader(file);

        Ok(Box::new(CsvRecordStream {
            unit: self.id.clone(),
            reader,
            record: ByteRecord::new(),
            ordinal: 0,
        }))
    }
}

/// Fields are read as bytes; invalid UTF-8 is replaced rather than rejected.
struct CsvRecordStream {
    unit: UnitId,
    reader: AsyncReader<tokio::fs::File>,
    record: ByteRecord,
    ordinal: u64,
}

#[async_trait]
impl RecordStream for CsvRecordStream {
    async fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        match self.reader.read_byte_record(&mut self.record).await {
            Ok(true) => {
                self.ordinal += 1;
                Ok(Some(
                    self.record
                        .iter()
                        .map(|field| String::from_utf8_lossy(field).into_owned())
                        .collect(),
                ))
            },
            Ok(false) => Ok(None),
            Err(err) => Err(ScanError::Read {
                unit: self.unit.clone(),
                ordinal: self.ordinal + 1,
                source: std::io::Error::other(err),
            }),
        }
    }
}

/// Rows held in memory; each `open` replays them from the start
#[derive(Debug, Clone)]
pub struct InMemoryUnit {
    id: UnitId,
    rows: Arc<Vec<Vec<String>>>,
}

impl InMemoryUnit {
    pub fn new<R, F>(id: impl Into<String>, rows: R) -> Self
    where
        R: IntoIterator,
        R::Item: IntoIterator<Item = F>,
        F: Into<String>,
    {
        let rows = rows
            .into_iter()
            .map(|row| row.into_iter().map(Into::into).collect())
            .collect();

        Self {
            id: UnitId::new(id),
            rows: Arc::new(rows),
        }
    }

    /// Split `text` into lines and fields; blank lines are dropped
    pub fn parse(id: impl Into<String>, text: &str, delimiter: char) -> Self {
        Self::new(
            id,
            text.lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.split(delimiter).collect::<Vec<_>>()),
        )
    }
}

#[async_trait]
impl WorkUnit for InMemoryUnit {
    fn id(&self) -> &UnitId {
        &self.id
    }

    async fn open(&self) -> Result<Box<dyn RecordStream>> {
        Ok(Box::new(InMemoryStream {
            rows: self.rows.clone(),
            next: 0,
        }))
    }
}

struct InMemoryStream {
    rows: Arc<Vec<Vec<String>>>,
    next: usize,
}

#[async_trait]
impl RecordStream for InMemoryStream {
    async fn next_record(&mut self) -> Result<Option<Vec<String>>> {
        let row = self.rows.get(self.next).cloned();
        self.next += 1;
        Ok(row)
    }
}

/// List the regular files directly under `root` as work units
///
/// Subdirectories and other non-file entries are skipped; symlinks are
/// followed. Units come back sorted by path.
pub async fn list_work_units(
    root: impl AsRef<Path>,
    extension: Option<&str>,
    delimiter: u8,
) -> Result<Vec<FileUnit>> {
    let root = root.as_ref();
    let invalid_root = |source| ScanError::InvalidRoot {
        path: root.to_path_buf(),
        source,
    };

    let mut entries = tokio::fs::read_dir(root).await.map_err(invalid_root)?;
    let mut paths = Vec::new();

    while let Some(entry) = entries.next_entry().await.map_err(invalid_root)? {
        let path = entry.path();

        match tokio::fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => {},
            Ok(_) => {
                debug!(path = %path.display(), "Skipping non-file entry");
                continue;
            },
            Err(err) => {
                debug!(path = %path.display(), error = %err, "Skipping unreadable entry");
                continue;
            },
        }

        if let Some(wanted) = extension {
            let matches = path
                .extension()
                .and_then(OsStr::to_str)
                .is_some_and(|ext| ext.eq_ignore_ascii_case(wanted));
            if !matches {
                continue;
            }
        }

        paths.push(path);
    }

    paths.sort();
    info!(root = %root.display(), units = paths.len(), "Listed work units");

    Ok(paths
        .into_iter()
        .map(|path| FileUnit::new(path, delimiter))
        .collect())
}
