use crate::data::Reading;
use crate::error::{PipelineError, Result};
use crate::source::DocumentStore;
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

/// File of newline-delimited JSON sensor documents, one reading per line.
///
/// A store opened with [`JsonlStore::tailing`] expects the file to keep growing:
/// an unterminated last line that does not parse is treated as still being
/// written and retried on the next fetch. A store opened with
/// [`JsonlStore::new`] reads a finished file and reports such a line as
/// [`PipelineError::MalformedDocument`].
pub struct JsonlStore {
    path: PathBuf,
    tailing: bool,
    cursor: Mutex<Option<FileCursor>>,
}

struct FileCursor {
    reader: BufReader<File>,
    docs_read: usize,
    line_no: usize,
    partial: String,
}

impl JsonlStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlStore {
            path: path.into(),
            tailing: false,
            cursor: Mutex::new(None),
        }
    }

    /// Store over a file another process is still appending to.
    pub fn tailing(path: impl Into<PathBuf>) -> Self {
        JsonlStore {
            tailing: true,
            ..Self::new(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<FileCursor> {
        let file = File::open(&self.path).await.map_err(|e| {
            PipelineError::SourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        Ok(FileCursor {
            reader: BufReader::new(file),
            docs_read: 0,
            line_no: 0,
            partial: String::new(),
        })
    }

    async fn read_doc(&self, cur: &mut FileCursor) -> Result<Option<Reading>> {
        loop {
            let n = cur.reader.read_line(&mut cur.partial).await.map_err(|e| {
                PipelineError::SourceUnavailable(format!("{}: {e}", self.path.display()))
            })?;
            let complete = cur.partial.ends_with('\n');
            if n == 0 && cur.partial.is_empty() {
                return Ok(None);
            }

            let line = cur.partial.trim();
            if line.is_empty() {
                if complete {
                    cur.line_no += 1;
                    cur.partial.clear();
                    continue;
                }
                return Ok(None);
            }

            match serde_json::from_str::<Reading>(line) {
                Ok(reading) => {
                    cur.line_no += 1;
                    cur.docs_read += 1;
                    cur.partial.clear();
                    return Ok(Some(reading));
                }
                // unterminated tail: the writer has not finished this line yet
                Err(_) if !complete && self.tailing => return Ok(None),
                Err(e) => {
                    return Err(PipelineError::MalformedDocument {
                        location: format!("{}:{}", self.path.display(), cur.line_no + 1),
                        reason: e.to_string(),
                    })
                }
            }
        }
    }
}

#[async_trait]
impl DocumentStore for JsonlStore {
    async fn fetch(&self, offset: usize, limit: usize) -> Result<Vec<Reading>> {
        let mut guard = self.cursor.lock().await;
        // reopen only when asked to go backwards
        let mut cur = match guard.take() {
            Some(c) if c.docs_read <= offset => c,
            _ => self.open().await?,
        };

        while cur.docs_read < offset {
            if self.read_doc(&mut cur).await?.is_none() {
                *guard = Some(cur);
                return Ok(Vec::new());
            }
        }

        let mut page = Vec::with_capacity(limit.min(4096));
        while page.len() < limit {
            match self.read_doc(&mut cur).await? {
                Some(r) => page.push(r),
                None => break,
            }
        }
        *guard = Some(cur);
        Ok(page)
    }
}

/// Write readings as newline-delimited JSON, replacing any existing file.
pub fn write_jsonl<'a>(path: impl AsRef<Path>, readings: impl IntoIterator<Item = &'a Reading>) -> Result<usize> {
    let path = path.as_ref();
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
    let mut count = 0;
    for r in readings {
        serde_json::to_writer(&mut out, r)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;
    Ok(count)
}
