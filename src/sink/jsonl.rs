use crate::error::{PipelineError, Result};
use crate::sink::{AnomalyRecord, AnomalySink};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// Newline-delimited JSON file of anomaly records.
pub struct JsonlSink {
    path: PathBuf,
    file: Option<File>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonlSink { path: path.into(), file: None }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn file(&mut self) -> Result<&mut File> {
        if self.file.is_none() {
            if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(dir).await?;
            }
            let f = OpenOptions::new().create(true).append(true).open(&self.path).await?;
            self.file = Some(f);
        }
        self.file
            .as_mut()
            .ok_or_else(|| PipelineError::Sink(format!("{} not open", self.path.display())))
    }
}

#[async_trait]
impl AnomalySink for JsonlSink {
    async fn clear(&mut self) -> Result<()> {
        self.file = None;
        File::create(&self.path).await?;
        Ok(())
    }

    async fn append(&mut self, records: &[AnomalyRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        // encode the whole batch before touching the file
        let mut buf = Vec::with_capacity(records.len() * 192);
        for r in records {
            serde_json::to_writer(&mut buf, r)?;
            buf.push(b'\n');
        }

        let path = self.path.clone();
        let file = self.file().await?;
        let before = file.metadata().await?.len();
        let written = async {
            file.write_all(&buf).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = written {
            // roll back to the last complete batch
            if let Err(trunc) = file.set_len(before).await {
                warn!(path = %path.display(), error = %trunc, "could not roll back partial sink write");
            }
            self.file = None;
            return Err(PipelineError::Sink(format!("{}: {e}", path.display())));
        }
        Ok(())
    }
}
