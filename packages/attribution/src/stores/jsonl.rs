//! Newline-delimited JSON sink.
//!
//! One product outcome per line, written as each product finishes so a
//! crash loses at most the product in flight.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{AttributionError, Result};
use crate::traits::store::RecordSink;
use crate::types::outcome::ProductOutcome;

/// Appends product outcomes to a JSONL file.
pub struct JsonlSink {
    path: PathBuf,
    file: Mutex<File>,
}

fn storage(e: std::io::Error) -> AttributionError {
    AttributionError::Storage(Box::new(e))
}

impl JsonlSink {
    /// Create (or truncate) the file at `path`.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).await.map_err(storage)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Open `path` for appending, creating it if needed.
    pub async fn append(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(storage)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonlSink {
    async fn persist(&self, outcome: &ProductOutcome) -> Result<()> {
        let mut line = serde_json::to_string(outcome)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await.map_err(storage)?;
        file.flush().await.map_err(storage)?;

        debug!(path = %self.path.display(), product = %outcome.product.id, "Outcome persisted");
        Ok(())
    }
}
