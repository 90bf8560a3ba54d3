//! Append-only JSON-lines revenue log.
//!
//! One [`PaymentSuccessEvent`] per line, in admission order. The file is
//! opened once at startup and never truncated.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use x402_paywall_axum::recorder::{PaymentSuccessEvent, RecorderError, RevenueRecorder};

#[derive(Debug)]
pub struct JsonlRevenueLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlRevenueLog {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, std::io::Error> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
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
impl RevenueRecorder for JsonlRevenueLog {
    async fn record(&self, event: &PaymentSuccessEvent) -> Result<(), RecorderError> {
        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}
