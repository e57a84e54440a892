use async_trait::async_trait;
use log::{debug, error};
use std::path::Path;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::utils::error::ModbusError;

#[async_trait]
pub trait DataSender: Send + Sync {
    async fn send(&self, data: &str) -> Result<(), ModbusError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

pub struct ConsoleSender;

#[async_trait]
impl DataSender for ConsoleSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        println!("{}", data.trim_end());
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

pub struct FileSender {
    file_path: String,
    append: bool,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P, append: bool) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
            append,
        }
    }
}

#[async_trait]
impl DataSender for FileSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        debug!("📝 Writing {} bytes to {}", data.len(), self.file_path);

        if let Some(parent) = Path::new(&self.file_path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let line = format!("{}\n", data.trim_end());
        if self.append {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.file_path)
                .await
                .map_err(|e| {
                    error!("❌ Failed to open file {}: {}", self.file_path, e);
                    ModbusError::CommunicationError(format!("File open error: {}", e))
                })?;

            file.write_all(line.as_bytes()).await.map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                ModbusError::CommunicationError(format!("File write error: {}", e))
            })?;

            // tokio hands the write to a blocking task; wait for it to land.
            file.flush().await.map_err(|e| {
                error!("❌ Failed to flush file {}: {}", self.file_path, e);
                ModbusError::CommunicationError(format!("File flush error: {}", e))
            })?;
        } else {
            fs::write(&self.file_path, line).await.map_err(|e| {
                error!("❌ Failed to write to file {}: {}", self.file_path, e);
                ModbusError::CommunicationError(format!("File write error: {}", e))
            })?;
        }

        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

/// Hands each published message to an in-process subscriber.
pub struct ChannelSender {
    topic: String,
    tx: mpsc::Sender<String>,
}

impl ChannelSender {
    pub fn new(topic: String, capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { topic, tx }, rx)
    }
}

#[async_trait]
impl DataSender for ChannelSender {
    async fn send(&self, data: &str) -> Result<(), ModbusError> {
        // A slow subscriber drops messages rather than stalling the cycle.
        self.tx.try_send(data.to_string()).map_err(|e| {
            ModbusError::CommunicationError(format!(
                "Channel {} rejected message: {}",
                self.topic, e
            ))
        })
    }

    fn sender_type(&self) -> &str {
        "channel"
    }

    fn destination(&self) -> &str {
        &self.topic
    }
}
