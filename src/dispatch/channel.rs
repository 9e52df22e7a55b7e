/// In-process dispatch over a tokio channel.
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{DispatchQueue, ImportTask};
use crate::error::{ImportError, Result};

pub struct ChannelDispatchQueue {
    tx: mpsc::UnboundedSender<ImportTask>,
}

impl ChannelDispatchQueue {
    /// Create the queue and the receiving end for an in-process worker.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ImportTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl DispatchQueue for ChannelDispatchQueue {
    fn name(&self) -> &str {
        "channel"
    }

    async fn publish(&self, task: ImportTask) -> Result<()> {
        self.tx
            .send(task)
            .map_err(|_| ImportError::Dispatch("worker channel closed".into()))
    }
}
