use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::gateway::PersistenceGateway;
use super::errors::{QueueError, Result};
use super::simulator::{OutcomeSource, WeightedOutcome};
use super::types::{
    FileId, FileInput, FileRecord, QueueCommand, QueueEvent, QueueStats, RemovalOutcome,
};
use super::worker::QueueWorker;

/// 命令通道缓冲
const COMMAND_CHANNEL_CAPACITY: usize = 100;
/// 最大缓存 256 个事件
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// 上传队列管理器的公开句柄
///
/// 可克隆；所有操作转成命令发给 worker，单条记录的变更全序由 worker 保证。
#[derive(Clone)]
pub struct UploadQueueManager {
    command_tx: mpsc::Sender<QueueCommand>,
    event_tx: broadcast::Sender<QueueEvent>,
}

/// 管理器句柄 - 包含管理器和工作任务
pub struct UploadQueueHandle {
    pub manager: UploadQueueManager,
    pub worker_handle: JoinHandle<()>,
}

impl UploadQueueHandle {
    /// 释放所有句柄并等待 worker 退出
    pub async fn shutdown(self) -> Result<()> {
        drop(self.manager);
        self.worker_handle
            .await
            .map_err(|err| QueueError::internal(format!("Worker panic: {}", err)))
    }
}

impl UploadQueueManager {
    pub fn new(config: QueueConfig, gateway: Arc<dyn PersistenceGateway>) -> UploadQueueHandle {
        let outcome = Arc::new(WeightedOutcome::new(config.success_probability));
        Self::with_outcome_source(config, gateway, outcome)
    }

    /// Inject a custom terminal-outcome source (real transports, deterministic tests)
    pub fn with_outcome_source(
        config: QueueConfig,
        gateway: Arc<dyn PersistenceGateway>,
        outcome: Arc<dyn OutcomeSource>,
    ) -> UploadQueueHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let worker_handle = tokio::spawn(QueueWorker::run(
            config,
            gateway,
            outcome,
            command_rx,
            event_tx.clone(),
        ));

        UploadQueueHandle {
            manager: Self { command_tx, event_tx },
            worker_handle,
        }
    }

    /// Queue raw file inputs
    ///
    /// 超出大小限制的输入不会入队，也不出现在返回值里；
    /// 调用方通过 `QueueEvent::OversizedRejected` 观察被排除的文件。
    pub async fn add_files(&self, inputs: Vec<FileInput>) -> Result<Vec<FileId>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::AddFiles { inputs, reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Start an upload attempt; no-op unless the record exists and is idle
    pub async fn start_upload(&self, id: FileId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::StartUpload { id, reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Retry a failed upload; no-op unless the record exists and is in error
    pub async fn retry_upload(&self, id: FileId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::RetryUpload { id, reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Remove a record
    ///
    /// 本地移除立即生效且不回滚；若有远端记录，返回值会带上删除结果。
    pub async fn remove_file(&self, id: FileId) -> Result<RemovalOutcome> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::RemoveFile { id, reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Clear the whole queue, returning the number of records dropped
    pub async fn clear_all(&self) -> Result<usize> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::ClearAll { reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Aggregate stats over the current collection
    pub async fn stats(&self) -> Result<QueueStats> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::GetStats { reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Snapshot of all records in intake order
    pub async fn snapshot(&self) -> Result<Vec<FileRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::Snapshot { reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// Snapshot of a single record
    pub async fn get_record(&self, id: FileId) -> Result<Option<FileRecord>> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.command_tx
            .send(QueueCommand::GetRecord { id, reply: reply_tx })
            .await
            .map_err(|_| QueueError::ManagerShutdown)?;

        reply_rx.await.map_err(|_| QueueError::ManagerShutdown)
    }

    /// 订阅队列事件
    ///
    /// 注意：
    /// - 接收速度跟不上时可能丢失事件（lagged error）
    /// - 每个订阅者都会收到完整的事件副本
    pub fn subscribe_events(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }
}
