use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::gateway::{GatewayError, NewUploadRecord, PersistenceGateway, RemoteRecord};
use super::preview;
use super::simulator::{OutcomeSource, ProgressSimulator, SimMessage, SimulatorTuning};
use super::types::{
    FileId, FileInput, FileRecord, QueueCommand, QueueEvent, QueueStats, RemovalOutcome,
    UploadStatus,
};

/// 模拟传输失败时的错误文案
pub(crate) const SIMULATED_FAILURE_MESSAGE: &str = "network error occurred";
/// 持久化失败降级时的错误文案
pub(crate) const PERSIST_FAILURE_MESSAGE: &str = "failed to persist upload record";

/// 记录及其当前尝试的运行时句柄
struct RecordHandle {
    record: FileRecord,
    /// 每次开始上传 +1，用于丢弃过期模拟器消息
    attempt: u32,
    token: Option<CancellationToken>,
}

pub(crate) struct QueueWorker {
    config: QueueConfig,
    gateway: Arc<dyn PersistenceGateway>,
    outcome: Arc<dyn OutcomeSource>,
    records: HashMap<FileId, RecordHandle>,
    /// 入队顺序
    order: Vec<FileId>,
    event_tx: broadcast::Sender<QueueEvent>,
    sim_tx: mpsc::UnboundedSender<SimMessage>,
}

impl QueueWorker {
    pub(crate) async fn run(
        config: QueueConfig,
        gateway: Arc<dyn PersistenceGateway>,
        outcome: Arc<dyn OutcomeSource>,
        mut command_rx: mpsc::Receiver<QueueCommand>,
        event_tx: broadcast::Sender<QueueEvent>,
    ) {
        let (sim_tx, mut sim_rx) = mpsc::unbounded_channel();
        let mut worker = Self {
            config,
            gateway,
            outcome,
            records: HashMap::new(),
            order: Vec::new(),
            event_tx,
            sim_tx,
        };

        worker.rehydrate().await;

        // 主事件循环：命令与模拟器消息都在这里串行处理，
        // 单条记录的变更因此天然有序
        loop {
            tokio::select! {
                command = command_rx.recv() => {
                    match command {
                        Some(command) => worker.handle_command(command).await,
                        // 所有管理器句柄都已释放
                        None => break,
                    }
                }
                Some(message) = sim_rx.recv() => {
                    worker.handle_sim_message(message);
                }
            }
        }
    }

    /// 启动时从网关恢复已持久化的上传记录
    async fn rehydrate(&mut self) {
        match self.gateway.list_all().await {
            Ok(remotes) => {
                let count = remotes.len();
                for remote in remotes {
                    let record = FileRecord::from_remote(remote);
                    self.order.push(record.id);
                    self.records.insert(record.id, RecordHandle {
                        record,
                        attempt: 0,
                        token: None,
                    });
                }
                if count > 0 {
                    info!(count, "restored persisted uploads");
                }
            }
            Err(err) => warn!("failed to list persisted uploads: {err}"),
        }
    }

    async fn handle_command(&mut self, command: QueueCommand) {
        match command {
            QueueCommand::AddFiles { inputs, reply } => {
                let ids = self.add_files(inputs).await;
                let _ = reply.send(ids);
            }
            QueueCommand::StartUpload { id, reply } => {
                self.start_upload(id);
                let _ = reply.send(());
            }
            QueueCommand::RetryUpload { id, reply } => {
                self.retry_upload(id);
                let _ = reply.send(());
            }
            QueueCommand::RemoveFile { id, reply } => {
                self.remove_file(id, reply);
            }
            QueueCommand::ClearAll { reply } => {
                let count = self.clear_all();
                let _ = reply.send(count);
            }
            QueueCommand::GetStats { reply } => {
                let _ = reply.send(self.stats());
            }
            QueueCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            QueueCommand::GetRecord { id, reply } => {
                let record = self.records.get(&id).map(|handle| handle.record.clone());
                let _ = reply.send(record);
            }
        }
    }

    fn handle_sim_message(&mut self, message: SimMessage) {
        match message {
            SimMessage::AutoStart { ids } => {
                for id in ids {
                    self.start_upload(id);
                }
            }
            SimMessage::StartAttempt { id } => self.start_upload(id),
            SimMessage::Advance { id, attempt, progress } => {
                self.apply_progress(id, attempt, progress);
            }
            SimMessage::Resolve { id, attempt, success } => {
                self.resolve_attempt(id, attempt, success);
            }
            SimMessage::Persisted { id, attempt, result } => {
                self.finish_persist(id, attempt, result);
            }
        }
    }

    async fn add_files(&mut self, inputs: Vec<FileInput>) -> Vec<FileId> {
        let limit = self.config.max_file_size_bytes;
        let mut kept = Vec::new();

        for input in inputs {
            let size = input.size_bytes();
            if size > limit {
                warn!(name = %input.name, size, limit, "rejecting oversized file");
                self.emit(QueueEvent::OversizedRejected {
                    name: input.name,
                    size_bytes: size,
                    limit,
                });
                continue;
            }
            kept.push(input);
        }

        // 预览并行生成，入队保持提交顺序
        let previews = futures::future::join_all(
            kept.iter().map(|input| preview::generate(&input.content, &input.mime_type)),
        )
        .await;

        let mut accepted = Vec::with_capacity(kept.len());
        for (input, preview) in kept.into_iter().zip(previews) {
            let record = FileRecord::new(&input, preview);
            let id = record.id;

            self.order.push(id);
            self.records.insert(id, RecordHandle {
                record,
                attempt: 0,
                token: None,
            });
            self.emit(QueueEvent::FileQueued { id });
            accepted.push(id);
        }

        // 防抖延迟后对本批次所有记录自动开始上传
        if !accepted.is_empty() {
            let ids = accepted.clone();
            let delay = self.config.auto_start_delay;
            let sim_tx = self.sim_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = sim_tx.send(SimMessage::AutoStart { ids });
            });
        }

        accepted
    }

    /// 仅当记录存在且处于 Idle 时开始一次尝试
    fn start_upload(&mut self, id: FileId) {
        let Some(handle) = self.records.get_mut(&id) else {
            debug!(%id, "start requested for unknown record");
            return;
        };
        if handle.record.status != UploadStatus::Idle {
            return;
        }

        handle.attempt += 1;
        handle.record.progress = 0.0;
        handle.record.error_message = None;

        let attempt = handle.attempt;
        let token = CancellationToken::new();
        handle.token = Some(token.clone());

        self.transition(id, UploadStatus::Uploading);

        let simulator = ProgressSimulator {
            id,
            attempt,
            tuning: SimulatorTuning {
                tick_interval: self.config.tick_interval,
                min_step: self.config.min_step,
                max_step: self.config.max_step,
                settle_delay: self.config.settle_delay,
            },
            outcome: self.outcome.clone(),
            token,
            sim_tx: self.sim_tx.clone(),
        };
        tokio::spawn(simulator.run());
    }

    /// 仅对 Error 记录生效：重置后延迟重新开始
    fn retry_upload(&mut self, id: FileId) {
        let Some(handle) = self.records.get_mut(&id) else {
            debug!(%id, "retry requested for unknown record");
            return;
        };
        if handle.record.status != UploadStatus::Error {
            return;
        }

        handle.record.progress = 0.0;
        handle.record.error_message = None;
        self.transition(id, UploadStatus::Idle);

        let delay = self.config.retry_delay;
        let sim_tx = self.sim_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = sim_tx.send(SimMessage::StartAttempt { id });
        });
    }

    /// 本地移除立即生效；远端删除在循环外进行，结果直接回给调用方
    fn remove_file(&mut self, id: FileId, reply: oneshot::Sender<RemovalOutcome>) {
        let Some(mut handle) = self.records.remove(&id) else {
            let _ = reply.send(RemovalOutcome::NotFound);
            return;
        };
        self.order.retain(|other| *other != id);

        // 打断在途的模拟任务
        if let Some(token) = handle.token.take() {
            token.cancel();
        }
        self.emit(QueueEvent::Removed { id });

        match handle.record.remote_id {
            None => {
                let _ = reply.send(RemovalOutcome::Removed);
            }
            Some(remote_id) => {
                let gateway = self.gateway.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let outcome = match gateway.delete(&remote_id).await {
                        Ok(()) => RemovalOutcome::RemovedWithRemote,
                        Err(err) => {
                            let error = err.to_string();
                            warn!(%id, %remote_id, error = %error, "failed to delete remote record");
                            let _ = event_tx.send(QueueEvent::RemoteDeleteFailed {
                                id,
                                remote_id: remote_id.clone(),
                                error: error.clone(),
                            });
                            RemovalOutcome::RemoteDeleteFailed { remote_id, error }
                        }
                    };
                    let _ = reply.send(outcome);
                });
            }
        }
    }

    fn clear_all(&mut self) -> usize {
        let handles: Vec<RecordHandle> = self.records.drain().map(|(_, handle)| handle).collect();
        self.order.clear();
        let count = handles.len();

        for mut handle in handles {
            if let Some(token) = handle.token.take() {
                token.cancel();
            }

            // 远端清理是显式配置的选择，默认只清本地
            if self.config.purge_remote_on_clear {
                if let Some(remote_id) = handle.record.remote_id.take() {
                    let id = handle.record.id;
                    let gateway = self.gateway.clone();
                    let event_tx = self.event_tx.clone();
                    tokio::spawn(async move {
                        if let Err(err) = gateway.delete(&remote_id).await {
                            let error = err.to_string();
                            warn!(%id, %remote_id, error = %error, "failed to delete remote record on clear");
                            let _ = event_tx.send(QueueEvent::RemoteDeleteFailed {
                                id,
                                remote_id,
                                error,
                            });
                        }
                    });
                }
            }
        }

        self.emit(QueueEvent::Cleared { count });
        count
    }

    /// 按 id 在存活集合中重新查找后应用进度，丢弃过期尝试的消息
    fn apply_progress(&mut self, id: FileId, attempt: u32, progress: f64) {
        let Some(handle) = self.records.get_mut(&id) else {
            return;
        };
        if handle.attempt != attempt || handle.record.status != UploadStatus::Uploading {
            return;
        }

        // 进度只增不减
        let value = progress.min(100.0);
        if value > handle.record.progress {
            handle.record.progress = value;
            self.emit(QueueEvent::Progress { id, progress: value });
        }
    }

    fn resolve_attempt(&mut self, id: FileId, attempt: u32, success: bool) {
        match self.records.get_mut(&id) {
            Some(handle)
                if handle.attempt == attempt
                    && handle.record.status == UploadStatus::Uploading =>
            {
                handle.token = None;
                if success {
                    handle.record.progress = 100.0;
                    handle.record.completed_at = Some(chrono::Utc::now());
                } else {
                    // 失败时进度保留在最后的值
                    handle.record.error_message = Some(SIMULATED_FAILURE_MESSAGE.to_string());
                }
            }
            _ => return,
        }

        if success {
            self.transition(id, UploadStatus::Success);
            info!(%id, "upload completed");
            self.emit(QueueEvent::Completed { id });
            self.persist(id, attempt);
        } else {
            self.transition(id, UploadStatus::Error);
            warn!(%id, "upload failed");
            self.emit(QueueEvent::Failed {
                id,
                error: SIMULATED_FAILURE_MESSAGE.to_string(),
            });
        }
    }

    /// 成功后异步持久化，结果经内部通道回流；网关卡住不影响其他记录
    fn persist(&self, id: FileId, attempt: u32) {
        let Some(handle) = self.records.get(&id) else {
            return;
        };
        let payload = NewUploadRecord::from_record(&handle.record);
        let gateway = self.gateway.clone();
        let sim_tx = self.sim_tx.clone();
        tokio::spawn(async move {
            let result = gateway.create(payload).await;
            let _ = sim_tx.send(SimMessage::Persisted { id, attempt, result });
        });
    }

    fn finish_persist(
        &mut self,
        id: FileId,
        attempt: u32,
        result: Result<RemoteRecord, GatewayError>,
    ) {
        let Some(handle) = self.records.get_mut(&id) else {
            debug!(%id, "record removed before persistence finished");
            return;
        };
        if handle.attempt != attempt || handle.record.status != UploadStatus::Success {
            return;
        }

        match result {
            Ok(remote) => {
                // remote_id 最多设置一次
                if handle.record.remote_id.is_some() {
                    return;
                }
                handle.record.remote_id = Some(remote.id.clone());
                self.emit(QueueEvent::Persisted { id, remote_id: remote.id });
            }
            Err(err) => {
                let error = err.to_string();
                handle.record.error_message = Some(PERSIST_FAILURE_MESSAGE.to_string());
                warn!(%id, error = %error, "failed to persist upload record");
                // 不能让记录停留在虚假的成功态
                self.transition(id, UploadStatus::Error);
                self.emit(QueueEvent::PersistFailed { id, error });
            }
        }
    }

    fn stats(&self) -> QueueStats {
        QueueStats::from_records(self.records.values().map(|handle| &handle.record))
    }

    /// 按入队顺序的快照
    fn snapshot(&self) -> Vec<FileRecord> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id))
            .map(|handle| handle.record.clone())
            .collect()
    }

    /// 应用一次状态迁移并广播；非法迁移直接拒绝
    fn transition(&mut self, id: FileId, new_status: UploadStatus) -> bool {
        let Some(handle) = self.records.get_mut(&id) else {
            return false;
        };
        let old_status = handle.record.status;
        if !old_status.can_transition(new_status) {
            debug!(%id, ?old_status, ?new_status, "refusing invalid status transition");
            return false;
        }
        handle.record.status = new_status;
        self.emit(QueueEvent::StatusChanged {
            id,
            old_status,
            new_status,
        });
        true
    }

    fn emit(&self, event: QueueEvent) {
        // 没有订阅者时发送失败是正常情况
        let _ = self.event_tx.send(event);
    }
}
