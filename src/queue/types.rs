use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::gateway::{RemoteId, RemoteRecord};

/// 队列内文件记录的唯一标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 上传状态枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// 等待开始
    Idle,
    /// 上传中
    Uploading,
    /// 已完成
    Success,
    /// 失败（可重试）
    Error,
}

impl UploadStatus {
    /// 校验状态迁移是否合法
    ///
    /// `Success -> Error` 仅用于远端持久化失败时的降级。
    pub fn can_transition(self, to: UploadStatus) -> bool {
        use UploadStatus::*;

        matches!(
            (self, to),
            (Idle, Uploading)
                | (Uploading, Success)
                | (Uploading, Error)
                | (Success, Error)
                | (Error, Idle)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Success | UploadStatus::Error)
    }
}

/// 入队前的原始文件数据
#[derive(Debug, Clone)]
pub struct FileInput {
    pub name: String,
    pub mime_type: String,
    pub content: Bytes,
}

impl FileInput {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            content: content.into(),
        }
    }

    pub fn size_bytes(&self) -> u64 {
        self.content.len() as u64
    }
}

/// 队列中的一个文件及其生命周期状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// 本地标识，记录存活期间保持稳定
    pub id: FileId,
    /// 持久化成功后由网关分配，最多设置一次
    pub remote_id: Option<RemoteId>,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// 图片类型的 data URL 预览，设置后不再变更
    pub preview: Option<String>,
    /// 0..=100，上传中单调不减
    pub progress: f64,
    pub status: UploadStatus,
    /// 仅在 Error 状态存在
    pub error_message: Option<String>,
    /// 成功时设置一次
    pub completed_at: Option<DateTime<Utc>>,
}

impl FileRecord {
    pub(crate) fn new(input: &FileInput, preview: Option<String>) -> Self {
        Self {
            id: FileId::new(),
            remote_id: None,
            name: input.name.clone(),
            size_bytes: input.size_bytes(),
            mime_type: input.mime_type.clone(),
            preview,
            progress: 0.0,
            status: UploadStatus::Idle,
            error_message: None,
            completed_at: None,
        }
    }

    /// Map a persisted record back into queue shape
    pub(crate) fn from_remote(remote: RemoteRecord) -> Self {
        Self {
            id: FileId::new(),
            remote_id: Some(remote.id),
            name: remote.name,
            size_bytes: remote.size_bytes,
            mime_type: remote.mime_type,
            preview: remote.preview,
            // 持久化过的记录一律按已完成展示
            progress: 100.0,
            status: remote.status.unwrap_or(UploadStatus::Success),
            error_message: None,
            completed_at: remote.created_at,
        }
    }
}

/// 聚合统计 - 每次查询从当前集合重新计算
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub uploading: usize,
    pub idle: usize,
}

impl QueueStats {
    pub(crate) fn from_records<'a>(records: impl Iterator<Item = &'a FileRecord>) -> Self {
        let mut stats = Self {
            total: 0,
            completed: 0,
            failed: 0,
            uploading: 0,
            idle: 0,
        };

        for record in records {
            stats.total += 1;
            match record.status {
                UploadStatus::Idle => stats.idle += 1,
                UploadStatus::Uploading => stats.uploading += 1,
                UploadStatus::Success => stats.completed += 1,
                UploadStatus::Error => stats.failed += 1,
            }
        }

        stats
    }
}

/// removeFile 的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    /// 记录不存在，按无操作处理（迟到的调用）
    NotFound,
    /// 已移除，没有对应的远端记录
    Removed,
    /// 已移除，远端记录删除成功
    RemovedWithRemote,
    /// 本地已移除，远端删除失败（不会自动重试）
    RemoteDeleteFailed {
        remote_id: RemoteId,
        error: String,
    },
}

/// 队列事件
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// 新记录入队
    FileQueued {
        id: FileId,
    },
    /// 超出大小限制被排除，未进入集合
    OversizedRejected {
        name: String,
        size_bytes: u64,
        limit: u64,
    },
    /// 状态变更
    StatusChanged {
        id: FileId,
        old_status: UploadStatus,
        new_status: UploadStatus,
    },
    /// 进度更新
    Progress {
        id: FileId,
        progress: f64,
    },
    /// 上传完成
    Completed {
        id: FileId,
    },
    /// 上传失败
    Failed {
        id: FileId,
        error: String,
    },
    /// 远端持久化成功
    Persisted {
        id: FileId,
        remote_id: RemoteId,
    },
    /// 远端持久化失败，记录已降级为 Error
    PersistFailed {
        id: FileId,
        error: String,
    },
    /// 记录被移除
    Removed {
        id: FileId,
    },
    /// 移除时的远端删除失败
    RemoteDeleteFailed {
        id: FileId,
        remote_id: RemoteId,
        error: String,
    },
    /// 队列被清空
    Cleared {
        count: usize,
    },
}

/// 管理器命令
pub(crate) enum QueueCommand {
    AddFiles {
        inputs: Vec<FileInput>,
        reply: oneshot::Sender<Vec<FileId>>,
    },
    StartUpload {
        id: FileId,
        reply: oneshot::Sender<()>,
    },
    RetryUpload {
        id: FileId,
        reply: oneshot::Sender<()>,
    },
    RemoveFile {
        id: FileId,
        reply: oneshot::Sender<RemovalOutcome>,
    },
    ClearAll {
        reply: oneshot::Sender<usize>,
    },
    GetStats {
        reply: oneshot::Sender<QueueStats>,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<FileRecord>>,
    },
    GetRecord {
        id: FileId,
        reply: oneshot::Sender<Option<FileRecord>>,
    },
}

// 静态断言确保类型是 Send 的
const _: () = {
    fn assert_send<T: Send>() {}
    fn assert_types() {
        assert_send::<FileRecord>();
        assert_send::<QueueEvent>();
        assert_send::<QueueStats>();
    }
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use UploadStatus::*;

        // valid
        assert!(Idle.can_transition(Uploading));
        assert!(Uploading.can_transition(Success));
        assert!(Uploading.can_transition(Error));
        assert!(Error.can_transition(Idle));
        // 持久化失败的降级
        assert!(Success.can_transition(Error));

        // invalid
        assert!(!Success.can_transition(Uploading));
        assert!(!Success.can_transition(Idle));
        assert!(!Error.can_transition(Uploading));
        assert!(!Idle.can_transition(Success));
        assert!(!Idle.can_transition(Error));
        assert!(!Uploading.can_transition(Idle));
    }

    #[test]
    fn test_file_id_generation() {
        let id1 = FileId::new();
        let id2 = FileId::new();

        assert_ne!(id1, id2);
        assert!(!id1.to_string().is_empty());
    }

    #[test]
    fn test_status_wire_shape() {
        assert_eq!(serde_json::to_value(UploadStatus::Idle).unwrap(), "idle");
        assert_eq!(serde_json::to_value(UploadStatus::Uploading).unwrap(), "uploading");
        assert_eq!(serde_json::to_value(UploadStatus::Success).unwrap(), "success");
        assert_eq!(serde_json::to_value(UploadStatus::Error).unwrap(), "error");
    }

    #[test]
    fn test_record_captures_input_metadata() {
        let input = FileInput::new("photo.png", "image/png", vec![1u8, 2, 3]);
        let record = FileRecord::new(&input, None);

        assert_eq!(record.name, "photo.png");
        assert_eq!(record.size_bytes, 3);
        assert_eq!(record.mime_type, "image/png");
        assert_eq!(record.status, UploadStatus::Idle);
        assert_eq!(record.progress, 0.0);
        assert!(record.remote_id.is_none());
        assert!(record.completed_at.is_none());
    }

    #[test]
    fn test_stats_partition() {
        let input = FileInput::new("a.bin", "application/octet-stream", vec![0u8; 4]);
        let mut records: Vec<FileRecord> = (0..4).map(|_| FileRecord::new(&input, None)).collect();
        records[0].status = UploadStatus::Uploading;
        records[1].status = UploadStatus::Success;
        records[2].status = UploadStatus::Error;

        let stats = QueueStats::from_records(records.iter());
        assert_eq!(stats.total, 4);
        assert_eq!(stats.uploading, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.idle, 1);
        assert_eq!(
            stats.completed + stats.failed + stats.uploading + stats.idle,
            stats.total
        );
    }
}
