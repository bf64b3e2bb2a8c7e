mod http;
mod memory;

pub use http::HttpGateway;
pub use memory::MemoryGateway;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::queue::{FileRecord, UploadStatus};

/// 远端记录标识 - 由持久化服务分配
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RemoteId(pub String);

impl RemoteId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 持久化服务中的一条上传记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RemoteId,
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub preview: Option<String>,
    /// 持久化时的状态，缺省按成功处理
    #[serde(default)]
    pub status: Option<UploadStatus>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// create 调用的载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewUploadRecord {
    pub name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    pub preview: Option<String>,
    pub status: UploadStatus,
}

impl NewUploadRecord {
    pub(crate) fn from_record(record: &FileRecord) -> Self {
        Self {
            name: record.name.clone(),
            size_bytes: record.size_bytes,
            mime_type: record.mime_type.clone(),
            preview: record.preview.clone(),
            status: record.status,
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP Request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }
}

/// 持久化网关 - 上传记录的外部存储契约
///
/// 队列只消费这个接口；服务端实现不在本 crate 范围内。
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// 创建一条上传记录，返回分配了远端标识的完整记录
    async fn create(&self, record: NewUploadRecord) -> Result<RemoteRecord, GatewayError>;

    /// 删除远端记录
    async fn delete(&self, remote_id: &RemoteId) -> Result<(), GatewayError>;

    /// 按远端标识读取单条记录
    async fn get(&self, remote_id: &RemoteId) -> Result<Option<RemoteRecord>, GatewayError>;

    /// 列出全部记录，启动时用于恢复队列
    async fn list_all(&self) -> Result<Vec<RemoteRecord>, GatewayError>;
}
