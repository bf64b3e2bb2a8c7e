pub mod config;
pub mod gateway;
pub mod queue;

// 重新导出核心类型
pub use config::QueueConfig;
pub use gateway::{
    GatewayError,
    HttpGateway,
    MemoryGateway,
    NewUploadRecord,
    PersistenceGateway,
    RemoteId,
    RemoteRecord,
};
pub use queue::{
    FileId,
    FileInput,
    FileIntake,
    FileRecord,
    QueueError,
    QueueEvent,
    QueueStats,
    RemovalOutcome,
    Result,
    UploadQueueHandle,
    UploadQueueManager,
    UploadStatus,
};
