//! 上传队列核心模块
//!
//! actor 结构：`UploadQueueManager` 把操作转成命令发给单个 `QueueWorker`，
//! worker 独占记录集合，进度模拟和持久化都在独立任务里跑、消息回流。

mod errors;
mod intake;
mod manager;
mod simulator;
mod types;
mod worker;

pub mod preview;

pub use errors::{QueueError, Result};
pub use intake::{FileIntake, RejectReason, RejectedFile, mime_matches};
pub use manager::{UploadQueueHandle, UploadQueueManager};
pub use simulator::{OutcomeSource, WeightedOutcome};
pub use types::{
    FileId, FileInput, FileRecord, QueueEvent, QueueStats, RemovalOutcome, UploadStatus,
};
