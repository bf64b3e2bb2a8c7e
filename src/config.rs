//! 队列运行参数

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::Result;

// 用毫秒序列化 Duration
fn serialize_duration_ms<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}

fn deserialize_duration_ms<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let millis = u64::deserialize(deserializer)?;
    Ok(Duration::from_millis(millis))
}

/// 上传队列配置
///
/// 所有时间字段在 TOML 里以毫秒整数表示。
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 单文件大小上限（字节），超出的文件在入队时被排除
    pub max_file_size_bytes: u64,
    /// 进度推进间隔
    #[serde(
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub tick_interval: Duration,
    /// 单次推进的最小增量（百分点）
    pub min_step: f64,
    /// 单次推进的最大增量（百分点）
    pub max_step: f64,
    /// 进度到 100 后的结算延迟
    #[serde(
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub settle_delay: Duration,
    /// 入队后自动开始上传前的防抖延迟
    #[serde(
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub auto_start_delay: Duration,
    /// 重试确认后重新开始前的延迟
    #[serde(
        serialize_with = "serialize_duration_ms",
        deserialize_with = "deserialize_duration_ms"
    )]
    pub retry_delay: Duration,
    /// 单次尝试成功的概率，[0, 1]
    pub success_probability: f64,
    /// clear_all 时是否同时删除远端记录
    pub purge_remote_on_clear: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024, // 50MB
            tick_interval: Duration::from_millis(200),
            min_step: 0.0,
            max_step: 20.0,
            settle_delay: Duration::from_millis(300),
            auto_start_delay: Duration::from_millis(500),
            retry_delay: Duration::from_millis(100),
            success_probability: 0.9,
            purge_remote_on_clear: false,
        }
    }
}

impl QueueConfig {
    /// 从 TOML 文件加载；缺失的字段取默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}
