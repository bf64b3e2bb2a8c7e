use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::gateway::{GatewayError, RemoteRecord};
use super::types::FileId;

/// 终态结果来源
///
/// 默认实现按概率抽取；接真实传输后端时用实际结果替换。
pub trait OutcomeSource: Send + Sync {
    /// true 表示本次尝试成功
    fn draw(&self) -> bool;
}

/// 按固定概率抽取成功
#[derive(Debug, Clone)]
pub struct WeightedOutcome {
    success_probability: f64,
}

impl WeightedOutcome {
    pub fn new(success_probability: f64) -> Self {
        Self {
            success_probability: success_probability.clamp(0.0, 1.0),
        }
    }
}

impl OutcomeSource for WeightedOutcome {
    fn draw(&self) -> bool {
        rand::thread_rng().gen_bool(self.success_probability)
    }
}

/// 模拟器节奏参数
#[derive(Debug, Clone)]
pub(crate) struct SimulatorTuning {
    pub tick_interval: Duration,
    pub min_step: f64,
    pub max_step: f64,
    pub settle_delay: Duration,
}

/// 模拟器与持久化任务发回给 worker 的内部消息
///
/// 所有变更都由 worker 按 id 在存活集合中重新查找后应用，
/// attempt 不匹配的过期消息直接丢弃。
pub(crate) enum SimMessage {
    /// 防抖延迟后的批量自动开始
    AutoStart { ids: Vec<FileId> },
    /// 重试延迟后的单条开始
    StartAttempt { id: FileId },
    /// 进度推进（绝对值，已截断到 100）
    Advance {
        id: FileId,
        attempt: u32,
        progress: f64,
    },
    /// 终态判定
    Resolve {
        id: FileId,
        attempt: u32,
        success: bool,
    },
    /// 持久化调用结果
    Persisted {
        id: FileId,
        attempt: u32,
        result: Result<RemoteRecord, GatewayError>,
    },
}

/// 单次上传尝试的进度模拟任务
///
/// 每条记录同一时刻最多一个在跑；取消令牌在移除/清空时打断它。
pub(crate) struct ProgressSimulator {
    pub id: FileId,
    pub attempt: u32,
    pub tuning: SimulatorTuning,
    pub outcome: Arc<dyn OutcomeSource>,
    pub token: CancellationToken,
    pub sim_tx: mpsc::UnboundedSender<SimMessage>,
}

impl ProgressSimulator {
    pub async fn run(self) {
        let mut progress = 0.0_f64;
        let mut ticker = tokio::time::interval(self.tuning.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // interval 的第一次 tick 立即完成，先吃掉
        ticker.tick().await;

        while progress < 100.0 {
            tokio::select! {
                _ = self.token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let step = rand::thread_rng().gen_range(self.tuning.min_step..=self.tuning.max_step);
            progress = (progress + step).min(100.0);

            let message = SimMessage::Advance {
                id: self.id,
                attempt: self.attempt,
                progress,
            };
            if self.sim_tx.send(message).is_err() {
                // worker 已退出
                return;
            }
        }

        // 到达 100 后等结算延迟，再判定成败
        tokio::select! {
            _ = self.token.cancelled() => return,
            _ = tokio::time::sleep(self.tuning.settle_delay) => {}
        }

        let success = self.outcome.draw();
        let _ = self.sim_tx.send(SimMessage::Resolve {
            id: self.id,
            attempt: self.attempt,
            success,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_outcome_extremes() {
        let always = WeightedOutcome::new(1.0);
        let never = WeightedOutcome::new(0.0);

        for _ in 0..50 {
            assert!(always.draw());
            assert!(!never.draw());
        }
    }

    #[test]
    fn test_weighted_outcome_clamps_probability() {
        // 超界概率不应 panic
        assert!(WeightedOutcome::new(3.0).draw());
        assert!(!WeightedOutcome::new(-1.0).draw());
    }

    #[tokio::test]
    async fn test_simulator_reports_monotonic_progress() {
        let (sim_tx, mut sim_rx) = mpsc::unbounded_channel();
        let simulator = ProgressSimulator {
            id: FileId::new(),
            attempt: 1,
            tuning: SimulatorTuning {
                tick_interval: Duration::from_millis(1),
                min_step: 30.0,
                max_step: 40.0,
                settle_delay: Duration::from_millis(1),
            },
            outcome: Arc::new(WeightedOutcome::new(1.0)),
            token: CancellationToken::new(),
            sim_tx,
        };

        tokio::spawn(simulator.run());

        let mut last = 0.0;
        loop {
            match sim_rx.recv().await.expect("simulator dropped early") {
                SimMessage::Advance { progress, .. } => {
                    assert!(progress >= last);
                    assert!(progress <= 100.0);
                    last = progress;
                }
                SimMessage::Resolve { success, .. } => {
                    assert!(success);
                    assert_eq!(last, 100.0);
                    break;
                }
                _ => panic!("unexpected message"),
            }
        }
    }

    #[tokio::test]
    async fn test_cancelled_simulator_goes_quiet() {
        let (sim_tx, mut sim_rx) = mpsc::unbounded_channel();
        let token = CancellationToken::new();
        let simulator = ProgressSimulator {
            id: FileId::new(),
            attempt: 1,
            tuning: SimulatorTuning {
                tick_interval: Duration::from_millis(5),
                min_step: 1.0,
                max_step: 2.0,
                settle_delay: Duration::from_millis(5),
            },
            outcome: Arc::new(WeightedOutcome::new(1.0)),
            token: token.clone(),
            sim_tx,
        };

        let handle = tokio::spawn(simulator.run());
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        handle.await.unwrap();

        // 取消后不再有任何消息追加
        while let Ok(message) = sim_rx.try_recv() {
            assert!(matches!(message, SimMessage::Advance { .. }));
        }
    }
}
