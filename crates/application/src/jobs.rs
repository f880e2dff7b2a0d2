//! 后台定时任务
//!
//! 定时任务本身不碰房间状态，只往协调器队列里投递命令。

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::error::ApplicationError;
use crate::room::RoomHandle;

pub struct BackgroundJobs {
    room: RoomHandle,
    accrual_interval: Option<Duration>,
    sweep_cron: String,
    started: AtomicBool,
}

/// 运行中的任务，停机时调用 `shutdown`
pub struct RunningJobs {
    accrual: Option<JoinHandle<()>>,
    scheduler: JobScheduler,
}

impl BackgroundJobs {
    pub fn new(room: RoomHandle, config: &config::RewardsConfig) -> Self {
        Self {
            room,
            accrual_interval: config
                .enabled
                .then(|| Duration::from_secs(config.accrual_interval_secs.max(1))),
            sweep_cron: config.sweep_cron.clone(),
            started: AtomicBool::new(false),
        }
    }

    /// 启动任务；同一实例重复调用返回 `None`
    pub async fn start(&self) -> Result<Option<RunningJobs>, ApplicationError> {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!("后台任务已经启动，忽略重复启动");
            return Ok(None);
        }

        let accrual = self.accrual_interval.map(|period| {
            let room = self.room.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(period);
                // 第一次 tick 立即返回，跳过
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if room.accrual_tick().await.is_err() {
                        info!("房间已关闭，停止在线积分发放");
                        break;
                    }
                }
            })
        });

        let scheduler = JobScheduler::new().await.map_err(scheduler_error)?;
        let room = self.room.clone();
        scheduler
            .add(
                Job::new_async_tz(self.sweep_cron.as_str(), chrono::Local, move |_uuid, _l| {
                    let room = room.clone();
                    Box::pin(async move {
                        if let Err(e) = room.request_sweep().await {
                            error!("投递清理任务失败: {}", e);
                        }
                    })
                })
                .map_err(scheduler_error)?,
            )
            .await
            .map_err(scheduler_error)?;
        scheduler.start().await.map_err(scheduler_error)?;

        info!(
            accrual_secs = self.accrual_interval.map(|period| period.as_secs()),
            sweep_cron = %self.sweep_cron,
            "后台任务已启动"
        );
        Ok(Some(RunningJobs { accrual, scheduler }))
    }
}

impl RunningJobs {
    pub async fn shutdown(mut self) {
        if let Some(accrual) = self.accrual.take() {
            accrual.abort();
        }
        if let Err(e) = self.scheduler.shutdown().await {
            warn!("停止定时调度器失败: {}", e);
        }
        info!("后台任务已停止");
    }
}

fn scheduler_error(err: tokio_cron_scheduler::JobSchedulerError) -> ApplicationError {
    ApplicationError::external(format!("定时任务调度失败: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gateway::ChannelGateway;
    use crate::red_packets::{RedPacketLedger, RedPacketPolicy};
    use crate::room::{ChatRoom, RoomDependencies, RoomSettings};
    use crate::store::memory::MemoryLedgerStore;
    use chrono::Utc;
    use domain::RedPacket;
    use std::sync::Arc;

    fn room() -> RoomHandle {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        ChatRoom::spawn(
            RoomSettings::default(),
            RoomDependencies {
                gateway: Box::new(ChannelGateway::new()),
                clock: clock.clone(),
                rewards: None,
                red_packets: Arc::new(RedPacketLedger::new(
                    Arc::new(MemoryLedgerStore::<RedPacket>::new()),
                    clock,
                    RedPacketPolicy::default(),
                )),
                star_replies: None,
            },
        )
    }

    #[tokio::test]
    async fn second_start_is_a_no_op() {
        let jobs = BackgroundJobs::new(room(), &config::RewardsConfig::default());
        let running = jobs.start().await.unwrap();
        assert!(running.is_some());
        assert!(jobs.start().await.unwrap().is_none());
        if let Some(running) = running {
            running.shutdown().await;
        }
    }

    #[tokio::test]
    async fn invalid_cron_is_reported() {
        let config = config::RewardsConfig {
            sweep_cron: "not a cron".into(),
            ..Default::default()
        };
        let jobs = BackgroundJobs::new(room(), &config);
        assert!(jobs.start().await.is_err());
    }
}
