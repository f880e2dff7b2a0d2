//! 积分查询、每日领取、在线发放与定时清理

use std::sync::Arc;

use domain::{ConnectionId, RewardKey, ServerEvent};
use tracing::{debug, info, warn};

use super::{ChatRoom, SweepReport};
use crate::error::ApplicationError;
use crate::rewards::RewardsLedger;

impl ChatRoom {
    /// 当前连接的积分账本与账户标识；不满足时返回可直接下发的失败文案
    fn points_context(&self, connection: ConnectionId) -> Result<(Arc<RewardsLedger>, RewardKey), &'static str> {
        let identity = self.registry.identity_of(connection).ok_or("用户验证失败")?;
        let rewards = self.rewards.clone().ok_or("积分功能未开启")?;
        let key = identity.reward_key.clone().ok_or("缺少积分账户标识")?;
        Ok((rewards, key))
    }

    pub(super) async fn on_get_points(&mut self, connection: ConnectionId) {
        let event = match self.points_context(connection) {
            Ok((rewards, key)) => match rewards.info(&key).await {
                Ok(info) => ServerEvent::PointsInfo(info),
                Err(err) => {
                    warn!(reward_key = %key, error = %err, "查询积分失败");
                    ServerEvent::PointsError {
                        message: err.to_string(),
                    }
                }
            },
            Err(message) => ServerEvent::PointsError {
                message: message.into(),
            },
        };
        self.gateway.send(connection, event);
    }

    pub(super) async fn on_claim_daily(&mut self, connection: ConnectionId) {
        let (rewards, key) = match self.points_context(connection) {
            Ok(context) => context,
            Err(message) => {
                self.gateway.send(
                    connection,
                    ServerEvent::ClaimPointsFailed {
                        message: message.into(),
                    },
                );
                return;
            }
        };

        let account = match rewards.claim_daily(&key).await {
            Ok(account) => account,
            Err(err) => {
                warn!(reward_key = %key, error = %err, "领取每日积分失败");
                self.gateway.send(
                    connection,
                    ServerEvent::ClaimPointsFailed {
                        message: err.to_string(),
                    },
                );
                return;
            }
        };

        let added_points = rewards.policy().daily_points;
        self.gateway.send(
            connection,
            ServerEvent::ClaimPointsSuccess {
                points: account.points,
                added_points,
            },
        );
        self.gateway.broadcast(ServerEvent::PointsUpdated {
            reward_key: key,
            points: account.points,
            added_points,
            can_claim_daily: false,
            last_claim_date: account.last_daily_claim,
        });
        let users = self.roster().await;
        self.gateway.broadcast(ServerEvent::UsersUpdated { users });
    }

    /// 为每个在线账户发放一次在线积分；同一账户多身份共享时只发一次
    pub(super) async fn on_accrual_tick(&mut self) {
        let Some(rewards) = self.rewards.clone() else {
            return;
        };
        let mut keys: Vec<RewardKey> = Vec::new();
        for key in self.registry.iter().filter_map(|identity| identity.reward_key.as_ref()) {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        if keys.is_empty() {
            debug!("没有在线积分账户，跳过发放");
            return;
        }

        let snapshots = match rewards
            .accrue(&keys, self.settings.accrual_points, self.settings.accrual_minutes)
            .await
        {
            Ok(snapshots) => snapshots,
            Err(err) => {
                warn!(error = %err, "在线积分发放失败");
                return;
            }
        };
        info!(accounts = snapshots.len(), points = self.settings.accrual_points, "在线积分发放");

        let targets: Vec<(ConnectionId, RewardKey)> = self
            .registry
            .iter()
            .filter_map(|identity| {
                identity
                    .reward_key
                    .clone()
                    .map(|key| (identity.connection, key))
            })
            .collect();
        for (connection, key) in targets {
            if let Some(snapshot) = snapshots.iter().find(|snapshot| snapshot.reward_key == key) {
                self.gateway
                    .send(connection, ServerEvent::PointsInfo(snapshot.clone()));
            }
        }
        let users = self.roster().await;
        self.gateway.broadcast(ServerEvent::UsersUpdated { users });
    }

    pub(super) async fn on_sweep(&mut self) -> Result<SweepReport, ApplicationError> {
        let removed_accounts = match &self.rewards {
            Some(rewards) => rewards.sweep_inactive().await?,
            None => 0,
        };
        let removed_red_packets = self.red_packets.cleanup().await?;

        if removed_accounts > 0 {
            self.gateway.broadcast(ServerEvent::SystemNotification {
                kind: "cleanup".into(),
                message: format!("系统已清理 {removed_accounts} 个长期不活跃的积分账户"),
            });
        }
        Ok(SweepReport {
            removed_accounts,
            removed_red_packets,
        })
    }
}
