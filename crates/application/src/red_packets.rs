//! 红包账本服务

use std::sync::Arc;

use chrono::Duration;
use domain::{
    DomainError, NewRedPacket, RedPacket, RedPacketDetails, RedPacketHistory, RedPacketReceiver,
    RewardKey, UserId,
};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::store::RedPacketStore;

#[derive(Debug, Clone)]
pub struct RedPacketPolicy {
    pub ttl: Duration,
    /// 过期后保留多久才删除
    pub retain: Duration,
    pub history_limit: usize,
}

impl Default for RedPacketPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::hours(24),
            retain: Duration::days(7),
            history_limit: 20,
        }
    }
}

impl From<&config::RedPacketConfig> for RedPacketPolicy {
    fn from(config: &config::RedPacketConfig) -> Self {
        Self {
            ttl: Duration::hours(config.expire_hours),
            retain: Duration::days(config.retain_days),
            history_limit: config.history_limit,
        }
    }
}

pub struct RedPacketLedger {
    store: Arc<RedPacketStore>,
    clock: Arc<dyn Clock>,
    policy: RedPacketPolicy,
    write_lock: Mutex<()>,
}

impl RedPacketLedger {
    pub fn new(store: Arc<RedPacketStore>, clock: Arc<dyn Clock>, policy: RedPacketPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    /// 创建并保存红包；扣款由调用方在此之前完成
    pub async fn create(&self, request: NewRedPacket) -> Result<RedPacket, ApplicationError> {
        let now_ms = self.clock.now_millis();
        let id = format!("rp_{}", Uuid::new_v4());
        let packet = RedPacket::create(
            id,
            request,
            now_ms,
            self.policy.ttl.num_milliseconds(),
            &mut rand::rng(),
        )?;

        let _guard = self.write_lock.lock().await;
        let mut packets = self.store.load().await?;
        packets.insert(packet.id.clone(), packet.clone());
        self.store.save(&packets).await?;
        info!(red_packet_id = %packet.id, sender = %packet.sender_key, total = packet.total_amount, "创建红包");
        Ok(packet)
    }

    /// 领取一份，返回领取记录与更新后的红包
    pub async fn receive(
        &self,
        red_packet_id: &str,
        core_id: RewardKey,
        user_id: UserId,
        username: String,
    ) -> Result<(RedPacketReceiver, RedPacket), ApplicationError> {
        let now_ms = self.clock.now_millis();
        let _guard = self.write_lock.lock().await;
        let mut packets = self.store.load().await?;
        let packet = packets
            .get_mut(red_packet_id)
            .ok_or_else(|| DomainError::not_found("红包"))?;
        let record = packet.receive(core_id, user_id, username, now_ms)?;
        let updated = packet.clone();
        self.store.save(&packets).await?;
        Ok((record, updated))
    }

    /// 撤销某个积分账户刚刚完成的领取；记录不存在或不是最后一条时返回 false
    pub async fn revert_receive(&self, red_packet_id: &str, core_id: &RewardKey) -> Result<bool, ApplicationError> {
        let _guard = self.write_lock.lock().await;
        let mut packets = self.store.load().await?;
        let Some(packet) = packets.get_mut(red_packet_id) else {
            return Ok(false);
        };
        if packet.revert_receive(core_id).is_none() {
            return Ok(false);
        }
        self.store.save(&packets).await?;
        warn!(red_packet_id, reward_key = %core_id, "撤销红包领取");
        Ok(true)
    }

    pub async fn details(
        &self,
        red_packet_id: &str,
        viewer: Option<&RewardKey>,
    ) -> Result<RedPacketDetails, ApplicationError> {
        let now_ms = self.clock.now_millis();
        let mut packet = self
            .store
            .load()
            .await?
            .remove(red_packet_id)
            .ok_or_else(|| DomainError::not_found("红包"))?;
        packet.refresh_status(now_ms);
        Ok(packet.details(viewer))
    }

    pub async fn history(&self, key: &RewardKey) -> Result<RedPacketHistory, ApplicationError> {
        let now_ms = self.clock.now_millis();
        let mut packets: Vec<RedPacket> = self.store.load().await?.into_values().collect();
        for packet in packets.iter_mut() {
            packet.refresh_status(now_ms);
        }
        Ok(RedPacketHistory::collect(&packets, key, self.policy.history_limit))
    }

    /// 删除过期超过保留期的红包，返回删除数量
    pub async fn cleanup(&self) -> Result<usize, ApplicationError> {
        let now_ms = self.clock.now_millis();
        let retain_ms = self.policy.retain.num_milliseconds();
        let _guard = self.write_lock.lock().await;
        let mut packets = self.store.load().await?;
        let before = packets.len();
        packets.retain(|_, packet| !packet.is_disposable(now_ms, retain_ms));
        let removed = before - packets.len();
        if removed > 0 {
            self.store.save(&packets).await?;
            info!(removed, "清理过期红包");
        }
        Ok(removed)
    }
}
