//! 积分红包
//!
//! 红包由发送者的积分账户出资，按账户键去重领取。时间字段统一为毫秒时间戳，
//! 与落盘的 JSON 文档一致。

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::message::RedPacketRef;
use crate::value_objects::{RewardKey, UserId};

pub const DEFAULT_GREETING: &str = "恭喜发财，大吉大利";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedPacketKind {
    /// 拼手气红包，金额在创建时预先拆分
    Random,
    /// 普通红包，每份金额相同
    Average,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedPacketStatus {
    Active,
    Expired,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedPacketReceiver {
    pub user_id: UserId,
    pub username: String,
    pub core_id: RewardKey,
    pub amount: u64,
    pub receive_time: i64,
}

/// 创建红包所需的参数
#[derive(Debug, Clone)]
pub struct NewRedPacket {
    pub sender_id: UserId,
    pub sender_name: String,
    pub sender_key: RewardKey,
    pub kind: RedPacketKind,
    pub total_amount: u64,
    pub total_count: u32,
    pub greeting: Option<String>,
}

impl NewRedPacket {
    /// 扣款前先校验金额与份数
    pub fn validate(&self) -> DomainResult<()> {
        if self.total_amount == 0 || self.total_count == 0 {
            return Err(DomainError::validation("totalAmount", "缺少必要参数"));
        }
        if self.total_amount < u64::from(self.total_count) {
            return Err(DomainError::validation("totalAmount", "总金额不能小于红包个数"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedPacket {
    pub id: String,
    pub sender_id: UserId,
    pub sender_name: String,
    #[serde(rename = "senderCoreId")]
    pub sender_key: RewardKey,
    #[serde(rename = "type")]
    pub kind: RedPacketKind,
    pub total_amount: u64,
    pub total_count: u32,
    pub remaining_amount: u64,
    pub remaining_count: u32,
    pub greeting: String,
    pub create_time: i64,
    pub expire_time: i64,
    pub status: RedPacketStatus,
    #[serde(default)]
    pub receivers: Vec<RedPacketReceiver>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amounts: Option<Vec<u64>>,
}

impl RedPacket {
    pub fn create<R: Rng + ?Sized>(
        id: String,
        request: NewRedPacket,
        now_ms: i64,
        ttl_ms: i64,
        rng: &mut R,
    ) -> DomainResult<Self> {
        request.validate()?;

        let amounts = match request.kind {
            RedPacketKind::Random => Some(split_random(request.total_amount, request.total_count, rng)),
            RedPacketKind::Average => None,
        };
        let greeting = request
            .greeting
            .map(|g| g.trim().to_owned())
            .filter(|g| !g.is_empty())
            .unwrap_or_else(|| DEFAULT_GREETING.to_owned());

        Ok(Self {
            id,
            sender_id: request.sender_id,
            sender_name: request.sender_name,
            sender_key: request.sender_key,
            kind: request.kind,
            total_amount: request.total_amount,
            total_count: request.total_count,
            remaining_amount: request.total_amount,
            remaining_count: request.total_count,
            greeting,
            create_time: now_ms,
            expire_time: now_ms.saturating_add(ttl_ms),
            status: RedPacketStatus::Active,
            receivers: Vec::new(),
            amounts,
        })
    }

    /// 根据时间与剩余份数推进状态；过期优先于领完
    pub fn refresh_status(&mut self, now_ms: i64) -> RedPacketStatus {
        if now_ms > self.expire_time && self.status != RedPacketStatus::Expired {
            self.status = RedPacketStatus::Expired;
        } else if self.remaining_count == 0 && self.status == RedPacketStatus::Active {
            self.status = RedPacketStatus::Completed;
        }
        self.status
    }

    pub fn receiver(&self, core_id: &RewardKey) -> Option<&RedPacketReceiver> {
        self.receivers.iter().find(|r| &r.core_id == core_id)
    }

    /// 领取一份，返回领取记录
    pub fn receive(
        &mut self,
        core_id: RewardKey,
        user_id: UserId,
        username: String,
        now_ms: i64,
    ) -> DomainResult<RedPacketReceiver> {
        match self.refresh_status(now_ms) {
            RedPacketStatus::Expired => return Err(DomainError::red_packet("红包已过期")),
            RedPacketStatus::Completed => return Err(DomainError::red_packet("红包已领完")),
            RedPacketStatus::Active => {}
        }
        if self.receiver(&core_id).is_some() {
            return Err(DomainError::red_packet("您已经领取过这个红包了"));
        }

        let amount = match self.kind {
            RedPacketKind::Average => self.total_amount / u64::from(self.total_count),
            RedPacketKind::Random => {
                let index = (self.total_count - self.remaining_count) as usize;
                self.amounts
                    .as_ref()
                    .and_then(|amounts| amounts.get(index).copied())
                    .ok_or_else(|| DomainError::red_packet("红包数据损坏"))?
            }
        };

        self.remaining_amount = self.remaining_amount.saturating_sub(amount);
        self.remaining_count -= 1;
        let record = RedPacketReceiver {
            user_id,
            username,
            core_id,
            amount,
            receive_time: now_ms,
        };
        self.receivers.push(record.clone());
        self.refresh_status(now_ms);
        Ok(record)
    }

    /// 撤销最近一次领取（入账失败时的补偿），只允许撤销最后一条记录
    pub fn revert_receive(&mut self, core_id: &RewardKey) -> Option<RedPacketReceiver> {
        if self.receivers.last().map(|r| &r.core_id) != Some(core_id) {
            return None;
        }
        let record = self.receivers.pop()?;
        self.remaining_amount += record.amount;
        self.remaining_count += 1;
        if self.status == RedPacketStatus::Completed {
            self.status = RedPacketStatus::Active;
        }
        Some(record)
    }

    /// 过期超过保留期，可以从存储中删除
    pub fn is_disposable(&mut self, now_ms: i64, retain_ms: i64) -> bool {
        self.refresh_status(now_ms) == RedPacketStatus::Expired && now_ms - self.expire_time > retain_ms
    }

    pub fn summary(&self) -> RedPacketRef {
        RedPacketRef {
            red_packet_id: self.id.clone(),
            kind: self.kind,
            total_count: self.total_count,
        }
    }

    pub fn details(&self, viewer: Option<&RewardKey>) -> RedPacketDetails {
        let received = viewer.and_then(|key| self.receiver(key));
        RedPacketDetails {
            id: self.id.clone(),
            sender_name: self.sender_name.clone(),
            kind: self.kind,
            total_amount: self.total_amount,
            total_count: self.total_count,
            remaining_count: self.remaining_count,
            greeting: self.greeting.clone(),
            status: self.status,
            create_time: self.create_time,
            expire_time: self.expire_time,
            is_received: received.is_some(),
            received_amount: received.map_or(0, |r| r.amount),
            receivers: self.receivers.clone(),
        }
    }
}

/// 二倍均值法拆分金额
///
/// 前 n-1 份各自落在 `[1, 2 * 剩余金额 / 剩余份数)`，最后一份取余下全部，再打乱顺序。
/// 调用方保证 `total >= count >= 1`。
pub fn split_random<R: Rng + ?Sized>(total: u64, count: u32, rng: &mut R) -> Vec<u64> {
    let mut amounts = Vec::with_capacity(count as usize);
    let mut remaining = total;
    let mut remaining_count = u64::from(count);

    while remaining_count > 1 {
        let max = remaining * 2 / remaining_count;
        let amount = if max > 1 { rng.random_range(1..max) } else { 1 };
        amounts.push(amount);
        remaining -= amount;
        remaining_count -= 1;
    }
    amounts.push(remaining);
    amounts.shuffle(rng);
    amounts
}

/// `red_packet_details` 载荷
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedPacketDetails {
    pub id: String,
    pub sender_name: String,
    #[serde(rename = "type")]
    pub kind: RedPacketKind,
    pub total_amount: u64,
    pub total_count: u32,
    pub remaining_count: u32,
    pub greeting: String,
    pub status: RedPacketStatus,
    pub create_time: i64,
    pub expire_time: i64,
    pub is_received: bool,
    pub received_amount: u64,
    pub receivers: Vec<RedPacketReceiver>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentRedPacket {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: RedPacketKind,
    pub total_amount: u64,
    pub total_count: u32,
    pub remaining_count: u32,
    pub greeting: String,
    pub status: RedPacketStatus,
    pub create_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedRedPacket {
    pub id: String,
    pub sender_name: String,
    #[serde(rename = "type")]
    pub kind: RedPacketKind,
    pub amount: u64,
    pub greeting: String,
    pub receive_time: i64,
}

/// 某个积分账户发出与领到的红包，各自按时间倒序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedPacketHistory {
    pub sent: Vec<SentRedPacket>,
    pub received: Vec<ReceivedRedPacket>,
}

impl RedPacketHistory {
    pub fn collect<'a>(
        packets: impl IntoIterator<Item = &'a RedPacket>,
        key: &RewardKey,
        limit: usize,
    ) -> Self {
        let mut history = Self::default();
        for packet in packets {
            if &packet.sender_key == key {
                history.sent.push(SentRedPacket {
                    id: packet.id.clone(),
                    kind: packet.kind,
                    total_amount: packet.total_amount,
                    total_count: packet.total_count,
                    remaining_count: packet.remaining_count,
                    greeting: packet.greeting.clone(),
                    status: packet.status,
                    create_time: packet.create_time,
                });
            }
            if let Some(record) = packet.receiver(key) {
                history.received.push(ReceivedRedPacket {
                    id: packet.id.clone(),
                    sender_name: packet.sender_name.clone(),
                    kind: packet.kind,
                    amount: record.amount,
                    greeting: packet.greeting.clone(),
                    receive_time: record.receive_time,
                });
            }
        }
        history.sent.sort_by(|a, b| b.create_time.cmp(&a.create_time));
        history.received.sort_by(|a, b| b.receive_time.cmp(&a.receive_time));
        history.sent.truncate(limit);
        history.received.truncate(limit);
        history
    }
}
