//! 封禁记录
//!
//! 纯内存，按身份令牌索引，进程重启即清空。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::value_objects::UserId;

const MINUTE_MS: i64 = 60_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BanRecord {
    /// 执行封禁的用户昵称
    pub operator: String,
    /// 分钟数，0 表示永久
    pub duration_minutes: u64,
    pub reason: String,
    pub issued_at: i64,
    /// 解封时间（毫秒），永久封禁为 0
    pub unban_at: i64,
}

impl BanRecord {
    pub fn new(operator: impl Into<String>, duration_minutes: u64, reason: impl Into<String>, now_ms: i64) -> Self {
        let unban_at = if duration_minutes == 0 {
            0
        } else {
            now_ms.saturating_add((duration_minutes as i64).saturating_mul(MINUTE_MS))
        };
        Self {
            operator: operator.into(),
            duration_minutes,
            reason: reason.into(),
            issued_at: now_ms,
            unban_at,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.duration_minutes == 0
    }

    pub fn is_active(&self, now_ms: i64) -> bool {
        self.is_permanent() || now_ms < self.unban_at
    }

    /// 剩余毫秒数；永久封禁返回 None
    pub fn remaining_ms(&self, now_ms: i64) -> Option<i64> {
        if self.is_permanent() {
            None
        } else {
            Some((self.unban_at - now_ms).max(0))
        }
    }
}

#[derive(Debug, Default)]
pub struct ModerationStore {
    bans: HashMap<UserId, BanRecord>,
}

impl ModerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, user_id: UserId, ban: BanRecord) {
        self.bans.insert(user_id, ban);
    }

    pub fn lookup(&self, user_id: &UserId) -> Option<&BanRecord> {
        self.bans.get(user_id)
    }

    pub fn clear(&mut self, user_id: &UserId) -> Option<BanRecord> {
        self.bans.remove(user_id)
    }

    /// 加入时检查：返回仍然有效的封禁，过期记录会被顺手清除
    pub fn active_ban(&mut self, user_id: &UserId, now_ms: i64) -> Option<BanRecord> {
        match self.bans.get(user_id) {
            Some(ban) if ban.is_active(now_ms) => Some(ban.clone()),
            Some(_) => {
                self.bans.remove(user_id);
                None
            }
            None => None,
        }
    }
}
