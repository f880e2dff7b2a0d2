//! 积分账户
//!
//! 账户以积分账户键为主键持久化，字段名与落盘的 JSON 文档保持一致。

use chrono::{Duration, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::errors::{DomainError, DomainResult};
use crate::value_objects::{RewardKey, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardAccount {
    #[serde(rename = "coreId")]
    pub reward_key: RewardKey,
    pub points: u64,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub last_daily_claim: Option<Timestamp>,
    #[serde(default)]
    pub online_minutes: u64,
}

impl RewardAccount {
    pub fn new(reward_key: RewardKey, now: Timestamp) -> Self {
        Self {
            reward_key,
            points: 0,
            created_at: now,
            updated_at: None,
            last_daily_claim: None,
            online_minutes: 0,
        }
    }

    /// 最近活跃时间：更新时间缺失时退回到创建时间
    pub fn last_active(&self) -> Timestamp {
        self.updated_at.unwrap_or(self.created_at)
    }

    pub fn credit(&mut self, points: u64, now: Timestamp) {
        self.points = self.points.saturating_add(points);
        self.updated_at = Some(now);
    }

    pub fn debit(&mut self, points: u64, now: Timestamp) -> DomainResult<()> {
        if self.points < points {
            return Err(DomainError::InsufficientPoints);
        }
        self.points -= points;
        self.updated_at = Some(now);
        Ok(())
    }

    /// 按本地日历日期判断，而不是按距离上次领取的小时数
    pub fn can_claim_daily(&self, now: Timestamp, offset: FixedOffset) -> bool {
        match self.last_daily_claim {
            None => true,
            Some(last) => local_date(last, offset) != local_date(now, offset),
        }
    }

    pub fn claim_daily(&mut self, amount: u64, now: Timestamp, offset: FixedOffset) -> DomainResult<()> {
        if !self.can_claim_daily(now, offset) {
            return Err(DomainError::AlreadyClaimed);
        }
        self.credit(amount, now);
        self.last_daily_claim = Some(now);
        Ok(())
    }

    pub fn add_online_minutes(&mut self, minutes: u64, now: Timestamp) {
        self.online_minutes = self.online_minutes.saturating_add(minutes);
        self.updated_at = Some(now);
    }

    pub fn reset_online_minutes(&mut self, now: Timestamp) {
        self.online_minutes = 0;
        self.updated_at = Some(now);
    }

    pub fn is_inactive(&self, now: Timestamp, threshold_days: i64) -> bool {
        self.last_active() <= now - Duration::days(threshold_days)
    }

    pub fn snapshot(&self, now: Timestamp, offset: FixedOffset) -> PointsSnapshot {
        PointsSnapshot {
            reward_key: self.reward_key.clone(),
            points: self.points,
            can_claim_daily: self.can_claim_daily(now, offset),
            online_minutes: self.online_minutes,
            last_claim_date: self.last_daily_claim,
        }
    }
}

/// 账户在某一时刻的对外视图（`points_info` 载荷）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsSnapshot {
    pub reward_key: RewardKey,
    pub points: u64,
    pub can_claim_daily: bool,
    pub online_minutes: u64,
    pub last_claim_date: Option<Timestamp>,
}

impl PointsSnapshot {
    /// 尚未建账的键的默认视图
    pub fn empty(reward_key: RewardKey) -> Self {
        Self {
            reward_key,
            points: 0,
            can_claim_daily: true,
            online_minutes: 0,
            last_claim_date: None,
        }
    }
}

pub fn local_date(at: Timestamp, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(offset: FixedOffset, y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> Timestamp {
        offset
            .with_ymd_and_hms(y, m, d, h, min, s)
            .unwrap()
            .with_timezone(&chrono::Utc)
    }

    fn account() -> RewardAccount {
        RewardAccount::new(RewardKey::parse("r1").unwrap(), chrono::Utc::now())
    }

    #[test]
    fn claim_across_midnight_succeeds_twice() {
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        let mut account = account();
        account
            .claim_daily(100, at(cst, 2024, 5, 1, 23, 59, 59), cst)
            .unwrap();
        account
            .claim_daily(100, at(cst, 2024, 5, 2, 0, 0, 1), cst)
            .unwrap();
        assert_eq!(account.points, 200);
    }

    #[test]
    fn second_claim_same_day_fails() {
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        let mut account = account();
        account.claim_daily(100, at(cst, 2024, 5, 1, 10, 0, 0), cst).unwrap();
        assert_eq!(
            account.claim_daily(100, at(cst, 2024, 5, 1, 14, 0, 0), cst),
            Err(DomainError::AlreadyClaimed)
        );
        assert_eq!(account.points, 100);
    }

    #[test]
    fn calendar_date_uses_local_offset() {
        // 北京时间 5/2 07:00 与 5/1 23:00 对应的 UTC 日期相同，但本地日期不同
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        let mut account = account();
        account.claim_daily(100, at(cst, 2024, 5, 1, 23, 0, 0), cst).unwrap();
        assert!(account.can_claim_daily(at(cst, 2024, 5, 2, 7, 0, 0), cst));
    }

    #[test]
    fn debit_refuses_overdraft() {
        let now = chrono::Utc::now();
        let mut account = account();
        account.credit(10, now);
        assert_eq!(account.debit(11, now), Err(DomainError::InsufficientPoints));
        account.debit(10, now).unwrap();
        assert_eq!(account.points, 0);
    }

    #[test]
    fn inactivity_falls_back_to_creation_time() {
        let created = chrono::Utc::now() - Duration::days(60);
        let account = RewardAccount::new(RewardKey::parse("r1").unwrap(), created);
        assert!(account.is_inactive(chrono::Utc::now(), 50));
    }
}
