//! 积分账本服务
//!
//! 每次变更都是一次完整的"读取全表 → 修改 → 写回全表"，由内部互斥锁串行化，
//! 保证房间协调器与 HTTP 查询不会交错写入同一份数据。

use std::collections::HashMap;
use std::sync::Arc;

use domain::{PointsSnapshot, RewardAccount, RewardKey};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::ApplicationError;
use crate::store::RewardsStore;

/// 积分规则参数
#[derive(Debug, Clone)]
pub struct RewardsPolicy {
    pub daily_points: u64,
    pub inactive_days: i64,
}

impl Default for RewardsPolicy {
    fn default() -> Self {
        Self {
            daily_points: 100,
            inactive_days: 50,
        }
    }
}

impl From<&config::RewardsConfig> for RewardsPolicy {
    fn from(config: &config::RewardsConfig) -> Self {
        Self {
            daily_points: config.daily_points,
            inactive_days: config.inactive_days,
        }
    }
}

pub struct RewardsLedger {
    store: Arc<RewardsStore>,
    clock: Arc<dyn Clock>,
    policy: RewardsPolicy,
    write_lock: Mutex<()>,
}

impl RewardsLedger {
    pub fn new(store: Arc<RewardsStore>, clock: Arc<dyn Clock>, policy: RewardsPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
            write_lock: Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &RewardsPolicy {
        &self.policy
    }

    /// 在锁内完成一次读改写；闭包返回的布尔值表示是否需要写回
    async fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut HashMap<String, RewardAccount>) -> Result<(T, bool), ApplicationError>,
    ) -> Result<T, ApplicationError> {
        let _guard = self.write_lock.lock().await;
        let mut accounts = self.store.load().await?;
        let (result, dirty) = apply(&mut accounts)?;
        if dirty {
            self.store.save(&accounts).await?;
        }
        Ok(result)
    }

    fn entry<'a>(
        accounts: &'a mut HashMap<String, RewardAccount>,
        key: &RewardKey,
        now: domain::Timestamp,
    ) -> &'a mut RewardAccount {
        accounts
            .entry(key.as_str().to_owned())
            .or_insert_with(|| RewardAccount::new(key.clone(), now))
    }

    /// 加分；积分为 0 时不做任何事并返回 false
    pub async fn credit(&self, key: &RewardKey, points: u64) -> Result<bool, ApplicationError> {
        if points == 0 {
            return Ok(false);
        }
        let now = self.clock.now();
        self.mutate(|accounts| {
            Self::entry(accounts, key, now).credit(points, now);
            Ok((true, true))
        })
        .await
    }

    /// 扣分，余额不足时失败且不写回
    pub async fn debit(&self, key: &RewardKey, points: u64) -> Result<RewardAccount, ApplicationError> {
        let now = self.clock.now();
        self.mutate(|accounts| {
            let account = accounts
                .get_mut(key.as_str())
                .ok_or(domain::DomainError::InsufficientPoints)?;
            account.debit(points, now)?;
            Ok((account.clone(), true))
        })
        .await
    }

    pub async fn account(&self, key: &RewardKey) -> Result<Option<RewardAccount>, ApplicationError> {
        Ok(self.store.load().await?.remove(key.as_str()))
    }

    pub async fn points_of(&self, key: &RewardKey) -> Result<u64, ApplicationError> {
        Ok(self.account(key).await?.map_or(0, |account| account.points))
    }

    /// 当前积分视图；账户不存在时返回零值视图，不建账
    pub async fn info(&self, key: &RewardKey) -> Result<PointsSnapshot, ApplicationError> {
        let now = self.clock.now();
        let offset = self.clock.offset();
        Ok(self
            .account(key)
            .await?
            .map(|account| account.snapshot(now, offset))
            .unwrap_or_else(|| PointsSnapshot::empty(key.clone())))
    }

    pub async fn can_claim_daily(&self, key: &RewardKey) -> Result<bool, ApplicationError> {
        let now = self.clock.now();
        let offset = self.clock.offset();
        Ok(self
            .account(key)
            .await?
            .map_or(true, |account| account.can_claim_daily(now, offset)))
    }

    /// 领取每日积分，返回领取后的账户
    pub async fn claim_daily(&self, key: &RewardKey) -> Result<RewardAccount, ApplicationError> {
        let now = self.clock.now();
        let offset = self.clock.offset();
        let amount = self.policy.daily_points;
        let account = self
            .mutate(|accounts| {
                let account = Self::entry(accounts, key, now);
                account.claim_daily(amount, now, offset)?;
                Ok((account.clone(), true))
            })
            .await?;
        info!(reward_key = %key, points = account.points, "领取每日积分");
        Ok(account)
    }

    pub async fn add_online_minutes(&self, key: &RewardKey, minutes: u64) -> Result<bool, ApplicationError> {
        if minutes == 0 {
            return Ok(false);
        }
        let now = self.clock.now();
        self.mutate(|accounts| {
            Self::entry(accounts, key, now).add_online_minutes(minutes, now);
            Ok((true, true))
        })
        .await
    }

    /// 在线时长清零；账户不存在时不建账
    pub async fn reset_online_minutes(&self, key: &RewardKey) -> Result<bool, ApplicationError> {
        let now = self.clock.now();
        self.mutate(|accounts| match accounts.get_mut(key.as_str()) {
            Some(account) => {
                account.reset_online_minutes(now);
                Ok((true, true))
            }
            None => Ok((false, false)),
        })
        .await
    }

    /// 定时发放：一次读写为所有在线账户加分加时长，返回各自的最新视图
    pub async fn accrue(
        &self,
        keys: &[RewardKey],
        points: u64,
        minutes: u64,
    ) -> Result<Vec<PointsSnapshot>, ApplicationError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let now = self.clock.now();
        let offset = self.clock.offset();
        self.mutate(|accounts| {
            let snapshots = keys
                .iter()
                .map(|key| {
                    let account = Self::entry(accounts, key, now);
                    account.credit(points, now);
                    account.add_online_minutes(minutes, now);
                    account.snapshot(now, offset)
                })
                .collect();
            Ok((snapshots, true))
        })
        .await
    }

    /// 批量查询余额，用于名单广播
    pub async fn balances(&self, keys: &[RewardKey]) -> Result<HashMap<RewardKey, u64>, ApplicationError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let accounts = self.store.load().await?;
        Ok(keys
            .iter()
            .map(|key| {
                let points = accounts.get(key.as_str()).map_or(0, |account| account.points);
                (key.clone(), points)
            })
            .collect())
    }

    /// 删除长期不活跃的账户，返回删除数量
    pub async fn sweep_inactive(&self) -> Result<usize, ApplicationError> {
        let now = self.clock.now();
        let threshold = self.policy.inactive_days;
        let removed = self
            .mutate(|accounts| {
                let before = accounts.len();
                accounts.retain(|_, account| !account.is_inactive(now, threshold));
                let removed = before - accounts.len();
                Ok((removed, removed > 0))
            })
            .await?;
        if removed > 0 {
            info!(removed, inactive_days = threshold, "清理不活跃积分账户");
        } else {
            debug!("没有需要清理的积分账户");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::memory::MemoryLedgerStore;
    use chrono::{Duration, FixedOffset, TimeZone, Utc};

    fn key(value: &str) -> RewardKey {
        RewardKey::parse(value).unwrap()
    }

    fn ledger_at(clock: Arc<ManualClock>) -> RewardsLedger {
        RewardsLedger::new(
            Arc::new(MemoryLedgerStore::<RewardAccount>::new()),
            clock,
            RewardsPolicy::default(),
        )
    }

    #[tokio::test]
    async fn daily_claim_then_accrual_matches_expected_balance() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()));
        let ledger = ledger_at(clock.clone());
        let r1 = key("r1");

        let info = ledger.info(&r1).await.unwrap();
        assert_eq!(info.points, 0);
        assert!(info.can_claim_daily);

        assert_eq!(ledger.claim_daily(&r1).await.unwrap().points, 100);
        assert!(!ledger.can_claim_daily(&r1).await.unwrap());
        assert!(matches!(
            ledger.claim_daily(&r1).await,
            Err(ApplicationError::Domain(domain::DomainError::AlreadyClaimed))
        ));

        let snapshots = ledger.accrue(&[r1.clone()], 10, 10).await.unwrap();
        assert_eq!(snapshots[0].points, 110);
        assert_eq!(snapshots[0].online_minutes, 10);
    }

    #[tokio::test]
    async fn claim_uses_clock_offset_for_calendar_day() {
        let cst = FixedOffset::east_opt(8 * 3600).unwrap();
        let start = cst.with_ymd_and_hms(2024, 5, 1, 23, 59, 59).unwrap().with_timezone(&Utc);
        let clock = Arc::new(ManualClock::with_offset(start, cst));
        let ledger = ledger_at(clock.clone());
        let r1 = key("r1");

        ledger.claim_daily(&r1).await.unwrap();
        clock.advance(Duration::seconds(2));
        assert_eq!(ledger.claim_daily(&r1).await.unwrap().points, 200);
    }

    #[tokio::test]
    async fn zero_credit_is_refused_and_debit_checks_balance() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = ledger_at(clock);
        let r1 = key("r1");

        assert!(!ledger.credit(&r1, 0).await.unwrap());
        assert!(ledger.account(&r1).await.unwrap().is_none());
        assert!(ledger.debit(&r1, 1).await.is_err());

        ledger.credit(&r1, 30).await.unwrap();
        assert_eq!(ledger.debit(&r1, 20).await.unwrap().points, 10);
        assert!(ledger.debit(&r1, 11).await.is_err());
        assert_eq!(ledger.points_of(&r1).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn reset_online_minutes_only_touches_existing_accounts() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let ledger = ledger_at(clock);
        let r1 = key("r1");

        assert!(!ledger.reset_online_minutes(&r1).await.unwrap());
        ledger.add_online_minutes(&r1, 20).await.unwrap();
        assert!(ledger.reset_online_minutes(&r1).await.unwrap());
        assert_eq!(ledger.info(&r1).await.unwrap().online_minutes, 0);
    }

    #[tokio::test]
    async fn sweep_removes_accounts_idle_past_threshold() {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
        let ledger = ledger_at(clock.clone());
        ledger.credit(&key("old"), 5).await.unwrap();
        clock.advance(Duration::days(40));
        ledger.credit(&key("recent"), 5).await.unwrap();
        clock.advance(Duration::days(11));

        assert_eq!(ledger.sweep_inactive().await.unwrap(), 1);
        assert!(ledger.account(&key("old")).await.unwrap().is_none());
        assert!(ledger.account(&key("recent")).await.unwrap().is_some());
        assert_eq!(ledger.sweep_inactive().await.unwrap(), 0);
    }
}
