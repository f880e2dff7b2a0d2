//! 持久化端口
//!
//! 存储只提供整表读取与整表写回，不支持部分字段更新或比较交换。
//! 调用方负责把"读取 - 修改 - 写回"串行化。

use std::collections::HashMap;

use async_trait::async_trait;
use domain::{RedPacket, RewardAccount};

use crate::error::ApplicationError;

#[async_trait]
pub trait LedgerStore<V>: Send + Sync
where
    V: Send + Sync,
{
    /// 读取全部记录；存储不存在时返回空表
    async fn load(&self) -> Result<HashMap<String, V>, ApplicationError>;

    /// 以给定内容整体覆盖存储
    async fn save(&self, records: &HashMap<String, V>) -> Result<(), ApplicationError>;
}

pub type RewardsStore = dyn LedgerStore<RewardAccount>;
pub type RedPacketStore = dyn LedgerStore<RedPacket>;

pub mod memory {
    use super::*;
    use tokio::sync::Mutex;

    /// 内存实现，用于测试与关闭持久化的场景
    #[derive(Debug)]
    pub struct MemoryLedgerStore<V> {
        records: Mutex<HashMap<String, V>>,
    }

    impl<V> Default for MemoryLedgerStore<V> {
        fn default() -> Self {
            Self::new()
        }
    }

    impl<V> MemoryLedgerStore<V> {
        pub fn new() -> Self {
            Self {
                records: Mutex::new(HashMap::new()),
            }
        }

        pub fn with_records(records: HashMap<String, V>) -> Self {
            Self {
                records: Mutex::new(records),
            }
        }
    }

    #[async_trait]
    impl<V> LedgerStore<V> for MemoryLedgerStore<V>
    where
        V: Clone + Send + Sync,
    {
        async fn load(&self) -> Result<HashMap<String, V>, ApplicationError> {
            Ok(self.records.lock().await.clone())
        }

        async fn save(&self, records: &HashMap<String, V>) -> Result<(), ApplicationError> {
            *self.records.lock().await = records.clone();
            Ok(())
        }
    }
}
