//! 在线身份注册表
//!
//! 维护 连接 → 身份 的绑定以及每个在线身份的资料。不变式：同一身份令牌在任意时刻
//! 至多绑定一个连接；重复加入会把旧连接作为 `displaced` 返回，由调用方强制关闭。

use std::collections::HashMap;

use crate::value_objects::{ConnectionId, RewardKey, Timestamp, UserId};

/// 一个在线的逻辑用户
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    /// 最近一次加入时提交的显示名
    pub username: String,
    /// 通过改名操作设置的昵称
    pub nickname: String,
    pub reward_key: Option<RewardKey>,
    pub connection: ConnectionId,
    pub joined_at: Timestamp,
}

/// 绑定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    /// 被新连接顶替的旧连接
    pub displaced: Option<ConnectionId>,
    pub is_new: bool,
}

/// 解绑结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnbindOutcome {
    pub identity: Identity,
}

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    bindings: HashMap<ConnectionId, UserId>,
    identities: HashMap<UserId, Identity>,
    /// 加入顺序，决定名单顺序
    order: Vec<UserId>,
    /// 进程生命周期内记住的昵称，身份下线后重新加入时恢复
    nicknames: HashMap<UserId, String>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把连接绑定到身份，必要时顶替同一身份的旧连接
    pub fn bind(
        &mut self,
        connection: ConnectionId,
        user_id: UserId,
        username: String,
        reward_key: Option<RewardKey>,
        now: Timestamp,
    ) -> BindOutcome {
        // 同一连接换身份加入：先释放旧身份
        if let Some(previous) = self.bindings.get(&connection).cloned() {
            if previous != user_id {
                self.unbind(connection);
            }
        }

        let displaced = self
            .identities
            .get(&user_id)
            .map(|identity| identity.connection)
            .filter(|existing| *existing != connection);
        if let Some(old) = displaced {
            self.bindings.remove(&old);
        }
        self.bindings.insert(connection, user_id.clone());

        match self.identities.get_mut(&user_id) {
            Some(identity) => {
                identity.username = username;
                identity.connection = connection;
                if reward_key.is_some() {
                    identity.reward_key = reward_key;
                }
                BindOutcome {
                    displaced,
                    is_new: false,
                }
            }
            None => {
                let nickname = self
                    .nicknames
                    .get(&user_id)
                    .cloned()
                    .unwrap_or_else(|| username.clone());
                self.order.push(user_id.clone());
                self.identities.insert(
                    user_id.clone(),
                    Identity {
                        user_id,
                        username,
                        nickname,
                        reward_key,
                        connection,
                        joined_at: now,
                    },
                );
                BindOutcome {
                    displaced,
                    is_new: true,
                }
            }
        }
    }

    /// 移除连接绑定；身份没有其他连接时从在线表中移除
    pub fn unbind(&mut self, connection: ConnectionId) -> Option<UnbindOutcome> {
        let user_id = self.bindings.remove(&connection)?;
        let still_bound = self
            .identities
            .get(&user_id)
            .is_some_and(|identity| identity.connection != connection);
        if still_bound {
            return None;
        }
        self.order.retain(|id| id != &user_id);
        self.identities
            .remove(&user_id)
            .map(|identity| UnbindOutcome { identity })
    }

    /// 修改昵称，返回修改后的身份
    pub fn rename(&mut self, user_id: &UserId, nickname: String) -> Option<&Identity> {
        let identity = self.identities.get_mut(user_id)?;
        identity.nickname = nickname.clone();
        self.nicknames.insert(user_id.clone(), nickname);
        Some(identity)
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<&Identity> {
        self.bindings
            .get(&connection)
            .and_then(|user_id| self.identities.get(user_id))
    }

    pub fn get(&self, user_id: &UserId) -> Option<&Identity> {
        self.identities.get(user_id)
    }

    pub fn connection_of(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.identities.get(user_id).map(|identity| identity.connection)
    }

    /// 按显示名或昵称查找（名字不唯一，返回加入顺序中的第一个）
    pub fn find_by_name(&self, name: &str) -> Option<&Identity> {
        self.iter()
            .find(|identity| identity.nickname == name || identity.username == name)
    }

    /// 按加入顺序遍历在线身份
    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.order
            .iter()
            .filter_map(|user_id| self.identities.get(user_id))
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }
}
