//! 加入、离开、改名与踢人

use domain::{
    BanRecord, ConnectionId, DomainError, Identity, JoinPayload, KickPayload, Nickname, RewardKey,
    RosterEntry, ServerEvent, UserId,
};
use tracing::{info, warn};

use super::ChatRoom;
use crate::error::ApplicationError;

const BANNED_MESSAGE: &str = "您已被禁止进入聊天室";

impl ChatRoom {
    pub(super) async fn on_join(&mut self, connection: ConnectionId, payload: JoinPayload) {
        let (user_id, username, reward_key) = match self.validate_join(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(conn_id = %connection, error = %err, "加入请求无效");
                self.gateway.send(
                    connection,
                    ServerEvent::UserIdFailed {
                        message: err.to_string(),
                    },
                );
                return;
            }
        };

        let now_ms = self.now_ms();
        if let Some(ban) = self.bans.active_ban(&user_id, now_ms) {
            warn!(user_id = %user_id, conn_id = %connection, "封禁中的用户尝试加入");
            self.gateway.send(
                connection,
                ServerEvent::UserBanned {
                    message: BANNED_MESSAGE.into(),
                    reason: ban.reason.clone(),
                    duration: ban.duration_minutes,
                    remaining_time: ban.remaining_ms(now_ms),
                    timestamp: now_ms,
                },
            );
            return;
        }

        let outcome = self.registry.bind(
            connection,
            user_id.clone(),
            username.clone(),
            reward_key.clone(),
            self.clock.now(),
        );
        if let Some(displaced) = outcome.displaced {
            info!(user_id = %user_id, old_conn = %displaced, new_conn = %connection, "重复登录，断开旧连接");
            self.gateway.close(displaced);
        }
        info!(user_id = %user_id, username = %username, conn_id = %connection, "用户加入聊天室");

        self.gateway
            .send(connection, ServerEvent::ChatHistory(self.history.snapshot()));

        let users = self.roster().await;
        let nickname = self
            .registry
            .get(&user_id)
            .map(|identity| identity.nickname.clone())
            .unwrap_or_else(|| username.clone());
        let points = users
            .iter()
            .find(|entry| entry.user_id == user_id)
            .map_or(0, |entry| entry.points);
        self.gateway.broadcast(ServerEvent::UserJoin {
            username,
            user_id,
            nickname,
            points,
            users,
        });

        if let (Some(rewards), Some(key)) = (&self.rewards, &reward_key) {
            match rewards.info(key).await {
                Ok(info) => self.gateway.send(connection, ServerEvent::PointsInfo(info)),
                Err(err) => {
                    warn!(reward_key = %key, error = %err, "读取积分失败");
                    self.gateway.send(
                        connection,
                        ServerEvent::PointsError {
                            message: err.to_string(),
                        },
                    );
                }
            }
        }
    }

    fn validate_join(
        &self,
        payload: JoinPayload,
    ) -> Result<(UserId, String, Option<RewardKey>), DomainError> {
        let user_id = UserId::parse(payload.user_id)?;
        let username = payload.username.trim().to_owned();
        if username.is_empty() {
            return Err(DomainError::validation("username", "缺少用户ID或用户名"));
        }
        let reward_key = match payload.reward_key {
            Some(key) if !key.trim().is_empty() => Some(RewardKey::parse(key)?),
            _ if self.rewards.is_some() => {
                return Err(DomainError::validation("rewardKey", "缺少积分账户标识"));
            }
            _ => None,
        };
        Ok((user_id, username, reward_key))
    }

    pub(super) async fn on_disconnect(&mut self, connection: ConnectionId) {
        self.gateway.unregister(connection);
        let Some(outcome) = self.registry.unbind(connection) else {
            return;
        };
        let identity = outcome.identity;
        info!(user_id = %identity.user_id, conn_id = %connection, "用户离开聊天室");

        self.reset_online_minutes(&identity).await;
        let users = self.roster().await;
        self.gateway.broadcast(ServerEvent::UserLeave {
            user_id: identity.user_id,
            users,
        });
    }

    pub(super) fn on_unban(&mut self, user_id: &UserId) -> bool {
        match self.bans.clear(user_id) {
            Some(ban) => {
                info!(user_id = %user_id, operator = %ban.operator, "解除封禁");
                true
            }
            None => false,
        }
    }

    pub(super) async fn on_rename(
        &mut self,
        user_id: &UserId,
        nickname: String,
    ) -> Result<RosterEntry, ApplicationError> {
        let nickname = Nickname::parse(nickname, self.settings.nickname_max_chars)?.into_inner();
        let identity = self
            .registry
            .rename(user_id, nickname.clone())
            .cloned()
            .ok_or_else(|| DomainError::not_found("用户"))?;
        let relabeled = self.history.relabel(user_id, &nickname);
        info!(user_id = %user_id, nickname = %nickname, relabeled, "用户修改昵称");

        self.gateway.broadcast(ServerEvent::UserNicknameUpdated {
            user_id: user_id.clone(),
            username: identity.username.clone(),
            new_nickname: nickname,
        });
        let users = self.roster().await;
        let entry = users
            .iter()
            .find(|entry| &entry.user_id == user_id)
            .cloned()
            .unwrap_or_else(|| RosterEntry {
                user_id: identity.user_id.clone(),
                username: identity.username.clone(),
                nickname: identity.nickname.clone(),
                points: 0,
            });
        self.gateway.broadcast(ServerEvent::UsersUpdated { users });
        Ok(entry)
    }

    pub(super) async fn on_kick(&mut self, connection: ConnectionId, payload: KickPayload) {
        let Some(actor) = self.registry.identity_of(connection).cloned() else {
            self.kick_failed(connection, DomainError::AuthenticationFailed);
            return;
        };

        let target = match self.resolve_kick_target(&actor, &payload) {
            Ok(target) => target,
            Err(err) => {
                warn!(actor = %actor.user_id, error = %err, "踢人失败");
                self.kick_failed(connection, err);
                return;
            }
        };

        let now_ms = self.now_ms();
        let duration = payload.duration;
        let reason = payload.reason.unwrap_or_default();
        self.bans.record(
            target.user_id.clone(),
            BanRecord::new(actor.nickname.clone(), duration, reason.clone(), now_ms),
        );

        let kicked_message = if duration == 0 {
            "您已被永久禁止进入聊天室".to_owned()
        } else {
            format!("您已被踢出聊天室，{duration}分钟内无法重新进入")
        };
        self.gateway.send(
            target.connection,
            ServerEvent::UserKicked {
                message: kicked_message,
                duration,
                reason: reason.clone(),
                timestamp: now_ms,
            },
        );
        self.gateway.close(target.connection);
        self.registry.unbind(target.connection);
        self.reset_online_minutes(&target).await;
        info!(
            actor = %actor.user_id,
            target = %target.user_id,
            duration_minutes = duration,
            "用户被踢出聊天室"
        );

        self.gateway.broadcast_except(
            connection,
            ServerEvent::UserKickedNotification {
                target_user_id: target.user_id.clone(),
                target_username: target.nickname.clone(),
                operator: actor.nickname.clone(),
                duration,
                reason,
                message: format!("{} 已被 {} 踢出聊天室", target.nickname, actor.nickname),
            },
        );
        let users = self.roster().await;
        self.gateway.broadcast(ServerEvent::UserListUpdated { users });
        self.gateway.send(
            connection,
            ServerEvent::KickSuccess {
                message: format!("已将 {} 踢出聊天室", target.nickname),
                target_user_id: target.user_id,
                target_username: target.nickname,
                duration,
            },
        );
    }

    /// 先在在线用户中按令牌、再按名字查找；不在线但在历史中出现过视为离线
    fn resolve_kick_target(&self, actor: &Identity, payload: &KickPayload) -> Result<Identity, DomainError> {
        let token = payload
            .target_user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .and_then(|value| UserId::parse(value).ok());
        let name = payload
            .target_username
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if token.is_none() && name.is_none() {
            return Err(DomainError::validation("targetUserId", "缺少目标用户"));
        }
        if token.as_ref() == Some(&actor.user_id) {
            return Err(DomainError::CannotKickSelf);
        }

        let live = match (&token, name) {
            (Some(token), _) => self.registry.get(token),
            (None, Some(name)) => {
                // 同名时跳过自己；只有自己匹配才算踢自己
                let mut matches = self
                    .registry
                    .iter()
                    .filter(|identity| identity.nickname == name || identity.username == name);
                let first = matches.next();
                match first {
                    Some(found) if found.user_id == actor.user_id => matches.next().or(first),
                    other => other,
                }
            }
            (None, None) => None,
        };
        match live {
            Some(target) if target.user_id == actor.user_id => Err(DomainError::CannotKickSelf),
            Some(target) => Ok(target.clone()),
            None => {
                let seen = match (&token, name) {
                    (Some(token), _) => self.history.has_sender(token),
                    (None, Some(name)) => self.history.sender_by_name(name).is_some(),
                    (None, None) => false,
                };
                if seen {
                    Err(DomainError::TargetOffline)
                } else {
                    Err(DomainError::TargetNotFound)
                }
            }
        }
    }

    fn kick_failed(&mut self, connection: ConnectionId, err: DomainError) {
        self.gateway.send(
            connection,
            ServerEvent::KickFailed {
                message: err.to_string(),
                reason: err.reason_code().into(),
            },
        );
    }

    async fn reset_online_minutes(&self, identity: &Identity) {
        if let (Some(rewards), Some(key)) = (&self.rewards, &identity.reward_key) {
            if let Err(err) = rewards.reset_online_minutes(key).await {
                warn!(reward_key = %key, error = %err, "重置在线时长失败");
            }
        }
    }
}
