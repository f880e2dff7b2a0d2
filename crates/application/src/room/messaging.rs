//! 聊天消息、弹幕、撤回与明星回复

use domain::{
    ChatMessage, ChatPayload, ConnectionId, Danmu, DanmuPayload, DomainError, Identity, MessageId,
    MessageKind, Quote, QuoteInput, RecallPayload, ServerEvent, StarDecoration, UserId,
};
use tracing::{debug, info, warn};

use super::{ChatRoom, RoomCommand, STAR_BOT_ID};
use crate::star_reply::StarReply;

impl ChatRoom {
    /// 连接已绑定且声明的身份与绑定一致时返回绑定身份
    fn authorize(&self, connection: ConnectionId, claimed: Option<&str>) -> Option<Identity> {
        let identity = self.registry.identity_of(connection)?;
        match claimed {
            Some(claimed) if claimed.trim() == identity.user_id.as_str() => Some(identity.clone()),
            _ => None,
        }
    }

    pub(super) fn on_chat(&mut self, connection: ConnectionId, payload: ChatPayload) {
        let Some(sender) = self.authorize(connection, payload.user_id.as_deref()) else {
            warn!(conn_id = %connection, claimed = ?payload.user_id, "聊天消息身份校验失败");
            self.gateway.send(
                connection,
                ServerEvent::UserIdFailed {
                    message: DomainError::AuthenticationFailed.to_string(),
                },
            );
            return;
        };

        if payload.content.trim().is_empty() {
            debug!(user_id = %sender.user_id, "丢弃空消息");
            return;
        }

        let now = self.clock.now();
        let id = self.ids.next(now);
        let mut message = ChatMessage::new(
            id,
            sender.user_id.clone(),
            sender.nickname.clone(),
            payload.content,
            payload.kind,
            now.timestamp_millis(),
        );
        message.local_id = payload.local_id;
        message.quote = payload.quote.and_then(|quote| self.resolve_quote(quote));

        let mentioned: Vec<UserId> = payload
            .mentioned_user_ids
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| UserId::parse(raw).ok())
            .fold(Vec::new(), |mut acc, id| {
                if !acc.contains(&id) {
                    acc.push(id);
                }
                acc
            });
        message.mentions = match payload.mentions {
            Some(names) if !names.is_empty() => names,
            _ => {
                let mut names: Vec<String> = Vec::new();
                for id in &mentioned {
                    if let Some(identity) = self.registry.get(id) {
                        if !names.contains(&identity.nickname) {
                            names.push(identity.nickname.clone());
                        }
                    }
                }
                names
            }
        };
        message.mentioned_user_ids = mentioned;

        let topic = self
            .star_replies
            .as_ref()
            .and_then(|service| service.topic_of(&message.content));

        debug!(message_id = %message.id, user_id = %sender.user_id, "新消息");
        if let Some(evicted) = self.history.append(message.clone()) {
            debug!(message_id = %evicted.id, "历史已满，淘汰最旧消息");
        }
        self.gateway.broadcast(ServerEvent::ChatMessage(message));

        if let (Some(topic), Some(service)) = (topic, self.star_replies.clone()) {
            let loopback = self.loopback.clone();
            tokio::spawn(async move {
                let reply = service.reply(&topic).await;
                match loopback.upgrade() {
                    Some(room) => {
                        if room.send(RoomCommand::StarReplyReady { reply }).await.is_err() {
                            debug!("房间已关闭，丢弃明星回复");
                        }
                    }
                    None => debug!("房间已关闭，丢弃明星回复"),
                }
            });
        }
    }

    /// 引用：优先按消息 ID 在历史中解析，其次按显示名解析发送者
    fn resolve_quote(&self, input: QuoteInput) -> Option<Quote> {
        if let Some(found) = input
            .id
            .as_deref()
            .and_then(|id| self.history.find_by_id(&MessageId::new(id)))
        {
            return Some(Quote {
                id: Some(found.id.clone()),
                user_id: Some(found.user_id.clone()),
                username: found.username.clone(),
                content: Some(found.content.clone()),
            });
        }

        let username = input.username.filter(|name| !name.trim().is_empty())?;
        let user_id = self
            .registry
            .find_by_name(&username)
            .map(|identity| identity.user_id.clone())
            .or_else(|| self.history.sender_by_name(&username).cloned());
        Some(Quote {
            id: input.id.map(MessageId::new),
            user_id,
            username,
            content: input.content,
        })
    }

    pub(super) fn on_star_reply(&mut self, reply: StarReply) {
        let now = self.clock.now();
        let mut message = ChatMessage::new(
            self.ids.next(now),
            UserId::reserved(STAR_BOT_ID),
            reply.star_name,
            reply.content,
            MessageKind::StarReply,
            now.timestamp_millis(),
        );
        message.star = Some(StarDecoration {
            gradient: reply.gradient,
        });
        info!(message_id = %message.id, star = %message.username, "明星回复");
        self.history.append(message.clone());
        self.gateway.broadcast(ServerEvent::ChatMessage(message));
    }

    /// 弹幕身份不符时静默丢弃
    pub(super) fn on_danmu(&mut self, connection: ConnectionId, payload: DanmuPayload) {
        let Some(sender) = self.authorize(connection, payload.user_id.as_deref()) else {
            debug!(conn_id = %connection, "弹幕身份校验失败，丢弃");
            return;
        };
        if payload.content.trim().is_empty() {
            return;
        }
        self.gateway.broadcast(ServerEvent::DanmuMessage(Danmu {
            content: payload.content,
            color: payload.color,
            user_id: sender.user_id,
            username: sender.nickname,
            timestamp: payload.timestamp,
        }));
    }

    pub(super) fn on_recall(&mut self, connection: ConnectionId, payload: RecallPayload) {
        let Some(requester) = self.authorize(connection, payload.user_id.as_deref()) else {
            self.gateway.send(
                connection,
                ServerEvent::RecallFailed {
                    message: "用户验证失败".into(),
                    reason: DomainError::AuthenticationFailed.reason_code().into(),
                },
            );
            return;
        };

        let now_ms = self.now_ms();
        let window_ms = self.settings.recall_window.num_milliseconds();
        let message_id = MessageId::new(payload.message_id);
        let result = self
            .history
            .recall(
                &message_id,
                &requester.user_id,
                now_ms,
                window_ms,
                &self.settings.recall_tombstone,
            )
            .map(|message| message.id.clone());

        match result {
            Ok(id) => {
                info!(message_id = %id, user_id = %requester.user_id, "消息已撤回");
                self.gateway.broadcast(ServerEvent::MessageRecalled {
                    message_id: id.as_str().to_owned(),
                    user_id: requester.user_id,
                });
            }
            Err(err) => {
                warn!(message_id = %message_id, user_id = %requester.user_id, error = %err, "撤回失败");
                self.gateway.send(
                    connection,
                    ServerEvent::RecallFailed {
                        message: err.to_string(),
                        reason: err.reason_code().into(),
                    },
                );
            }
        }
    }
}
