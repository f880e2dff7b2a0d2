use serde::{Deserialize, Serialize};

use crate::red_packet::RedPacketKind;
use crate::value_objects::{MessageId, UserId};

/// 历史消息的类型标记。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    #[default]
    Text,
    Image,
    Emoji,
    /// 已撤回的墓碑消息
    Recalled,
    StarReply,
    RedPacket,
}

impl MessageKind {
    /// 客户端可以直接发送的类型
    pub fn is_client_sendable(self) -> bool {
        matches!(self, Self::Text | Self::Image | Self::Emoji)
    }
}

/// 被引用的消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<MessageId>,
    /// 发送时解析出的被引用者身份；解析失败时为 None
    #[serde(default)]
    pub user_id: Option<UserId>,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// 明星回复的展示装饰
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarDecoration {
    pub gradient: Vec<String>,
}

/// 红包消息携带的红包摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedPacketRef {
    pub red_packet_id: String,
    pub kind: RedPacketKind,
    pub total_count: u32,
}

/// 历史账本中的一条广播消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub user_id: UserId,
    /// 发送时捕获的昵称，改名时会被追溯重写
    pub username: String,
    pub content: String,
    #[serde(rename = "type", default)]
    pub kind: MessageKind,
    /// 客户端幂等标记，用于乐观更新对账
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    /// 毫秒时间戳
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentioned_user_ids: Vec<UserId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub recalled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub star: Option<StarDecoration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub red_packet: Option<RedPacketRef>,
}

impl ChatMessage {
    /// 新建一条普通消息，可选字段为空
    pub fn new(
        id: MessageId,
        user_id: UserId,
        username: impl Into<String>,
        content: impl Into<String>,
        kind: MessageKind,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            username: username.into(),
            content: content.into(),
            kind,
            local_id: None,
            timestamp,
            quote: None,
            mentioned_user_ids: Vec::new(),
            mentions: Vec::new(),
            recalled: false,
            star: None,
            red_packet: None,
        }
    }

    /// 原地替换为墓碑，保留 ID 与位置
    pub fn tombstone(&mut self, placeholder: &str) {
        self.recalled = true;
        self.content = placeholder.to_owned();
        self.kind = MessageKind::Recalled;
    }
}

/// 弹幕：只广播，不进历史，没有 ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Danmu {
    pub content: String,
    pub color: Option<String>,
    pub user_id: UserId,
    pub username: String,
    /// 客户端时间戳，原样透传
    pub timestamp: Option<i64>,
}
