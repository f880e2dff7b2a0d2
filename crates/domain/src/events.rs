//! 传输事件
//!
//! 线上帧格式为 `{"event": "<名称>", "data": {...}}`，载荷字段使用 camelCase。
//! 入站事件在边界处完成校验与字段归一化，进入房间时已经是强类型。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{DomainError, DomainResult};
use crate::message::{ChatMessage, Danmu, MessageKind};
use crate::red_packet::{RedPacketDetails, RedPacketKind, RedPacketStatus};
use crate::rewards::PointsSnapshot;
use crate::value_objects::{RewardKey, Timestamp, UserId};

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinPayload {
    #[serde(default, alias = "identityToken")]
    pub user_id: String,
    #[serde(default, alias = "displayName")]
    pub username: String,
    #[serde(default, alias = "coreId")]
    pub reward_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    /// 旧客户端使用的字段名
    #[serde(default, rename = "userName")]
    pub legacy_user_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    #[serde(default)]
    pub local_id: Option<String>,
    #[serde(default)]
    pub quote: Option<QuoteInput>,
    #[serde(default)]
    pub mentioned_user_ids: Option<Vec<String>>,
    #[serde(default)]
    pub mentions: Option<Vec<String>>,
}

impl ChatPayload {
    /// `userName` 只在 `username` 缺失时作为别名
    fn normalize(mut self) -> Self {
        if self.username.is_none() {
            self.username = self.legacy_user_name.take();
        } else {
            self.legacy_user_name = None;
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DanmuPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallPayload {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub message_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KickPayload {
    #[serde(default, alias = "targetIdentityToken")]
    pub target_user_id: Option<String>,
    #[serde(default, alias = "targetDisplayName")]
    pub target_username: Option<String>,
    /// 分钟数，0 表示永久
    #[serde(default, alias = "durationMinutes")]
    pub duration: u64,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRedPacketPayload {
    #[serde(rename = "type", alias = "kind")]
    pub kind: RedPacketKind,
    pub total_amount: u64,
    pub total_count: u32,
    #[serde(default)]
    pub greeting: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedPacketIdPayload {
    pub red_packet_id: String,
}

/// 入站事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Join(JoinPayload),
    ChatMessage(ChatPayload),
    DanmuMessage(DanmuPayload),
    RecallMessage(RecallPayload),
    ClaimDailyPoints,
    GetPoints,
    KickUser(KickPayload),
    SendRedPacket(SendRedPacketPayload),
    ReceiveRedPacket(RedPacketIdPayload),
    GetRedPacket(RedPacketIdPayload),
}

impl ClientEvent {
    /// 解析一帧文本；`data` 缺失或为 null 时按空对象处理
    pub fn parse(text: &str) -> DomainResult<Self> {
        let envelope: Envelope = serde_json::from_str(text)
            .map_err(|e| DomainError::validation("frame", format!("无效的消息格式: {e}")))?;
        let data = match envelope.data {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };

        let event = match envelope.event.as_str() {
            "join" => Self::Join(payload(data)?),
            "chat_message" => {
                let chat: ChatPayload = payload(data)?;
                if !chat.kind.is_client_sendable() {
                    return Err(DomainError::validation("type", "不支持的消息类型"));
                }
                Self::ChatMessage(chat.normalize())
            }
            "danmu_message" => Self::DanmuMessage(payload(data)?),
            "recall_message" => Self::RecallMessage(payload(data)?),
            "claim_daily_points" => Self::ClaimDailyPoints,
            "get_points" => Self::GetPoints,
            "kick_user" => Self::KickUser(payload(data)?),
            "send_red_packet" => Self::SendRedPacket(payload(data)?),
            "receive_red_packet" => Self::ReceiveRedPacket(payload(data)?),
            "get_red_packet" => Self::GetRedPacket(payload(data)?),
            other => {
                return Err(DomainError::validation("event", format!("未知事件: {other}")));
            }
        };
        Ok(event)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::ChatMessage(_) => "chat_message",
            Self::DanmuMessage(_) => "danmu_message",
            Self::RecallMessage(_) => "recall_message",
            Self::ClaimDailyPoints => "claim_daily_points",
            Self::GetPoints => "get_points",
            Self::KickUser(_) => "kick_user",
            Self::SendRedPacket(_) => "send_red_packet",
            Self::ReceiveRedPacket(_) => "receive_red_packet",
            Self::GetRedPacket(_) => "get_red_packet",
        }
    }
}

fn payload<T: serde::de::DeserializeOwned>(data: Value) -> DomainResult<T> {
    serde_json::from_value(data).map_err(|e| DomainError::validation("data", format!("参数错误: {e}")))
}

/// 名单中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub user_id: UserId,
    pub username: String,
    pub nickname: String,
    pub points: u64,
}

/// 出站事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    // 单播
    ChatHistory(Vec<ChatMessage>),
    PointsInfo(PointsSnapshot),
    UserIdFailed {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RecallFailed {
        message: String,
        reason: String,
    },
    ClaimPointsFailed {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    ClaimPointsSuccess {
        points: u64,
        added_points: u64,
    },
    PointsError {
        message: String,
    },
    KickFailed {
        message: String,
        reason: String,
    },
    #[serde(rename_all = "camelCase")]
    KickSuccess {
        message: String,
        target_user_id: UserId,
        target_username: String,
        duration: u64,
    },
    #[serde(rename_all = "camelCase")]
    UserBanned {
        message: String,
        reason: String,
        duration: u64,
        /// 剩余毫秒数；永久封禁为 null
        remaining_time: Option<i64>,
        timestamp: i64,
    },
    UserKicked {
        message: String,
        duration: u64,
        reason: String,
        timestamp: i64,
    },
    RedPacketFailed {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RedPacketReceived {
        red_packet_id: String,
        amount: u64,
        remaining_count: u32,
        status: RedPacketStatus,
    },
    RedPacketDetails(RedPacketDetails),

    // 广播
    #[serde(rename_all = "camelCase")]
    UserJoin {
        username: String,
        user_id: UserId,
        nickname: String,
        points: u64,
        users: Vec<RosterEntry>,
    },
    #[serde(rename_all = "camelCase")]
    UserLeave {
        user_id: UserId,
        users: Vec<RosterEntry>,
    },
    ChatMessage(ChatMessage),
    DanmuMessage(Danmu),
    #[serde(rename_all = "camelCase")]
    MessageRecalled {
        message_id: String,
        user_id: UserId,
    },
    #[serde(rename_all = "camelCase")]
    PointsUpdated {
        reward_key: RewardKey,
        points: u64,
        added_points: u64,
        can_claim_daily: bool,
        last_claim_date: Option<Timestamp>,
    },
    UsersUpdated {
        users: Vec<RosterEntry>,
    },
    #[serde(rename_all = "camelCase")]
    UserNicknameUpdated {
        user_id: UserId,
        username: String,
        new_nickname: String,
    },
    #[serde(rename_all = "camelCase")]
    UserKickedNotification {
        target_user_id: UserId,
        target_username: String,
        operator: String,
        duration: u64,
        reason: String,
        message: String,
    },
    UserListUpdated {
        users: Vec<RosterEntry>,
    },
    SystemNotification {
        #[serde(rename = "type")]
        kind: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    RedPacketUpdated {
        red_packet_id: String,
        remaining_count: u32,
        status: RedPacketStatus,
        receiver_name: String,
    },
}

impl ServerEvent {
    pub fn to_json(&self) -> DomainResult<String> {
        serde_json::to_string(self)
            .map_err(|e| DomainError::validation("event", format!("序列化失败: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn legacy_user_name_is_folded_into_username() {
        let event = ClientEvent::parse(
            r#"{"event":"chat_message","data":{"userId":"u1","userName":"Alice","content":"hi"}}"#,
        )
        .unwrap();
        match event {
            ClientEvent::ChatMessage(chat) => {
                assert_eq!(chat.username.as_deref(), Some("Alice"));
                assert!(chat.legacy_user_name.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn null_data_is_an_empty_payload() {
        assert_eq!(
            ClientEvent::parse(r#"{"event":"get_points","data":null}"#).unwrap(),
            ClientEvent::GetPoints
        );
        assert_eq!(
            ClientEvent::parse(r#"{"event":"claim_daily_points"}"#).unwrap(),
            ClientEvent::ClaimDailyPoints
        );
    }

    #[test]
    fn clients_cannot_send_server_only_kinds() {
        let err = ClientEvent::parse(
            r#"{"event":"chat_message","data":{"userId":"u1","content":"x","type":"recalled"}}"#,
        )
        .unwrap_err();
        assert_eq!(err.reason_code(), "validation_error");
        assert!(ClientEvent::parse(r#"{"event":"nope"}"#).is_err());
        assert!(ClientEvent::parse("not json").is_err());
    }

    #[test]
    fn join_accepts_aliases() {
        let event = ClientEvent::parse(
            r#"{"event":"join","data":{"identityToken":"u1","displayName":"Alice","coreId":"r1"}}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Join(JoinPayload {
                user_id: "u1".into(),
                username: "Alice".into(),
                reward_key: Some("r1".into()),
            })
        );
    }

    #[test]
    fn outbound_frames_use_event_and_camel_case_data() {
        let event = ServerEvent::MessageRecalled {
            message_id: "42".into(),
            user_id: UserId::parse("u1").unwrap(),
        };
        let value: Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"event": "message_recalled", "data": {"messageId": "42", "userId": "u1"}})
        );

        let banned = ServerEvent::UserBanned {
            message: "您已被禁止进入聊天室".into(),
            reason: "spam".into(),
            duration: 0,
            remaining_time: None,
            timestamp: 1,
        };
        let value = serde_json::to_value(&banned).unwrap();
        assert_eq!(value["data"]["remainingTime"], Value::Null);

        let notice = ServerEvent::SystemNotification {
            kind: "cleanup".into(),
            message: "m".into(),
        };
        assert_eq!(serde_json::to_value(&notice).unwrap()["data"]["type"], "cleanup");
    }
}
