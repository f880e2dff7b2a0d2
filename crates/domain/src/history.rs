//! 有界历史消息账本
//!
//! 插入有序、容量固定的 FIFO 缓冲区。撤回与改名都是原地修改，记录永不删除，
//! 只会因为容量溢出从头部淘汰。

use std::collections::VecDeque;

use crate::errors::{DomainError, DomainResult};
use crate::message::{ChatMessage, MessageKind};
use crate::value_objects::{MessageId, UserId};

/// 默认容量
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct HistoryLedger {
    entries: VecDeque<ChatMessage>,
    limit: usize,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl HistoryLedger {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit + 1),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 追加到尾部；超出容量时淘汰最旧的记录并返回它
    pub fn append(&mut self, message: ChatMessage) -> Option<ChatMessage> {
        self.entries.push_back(message);
        if self.entries.len() > self.limit {
            self.entries.pop_front()
        } else {
            None
        }
    }

    /// 当前内容的独立副本，用于加入时下发
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.entries.iter().cloned().collect()
    }

    pub fn find_by_id(&self, id: &MessageId) -> Option<&ChatMessage> {
        self.entries.iter().find(|message| &message.id == id)
    }

    /// 撤回自己在窗口期内发送的消息
    ///
    /// `now_ms - timestamp > window_ms` 视为过期，恰好等于窗口仍可撤回。
    pub fn recall(
        &mut self,
        id: &MessageId,
        requester: &UserId,
        now_ms: i64,
        window_ms: i64,
        placeholder: &str,
    ) -> DomainResult<&ChatMessage> {
        let message = self
            .entries
            .iter_mut()
            .find(|message| &message.id == id)
            .ok_or_else(|| DomainError::not_found("消息"))?;

        if &message.user_id != requester {
            return Err(DomainError::Forbidden);
        }
        if message.recalled {
            return Err(DomainError::AlreadyRecalled);
        }
        if now_ms - message.timestamp > window_ms {
            return Err(DomainError::RecallExpired);
        }

        message.tombstone(placeholder);
        Ok(message)
    }

    /// 追溯重写某个身份在账本中的显示名（含引用子记录），返回改动条数
    pub fn relabel(&mut self, user_id: &UserId, new_name: &str) -> usize {
        let mut touched = 0;
        for message in self.entries.iter_mut() {
            if &message.user_id == user_id {
                message.username = new_name.to_owned();
                touched += 1;
            }
            if let Some(quote) = message.quote.as_mut() {
                if quote.user_id.as_ref() == Some(user_id) {
                    quote.username = new_name.to_owned();
                    touched += 1;
                }
            }
        }
        touched
    }

    /// 按显示名查找最近一条消息的发送者
    pub fn sender_by_name(&self, name: &str) -> Option<&UserId> {
        self.entries
            .iter()
            .rev()
            .find(|message| message.username == name && message.kind != MessageKind::StarReply)
            .map(|message| &message.user_id)
    }

    /// 账本窗口内是否出现过该发送者
    pub fn has_sender(&self, user_id: &UserId) -> bool {
        self.entries.iter().any(|message| &message.user_id == user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Quote;

    fn message(id: &str, user: &str, ts: i64) -> ChatMessage {
        ChatMessage::new(
            MessageId::new(id),
            UserId::parse(user).unwrap(),
            user,
            format!("content {id}"),
            MessageKind::Text,
            ts,
        )
    }

    #[test]
    fn length_never_exceeds_limit_and_evicts_oldest_first() {
        let mut ledger = HistoryLedger::new(100);
        for i in 0..150 {
            let evicted = ledger.append(message(&i.to_string(), "u1", i));
            if i >= 100 {
                assert_eq!(evicted.unwrap().id.as_str(), (i - 100).to_string());
            } else {
                assert!(evicted.is_none());
            }
            assert!(ledger.len() <= 100);
        }
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.first().unwrap().id.as_str(), "50");
        assert_eq!(snapshot.last().unwrap().id.as_str(), "149");
    }

    #[test]
    fn snapshot_is_detached_from_later_mutation() {
        let mut ledger = HistoryLedger::default();
        ledger.append(message("1", "u1", 0));
        let snapshot = ledger.snapshot();
        ledger
            .recall(&MessageId::new("1"), &UserId::parse("u1").unwrap(), 10, 120_000, "x")
            .unwrap();
        assert!(!snapshot[0].recalled);
        assert!(ledger.find_by_id(&MessageId::new("1")).unwrap().recalled);
    }

    #[test]
    fn recall_window_boundaries() {
        let u1 = UserId::parse("u1").unwrap();
        let mut ledger = HistoryLedger::default();
        ledger.append(message("a", "u1", 0));
        ledger.append(message("b", "u1", 0));

        assert_eq!(
            ledger.recall(&MessageId::new("a"), &u1, 121_000, 120_000, "x"),
            Err(DomainError::RecallExpired)
        );
        let recalled = ledger
            .recall(&MessageId::new("b"), &u1, 119_000, 120_000, "此消息已被撤回")
            .unwrap();
        assert_eq!(recalled.content, "此消息已被撤回");
        assert_eq!(recalled.kind, MessageKind::Recalled);
    }

    #[test]
    fn recall_rejections() {
        let mut ledger = HistoryLedger::default();
        ledger.append(message("a", "u1", 0));
        let u1 = UserId::parse("u1").unwrap();
        let u2 = UserId::parse("u2").unwrap();

        assert_eq!(
            ledger.recall(&MessageId::new("missing"), &u1, 0, 120_000, "x").unwrap_err(),
            DomainError::not_found("消息")
        );
        assert_eq!(
            ledger.recall(&MessageId::new("a"), &u2, 0, 120_000, "x").unwrap_err(),
            DomainError::Forbidden
        );
        ledger.recall(&MessageId::new("a"), &u1, 0, 120_000, "x").unwrap();
        assert_eq!(
            ledger.recall(&MessageId::new("a"), &u1, 0, 120_000, "x").unwrap_err(),
            DomainError::AlreadyRecalled
        );
    }

    #[test]
    fn relabel_rewrites_senders_and_quotes() {
        let u1 = UserId::parse("u1").unwrap();
        let mut ledger = HistoryLedger::default();
        ledger.append(message("a", "u1", 0));
        let mut reply = message("b", "u2", 1);
        reply.quote = Some(Quote {
            id: Some(MessageId::new("a")),
            user_id: Some(u1.clone()),
            username: "u1".into(),
            content: None,
        });
        ledger.append(reply);

        assert_eq!(ledger.relabel(&u1, "Alice"), 2);
        let snapshot = ledger.snapshot();
        assert_eq!(snapshot[0].username, "Alice");
        assert_eq!(snapshot[1].username, "u2");
        assert_eq!(snapshot[1].quote.as_ref().unwrap().username, "Alice");
    }
}
