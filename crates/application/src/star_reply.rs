//! 明星回复
//!
//! 以触发前缀开头的聊天消息会生成一条 `star_reply` 消息。远程生成器（AI 接口）
//! 带硬超时，失败或返回空文本时回退到本地模板生成。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::warn;

use crate::error::ApplicationError;

#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, topic: &str) -> Result<String, ApplicationError>;
}

const TEMPLATES: &[&str] = &[
    "关于「{t}」，我有几点想说：",
    "作为艺人，从我的视角看「{t}」更多是情感和态度。",
    "如果你喜欢「{t}」，我推荐你可以试试相关的幕后花絮或官方直播。",
    "这件事真的很有话题性，尤其是大家对「{t}」的期待感越来越强。",
    "老实说，我也经常被问到关于「{t}」的问题，感觉既兴奋又紧张。",
    "如果让我亲自参与，我会把更多温暖和互动放进去，让大家感到被看见。",
    "现场的氛围会影响一切，关于「{t}」的讨论会带来许多美好的记忆。",
    "谢谢你提到「{t}」，真想知道你最关心哪一点呢？",
    "哈哈，幕后其实有很多有趣的小故事，等有机会我慢慢讲给你听。",
];

const INTERACTIONS: &[&str] = &[
    "你觉得「{t}」最吸引人的地方是什么？我想听你的看法。",
    "如果能现场见到大家，我会准备一些惊喜，大家会喜欢吗？",
    "我个人最中意的部分是细节设计，大家觉得呢？",
];

const TAILS: &[&str] = &["❤️", "🌟", "🎤", "💫", "🔥", "👏"];

const SIGNATURE: &str = " —— 来自热心的顶流小助手";

/// 本地模板生成器，永不失败
#[derive(Debug, Default, Clone)]
pub struct LocalReplyGenerator;

impl LocalReplyGenerator {
    pub fn compose(&self, topic: &str) -> String {
        let topic = topic.trim();
        let mut rng = rand::rng();
        let count = rng.random_range(4..8);
        let mut pieces: Vec<String> = (0..count)
            .filter_map(|_| TEMPLATES.choose(&mut rng))
            .map(|template| template.replace("{t}", topic))
            .collect();
        if !topic.is_empty() {
            if let Some(interaction) = INTERACTIONS.choose(&mut rng) {
                pieces.insert(1.min(pieces.len()), interaction.replace("{t}", topic));
            }
        }
        let mut reply = pieces.join(" ");
        if let Some(tail) = TAILS.choose(&mut rng) {
            reply.push(' ');
            reply.push_str(tail);
        }
        reply.push_str(SIGNATURE);
        reply
    }
}

#[async_trait]
impl ReplyGenerator for LocalReplyGenerator {
    async fn generate(&self, topic: &str) -> Result<String, ApplicationError> {
        Ok(self.compose(topic))
    }
}

/// 生成好的回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StarReply {
    pub star_name: String,
    pub gradient: Vec<String>,
    pub content: String,
}

pub struct StarReplyService {
    trigger: String,
    stars: Vec<String>,
    gradients: Vec<Vec<String>>,
    remote: Option<Arc<dyn ReplyGenerator>>,
    local: LocalReplyGenerator,
    timeout: Duration,
}

impl StarReplyService {
    pub fn new(config: &config::StarReplyConfig, remote: Option<Arc<dyn ReplyGenerator>>) -> Self {
        Self {
            trigger: config.trigger.clone(),
            stars: config.stars.clone(),
            gradients: config.gradients.clone(),
            remote,
            local: LocalReplyGenerator,
            timeout: Duration::from_secs(config.ai.timeout_secs),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 消息以触发前缀开头时返回话题
    pub fn topic_of(&self, content: &str) -> Option<String> {
        content
            .trim_start()
            .strip_prefix(self.trigger.as_str())
            .map(|rest| rest.trim().to_owned())
    }

    pub async fn reply(&self, topic: &str) -> StarReply {
        let content = match self.remote_reply(topic).await {
            Some(text) => text,
            None => self.local.compose(topic),
        };
        let (star_name, gradient) = self.pick_star();
        StarReply {
            star_name,
            gradient,
            content,
        }
    }

    async fn remote_reply(&self, topic: &str) -> Option<String> {
        let remote = self.remote.as_ref()?;
        match tokio::time::timeout(self.timeout, remote.generate(topic)).await {
            Ok(Ok(text)) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            Ok(Ok(_)) => {
                warn!(topic, "AI 返回空内容，使用本地回复");
                None
            }
            Ok(Err(err)) => {
                warn!(topic, error = %err, "AI 调用失败，使用本地回复");
                None
            }
            Err(_) => {
                warn!(topic, timeout_secs = self.timeout.as_secs(), "AI 调用超时，使用本地回复");
                None
            }
        }
    }

    fn pick_star(&self) -> (String, Vec<String>) {
        let mut rng = rand::rng();
        let name = self
            .stars
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| format!("star_{}", rng.random_range(0..1000)));
        let gradient = self
            .gradients
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| vec!["#FFD700".into(), "#FF6B6B".into()]);
        (name, gradient)
    }
}
