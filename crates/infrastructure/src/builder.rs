use std::sync::Arc;

use application::{RedPacketStore, ReplyGenerator, RewardsStore};
use config::AppConfig;
use domain::{RedPacket, RewardAccount};
use thiserror::Error;
use tracing::{info, warn};

use crate::{ai_client::OpenAiReplyClient, json_store::JsonFileStore};

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct Infrastructure {
    pub rewards_store: Arc<RewardsStore>,
    pub red_packet_store: Arc<RedPacketStore>,
    /// 未启用 AI 或配置不完整时为 None
    pub reply_generator: Option<Arc<dyn ReplyGenerator>>,
}

impl Infrastructure {
    pub fn build(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let rewards_store: Arc<RewardsStore> =
            Arc::new(JsonFileStore::<RewardAccount>::new(&config.rewards.data_file));
        let red_packet_store: Arc<RedPacketStore> =
            Arc::new(JsonFileStore::<RedPacket>::new(&config.red_packets.data_file));
        info!(
            rewards_file = %config.rewards.data_file,
            red_packets_file = %config.red_packets.data_file,
            "JSON 存储已就绪"
        );

        let ai = &config.star_reply.ai;
        let reply_generator: Option<Arc<dyn ReplyGenerator>> = if !ai.enabled {
            None
        } else if ai.endpoint.trim().is_empty() {
            warn!("AI 回复已启用但未配置 endpoint，使用本地回复");
            None
        } else {
            if ai.api_key().is_none() {
                warn!(env = %ai.api_key_env, "未找到 AI API Key，请求将不带认证头");
            }
            info!(provider = %ai.provider, endpoint = %ai.endpoint, "AI 回复客户端已启用");
            Some(Arc::new(OpenAiReplyClient::new(ai)?))
        };

        Ok(Self {
            rewards_store,
            red_packet_store,
            reply_generator,
        })
    }
}
