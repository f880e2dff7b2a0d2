use std::sync::Arc;

use application::{RedPacketLedger, RewardsLedger, RoomHandle};
use config::{AppConfig, ContentConfig};

#[derive(Clone)]
pub struct AppState {
    pub room: RoomHandle,
    /// 积分功能关闭时为 None
    pub rewards: Option<Arc<RewardsLedger>>,
    pub red_packets: Arc<RedPacketLedger>,
    pub content: Arc<ContentConfig>,
    pub cors_origins: Arc<[String]>,
}

impl AppState {
    pub fn new(
        room: RoomHandle,
        rewards: Option<Arc<RewardsLedger>>,
        red_packets: Arc<RedPacketLedger>,
        config: &AppConfig,
    ) -> Self {
        Self {
            room,
            rewards,
            red_packets,
            content: Arc::new(config.content.clone()),
            cors_origins: config.server.cors_origins.clone().into(),
        }
    }
}
