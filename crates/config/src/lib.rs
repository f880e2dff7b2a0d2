//! 统一配置中心
//!
//! 加载顺序：内置默认值 → `APP_CONFIG_FILE` 指定的文件（yaml/json/toml）
//! → `APP_` 前缀的环境变量（`__` 表示嵌套，例如 `APP_ROOM__HISTORY_LIMIT=50`）。

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[serde(default)]
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub room: RoomConfig,
    #[serde(default)]
    #[validate(nested)]
    pub rewards: RewardsConfig,
    #[serde(default)]
    #[validate(nested)]
    pub red_packets: RedPacketConfig,
    #[serde(default)]
    #[validate(nested)]
    pub star_reply: StarReplyConfig,
    #[serde(default)]
    pub content: ContentConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["*".into()],
        }
    }
}

/// 聊天室配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RoomConfig {
    /// 历史消息上限，最多 100 条
    #[validate(range(min = 1, max = 100))]
    pub history_limit: usize,
    pub recall_window_secs: u64,
    #[validate(range(min = 1))]
    pub nickname_max_chars: usize,
    pub recall_tombstone: String,
    /// 房间命令队列容量
    #[validate(range(min = 1))]
    pub command_buffer: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            recall_window_secs: 120,
            nickname_max_chars: 20,
            recall_tombstone: "此消息已被撤回".into(),
            command_buffer: 1024,
        }
    }
}

/// 积分配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RewardsConfig {
    pub enabled: bool,
    #[validate(length(min = 1))]
    pub data_file: String,
    #[validate(range(min = 1))]
    pub accrual_interval_secs: u64,
    pub accrual_points: u64,
    pub accrual_minutes: u64,
    pub daily_points: u64,
    #[validate(range(min = 1))]
    pub inactive_days: i64,
    /// 六段式 cron（秒 分 时 日 月 周），按本地时间
    #[validate(length(min = 1))]
    pub sweep_cron: String,
}

impl Default for RewardsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_file: "data/points.json".into(),
            accrual_interval_secs: 600,
            accrual_points: 10,
            accrual_minutes: 10,
            daily_points: 100,
            inactive_days: 50,
            sweep_cron: "0 0 3 * * *".into(),
        }
    }
}

/// 红包配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct RedPacketConfig {
    #[validate(length(min = 1))]
    pub data_file: String,
    #[validate(range(min = 1))]
    pub expire_hours: i64,
    pub retain_days: i64,
    /// 历史查询每类最多返回条数
    #[validate(range(min = 1))]
    pub history_limit: usize,
}

impl Default for RedPacketConfig {
    fn default() -> Self {
        Self {
            data_file: "data/redPackets.json".into(),
            expire_hours: 24,
            retain_days: 7,
            history_limit: 20,
        }
    }
}

/// 明星回复配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StarReplyConfig {
    pub enabled: bool,
    /// 消息以此前缀开头时触发
    #[validate(length(min = 1))]
    pub trigger: String,
    #[serde(default)]
    pub stars: Vec<String>,
    #[serde(default)]
    pub gradients: Vec<Vec<String>>,
    #[serde(default)]
    #[validate(nested)]
    pub ai: AiConfig,
}

impl Default for StarReplyConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger: "/star".into(),
            stars: Vec::new(),
            gradients: vec![vec!["#FFD700".into(), "#FF6B6B".into()]],
            ai: AiConfig::default(),
        }
    }
}

/// OpenAI 兼容接口配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AiConfig {
    pub enabled: bool,
    /// `openai-compatible` 或 `hunyuan`
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    /// 存放 API Key 的环境变量名
    pub api_key_env: String,
    pub system_prompt: String,
    /// `{{topic}}` 会被替换为话题
    pub user_prompt_template: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    pub max_tokens: u32,
    #[validate(range(min = 1))]
    pub timeout_secs: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai-compatible".into(),
            endpoint: String::new(),
            model: String::new(),
            api_key_env: "AI_API_KEY".into(),
            system_prompt: String::new(),
            user_prompt_template: "{{topic}}".into(),
            temperature: 0.8,
            max_tokens: 600,
            timeout_secs: 15,
        }
    }
}

impl AiConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|key| !key.is_empty())
    }
}

/// 公告与表情目录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub notice_file: String,
    pub emoji_dir: String,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            notice_file: "data/notice.md".into(),
            emoji_dir: "data/emojis".into(),
        }
    }
}

impl AppConfig {
    /// 按默认值 → 配置文件 → 环境变量的顺序加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            figment = if path.ends_with(".yml") || path.ends_with(".yaml") {
                figment.merge(Yaml::file(path))
            } else if path.ends_with(".json") {
                figment.merge(Json::file(path))
            } else {
                figment.merge(Toml::file(path))
            };
        }
        Self::from_figment(figment.merge(Env::prefixed("APP_").split("__")))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("配置解析失败: {0}")]
    Extract(#[from] Box<figment::Error>),
    #[error("配置校验失败: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
