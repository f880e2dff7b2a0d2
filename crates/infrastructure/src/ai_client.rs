//! OpenAI 兼容的 Chat Completions 客户端
//!
//! 超时由 `StarReplyService` 统一控制，这里的客户端超时只是兜底。

use std::time::Duration;

use application::{ApplicationError, ReplyGenerator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiProvider {
    OpenAiCompatible,
    /// 腾讯混元：不发送 temperature / max_tokens，模型有默认值
    Hunyuan,
}

impl AiProvider {
    pub fn from_name(name: &str) -> Self {
        if name.to_ascii_lowercase().contains("hun") {
            Self::Hunyuan
        } else {
            Self::OpenAiCompatible
        }
    }
}

const HUNYUAN_DEFAULT_MODEL: &str = "hunyuan-turbos-latest";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ChoiceMessage>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiReplyClient {
    http: reqwest::Client,
    provider: AiProvider,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    system_prompt: String,
    user_prompt_template: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiReplyClient {
    pub fn new(config: &config::AiConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        let provider = AiProvider::from_name(&config.provider);
        let model = match (provider, config.model.trim()) {
            (AiProvider::Hunyuan, "") => HUNYUAN_DEFAULT_MODEL.to_owned(),
            (_, model) => model.to_owned(),
        };
        Ok(Self {
            http,
            provider,
            endpoint: config.endpoint.clone(),
            model,
            api_key: config.api_key(),
            system_prompt: config.system_prompt.clone(),
            user_prompt_template: config.user_prompt_template.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn request<'a>(&'a self, user_prompt: &'a str) -> ChatRequest<'a> {
        let (temperature, max_tokens) = match self.provider {
            AiProvider::OpenAiCompatible => (Some(self.temperature), Some(self.max_tokens)),
            AiProvider::Hunyuan => (None, None),
        };
        ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature,
            max_tokens,
        }
    }
}

/// 取 `choices[0].message.content`，其次 `choices[0].text`
fn extract_text(body: Value) -> Option<String> {
    let response: ChatResponse = serde_json::from_value(body).ok()?;
    let first = response.choices.into_iter().next()?;
    first
        .message
        .and_then(|message| message.content)
        .or(first.text)
        .filter(|text| !text.trim().is_empty())
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyClient {
    async fn generate(&self, topic: &str) -> Result<String, ApplicationError> {
        let user_prompt = self.user_prompt_template.replace("{{topic}}", topic);
        let mut request = self.http.post(&self.endpoint).json(&self.request(&user_prompt));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| {
            warn!(endpoint = %self.endpoint, error = %e, "AI 请求发送失败");
            ApplicationError::external(e.to_string())
        })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "AI 接口返回错误状态");
            return Err(ApplicationError::external(format!("AI 接口返回 {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| ApplicationError::external(format!("AI 响应解析失败: {e}")))?;
        debug!(topic, "AI 回复已返回");
        extract_text(body).ok_or_else(|| ApplicationError::external("AI 响应中没有文本"))
    }
}
