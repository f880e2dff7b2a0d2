//! 基础设施层实现。
//!
//! 提供 JSON 文件存储与 AI 回复客户端，实现应用层定义的端口。

pub mod ai_client;
pub mod builder;
pub mod json_store;

pub use ai_client::{AiProvider, OpenAiReplyClient};
pub use builder::{Infrastructure, InfrastructureError};
pub use json_store::JsonFileStore;
