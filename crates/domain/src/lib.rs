//! 聊天室核心领域模型
//!
//! 包含在线身份注册表、历史消息账本、封禁记录、积分账户、红包，
//! 以及客户端与服务器之间的事件定义。这里只有纯状态与规则，不做任何 I/O。

pub mod errors;
pub mod events;
pub mod history;
pub mod message;
pub mod moderation;
pub mod red_packet;
pub mod registry;
pub mod rewards;
pub mod value_objects;

// 重新导出常用类型
pub use errors::*;
pub use events::*;
pub use history::HistoryLedger;
pub use message::*;
pub use moderation::{BanRecord, ModerationStore};
pub use red_packet::*;
pub use registry::{BindOutcome, Identity, IdentityRegistry, UnbindOutcome};
pub use rewards::*;
pub use value_objects::*;
