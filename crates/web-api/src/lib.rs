//! Web API 层。
//!
//! 提供 Axum 路由：`/ws` 承载聊天协议，`/api/*` 为管理与查询接口，
//! 所有状态变更都交给应用层的房间协调器处理。

mod error;
mod routes;
mod state;
mod ws_connection;

pub use error::ApiError;
pub use routes::router;
pub use state::AppState;
