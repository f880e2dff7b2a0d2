use domain::DomainError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error("{0}")]
    Domain(#[from] DomainError),
    /// 持久化读写失败
    #[error("数据保存失败: {0}")]
    Persistence(String),
    /// 房间协调器已经停止
    #[error("聊天室服务不可用")]
    RoomClosed,
    #[error("外部服务调用失败: {0}")]
    External(String),
}

impl ApplicationError {
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence(message.into())
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::External(message.into())
    }

    /// 机器可读的失败原因
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Domain(err) => err.reason_code(),
            Self::Persistence(_) | Self::External(_) => "external_dependency_error",
            Self::RoomClosed => "unavailable",
        }
    }
}

pub type ApplicationResult<T> = Result<T, ApplicationError>;
