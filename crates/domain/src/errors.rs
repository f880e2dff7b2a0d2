//! 领域模型错误定义
//!
//! 每个错误的 Display 文本会原样作为私有失败事件的 `message` 发回客户端，
//! 所以这里使用面向用户的中文描述。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// 输入缺失或格式错误
    #[error("{message}")]
    Validation { field: String, message: String },

    /// 连接绑定的身份与请求声明的身份不一致
    #[error("用户验证失败，请重新输入用户名")]
    AuthenticationFailed,

    /// 用户处于封禁期
    #[error("您已被禁止进入聊天室")]
    Banned,

    /// 资源不存在
    #[error("{resource}不存在")]
    NotFound { resource: String },

    /// 无权操作该资源
    #[error("无权限撤回此消息")]
    Forbidden,

    /// 超出撤回时间窗口
    #[error("消息发送超过2分钟，无法撤回")]
    RecallExpired,

    /// 消息已经被撤回过
    #[error("消息已撤回")]
    AlreadyRecalled,

    /// 今日已领取每日积分
    #[error("今日已领取每日积分，请明天再来")]
    AlreadyClaimed,

    /// 积分余额不足
    #[error("积分不足")]
    InsufficientPoints,

    /// 不能踢出自己
    #[error("不能踢出自己")]
    CannotKickSelf,

    /// 踢人目标不存在
    #[error("目标用户不存在")]
    TargetNotFound,

    /// 目标用户不在线
    #[error("目标用户不在线")]
    TargetOffline,

    /// 红包状态不允许该操作
    #[error("{reason}")]
    RedPacket { reason: String },
}

impl DomainError {
    /// 创建验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// 创建红包错误
    pub fn red_packet(reason: impl Into<String>) -> Self {
        Self::RedPacket {
            reason: reason.into(),
        }
    }

    /// 机器可读的失败原因，随失败事件一起下发
    pub fn reason_code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation_error",
            Self::AuthenticationFailed => "authorization_error",
            Self::Banned => "banned",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden => "forbidden",
            Self::RecallExpired => "expired",
            Self::AlreadyRecalled => "already_recalled",
            Self::AlreadyClaimed => "already_claimed",
            Self::InsufficientPoints => "insufficient_points",
            Self::CannotKickSelf => "cannot_kick_self",
            Self::TargetNotFound => "target_not_found",
            Self::TargetOffline => "target_offline",
            Self::RedPacket { .. } => "red_packet_unavailable",
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
