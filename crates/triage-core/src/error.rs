//! 错误定义模块

use thiserror::Error;

/// 分诊系统统一错误类型
#[derive(Error, Debug)]
pub enum TriageError {
    #[error("重复ID: {0}")]
    DuplicateId(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("决策服务不可用: {0}")]
    DecisionUnavailable(String),

    #[error("决策结果格式错误: {0}")]
    DecisionMalformed(String),

    #[error("患者登记被拒绝: {0}")]
    IntakeRejected(String),

    #[error("配置错误: {0}")]
    Config(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// 分诊系统统一结果类型
pub type Result<T> = std::result::Result<T, TriageError>;
