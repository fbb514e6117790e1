//! # 分诊系统管理模块
//!
//! 配置加载与校验、日志初始化

pub mod config;
pub mod logging;

pub use config::{
    LoggingConfig, ReconciliationConfig, ServerConfig, SimulationConfig, TriageConfig,
};
pub use logging::init_logging;
