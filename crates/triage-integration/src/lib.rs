//! # 分诊集成模块
//!
//! 提供与外部系统的集成功能，包括：
//! - 分诊决策服务的HTTP客户端（决策请求与患者登记）
//! - RESTful API接口，供人工登记和展示层读取队列视图

pub mod api;
pub mod decision_client;

pub use api::{create_api_routes, ApiError, ApiServer, ApiState};
pub use decision_client::{
    parse_intake_response, parse_triage_response, AuthenticationConfig, DecisionServiceConfig,
    HttpDecisionClient,
};
