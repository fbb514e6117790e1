//! 配置管理
//!
//! 从可选的配置文件和 `TRIAGE__` 前缀环境变量加载配置，所有字段都有默认值

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use triage_core::{utils::is_valid_record_id, Result, Staff, TriageError};
use triage_integration::DecisionServiceConfig;
use triage_workflow::{ArrivalConfig, ReconcileConfig};

/// 环境变量前缀
pub const ENV_PREFIX: &str = "TRIAGE";

/// 分诊系统完整配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    /// 服务器配置
    pub server: ServerConfig,
    /// 决策服务配置
    pub decision_service: DecisionServiceConfig,
    /// 对账配置
    pub reconciliation: ReconciliationConfig,
    /// 到达模拟配置
    pub simulation: SimulationConfig,
    /// 初始医护名单
    pub staff: Vec<Staff>,
    /// 日志配置
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 对账配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    /// 定时刷新间隔（秒）
    pub refresh_interval_secs: u64,
    /// 同时进行中的决策请求上限
    pub max_in_flight: usize,
}

/// 到达模拟配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub enabled: bool,
    pub min_interval_secs: u64,
    pub max_interval_secs: u64,
    pub min_treatment_minutes: u32,
    pub max_treatment_minutes: u32,
    pub seed: Option<u64>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别或过滤指令
    pub level: String,
    /// 输出日志目标模块
    pub with_target: bool,
    /// 彩色输出
    pub ansi: bool,
}

impl TriageConfig {
    /// 加载配置：配置文件（可选）+ 环境变量
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_from(
            path,
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_from(path: Option<&str>, environment: Environment) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(environment)
            .build()
            .map_err(|e| TriageError::Config(format!("failed to load configuration: {}", e)))?;

        let config: TriageConfig = settings
            .try_deserialize()
            .map_err(|e| TriageError::Config(format!("invalid configuration: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.decision_service.endpoint.trim().is_empty() {
            return Err(TriageError::Config("decision_service.endpoint is empty".to_string()));
        }

        let reconciliation = &self.reconciliation;
        if reconciliation.refresh_interval_secs == 0 {
            return Err(TriageError::Config(
                "reconciliation.refresh_interval_secs must be positive".to_string(),
            ));
        }
        if reconciliation.max_in_flight == 0 {
            return Err(TriageError::Config(
                "reconciliation.max_in_flight must be positive".to_string(),
            ));
        }

        let simulation = &self.simulation;
        if simulation.min_interval_secs == 0 || simulation.min_interval_secs > simulation.max_interval_secs {
            return Err(TriageError::Config(format!(
                "invalid simulation interval {}..{}",
                simulation.min_interval_secs, simulation.max_interval_secs
            )));
        }
        if simulation.min_treatment_minutes == 0
            || simulation.min_treatment_minutes > simulation.max_treatment_minutes
        {
            return Err(TriageError::Config(format!(
                "invalid treatment range {}..={}",
                simulation.min_treatment_minutes, simulation.max_treatment_minutes
            )));
        }

        let mut seen = HashSet::new();
        for member in &self.staff {
            if !is_valid_record_id(&member.id) {
                return Err(TriageError::Config(format!("invalid staff id {:?}", member.id)));
            }
            if !seen.insert(member.id.as_str()) {
                return Err(TriageError::Config(format!("duplicate staff id {}", member.id)));
            }
        }

        Ok(())
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl ReconciliationConfig {
    pub fn to_reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            refresh_interval: Duration::from_secs(self.refresh_interval_secs),
            max_in_flight: self.max_in_flight,
        }
    }
}

impl SimulationConfig {
    pub fn to_arrival_config(&self) -> ArrivalConfig {
        ArrivalConfig {
            min_interval: Duration::from_secs(self.min_interval_secs),
            max_interval: Duration::from_secs(self.max_interval_secs),
            min_treatment_minutes: self.min_treatment_minutes,
            max_treatment_minutes: self.max_treatment_minutes,
            seed: self.seed,
        }
    }
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            decision_service: DecisionServiceConfig::default(),
            reconciliation: ReconciliationConfig::default(),
            simulation: SimulationConfig::default(),
            staff: vec![Staff::new("D1", "Dr. Lee", "general")],
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            max_in_flight: 4,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_interval_secs: 60,
            max_interval_secs: 120,
            min_treatment_minutes: 20,
            max_treatment_minutes: 39,
            seed: None,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            with_target: true,
            ansi: true,
        }
    }
}
