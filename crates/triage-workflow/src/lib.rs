//! # 分诊工作流模块
//!
//! 维护急诊候诊队列的核心引擎，包括：
//! - 患者/医护存储：只追加、ID唯一、快照隔离
//! - 决策客户端接口：把快照提交给外部分诊决策服务
//! - 对账循环：变更触发与定时触发，按签发序号应用结果
//! - 队列视图：由存储和最新有效结果纯函数推导
//! - 到达模拟：随机生成患者并走正常登记流程

pub mod arrivals;
pub mod decision;
pub mod engine;
pub mod queue_view;
pub mod store;

// 重新导出主要类型
pub use arrivals::{ArrivalConfig, ArrivalSimulator};
pub use decision::DecisionClient;
pub use engine::{
    CycleOutcome, CycleTrigger, EngineStats, PendingCycle, ReconcileConfig, TriageEngine,
    MIN_REFRESH_INTERVAL,
};
pub use queue_view::{
    project, InstallOutcome, InstalledResult, PatientStatus, QueueBoard, QueueEntry, QueueView, StaffBoardEntry,
};
pub use store::{PatientStore, Record, RecordStore, StaffStore};
