//! 分诊决策服务接口
//!
//! 引擎只通过该接口与外部决策服务交互；具体的传输实现由集成模块提供。

use async_trait::async_trait;
use triage_core::{Patient, PatientInput, Result, Staff, TriageResult};

/// 决策客户端接口
#[async_trait]
pub trait DecisionClient: Send + Sync {
    /// 发送快照并取回原始决策结果
    ///
    /// 传输失败或非2xx返回 `DecisionUnavailable`，无法解码返回 `DecisionMalformed`。
    async fn fetch_triage(&self, patients: &[Patient], staff: &[Staff]) -> Result<TriageResult>;

    /// 请求分诊决策，结果必须只引用提交的患者和医护人员
    async fn request_triage(&self, patients: &[Patient], staff: &[Staff]) -> Result<TriageResult> {
        let result = self.fetch_triage(patients, staff).await?;
        result.validate_against(patients, staff)?;
        Ok(result)
    }

    /// 提交新患者，返回服务端的规范记录
    ///
    /// 失败时返回 `IntakeRejected`。
    async fn submit_patient(&self, input: &PatientInput) -> Result<Patient>;

    /// 客户端名称
    fn name(&self) -> &str;
}
