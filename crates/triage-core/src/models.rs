//! 核心数据模型定义

use crate::error::{Result, TriageError};
use crate::utils::{flexible_timestamp, is_valid_record_id};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// 病情严重程度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical, // 危重
    Medium,   // 中等
    Low,      // 轻微
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 患者记录
///
/// `severity` 只由决策服务赋值；登记时客户端提供的严重程度仅作参考。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(with = "flexible_timestamp")]
    pub arrival_time: DateTime<Utc>,
    pub treatment_duration: u32, // 分钟
}

/// 患者登记输入
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symptoms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<DateTime<Utc>>,
    pub treatment_duration: u32,
}

impl PatientInput {
    pub fn new(name: impl Into<String>, symptoms: impl Into<String>, treatment_duration: u32) -> Self {
        Self {
            id: None,
            name: name.into(),
            symptoms: Some(symptoms.into()),
            severity: None,
            arrival_time: None,
            treatment_duration,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// 校验登记输入
    pub fn validate(&self) -> Result<()> {
        if let Some(id) = &self.id {
            if !is_valid_record_id(id) {
                return Err(TriageError::IntakeRejected(format!("invalid patient id: {:?}", id)));
            }
        }

        if self.name.trim().is_empty() {
            return Err(TriageError::IntakeRejected("patient name is empty".to_string()));
        }

        if self.treatment_duration == 0 {
            return Err(TriageError::IntakeRejected(
                "treatment_duration must be positive".to_string(),
            ));
        }

        let has_symptoms = self
            .symptoms
            .as_deref()
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false);
        if !has_symptoms && self.severity.is_none() {
            return Err(TriageError::IntakeRejected(
                "either symptoms or severity is required".to_string(),
            ));
        }

        Ok(())
    }
}

/// 医护人员
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Staff {
    pub id: String,
    pub name: String,
    pub specialization: String,
    pub available: bool,
}

impl Staff {
    pub fn new(id: impl Into<String>, name: impl Into<String>, specialization: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            specialization: specialization.into(),
            available: true,
        }
    }
}

/// 分配结果（派生数据，不存储）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub patient_id: String,
    pub doctor_id: Option<String>, // None 表示仍在等待
    pub wait_time_minutes: u32,
}

impl Assignment {
    pub fn is_assigned(&self) -> bool {
        self.doctor_id.is_some()
    }
}

/// 一次分诊决策的完整结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct TriageResult {
    pub triage_order: Vec<String>,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
    #[serde(default)]
    pub summary: String,
}

impl TriageResult {
    /// 查找患者的分配
    pub fn assignment_for(&self, patient_id: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.patient_id == patient_id)
    }

    /// 查找医生当前负责的分配
    ///
    /// 同一医生可排有多名患者，按分配顺序取第一个。
    pub fn assignment_of_doctor(&self, doctor_id: &str) -> Option<&Assignment> {
        self.assignments
            .iter()
            .find(|a| a.doctor_id.as_deref() == Some(doctor_id))
    }

    /// 校验结果只引用提交快照中的患者和医护人员
    pub fn validate_against(&self, patients: &[Patient], staff: &[Staff]) -> Result<()> {
        let patient_ids: HashSet<&str> = patients.iter().map(|p| p.id.as_str()).collect();
        let staff_ids: HashSet<&str> = staff.iter().map(|s| s.id.as_str()).collect();

        let mut ordered = HashSet::new();
        for id in &self.triage_order {
            if !patient_ids.contains(id.as_str()) {
                return Err(TriageError::DecisionMalformed(format!(
                    "triage_order references unknown patient {}",
                    id
                )));
            }
            if !ordered.insert(id.as_str()) {
                return Err(TriageError::DecisionMalformed(format!(
                    "patient {} appears twice in triage_order",
                    id
                )));
            }
        }

        let mut assigned_patients = HashSet::new();
        for assignment in &self.assignments {
            if !patient_ids.contains(assignment.patient_id.as_str()) {
                return Err(TriageError::DecisionMalformed(format!(
                    "assignment references unknown patient {}",
                    assignment.patient_id
                )));
            }
            if !assigned_patients.insert(assignment.patient_id.as_str()) {
                return Err(TriageError::DecisionMalformed(format!(
                    "patient {} has more than one assignment",
                    assignment.patient_id
                )));
            }
            if let Some(doctor_id) = assignment.doctor_id.as_deref() {
                if !staff_ids.contains(doctor_id) {
                    return Err(TriageError::DecisionMalformed(format!(
                        "assignment references unknown staff {}",
                        doctor_id
                    )));
                }
            }
        }

        Ok(())
    }
}
