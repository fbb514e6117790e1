//! 候诊队列视图
//!
//! 视图由患者存储、医护存储和最新有效的分诊结果推导而来，从不直接修改。
//! `QueueBoard` 只保存最新有效结果及其签发序号。

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use triage_core::{Patient, Severity, Staff, TriageResult};

/// 患者状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PatientStatus {
    #[serde(rename = "Waiting")]
    Waiting,
    #[serde(rename = "In Treatment")]
    InTreatment,
}

impl fmt::Display for PatientStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("Waiting"),
            Self::InTreatment => f.write_str("In Treatment"),
        }
    }
}

/// 队列条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub patient_id: String,
    pub name: String,
    pub severity: Option<Severity>,
    pub status: PatientStatus,
    pub doctor_id: Option<String>,
    pub wait_time_minutes: Option<u32>,
    /// 最新结果尚未给该患者排序
    pub pending: bool,
}

/// 医护人员看板条目
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StaffBoardEntry {
    pub staff_id: String,
    pub name: String,
    pub specialization: String,
    pub available: bool,
    pub current_patient_id: Option<String>,
    pub current_patient_name: Option<String>,
    pub wait_time_minutes: u32,
}

/// 队列视图
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueView {
    /// 生成该视图的结果签发序号，0 表示尚无有效结果
    pub sequence: u64,
    pub entries: Vec<QueueEntry>,
    pub staff: Vec<StaffBoardEntry>,
    pub summary: String,
}

impl QueueView {
    pub fn entry(&self, patient_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.patient_id == patient_id)
    }

    pub fn staff_entry(&self, staff_id: &str) -> Option<&StaffBoardEntry> {
        self.staff.iter().find(|s| s.staff_id == staff_id)
    }

    pub fn waiting_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == PatientStatus::Waiting)
            .count()
    }
}

/// 已安装的分诊结果
#[derive(Debug, Clone)]
pub struct InstalledResult {
    pub sequence: u64,
    pub result: Arc<TriageResult>,
}

/// 安装结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// 已替换为新结果
    Installed { previous: u64 },
    /// 已有更新签发的结果，丢弃
    Superseded { installed: u64 },
}

/// 最新有效分诊结果的持有者
#[derive(Debug, Default)]
pub struct QueueBoard {
    installed: RwLock<Option<InstalledResult>>,
}

impl QueueBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 整体替换结果；签发序号不大于当前已安装序号时丢弃
    pub fn install(&self, sequence: u64, result: TriageResult) -> InstallOutcome {
        let mut installed = self.installed.write();
        let previous = installed.as_ref().map(|i| i.sequence).unwrap_or(0);

        if sequence <= previous {
            return InstallOutcome::Superseded { installed: previous };
        }

        *installed = Some(InstalledResult {
            sequence,
            result: Arc::new(result),
        });
        InstallOutcome::Installed { previous }
    }

    pub fn current(&self) -> Option<InstalledResult> {
        self.installed.read().clone()
    }

    pub fn installed_sequence(&self) -> u64 {
        self.installed.read().as_ref().map(|i| i.sequence).unwrap_or(0)
    }
}

/// 由存储内容和已安装结果推导队列视图
///
/// 纯函数：相同输入总是得到相同输出。结果中引用的未知患者被跳过；结果未覆盖的
/// 已知患者按到达顺序追加在末尾，状态为等待且不显示严重程度。
pub fn project(patients: &[Patient], staff: &[Staff], installed: Option<&InstalledResult>) -> QueueView {
    let by_id: HashMap<&str, &Patient> = patients.iter().map(|p| (p.id.as_str(), p)).collect();
    let empty = TriageResult::default();
    let result = installed.map(|i| i.result.as_ref()).unwrap_or(&empty);

    let mut entries = Vec::with_capacity(patients.len());
    let mut ranked: HashSet<&str> = HashSet::new();

    for patient_id in &result.triage_order {
        let Some(&patient) = by_id.get(patient_id.as_str()) else {
            continue;
        };
        if !ranked.insert(patient.id.as_str()) {
            continue;
        }

        let assignment = result.assignment_for(&patient.id);
        let doctor_id = assignment.and_then(|a| a.doctor_id.clone());
        let status = if doctor_id.is_some() {
            PatientStatus::InTreatment
        } else {
            PatientStatus::Waiting
        };

        entries.push(QueueEntry {
            patient_id: patient.id.clone(),
            name: patient.name.clone(),
            severity: patient.severity,
            status,
            doctor_id,
            wait_time_minutes: assignment.map(|a| a.wait_time_minutes),
            pending: false,
        });
    }

    let mut unranked: Vec<&Patient> = patients
        .iter()
        .filter(|p| !ranked.contains(p.id.as_str()))
        .collect();
    unranked.sort_by_key(|p| p.arrival_time);

    entries.extend(unranked.into_iter().map(|patient| QueueEntry {
        patient_id: patient.id.clone(),
        name: patient.name.clone(),
        severity: None,
        status: PatientStatus::Waiting,
        doctor_id: None,
        wait_time_minutes: None,
        pending: true,
    }));

    let staff = staff
        .iter()
        .map(|member| {
            let current = result
                .assignment_of_doctor(&member.id)
                .and_then(|a| by_id.get(a.patient_id.as_str()).map(|p| (a, *p)));

            StaffBoardEntry {
                staff_id: member.id.clone(),
                name: member.name.clone(),
                specialization: member.specialization.clone(),
                available: member.available,
                current_patient_id: current.map(|(_, p)| p.id.clone()),
                current_patient_name: current.map(|(_, p)| p.name.clone()),
                wait_time_minutes: current.map(|(a, _)| a.wait_time_minutes).unwrap_or(0),
            }
        })
        .collect();

    QueueView {
        sequence: installed.map(|i| i.sequence).unwrap_or(0),
        entries,
        staff,
        summary: result.summary.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use triage_core::Assignment;

    fn patient(id: &str, name: &str, severity: Option<Severity>, minute: i64) -> Patient {
        Patient {
            id: id.to_string(),
            name: name.to_string(),
            symptoms: None,
            severity,
            arrival_time: Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap() + Duration::minutes(minute),
            treatment_duration: 30,
        }
    }

    fn installed(sequence: u64, result: TriageResult) -> InstalledResult {
        InstalledResult {
            sequence,
            result: Arc::new(result),
        }
    }

    fn scenario() -> (Vec<Patient>, Vec<Staff>, InstalledResult) {
        let patients = vec![
            patient("P1", "Alice", Some(Severity::Critical), 0),
            patient("P2", "Bob", Some(Severity::Medium), 5),
        ];
        let staff = vec![Staff::new("D1", "Dr. Lee", "general")];
        let result = TriageResult {
            triage_order: vec!["P1".to_string(), "P2".to_string()],
            assignments: vec![Assignment {
                patient_id: "P1".to_string(),
                doctor_id: Some("D1".to_string()),
                wait_time_minutes: 5,
            }],
            summary: "Alice is being treated by Dr. Lee".to_string(),
        };
        (patients, staff, installed(1, result))
    }

    #[test]
    fn test_treatment_and_waiting_status() {
        let (patients, staff, result) = scenario();
        let view = project(&patients, &staff, Some(&result));

        assert_eq!(view.entries.len(), 2);
        assert_eq!(view.entries[0].patient_id, "P1");
        assert_eq!(view.entries[0].status, PatientStatus::InTreatment);
        assert_eq!(view.entries[1].patient_id, "P2");
        assert_eq!(view.entries[1].status, PatientStatus::Waiting);

        let lee = view.staff_entry("D1").unwrap();
        assert_eq!(lee.current_patient_id.as_deref(), Some("P1"));
        assert_eq!(lee.current_patient_name.as_deref(), Some("Alice"));
        assert_eq!(lee.wait_time_minutes, 5);
        assert_eq!(view.summary, "Alice is being treated by Dr. Lee");
    }

    #[test]
    fn test_projection_is_deterministic() {
        let (patients, staff, result) = scenario();
        let first = serde_json::to_vec(&project(&patients, &staff, Some(&result))).unwrap();
        let second = serde_json::to_vec(&project(&patients, &staff, Some(&result))).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let (patients, staff, _) = scenario();
        let result = installed(
            2,
            TriageResult {
                triage_order: vec!["P9".to_string(), "P2".to_string(), "P1".to_string()],
                assignments: vec![Assignment {
                    patient_id: "P9".to_string(),
                    doctor_id: Some("D1".to_string()),
                    wait_time_minutes: 12,
                }],
                summary: String::new(),
            },
        );

        let view = project(&patients, &staff, Some(&result));
        let ids: Vec<&str> = view.entries.iter().map(|e| e.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P1"]);

        let lee = view.staff_entry("D1").unwrap();
        assert!(lee.current_patient_id.is_none());
        assert_eq!(lee.wait_time_minutes, 0);
    }

    #[test]
    fn test_unranked_patients_appended_in_arrival_order() {
        let (mut patients, staff, result) = scenario();
        patients.push(patient("P4", "Dave", Some(Severity::Low), 20));
        patients.push(patient("P3", "Carol", Some(Severity::Critical), 10));

        let view = project(&patients, &staff, Some(&result));
        let ids: Vec<&str> = view.entries.iter().map(|e| e.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3", "P4"]);

        let carol = view.entry("P3").unwrap();
        assert!(carol.pending);
        assert_eq!(carol.status, PatientStatus::Waiting);
        assert!(carol.severity.is_none());
    }

    #[test]
    fn test_doctor_queue_shows_first_assignment() {
        let (patients, staff, _) = scenario();
        let result = installed(
            1,
            TriageResult {
                triage_order: vec!["P1".to_string(), "P2".to_string()],
                assignments: vec![
                    Assignment {
                        patient_id: "P1".to_string(),
                        doctor_id: Some("D1".to_string()),
                        wait_time_minutes: 0,
                    },
                    Assignment {
                        patient_id: "P2".to_string(),
                        doctor_id: Some("D1".to_string()),
                        wait_time_minutes: 30,
                    },
                ],
                summary: String::new(),
            },
        );

        let view = project(&patients, &staff, Some(&result));
        assert_eq!(view.entry("P2").unwrap().wait_time_minutes, Some(30));
        let lee = view.staff_entry("D1").unwrap();
        assert_eq!(lee.current_patient_id.as_deref(), Some("P1"));
        assert_eq!(lee.wait_time_minutes, 0);
    }

    #[test]
    fn test_no_result_yet() {
        let (patients, staff, _) = scenario();
        let view = project(&patients, &staff, None);

        assert_eq!(view.sequence, 0);
        assert_eq!(view.entries.len(), 2);
        assert!(view.entries.iter().all(|e| e.pending));
        assert_eq!(view.staff_entry("D1").unwrap().wait_time_minutes, 0);
        assert!(view.summary.is_empty());
    }

    #[test]
    fn test_repeated_order_entry_emitted_once() {
        let (patients, staff, _) = scenario();
        let result = installed(
            1,
            TriageResult {
                triage_order: vec!["P2".to_string(), "P2".to_string()],
                ..Default::default()
            },
        );
        let view = project(&patients, &staff, Some(&result));
        let ids: Vec<&str> = view.entries.iter().map(|e| e.patient_id.as_str()).collect();
        assert_eq!(ids, vec!["P2", "P1"]);
    }

    #[test]
    fn test_board_discards_older_sequence() {
        let board = QueueBoard::new();
        let newer = TriageResult {
            summary: "second".to_string(),
            ..Default::default()
        };
        let older = TriageResult {
            summary: "first".to_string(),
            ..Default::default()
        };

        assert_eq!(board.install(2, newer), InstallOutcome::Installed { previous: 0 });
        assert_eq!(board.install(1, older), InstallOutcome::Superseded { installed: 2 });
        assert_eq!(board.installed_sequence(), 2);
        assert_eq!(board.current().unwrap().result.summary, "second");
    }

    #[test]
    fn test_status_wire_format() {
        assert_eq!(
            serde_json::to_string(&PatientStatus::InTreatment).unwrap(),
            "\"In Treatment\""
        );
        assert_eq!(PatientStatus::Waiting.to_string(), "Waiting");
    }
}
