//! 分诊对账引擎演示程序
//!
//! 使用进程内的脚本化决策服务，展示登记、对账循环、到达模拟和队列视图

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use triage_core::{
    Assignment, Patient, PatientInput, Result, Severity, Staff, TriageResult,
};
use triage_workflow::{
    ArrivalConfig, ArrivalSimulator, DecisionClient, ReconcileConfig, TriageEngine,
};

/// 按严重程度与到达时间排序，空闲医生依次接诊
struct ScriptedDecisionService;

fn classify(symptoms: &str) -> Severity {
    let symptoms = symptoms.to_lowercase();
    if ["chest pain", "shortness of breath", "head injury"]
        .iter()
        .any(|s| symptoms.contains(s))
    {
        Severity::Critical
    } else if ["fever", "persistent cough", "abdominal pain"]
        .iter()
        .any(|s| symptoms.contains(s))
    {
        Severity::Medium
    } else {
        Severity::Low
    }
}

fn rank(severity: Option<Severity>) -> u8 {
    match severity {
        Some(Severity::Critical) => 0,
        Some(Severity::Medium) => 1,
        Some(Severity::Low) => 2,
        None => 3,
    }
}

#[async_trait]
impl DecisionClient for ScriptedDecisionService {
    async fn fetch_triage(&self, patients: &[Patient], staff: &[Staff]) -> Result<TriageResult> {
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut ordered: Vec<&Patient> = patients.iter().collect();
        ordered.sort_by_key(|p| (rank(p.severity), p.arrival_time));

        let mut doctors = staff.iter().filter(|s| s.available);
        let mut backlog = 0;
        let assignments = ordered
            .iter()
            .map(|patient| match doctors.next() {
                Some(doctor) => Assignment {
                    patient_id: patient.id.clone(),
                    doctor_id: Some(doctor.id.clone()),
                    wait_time_minutes: 0,
                },
                None => {
                    backlog += patient.treatment_duration;
                    Assignment {
                        patient_id: patient.id.clone(),
                        doctor_id: None,
                        wait_time_minutes: backlog,
                    }
                }
            })
            .collect();

        Ok(TriageResult {
            triage_order: ordered.iter().map(|p| p.id.clone()).collect(),
            assignments,
            summary: format!("{} patients triaged across {} staff", patients.len(), staff.len()),
        })
    }

    async fn submit_patient(&self, input: &PatientInput) -> Result<Patient> {
        let symptoms = input.symptoms.clone().unwrap_or_default();
        Ok(Patient {
            id: input.id.clone().unwrap_or_default(),
            name: input.name.clone(),
            severity: Some(classify(&symptoms)),
            symptoms: Some(symptoms),
            arrival_time: input.arrival_time.unwrap_or_else(Utc::now),
            treatment_duration: input.treatment_duration,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    println!("🚑 急诊分诊对账引擎演示\n");

    let engine = Arc::new(TriageEngine::new(
        Arc::new(ScriptedDecisionService),
        ReconcileConfig {
            refresh_interval: Duration::from_secs(2),
            max_in_flight: 4,
        },
    ));

    // 1. 登记医护人员
    engine.register_staff(Staff::new("D1", "Dr. Lee", "general"))?;
    engine.register_staff(Staff::new("D2", "Dr. Patel", "cardiology"))?;
    println!("✅ 医护人员登记完成");

    // 2. 启动对账循环和到达模拟
    let shutdown = CancellationToken::new();
    let reconcile = tokio::spawn(Arc::clone(&engine).run(shutdown.clone()));
    let simulator = ArrivalSimulator::new(ArrivalConfig {
        min_interval: Duration::from_millis(300),
        max_interval: Duration::from_millis(800),
        seed: Some(2024),
        ..Default::default()
    });
    let arrivals = tokio::spawn(simulator.run(Arc::clone(&engine), shutdown.clone()));

    // 3. 人工登记
    engine
        .admit_patient(PatientInput::new("Alice", "chest pain", 30).with_id("P1"))
        .await?;
    engine
        .admit_patient(PatientInput::new("Grace", "sprained ankle", 20).with_id("P2"))
        .await?;
    println!("✅ 人工登记完成");

    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();
    reconcile.await?;
    arrivals.await?;

    // 4. 显示队列视图
    let view = engine.queue_view();
    println!("\n📋 候诊队列 (结果 #{}):", view.sequence);
    for entry in &view.entries {
        println!(
            "   {:<8} {:<10} {:<9} {}",
            entry.patient_id,
            entry.name,
            entry.severity.map(|s| s.to_string()).unwrap_or_default(),
            entry.status
        );
    }

    println!("\n👨‍⚕️ 医护人员:");
    for member in &view.staff {
        println!(
            "   {} ({}): {} / {} min",
            member.name,
            member.specialization,
            member.current_patient_name.as_deref().unwrap_or("None"),
            member.wait_time_minutes
        );
    }

    let stats = engine.stats();
    println!("\n📊 {}", view.summary);
    println!(
        "   签发 {} / 安装 {} / 丢弃 {} / 失败 {}",
        stats.cycles_issued, stats.cycles_installed, stats.cycles_superseded, stats.cycles_failed
    );

    Ok(())
}
