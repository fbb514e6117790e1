//! 分诊对账引擎
//!
//! 持有患者/医护存储和队列看板，把登记、定时刷新与决策服务结果协调成一致的队列视图。

use crate::{
    decision::DecisionClient,
    queue_view::{project, InstallOutcome, QueueBoard, QueueView},
    store::{PatientStore, StaffStore},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use triage_core::{
    utils::generate_patient_id, Patient, PatientInput, Result, Staff, TriageError,
};

/// 对账配置
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    /// 定时刷新间隔
    pub refresh_interval: Duration,
    /// 同时进行中的决策请求上限
    pub max_in_flight: usize,
}

/// 定时刷新间隔下限
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(30),
            max_in_flight: 4,
        }
    }
}

/// 对账触发来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CycleTrigger {
    Timer,  // 定时
    Change, // 存储变更
    Manual, // 手动
}

/// 已签发、尚未完成的对账周期
#[derive(Debug, Clone)]
pub struct PendingCycle {
    pub sequence: u64,
    pub trigger: CycleTrigger,
    patients: Vec<Patient>,
    staff: Vec<Staff>,
}

impl PendingCycle {
    pub fn patients(&self) -> &[Patient] {
        &self.patients
    }

    pub fn staff(&self) -> &[Staff] {
        &self.staff
    }
}

/// 对账周期结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Installed { sequence: u64 },
    Superseded { sequence: u64, installed: u64 },
}

/// 引擎统计
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineStats {
    pub patients: usize,
    pub staff: usize,
    pub cycles_issued: u64,
    pub cycles_installed: u64,
    pub cycles_superseded: u64,
    pub cycles_failed: u64,
    pub installed_sequence: u64,
    pub in_flight: usize,
}

#[derive(Debug, Default)]
struct CycleCounters {
    installed: AtomicU64,
    superseded: AtomicU64,
    failed: AtomicU64,
}

/// 分诊对账引擎
pub struct TriageEngine {
    patients: PatientStore,
    staff: StaffStore,
    board: QueueBoard,
    client: Arc<dyn DecisionClient>,
    config: ReconcileConfig,
    changes: Notify,
    last_sequence: Mutex<u64>, // 快照与签发序号在同一临界区内分配
    in_flight: Arc<Semaphore>,
    refresh_deferred: AtomicBool, // 请求已满时被推迟的触发
    intake_reserved: Mutex<HashSet<String>>,
    counters: CycleCounters,
}

/// 登记进行中的患者ID占位，离开作用域时释放
struct IntakeReservation<'a> {
    reserved: &'a Mutex<HashSet<String>>,
    patient_id: String,
}

impl Drop for IntakeReservation<'_> {
    fn drop(&mut self) {
        self.reserved.lock().remove(&self.patient_id);
    }
}

impl TriageEngine {
    /// 创建新的分诊引擎
    ///
    /// `max_in_flight` 至少为 1，`refresh_interval` 不小于 [`MIN_REFRESH_INTERVAL`]。
    pub fn new(client: Arc<dyn DecisionClient>, mut config: ReconcileConfig) -> Self {
        config.max_in_flight = config.max_in_flight.max(1);
        config.refresh_interval = config.refresh_interval.max(MIN_REFRESH_INTERVAL);
        let permits = config.max_in_flight;
        Self {
            patients: PatientStore::new(),
            staff: StaffStore::new(),
            board: QueueBoard::new(),
            client,
            config,
            changes: Notify::new(),
            last_sequence: Mutex::new(0),
            in_flight: Arc::new(Semaphore::new(permits)),
            refresh_deferred: AtomicBool::new(false),
            intake_reserved: Mutex::new(HashSet::new()),
            counters: CycleCounters::default(),
        }
    }

    /// 登记新患者
    ///
    /// 经决策服务确认后才写入患者存储；任何失败都不会留下部分记录。
    /// 同一ID的登记在确认期间被占位，并发的重复登记不会到达决策服务。
    pub async fn admit_patient(&self, mut input: PatientInput) -> Result<Patient> {
        input.validate()?;

        let patient_id = input.id.get_or_insert_with(generate_patient_id).clone();
        let _reservation = self.reserve_intake(&patient_id)?;
        input.arrival_time.get_or_insert_with(Utc::now);

        let patient = match self.client.submit_patient(&input).await {
            Ok(patient) => patient,
            Err(e) => {
                tracing::warn!("Intake of patient {} rejected: {}", patient_id, e);
                return Err(e);
            }
        };

        if patient.id != patient_id {
            tracing::warn!(
                "Intake service answered patient {} with record {}",
                patient_id,
                patient.id
            );
            return Err(TriageError::IntakeRejected(format!(
                "intake service returned id {} for patient {}",
                patient.id, patient_id
            )));
        }

        self.patients.add(patient.clone())?;
        tracing::info!(
            "Admitted patient {} ({}) with severity {:?}",
            patient.id,
            patient.name,
            patient.severity
        );

        self.changes.notify_one();
        Ok(patient)
    }

    fn reserve_intake(&self, patient_id: &str) -> Result<IntakeReservation<'_>> {
        let mut reserved = self.intake_reserved.lock();
        if self.patients.contains(patient_id) || reserved.contains(patient_id) {
            return Err(TriageError::DuplicateId(format!("patient {}", patient_id)));
        }
        reserved.insert(patient_id.to_string());

        Ok(IntakeReservation {
            reserved: &self.intake_reserved,
            patient_id: patient_id.to_string(),
        })
    }

    /// 登记医护人员
    pub fn register_staff(&self, staff: Staff) -> Result<()> {
        let staff_id = staff.id.clone();
        self.staff.add(staff)?;
        tracing::info!("Registered staff member {}", staff_id);

        self.changes.notify_one();
        Ok(())
    }

    /// 请求一次额外的对账
    pub fn request_refresh(&self) {
        tracing::debug!("Manual triage refresh requested");
        self.changes.notify_one();
    }

    /// 签发对账周期：取快照并分配签发序号
    pub fn begin_cycle(&self, trigger: CycleTrigger) -> PendingCycle {
        let mut last_sequence = self.last_sequence.lock();
        *last_sequence += 1;

        let pending = PendingCycle {
            sequence: *last_sequence,
            trigger,
            patients: self.patients.snapshot(),
            staff: self.staff.snapshot(),
        };

        tracing::debug!(
            "Issued triage cycle {} ({:?}) with {} patients and {} staff",
            pending.sequence,
            trigger,
            pending.patients.len(),
            pending.staff.len()
        );
        pending
    }

    /// 完成对账周期：请求决策并按签发序号安装结果
    ///
    /// 失败时看板保持不变。
    pub async fn complete_cycle(&self, pending: PendingCycle) -> Result<CycleOutcome> {
        let PendingCycle {
            sequence,
            trigger,
            patients,
            staff,
        } = pending;

        let result = match self.client.request_triage(&patients, &staff).await {
            Ok(result) => result,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    "Triage cycle {} ({:?}) failed, keeping previous queue view: {}",
                    sequence,
                    trigger,
                    e
                );
                return Err(e);
            }
        };

        match self.board.install(sequence, result) {
            InstallOutcome::Installed { previous } => {
                self.counters.installed.fetch_add(1, Ordering::Relaxed);
                tracing::info!("Installed triage result {} (replacing {})", sequence, previous);
                Ok(CycleOutcome::Installed { sequence })
            }
            InstallOutcome::Superseded { installed } => {
                self.counters.superseded.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    "Discarded triage result {}: result {} already installed",
                    sequence,
                    installed
                );
                Ok(CycleOutcome::Superseded { sequence, installed })
            }
        }
    }

    /// 执行一次完整的对账周期
    pub async fn run_cycle(&self, trigger: CycleTrigger) -> Result<CycleOutcome> {
        let pending = self.begin_cycle(trigger);
        self.complete_cycle(pending).await
    }

    /// 对账循环：定时触发与变更触发，直到收到关闭信号
    ///
    /// 每次触发都在独立任务中完成，慢请求不会阻塞后续触发。
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        tracing::info!(
            "Starting reconciliation loop (refresh every {:?}, {} in flight max)",
            self.config.refresh_interval,
            self.config.max_in_flight
        );

        let mut ticker = tokio::time::interval(self.config.refresh_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Reconciliation loop shutdown requested");
                    break;
                }
                _ = ticker.tick() => self.spawn_cycle(CycleTrigger::Timer),
                _ = self.changes.notified() => self.spawn_cycle(CycleTrigger::Change),
            }
        }
    }

    fn spawn_cycle(self: &Arc<Self>, trigger: CycleTrigger) {
        let permit = match Arc::clone(&self.in_flight).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::warn!(
                    "Deferring {:?} triage cycle: {} requests already in flight",
                    trigger,
                    self.config.max_in_flight
                );
                self.refresh_deferred.store(true, Ordering::SeqCst);
                // 置位前已有请求结束时由本循环自行补发
                if self.in_flight.available_permits() > 0 {
                    self.changes.notify_one();
                }
                return;
            }
        };

        // 本次快照覆盖此前推迟的所有变更
        self.refresh_deferred.store(false, Ordering::SeqCst);
        let pending = self.begin_cycle(trigger);
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            // 失败已在 complete_cycle 中记录，下一次触发会重试
            let _ = engine.complete_cycle(pending).await;
            drop(permit);

            if engine.refresh_deferred.swap(false, Ordering::SeqCst) {
                tracing::debug!("Replaying deferred triage trigger");
                engine.changes.notify_one();
            }
        });
    }

    /// 当前队列视图
    pub fn queue_view(&self) -> QueueView {
        let installed = self.board.current();
        project(
            &self.patients.snapshot(),
            &self.staff.snapshot(),
            installed.as_ref(),
        )
    }

    /// 获取引擎统计
    pub fn stats(&self) -> EngineStats {
        let permits = self.config.max_in_flight;
        EngineStats {
            patients: self.patients.len(),
            staff: self.staff.len(),
            cycles_issued: *self.last_sequence.lock(),
            cycles_installed: self.counters.installed.load(Ordering::Relaxed),
            cycles_superseded: self.counters.superseded.load(Ordering::Relaxed),
            cycles_failed: self.counters.failed.load(Ordering::Relaxed),
            installed_sequence: self.board.installed_sequence(),
            in_flight: permits.saturating_sub(self.in_flight.available_permits()),
        }
    }

    pub fn patient(&self, id: &str) -> Option<Patient> {
        self.patients.get(id)
    }

    pub fn staff_member(&self, id: &str) -> Option<Staff> {
        self.staff.get(id)
    }

    pub fn patient_count(&self) -> usize {
        self.patients.len()
    }

    pub fn client_name(&self) -> &str {
        self.client.name()
    }
}

impl std::fmt::Debug for TriageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriageEngine")
            .field("client", &self.client.name())
            .field("config", &self.config)
            .field("patients", &self.patients.len())
            .field("staff", &self.staff.len())
            .finish()
    }
}
