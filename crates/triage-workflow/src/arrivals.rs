//! 患者到达模拟
//!
//! 按随机间隔生成患者，并通过与人工登记相同的流程提交。

use crate::engine::TriageEngine;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use triage_core::PatientInput;

const NAMES: [&str; 5] = ["Bob", "Carol", "Dave", "Eve", "Frank"];

const PRESENTATIONS: [&str; 9] = [
    "chest pain",
    "shortness of breath",
    "head injury",
    "fever",
    "persistent cough",
    "abdominal pain",
    "sprained ankle",
    "minor laceration",
    "mild headache",
];

/// 到达模拟配置
#[derive(Debug, Clone)]
pub struct ArrivalConfig {
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// 治疗时长下限（分钟，含）
    pub min_treatment_minutes: u32,
    /// 治疗时长上限（分钟，含）
    pub max_treatment_minutes: u32,
    /// 固定种子，便于复现
    pub seed: Option<u64>,
}

impl Default for ArrivalConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(60),
            max_interval: Duration::from_secs(120),
            min_treatment_minutes: 20,
            max_treatment_minutes: 39,
            seed: None,
        }
    }
}

/// 到达模拟器
#[derive(Debug)]
pub struct ArrivalSimulator {
    config: ArrivalConfig,
    rng: StdRng,
    generated: u64,
}

impl ArrivalSimulator {
    pub fn new(config: ArrivalConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng,
            generated: 0,
        }
    }

    /// 生成一位模拟患者（不带ID和严重程度）
    pub fn next_patient(&mut self) -> PatientInput {
        let name = NAMES[self.rng.gen_range(0..NAMES.len())];

        let first = self.rng.gen_range(0..PRESENTATIONS.len());
        let symptoms = if self.rng.gen_bool(0.3) {
            let second = self.rng.gen_range(0..PRESENTATIONS.len());
            if second == first {
                PRESENTATIONS[first].to_string()
            } else {
                format!("{}, {}", PRESENTATIONS[first], PRESENTATIONS[second])
            }
        } else {
            PRESENTATIONS[first].to_string()
        };

        let low = self.config.min_treatment_minutes.max(1);
        let high = self.config.max_treatment_minutes.max(low);
        let treatment_duration = self.rng.gen_range(low..=high);

        self.generated += 1;
        PatientInput::new(name, symptoms, treatment_duration)
    }

    /// 下一次到达前的等待时间
    pub fn next_delay(&mut self) -> Duration {
        let low = self.config.min_interval;
        let high = self.config.max_interval.max(low);
        if low == high {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    pub fn generated(&self) -> u64 {
        self.generated
    }

    /// 持续生成到达患者，直到收到关闭信号
    pub async fn run(mut self, engine: Arc<TriageEngine>, shutdown: CancellationToken) {
        tracing::info!(
            "Starting arrival simulation every {:?}..{:?}",
            self.config.min_interval,
            self.config.max_interval
        );

        loop {
            let delay = self.next_delay();
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Arrival simulation stopped after {} arrivals", self.generated);
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            let input = self.next_patient();
            match engine.admit_patient(input).await {
                Ok(patient) => {
                    tracing::info!("Simulated arrival {} ({})", patient.id, patient.name);
                }
                Err(e) => {
                    tracing::warn!("Simulated arrival dropped: {}", e);
                }
            }
        }
    }
}
