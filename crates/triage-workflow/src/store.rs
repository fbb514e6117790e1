//! 患者与医护人员存储
//!
//! 只追加的权威记录集合：ID唯一，按插入顺序保存。所有操作都在一个短暂的
//! 锁窗口内完成，不会挂起。

use parking_lot::RwLock;
use std::collections::HashMap;
use triage_core::{Patient, Result, Staff, TriageError};

/// 可存储的记录
pub trait Record: Clone + Send + Sync + 'static {
    /// 记录类别，用于错误信息和日志
    const KIND: &'static str;

    fn id(&self) -> &str;
}

impl Record for Patient {
    const KIND: &'static str = "patient";

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for Staff {
    const KIND: &'static str = "staff";

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug)]
struct StoreInner<T> {
    records: Vec<T>,
    index: HashMap<String, usize>, // id -> records 下标
}

/// 记录存储
#[derive(Debug)]
pub struct RecordStore<T: Record> {
    inner: RwLock<StoreInner<T>>,
}

/// 患者存储
pub type PatientStore = RecordStore<Patient>;

/// 医护人员存储
pub type StaffStore = RecordStore<Staff>;

impl<T: Record> RecordStore<T> {
    /// 创建空存储
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(StoreInner {
                records: Vec::new(),
                index: HashMap::new(),
            }),
        }
    }

    /// 插入新记录，ID已存在时返回 `DuplicateId` 且不覆盖原记录
    pub fn add(&self, record: T) -> Result<()> {
        let mut inner = self.inner.write();

        if inner.index.contains_key(record.id()) {
            return Err(TriageError::DuplicateId(format!("{} {}", T::KIND, record.id())));
        }

        let position = inner.records.len();
        inner.index.insert(record.id().to_string(), position);
        inner.records.push(record);
        Ok(())
    }

    /// 按ID获取记录副本
    pub fn get(&self, id: &str) -> Option<T> {
        let inner = self.inner.read();
        inner.index.get(id).map(|&pos| inner.records[pos].clone())
    }

    /// 时间点快照，按插入顺序
    pub fn snapshot(&self) -> Vec<T> {
        self.inner.read().records.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.read().index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Record> Default for RecordStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
