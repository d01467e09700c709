// ==========================================
// Mock 存储实现 - 用于集成测试
// ==========================================
// 能力: 可配置写入延迟（配合 tokio 暂停时间）
//       指定工作表第 N 次写入后注入系统性故障
// ==========================================

use async_trait::async_trait;
use hatchery_import::domain::{canonical_identifier, EntityKind, ImportBatch, NaturalKey};
use hatchery_import::repository::{
    RecordStore, RepositoryError, RepositoryResult, StoredRecord, WriteOutcome,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    next_id: i64,
    entities: HashMap<(EntityKind, String), i64>,
    records: HashMap<NaturalKey, StoredRecord>,
    batches: Vec<ImportBatch>,
    writes_by_sheet: HashMap<String, usize>,
}

/// 内存存储
#[derive(Debug, Default)]
pub struct MockStore {
    state: Mutex<MockState>,
    write_latency: Duration,
    // (工作表名, 成功写入次数上限)
    fail_after: Option<(String, usize)>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每次写入的模拟延迟
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.write_latency = latency;
        self
    }

    /// 指定工作表成功写入 n 行后, 之后的写入返回连接丢失
    pub fn fail_after(mut self, sheet_name: &str, writes: usize) -> Self {
        self.fail_after = Some((sheet_name.to_string(), writes));
        self
    }

    /// 预置实体
    pub fn with_entity(self, kind: EntityKind, key: &str) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = state.next_id;
            state.entities.insert((kind, canonical_identifier(key)), id);
        }
        self
    }

    pub fn record_count(&self) -> usize {
        self.state.lock().unwrap().records.len()
    }

    pub fn entity_count(&self, kind: EntityKind) -> usize {
        self.state
            .lock()
            .unwrap()
            .entities
            .keys()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    pub fn batches(&self) -> Vec<ImportBatch> {
        self.state.lock().unwrap().batches.clone()
    }

    pub fn record(&self, key: &NaturalKey) -> Option<StoredRecord> {
        self.state.lock().unwrap().records.get(key).cloned()
    }
}

#[async_trait]
impl RecordStore for MockStore {
    async fn find_entity(&self, kind: EntityKind, key: &str) -> RepositoryResult<Option<i64>> {
        let state = self.state.lock().unwrap();
        Ok(state.entities.get(&(kind, key.to_string())).copied())
    }

    async fn create_entity(&self, kind: EntityKind, key: &str) -> RepositoryResult<i64> {
        let mut state = self.state.lock().unwrap();
        if let Some(id) = state.entities.get(&(kind, key.to_string())) {
            return Ok(*id);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.entities.insert((kind, key.to_string()), id);
        Ok(id)
    }

    async fn list_entity_keys(&self, kind: EntityKind) -> RepositoryResult<Vec<String>> {
        let state = self.state.lock().unwrap();
        let mut keys: Vec<String> = state
            .entities
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn record_exists(&self, key: &NaturalKey) -> RepositoryResult<bool> {
        Ok(self.state.lock().unwrap().records.contains_key(key))
    }

    async fn upsert_record(&self, record: &StoredRecord) -> RepositoryResult<WriteOutcome> {
        if !self.write_latency.is_zero() {
            tokio::time::sleep(self.write_latency).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some((sheet, limit)) = &self.fail_after {
            let written = state.writes_by_sheet.get(sheet).copied().unwrap_or(0);
            if *sheet == record.source_sheet && written >= *limit {
                return Err(RepositoryError::DatabaseConnectionError(
                    "connection reset by peer".to_string(),
                ));
            }
        }

        *state
            .writes_by_sheet
            .entry(record.source_sheet.clone())
            .or_insert(0) += 1;

        let outcome = match state
            .records
            .insert(record.natural_key.clone(), record.clone())
        {
            Some(_) => WriteOutcome::Replaced,
            None => WriteOutcome::Inserted,
        };
        Ok(outcome)
    }

    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        self.state.lock().unwrap().batches.push(batch.clone());
        Ok(())
    }
}
