// ==========================================
// 孵化场批量导入 - 生产记录存储 Trait
// ==========================================
// 职责: 定义导入所需的数据访问接口（不包含实现）
// 红线: Repository 不含业务规则, 只做查找/创建/写入
// 实现者: SqliteRecordStore（rusqlite）, 测试中的 Mock 存储
// ==========================================

use crate::domain::{EntityKind, ImportBatch, NaturalKey, RecordPayload};
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;

/// 待写入的记录（载荷 + 溯源信息）
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub natural_key: NaturalKey,
    pub payload: RecordPayload,
    pub entity_ids: Vec<(EntityKind, i64)>,
    pub source_sheet: String,
    pub source_row: usize,
    pub batch_id: String,
}

/// 写入结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Inserted,
    Replaced,
}

// ==========================================
// RecordStore Trait
// ==========================================
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ===== 实体解析 =====

    /// 按自然键查找实体
    ///
    /// # 返回
    /// - Ok(Some(id)): 实体存在
    /// - Ok(None): 实体不存在
    async fn find_entity(&self, kind: EntityKind, key: &str) -> RepositoryResult<Option<i64>>;

    /// 创建实体（已存在时返回已有 id）
    async fn create_entity(&self, kind: EntityKind, key: &str) -> RepositoryResult<i64>;

    /// 列出某类实体的全部自然键（升序）
    async fn list_entity_keys(&self, kind: EntityKind) -> RepositoryResult<Vec<String>>;

    // ===== 记录写入 =====

    /// 检查自然键是否已存在
    async fn record_exists(&self, key: &NaturalKey) -> RepositoryResult<bool>;

    /// 按自然键写入记录（存在则覆盖）
    async fn upsert_record(&self, record: &StoredRecord) -> RepositoryResult<WriteOutcome>;

    // ===== 批次审计 =====

    /// 记录单表导入批次
    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()>;
}
