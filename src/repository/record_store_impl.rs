// ==========================================
// 孵化场批量导入 - 生产记录存储 SQLite 实现
// ==========================================
// 职责: 实现 RecordStore（使用 rusqlite）
// 红线: Repository 不含业务规则, 只做数据 CRUD
// 说明: 每次写入单独提交, 不跨行持有事务
// ==========================================

use crate::db::{init_schema, open_sqlite_connection};
use crate::domain::{EntityKind, ImportBatch, NaturalKey, RecordPayload, RecordType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::record_store::{RecordStore, StoredRecord, WriteOutcome};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// SqliteRecordStore
// ==========================================
pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// 打开数据库文件并确保 schema 就绪
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（调用方负责 schema）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn find_entity_tx(conn: &Connection, kind: EntityKind, key: &str) -> RepositoryResult<Option<i64>> {
        let sql = format!(
            "SELECT {}_id FROM {} WHERE {} = ?1",
            kind.table(),
            kind.table(),
            kind.key_field()
        );
        let id = conn
            .query_row(&sql, params![key], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id)
    }

    // ===== 查询（CLI 汇总与测试使用）=====

    /// 按自然键读取记录载荷
    pub fn find_record(&self, key: &NaturalKey) -> RepositoryResult<Option<RecordPayload>> {
        let conn = self.get_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT payload_json FROM production_record WHERE record_type = ?1 AND natural_key = ?2",
                params![key.record_type.code(), key.key],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// 统计某记录类型的条数
    pub fn count_records(&self, record_type: RecordType) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM production_record WHERE record_type = ?1",
            params![record_type.code()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// 统计某类实体条数
    pub fn count_entities(&self, kind: EntityKind) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
        let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 按导入时间倒序列出批次 (batch_id, sheet_name, outcome, success_rows)
    pub fn list_batches(&self) -> RepositoryResult<Vec<(String, String, String, i64)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT batch_id, sheet_name, outcome, success_rows
            FROM import_batch
            ORDER BY imported_at DESC, batch_id
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn find_entity(&self, kind: EntityKind, key: &str) -> RepositoryResult<Option<i64>> {
        let conn = self.get_conn()?;
        Self::find_entity_tx(&conn, kind, key)
    }

    async fn create_entity(&self, kind: EntityKind, key: &str) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES (?1)",
            kind.table(),
            kind.key_field()
        );
        conn.execute(&sql, params![key])?;

        Self::find_entity_tx(&conn, kind, key)?.ok_or_else(|| RepositoryError::NotFound {
            entity: kind.to_string(),
            key: key.to_string(),
        })
    }

    async fn list_entity_keys(&self, kind: EntityKind) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {key} FROM {table} ORDER BY {key}",
            key = kind.key_field(),
            table = kind.table()
        );
        let mut stmt = conn.prepare(&sql)?;
        let keys = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    async fn record_exists(&self, key: &NaturalKey) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM production_record WHERE record_type = ?1 AND natural_key = ?2",
                params![key.record_type.code(), key.key],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    async fn upsert_record(&self, record: &StoredRecord) -> RepositoryResult<WriteOutcome> {
        let payload_json = serde_json::to_string(&record.payload)?;
        let entity_id = |kind: EntityKind| {
            record
                .entity_ids
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, id)| *id)
        };

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existed = tx
            .query_row(
                "SELECT 1 FROM production_record WHERE record_type = ?1 AND natural_key = ?2",
                params![record.natural_key.record_type.code(), record.natural_key.key],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);

        tx.execute(
            r#"
            INSERT INTO production_record (
                record_type, natural_key, flock_id, house_id, machine_id,
                payload_json, source_sheet, source_row, batch_id
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (record_type, natural_key) DO UPDATE SET
                flock_id = excluded.flock_id,
                house_id = excluded.house_id,
                machine_id = excluded.machine_id,
                payload_json = excluded.payload_json,
                source_sheet = excluded.source_sheet,
                source_row = excluded.source_row,
                batch_id = excluded.batch_id,
                updated_at = datetime('now')
            "#,
            params![
                record.natural_key.record_type.code(),
                record.natural_key.key,
                entity_id(EntityKind::Flock),
                entity_id(EntityKind::House),
                entity_id(EntityKind::Machine),
                payload_json,
                record.source_sheet,
                record.source_row as i64,
                record.batch_id,
            ],
        )?;

        tx.commit()?;

        Ok(if existed {
            WriteOutcome::Replaced
        } else {
            WriteOutcome::Inserted
        })
    }

    async fn insert_batch(&self, batch: &ImportBatch) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO import_batch (
                batch_id, sheet_name, record_type, outcome,
                total_rows, success_rows, failure_rows, skipped_rows, unprocessed_rows,
                imported_at, elapsed_ms
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                batch.batch_id,
                batch.sheet_name,
                batch.record_type.code(),
                batch.outcome.to_string(),
                batch.total_rows,
                batch.success_rows,
                batch.failure_rows,
                batch.skipped_rows,
                batch.unprocessed_rows,
                batch.imported_at.to_rfc3339(),
                batch.elapsed_ms,
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EggPackRecord, SheetOutcome};
    use chrono::{NaiveDate, Utc};
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, SqliteRecordStore) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteRecordStore::new(file.path().to_str().unwrap()).unwrap();
        (file, store)
    }

    fn egg_pack(total_eggs: i64) -> RecordPayload {
        RecordPayload::EggPackQuality(EggPackRecord {
            flock_number: "F101".to_string(),
            pack_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            total_eggs,
            cracked: Some(3),
            dirty: None,
            small: None,
            double_yolk: None,
            floor_eggs: None,
            grade_a_percent: None,
        })
    }

    fn stored(payload: RecordPayload, flock_id: i64) -> StoredRecord {
        StoredRecord {
            natural_key: payload.natural_key(),
            payload,
            entity_ids: vec![(EntityKind::Flock, flock_id)],
            source_sheet: "Egg Pack".to_string(),
            source_row: 1,
            batch_id: "batch-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_entity_keys_by_kind() {
        let (_file, store) = store();
        store.create_entity(EntityKind::Flock, "F102").await.unwrap();
        store.create_entity(EntityKind::Flock, "F101").await.unwrap();
        store.create_entity(EntityKind::House, "H1").await.unwrap();

        let flocks = store.list_entity_keys(EntityKind::Flock).await.unwrap();
        assert_eq!(flocks, vec!["F101", "F102"]);
        assert!(store
            .list_entity_keys(EntityKind::Machine)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_create_entity_is_idempotent() {
        let (_file, store) = store();

        assert_eq!(store.find_entity(EntityKind::Flock, "F101").await.unwrap(), None);
        let id = store.create_entity(EntityKind::Flock, "F101").await.unwrap();
        let again = store.create_entity(EntityKind::Flock, "F101").await.unwrap();
        assert_eq!(id, again);
        assert_eq!(store.find_entity(EntityKind::Flock, "F101").await.unwrap(), Some(id));
        assert_eq!(store.count_entities(EntityKind::Flock).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_natural_key() {
        let (_file, store) = store();
        let flock_id = store.create_entity(EntityKind::Flock, "F101").await.unwrap();

        let first = stored(egg_pack(1000), flock_id);
        assert_eq!(store.upsert_record(&first).await.unwrap(), WriteOutcome::Inserted);
        assert!(store.record_exists(&first.natural_key).await.unwrap());

        let second = stored(egg_pack(1200), flock_id);
        assert_eq!(store.upsert_record(&second).await.unwrap(), WriteOutcome::Replaced);

        assert_eq!(store.count_records(RecordType::EggPackQuality).unwrap(), 1);
        let loaded = store.find_record(&second.natural_key).unwrap().unwrap();
        assert_eq!(loaded, egg_pack(1200));
    }

    #[tokio::test]
    async fn test_unknown_entity_id_violates_foreign_key() {
        let (_file, store) = store();
        let err = store.upsert_record(&stored(egg_pack(10), 999)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::ForeignKeyViolation(_)));
        assert!(!err.is_systemic());
    }

    #[tokio::test]
    async fn test_insert_batch_audit_row() {
        let (_file, store) = store();
        let batch = ImportBatch {
            batch_id: "batch-1".to_string(),
            sheet_name: "Egg Pack".to_string(),
            record_type: RecordType::EggPackQuality,
            outcome: SheetOutcome::Completed,
            total_rows: 3,
            success_rows: 3,
            failure_rows: 0,
            skipped_rows: 0,
            unprocessed_rows: 0,
            imported_at: Utc::now(),
            elapsed_ms: 12,
        };
        store.insert_batch(&batch).await.unwrap();

        let batches = store.list_batches().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].2, "COMPLETED");
        assert_eq!(batches[0].3, 3);
    }
}
