// ==========================================
// 孵化场批量导入 - 单表批量导入器
// ==========================================
// 流程（逐行, 保持源表顺序）:
//   截止检查 → 映射(默认值链) → 去重 → 实体解析 → 写入 → 进度
// 失败隔离:
//   - 单行失败: 记入 ImportResult.errors, 继续下一行
//   - 系统性故障: 中止本表, 剩余行计为 unprocessed, 结局 Failed
//   - 超时: 仅在行边界检查, 剩余行计为 unprocessed, 结局 TimedOut
// ==========================================

use crate::config::ImportConfig;
use crate::domain::import::{ImportBatch, ImportResult, ProgressEvent, RowError};
use crate::domain::record::RecordPayload;
use crate::domain::sheet::SheetRow;
use crate::domain::types::{EntityKind, SheetOutcome};
use crate::importer::error::{ImportError, PipelineResult};
use crate::importer::record_mapper::{DefaultsChain, RecordMapper};
use crate::importer::row_validator::ReadySheet;
use crate::repository::{RecordStore, RepositoryError, StoredRecord, WriteOutcome};
use chrono::Local;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// 单行处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Written(WriteOutcome),
    Skipped,
}

/// 单行失败分类
#[derive(Debug)]
enum RowFailure {
    Row(String),
    Systemic(String),
}

impl From<RepositoryError> for RowFailure {
    fn from(err: RepositoryError) -> Self {
        if err.is_systemic() {
            RowFailure::Systemic(err.to_string())
        } else {
            RowFailure::Row(err.to_string())
        }
    }
}

impl From<ImportError> for RowFailure {
    fn from(err: ImportError) -> Self {
        RowFailure::Row(err.to_string())
    }
}

/// 本次调用内的实体 id 缓存（自然键 → id）
type EntityCache = HashMap<(EntityKind, String), i64>;

// ==========================================
// BulkImporter
// ==========================================
/// 单表批量导入器
///
/// 每次 [`BulkImporter::import`] 处理一张已通过校验的工作表, 逐行写入存储。
///
/// 写入不具备整表原子性: 每行独立提交。超时或系统性故障中止时,
/// 已提交的行保留在存储中, 不做回滚; 结果中的 `unprocessed` 给出未尝试的行数,
/// 调用方可据此重试（重试时配合 `skip_duplicates` 跳过已写入行）。
pub struct BulkImporter<S: RecordStore> {
    store: Arc<S>,
}

impl<S: RecordStore> BulkImporter<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 导入一张工作表
    ///
    /// # 返回
    /// - Ok(ImportResult): 单行失败/超时/系统性故障均编码在结果中
    /// - Err(ConfigValueError): 配置指定的记录类型与工作表不一致
    #[instrument(
        skip(self, sheet, config),
        fields(sheet = %sheet.sheet_name(), record_type = %sheet.record_type(), batch_id)
    )]
    pub async fn import(
        &self,
        sheet: &ReadySheet,
        config: &ImportConfig,
    ) -> PipelineResult<ImportResult> {
        let record_type = sheet.record_type();
        if let Some(expected) = config.record_type {
            if expected != record_type {
                return Err(ImportError::ConfigValueError {
                    key: "record_type".to_string(),
                    value: expected.to_string(),
                    message: format!("工作表已判定为 {}", record_type),
                });
            }
        }

        let started = Instant::now();
        let deadline = started + config.timeout;
        let batch_id = Uuid::new_v4().to_string();
        tracing::Span::current().record("batch_id", batch_id.as_str());

        let sheet_name = sheet.sheet_name().to_string();
        let rows = sheet.rows();
        let total = rows.len();
        info!(total, timeout_ms = config.timeout.as_millis() as u64, "开始导入工作表");

        emit(
            config,
            ProgressEvent::SheetStarted {
                sheet_name: sheet_name.clone(),
                total,
            },
        );

        let mapper = RecordMapper::new(
            record_type,
            DefaultsChain {
                config_defaults: &config.default_values,
                date_context: sheet.sheet().date_context.as_ref(),
                reference_date: config
                    .reference_date
                    .unwrap_or_else(|| Local::now().date_naive()),
                sample_size: config.sample_size,
            },
        );

        let mut cache = EntityCache::new();
        let mut success = 0usize;
        let mut failure = 0usize;
        let mut skipped = 0usize;
        let mut errors = Vec::new();
        let mut outcome = SheetOutcome::Completed;
        let mut abort_reason = None;
        let mut attempted = 0usize;

        for row in rows {
            if Instant::now() >= deadline {
                warn!(
                    row = row.row_number,
                    attempted,
                    "导入超时, 剩余行不再尝试（已提交行保留）"
                );
                outcome = SheetOutcome::TimedOut;
                abort_reason = Some(format!(
                    "超时 {} ms, 停止于第 {} 行之前",
                    config.timeout.as_millis(),
                    row.row_number
                ));
                break;
            }

            attempted += 1;
            match self
                .import_row(row, &mapper, &sheet_name, &batch_id, config, &mut cache)
                .await
            {
                Ok(RowOutcome::Written(write)) => {
                    success += 1;
                    debug!(row = row.row_number, ?write, "行已写入");
                }
                Ok(RowOutcome::Skipped) => {
                    skipped += 1;
                    debug!(row = row.row_number, "自然键已存在, 跳过");
                }
                Err(RowFailure::Row(message)) => {
                    failure += 1;
                    debug!(row = row.row_number, %message, "行导入失败");
                    errors.push(RowError {
                        row: row.row_number,
                        message,
                    });
                }
                Err(RowFailure::Systemic(message)) => {
                    failure += 1;
                    warn!(row = row.row_number, %message, "存储系统性故障, 中止本表");
                    errors.push(RowError {
                        row: row.row_number,
                        message: message.clone(),
                    });
                    outcome = SheetOutcome::Failed;
                    abort_reason = Some(message);
                }
            }

            emit(
                config,
                ProgressEvent::RowProcessed {
                    sheet_name: sheet_name.clone(),
                    current: attempted,
                    total,
                },
            );

            if outcome == SheetOutcome::Failed {
                break;
            }
        }

        let result = ImportResult {
            batch_id,
            sheet_name: sheet_name.clone(),
            record_type,
            outcome,
            total,
            success,
            failure,
            skipped,
            unprocessed: total - attempted,
            errors,
            abort_reason,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        if let Err(e) = self.store.insert_batch(&ImportBatch::from(&result)).await {
            warn!(error = %e, "导入批次审计写入失败");
        }

        emit(
            config,
            ProgressEvent::SheetFinished {
                sheet_name,
                outcome,
            },
        );

        info!(
            outcome = %result.outcome,
            success = result.success,
            failure = result.failure,
            skipped = result.skipped,
            unprocessed = result.unprocessed,
            elapsed_ms = result.elapsed_ms,
            "工作表导入结束"
        );

        Ok(result)
    }

    async fn import_row(
        &self,
        row: &SheetRow,
        mapper: &RecordMapper<'_>,
        sheet_name: &str,
        batch_id: &str,
        config: &ImportConfig,
        cache: &mut EntityCache,
    ) -> Result<RowOutcome, RowFailure> {
        let payload = mapper.map_row(row)?;
        let natural_key = payload.natural_key();

        if config.skip_duplicates && self.store.record_exists(&natural_key).await? {
            return Ok(RowOutcome::Skipped);
        }

        let entity_ids = self.resolve_entities(&payload, config, cache).await?;

        let record = StoredRecord {
            natural_key,
            payload,
            entity_ids,
            source_sheet: sheet_name.to_string(),
            source_row: row.row_number,
            batch_id: batch_id.to_string(),
        };
        let write = self.store.upsert_record(&record).await?;
        Ok(RowOutcome::Written(write))
    }

    /// 按 Flock → House → Machine 顺序解析引用实体
    async fn resolve_entities(
        &self,
        payload: &RecordPayload,
        config: &ImportConfig,
        cache: &mut EntityCache,
    ) -> Result<Vec<(EntityKind, i64)>, RowFailure> {
        let defined = payload.defines_entity();
        let mut ids = Vec::new();

        for (kind, key) in payload.entity_refs() {
            let cache_key = (kind, key.clone());
            if let Some(id) = cache.get(&cache_key) {
                ids.push((kind, *id));
                continue;
            }

            let id = match self.store.find_entity(kind, &key).await? {
                Some(id) => id,
                // 种鸡群档案本身即为 flock 实体
                None if defined == Some(kind) || config.create_missing_entities => {
                    let id = self.store.create_entity(kind, &key).await?;
                    debug!(entity = %kind, key = %key, id, "已创建缺失实体");
                    id
                }
                None => {
                    return Err(RowFailure::Row(format!(
                        "引用的 {} {} 不存在（未启用自动创建）",
                        kind, key
                    )));
                }
            };

            cache.insert(cache_key, id);
            ids.push((kind, id));
        }

        Ok(ids)
    }
}

fn emit(config: &ImportConfig, event: ProgressEvent) {
    if let Some(progress) = &config.progress {
        progress.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sheet::{DateContext, SheetData};
    use crate::domain::types::RecordType;
    use crate::importer::progress::progress_channel;
    use crate::importer::row_validator::RowValidator;
    use crate::repository::SqliteRecordStore;
    use chrono::NaiveDate;
    use tempfile::NamedTempFile;

    fn store() -> (NamedTempFile, Arc<SqliteRecordStore>) {
        let file = NamedTempFile::new().unwrap();
        let store = SqliteRecordStore::new(file.path().to_str().unwrap()).unwrap();
        (file, Arc::new(store))
    }

    fn fertility_sheet() -> ReadySheet {
        let rows = vec![
            SheetRow::new(1)
                .with("flock_number", "F101")
                .with("sample_size", 300.0)
                .with("fertile", 270.0),
            SheetRow::new(2)
                .with("flock_number", "F102")
                .with("sample_size", 300.0)
                .with("fertile", 255.0),
        ];
        let mut ctx = DateContext::default();
        ctx.record(Some("set_date"), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        let sheet = SheetData::typed("Fertility", RecordType::FertilityAnalysis, rows)
            .with_date_context(ctx);
        RowValidator::new().ready(sheet).unwrap()
    }

    #[tokio::test]
    async fn test_missing_entity_is_row_failure_without_creation() {
        let (_file, store) = store();
        let importer = BulkImporter::new(store.clone());

        let result = importer
            .import(&fertility_sheet(), &ImportConfig::default())
            .await
            .unwrap();
        assert_eq!(result.outcome, SheetOutcome::Completed);
        assert_eq!(result.failure, 2);
        assert_eq!(result.errors[0].row, 1);
        assert!(result.errors[0].message.contains("F101"));
        assert!(result.is_balanced());
    }

    #[tokio::test]
    async fn test_create_missing_then_skip_on_rerun() {
        let (_file, store) = store();
        let importer = BulkImporter::new(store.clone());
        let config = ImportConfig::default().create_missing_entities(true);

        let first = importer.import(&fertility_sheet(), &config).await.unwrap();
        assert_eq!(first.success, 2);
        assert_eq!(store.count_entities(EntityKind::Flock).unwrap(), 2);

        let second = importer.import(&fertility_sheet(), &config).await.unwrap();
        assert_eq!(second.success, 0);
        assert_eq!(second.skipped, 2);
        assert_ne!(first.batch_id, second.batch_id);
    }

    #[tokio::test]
    async fn test_record_type_mismatch_is_config_error() {
        let (_file, store) = store();
        let importer = BulkImporter::new(store);
        let config = ImportConfig::default().for_type(RecordType::ResidueAnalysis);

        let err = importer.import(&fertility_sheet(), &config).await.unwrap_err();
        assert!(matches!(err, ImportError::ConfigValueError { .. }));
    }

    #[tokio::test]
    async fn test_progress_events_bracket_rows() {
        let (_file, store) = store();
        let importer = BulkImporter::new(store);
        let (tx, mut rx) = progress_channel();
        let config = ImportConfig::default()
            .create_missing_entities(true)
            .with_progress(tx);

        importer.import(&fertility_sheet(), &config).await.unwrap();
        drop(config);

        let events = rx.drain();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ProgressEvent::SheetStarted { total: 2, .. }));
        assert!(matches!(
            events[2],
            ProgressEvent::RowProcessed { current: 2, total: 2, .. }
        ));
        assert!(matches!(
            events[3],
            ProgressEvent::SheetFinished {
                outcome: SheetOutcome::Completed,
                ..
            }
        ));
    }
}
