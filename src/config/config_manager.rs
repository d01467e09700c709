// ==========================================
// 孵化场批量导入 - 配置管理器
// ==========================================
// 职责: 导入配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope, 目前仅使用 global)
// ==========================================

use crate::config::import_config::{DEFAULT_SAMPLE_SIZE, DEFAULT_TIMEOUT_MS};
use crate::config::import_config_trait::ImportConfigReader;
use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::cell::CellValue;
use crate::importer::error::{ImportError, PipelineResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> PipelineResult<Self> {
        let conn = open_sqlite_connection(db_path).map_err(|e| read_error("<open>", e))?;
        init_schema(&conn).map_err(|e| read_error("<schema>", e))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> PipelineResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;
            configure_sqlite_connection(&guard).map_err(|e| read_error("<pragma>", e))?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> PipelineResult<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| read_error(key, e))
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> PipelineResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> PipelineResult<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ImportError::InternalError(format!("锁获取失败: {}", e)))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )
        .map_err(|e| read_error(key, e))?;
        Ok(())
    }

    fn parse_or_default<T: std::str::FromStr>(&self, key: &str, default: T) -> PipelineResult<T> {
        match self.get_config_value(key)? {
            None => Ok(default),
            Some(raw) => raw.trim().parse::<T>().map_err(|_| ImportError::ConfigValueError {
                key: key.to_string(),
                value: raw.clone(),
                message: "无法解析".to_string(),
            }),
        }
    }
}

fn read_error(key: &str, err: rusqlite::Error) -> ImportError {
    ImportError::ConfigReadError {
        key: key.to_string(),
        message: err.to_string(),
    }
}

fn parse_flag(key: &str, raw: &str) -> PipelineResult<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Ok(true),
        "0" | "false" | "no" | "n" => Ok(false),
        _ => Err(ImportError::ConfigValueError {
            key: key.to_string(),
            value: raw.to_string(),
            message: "应为 true/false".to_string(),
        }),
    }
}

// ==========================================
// ImportConfigReader Trait 实现
// ==========================================
#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_skip_duplicates(&self) -> PipelineResult<bool> {
        match self.get_config_value(config_keys::SKIP_DUPLICATES)? {
            Some(raw) => parse_flag(config_keys::SKIP_DUPLICATES, &raw),
            None => Ok(true),
        }
    }

    async fn get_create_missing_entities(&self) -> PipelineResult<bool> {
        match self.get_config_value(config_keys::CREATE_MISSING_ENTITIES)? {
            Some(raw) => parse_flag(config_keys::CREATE_MISSING_ENTITIES, &raw),
            None => Ok(false),
        }
    }

    async fn get_import_timeout_ms(&self) -> PipelineResult<u64> {
        self.parse_or_default(config_keys::IMPORT_TIMEOUT_MS, DEFAULT_TIMEOUT_MS)
    }

    async fn get_default_sample_size(&self) -> PipelineResult<i64> {
        self.parse_or_default(config_keys::DEFAULT_SAMPLE_SIZE, DEFAULT_SAMPLE_SIZE)
    }

    async fn get_default_values(&self) -> PipelineResult<BTreeMap<String, CellValue>> {
        let Some(raw) = self.get_config_value(config_keys::DEFAULT_VALUES)? else {
            return Ok(BTreeMap::new());
        };

        let parsed: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| ImportError::ConfigValueError {
                key: config_keys::DEFAULT_VALUES.to_string(),
                value: raw.clone(),
                message: e.to_string(),
            })?;

        Ok(parsed
            .into_iter()
            .filter_map(|(field, value)| {
                let cell = match value {
                    serde_json::Value::Number(n) => n.as_f64().map(CellValue::Number),
                    serde_json::Value::String(s) => Some(CellValue::text(s)),
                    serde_json::Value::Bool(b) => Some(CellValue::Bool(b)),
                    _ => {
                        tracing::warn!(
                            config_key = config_keys::DEFAULT_VALUES,
                            field = %field,
                            "默认值类型不支持，已忽略"
                        );
                        None
                    }
                };
                cell.map(|c| (field, c))
            })
            .collect())
    }

    async fn get_known_flocks(&self) -> PipelineResult<Option<Vec<String>>> {
        Ok(self.get_config_value(config_keys::KNOWN_FLOCKS)?.map(|raw| {
            raw.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        }))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 去重与实体策略
    pub const SKIP_DUPLICATES: &str = "import.skip_duplicates";
    pub const CREATE_MISSING_ENTITIES: &str = "import.create_missing_entities";

    // 执行约束
    pub const IMPORT_TIMEOUT_MS: &str = "import.timeout_ms";

    // 默认值
    pub const DEFAULT_SAMPLE_SIZE: &str = "import.default_sample_size";
    pub const DEFAULT_VALUES: &str = "import.default_values"; // JSON 对象

    // 校验
    pub const KNOWN_FLOCKS: &str = "validation.known_flocks"; // 逗号分隔
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::import_config::ImportConfig;
    use tempfile::NamedTempFile;

    fn manager() -> (NamedTempFile, ConfigManager) {
        let file = NamedTempFile::new().unwrap();
        let manager = ConfigManager::new(file.path().to_str().unwrap()).unwrap();
        (file, manager)
    }

    #[tokio::test]
    async fn test_defaults_when_unset() {
        let (_file, manager) = manager();
        let config = ImportConfig::load(&manager).await.unwrap();
        assert!(config.skip_duplicates);
        assert!(!config.create_missing_entities);
        assert_eq!(config.sample_size, DEFAULT_SAMPLE_SIZE);
        assert_eq!(config.timeout.as_millis() as u64, DEFAULT_TIMEOUT_MS);
        assert!(config.default_values.is_empty());
        assert_eq!(manager.get_known_flocks().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overrides_from_config_kv() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::SKIP_DUPLICATES, "false").unwrap();
        manager.set_global_config_value(config_keys::IMPORT_TIMEOUT_MS, "1500").unwrap();
        manager
            .set_global_config_value(
                config_keys::DEFAULT_VALUES,
                r#"{"sample_size": 150, "set_date": "2024-03-01"}"#,
            )
            .unwrap();
        manager.set_global_config_value(config_keys::KNOWN_FLOCKS, "F101, F102,").unwrap();

        let config = ImportConfig::load(&manager).await.unwrap();
        assert!(!config.skip_duplicates);
        assert_eq!(config.timeout.as_millis(), 1500);
        assert_eq!(config.default_values["sample_size"], CellValue::Number(150.0));
        assert_eq!(config.default_values["set_date"], CellValue::text("2024-03-01"));
        assert_eq!(
            manager.get_known_flocks().await.unwrap(),
            Some(vec!["F101".to_string(), "F102".to_string()])
        );
    }

    #[tokio::test]
    async fn test_malformed_value_is_config_error() {
        let (_file, manager) = manager();
        manager.set_global_config_value(config_keys::IMPORT_TIMEOUT_MS, "soon").unwrap();
        let err = manager.get_import_timeout_ms().await.unwrap_err();
        assert!(matches!(err, ImportError::ConfigValueError { .. }));
    }
}
