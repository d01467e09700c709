// ==========================================
// 孵化场批量导入 - 配置层
// ==========================================
// 职责: 导入配置（代码默认值 + config_kv 覆写）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config;
pub mod import_config_trait;

pub use config_manager::{config_keys, ConfigManager};
pub use import_config::{ImportConfig, DEFAULT_SAMPLE_SIZE, DEFAULT_TIMEOUT_MS};
pub use import_config_trait::ImportConfigReader;
