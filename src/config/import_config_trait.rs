// ==========================================
// 孵化场批量导入 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::domain::cell::CellValue;
use crate::importer::error::PipelineResult;
use async_trait::async_trait;
use std::collections::BTreeMap;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 导入模块所需的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 自然键已存在时是否跳过
    ///
    /// # 默认值
    /// - true
    async fn get_skip_duplicates(&self) -> PipelineResult<bool>;

    /// 是否自动创建缺失的鸡群/鸡舍/机器
    ///
    /// # 默认值
    /// - false
    async fn get_create_missing_entities(&self) -> PipelineResult<bool>;

    /// 单表导入超时（毫秒）
    ///
    /// # 默认值
    /// - 60000
    async fn get_import_timeout_ms(&self) -> PipelineResult<u64>;

    /// 缺省样本数
    ///
    /// # 默认值
    /// - 300
    async fn get_default_sample_size(&self) -> PipelineResult<i64>;

    /// 字段默认值（JSON 对象: 字段名 → 值）
    ///
    /// # 默认值
    /// - 空
    async fn get_default_values(&self) -> PipelineResult<BTreeMap<String, CellValue>>;

    /// 已知鸡群目录（用于校验阶段的引用合理性检查）
    ///
    /// # 返回
    /// - None: 未配置, 不做检查
    async fn get_known_flocks(&self) -> PipelineResult<Option<Vec<String>>>;
}
