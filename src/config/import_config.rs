// ==========================================
// 孵化场批量导入 - 单表导入配置
// ==========================================
// 职责: 去重策略 / 缺失实体策略 / 默认值 / 超时 / 进度通道
// 来源: 代码默认值 → config_kv 覆写（ImportConfig::load）→ 调用方链式覆写
// ==========================================

use crate::config::import_config_trait::ImportConfigReader;
use crate::domain::cell::CellValue;
use crate::domain::types::RecordType;
use crate::importer::error::PipelineResult;
use crate::importer::progress::ProgressSender;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::time::Duration;

/// 默认单表导入超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// 默认抽样蛋数（受精率/残蛋分析缺省样本数）
pub const DEFAULT_SAMPLE_SIZE: i64 = 300;

#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// 期望的记录类型（None = 沿用工作表判定结果）
    pub record_type: Option<RecordType>,
    /// 自然键已存在时跳过（false = 覆盖）
    pub skip_duplicates: bool,
    /// 引用的鸡群/鸡舍/机器不存在时自动创建
    pub create_missing_entities: bool,
    /// 字段 → 回退值（优先于表头日期与全局默认）
    pub default_values: BTreeMap<String, CellValue>,
    pub sample_size: i64,
    pub timeout: Duration,
    /// 日期字段的全局回退值（None = 导入当天）
    pub reference_date: Option<NaiveDate>,
    pub progress: Option<ProgressSender>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            record_type: None,
            skip_duplicates: true,
            create_missing_entities: false,
            default_values: BTreeMap::new(),
            sample_size: DEFAULT_SAMPLE_SIZE,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            reference_date: None,
            progress: None,
        }
    }
}

impl ImportConfig {
    /// 从 config_kv 读取导入默认配置
    pub async fn load(reader: &dyn ImportConfigReader) -> PipelineResult<Self> {
        Ok(Self {
            record_type: None,
            skip_duplicates: reader.get_skip_duplicates().await?,
            create_missing_entities: reader.get_create_missing_entities().await?,
            default_values: reader.get_default_values().await?,
            sample_size: reader.get_default_sample_size().await?,
            timeout: Duration::from_millis(reader.get_import_timeout_ms().await?),
            reference_date: None,
            progress: None,
        })
    }

    pub fn for_type(mut self, record_type: RecordType) -> Self {
        self.record_type = Some(record_type);
        self
    }

    pub fn skip_duplicates(mut self, skip: bool) -> Self {
        self.skip_duplicates = skip;
        self
    }

    pub fn create_missing_entities(mut self, create: bool) -> Self {
        self.create_missing_entities = create;
        self
    }

    pub fn default_value(mut self, field: &str, value: impl Into<CellValue>) -> Self {
        self.default_values.insert(field.to_string(), value.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn with_progress(mut self, sender: ProgressSender) -> Self {
        self.progress = Some(sender);
        self
    }
}
