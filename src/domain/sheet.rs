// ==========================================
// 孵化场批量导入 - 工作表领域模型
// ==========================================
// 用途: 解析阶段产物, 解析后不可变
// 红线: 行号 = 源工作表中的 1-based 数据行位置（空行也占号）
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::types::RecordType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// SheetRow - 单行记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetRow {
    pub row_number: usize,                    // 源表数据行号（1-based）
    pub cells: BTreeMap<String, CellValue>,   // 字段名 → 单元格值
}

impl SheetRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: BTreeMap::new(),
        }
    }

    /// 链式写入（测试与夹具构造使用）
    pub fn with(mut self, field: &str, value: impl Into<CellValue>) -> Self {
        self.cells.insert(field.to_string(), value.into());
        self
    }

    /// 读取单元格（缺失返回 Empty 引用）
    pub fn get(&self, field: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(field).unwrap_or(&EMPTY)
    }

    /// 字段是否有非空值
    pub fn has_value(&self, field: &str) -> bool {
        !self.get(field).is_empty()
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(CellValue::is_empty)
    }
}

// ==========================================
// DateContext - 工作表锚定日期
// ==========================================
// 来源: 表头上方的说明行 / 工作表名称
// 用途: 导入时作为日期字段的回退默认值
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DateContext {
    pub anchors: BTreeMap<String, NaiveDate>, // 规范化标签 → 日期（如 set_date）
    pub primary: Option<NaiveDate>,           // 首个识别到的日期
}

impl DateContext {
    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty() && self.primary.is_none()
    }

    /// 为字段选取回退日期: 同名锚点优先, 其次主锚点
    pub fn date_for(&self, field: &str) -> Option<NaiveDate> {
        self.anchors.get(field).copied().or(self.primary)
    }

    pub fn record(&mut self, label: Option<&str>, date: NaiveDate) {
        if let Some(label) = label {
            self.anchors.entry(label.to_string()).or_insert(date);
        }
        if self.primary.is_none() {
            self.primary = Some(date);
        }
    }
}

// ==========================================
// Classification - 记录类型判定结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Matched { record_type: RecordType, score: u32 },
    Ambiguous { candidates: Vec<RecordType>, score: u32 },
    Unrecognized,
}

impl Classification {
    pub fn record_type(&self) -> Option<RecordType> {
        match self {
            Classification::Matched { record_type, .. } => Some(*record_type),
            Classification::Ambiguous { .. } | Classification::Unrecognized => None,
        }
    }
}

// ==========================================
// SheetData - 单个工作表解析结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetData {
    pub sheet_name: String,
    pub record_type: Option<RecordType>, // None = 无法分类（仍展示给操作员）
    pub classification: Classification,
    pub headers: Vec<String>,            // 规范化后的列名（已映射为标准字段名）
    pub rows: Vec<SheetRow>,             // 保持源表顺序
    pub date_context: Option<DateContext>,
}

impl SheetData {
    /// 以已知类型直接构造（调用方已确定类型时使用, 如测试/API 直传）
    pub fn typed(sheet_name: &str, record_type: RecordType, rows: Vec<SheetRow>) -> Self {
        let mut headers: Vec<String> = Vec::new();
        for row in &rows {
            for field in row.cells.keys() {
                if !headers.contains(field) {
                    headers.push(field.clone());
                }
            }
        }
        Self {
            sheet_name: sheet_name.to_string(),
            record_type: Some(record_type),
            classification: Classification::Matched {
                record_type,
                score: 0,
            },
            headers,
            rows,
            date_context: None,
        }
    }

    pub fn with_date_context(mut self, context: DateContext) -> Self {
        self.date_context = (!context.is_empty()).then_some(context);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_context_prefers_labelled_anchor() {
        let set = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let report = NaiveDate::from_ymd_opt(2024, 3, 22).unwrap();

        let mut ctx = DateContext::default();
        ctx.record(Some("report_date"), report);
        ctx.record(Some("set_date"), set);

        assert_eq!(ctx.date_for("set_date"), Some(set));
        assert_eq!(ctx.date_for("pack_date"), Some(report));
    }

    #[test]
    fn test_row_accessors() {
        let row = SheetRow::new(3).with("flock_number", "F101").with("eggs_set", 120.0);
        assert!(row.has_value("flock_number"));
        assert!(!row.has_value("house_number"));
        assert_eq!(row.get("eggs_set").as_i64(), Some(120));
        assert!(!row.is_blank());
    }
}
