// ==========================================
// 孵化场批量导入 - 校验与导入结果模型
// ==========================================
// 用途: 校验问题 / 单表导入结果 / 批次审计 / 进度事件
// 红线: success + failure + skipped + unprocessed == total
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::types::{RecordType, Severity, SheetOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// ValidationIssue - 单条校验问题
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub row: usize,                 // 源表数据行号（1-based）
    pub column: String,             // 标准字段名
    pub value: CellValue,           // 触发问题的单元格值
    pub severity: Severity,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

// ==========================================
// ValidationSummary - 校验汇总
// ==========================================
// 红线: 错误数（阻断）与警告数（非阻断）分开展示
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_rows: usize,
    pub errors: usize,
    pub warnings: usize,
    pub rows_with_errors: usize,
}

impl ValidationSummary {
    pub fn from_issues(total_rows: usize, issues: &[ValidationIssue]) -> Self {
        let errors = issues.iter().filter(|i| i.is_error()).count();
        let warnings = issues.len() - errors;

        let error_rows: BTreeSet<usize> = issues
            .iter()
            .filter(|i| i.is_error())
            .map(|i| i.row)
            .collect();

        Self {
            total_rows,
            errors,
            warnings,
            rows_with_errors: error_rows.len(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.errors > 0
    }
}

// ==========================================
// RowError - 单行导入失败
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

// ==========================================
// ImportResult - 单表导入结果
// ==========================================
// 每次导入调用生成一个, 之后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportResult {
    pub batch_id: String,
    pub sheet_name: String,
    pub record_type: RecordType,
    pub outcome: SheetOutcome,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    pub unprocessed: usize, // 超时/系统性中止后未尝试的行
    pub errors: Vec<RowError>,
    pub abort_reason: Option<String>,
    pub elapsed_ms: u64,
}

impl ImportResult {
    /// 行数守恒校验
    pub fn is_balanced(&self) -> bool {
        self.success + self.failure + self.skipped + self.unprocessed == self.total
    }

    pub fn attempted(&self) -> usize {
        self.success + self.failure + self.skipped
    }
}

// ==========================================
// ImportBatch - 导入批次审计记录
// ==========================================
// 对齐: import_batch 表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub batch_id: String,
    pub sheet_name: String,
    pub record_type: RecordType,
    pub outcome: SheetOutcome,
    pub total_rows: i64,
    pub success_rows: i64,
    pub failure_rows: i64,
    pub skipped_rows: i64,
    pub unprocessed_rows: i64,
    pub imported_at: DateTime<Utc>,
    pub elapsed_ms: i64,
}

impl From<&ImportResult> for ImportBatch {
    fn from(result: &ImportResult) -> Self {
        Self {
            batch_id: result.batch_id.clone(),
            sheet_name: result.sheet_name.clone(),
            record_type: result.record_type,
            outcome: result.outcome,
            total_rows: result.total as i64,
            success_rows: result.success as i64,
            failure_rows: result.failure as i64,
            skipped_rows: result.skipped as i64,
            unprocessed_rows: result.unprocessed as i64,
            imported_at: Utc::now(),
            elapsed_ms: result.elapsed_ms as i64,
        }
    }
}

// ==========================================
// ProgressEvent - 进度事件
// ==========================================
// 同一工作表的事件单调且不与其他表交错
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgressEvent {
    SheetStarted {
        sheet_name: String,
        total: usize,
    },
    RowProcessed {
        sheet_name: String,
        current: usize, // 已处理行数（1-based）
        total: usize,
    },
    SheetFinished {
        sheet_name: String,
        outcome: SheetOutcome,
    },
}

impl ProgressEvent {
    pub fn sheet_name(&self) -> &str {
        match self {
            ProgressEvent::SheetStarted { sheet_name, .. }
            | ProgressEvent::RowProcessed { sheet_name, .. }
            | ProgressEvent::SheetFinished { sheet_name, .. } => sheet_name,
        }
    }
}
