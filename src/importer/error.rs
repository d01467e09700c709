// ==========================================
// 孵化场批量导入 - 导入模块错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 解析错误（整次运行致命）/ 工作表级错误（仅影响当前表）
// 说明: 校验问题与单行失败以数据形式返回, 不走错误通道
// ==========================================

use crate::domain::types::SheetState;
use thiserror::Error;

/// 导入模块错误类型
#[derive(Error, Debug)]
pub enum ImportError {
    // ===== 文件解析错误（致命）=====
    #[error("文件不存在: {0}")]
    FileNotFound(String),

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xlsm/.xls/.xlsb/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileReadError(String),

    #[error("工作簿解析失败: {0}")]
    WorkbookParseError(String),

    #[error("CSV 解析失败: {0}")]
    CsvParseError(String),

    #[error("工作簿不包含任何工作表: {0}")]
    EmptyWorkbook(String),

    // ===== 工作表级错误（不影响其他表）=====
    #[error("工作表 {sheet} 无法识别记录类型")]
    SheetUnclassified { sheet: String },

    #[error("工作表 {sheet} 存在 {errors} 个阻断性错误（{warnings} 个警告），需修正后再导入")]
    SheetBlocked {
        sheet: String,
        errors: usize,
        warnings: usize,
    },

    #[error("第 {row} 行字段 {field} 无法转换: {message}")]
    RowMappingError {
        row: usize,
        field: String,
        message: String,
    },

    #[error("工作表状态迁移非法: {from} → {to}")]
    InvalidStateTransition { from: SheetState, to: SheetState },

    // ===== 配置错误 =====
    #[error("配置读取失败 (key: {key}): {message}")]
    ConfigReadError { key: String, message: String },

    #[error("配置值格式错误 (key: {key}, value: {value}): {message}")]
    ConfigValueError {
        key: String,
        value: String,
        message: String,
    },

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ImportError {
    /// 是否为解析阶段错误（整次运行终止, 在选表之前暴露）
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            ImportError::FileNotFound(_)
                | ImportError::UnsupportedFormat(_)
                | ImportError::FileReadError(_)
                | ImportError::WorkbookParseError(_)
                | ImportError::CsvParseError(_)
                | ImportError::EmptyWorkbook(_)
        )
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for ImportError {
    fn from(err: std::io::Error) -> Self {
        ImportError::FileReadError(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for ImportError {
    fn from(err: csv::Error) -> Self {
        ImportError::CsvParseError(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for ImportError {
    fn from(err: calamine::Error) -> Self {
        ImportError::WorkbookParseError(err.to_string())
    }
}

/// Result 类型别名
pub type PipelineResult<T> = Result<T, ImportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_classification() {
        assert!(ImportError::UnsupportedFormat("txt".into()).is_parse_error());
        assert!(!ImportError::SheetBlocked {
            sheet: "Fertility".into(),
            errors: 1,
            warnings: 0
        }
        .is_parse_error());
    }

    #[test]
    fn test_blocked_message_mentions_counts() {
        let err = ImportError::SheetBlocked {
            sheet: "Fertility".into(),
            errors: 2,
            warnings: 5,
        };
        let msg = err.to_string();
        assert!(msg.contains("Fertility"));
        assert!(msg.contains('2'));
        assert!(msg.contains('5'));
    }
}
