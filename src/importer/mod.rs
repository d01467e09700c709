// ==========================================
// 孵化场批量导入 - 导入层
// ==========================================
// 流程: 工作簿 → SheetParser → SheetData[]
//       → RowValidator → ValidationIssue[] → (无阻断错误) ReadySheet
//       → BulkImporter → ImportResult
// 多表: ImportQueue 串行执行, 单表故障隔离
// ==========================================

// 模块声明
pub mod bulk_importer;
pub mod error;
pub mod file_parser;
pub mod import_queue;
pub mod progress;
pub mod record_mapper;
pub mod row_validator;
pub mod schema;

// 重导出核心类型
pub use bulk_importer::BulkImporter;
pub use error::{ImportError, PipelineResult};
pub use file_parser::{classify_headers, SheetParser};
pub use import_queue::{ImportQueue, RunSummary, SheetReport};
pub use progress::{progress_channel, ProgressSender, ProgressStream};
pub use record_mapper::{DefaultsChain, RecordMapper};
pub use row_validator::{ReadySheet, RowValidator};
pub use schema::{schema_for, FieldKind, FieldSpec, RecordSchema, Requirement};
