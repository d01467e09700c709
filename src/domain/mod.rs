// ==========================================
// 孵化场批量导入 - 领域模型层
// ==========================================
// 职责: 定义工作表、单元格、记录载荷、校验/导入结果等领域类型
// 红线: 不含数据访问逻辑, 不含导入流程逻辑
// ==========================================

pub mod cell;
pub mod import;
pub mod record;
pub mod sheet;
pub mod types;

// 重导出核心类型
pub use cell::CellValue;
pub use import::{
    ImportBatch, ImportResult, ProgressEvent, RowError, ValidationIssue, ValidationSummary,
};
pub use record::{
    ClearsInjectedRecord, EggPackRecord, FertilityRecord, FlockRecord, HouseBatchRecord,
    canonical_identifier, NaturalKey, QaDetail, QaKind, QaRecord, RecordPayload, ResidueRecord,
};
pub use sheet::{Classification, DateContext, SheetData, SheetRow};
pub use types::{
    EntityKind, RecordType, Severity, SheetOutcome, SheetState, ENTITY_RESOLUTION_ORDER,
};
