// ==========================================
// 孵化场批量导入 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 流程: 工作簿解析 → 行校验 → 批量导入（逐表隔离）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 工作表/记录/结果类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 导入层 - 解析/校验/导入
pub mod importer;

// 配置层 - 导入配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{EntityKind, RecordType, Severity, SheetOutcome, SheetState};

// 领域实体
pub use domain::{
    CellValue, ImportResult, ProgressEvent, RecordPayload, SheetData, SheetRow, ValidationIssue,
    ValidationSummary,
};

// 导入流程
pub use importer::{
    BulkImporter, ImportError, ImportQueue, PipelineResult, ReadySheet, RowValidator,
    RunSummary, SheetParser, SheetReport,
};

// 配置与存储
pub use config::{ConfigManager, ImportConfig};
pub use repository::{RecordStore, SqliteRecordStore};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "孵化场生产记录导入";
