// ==========================================
// 孵化场批量导入 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口, 屏蔽数据库细节
// 约束: 所有值参数化绑定; 表名/列名仅来自 EntityKind 的静态映射
// ==========================================

pub mod error;
pub mod record_store;
pub mod record_store_impl;

pub use error::{RepositoryError, RepositoryResult};
pub use record_store::{RecordStore, StoredRecord, WriteOutcome};
pub use record_store_impl::SqliteRecordStore;
