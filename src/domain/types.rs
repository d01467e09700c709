// ==========================================
// 孵化场批量导入 - 领域类型定义
// ==========================================
// 职责: 记录类型 / 实体类型 / 严重级别 / 工作表状态机
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 记录类型 (Record Type)
// ==========================================
// 封闭集合: 每个工作表最多归入一种记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordType {
    Flock,             // 种鸡群档案
    HouseBatch,        // 鸡舍/入孵批次
    EggPackQuality,    // 蛋箱质量
    FertilityAnalysis, // 受精率分析
    ResidueAnalysis,   // 残蛋分析
    QaMonitoring,      // QA 监测
    ClearsInjected,    // 照蛋/注射
}

impl RecordType {
    /// 全部记录类型（按分类评分时的遍历顺序）
    pub const ALL: [RecordType; 7] = [
        RecordType::Flock,
        RecordType::HouseBatch,
        RecordType::EggPackQuality,
        RecordType::FertilityAnalysis,
        RecordType::ResidueAnalysis,
        RecordType::QaMonitoring,
        RecordType::ClearsInjected,
    ];

    /// 数据库存储用代码
    pub fn code(&self) -> &'static str {
        match self {
            RecordType::Flock => "FLOCK",
            RecordType::HouseBatch => "HOUSE_BATCH",
            RecordType::EggPackQuality => "EGG_PACK_QUALITY",
            RecordType::FertilityAnalysis => "FERTILITY_ANALYSIS",
            RecordType::ResidueAnalysis => "RESIDUE_ANALYSIS",
            RecordType::QaMonitoring => "QA_MONITORING",
            RecordType::ClearsInjected => "CLEARS_INJECTED",
        }
    }

    /// 从数据库代码解析
    pub fn from_code(code: &str) -> Option<Self> {
        RecordType::ALL
            .iter()
            .copied()
            .find(|t| t.code().eq_ignore_ascii_case(code.trim()))
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ==========================================
// 关联实体类型 (Entity Kind)
// ==========================================
// 解析顺序固定: Flock → House → Machine（见 ENTITY_RESOLUTION_ORDER）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Flock,
    House,
    Machine,
}

/// 同一行缺失多个实体时的创建顺序
pub const ENTITY_RESOLUTION_ORDER: [EntityKind; 3] =
    [EntityKind::Flock, EntityKind::House, EntityKind::Machine];

impl EntityKind {
    /// 对应的数据表名
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Flock => "flock",
            EntityKind::House => "house",
            EntityKind::Machine => "machine",
        }
    }

    /// 自然键所在字段
    pub fn key_field(&self) -> &'static str {
        match self {
            EntityKind::Flock => "flock_number",
            EntityKind::House => "house_number",
            EntityKind::Machine => "machine_number",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Flock => write!(f, "FLOCK"),
            EntityKind::House => write!(f, "HOUSE"),
            EntityKind::Machine => write!(f, "MACHINE"),
        }
    }
}

// ==========================================
// 校验严重级别 (Severity)
// ==========================================
// 红线: Error 阻断整表导入, Warning 仅提示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARNING"),
        }
    }
}

// ==========================================
// 工作表状态机 (Sheet State)
// ==========================================
// Pending → Parsed → Validating → {Blocked | Ready} → Importing
//         → {Completed | Failed | TimedOut}
// 红线: Blocked 不可进入 Importing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetState {
    Pending,
    Parsed,
    Validating,
    Blocked,
    Ready,
    Importing,
    Completed,
    Failed,
    TimedOut,
}

impl SheetState {
    /// 是否允许迁移到目标状态
    pub fn can_transition_to(&self, to: SheetState) -> bool {
        use SheetState::{
            Blocked, Completed, Failed, Importing, Parsed, Pending, Ready, TimedOut, Validating,
        };
        matches!(
            (*self, to),
            (Pending, Parsed)
                | (Parsed, Validating)
                | (Validating, Blocked)
                | (Validating, Ready)
                | (Ready, Importing)
                | (Importing, Completed)
                | (Importing, Failed)
                | (Importing, TimedOut)
        )
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SheetState::Blocked | SheetState::Completed | SheetState::Failed | SheetState::TimedOut
        )
    }
}

impl fmt::Display for SheetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SheetState::Pending => "PENDING",
            SheetState::Parsed => "PARSED",
            SheetState::Validating => "VALIDATING",
            SheetState::Blocked => "BLOCKED",
            SheetState::Ready => "READY",
            SheetState::Importing => "IMPORTING",
            SheetState::Completed => "COMPLETED",
            SheetState::Failed => "FAILED",
            SheetState::TimedOut => "TIMED_OUT",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// 单表导入结局 (Sheet Outcome)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SheetOutcome {
    Completed, // 全部行已尝试
    Failed,    // 系统性故障中止
    TimedOut,  // 超时中止（已提交行不回滚）
}

impl SheetOutcome {
    pub fn as_state(&self) -> SheetState {
        match self {
            SheetOutcome::Completed => SheetState::Completed,
            SheetOutcome::Failed => SheetState::Failed,
            SheetOutcome::TimedOut => SheetState::TimedOut,
        }
    }
}

impl fmt::Display for SheetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_state().fmt(f)
    }
}
