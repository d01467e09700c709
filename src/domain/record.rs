// ==========================================
// 孵化场批量导入 - 生产记录载荷
// ==========================================
// 红线: 记录载荷为带标签的和类型, 每种 RecordType 一个变体
//       QA 子类型细节同样为和类型（QaDetail）, 禁止以字符串键的自由文档存储
// 用途: 校验通过后的行 → 类型化记录 → 落库
// ==========================================

use crate::domain::types::{EntityKind, RecordType, ENTITY_RESOLUTION_ORDER};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 各记录类型结构体
// ==========================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlockRecord {
    pub flock_number: String,
    pub flock_name: Option<String>,
    pub breed: Option<String>,
    pub house_number: Option<String>,
    pub hatch_date: Option<NaiveDate>,
    pub age_weeks: Option<i64>,
    pub hen_count: Option<i64>,
    pub rooster_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HouseBatchRecord {
    pub batch_number: String,
    pub flock_number: String,
    pub house_number: String,
    pub set_date: NaiveDate,
    pub machine_number: Option<String>,
    pub eggs_set: i64,
    pub expected_hatch_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EggPackRecord {
    pub flock_number: String,
    pub pack_date: NaiveDate,
    pub total_eggs: i64,
    pub cracked: Option<i64>,
    pub dirty: Option<i64>,
    pub small: Option<i64>,
    pub double_yolk: Option<i64>,
    pub floor_eggs: Option<i64>,
    pub grade_a_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilityRecord {
    pub flock_number: String,
    pub set_date: NaiveDate,
    pub house_number: Option<String>,
    pub sample_size: i64,
    pub fertile: i64,
    pub infertile: Option<i64>,
    pub early_dead: Option<i64>,
    pub mid_dead: Option<i64>,
    pub late_dead: Option<i64>,
    pub pipped: Option<i64>,
    pub fertility_percent: Option<f64>,
    pub hatch_of_fertile_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidueRecord {
    pub flock_number: String,
    pub set_date: NaiveDate,
    pub sample_size: i64,
    pub infertile: Option<i64>,
    pub early_dead: Option<i64>,
    pub mid_dead: Option<i64>,
    pub late_dead: Option<i64>,
    pub contaminated: i64,
    pub cull_chicks: Option<i64>,
    pub malpositioned: Option<i64>,
    pub cracked: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaRecord {
    pub machine_number: String,
    pub check_date: NaiveDate,
    pub checked_by: Option<String>,
    pub detail: QaDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearsInjectedRecord {
    pub flock_number: String,
    pub batch_number: Option<String>,
    pub set_date: NaiveDate,
    pub machine_number: Option<String>,
    pub total_set: i64,
    pub clears: i64,
    pub injected: i64,
    pub clear_percent: Option<f64>,
}

// ==========================================
// QaDetail - QA 监测子类型
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "qa_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QaDetail {
    Temperature { temperature_f: f64 },
    Humidity { humidity_percent: f64 },
    Candling { eggs_candled: i64, clears_found: i64 },
    Sanitation { swab_result: String },
}

/// QA 子类型判别值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QaKind {
    Temperature,
    Humidity,
    Candling,
    Sanitation,
}

impl QaKind {
    /// 宽松解析源表中的 QA 类型文本
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        match normalized.as_str() {
            "temperature" | "temp" | "temperature check" => Some(QaKind::Temperature),
            "humidity" | "rh" | "relative humidity" => Some(QaKind::Humidity),
            "candling" | "candle" | "candling check" => Some(QaKind::Candling),
            "sanitation" | "swab" | "hygiene" | "sanitation swab" => Some(QaKind::Sanitation),
            _ => None,
        }
    }

    /// 该子类型必须提供的字段
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            QaKind::Temperature => &["temperature_f"],
            QaKind::Humidity => &["humidity_percent"],
            QaKind::Candling => &["eggs_candled", "clears_found"],
            QaKind::Sanitation => &["swab_result"],
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            QaKind::Temperature => "TEMPERATURE",
            QaKind::Humidity => "HUMIDITY",
            QaKind::Candling => "CANDLING",
            QaKind::Sanitation => "SANITATION",
        }
    }
}

impl QaDetail {
    pub fn kind(&self) -> QaKind {
        match self {
            QaDetail::Temperature { .. } => QaKind::Temperature,
            QaDetail::Humidity { .. } => QaKind::Humidity,
            QaDetail::Candling { .. } => QaKind::Candling,
            QaDetail::Sanitation { .. } => QaKind::Sanitation,
        }
    }
}

// ==========================================
// NaturalKey - 业务自然键
// ==========================================
// 组成见 RecordPayload::natural_key, 缺省的可选分量以空串占位
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NaturalKey {
    pub record_type: RecordType,
    pub key: String,
}

/// 标识符规范形式（去首尾空白, 大写）
///
/// 校验、映射、自然键与实体解析共用, 保证 "f101" 与 "F101" 指向同一鸡群
pub fn canonical_identifier(text: &str) -> String {
    text.trim().to_uppercase()
}

impl NaturalKey {
    /// 各分量先转为规范形式再以 `|` 连接
    pub fn new(record_type: RecordType, parts: &[&str]) -> Self {
        Self {
            record_type,
            key: parts
                .iter()
                .map(|p| canonical_identifier(p))
                .collect::<Vec<_>>()
                .join("|"),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.record_type, self.key)
    }
}

// ==========================================
// RecordPayload - 类型化记录（和类型）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordPayload {
    Flock(FlockRecord),
    HouseBatch(HouseBatchRecord),
    EggPackQuality(EggPackRecord),
    FertilityAnalysis(FertilityRecord),
    ResidueAnalysis(ResidueRecord),
    QaMonitoring(QaRecord),
    ClearsInjected(ClearsInjectedRecord),
}

fn iso(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

impl RecordPayload {
    pub fn record_type(&self) -> RecordType {
        match self {
            RecordPayload::Flock(_) => RecordType::Flock,
            RecordPayload::HouseBatch(_) => RecordType::HouseBatch,
            RecordPayload::EggPackQuality(_) => RecordType::EggPackQuality,
            RecordPayload::FertilityAnalysis(_) => RecordType::FertilityAnalysis,
            RecordPayload::ResidueAnalysis(_) => RecordType::ResidueAnalysis,
            RecordPayload::QaMonitoring(_) => RecordType::QaMonitoring,
            RecordPayload::ClearsInjected(_) => RecordType::ClearsInjected,
        }
    }

    /// 去重用自然键
    ///
    /// | 类型 | 组成 |
    /// |------|------|
    /// | Flock | flock_number |
    /// | HouseBatch | batch_number + set_date |
    /// | EggPackQuality | flock_number + pack_date |
    /// | FertilityAnalysis | flock_number + set_date |
    /// | ResidueAnalysis | flock_number + set_date |
    /// | QaMonitoring | machine_number + check_date + qa_type |
    /// | ClearsInjected | flock_number + set_date + batch_number |
    pub fn natural_key(&self) -> NaturalKey {
        let t = self.record_type();
        match self {
            RecordPayload::Flock(r) => NaturalKey::new(t, &[&r.flock_number]),
            RecordPayload::HouseBatch(r) => {
                NaturalKey::new(t, &[&r.batch_number, &iso(&r.set_date)])
            }
            RecordPayload::EggPackQuality(r) => {
                NaturalKey::new(t, &[&r.flock_number, &iso(&r.pack_date)])
            }
            RecordPayload::FertilityAnalysis(r) => {
                NaturalKey::new(t, &[&r.flock_number, &iso(&r.set_date)])
            }
            RecordPayload::ResidueAnalysis(r) => {
                NaturalKey::new(t, &[&r.flock_number, &iso(&r.set_date)])
            }
            RecordPayload::QaMonitoring(r) => NaturalKey::new(
                t,
                &[&r.machine_number, &iso(&r.check_date), r.detail.kind().code()],
            ),
            RecordPayload::ClearsInjected(r) => NaturalKey::new(
                t,
                &[
                    &r.flock_number,
                    &iso(&r.set_date),
                    r.batch_number.as_deref().unwrap_or(""),
                ],
            ),
        }
    }

    /// 引用的实体（按 Flock → House → Machine 固定顺序）
    pub fn entity_refs(&self) -> Vec<(EntityKind, String)> {
        let (flock, house, machine): (Option<&str>, Option<&str>, Option<&str>) = match self {
            RecordPayload::Flock(r) => (Some(r.flock_number.as_str()), r.house_number.as_deref(), None),
            RecordPayload::HouseBatch(r) => (
                Some(r.flock_number.as_str()),
                Some(r.house_number.as_str()),
                r.machine_number.as_deref(),
            ),
            RecordPayload::EggPackQuality(r) => (Some(r.flock_number.as_str()), None, None),
            RecordPayload::FertilityAnalysis(r) => {
                (Some(r.flock_number.as_str()), r.house_number.as_deref(), None)
            }
            RecordPayload::ResidueAnalysis(r) => (Some(r.flock_number.as_str()), None, None),
            RecordPayload::QaMonitoring(r) => (None, None, Some(r.machine_number.as_str())),
            RecordPayload::ClearsInjected(r) => {
                (Some(r.flock_number.as_str()), None, r.machine_number.as_deref())
            }
        };

        ENTITY_RESOLUTION_ORDER
            .iter()
            .filter_map(|kind| {
                let key = match kind {
                    EntityKind::Flock => flock,
                    EntityKind::House => house,
                    EntityKind::Machine => machine,
                };
                key.map(|k| (*kind, canonical_identifier(k)))
            })
            .collect()
    }

    /// 该记录是否即为实体本身（种鸡群档案自带 flock 实体）
    pub fn defines_entity(&self) -> Option<EntityKind> {
        match self {
            RecordPayload::Flock(_) => Some(EntityKind::Flock),
            _ => None,
        }
    }
}
