// ==========================================
// 孵化场批量导入 - 记录类型字段表
// ==========================================
// 职责: 每种 RecordType 的标准字段 / 别名 / 类型 / 必填性 / 实体引用
// 说明: 列名 → 字段映射为配置性质的内置表, 解析/校验/映射三处共用
// ==========================================

use crate::domain::types::{EntityKind, RecordType};

// ==========================================
// 字段值类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Identifier(EntityKind), // 实体自然键（鸡群号/鸡舍号/机器号）
    BatchNumber,            // 批次号
    Count,                  // 非负整数
    Decimal,                // 任意数值
    Percent,                // [0, 100]
    Date,
    QaType,                 // QA 子类型判别值
}

// ==========================================
// 必填性
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Required,    // 缺失 = 错误
    Defaultable, // 缺失 = 警告, 导入时按默认值链补齐
    Optional,
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub requirement: Requirement,
    pub aliases: &'static [&'static str],
}

impl FieldSpec {
    const fn new(
        name: &'static str,
        kind: FieldKind,
        requirement: Requirement,
        aliases: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind,
            requirement,
            aliases,
        }
    }

    /// 规范化列名是否命中本字段
    pub fn matches(&self, normalized_header: &str) -> bool {
        self.name == normalized_header || self.aliases.contains(&normalized_header)
    }
}

#[derive(Debug)]
pub struct RecordSchema {
    pub record_type: RecordType,
    pub fields: &'static [FieldSpec],
    pub natural_key: &'static [&'static str],
}

impl RecordSchema {
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// 字段在表中的位置（决定校验问题的列排序）
    pub fn position(&self, name: &str) -> usize {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .unwrap_or(self.fields.len())
    }

    /// 将规范化列名映射到标准字段名
    pub fn resolve_header(&self, normalized_header: &str) -> Option<&'static str> {
        self.fields
            .iter()
            .find(|f| f.matches(normalized_header))
            .map(|f| f.name)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields
            .iter()
            .filter(|f| f.requirement == Requirement::Required)
    }
}

use FieldKind::{BatchNumber, Count, Date, Decimal, Identifier, Percent, QaType, Text};
use Requirement::{Defaultable, Optional, Required};

const FLOCK_NUMBER: FieldSpec = FieldSpec::new(
    "flock_number",
    Identifier(EntityKind::Flock),
    Required,
    &["flock", "flock_no", "flock_id", "flock_code"],
);

const SET_DATE: FieldSpec = FieldSpec::new(
    "set_date",
    Date,
    Defaultable,
    &["date_set", "setting_date", "set"],
);

const SAMPLE_SIZE: FieldSpec = FieldSpec::new(
    "sample_size",
    Count,
    Defaultable,
    &["sample", "eggs_sampled", "eggs_broken_out", "breakout_sample"],
);

static FLOCK_FIELDS: [FieldSpec; 8] = [
    FLOCK_NUMBER,
    FieldSpec::new("flock_name", Text, Optional, &["name"]),
    FieldSpec::new("breed", Text, Optional, &["strain", "breed_strain"]),
    FieldSpec::new(
        "house_number",
        Identifier(EntityKind::House),
        Optional,
        &["house", "house_no"],
    ),
    FieldSpec::new(
        "hatch_date",
        Date,
        Optional,
        &["placement_date", "date_hatched"],
    ),
    FieldSpec::new("age_weeks", Count, Optional, &["age", "age_wks"]),
    FieldSpec::new("hen_count", Count, Optional, &["hens", "female_count", "females"]),
    FieldSpec::new(
        "rooster_count",
        Count,
        Optional,
        &["roosters", "males", "male_count"],
    ),
];

static HOUSE_BATCH_FIELDS: [FieldSpec; 7] = [
    FieldSpec::new(
        "batch_number",
        BatchNumber,
        Required,
        &["batch", "batch_no", "batch_id"],
    ),
    FLOCK_NUMBER,
    FieldSpec::new(
        "house_number",
        Identifier(EntityKind::House),
        Required,
        &["house", "house_no"],
    ),
    SET_DATE,
    FieldSpec::new(
        "machine_number",
        Identifier(EntityKind::Machine),
        Optional,
        &["setter", "setter_number", "machine", "incubator"],
    ),
    FieldSpec::new(
        "eggs_set",
        Count,
        Required,
        &["total_eggs_set", "eggs", "egg_count"],
    ),
    FieldSpec::new(
        "expected_hatch_date",
        Date,
        Optional,
        &["hatch_date", "due_hatch_date"],
    ),
];

static EGG_PACK_FIELDS: [FieldSpec; 9] = [
    FLOCK_NUMBER,
    FieldSpec::new(
        "pack_date",
        Date,
        Defaultable,
        &["date", "collection_date", "packing_date"],
    ),
    FieldSpec::new(
        "total_eggs",
        Count,
        Required,
        &["eggs_packed", "total", "total_packed"],
    ),
    FieldSpec::new("cracked", Count, Optional, &["cracks", "cracked_eggs"]),
    FieldSpec::new("dirty", Count, Optional, &["dirty_eggs", "dirties"]),
    FieldSpec::new("small", Count, Optional, &["small_eggs", "undersize"]),
    FieldSpec::new("double_yolk", Count, Optional, &["double_yolks", "dy"]),
    FieldSpec::new("floor_eggs", Count, Optional, &["floor"]),
    FieldSpec::new(
        "grade_a_percent",
        Percent,
        Optional,
        &["grade_a", "grade_a_pct"],
    ),
];

static FERTILITY_FIELDS: [FieldSpec; 12] = [
    FLOCK_NUMBER,
    SET_DATE,
    FieldSpec::new(
        "house_number",
        Identifier(EntityKind::House),
        Optional,
        &["house", "house_no"],
    ),
    SAMPLE_SIZE,
    FieldSpec::new("fertile", Count, Required, &["fertile_eggs", "fertiles"]),
    FieldSpec::new("infertile", Count, Optional, &["infertile_eggs", "infertiles"]),
    FieldSpec::new(
        "early_dead",
        Count,
        Optional,
        &["early_death", "early_embryonic_death", "ed"],
    ),
    FieldSpec::new("mid_dead", Count, Optional, &["mid_death", "md"]),
    FieldSpec::new("late_dead", Count, Optional, &["late_death", "ld"]),
    FieldSpec::new("pipped", Count, Optional, &["pip", "pipped_dead"]),
    FieldSpec::new(
        "fertility_percent",
        Percent,
        Optional,
        &["fertility", "fert_percent", "fertility_pct"],
    ),
    FieldSpec::new(
        "hatch_of_fertile_percent",
        Percent,
        Optional,
        &["hof", "hof_percent", "hatch_of_fertile"],
    ),
];

static RESIDUE_FIELDS: [FieldSpec; 11] = [
    FLOCK_NUMBER,
    SET_DATE,
    SAMPLE_SIZE,
    FieldSpec::new("infertile", Count, Optional, &["infertile_eggs", "infertiles"]),
    FieldSpec::new("early_dead", Count, Optional, &["early_death", "ed"]),
    FieldSpec::new("mid_dead", Count, Optional, &["mid_death", "md"]),
    FieldSpec::new("late_dead", Count, Optional, &["late_death", "ld"]),
    FieldSpec::new(
        "contaminated",
        Count,
        Required,
        &["contamination", "rots", "exploders"],
    ),
    FieldSpec::new("cull_chicks", Count, Optional, &["culls", "cull"]),
    FieldSpec::new(
        "malpositioned",
        Count,
        Optional,
        &["malposition", "malpositions"],
    ),
    FieldSpec::new("cracked", Count, Optional, &["cracked_shell", "cracks"]),
];

static QA_FIELDS: [FieldSpec; 9] = [
    FieldSpec::new(
        "machine_number",
        Identifier(EntityKind::Machine),
        Required,
        &["machine", "setter", "hatcher", "incubator"],
    ),
    FieldSpec::new(
        "check_date",
        Date,
        Defaultable,
        &["date", "qa_date", "monitoring_date"],
    ),
    FieldSpec::new(
        "qa_type",
        QaType,
        Required,
        &["check_type", "type", "qa_check", "monitoring_type"],
    ),
    FieldSpec::new(
        "temperature_f",
        Decimal,
        Optional,
        &["temperature", "temp", "temp_f"],
    ),
    FieldSpec::new(
        "humidity_percent",
        Percent,
        Optional,
        &["humidity", "rh", "rh_percent"],
    ),
    FieldSpec::new("eggs_candled", Count, Optional, &["candled"]),
    FieldSpec::new("clears_found", Count, Optional, &["clears"]),
    FieldSpec::new("swab_result", Text, Optional, &["swab", "result"]),
    FieldSpec::new(
        "checked_by",
        Text,
        Optional,
        &["inspector", "technician", "checked"],
    ),
];

static CLEARS_INJECTED_FIELDS: [FieldSpec; 8] = [
    FLOCK_NUMBER,
    FieldSpec::new(
        "batch_number",
        BatchNumber,
        Optional,
        &["batch", "batch_no", "batch_id"],
    ),
    SET_DATE,
    FieldSpec::new(
        "machine_number",
        Identifier(EntityKind::Machine),
        Optional,
        &["machine", "setter", "injector"],
    ),
    FieldSpec::new(
        "total_set",
        Count,
        Required,
        &["eggs_set", "total_eggs_set", "total"],
    ),
    FieldSpec::new("clears", Count, Required, &["clear_eggs", "clears_removed"]),
    FieldSpec::new(
        "injected",
        Count,
        Required,
        &["eggs_injected", "injected_eggs"],
    ),
    FieldSpec::new(
        "clear_percent",
        Percent,
        Optional,
        &["clears_percent", "clear_pct"],
    ),
];

static FLOCK_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::Flock,
    fields: &FLOCK_FIELDS,
    natural_key: &["flock_number"],
};

static HOUSE_BATCH_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::HouseBatch,
    fields: &HOUSE_BATCH_FIELDS,
    natural_key: &["batch_number", "set_date"],
};

static EGG_PACK_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::EggPackQuality,
    fields: &EGG_PACK_FIELDS,
    natural_key: &["flock_number", "pack_date"],
};

static FERTILITY_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::FertilityAnalysis,
    fields: &FERTILITY_FIELDS,
    natural_key: &["flock_number", "set_date"],
};

static RESIDUE_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::ResidueAnalysis,
    fields: &RESIDUE_FIELDS,
    natural_key: &["flock_number", "set_date"],
};

static QA_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::QaMonitoring,
    fields: &QA_FIELDS,
    natural_key: &["machine_number", "check_date", "qa_type"],
};

static CLEARS_INJECTED_SCHEMA: RecordSchema = RecordSchema {
    record_type: RecordType::ClearsInjected,
    fields: &CLEARS_INJECTED_FIELDS,
    natural_key: &["flock_number", "set_date", "batch_number"],
};

/// 获取记录类型的字段表
pub fn schema_for(record_type: RecordType) -> &'static RecordSchema {
    match record_type {
        RecordType::Flock => &FLOCK_SCHEMA,
        RecordType::HouseBatch => &HOUSE_BATCH_SCHEMA,
        RecordType::EggPackQuality => &EGG_PACK_SCHEMA,
        RecordType::FertilityAnalysis => &FERTILITY_SCHEMA,
        RecordType::ResidueAnalysis => &RESIDUE_SCHEMA,
        RecordType::QaMonitoring => &QA_SCHEMA,
        RecordType::ClearsInjected => &CLEARS_INJECTED_SCHEMA,
    }
}

/// 列名规范化: 去空白 / 小写 / % → percent / 标点与空白 → 下划线
///
/// "Fertility %" → "fertility_percent", " Flock No. " → "flock_no"
pub fn normalize_header(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase().replace('%', " percent ").replace('#', " number ");

    let mut out = String::with_capacity(lowered.len());
    let mut pending_sep = false;
    for c in lowered.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Fertility %"), "fertility_percent");
        assert_eq!(normalize_header(" Flock No. "), "flock_no");
        assert_eq!(normalize_header("SET-DATE"), "set_date");
        assert_eq!(normalize_header("Machine #"), "machine_number");
        assert_eq!(normalize_header("   "), "");
    }

    #[test]
    fn test_resolve_header_aliases() {
        let schema = schema_for(RecordType::FertilityAnalysis);
        assert_eq!(schema.resolve_header("fertile_eggs"), Some("fertile"));
        assert_eq!(schema.resolve_header("fertility"), Some("fertility_percent"));
        assert_eq!(schema.resolve_header("flock"), Some("flock_number"));
        assert_eq!(schema.resolve_header("colour"), None);
    }

    #[test]
    fn test_natural_key_fields_exist_in_schema() {
        for t in RecordType::ALL {
            let schema = schema_for(t);
            assert_eq!(schema.record_type, t);
            for key in schema.natural_key {
                assert!(schema.field(key).is_some(), "{t}: {key}");
            }
        }
    }
}
