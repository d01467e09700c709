// ==========================================
// 孵化场批量导入 - 行校验器 (RowValidator)
// ==========================================
// 职责: 按记录类型字段表逐行校验, 输出完整、顺序稳定的问题清单
// 规则: 必填 / 数值解析 / 范围 / 日期 / 标识格式 / 跨字段一致性 / 引用合理性 / 表内重复
// 红线: 纯函数, 不提前终止; 排序 = (行号, 字段位置, 规则顺序)
// 门禁: ReadySheet 只能经 ValidatedSheet::into_ready 构造, 存在 Error 的表不可导入
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::import::{ValidationIssue, ValidationSummary};
use crate::domain::record::{canonical_identifier, QaKind};
use crate::domain::sheet::{SheetData, SheetRow};
use crate::domain::types::{EntityKind, RecordType, Severity};
use crate::importer::error::{ImportError, PipelineResult};
use crate::importer::schema::{schema_for, FieldKind, RecordSchema, Requirement};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, instrument};

/// 标识符最大长度
const MAX_IDENTIFIER_LEN: usize = 32;

/// 填报受精率与计算值允许的偏差（百分点）
const FERTILITY_PERCENT_TOLERANCE: f64 = 1.0;

/// 孵化温度合理区间（华氏度）
const INCUBATION_TEMPERATURE_F: (f64, f64) = (95.0, 102.0);

// ==========================================
// ValidatedSheet - 已校验的工作表
// ==========================================
// 字段私有: 只能由 RowValidator::check_sheet 构造, 报告与门禁共用同一份问题清单
#[derive(Debug, Clone)]
pub struct ValidatedSheet {
    sheet: SheetData,
    record_type: RecordType,
    summary: ValidationSummary,
    issues: Vec<ValidationIssue>,
}

impl ValidatedSheet {
    pub fn sheet_name(&self) -> &str {
        &self.sheet.sheet_name
    }

    pub fn summary(&self) -> ValidationSummary {
        self.summary
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn is_blocking(&self) -> bool {
        self.summary.is_blocking()
    }

    /// 校验门禁: 无 Error 时放行为 ReadySheet
    pub fn into_ready(self) -> PipelineResult<ReadySheet> {
        if self.is_blocking() {
            return Err(ImportError::SheetBlocked {
                sheet: self.sheet.sheet_name,
                errors: self.summary.errors,
                warnings: self.summary.warnings,
            });
        }

        Ok(ReadySheet {
            sheet: self.sheet,
            record_type: self.record_type,
            summary: self.summary,
            warnings: self.issues,
        })
    }
}

// ==========================================
// ReadySheet - 通过校验门禁的工作表
// ==========================================
// 字段私有: 只能由 ValidatedSheet::into_ready 构造
#[derive(Debug, Clone)]
pub struct ReadySheet {
    sheet: SheetData,
    record_type: RecordType,
    summary: ValidationSummary,
    warnings: Vec<ValidationIssue>,
}

impl ReadySheet {
    pub fn sheet(&self) -> &SheetData {
        &self.sheet
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet.sheet_name
    }

    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn rows(&self) -> &[SheetRow] {
        &self.sheet.rows
    }

    pub fn summary(&self) -> ValidationSummary {
        self.summary
    }

    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }
}

// ==========================================
// RowValidator
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct RowValidator {
    known_flocks: Option<BTreeSet<String>>, // None = 不做鸡群引用检查
}

/// 单行校验时的问题收集器
struct RowIssues<'a> {
    row: &'a SheetRow,
    issues: Vec<ValidationIssue>,
}

impl<'a> RowIssues<'a> {
    fn push(&mut self, column: &str, severity: Severity, message: String, suggestion: Option<&str>) {
        self.issues.push(ValidationIssue {
            row: self.row.row_number,
            column: column.to_string(),
            value: self.row.get(column).clone(),
            severity,
            message,
            suggestion: suggestion.map(str::to_string),
        });
    }

    fn error(&mut self, column: &str, message: String, suggestion: Option<&str>) {
        self.push(column, Severity::Error, message, suggestion);
    }

    fn warning(&mut self, column: &str, message: String, suggestion: Option<&str>) {
        self.push(column, Severity::Warning, message, suggestion);
    }

    /// 字段的计数值（仅当字段合法时, 非法值已由字段规则报告）
    fn count(&self, field: &str) -> Option<f64> {
        self.row.get(field).as_f64().filter(|n| *n >= 0.0)
    }
}

impl RowValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 配置已知鸡群目录（启用鸡群引用合理性检查）
    pub fn with_known_flocks<I, S>(mut self, flocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_flocks = Some(
            flocks
                .into_iter()
                .map(|f| canonical_identifier(f.as_ref()))
                .collect(),
        );
        self
    }

    /// 追加已知鸡群（未配置目录时以追加内容为目录）
    pub fn extend_known_flocks<I, S>(mut self, flocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.known_flocks
            .get_or_insert_with(BTreeSet::new)
            .extend(flocks.into_iter().map(|f| canonical_identifier(f.as_ref())));
        self
    }

    /// 校验一组行
    ///
    /// 返回完整问题清单, 相同输入总是得到相同顺序的相同结果
    #[instrument(skip(self, rows), fields(rows = rows.len()))]
    pub fn validate(&self, rows: &[SheetRow], record_type: RecordType) -> Vec<ValidationIssue> {
        let schema = schema_for(record_type);
        let mut issues = Vec::new();
        let mut seen_keys: HashMap<String, usize> = HashMap::new();

        for row in rows {
            let mut acc = RowIssues {
                row,
                issues: Vec::new(),
            };

            for field in schema.fields {
                self.check_field(&mut acc, field.name, field.kind, field.requirement, record_type);
            }
            check_cross_fields(&mut acc, record_type);

            if let Some(key) = natural_key_text(row, schema) {
                if let Some(first_row) = seen_keys.get(&key) {
                    let column = schema.natural_key[0];
                    acc.warning(
                        column,
                        format!("与第 {} 行的自然键重复: {}", first_row, key),
                        Some("导入时按去重策略跳过或覆盖, 请确认是否为重复录入"),
                    );
                } else {
                    seen_keys.insert(key, row.row_number);
                }
            }

            issues.extend(acc.issues);
        }

        // 稳定排序: 同一行同一列内保持规则顺序
        issues.sort_by_key(|i| (i.row, schema.position(&i.column)));

        debug!(
            record_type = %record_type,
            errors = issues.iter().filter(|i| i.is_error()).count(),
            warnings = issues.iter().filter(|i| !i.is_error()).count(),
            "行校验完成"
        );
        issues
    }

    /// 校验整张工作表（未分类的表无法校验）
    pub fn validate_sheet(&self, sheet: &SheetData) -> PipelineResult<Vec<ValidationIssue>> {
        let record_type = sheet
            .record_type
            .ok_or_else(|| ImportError::SheetUnclassified {
                sheet: sheet.sheet_name.clone(),
            })?;
        Ok(self.validate(&sheet.rows, record_type))
    }

    /// 校验汇总（错误与警告分开计数）
    pub fn summarize(&self, sheet: &SheetData, issues: &[ValidationIssue]) -> ValidationSummary {
        ValidationSummary::from_issues(sheet.row_count(), issues)
    }

    /// 校验整张工作表并保留结果, 供报告与门禁共用
    pub fn check_sheet(&self, sheet: SheetData) -> PipelineResult<ValidatedSheet> {
        let record_type = sheet.record_type.ok_or_else(|| ImportError::SheetUnclassified {
            sheet: sheet.sheet_name.clone(),
        })?;
        let issues = self.validate(&sheet.rows, record_type);
        let summary = self.summarize(&sheet, &issues);

        Ok(ValidatedSheet {
            sheet,
            record_type,
            summary,
            issues,
        })
    }

    /// 校验门禁: 无 Error 时放行为 ReadySheet
    pub fn ready(&self, sheet: SheetData) -> PipelineResult<ReadySheet> {
        self.check_sheet(sheet)?.into_ready()
    }

    // ==========================================
    // 字段级规则
    // ==========================================

    fn check_field(
        &self,
        acc: &mut RowIssues<'_>,
        field: &str,
        kind: FieldKind,
        requirement: Requirement,
        record_type: RecordType,
    ) {
        let value = acc.row.get(field).clone();

        if value.is_empty() {
            match requirement {
                Requirement::Required => {
                    acc.error(field, format!("必填字段 {} 缺失", field), None);
                }
                Requirement::Defaultable => {
                    acc.warning(
                        field,
                        format!("字段 {} 缺失, 导入时将使用默认值", field),
                        Some("默认值优先级: 导入配置默认值 > 表头日期 > 全局默认"),
                    );
                }
                Requirement::Optional => {}
            }
            return;
        }

        match kind {
            FieldKind::Text => {}
            FieldKind::Identifier(entity) => {
                let text = value.as_text().unwrap_or_default();
                if !is_valid_identifier(&text) {
                    acc.error(
                        field,
                        format!("{} 格式非法: {}", field, text),
                        Some("标识仅允许字母、数字及 - _ / . 空格, 且不超过 32 个字符"),
                    );
                } else if entity == EntityKind::Flock && record_type != RecordType::Flock {
                    self.check_known_flock(acc, field, &text);
                }
            }
            FieldKind::BatchNumber => {
                let text = value.as_text().unwrap_or_default();
                if !is_valid_identifier(&text) {
                    acc.error(
                        field,
                        format!("批次号格式非法: {}", text),
                        Some("批次号仅允许字母、数字及 - _ / . 空格"),
                    );
                }
            }
            FieldKind::Count => match value.as_f64() {
                None => acc.error(field, format!("{} 不是有效数字: {}", field, value), None),
                Some(n) if n < 0.0 => {
                    acc.error(field, format!("{} 不能为负数: {}", field, value), None)
                }
                Some(n) if n.fract() != 0.0 => acc.warning(
                    field,
                    format!("{} 应为整数: {}", field, value),
                    Some("导入时将四舍五入为整数"),
                ),
                Some(_) => {}
            },
            FieldKind::Decimal => {
                if value.as_f64().is_none() {
                    acc.error(field, format!("{} 不是有效数字: {}", field, value), None);
                } else if field == "temperature_f" {
                    check_temperature(acc, field, &value);
                }
            }
            FieldKind::Percent => match value.as_f64() {
                None => acc.error(field, format!("{} 不是有效百分比: {}", field, value), None),
                Some(p) if !(0.0..=100.0).contains(&p) => acc.error(
                    field,
                    format!("{} 超出范围 [0, 100]: {}", field, value),
                    Some("检查是否误填为计数或多乘了 100"),
                ),
                Some(_) => {}
            },
            FieldKind::Date => {
                if value.as_date().is_none() {
                    acc.error(
                        field,
                        format!("{} 不是有效日期: {}", field, value),
                        Some("使用 YYYY-MM-DD 格式或 Excel 日期单元格"),
                    );
                }
            }
            FieldKind::QaType => {
                let text = value.as_text().unwrap_or_default();
                if QaKind::parse(&text).is_none() {
                    acc.error(
                        field,
                        format!("未知的 QA 类型: {}", text),
                        Some("可选: Temperature / Humidity / Candling / Sanitation"),
                    );
                }
            }
        }
    }

    fn check_known_flock(&self, acc: &mut RowIssues<'_>, field: &str, flock_number: &str) {
        let Some(known) = &self.known_flocks else {
            return;
        };
        if !known.contains(&canonical_identifier(flock_number)) {
            acc.warning(
                field,
                format!("鸡群 {} 不在已知鸡群目录中", flock_number),
                Some("先导入鸡群档案, 或在导入时启用自动创建缺失实体"),
            );
        }
    }
}

fn check_temperature(acc: &mut RowIssues<'_>, field: &str, value: &CellValue) {
    let (low, high) = INCUBATION_TEMPERATURE_F;
    if let Some(t) = value.as_f64() {
        if t < low || t > high {
            acc.warning(
                field,
                format!("温度 {}°F 超出常规孵化区间 [{}, {}]", t, low, high),
                Some("确认单位是否为华氏度"),
            );
        }
    }
}

// ==========================================
// 跨字段规则
// ==========================================

fn check_cross_fields(acc: &mut RowIssues<'_>, record_type: RecordType) {
    match record_type {
        RecordType::Flock => {}
        RecordType::HouseBatch => check_house_batch(acc),
        RecordType::EggPackQuality => check_egg_pack(acc),
        RecordType::FertilityAnalysis => check_fertility(acc),
        RecordType::ResidueAnalysis => check_residue(acc),
        RecordType::QaMonitoring => check_qa(acc),
        RecordType::ClearsInjected => check_clears_injected(acc),
    }
}

fn sum_counts(acc: &RowIssues<'_>, fields: &[&str]) -> f64 {
    fields.iter().filter_map(|f| acc.count(f)).sum()
}

fn check_house_batch(acc: &mut RowIssues<'_>) {
    let set = acc.row.get("set_date").as_date();
    let hatch = acc.row.get("expected_hatch_date").as_date();
    if let (Some(set), Some(hatch)) = (set, hatch) {
        if hatch <= set {
            acc.error(
                "expected_hatch_date",
                format!("预计出雏日期 {} 不晚于入孵日期 {}", hatch, set),
                None,
            );
        }
    }
}

fn check_egg_pack(acc: &mut RowIssues<'_>) {
    let Some(total) = acc.count("total_eggs") else {
        return;
    };
    let defects = sum_counts(acc, &["cracked", "dirty", "small", "double_yolk", "floor_eggs"]);
    if defects > total {
        acc.error(
            "total_eggs",
            format!("次品合计 {} 超过总蛋数 {}", defects, total),
            None,
        );
    }
}

fn check_fertility(acc: &mut RowIssues<'_>) {
    let Some(fertile) = acc.count("fertile") else {
        return;
    };
    let sample = acc.count("sample_size");

    if let Some(sample) = sample {
        if fertile > sample {
            acc.error(
                "fertile",
                format!("受精蛋数 {} 超过样本数 {}", fertile, sample),
                None,
            );
        } else if let Some(infertile) = acc.count("infertile") {
            if fertile + infertile != sample {
                acc.warning(
                    "infertile",
                    format!(
                        "受精 {} + 无精 {} 与样本数 {} 不一致",
                        fertile, infertile, sample
                    ),
                    Some("确认样本数或各分类计数"),
                );
            }
        }
    }

    let dead = sum_counts(acc, &["early_dead", "mid_dead", "late_dead", "pipped"]);
    if dead > fertile {
        acc.error(
            "early_dead",
            format!("死胚合计 {} 超过受精蛋数 {}", dead, fertile),
            None,
        );
    }

    let stated = acc
        .row
        .get("fertility_percent")
        .as_f64()
        .filter(|p| (0.0..=100.0).contains(p));
    if let (Some(stated), Some(sample)) = (stated, sample.filter(|s| *s > 0.0)) {
        let computed = fertile / sample * 100.0;
        if fertile <= sample && (stated - computed).abs() > FERTILITY_PERCENT_TOLERANCE {
            acc.warning(
                "fertility_percent",
                format!("填报受精率 {}% 与计算值 {:.1}% 不一致", stated, computed),
                Some("以受精蛋数 / 样本数为准"),
            );
        }
    }
}

fn check_residue(acc: &mut RowIssues<'_>) {
    let Some(sample) = acc.count("sample_size") else {
        return;
    };
    let categories = sum_counts(
        acc,
        &[
            "infertile",
            "early_dead",
            "mid_dead",
            "late_dead",
            "contaminated",
            "cull_chicks",
            "malpositioned",
            "cracked",
        ],
    );
    if categories > sample {
        acc.error(
            "sample_size",
            format!("残蛋分类合计 {} 超过样本数 {}", categories, sample),
            None,
        );
    }
}

fn check_qa(acc: &mut RowIssues<'_>) {
    let Some(kind) = acc
        .row
        .get("qa_type")
        .as_text()
        .and_then(|t| QaKind::parse(&t))
    else {
        return;
    };

    for field in kind.required_fields() {
        if !acc.row.has_value(field) {
            acc.error(
                field,
                format!("QA 类型 {} 需要字段 {}", kind.code(), field),
                None,
            );
        }
    }

    if kind == QaKind::Candling {
        if let (Some(candled), Some(clears)) = (acc.count("eggs_candled"), acc.count("clears_found")) {
            if clears > candled {
                acc.error(
                    "clears_found",
                    format!("无精蛋数 {} 超过照蛋数 {}", clears, candled),
                    None,
                );
            }
        }
    }
}

fn check_clears_injected(acc: &mut RowIssues<'_>) {
    let Some(total) = acc.count("total_set") else {
        return;
    };
    let injected = acc.count("injected");
    let clears = acc.count("clears");

    if let Some(injected) = injected {
        if injected > total {
            acc.error(
                "injected",
                format!("注射数 {} 超过入孵总数 {}", injected, total),
                None,
            );
            return;
        }
        if let Some(clears) = clears {
            if clears + injected > total {
                acc.error(
                    "clears",
                    format!("照出无精 {} + 注射 {} 超过入孵总数 {}", clears, injected, total),
                    None,
                );
            }
        }
    }
}

// ==========================================
// 辅助函数
// ==========================================

/// 标识符格式: 首字符为字母/数字, 其余允许 - _ / . 空格
fn is_valid_identifier(text: &str) -> bool {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() => {}
        _ => return false,
    }
    trimmed.chars().count() <= MAX_IDENTIFIER_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.' | ' '))
}

/// 行的自然键文本（必填分量缺失或非法时返回 None）
fn natural_key_text(row: &SheetRow, schema: &RecordSchema) -> Option<String> {
    let mut parts = Vec::with_capacity(schema.natural_key.len());
    for name in schema.natural_key {
        let field = schema.field(name)?;
        let value = row.get(name);
        let part = match field.kind {
            FieldKind::Date if value.is_empty() => String::new(),
            FieldKind::Date => value.as_date()?.format("%Y-%m-%d").to_string(),
            FieldKind::QaType => QaKind::parse(&value.as_text()?)?.code().to_string(),
            _ => match value.as_text() {
                Some(text) => canonical_identifier(&text),
                None if field.requirement == Requirement::Required => return None,
                None => String::new(),
            },
        };
        parts.push(part);
    }
    Some(parts.join("|"))
}
