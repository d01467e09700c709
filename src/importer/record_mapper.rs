// ==========================================
// 孵化场批量导入 - 记录映射器
// ==========================================
// 职责: 校验通过的行 + 默认值链 → 类型化 RecordPayload
// 默认值优先级（仅作用于缺失字段）:
//   行内值 > ImportConfig.default_values > 工作表日期上下文 > 全局默认
//   日期上下文与全局默认只补齐 Defaultable 字段
// ==========================================

use crate::domain::cell::CellValue;
use crate::domain::record::{
    canonical_identifier, ClearsInjectedRecord, EggPackRecord, FertilityRecord, FlockRecord, HouseBatchRecord,
    QaDetail, QaKind, QaRecord, RecordPayload, ResidueRecord,
};
use crate::domain::sheet::{DateContext, SheetRow};
use crate::domain::types::RecordType;
use crate::importer::error::{ImportError, PipelineResult};
use crate::importer::schema::{schema_for, FieldKind, RecordSchema, Requirement};
use chrono::NaiveDate;
use std::collections::BTreeMap;

// ==========================================
// DefaultsChain - 默认值链
// ==========================================
#[derive(Debug, Clone)]
pub struct DefaultsChain<'a> {
    pub config_defaults: &'a BTreeMap<String, CellValue>,
    pub date_context: Option<&'a DateContext>,
    pub reference_date: NaiveDate,
    pub sample_size: i64,
}

// ==========================================
// RecordMapper
// ==========================================
pub struct RecordMapper<'a> {
    schema: &'static RecordSchema,
    defaults: DefaultsChain<'a>,
}

/// 单行映射上下文
struct RowReader<'m, 'a> {
    mapper: &'m RecordMapper<'a>,
    row: &'m SheetRow,
}

impl<'a> RecordMapper<'a> {
    pub fn new(record_type: RecordType, defaults: DefaultsChain<'a>) -> Self {
        Self {
            schema: schema_for(record_type),
            defaults,
        }
    }

    /// 行 → 记录载荷
    pub fn map_row(&self, row: &SheetRow) -> PipelineResult<RecordPayload> {
        let r = RowReader { mapper: self, row };

        let payload = match self.schema.record_type {
            RecordType::Flock => RecordPayload::Flock(FlockRecord {
                flock_number: r.req_text("flock_number")?,
                flock_name: r.text("flock_name"),
                breed: r.text("breed"),
                house_number: r.text("house_number"),
                hatch_date: r.date("hatch_date")?,
                age_weeks: r.count("age_weeks")?,
                hen_count: r.count("hen_count")?,
                rooster_count: r.count("rooster_count")?,
            }),
            RecordType::HouseBatch => RecordPayload::HouseBatch(HouseBatchRecord {
                batch_number: r.req_text("batch_number")?,
                flock_number: r.req_text("flock_number")?,
                house_number: r.req_text("house_number")?,
                set_date: r.req_date("set_date")?,
                machine_number: r.text("machine_number"),
                eggs_set: r.req_count("eggs_set")?,
                expected_hatch_date: r.date("expected_hatch_date")?,
            }),
            RecordType::EggPackQuality => RecordPayload::EggPackQuality(EggPackRecord {
                flock_number: r.req_text("flock_number")?,
                pack_date: r.req_date("pack_date")?,
                total_eggs: r.req_count("total_eggs")?,
                cracked: r.count("cracked")?,
                dirty: r.count("dirty")?,
                small: r.count("small")?,
                double_yolk: r.count("double_yolk")?,
                floor_eggs: r.count("floor_eggs")?,
                grade_a_percent: r.decimal("grade_a_percent")?,
            }),
            RecordType::FertilityAnalysis => RecordPayload::FertilityAnalysis(FertilityRecord {
                flock_number: r.req_text("flock_number")?,
                set_date: r.req_date("set_date")?,
                house_number: r.text("house_number"),
                sample_size: r.req_count("sample_size")?,
                fertile: r.req_count("fertile")?,
                infertile: r.count("infertile")?,
                early_dead: r.count("early_dead")?,
                mid_dead: r.count("mid_dead")?,
                late_dead: r.count("late_dead")?,
                pipped: r.count("pipped")?,
                fertility_percent: r.decimal("fertility_percent")?,
                hatch_of_fertile_percent: r.decimal("hatch_of_fertile_percent")?,
            }),
            RecordType::ResidueAnalysis => RecordPayload::ResidueAnalysis(ResidueRecord {
                flock_number: r.req_text("flock_number")?,
                set_date: r.req_date("set_date")?,
                sample_size: r.req_count("sample_size")?,
                infertile: r.count("infertile")?,
                early_dead: r.count("early_dead")?,
                mid_dead: r.count("mid_dead")?,
                late_dead: r.count("late_dead")?,
                contaminated: r.req_count("contaminated")?,
                cull_chicks: r.count("cull_chicks")?,
                malpositioned: r.count("malpositioned")?,
                cracked: r.count("cracked")?,
            }),
            RecordType::QaMonitoring => RecordPayload::QaMonitoring(QaRecord {
                machine_number: r.req_text("machine_number")?,
                check_date: r.req_date("check_date")?,
                checked_by: r.text("checked_by"),
                detail: r.qa_detail()?,
            }),
            RecordType::ClearsInjected => RecordPayload::ClearsInjected(ClearsInjectedRecord {
                flock_number: r.req_text("flock_number")?,
                batch_number: r.text("batch_number"),
                set_date: r.req_date("set_date")?,
                machine_number: r.text("machine_number"),
                total_set: r.req_count("total_set")?,
                clears: r.req_count("clears")?,
                injected: r.req_count("injected")?,
                clear_percent: r.decimal("clear_percent")?,
            }),
        };

        Ok(payload)
    }

    /// 按优先级解析字段值
    fn resolve(&self, row: &SheetRow, field: &str) -> CellValue {
        let own = row.get(field);
        if !own.is_empty() {
            return own.clone();
        }
        if let Some(v) = self.defaults.config_defaults.get(field).filter(|v| !v.is_empty()) {
            return v.clone();
        }

        let Some(spec) = self.schema.field(field) else {
            return CellValue::Empty;
        };
        if spec.requirement != Requirement::Defaultable {
            return CellValue::Empty;
        }

        match spec.kind {
            FieldKind::Date => self
                .defaults
                .date_context
                .and_then(|ctx| ctx.date_for(field))
                .map(CellValue::Date)
                .unwrap_or(CellValue::Date(self.defaults.reference_date)),
            FieldKind::Count if field == "sample_size" => {
                CellValue::Number(self.defaults.sample_size as f64)
            }
            _ => CellValue::Empty,
        }
    }
}

impl<'m, 'a> RowReader<'m, 'a> {
    fn value(&self, field: &str) -> CellValue {
        self.mapper.resolve(self.row, field)
    }

    fn fail(&self, field: &str, message: String) -> ImportError {
        ImportError::RowMappingError {
            row: self.row.row_number,
            field: field.to_string(),
            message,
        }
    }

    fn missing(&self, field: &str) -> ImportError {
        self.fail(field, "缺少值且无可用默认值".to_string())
    }

    /// 文本字段; 标识类字段（鸡群/鸡舍/机器/批次号）转为规范形式
    fn text(&self, field: &str) -> Option<String> {
        let text = self.value(field).as_text()?;
        let is_identifier = self.mapper.schema.field(field).is_some_and(|f| {
            matches!(f.kind, FieldKind::Identifier(_) | FieldKind::BatchNumber)
        });
        Some(if is_identifier {
            canonical_identifier(&text)
        } else {
            text
        })
    }

    fn req_text(&self, field: &str) -> PipelineResult<String> {
        self.text(field).ok_or_else(|| self.missing(field))
    }

    fn count(&self, field: &str) -> PipelineResult<Option<i64>> {
        let value = self.value(field);
        if value.is_empty() {
            return Ok(None);
        }
        match value.as_f64() {
            Some(n) if n >= 0.0 => Ok(Some(n.round() as i64)),
            _ => Err(self.fail(field, format!("不是有效计数: {}", value))),
        }
    }

    fn req_count(&self, field: &str) -> PipelineResult<i64> {
        self.count(field)?.ok_or_else(|| self.missing(field))
    }

    fn decimal(&self, field: &str) -> PipelineResult<Option<f64>> {
        let value = self.value(field);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .as_f64()
            .map(Some)
            .ok_or_else(|| self.fail(field, format!("不是有效数字: {}", value)))
    }

    fn req_decimal(&self, field: &str) -> PipelineResult<f64> {
        self.decimal(field)?.ok_or_else(|| self.missing(field))
    }

    fn date(&self, field: &str) -> PipelineResult<Option<NaiveDate>> {
        let value = self.value(field);
        if value.is_empty() {
            return Ok(None);
        }
        value
            .as_date()
            .map(Some)
            .ok_or_else(|| self.fail(field, format!("不是有效日期: {}", value)))
    }

    fn req_date(&self, field: &str) -> PipelineResult<NaiveDate> {
        self.date(field)?.ok_or_else(|| self.missing(field))
    }

    fn qa_detail(&self) -> PipelineResult<QaDetail> {
        let raw = self.req_text("qa_type")?;
        let kind = QaKind::parse(&raw)
            .ok_or_else(|| self.fail("qa_type", format!("未知的 QA 类型: {}", raw)))?;

        Ok(match kind {
            QaKind::Temperature => QaDetail::Temperature {
                temperature_f: self.req_decimal("temperature_f")?,
            },
            QaKind::Humidity => QaDetail::Humidity {
                humidity_percent: self.req_decimal("humidity_percent")?,
            },
            QaKind::Candling => QaDetail::Candling {
                eggs_candled: self.req_count("eggs_candled")?,
                clears_found: self.req_count("clears_found")?,
            },
            QaKind::Sanitation => QaDetail::Sanitation {
                swab_result: self.req_text("swab_result")?,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn chain<'a>(
        config_defaults: &'a BTreeMap<String, CellValue>,
        date_context: Option<&'a DateContext>,
    ) -> DefaultsChain<'a> {
        DefaultsChain {
            config_defaults,
            date_context,
            reference_date: date(2024, 1, 1),
            sample_size: 300,
        }
    }

    #[test]
    fn test_default_precedence_for_dates() {
        let mut ctx = DateContext::default();
        ctx.record(Some("set_date"), date(2024, 3, 1));
        let mut config_defaults = BTreeMap::new();

        let row = SheetRow::new(1).with("flock_number", "F101").with("fertile", 90.0);

        // 表头日期 > 全局默认
        let mapper = RecordMapper::new(
            RecordType::FertilityAnalysis,
            chain(&config_defaults, Some(&ctx)),
        );
        let RecordPayload::FertilityAnalysis(rec) = mapper.map_row(&row).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(rec.set_date, date(2024, 3, 1));
        assert_eq!(rec.sample_size, 300);

        // 配置默认值 > 表头日期
        config_defaults.insert("set_date".to_string(), CellValue::text("2024-02-15"));
        config_defaults.insert("sample_size".to_string(), CellValue::Number(150.0));
        let mapper = RecordMapper::new(
            RecordType::FertilityAnalysis,
            chain(&config_defaults, Some(&ctx)),
        );
        let RecordPayload::FertilityAnalysis(rec) = mapper.map_row(&row).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(rec.set_date, date(2024, 2, 15));
        assert_eq!(rec.sample_size, 150);

        // 行内值 > 一切默认
        let row = row.with("set_date", date(2024, 4, 9));
        let RecordPayload::FertilityAnalysis(rec) = mapper.map_row(&row).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(rec.set_date, date(2024, 4, 9));
    }

    #[test]
    fn test_reference_date_is_last_resort() {
        let config_defaults = BTreeMap::new();
        let mapper = RecordMapper::new(RecordType::EggPackQuality, chain(&config_defaults, None));
        let row = SheetRow::new(1).with("flock_number", "F101").with("total_eggs", 1000.0);
        let RecordPayload::EggPackQuality(rec) = mapper.map_row(&row).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(rec.pack_date, date(2024, 1, 1));
        assert_eq!(rec.cracked, None);
    }

    #[test]
    fn test_qa_detail_variant() {
        let config_defaults = BTreeMap::new();
        let mapper = RecordMapper::new(RecordType::QaMonitoring, chain(&config_defaults, None));
        let row = SheetRow::new(7)
            .with("machine_number", 12.0)
            .with("check_date", "2024-03-01")
            .with("qa_type", "temp")
            .with("temperature_f", "99.5");
        let payload = mapper.map_row(&row).unwrap();
        match payload {
            RecordPayload::QaMonitoring(rec) => {
                assert_eq!(rec.machine_number, "12");
                assert_eq!(rec.detail, QaDetail::Temperature { temperature_f: 99.5 });
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_missing_required_is_row_error() {
        let config_defaults = BTreeMap::new();
        let mapper = RecordMapper::new(RecordType::QaMonitoring, chain(&config_defaults, None));
        let row = SheetRow::new(5)
            .with("machine_number", "S01")
            .with("qa_type", "Sanitation");
        let err = mapper.map_row(&row).unwrap_err();
        match err {
            ImportError::RowMappingError { row, field, .. } => {
                assert_eq!(row, 5);
                assert_eq!(field, "swab_result");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
