// ==========================================
// 孵化场批量导入 - 单元格值
// ==========================================
// 职责: 工作簿单元格的统一表示 + 宽松类型转换
// 说明: 源文件不可信, 数值常以文本形式出现 ("1,234" / "87.5%")
// ==========================================

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Excel 1900 日期系统的序列号基准日
const EXCEL_EPOCH: (i32, u32, u32) = (1899, 12, 30);

/// 视为日期序列号的数值范围（约 1954 ~ 2119 年）
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 20_000.0..=80_000.0;

/// 文本日期可接受格式（按优先级）
const DATE_FORMATS: [&str; 9] = [
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%b %d, %Y",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CellValue {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    Date(NaiveDate),
}

impl CellValue {
    /// 文本构造（空白文本归一为 Empty）
    pub fn text(value: impl Into<String>) -> Self {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 数值读取（容忍千分位、百分号、前后空白）
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) if n.is_finite() => Some(*n),
            CellValue::Text(s) => parse_numeric_text(s),
            _ => None,
        }
    }

    /// 整数读取（仅当数值无小数部分）
    pub fn as_i64(&self) -> Option<i64> {
        self.as_f64()
            .filter(|n| n.fract() == 0.0 && n.abs() < 1e15)
            .map(|n| n as i64)
    }

    /// 日期读取（日期单元格 / 文本日期 / Excel 序列号）
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => parse_date_text(s),
            CellValue::Number(n) => excel_serial_to_date(*n),
            _ => None,
        }
    }

    /// 文本读取（数值按展示格式转为文本, 如 "42" 而非 "42.0"）
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Empty => None,
            CellValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            other => Some(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::text(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Number(value as f64)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        CellValue::Date(value)
    }
}

/// 解析数值文本: " 1,234 " → 1234, "87.5%" → 87.5
pub fn parse_numeric_text(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// 解析文本日期（也接受带时间部分的 ISO 文本, 如 "2024-03-01T00:00:00"）
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let date_part = trimmed
        .split(['T', ' '])
        .next()
        .filter(|p| p.len() >= 8 && p.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .unwrap_or(trimmed);

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(date_part, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        })
}

/// Excel 序列号 → 日期（仅在合理范围内）
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    let (y, m, d) = EXCEL_EPOCH;
    NaiveDate::from_ymd_opt(y, m, d)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.floor() as i64)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_text_coercion() {
        assert_eq!(CellValue::text(" 1,234 ").as_f64(), Some(1234.0));
        assert_eq!(CellValue::text("87.5%").as_f64(), Some(87.5));
        assert_eq!(CellValue::text("abc").as_f64(), None);
        assert_eq!(CellValue::Empty.as_f64(), None);
    }

    #[test]
    fn test_integer_requires_whole_number() {
        assert_eq!(CellValue::Number(12.0).as_i64(), Some(12));
        assert_eq!(CellValue::Number(12.5).as_i64(), None);
        assert_eq!(CellValue::text("300").as_i64(), Some(300));
    }

    #[test]
    fn test_date_parsing_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(CellValue::text("2024-03-01").as_date(), Some(expected));
        assert_eq!(CellValue::text("20240301").as_date(), Some(expected));
        assert_eq!(CellValue::text("01/03/2024").as_date(), Some(expected));
        assert_eq!(CellValue::text("2024-03-01T00:00:00").as_date(), Some(expected));
        assert_eq!(CellValue::text("2024-03-01 08:30:00").as_date(), Some(expected));
        assert_eq!(CellValue::Number(45352.0).as_date(), Some(expected));
        assert_eq!(CellValue::Number(12.0).as_date(), None);
    }

    #[test]
    fn test_display_formats_whole_numbers() {
        assert_eq!(CellValue::Number(42.0).to_string(), "42");
        assert_eq!(CellValue::Number(42.5).to_string(), "42.5");
        assert_eq!(CellValue::Number(42.0).as_text(), Some("42".to_string()));
        assert!(CellValue::text("   ").is_empty());
    }
}
