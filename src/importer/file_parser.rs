// ==========================================
// 孵化场批量导入 - 工作簿解析器 (SheetParser)
// ==========================================
// 阶段 0: 文件读取 → 表头定位 → 记录类型判定 → 字段映射 → 日期上下文
// 支持: Excel (.xlsx/.xlsm/.xls/.xlsb) / ODS / CSV（单表, 以文件名为表名）
// 红线: 只读文件, 不做任何持久化; 行号为源表数据行位置（空行占号）
// ==========================================

use crate::domain::cell::{parse_date_text, CellValue};
use crate::domain::sheet::{Classification, DateContext, SheetData, SheetRow};
use crate::domain::types::RecordType;
use crate::importer::error::{ImportError, PipelineResult};
use crate::importer::schema::{normalize_header, schema_for, FieldKind, Requirement};
use calamine::{open_workbook_auto, Data, Dimensions, Reader, Sheets};
use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use std::fs::File;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// 表头候选行扫描范围（表头上方允许若干说明行）
const HEADER_SCAN_ROWS: usize = 15;

/// 判定为某记录类型的最低得分
const MIN_CLASSIFICATION_SCORE: u32 = 3;

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// 原始网格（按行, 未定位表头）
type Grid = Vec<Vec<CellValue>>;

// ==========================================
// SheetParser
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct SheetParser;

impl SheetParser {
    pub fn new() -> Self {
        Self
    }

    /// 解析工作簿文件, 返回按源顺序排列的工作表
    ///
    /// # 错误
    /// 文件不存在 / 扩展名不支持 / 容器无法读取 / 无工作表 → ImportError（整次运行终止）
    #[instrument(skip(self), fields(path = %path.as_ref().display()))]
    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> PipelineResult<Vec<SheetData>> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ImportError::FileNotFound(path.display().to_string()));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        let grids = match ext.as_str() {
            "csv" => vec![(file_stem(path), read_csv_grid(path)?)],
            e if WORKBOOK_EXTENSIONS.contains(&e) => read_workbook_grids(path)?,
            _ => return Err(ImportError::UnsupportedFormat(ext)),
        };

        if grids.is_empty() {
            return Err(ImportError::EmptyWorkbook(path.display().to_string()));
        }

        let sheets: Vec<SheetData> = grids
            .into_iter()
            .map(|(name, grid)| self.parse_grid(&name, grid))
            .collect();

        info!(
            sheets = sheets.len(),
            classified = sheets.iter().filter(|s| s.record_type.is_some()).count(),
            "工作簿解析完成"
        );
        Ok(sheets)
    }

    /// 解析单个工作表网格（与文件格式无关）
    pub fn parse_grid(&self, sheet_name: &str, grid: Grid) -> SheetData {
        let Some(header_idx) = locate_header_row(&grid) else {
            warn!(sheet = sheet_name, "未找到表头行");
            return SheetData {
                sheet_name: sheet_name.to_string(),
                record_type: None,
                classification: Classification::Unrecognized,
                headers: Vec::new(),
                rows: Vec::new(),
                date_context: None,
            };
        };

        // 表头: (列号, 规范化列名), 空表头列（尾部空列等）丢弃
        let raw_headers: Vec<(usize, String)> = grid[header_idx]
            .iter()
            .enumerate()
            .filter_map(|(col, cell)| {
                cell.as_text()
                    .map(|t| normalize_header(&t))
                    .filter(|h| !h.is_empty())
                    .map(|h| (col, h))
            })
            .collect();

        let normalized: Vec<&str> = raw_headers.iter().map(|(_, h)| h.as_str()).collect();
        let classification = classify_headers(&normalized);
        let record_type = classification.record_type();

        // 映射为标准字段名; 同一字段重复出现时首列生效
        let mut headers: Vec<String> = Vec::with_capacity(raw_headers.len());
        let mut columns: Vec<(usize, String)> = Vec::with_capacity(raw_headers.len());
        for (col, header) in &raw_headers {
            let field = record_type
                .and_then(|t| schema_for(t).resolve_header(header))
                .map(str::to_string)
                .unwrap_or_else(|| header.clone());
            if headers.contains(&field) {
                debug!(sheet = sheet_name, field = %field, "重复列忽略");
                continue;
            }
            headers.push(field.clone());
            columns.push((*col, field));
        }

        let mut rows = Vec::new();
        for (offset, source_row) in grid.iter().skip(header_idx + 1).enumerate() {
            let mut row = SheetRow::new(offset + 1);
            for (col, field) in &columns {
                if let Some(cell) = source_row.get(*col) {
                    if !cell.is_empty() {
                        row.cells.insert(field.clone(), cell.clone());
                    }
                }
            }
            if !row.is_blank() {
                rows.push(row);
            }
        }

        let date_context = infer_date_context(sheet_name, &grid[..header_idx]);

        debug!(
            sheet = sheet_name,
            header_row = header_idx + 1,
            rows = rows.len(),
            classification = ?classification,
            "工作表解析完成"
        );

        SheetData {
            sheet_name: sheet_name.to_string(),
            record_type,
            classification,
            headers,
            rows,
            date_context: None,
        }
        .with_date_context(date_context)
    }
}

// ==========================================
// 文件读取
// ==========================================

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Sheet1".to_string())
}

fn read_csv_grid(path: &Path) -> PipelineResult<Grid> {
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // 允许行长度不一致
        .from_reader(file);

    let mut grid = Vec::new();
    for result in reader.records() {
        let record = result?;
        grid.push(record.iter().map(CellValue::text).collect());
    }
    Ok(grid)
}

fn read_workbook_grids(path: &Path) -> PipelineResult<Vec<(String, Grid)>> {
    let mut workbook = open_workbook_auto(path)?;
    // 合并区域目前仅 xlsx 可读
    if let Sheets::Xlsx(xlsx) = &mut workbook {
        xlsx.load_merged_regions().map_err(calamine::Error::from)?;
    }
    let sheet_names = workbook.sheet_names().to_vec();

    let mut grids = Vec::with_capacity(sheet_names.len());
    for name in sheet_names {
        let range = workbook.worksheet_range(&name)?;
        let mut grid: Grid = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();

        if let Sheets::Xlsx(xlsx) = &workbook {
            let regions: Vec<Dimensions> = xlsx
                .merged_regions_by_sheet(&name)
                .into_iter()
                .map(|(_, _, region)| *region)
                .collect();
            if !regions.is_empty() {
                debug!(sheet = %name, regions = regions.len(), "填充合并单元格");
                fill_merged_regions(&mut grid, range.start().unwrap_or((0, 0)), &regions);
            }
        }
        grids.push((name, grid));
    }
    Ok(grids)
}

/// 合并区域内的空单元格填入左上角的值
///
/// `origin` 为网格左上角在工作表中的绝对位置 (row, col)
fn fill_merged_regions(grid: &mut Grid, origin: (u32, u32), regions: &[Dimensions]) {
    let to_local = |(row, col): (u32, u32)| -> Option<(usize, usize)> {
        Some((
            row.checked_sub(origin.0)? as usize,
            col.checked_sub(origin.1)? as usize,
        ))
    };

    for region in regions {
        let (Some((top, left)), Some((bottom, right))) =
            (to_local(region.start), to_local(region.end))
        else {
            continue;
        };
        let Some(value) = grid.get(top).and_then(|r| r.get(left)).cloned() else {
            continue;
        };
        if value.is_empty() {
            continue;
        }

        for row in grid.iter_mut().take(bottom + 1).skip(top) {
            if row.len() <= right {
                row.resize(right + 1, CellValue::Empty);
            }
            for cell in &mut row[left..=right] {
                if cell.is_empty() {
                    *cell = value.clone();
                }
            }
        }
    }
}

/// calamine 单元格 → CellValue
fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::text(s.as_str()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => {
            let serial = dt.as_f64();
            serial_date(serial)
                .map(CellValue::Date)
                .unwrap_or(CellValue::Number(serial))
        }
        Data::DateTimeIso(s) => parse_date_text(s)
            .map(CellValue::Date)
            .unwrap_or_else(|| CellValue::text(s.as_str())),
        Data::DurationIso(s) => CellValue::text(s.as_str()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// 日期格式单元格的序列号（1900 日期系统）
fn serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|epoch| epoch.checked_add_signed(Duration::days(serial.floor() as i64)))
}

// ==========================================
// 表头定位
// ==========================================

/// 在前若干行中选取命中标准字段最多的行作为表头
///
/// 无任何命中时退化为首个含 ≥2 个非空文本单元格的行
fn locate_header_row(grid: &Grid) -> Option<usize> {
    let mut best: Option<(usize, usize)> = None; // (row, hits)
    let mut first_textual: Option<usize> = None;

    for (idx, row) in grid.iter().take(HEADER_SCAN_ROWS).enumerate() {
        let texts: Vec<String> = row
            .iter()
            .filter(|c| matches!(c, CellValue::Text(_)))
            .filter_map(CellValue::as_text)
            .map(|t| normalize_header(&t))
            .filter(|h| !h.is_empty())
            .collect();
        if texts.len() < 2 {
            continue;
        }
        first_textual.get_or_insert(idx);

        let hits = texts
            .iter()
            .filter(|h| {
                RecordType::ALL
                    .iter()
                    .any(|t| schema_for(*t).resolve_header(h).is_some())
            })
            .count();
        if hits >= 2 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((idx, hits));
        }
    }

    best.map(|(idx, _)| idx).or(first_textual)
}

// ==========================================
// 记录类型判定
// ==========================================

/// 表头集合对各 schema 打分: 2 × 必填命中 + 其余命中
pub fn classify_headers(headers: &[&str]) -> Classification {
    let mut scored: Vec<(RecordType, u32)> = Vec::new();

    for record_type in RecordType::ALL {
        let schema = schema_for(record_type);
        let mut required_hits = 0u32;
        let mut other_hits = 0u32;
        for field in schema.fields {
            if headers.iter().any(|h| field.matches(h)) {
                if field.requirement == Requirement::Required {
                    required_hits += 1;
                } else {
                    other_hits += 1;
                }
            }
        }
        let score = 2 * required_hits + other_hits;
        if required_hits >= 1 && score >= MIN_CLASSIFICATION_SCORE {
            scored.push((record_type, score));
        }
    }

    let Some(best) = scored.iter().map(|(_, s)| *s).max() else {
        return Classification::Unrecognized;
    };
    let candidates: Vec<RecordType> = scored
        .iter()
        .filter(|(_, s)| *s == best)
        .map(|(t, _)| *t)
        .collect();

    match candidates.as_slice() {
        [only] => Classification::Matched {
            record_type: *only,
            score: best,
        },
        _ => Classification::Ambiguous {
            candidates,
            score: best,
        },
    }
}

// ==========================================
// 日期上下文
// ==========================================

/// 扫描表头上方说明行与表名, 提取锚定日期
fn infer_date_context(sheet_name: &str, preamble: &[Vec<CellValue>]) -> DateContext {
    let mut ctx = DateContext::default();

    for row in preamble {
        let cells: Vec<&CellValue> = row.iter().filter(|c| !c.is_empty()).collect();
        let mut i = 0;
        while i < cells.len() {
            let cell = cells[i];
            if let CellValue::Date(d) = cell {
                ctx.record(None, *d);
                i += 1;
                continue;
            }
            let Some(text) = cell.as_text() else {
                i += 1;
                continue;
            };

            // "Set Date: 2024-03-01"（单元格内标签 + 日期）
            if let Some((label, rest)) = text.split_once(':') {
                if let Some(d) = parse_date_text(rest) {
                    ctx.record(Some(canonical_date_label(label).as_str()), d);
                    i += 1;
                    continue;
                }
            }
            if let Some(d) = parse_date_text(&text) {
                ctx.record(None, d);
                i += 1;
                continue;
            }
            // 标签单元格 + 相邻日期单元格
            if let Some(d) = cells.get(i + 1).and_then(|next| preamble_date(next)) {
                ctx.record(Some(canonical_date_label(&text).as_str()), d);
                i += 2;
                continue;
            }
            i += 1;
        }
    }

    if let Some(d) = date_in_name(sheet_name) {
        ctx.record(None, d);
    }
    ctx
}

fn preamble_date(cell: &CellValue) -> Option<NaiveDate> {
    match cell {
        CellValue::Date(d) => Some(*d),
        CellValue::Text(s) => parse_date_text(s),
        _ => None,
    }
}

/// 标签 → 标准日期字段名（无法识别时保留规范化标签）
fn canonical_date_label(label: &str) -> String {
    let normalized = normalize_header(label);
    RecordType::ALL
        .iter()
        .filter_map(|t| {
            let schema = schema_for(*t);
            schema
                .resolve_header(&normalized)
                .and_then(|f| schema.field(f))
                .filter(|f| f.kind == FieldKind::Date)
                .map(|f| f.name)
        })
        .next()
        .map(str::to_string)
        .unwrap_or(normalized)
}

fn date_in_name(sheet_name: &str) -> Option<NaiveDate> {
    sheet_name
        .split(|c: char| c.is_whitespace() || c == '_' || c == '(' || c == ')')
        .filter(|token| token.len() >= 8)
        .find_map(parse_date_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::Builder;

    fn text_row(cells: &[&str]) -> Vec<CellValue> {
        cells.iter().map(|c| CellValue::text(*c)).collect()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_classify_fertility_headers() {
        let headers = [
            "flock",
            "set_date",
            "sample_size",
            "fertile",
            "early_dead",
            "fertility_percent",
        ];
        let classification = classify_headers(&headers);
        assert_eq!(classification.record_type(), Some(RecordType::FertilityAnalysis));
    }

    #[test]
    fn test_classify_unknown_headers() {
        let headers = ["colour", "weight", "notes"];
        assert_eq!(classify_headers(&headers), Classification::Unrecognized);
    }

    #[test]
    fn test_classify_tie_is_ambiguous() {
        // 仅命中共享字段: 受精率与残蛋分析同分
        let headers = ["flock_number", "set_date", "sample_size"];
        match classify_headers(&headers) {
            Classification::Ambiguous { candidates, .. } => {
                assert!(candidates.contains(&RecordType::FertilityAnalysis));
                assert!(candidates.contains(&RecordType::ResidueAnalysis));
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_grid_with_preamble_and_blank_rows() {
        let grid = vec![
            text_row(&["Weekly fertility breakout"]),
            vec![CellValue::text("Set Date"), CellValue::Date(date(2024, 3, 1))],
            text_row(&[]),
            text_row(&["Flock No.", "Fertile Eggs", "Sample", "Fertility %", ""]),
            text_row(&["F101", "270", "300", "90"]),
            text_row(&["", "", "", ""]),
            text_row(&["F102", " 1,234 ", "1500", "82.3%", "stray"]),
        ];

        let sheet = SheetParser::new().parse_grid("Fertility", grid);
        assert_eq!(sheet.record_type, Some(RecordType::FertilityAnalysis));
        assert_eq!(
            sheet.headers,
            vec!["flock_number", "fertile", "sample_size", "fertility_percent"]
        );

        // 空行跳过但占用行号
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].row_number, 1);
        assert_eq!(sheet.rows[1].row_number, 3);
        assert_eq!(sheet.rows[1].get("fertile").as_i64(), Some(1234));
        assert_eq!(sheet.rows[1].get("fertility_percent").as_f64(), Some(82.3));

        let ctx = sheet.date_context.unwrap();
        assert_eq!(ctx.date_for("set_date"), Some(date(2024, 3, 1)));
    }

    #[test]
    fn test_date_context_from_sheet_name() {
        let grid = vec![text_row(&["Flock", "Total Eggs", "Cracked"]), text_row(&["F1", "100", "2"])];
        let sheet = SheetParser::new().parse_grid("Egg Pack 2024-03-05", grid);
        assert_eq!(sheet.record_type, Some(RecordType::EggPackQuality));
        assert_eq!(
            sheet.date_context.and_then(|c| c.primary),
            Some(date(2024, 3, 5))
        );
    }

    #[test]
    fn test_sheet_without_header_is_unrecognized() {
        let grid = vec![text_row(&["only one cell"]), text_row(&[])];
        let sheet = SheetParser::new().parse_grid("Notes", grid);
        assert_eq!(sheet.classification, Classification::Unrecognized);
        assert!(sheet.rows.is_empty());
    }

    #[test]
    fn test_parse_csv_file() {
        let mut file = Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Machine,Date,Check Type,Humidity").unwrap();
        writeln!(file, "S01,2024-03-01,Humidity,55").unwrap();
        writeln!(file, "S02,2024-03-01,Humidity,57.5").unwrap();
        file.flush().unwrap();

        let sheets = SheetParser::new().parse_file(file.path()).unwrap();
        assert_eq!(sheets.len(), 1);
        let sheet = &sheets[0];
        assert_eq!(sheet.record_type, Some(RecordType::QaMonitoring));
        assert_eq!(sheet.rows.len(), 2);
        assert_eq!(sheet.rows[0].get("machine_number").as_text().as_deref(), Some("S01"));
        assert_eq!(sheet.rows[1].get("humidity_percent").as_f64(), Some(57.5));
    }

    #[test]
    fn test_missing_file_and_bad_extension() {
        let err = SheetParser::new().parse_file("/nonexistent/book.xlsx").unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));

        let file = Builder::new().suffix(".txt").tempfile().unwrap();
        let err = SheetParser::new().parse_file(file.path()).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat(_)));
        assert!(err.is_parse_error());
    }

    #[test]
    fn test_merged_regions_fill_from_top_left() {
        // 网格从工作表第 2 行 B 列开始
        let mut grid = vec![
            text_row(&["Flock Number", "House Number", "Fertile"]),
            text_row(&["F101", "H1", "270"]),
            text_row(&["F102", "", "260"]),
            text_row(&["F103"]),
        ];
        let regions = [
            Dimensions {
                start: (2, 2),
                end: (4, 2),
            },
            // 起点在网格之外, 忽略
            Dimensions {
                start: (0, 0),
                end: (0, 3),
            },
        ];
        fill_merged_regions(&mut grid, (1, 1), &regions);

        assert_eq!(grid[2][1], CellValue::text("H1"));
        assert_eq!(grid[3][1], CellValue::text("H1"));
        assert_eq!(grid[3].len(), 2);
        assert_eq!(grid[0][0], CellValue::text("Flock Number"));
    }

    #[test]
    fn test_corrupt_workbook_is_parse_error() {
        let mut file = Builder::new().suffix(".xlsx").tempfile().unwrap();
        file.write_all(b"definitely not a zip archive").unwrap();
        file.flush().unwrap();

        let err = SheetParser::new().parse_file(file.path()).unwrap_err();
        assert!(err.is_parse_error());
    }
}
